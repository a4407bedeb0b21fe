//! Types d'erreurs pour le crate esri-shp

use thiserror::Error;

/// Erreurs fatales pouvant survenir lors de la lecture d'un shapefile
#[derive(Debug, Error)]
pub enum ShpError {
    /// Erreur d'I/O lors de la lecture d'un composant
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Composant obligatoire absent (.shp, .shx, .dbf)
    #[error("Missing required component: {0}")]
    MissingComponent(String),

    /// En-tête corrompu ou format invalide
    #[error("Invalid header in {file}: {reason}")]
    InvalidHeader { file: String, reason: String },

    /// Erreur de parsing d'un composant
    #[error("Parse error in {file}: {reason}")]
    ParseError { file: String, reason: String },

    /// Encodage non supporté
    #[error("Unsupported encoding: {0}")]
    UnsupportedEncoding(String),
}

impl ShpError {
    /// Crée une erreur d'en-tête avec contexte
    pub fn invalid_header(file: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidHeader {
            file: file.into(),
            reason: reason.into(),
        }
    }

    /// Crée une erreur de parsing avec contexte
    pub fn parse_error(file: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ParseError {
            file: file.into(),
            reason: reason.into(),
        }
    }
}

/// Erreur limitée à une seule feature : la feature est ignorée, la lecture continue
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FeatureError {
    /// Enregistrement .shp illisible (longueur, nombre de parts, etc.)
    #[error("Malformed record #{index}: {reason}")]
    Malformed { index: usize, reason: String },

    /// Type de géométrie non polygonal
    #[error("Unsupported geometry type for record #{index}: {kind}")]
    Unsupported { index: usize, kind: &'static str },

    /// Géométrie absente (shape Null) ou vide
    #[error("Empty geometry for record #{index}")]
    Empty { index: usize },

    /// Géométrie invalide que la réparation n'a pas pu corriger
    #[error("Geometry repair failed for record #{index}: {reason}")]
    Unrepairable { index: usize, reason: String },

    /// Échec de la transformation de coordonnées
    #[error("Reprojection failed for record #{index}: {reason}")]
    Reprojection { index: usize, reason: String },
}

impl FeatureError {
    /// Index (0-based) de l'enregistrement concerné
    pub fn index(&self) -> usize {
        match self {
            Self::Malformed { index, .. }
            | Self::Unsupported { index, .. }
            | Self::Empty { index }
            | Self::Unrepairable { index, .. }
            | Self::Reprojection { index, .. } => *index,
        }
    }

    /// Catégorie courte, utilisée pour agréger les compteurs de rejet
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Malformed { .. } => "malformed",
            Self::Unsupported { .. } => "unsupported",
            Self::Empty { .. } => "empty",
            Self::Unrepairable { .. } => "unrepairable",
            Self::Reprojection { .. } => "reprojection",
        }
    }
}
