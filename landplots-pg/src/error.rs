//! Erreurs typées de l'import
//!
//! Les erreurs par entité (`FeatureError`) viennent d'`esri_shp` et ne sont jamais
//! fatales ; elles sont comptées dans le rapport.

use std::path::PathBuf;

use thiserror::Error;

/// Composants obligatoires absents ou illisibles
#[derive(Debug, Clone, Error)]
#[error(
    "invalid shapefile {}: missing [{}], unreadable [{}]",
    path.display(),
    missing.join(", "),
    unreadable.join(", ")
)]
pub struct ValidationError {
    pub path: PathBuf,
    pub missing: Vec<String>,
    pub unreadable: Vec<String>,
}

/// Échec d'une stratégie de lecture des géométries
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceFailure {
    /// Outil externe absent, code de sortie non nul, timeout ou zéro ligne : on bascule
    #[error("{strategy}: conversion failed: {reason}")]
    Conversion {
        strategy: &'static str,
        reason: String,
    },
    /// Lecture native impossible ou aucune entité valide
    #[error("{strategy}: fallback failed: {reason}")]
    Fallback {
        strategy: &'static str,
        reason: String,
    },
}

impl SourceFailure {
    pub fn conversion(strategy: &'static str, reason: impl Into<String>) -> Self {
        Self::Conversion {
            strategy,
            reason: reason.into(),
        }
    }

    pub fn fallback(strategy: &'static str, reason: impl Into<String>) -> Self {
        Self::Fallback {
            strategy,
            reason: reason.into(),
        }
    }

    pub fn strategy(&self) -> &'static str {
        match self {
            Self::Conversion { strategy, .. } | Self::Fallback { strategy, .. } => strategy,
        }
    }
}

/// Erreur fatale d'un import
#[derive(Debug, Error)]
pub enum ImportError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("all geometry sources failed: {}", join_failures(.0))]
    SourcesExhausted(Vec<SourceFailure>),

    #[error("no plot left to import: {rejected} staged rows rejected")]
    NothingToImport { rejected: usize },

    /// Erreur SQL pendant l'upsert : toute la transaction est annulée
    #[error("upsert failed, transaction rolled back: {0:#}")]
    Upsert(#[source] anyhow::Error),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

fn join_failures(failures: &[SourceFailure]) -> String {
    if failures.is_empty() {
        return "no source configured".to_string();
    }
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sources_exhausted_names_every_strategy() {
        let err = ImportError::SourcesExhausted(vec![
            SourceFailure::conversion("ogr2ogr", "program not found"),
            SourceFailure::fallback("native", "zero features survived"),
        ]);
        let msg = err.to_string();
        assert!(msg.contains("ogr2ogr: conversion failed: program not found"), "{msg}");
        assert!(msg.contains("native: fallback failed: zero features survived"), "{msg}");
    }

    #[test]
    fn test_validation_message() {
        let err = ValidationError {
            path: PathBuf::from("/data/plots.shp"),
            missing: vec![".shx".into()],
            unreadable: vec![".dbf".into()],
        };
        assert_eq!(
            err.to_string(),
            "invalid shapefile /data/plots.shp: missing [.shx], unreadable [.dbf]"
        );
    }
}
