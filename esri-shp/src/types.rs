//! Types de données pour le crate esri-shp

use geo::{Geometry, Rect};

/// Types de shapes définis par la spécification ESRI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShapeType {
    Null,
    Point,
    PolyLine,
    Polygon,
    MultiPoint,
    PointZ,
    PolyLineZ,
    PolygonZ,
    MultiPointZ,
    PointM,
    PolyLineM,
    PolygonM,
    MultiPointM,
    MultiPatch,
}

impl ShapeType {
    pub fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            0 => Self::Null,
            1 => Self::Point,
            3 => Self::PolyLine,
            5 => Self::Polygon,
            8 => Self::MultiPoint,
            11 => Self::PointZ,
            13 => Self::PolyLineZ,
            15 => Self::PolygonZ,
            18 => Self::MultiPointZ,
            21 => Self::PointM,
            23 => Self::PolyLineM,
            25 => Self::PolygonM,
            28 => Self::MultiPointM,
            31 => Self::MultiPatch,
            _ => return None,
        })
    }

    pub fn code(self) -> i32 {
        match self {
            Self::Null => 0,
            Self::Point => 1,
            Self::PolyLine => 3,
            Self::Polygon => 5,
            Self::MultiPoint => 8,
            Self::PointZ => 11,
            Self::PolyLineZ => 13,
            Self::PolygonZ => 15,
            Self::MultiPointZ => 18,
            Self::PointM => 21,
            Self::PolyLineM => 23,
            Self::PolygonM => 25,
            Self::MultiPointM => 28,
            Self::MultiPatch => 31,
        }
    }

    /// Polygon, PolygonZ ou PolygonM
    pub fn is_polygon(self) -> bool {
        matches!(self, Self::Polygon | Self::PolygonZ | Self::PolygonM)
    }

    /// Nom lisible, aligné sur la sortie de `ogrinfo` ("Polygon", "3D Polygon", ...)
    pub fn label(self) -> &'static str {
        match self {
            Self::Null => "None",
            Self::Point | Self::PointM => "Point",
            Self::PolyLine | Self::PolyLineM => "Line String",
            Self::Polygon | Self::PolygonM => "Polygon",
            Self::MultiPoint | Self::MultiPointM => "Multi Point",
            Self::PointZ => "3D Point",
            Self::PolyLineZ => "3D Line String",
            Self::PolygonZ => "3D Polygon",
            Self::MultiPointZ => "3D Multi Point",
            Self::MultiPatch => "MultiPatch",
        }
    }
}

/// Type d'un champ DBF
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Character,
    Numeric,
    Float,
    Logical,
    Date,
    Integer,
    Memo,
    Other(u8),
}

impl FieldType {
    pub fn from_byte(b: u8) -> Self {
        match b {
            b'C' => Self::Character,
            b'N' => Self::Numeric,
            b'F' => Self::Float,
            b'L' => Self::Logical,
            b'D' => Self::Date,
            b'I' => Self::Integer,
            b'M' => Self::Memo,
            other => Self::Other(other),
        }
    }
}

/// Descripteur d'un champ DBF
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    pub name: String,
    pub field_type: FieldType,
    pub length: u8,
    pub decimals: u8,
}

impl FieldDef {
    /// Type au format `ogrinfo` : `Integer (9.0)`, `Real (19.11)`, `String (80.0)`
    pub fn type_label(&self) -> String {
        let kind = match self.field_type {
            FieldType::Numeric | FieldType::Float if self.decimals > 0 => "Real",
            FieldType::Float => "Real",
            FieldType::Numeric if self.length > 10 => "Integer64",
            FieldType::Numeric | FieldType::Integer => "Integer",
            FieldType::Logical => "String",
            FieldType::Date => "Date",
            FieldType::Character | FieldType::Memo | FieldType::Other(_) => "String",
        };
        format!("{} ({}.{})", kind, self.length, self.decimals)
    }
}

/// Valeur d'un champ DBF décodée
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Text(String),
    Integer(i64),
    Number(f64),
    Logical(bool),
    /// Date ISO `YYYY-MM-DD`
    Date(String),
}

impl FieldValue {
    /// Représentation texte ; `None` pour les valeurs nulles
    pub fn to_text(&self) -> Option<String> {
        match self {
            Self::Null => None,
            Self::Text(s) | Self::Date(s) => Some(s.clone()),
            Self::Integer(i) => Some(i.to_string()),
            Self::Number(n) => Some(n.to_string()),
            Self::Logical(b) => Some(b.to_string()),
        }
    }
}

/// En-tête du fichier .shp
#[derive(Debug, Clone, Copy)]
pub struct ShpHeader {
    pub shape_type: ShapeType,
    /// Longueur déclarée du fichier, en octets
    pub file_length: usize,
    /// Emprise déclarée (XY)
    pub extent: Option<Rect<f64>>,
}

/// Une feature : géométrie (absente pour un shape Null) et attributs DBF dans l'ordre des champs
#[derive(Debug, Clone)]
pub struct Feature {
    /// Index 0-based de l'enregistrement dans le shapefile
    pub index: usize,

    pub geometry: Option<Geometry>,

    pub attributes: Vec<(String, FieldValue)>,
}

impl Feature {
    /// Recherche un attribut par nom, sans tenir compte de la casse
    pub fn attribute(&self, name: &str) -> Option<&FieldValue> {
        self.attributes
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }
}
