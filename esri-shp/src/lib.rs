//! # esri-shp
//!
//! Lecteur pour la famille de fichiers shapefile ESRI (`.shp`, `.shx`, `.dbf`, `.prj`, `.cpg`).
//!
//! ## Features
//!
//! - Lecture des géométries Polygon/PolygonZ/PolygonM (et détection des autres types)
//! - Table attributaire dBase avec décodage selon le `.cpg` ou l'octet "language driver"
//! - Détection du code EPSG depuis le `.prj` (autorité, motifs de noms ESRI)
//! - Normalisation en `MultiPolygon` et réparation des géométries invalides
//! - Types `geo` pour l'interopérabilité avec l'écosystème Rust géospatial
//!
//! ## Usage
//!
//! ```rust,ignore
//! use esri_shp::Shapefile;
//! use std::path::Path;
//!
//! let shapefile = Shapefile::open(Path::new("plots.shp"))?;
//! println!("{} features, EPSG {:?}", shapefile.len(), shapefile.prj.as_ref().and_then(|p| p.epsg));
//!
//! for feature in shapefile.features() {
//!     match feature {
//!         Ok(f) => println!("#{}: {} attributes", f.index, f.attributes.len()),
//!         Err(e) => eprintln!("skipped: {e}"),
//!     }
//! }
//! ```

pub mod error;
pub mod parser;
pub mod repair;
pub mod types;
#[cfg(feature = "writer")]
pub mod writer;

pub use error::{FeatureError, ShpError};
pub use parser::prj::PrjInfo;
pub use types::{Feature, FieldDef, FieldType, FieldValue, ShapeType, ShpHeader};

use std::path::{Path, PathBuf};

use encoding_rs::Encoding;
use tracing::{debug, warn};

use parser::dbf::DbfHeader;
use parser::shx::IndexEntry;

/// Encodage par défaut des DBF sans .cpg ni language driver (Latin-1, comme GDAL)
pub fn default_encoding() -> &'static Encoding {
    encoding_rs::WINDOWS_1252
}

/// Chemin d'un composant par changement d'extension (minuscules puis majuscules)
///
/// Retourne `None` si aucune variante n'existe.
pub fn component_path(path: &Path, extension: &str) -> Option<PathBuf> {
    [extension.to_ascii_lowercase(), extension.to_ascii_uppercase()]
        .into_iter()
        .map(|ext| path.with_extension(ext))
        .find(|p| p.is_file())
}

/// Shapefile ouvert : composants chargés en mémoire, en-têtes parsés
#[derive(Debug)]
pub struct Shapefile {
    pub path: PathBuf,
    pub header: ShpHeader,
    pub fields: Vec<FieldDef>,
    pub encoding: &'static Encoding,
    /// Contenu brut du .cpg, s'il existe
    pub cpg: Option<String>,
    pub prj: Option<PrjInfo>,
    shp: Vec<u8>,
    index: Vec<IndexEntry>,
    dbf: Vec<u8>,
    dbf_header: DbfHeader,
}

impl Shapefile {
    /// Ouvre un shapefile ; l'encodage est lu depuis le .cpg ou l'en-tête DBF
    pub fn open(path: &Path) -> Result<Self, ShpError> {
        Self::open_with_encoding(path, None)
    }

    /// Ouvre un shapefile en forçant l'encodage des attributs (libellé `.cpg`)
    pub fn open_with_encoding(path: &Path, encoding: Option<&str>) -> Result<Self, ShpError> {
        let required = |ext: &str| {
            component_path(path, ext).ok_or_else(|| ShpError::MissingComponent(format!(".{ext}")))
        };
        let shp_path = required("shp")?;
        let shx_path = required("shx")?;
        let dbf_path = required("dbf")?;

        let shp = std::fs::read(&shp_path)?;
        let shx = std::fs::read(&shx_path)?;
        let dbf = std::fs::read(&dbf_path)?;

        let header = parser::shp::parse_header(&shp)?;
        if header.file_length != shp.len() {
            warn!(
                declared = header.file_length,
                actual = shp.len(),
                "SHP header length does not match file size"
            );
        }
        let index = parser::shx::parse(&shx)?;

        let cpg = component_path(path, "cpg")
            .and_then(|p| std::fs::read(p).ok())
            .map(|raw| parser::dbf::decode_text(&raw, encoding_rs::UTF_8).trim().to_string())
            .filter(|s| !s.is_empty());

        // L'en-tête est d'abord lu en Latin-1 pour récupérer le language driver
        let probe = parser::dbf::parse_header(&dbf, default_encoding())?;
        let encoding = resolve_encoding(encoding, cpg.as_deref(), probe.language_driver)?;
        let dbf_header = parser::dbf::parse_header(&dbf, encoding)?;

        if dbf_header.record_count != index.len() {
            warn!(
                shx = index.len(),
                dbf = dbf_header.record_count,
                "Record count mismatch between SHX and DBF"
            );
        }

        let prj = component_path(path, "prj")
            .and_then(|p| std::fs::read(p).ok())
            .map(|raw| parser::prj::parse(&String::from_utf8_lossy(&raw)));

        debug!(
            path = %shp_path.display(),
            records = index.len(),
            fields = dbf_header.fields.len(),
            encoding = encoding.name(),
            epsg = ?prj.as_ref().and_then(|p| p.epsg),
            "Shapefile opened"
        );

        Ok(Self {
            path: shp_path,
            header,
            fields: dbf_header.fields.clone(),
            encoding,
            cpg,
            prj,
            shp,
            index,
            dbf,
            dbf_header,
        })
    }

    /// Nombre d'enregistrements (selon l'index .shx)
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Lit la feature `index` : géométrie depuis le .shp, attributs depuis le .dbf
    pub fn feature(&self, index: usize) -> Result<Feature, FeatureError> {
        let entry = self.index.get(index).ok_or_else(|| FeatureError::Malformed {
            index,
            reason: format!("index {index} beyond {} records", self.index.len()),
        })?;
        let geometry = parser::shp::parse_record(&self.shp, entry.offset, index)?;
        let attributes = self
            .dbf_header
            .read_record(&self.dbf, index, self.encoding)
            .unwrap_or_default();

        Ok(Feature {
            index,
            geometry,
            attributes,
        })
    }

    /// Itère sur toutes les features ; les enregistrements illisibles sont des `Err`
    pub fn features(&self) -> impl Iterator<Item = Result<Feature, FeatureError>> + '_ {
        (0..self.len()).map(move |i| self.feature(i))
    }
}

/// Encodage effectif : forcé, sinon .cpg, sinon language driver, sinon Latin-1
fn resolve_encoding(
    forced: Option<&str>,
    cpg: Option<&str>,
    language_driver: u8,
) -> Result<&'static Encoding, ShpError> {
    if let Some(label) = forced {
        return parser::cpg::encoding_for_cpg(label)
            .ok_or_else(|| ShpError::UnsupportedEncoding(label.to_string()));
    }
    if let Some(label) = cpg {
        match parser::cpg::encoding_for_cpg(label) {
            Some(enc) => return Ok(enc),
            None => warn!(cpg = label, "Unknown .cpg encoding, falling back"),
        }
    }
    Ok(parser::cpg::encoding_for_ldid(language_driver).unwrap_or(default_encoding()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_encoding_order() {
        assert_eq!(
            resolve_encoding(Some("UTF-8"), Some("1251"), 0x57).unwrap(),
            encoding_rs::UTF_8
        );
        assert_eq!(
            resolve_encoding(None, Some("1251"), 0x57).unwrap(),
            encoding_rs::WINDOWS_1251
        );
        assert_eq!(
            resolve_encoding(None, Some("bogus"), 0xC8).unwrap(),
            encoding_rs::WINDOWS_1250
        );
        assert_eq!(resolve_encoding(None, None, 0).unwrap(), default_encoding());
        assert!(matches!(
            resolve_encoding(Some("bogus"), None, 0),
            Err(ShpError::UnsupportedEncoding(_))
        ));
    }

    #[test]
    fn test_missing_component() {
        let dir = tempfile::tempdir().unwrap();
        let shp = dir.path().join("lonely.shp");
        std::fs::write(&shp, [0u8; 100]).unwrap();
        assert!(matches!(
            Shapefile::open(&shp),
            Err(ShpError::MissingComponent(ext)) if ext == ".shx"
        ));
    }
}
