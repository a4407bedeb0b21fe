//! # landplots-pg
//!
//! Import de parcelles foncières (shapefiles ESRI) vers PostGIS avec suivi de provenance.
//!
//! ## Features
//!
//! - Validation des composants `.shp/.shx/.dbf/.prj/.cpg`
//! - Chargement via `ogr2ogr` si disponible, sinon lecteur natif (`esri-shp`)
//! - Reprojection vers EPSG:4326 (Arc 1960, UTM ; PROJ en option)
//! - Upsert idempotent sur `plot_code`, tout ou rien
//! - Registre des imports (`shapefile_imports`)
//!
//! ## Usage CLI
//!
//! ```bash
//! # Import vers PostGIS
//! landplots-pg import --shapefile ./mbuyuni.shp --district Kilosa --ward Mabwerebwere --village Mbuyuni
//!
//! # Inspection à blanc (sans base de données)
//! landplots-pg inspect --shapefile ./mbuyuni.shp
//! ```

pub mod config;
pub mod error;
pub mod merge;
pub mod pipeline;
pub mod report;
pub mod reproject;
pub mod source;
pub mod store;
pub mod validate;

pub use config::{ConflictPolicy, ImportConfig};
pub use error::{ImportError, SourceFailure, ValidationError};
pub use pipeline::{ImportRequest, Pipeline};
pub use report::{ImportReport, ImportStatus};
pub use store::{create_pool, DatabaseConfig, Store};
