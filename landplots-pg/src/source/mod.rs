//! Sources de géométries : chargement du shapefile dans la table de staging
//!
//! Deux stratégies implémentent [`GeometrySource`] : le pont `ogr2ogr` et le
//! lecteur natif. [`load_with_fallback`] les essaie dans l'ordre et ne renvoie
//! une erreur que si toutes ont échoué.

pub mod bridge;
pub mod inspect;
pub mod native;
pub mod tool;

pub use bridge::OgrBridge;
pub use native::NativeReader;

use futures::future::BoxFuture;
use serde::Serialize;
use tracing::{info, warn};

use esri_shp::FeatureError;

use crate::error::{ImportError, SourceFailure};
use crate::reproject::{Envelope, SourceCrs};
use crate::store::Store;
use crate::validate::ValidatedShapefile;

/// Stratégie ayant produit le staging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportMethod {
    Ogr2Ogr,
    NativeFallback,
}

impl ImportMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            ImportMethod::Ogr2Ogr => "ogr2ogr",
            ImportMethod::NativeFallback => "native_fallback",
        }
    }
}

impl std::fmt::Display for ImportMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tout ce qu'une source doit connaître pour charger le staging
pub struct LoadContext<'a> {
    pub store: &'a Store,
    pub shapefile: &'a ValidatedShapefile,
    pub dataset: &'a str,
    pub staging_table: &'a str,
    pub crs: &'a SourceCrs,
    pub envelope: &'a Envelope,
    /// Encodage des attributs (forcé ou lu dans le `.cpg`)
    pub encoding: Option<&'a str>,
}

/// Résultat d'un chargement réussi
#[derive(Debug, Clone)]
pub struct StagedLoad {
    pub method: ImportMethod,
    /// Lignes présentes dans le staging
    pub rows: u64,
    /// Entités de la source avant filtrage
    pub source_features: usize,
    /// Entités écartées pendant la lecture
    pub rejected: Vec<FeatureError>,
    pub repaired: usize,
    /// Lignes dont l'emprise sort de l'enveloppe nationale
    pub flagged: u64,
}

/// Stratégie de chargement du staging
pub trait GeometrySource: Send + Sync {
    fn name(&self) -> &'static str;

    fn load<'a>(&'a self, ctx: &'a LoadContext<'a>) -> BoxFuture<'a, Result<StagedLoad, SourceFailure>>;
}

/// Essaie chaque source dans l'ordre ; la première qui réussit l'emporte
pub async fn load_with_fallback(
    sources: &[Box<dyn GeometrySource>],
    ctx: &LoadContext<'_>,
) -> Result<StagedLoad, ImportError> {
    let mut failures = Vec::new();

    for source in sources {
        info!(source = source.name(), dataset = ctx.dataset, "Loading staging");
        match source.load(ctx).await {
            Ok(load) => {
                info!(
                    source = source.name(),
                    method = %load.method,
                    rows = load.rows,
                    rejected = load.rejected.len(),
                    "Staging loaded"
                );
                return Ok(load);
            }
            Err(failure) => {
                warn!(source = failure.strategy(), "{failure}");
                failures.push(failure);
            }
        }
    }

    Err(ImportError::SourcesExhausted(failures))
}
