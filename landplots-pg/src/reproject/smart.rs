//! Reprojection intelligente : Rust pur en priorité, fallback sur PROJ
//!
//! Utilise automatiquement la meilleure option disponible.

use super::{ReprojectorLite, SourceCrs};
use anyhow::Result;
use geo::Geometry;

/// Reprojection vers WGS 84
pub enum SmartReprojector {
    /// Reprojection légère (pure Rust)
    Lite(ReprojectorLite),
    /// Reprojection via PROJ (si feature activée)
    #[cfg(feature = "reproject")]
    Proj(super::proj::Reprojector),
    /// Pas de reprojection (source déjà en WGS 84 ou non déclarée)
    Identity,
}

impl SmartReprojector {
    /// Choisit le backend pour un système source résolu
    ///
    /// Échoue si la source demande un backend absent de cette compilation.
    pub fn new(source: &SourceCrs) -> Result<Self> {
        if !source.needs_transform() {
            return Ok(Self::Identity);
        }

        if let Some(code) = source.epsg {
            if ReprojectorLite::is_supported_source(code) {
                return Ok(Self::Lite(ReprojectorLite::new(code)?));
            }
        }

        #[cfg(feature = "reproject")]
        {
            let proj = match (source.epsg, source.wkt.as_deref()) {
                (Some(code), _) => super::proj::Reprojector::from_epsg(code)?,
                (None, Some(wkt)) => super::proj::Reprojector::from_definition(wkt)?,
                (None, None) => return Ok(Self::Identity),
            };
            Ok(Self::Proj(proj))
        }

        #[cfg(not(feature = "reproject"))]
        anyhow::bail!(
            "Reprojection {} → EPSG:4326 non supportée.\n\
             Projections supportées (Rust pur) :\n\
             - 4210 (Arc 1960), 21035-21037 / 21095-21097 (Arc 1960 UTM)\n\
             - 32601-32660 / 32701-32760 (WGS 84 UTM)\n\
             Pour d'autres projections, compilez avec: cargo build --features reproject",
            source
                .epsg
                .map_or_else(|| "WKT".to_string(), |c| format!("EPSG:{c}"))
        )
    }

    /// Transforme une géométrie
    pub fn transform_geometry(&self, geom: &Geometry) -> Result<Geometry> {
        match self {
            Self::Identity => Ok(geom.clone()),
            Self::Lite(lite) => lite.transform_geometry(geom),
            #[cfg(feature = "reproject")]
            Self::Proj(proj) => proj.transform_geometry(geom),
        }
    }

    pub fn is_identity(&self) -> bool {
        matches!(self, Self::Identity)
    }

    /// Retourne une description du reprojector utilisé
    pub fn description(&self) -> &'static str {
        match self {
            Self::Identity => "identity",
            Self::Lite(_) => "lite (pure Rust)",
            #[cfg(feature = "reproject")]
            Self::Proj(_) => "proj (PROJ library)",
        }
    }
}
