//! Reprojection de géométries avec PROJ
//!
//! Ce module est disponible uniquement avec le feature `reproject`.

use anyhow::{Context, Result};
use geo::{Coord, Geometry, MapCoords};
use proj::Proj;

use super::WGS84_EPSG;

/// Reprojection vers WGS 84 depuis un code EPSG ou un WKT quelconque
pub struct Reprojector {
    proj: Proj,
    source: String,
}

impl Reprojector {
    pub fn from_epsg(source_epsg: u32) -> Result<Self> {
        Self::from_definition(&format!("EPSG:{}", source_epsg))
    }

    /// Accepte toute définition comprise par PROJ (WKT1 ESRI, WKT2, PROJ string)
    pub fn from_definition(source: &str) -> Result<Self> {
        let target = format!("EPSG:{}", WGS84_EPSG);
        let proj = Proj::new_known_crs(source, &target, None).with_context(|| {
            format!(
                "Failed to create projection from {} to {}",
                abbreviate(source),
                target
            )
        })?;

        Ok(Self {
            proj,
            source: source.to_string(),
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Transforme une géométrie (ordre des axes : x = longitude)
    pub fn transform_geometry(&self, geom: &Geometry) -> Result<Geometry> {
        geom.try_map_coords(|c| {
            let (x, y) = self
                .proj
                .convert((c.x, c.y))
                .context("Coordinate transformation failed")?;
            Ok(Coord { x, y })
        })
    }
}

fn abbreviate(definition: &str) -> &str {
    definition.get(..60).unwrap_or(definition)
}
