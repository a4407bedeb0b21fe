//! Résolution du système de coordonnées source
//!
//! Ordre : surcharge explicite (`EPSG:n`), puis code détecté dans le `.prj`
//! (autorité racine, puis motifs de noms ESRI), sinon WKT brut sans code.

use anyhow::{bail, Result};
use esri_shp::PrjInfo;
use serde::Serialize;

use super::WGS84_EPSG;

/// Provenance du système retenu
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CrsOrigin {
    Override,
    Prj,
    /// `.prj` présent mais aucun code EPSG reconnu
    UnrecognizedPrj,
    /// Pas de `.prj` : coordonnées supposées en WGS 84
    Undeclared,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceCrs {
    pub epsg: Option<u32>,
    /// WKT du `.prj`, conservé pour le backend PROJ
    pub wkt: Option<String>,
    pub origin: CrsOrigin,
}

impl SourceCrs {
    pub fn wgs84() -> Self {
        Self {
            epsg: Some(WGS84_EPSG),
            wkt: None,
            origin: CrsOrigin::Undeclared,
        }
    }

    /// Faux si la source est déjà en WGS 84 ou ne déclare rien
    pub fn needs_transform(&self) -> bool {
        match (self.epsg, self.origin) {
            (Some(code), _) => code != WGS84_EPSG,
            (None, CrsOrigin::Undeclared) => false,
            (None, _) => self.wkt.is_some(),
        }
    }

    /// Argument `-s_srs` pour ogr2ogr, seulement si un code a été résolu
    pub fn srs_arg(&self) -> Option<String> {
        if self.origin == CrsOrigin::Undeclared {
            return None;
        }
        self.epsg.map(|code| format!("EPSG:{code}"))
    }
}

/// Parse `EPSG:21037`, `epsg:21037` ou `21037`
pub fn parse_epsg(value: &str) -> Result<u32> {
    let trimmed = value.trim();
    let digits = trimmed
        .get(..5)
        .filter(|prefix| prefix.eq_ignore_ascii_case("EPSG:"))
        .map_or(trimmed, |_| &trimmed[5..]);
    match digits.trim().parse::<u32>() {
        Ok(code) if code > 0 => Ok(code),
        _ => bail!("Invalid CRS override: {}. Use EPSG:<code>", value),
    }
}

/// Détermine le système source d'après la surcharge et le `.prj`
pub fn resolve_source_crs(override_srs: Option<&str>, prj: Option<&PrjInfo>) -> Result<SourceCrs> {
    let wkt = prj.map(|p| p.wkt.clone()).filter(|w| !w.is_empty());

    if let Some(value) = override_srs {
        return Ok(SourceCrs {
            epsg: Some(parse_epsg(value)?),
            wkt,
            origin: CrsOrigin::Override,
        });
    }

    Ok(match (prj.and_then(|p| p.epsg), wkt) {
        (Some(code), wkt) => SourceCrs {
            epsg: Some(code),
            wkt,
            origin: CrsOrigin::Prj,
        },
        (None, Some(wkt)) => SourceCrs {
            epsg: None,
            wkt: Some(wkt),
            origin: CrsOrigin::UnrecognizedPrj,
        },
        (None, None) => SourceCrs::wgs84(),
    })
}
