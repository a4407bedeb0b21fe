//! Reprojection vers WGS 84 (EPSG:4326)
//!
//! Backend léger en Rust pur pour les systèmes d'Afrique de l'Est :
//! - WGS 84 / UTM, toutes zones (EPSG:326xx, 327xx)
//! - Arc 1960 / UTM 35S-37S et 35N-37N (EPSG:21035-21037, 21095-21097)
//! - Arc 1960 géographique (EPSG:4210)
//!
//! Arc 1960 est ramené à WGS 84 par une translation géocentrique à 3 paramètres.
//! Le feature `reproject` ajoute PROJ pour tout autre code EPSG ou WKT.

mod crs;
mod datum;
mod ellipsoid;
mod envelope;
#[cfg(feature = "reproject")]
mod proj;
mod smart;
mod utm;

pub use crs::{parse_epsg, resolve_source_crs, CrsOrigin, SourceCrs};
pub use datum::Datum;
pub use ellipsoid::{Ellipsoid, CLARKE_1880_RGS, WGS84};
pub use envelope::Envelope;
pub use smart::SmartReprojector;

use anyhow::{bail, Result};
use geo::{Coord, Geometry, MapCoords};

pub const WGS84_EPSG: u32 = 4326;

/// Point en coordonnées géographiques (radians)
#[derive(Debug, Clone, Copy)]
pub struct Geographic {
    /// Longitude en radians
    pub lon: f64,
    /// Latitude en radians
    pub lat: f64,
}

impl Geographic {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }

    /// Convertit en degrés
    pub fn to_degrees(self) -> (f64, f64) {
        (self.lon.to_degrees(), self.lat.to_degrees())
    }

    /// Crée depuis des degrés
    pub fn from_degrees(lon_deg: f64, lat_deg: f64) -> Self {
        Self {
            lon: lon_deg.to_radians(),
            lat: lat_deg.to_radians(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LiteSource {
    Utm { zone: u32, south: bool, datum: Datum },
    Geographic(Datum),
}

/// Reprojection légère vers WGS 84
#[derive(Debug, Clone)]
pub struct ReprojectorLite {
    source_epsg: u32,
    source: LiteSource,
}

impl ReprojectorLite {
    pub fn new(source_epsg: u32) -> Result<Self> {
        let Some(source) = Self::lite_source(source_epsg) else {
            bail!(
                "EPSG:{} non supporté. Sources supportées: 4210, 21035-21037, 21095-21097, 32601-32660, 32701-32760",
                source_epsg
            );
        };
        Ok(Self {
            source_epsg,
            source,
        })
    }

    /// Vérifie si l'EPSG source est supporté
    pub fn is_supported_source(epsg: u32) -> bool {
        Self::lite_source(epsg).is_some()
    }

    fn lite_source(epsg: u32) -> Option<LiteSource> {
        let utm = |zone, south, datum| Some(LiteSource::Utm { zone, south, datum });
        match epsg {
            4210 => Some(LiteSource::Geographic(Datum::Arc1960)),
            21035..=21037 => utm(epsg - 21000, true, Datum::Arc1960),
            21095..=21097 => utm(epsg - 21060, false, Datum::Arc1960),
            32601..=32660 => utm(epsg - 32600, false, Datum::Wgs84),
            32701..=32760 => utm(epsg - 32700, true, Datum::Wgs84),
            _ => None,
        }
    }

    pub fn source_epsg(&self) -> u32 {
        self.source_epsg
    }

    /// Transforme un point (x, y) vers (longitude, latitude) WGS 84 en degrés
    pub fn transform_point(&self, x: f64, y: f64) -> Result<(f64, f64)> {
        if !x.is_finite() || !y.is_finite() {
            bail!("Non-finite coordinate ({}, {})", x, y);
        }
        let (geo, datum) = match self.source {
            LiteSource::Utm { zone, south, datum } => (
                utm::utm_to_geographic(x, y, zone, south, datum.ellipsoid()),
                datum,
            ),
            LiteSource::Geographic(datum) => (Geographic::from_degrees(x, y), datum),
        };
        let (lon, lat) = datum.to_wgs84(geo).to_degrees();
        if !lon.is_finite() || !lat.is_finite() || lat.abs() > 90.0 {
            bail!("Coordinate ({}, {}) outside EPSG:{} domain", x, y, self.source_epsg);
        }
        Ok((lon, lat))
    }

    /// Transforme une géométrie sommet par sommet (topologie conservée)
    pub fn transform_geometry(&self, geom: &Geometry) -> Result<Geometry> {
        geom.try_map_coords(|c| {
            let (x, y) = self.transform_point(c.x, c.y)?;
            Ok(Coord { x, y })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;

    #[test]
    fn test_arc1960_37s_to_wgs84() {
        let reproj = ReprojectorLite::new(21037).unwrap();
        let (lon, lat) = reproj.transform_point(530000.0, 9246000.0).unwrap();

        // Dar es Salaam : environ 39.27°E, 6.82°S
        assert!((lon - 39.27).abs() < 0.02, "lon={}", lon);
        assert!((lat - (-6.82)).abs() < 0.02, "lat={}", lat);
    }

    #[test]
    fn test_arc1960_differs_from_wgs84_utm() {
        let arc = ReprojectorLite::new(21037).unwrap();
        let wgs = ReprojectorLite::new(32737).unwrap();
        let (a_lon, a_lat) = arc.transform_point(530000.0, 9246000.0).unwrap();
        let (w_lon, w_lat) = wgs.transform_point(530000.0, 9246000.0).unwrap();
        let shift_m = ((a_lon - w_lon) * 110_500.0).hypot((a_lat - w_lat) * 110_500.0);
        assert!(shift_m > 100.0 && shift_m < 500.0, "shift={shift_m}");
    }

    #[test]
    fn test_northern_zone() {
        let reproj = ReprojectorLite::new(21097).unwrap();
        let (lon, lat) = reproj.transform_point(500000.0, 100000.0).unwrap();
        assert!((lon - 39.0).abs() < 0.01, "lon={}", lon);
        assert!(lat > 0.8 && lat < 1.0, "lat={}", lat);
    }

    #[test]
    fn test_transform_polygon_keeps_ring_count() {
        let reproj = ReprojectorLite::new(32737).unwrap();
        let poly = polygon![
            (x: 530000.0, y: 9246000.0),
            (x: 530100.0, y: 9246000.0),
            (x: 530100.0, y: 9246100.0),
            (x: 530000.0, y: 9246100.0),
            (x: 530000.0, y: 9246000.0),
        ];
        let out = reproj.transform_geometry(&Geometry::Polygon(poly)).unwrap();
        let Geometry::Polygon(p) = out else {
            panic!("expected a polygon");
        };
        assert_eq!(p.exterior().0.len(), 5);
        assert!(p.exterior().0.iter().all(|c| c.x > 39.0 && c.x < 40.0));
    }

    #[test]
    fn test_unsupported_epsg() {
        assert!(ReprojectorLite::new(4326).is_err());
        assert!(ReprojectorLite::new(2154).is_err());
        assert!(ReprojectorLite::new(21038).is_err());
    }

    #[test]
    fn test_non_finite_rejected() {
        let reproj = ReprojectorLite::new(32737).unwrap();
        assert!(reproj.transform_point(f64::NAN, 0.0).is_err());
    }
}
