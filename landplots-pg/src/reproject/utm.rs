//! Projection UTM (Universal Transverse Mercator), inverse sur un ellipsoïde quelconque
//!
//! Séries de Snyder (USGS PP 1395), précision submétrique dans la zone.

use super::ellipsoid::Ellipsoid;
use super::Geographic;

const K0: f64 = 0.9996;
const FALSE_EASTING: f64 = 500000.0;
const FALSE_NORTHING_SOUTH: f64 = 10000000.0;

/// Longitude du méridien central d'une zone, en degrés
pub fn central_meridian(zone: u32) -> f64 {
    (zone as f64 - 1.0) * 6.0 - 180.0 + 3.0
}

/// Convertit des coordonnées UTM en géographiques sur l'ellipsoïde donné
pub fn utm_to_geographic(x: f64, y: f64, zone: u32, south: bool, ellipsoid: &Ellipsoid) -> Geographic {
    let a = ellipsoid.a;
    let e2 = ellipsoid.e2();
    let ep2 = ellipsoid.ep2();

    let y0 = if south { FALSE_NORTHING_SOUTH } else { 0.0 };
    let lon0 = central_meridian(zone).to_radians();

    // Coordonnées réduites
    let x = x - FALSE_EASTING;
    let y = y - y0;

    // Latitude d'empreinte
    let m = y / K0;
    let mu = m / (a * (1.0 - e2 / 4.0 - 3.0 * e2.powi(2) / 64.0 - 5.0 * e2.powi(3) / 256.0));

    let e1 = (1.0 - (1.0 - e2).sqrt()) / (1.0 + (1.0 - e2).sqrt());

    let phi1 = mu
        + (3.0 * e1 / 2.0 - 27.0 * e1.powi(3) / 32.0) * (2.0 * mu).sin()
        + (21.0 * e1.powi(2) / 16.0 - 55.0 * e1.powi(4) / 32.0) * (4.0 * mu).sin()
        + (151.0 * e1.powi(3) / 96.0) * (6.0 * mu).sin()
        + (1097.0 * e1.powi(4) / 512.0) * (8.0 * mu).sin();

    let sin_phi1 = phi1.sin();
    let cos_phi1 = phi1.cos();
    let tan_phi1 = phi1.tan();

    let n1 = a / (1.0 - e2 * sin_phi1.powi(2)).sqrt();
    let t1 = tan_phi1.powi(2);
    let c1 = ep2 * cos_phi1.powi(2);
    let r1 = a * (1.0 - e2) / (1.0 - e2 * sin_phi1.powi(2)).powf(1.5);
    let d = x / (n1 * K0);

    let lat = phi1
        - (n1 * tan_phi1 / r1)
            * (d.powi(2) / 2.0
                - (5.0 + 3.0 * t1 + 10.0 * c1 - 4.0 * c1.powi(2) - 9.0 * ep2) * d.powi(4) / 24.0
                + (61.0 + 90.0 * t1 + 298.0 * c1 + 45.0 * t1.powi(2) - 252.0 * ep2 - 3.0 * c1.powi(2))
                    * d.powi(6)
                    / 720.0);

    let lon = lon0
        + (d - (1.0 + 2.0 * t1 + c1) * d.powi(3) / 6.0
            + (5.0 - 2.0 * c1 + 28.0 * t1 - 3.0 * c1.powi(2) + 8.0 * ep2 + 24.0 * t1.powi(2))
                * d.powi(5)
                / 120.0)
            / cos_phi1;

    Geographic::new(lon, lat)
}

#[cfg(test)]
mod tests {
    use super::super::ellipsoid::{CLARKE_1880_RGS, WGS84};
    use super::*;

    #[test]
    fn test_central_meridian() {
        assert_eq!(central_meridian(37), 39.0);
        assert_eq!(central_meridian(36), 33.0);
        assert_eq!(central_meridian(1), -177.0);
    }

    #[test]
    fn test_dar_es_salaam() {
        // Dar es Salaam, zone 37S : environ 39.28°E, 6.82°S
        let geo = utm_to_geographic(530000.0, 9246000.0, 37, true, &WGS84);
        let (lon, lat) = geo.to_degrees();
        assert!((lon - 39.27).abs() < 0.02, "lon={}", lon);
        assert!((lat - (-6.82)).abs() < 0.02, "lat={}", lat);
    }

    #[test]
    fn test_mwanza() {
        // Mwanza, zone 36S : environ 32.90°E, 2.52°S
        let geo = utm_to_geographic(489000.0, 9721000.0, 36, true, &WGS84);
        let (lon, lat) = geo.to_degrees();
        assert!((lon - 32.90).abs() < 0.02, "lon={}", lon);
        assert!((lat - (-2.52)).abs() < 0.02, "lat={}", lat);
    }

    #[test]
    fn test_central_meridian_origin() {
        // Sur le méridien central à l'équateur : exactement (lon0, 0)
        for ellipsoid in [WGS84, CLARKE_1880_RGS] {
            let (lon, lat) = utm_to_geographic(500000.0, 0.0, 37, false, &ellipsoid).to_degrees();
            assert!((lon - 39.0).abs() < 1e-9);
            assert!(lat.abs() < 1e-9);
        }
    }
}
