//! Changement de datum par translation géocentrique (3 paramètres)

use super::ellipsoid::{Ellipsoid, CLARKE_1880_RGS, WGS84};
use super::Geographic;

/// Datums gérés en Rust pur
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Datum {
    Wgs84,
    /// Arc 1960 (Clarke 1880 RGS), Tanzanie et Kenya
    Arc1960,
}

/// Translation Arc 1960 → WGS 84 en mètres (ΔX, ΔY, ΔZ)
const ARC_1960_TO_WGS84: [f64; 3] = [-160.0, -6.0, -302.0];

impl Datum {
    pub fn ellipsoid(self) -> &'static Ellipsoid {
        match self {
            Datum::Wgs84 => &WGS84,
            Datum::Arc1960 => &CLARKE_1880_RGS,
        }
    }

    /// Ramène une position géographique de ce datum vers WGS 84 (hauteur nulle)
    pub fn to_wgs84(self, geo: Geographic) -> Geographic {
        match self {
            Datum::Wgs84 => geo,
            Datum::Arc1960 => {
                let [x, y, z] = geodetic_to_geocentric(geo, self.ellipsoid());
                let [dx, dy, dz] = ARC_1960_TO_WGS84;
                geocentric_to_geodetic([x + dx, y + dy, z + dz], &WGS84)
            }
        }
    }
}

pub fn geodetic_to_geocentric(geo: Geographic, ellipsoid: &Ellipsoid) -> [f64; 3] {
    let e2 = ellipsoid.e2();
    let (sin_lat, cos_lat) = geo.lat.sin_cos();
    let (sin_lon, cos_lon) = geo.lon.sin_cos();
    let n = ellipsoid.a / (1.0 - e2 * sin_lat * sin_lat).sqrt();
    [
        n * cos_lat * cos_lon,
        n * cos_lat * sin_lon,
        n * (1.0 - e2) * sin_lat,
    ]
}

/// Inverse itératif ; converge en quelques itérations près de la surface
pub fn geocentric_to_geodetic([x, y, z]: [f64; 3], ellipsoid: &Ellipsoid) -> Geographic {
    let e2 = ellipsoid.e2();
    let p = x.hypot(y);
    let lon = y.atan2(x);

    let mut lat = z.atan2(p * (1.0 - e2));
    for _ in 0..10 {
        let sin_lat = lat.sin();
        let n = ellipsoid.a / (1.0 - e2 * sin_lat * sin_lat).sqrt();
        let h = p / lat.cos() - n;
        let next = z.atan2(p * (1.0 - e2 * n / (n + h)));
        if (next - lat).abs() < 1e-14 {
            lat = next;
            break;
        }
        lat = next;
    }

    Geographic::new(lon, lat)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geocentric_round_trip() {
        let geo = Geographic::from_degrees(39.2, -6.8);
        let back = geocentric_to_geodetic(geodetic_to_geocentric(geo, &WGS84), &WGS84);
        let (lon, lat) = back.to_degrees();
        assert!((lon - 39.2).abs() < 1e-9);
        assert!((lat - (-6.8)).abs() < 1e-9);
    }

    #[test]
    fn test_arc1960_shift_magnitude() {
        // Le décalage Arc 1960 → WGS 84 en Tanzanie est de l'ordre de 200 à 400 m
        let geo = Geographic::from_degrees(39.0, -6.0);
        let (lon, lat) = Datum::Arc1960.to_wgs84(geo).to_degrees();
        let dx = (lon - 39.0) * 111_320.0 * 6.0f64.to_radians().cos();
        let dy = (lat - (-6.0)) * 110_574.0;
        let shift = dx.hypot(dy);
        assert!(shift > 100.0 && shift < 500.0, "shift={shift}");
    }

    #[test]
    fn test_wgs84_is_identity() {
        let geo = Geographic::from_degrees(35.0, -3.0);
        assert_eq!(Datum::Wgs84.to_wgs84(geo).to_degrees(), geo.to_degrees());
    }
}
