//! Définitions des ellipsoïdes

/// Ellipsoïde de révolution (demi-grand axe, aplatissement)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ellipsoid {
    /// Demi-grand axe en mètres
    pub a: f64,
    /// Aplatissement
    pub f: f64,
}

impl Ellipsoid {
    /// Première excentricité au carré
    pub fn e2(&self) -> f64 {
        2.0 * self.f - self.f * self.f
    }

    /// Deuxième excentricité au carré
    pub fn ep2(&self) -> f64 {
        let e2 = self.e2();
        e2 / (1.0 - e2)
    }

    /// Demi-petit axe en mètres
    pub fn b(&self) -> f64 {
        self.a * (1.0 - self.f)
    }
}

/// WGS 84
pub const WGS84: Ellipsoid = Ellipsoid {
    a: 6378137.0,
    f: 1.0 / 298.257223563,
};

/// Clarke 1880 (RGS), ellipsoïde du datum Arc 1960
pub const CLARKE_1880_RGS: Ellipsoid = Ellipsoid {
    a: 6378249.145,
    f: 1.0 / 293.465,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wgs84_constants() {
        assert!((WGS84.e2().sqrt() - 0.0818191908426215).abs() < 1e-12);
        assert!((WGS84.b() - 6356752.314245).abs() < 1e-3);
    }

    #[test]
    fn test_clarke_flatter_than_wgs84() {
        assert!(CLARKE_1880_RGS.f > WGS84.f);
        assert!(CLARKE_1880_RGS.a > WGS84.a);
    }
}
