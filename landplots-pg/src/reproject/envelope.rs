//! Enveloppe de contrôle (bornes nationales en degrés)

use geo::{BoundingRect, Geometry, Rect};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct Envelope {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl Envelope {
    pub fn is_valid(&self) -> bool {
        self.west < self.east && self.south < self.north
    }

    /// Vrai si le rectangle est entièrement dans l'enveloppe
    pub fn contains(&self, rect: &Rect<f64>) -> bool {
        rect.min().x >= self.west
            && rect.max().x <= self.east
            && rect.min().y >= self.south
            && rect.max().y <= self.north
    }

    /// Une géométrie vide n'est jamais signalée
    pub fn flags(&self, geometry: &Geometry<f64>) -> bool {
        geometry
            .bounding_rect()
            .is_some_and(|rect| !self.contains(&rect))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{point, polygon};

    const TANZANIA: Envelope = Envelope {
        west: 29.34,
        south: -11.75,
        east: 40.44,
        north: -0.95,
    };

    #[test]
    fn test_flags_outside() {
        let dodoma = Geometry::Point(point!(x: 35.74, y: -6.17));
        assert!(!TANZANIA.flags(&dodoma));

        // Coordonnées UTM non reprojetées
        let raw = Geometry::Polygon(polygon![
            (x: 530000.0, y: 9246000.0),
            (x: 530050.0, y: 9246000.0),
            (x: 530050.0, y: 9246050.0),
            (x: 530000.0, y: 9246000.0),
        ]);
        assert!(TANZANIA.flags(&raw));
    }

    #[test]
    fn test_straddling_is_flagged() {
        let border = Geometry::Polygon(polygon![
            (x: 40.40, y: -10.0),
            (x: 40.50, y: -10.0),
            (x: 40.50, y: -9.9),
            (x: 40.40, y: -10.0),
        ]);
        assert!(TANZANIA.flags(&border));
    }

    #[test]
    fn test_validity() {
        assert!(TANZANIA.is_valid());
        let inverted = Envelope {
            west: 40.0,
            east: 30.0,
            ..TANZANIA
        };
        assert!(!inverted.is_valid());
    }
}
