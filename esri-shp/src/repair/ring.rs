//! Nettoyage des rings (fermeture, doublons, rings dégénérés)

use geo::{Area, Coord, LineString, Polygon};

/// Tolérance de comparaison des coordonnées (degrés ou mètres selon le SRS)
const TOLERANCE: f64 = 1e-12;

/// Nettoie un ring : supprime les coordonnées non finies et les doublons consécutifs,
/// ferme le ring s'il est ouvert.
///
/// Retourne `None` s'il reste moins de 4 points. L'aire n'est pas contrôlée ici : un ring
/// en papillon a une aire algébrique nulle mais reste réparable.
pub fn clean_ring(ring: &LineString) -> Option<LineString> {
    let mut coords: Vec<Coord> = Vec::with_capacity(ring.0.len() + 1);
    for c in ring.0.iter().filter(|c| c.x.is_finite() && c.y.is_finite()) {
        if coords.last().map_or(true, |last| !coords_equal(*last, *c)) {
            coords.push(*c);
        }
    }

    if coords.len() > 1 && !coords_equal(coords[0], coords[coords.len() - 1]) {
        tracing::debug!(points = coords.len(), "Auto-closing unclosed ring");
        coords.push(coords[0]);
    }

    if coords.len() < 4 {
        None
    } else {
        Some(LineString::new(coords))
    }
}

/// Moins de 4 points ou aire nulle
pub fn is_degenerate(ring: &LineString) -> bool {
    ring.0.len() < 4 || ring_area(ring) == 0.0
}

/// Aire planaire (non signée) délimitée par un ring
pub fn ring_area(ring: &LineString) -> f64 {
    Polygon::new(ring.clone(), vec![]).unsigned_area()
}

/// Compare deux coordonnées avec tolérance
pub fn coords_equal(a: Coord, b: Coord) -> bool {
    (a.x - b.x).abs() <= TOLERANCE && (a.y - b.y).abs() <= TOLERANCE
}
