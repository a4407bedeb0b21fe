//! Contrôle de validité topologique (règles OGC simplifiées)
//!
//! Rings simples et fermés, trous à l'intérieur de leur extérieur, composantes d'un
//! multipolygone disjointes (contact ponctuel toléré).

use geo::algorithm::coordinate_position::{CoordPos, CoordinatePosition};
use geo::algorithm::line_intersection::{line_intersection, LineIntersection};
use geo::{BoundingRect, Intersects, Line, LineString, MultiPolygon, Polygon};

use super::ring::{coords_equal, is_degenerate};

/// Vérifie un multipolygone ; l'erreur décrit la première violation rencontrée
pub fn check_multipolygon(mp: &MultiPolygon) -> Result<(), String> {
    if mp.0.is_empty() {
        return Err("empty multipolygon".into());
    }
    for (i, polygon) in mp.0.iter().enumerate() {
        check_polygon(polygon).map_err(|e| format!("polygon {i}: {e}"))?;
    }

    for i in 0..mp.0.len() {
        for j in (i + 1)..mp.0.len() {
            let (a, b) = (&mp.0[i], &mp.0[j]);
            if !bboxes_intersect(a, b) {
                continue;
            }
            if rings_cross(a.exterior(), b.exterior()) {
                return Err(format!("polygons {i} and {j} overlap"));
            }
            let a_in_b = a
                .exterior()
                .0
                .iter()
                .any(|c| b.coordinate_position(c) == CoordPos::Inside);
            let b_in_a = b
                .exterior()
                .0
                .iter()
                .any(|c| a.coordinate_position(c) == CoordPos::Inside);
            if a_in_b || b_in_a {
                return Err(format!("polygons {i} and {j} overlap"));
            }
        }
    }
    Ok(())
}

pub fn is_valid(mp: &MultiPolygon) -> bool {
    check_multipolygon(mp).is_ok()
}

/// Vérifie un polygone : extérieur et trous simples, trous contenus dans l'extérieur
pub fn check_polygon(polygon: &Polygon) -> Result<(), String> {
    check_ring(polygon.exterior()).map_err(|e| format!("exterior {e}"))?;

    let shell = Polygon::new(polygon.exterior().clone(), vec![]);
    for (h, hole) in polygon.interiors().iter().enumerate() {
        check_ring(hole).map_err(|e| format!("hole {h} {e}"))?;
        if rings_cross(polygon.exterior(), hole) {
            return Err(format!("hole {h} crosses exterior"));
        }
        if hole
            .0
            .iter()
            .any(|c| shell.coordinate_position(c) == CoordPos::Outside)
        {
            return Err(format!("hole {h} lies outside exterior"));
        }
        for (k, other) in polygon.interiors().iter().enumerate().skip(h + 1) {
            if rings_cross(hole, other) {
                return Err(format!("holes {h} and {k} cross"));
            }
        }
    }
    Ok(())
}

/// Vérifie qu'un ring est fermé, non dégénéré et sans auto-intersection
pub fn check_ring(ring: &LineString) -> Result<(), String> {
    let coords = &ring.0;
    if coords.iter().any(|c| !c.x.is_finite() || !c.y.is_finite()) {
        return Err("has non-finite coordinates".into());
    }
    if coords.len() < 4 {
        return Err(format!("has {} points, at least 4 required", coords.len()));
    }
    if !coords_equal(coords[0], coords[coords.len() - 1]) {
        return Err("is not closed".into());
    }

    let segments: Vec<Line> = ring.lines().filter(|l| !coords_equal(l.start, l.end)).collect();
    let n = segments.len();
    for i in 0..n {
        for j in (i + 1)..n {
            let adjacent = j == i + 1 || (i == 0 && j == n - 1);
            match line_intersection(segments[i], segments[j]) {
                None => {}
                // Deux segments consécutifs se touchent à leur sommet commun
                Some(LineIntersection::SinglePoint { .. }) if adjacent => {}
                Some(LineIntersection::SinglePoint { intersection, .. }) => {
                    return Err(format!(
                        "self-intersects at ({}, {})",
                        intersection.x, intersection.y
                    ));
                }
                Some(LineIntersection::Collinear { intersection }) => {
                    return Err(format!(
                        "has overlapping segments near ({}, {})",
                        intersection.start.x, intersection.start.y
                    ));
                }
            }
        }
    }

    if is_degenerate(ring) {
        return Err("has zero area".into());
    }
    Ok(())
}

/// Vrai si deux rings se croisent ou se recouvrent le long d'un segment
///
/// Un contact en un point isolé n'est pas considéré comme un croisement.
fn rings_cross(a: &LineString, b: &LineString) -> bool {
    if !a.intersects(b) {
        return false;
    }
    for sa in a.lines() {
        for sb in b.lines() {
            match line_intersection(sa, sb) {
                Some(LineIntersection::SinglePoint { is_proper: true, .. }) => return true,
                Some(LineIntersection::Collinear { intersection })
                    if !coords_equal(intersection.start, intersection.end) =>
                {
                    return true
                }
                _ => {}
            }
        }
    }
    false
}

fn bboxes_intersect(a: &Polygon, b: &Polygon) -> bool {
    match (a.bounding_rect(), b.bounding_rect()) {
        (Some(ra), Some(rb)) => ra.intersects(&rb),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;

    #[test]
    fn test_valid_square() {
        let p = polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0), (x: 0.0, y: 1.0), (x: 0.0, y: 0.0)];
        assert!(is_valid(&MultiPolygon::new(vec![p])));
    }

    #[test]
    fn test_bowtie_invalid() {
        let p = polygon![(x: 0.0, y: 0.0), (x: 2.0, y: 2.0), (x: 2.0, y: 0.0), (x: 0.0, y: 2.0), (x: 0.0, y: 0.0)];
        let err = check_polygon(&p).unwrap_err();
        assert!(err.contains("self-intersects"), "{err}");
    }

    #[test]
    fn test_hole_outside_invalid() {
        let p = Polygon::new(
            LineString::from(vec![(0.0, 0.0), (4.0, 0.0), (4.0, 4.0), (0.0, 4.0), (0.0, 0.0)]),
            vec![LineString::from(vec![(5.0, 5.0), (6.0, 5.0), (6.0, 6.0), (5.0, 6.0), (5.0, 5.0)])],
        );
        assert!(check_polygon(&p).is_err());

        let ok = Polygon::new(
            LineString::from(vec![(0.0, 0.0), (4.0, 0.0), (4.0, 4.0), (0.0, 4.0), (0.0, 0.0)]),
            vec![LineString::from(vec![(1.0, 1.0), (1.0, 2.0), (2.0, 2.0), (2.0, 1.0), (1.0, 1.0)])],
        );
        assert!(check_polygon(&ok).is_ok());
    }

    #[test]
    fn test_overlapping_parts_invalid() {
        let a = polygon![(x: 0.0, y: 0.0), (x: 2.0, y: 0.0), (x: 2.0, y: 2.0), (x: 0.0, y: 2.0), (x: 0.0, y: 0.0)];
        let b = polygon![(x: 1.0, y: 1.0), (x: 3.0, y: 1.0), (x: 3.0, y: 3.0), (x: 1.0, y: 3.0), (x: 1.0, y: 1.0)];
        assert!(!is_valid(&MultiPolygon::new(vec![a.clone(), b])));

        // Contact en un seul sommet : valide
        let c = polygon![(x: 2.0, y: 2.0), (x: 3.0, y: 2.0), (x: 3.0, y: 3.0), (x: 2.0, y: 3.0), (x: 2.0, y: 2.0)];
        assert!(is_valid(&MultiPolygon::new(vec![a, c])));
    }
}
