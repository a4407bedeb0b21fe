//! Découpage des rings auto-intersectés en boucles simples
//!
//! Équivalent d'un `buffer(0)` pour le cas courant des parcelles numérisées à la main :
//! papillons, boucles et épines. Chaque intersection est insérée comme sommet, puis le
//! ring est parcouru en détachant une boucle à chaque sommet revisité.

use geo::algorithm::line_intersection::{line_intersection, LineIntersection};
use geo::{Coord, Line, LineString};

use super::ring::{coords_equal, is_degenerate};

/// Découpe un ring fermé en boucles simples ; les boucles sans surface (épines) sont
/// supprimées.
pub fn split_ring(ring: &LineString) -> Vec<LineString> {
    let noded = node_ring(&ring.0);
    extract_loops(&noded)
}

/// Insère les points d'intersection entre segments comme sommets du ring
fn node_ring(coords: &[Coord]) -> Vec<Coord> {
    if coords.len() < 2 {
        return coords.to_vec();
    }

    let segments: Vec<Line> = coords.windows(2).map(|w| Line::new(w[0], w[1])).collect();
    let mut splits: Vec<Vec<Coord>> = vec![Vec::new(); segments.len()];

    // Chaque paire n'est calculée qu'une fois : le même point est inséré des deux côtés
    for i in 0..segments.len() {
        for j in (i + 1)..segments.len() {
            let Some(hit) = line_intersection(segments[i], segments[j]) else {
                continue;
            };
            let points = match hit {
                LineIntersection::SinglePoint { intersection, .. } => vec![intersection],
                LineIntersection::Collinear { intersection } => {
                    vec![intersection.start, intersection.end]
                }
            };
            for p in points {
                for k in [i, j] {
                    let seg = segments[k];
                    if !coords_equal(p, seg.start) && !coords_equal(p, seg.end) {
                        splits[k].push(p);
                    }
                }
            }
        }
    }

    let mut out = Vec::with_capacity(coords.len() * 2);
    for (seg, mut extra) in segments.iter().zip(splits) {
        out.push(seg.start);
        extra.sort_by(|a, b| param(seg, *a).total_cmp(&param(seg, *b)));
        extra.dedup_by(|a, b| coords_equal(*a, *b));
        out.extend(extra);
    }
    out.push(coords[coords.len() - 1]);
    out
}

/// Position relative d'un point le long d'un segment
fn param(seg: &Line, p: Coord) -> f64 {
    let d = seg.delta();
    let len2 = d.x * d.x + d.y * d.y;
    if len2 == 0.0 {
        return 0.0;
    }
    ((p.x - seg.start.x) * d.x + (p.y - seg.start.y) * d.y) / len2
}

/// Parcourt le ring et détache une boucle chaque fois qu'un sommet est revisité
fn extract_loops(coords: &[Coord]) -> Vec<LineString> {
    let mut loops = Vec::new();
    let mut path: Vec<Coord> = Vec::with_capacity(coords.len());

    for &c in coords {
        match path.iter().position(|p| coords_equal(*p, c)) {
            Some(start) => {
                let mut closed = path[start..].to_vec();
                closed.push(c);
                path.truncate(start + 1);
                let ring = LineString::new(closed);
                if !is_degenerate(&ring) {
                    loops.push(ring);
                }
            }
            None => path.push(c),
        }
    }

    loops
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repair::ring::ring_area;

    fn ls(points: &[(f64, f64)]) -> LineString {
        LineString::from(points.to_vec())
    }

    #[test]
    fn test_simple_ring_untouched() {
        let ring = ls(&[(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0), (0.0, 0.0)]);
        let loops = split_ring(&ring);
        assert_eq!(loops.len(), 1);
        assert_eq!(loops[0].0.len(), 5);
    }

    #[test]
    fn test_bowtie_splits_in_two() {
        let ring = ls(&[(0.0, 0.0), (2.0, 2.0), (2.0, 0.0), (0.0, 2.0), (0.0, 0.0)]);
        let loops = split_ring(&ring);
        assert_eq!(loops.len(), 2);
        for l in &loops {
            assert!((ring_area(l) - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_spike_removed() {
        // Épine (1,1) -> (1,3) -> (1,1) sur le bord supérieur
        let ring = ls(&[
            (0.0, 0.0),
            (2.0, 0.0),
            (2.0, 1.0),
            (1.0, 1.0),
            (1.0, 3.0),
            (1.0, 1.0),
            (0.0, 1.0),
            (0.0, 0.0),
        ]);
        let loops = split_ring(&ring);
        assert_eq!(loops.len(), 1);
        assert!((ring_area(&loops[0]) - 2.0).abs() < 1e-9);
    }
}
