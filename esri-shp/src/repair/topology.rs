//! Gestion de la topologie (trous, multipolygones)

use geo::algorithm::coordinate_position::{CoordPos, CoordinatePosition};
use geo::{Geometry, LineString, MultiPolygon, Polygon, Winding};

use super::ring::ring_area;

/// Assemble les parts d'un enregistrement Polygon
///
/// Convention shapefile : extérieurs en sens horaire, trous en sens anti-horaire. Un
/// fichier sans aucun ring horaire (orientation inversée) est traité par inclusion.
/// Retourne un `Polygon` pour un seul extérieur, un `MultiPolygon` sinon.
pub fn assemble_rings(rings: Vec<LineString>) -> Option<Geometry> {
    let mut shells = Vec::new();
    let mut holes = Vec::new();
    for mut ring in rings.into_iter().filter(|r| r.0.len() >= 3) {
        ring.close();
        if ring.is_cw() {
            shells.push(ring);
        } else {
            holes.push(ring);
        }
    }

    let polygons = if shells.is_empty() {
        organize_by_containment(holes)
    } else {
        organize_rings(shells, holes)
    };
    if polygons.is_empty() {
        None
    } else {
        Some(into_geometry(polygons))
    }
}

fn into_geometry(mut polygons: Vec<Polygon>) -> Geometry {
    if polygons.len() == 1 {
        Geometry::Polygon(polygons.remove(0))
    } else {
        Geometry::MultiPolygon(MultiPolygon::new(polygons))
    }
}

/// Rattache chaque trou au plus petit extérieur qui le contient
///
/// Un trou qu'aucun extérieur ne contient devient un polygone à part entière.
pub fn organize_rings(shells: Vec<LineString>, holes: Vec<LineString>) -> Vec<Polygon> {
    let shell_polygons: Vec<Polygon> = shells
        .iter()
        .map(|s| Polygon::new(s.clone(), vec![]))
        .collect();
    let areas: Vec<f64> = shells.iter().map(ring_area).collect();
    let mut interiors: Vec<Vec<LineString>> = vec![Vec::new(); shells.len()];
    let mut orphans = Vec::new();

    for hole in holes {
        let owner = shell_polygons
            .iter()
            .enumerate()
            .filter(|(_, shell)| contains_ring(shell, &hole))
            .min_by(|(a, _), (b, _)| areas[*a].total_cmp(&areas[*b]))
            .map(|(i, _)| i);

        match owner {
            Some(i) => interiors[i].push(hole),
            None => {
                tracing::debug!(points = hole.0.len(), "Orphan hole promoted to exterior");
                orphans.push(hole);
            }
        }
    }

    shells
        .into_iter()
        .zip(interiors)
        .map(|(shell, holes)| Polygon::new(shell, holes))
        .chain(orphans.into_iter().map(|r| Polygon::new(r, vec![])))
        .collect()
}

/// Organise des rings sans orientation fiable : un ring contenu dans un autre est un trou
pub fn organize_by_containment(rings: Vec<LineString>) -> Vec<Polygon> {
    let mut order: Vec<usize> = (0..rings.len()).collect();
    // Du plus grand au plus petit : un conteneur est toujours vu avant son contenu
    order.sort_by(|a, b| ring_area(&rings[*b]).total_cmp(&ring_area(&rings[*a])));

    let mut shells: Vec<LineString> = Vec::new();
    let mut holes: Vec<LineString> = Vec::new();
    for i in order {
        let ring = &rings[i];
        let depth = shells
            .iter()
            .chain(holes.iter())
            .filter(|r| contains_ring(&Polygon::new((*r).clone(), vec![]), ring))
            .count();
        // Profondeur paire : extérieur (îlot dans un trou compris)
        if depth % 2 == 0 {
            shells.push(ring.clone());
        } else {
            holes.push(ring.clone());
        }
    }

    organize_rings(shells, holes)
}

/// Vrai si tous les sommets du ring sont dans le polygone (bord compris), et au moins un
/// strictement à l'intérieur
fn contains_ring(polygon: &Polygon, ring: &LineString) -> bool {
    let mut inside = false;
    for c in &ring.0 {
        match polygon.coordinate_position(c) {
            CoordPos::Outside => return false,
            CoordPos::Inside => inside = true,
            CoordPos::OnBoundary => {}
        }
    }
    inside
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(x0: f64, y0: f64, size: f64, clockwise: bool) -> LineString {
        let mut pts = vec![
            (x0, y0),
            (x0 + size, y0),
            (x0 + size, y0 + size),
            (x0, y0 + size),
            (x0, y0),
        ];
        if clockwise {
            pts.reverse();
        }
        LineString::from(pts)
    }

    #[test]
    fn test_single_shell() {
        let geom = assemble_rings(vec![square(0.0, 0.0, 1.0, true)]).unwrap();
        assert!(matches!(geom, Geometry::Polygon(_)));
    }

    #[test]
    fn test_shell_with_hole() {
        let geom = assemble_rings(vec![square(0.0, 0.0, 4.0, true), square(1.0, 1.0, 1.0, false)]).unwrap();
        let Geometry::Polygon(p) = geom else {
            panic!("expected polygon");
        };
        assert_eq!(p.interiors().len(), 1);
    }

    #[test]
    fn test_two_shells() {
        let geom = assemble_rings(vec![square(0.0, 0.0, 1.0, true), square(5.0, 5.0, 1.0, true)]).unwrap();
        let Geometry::MultiPolygon(mp) = geom else {
            panic!("expected multipolygon");
        };
        assert_eq!(mp.0.len(), 2);
    }

    #[test]
    fn test_reversed_orientation_uses_containment() {
        // Tous les rings en sens anti-horaire
        let geom = assemble_rings(vec![square(0.0, 0.0, 4.0, false), square(1.0, 1.0, 1.0, false)]).unwrap();
        let Geometry::Polygon(p) = geom else {
            panic!("expected polygon");
        };
        assert_eq!(p.interiors().len(), 1);
    }

    #[test]
    fn test_degenerate_parts_ignored() {
        let short = LineString::from(vec![(0.0, 0.0), (1.0, 1.0)]);
        assert!(assemble_rings(vec![short]).is_none());
    }
}
