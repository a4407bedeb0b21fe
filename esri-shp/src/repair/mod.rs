//! Normalisation et réparation des géométries polygonales
//!
//! Toute géométrie acceptée sort en `MultiPolygon` valide. Les géométries invalides sont
//! réparées (nettoyage des rings, découpage des auto-intersections, réaffectation des
//! trous) ; celles qui restent invalides sont rejetées.

pub mod ring;
pub mod split;
pub mod topology;
pub mod validity;

use geo::algorithm::orient::{Direction, Orient};
use geo::{Area, BooleanOps, Geometry, LineString, MultiPolygon, Polygon};

use crate::FeatureError;

pub use validity::{check_multipolygon, is_valid};

/// Géométrie normalisée prête pour le staging
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub geometry: MultiPolygon,
    /// Vrai si la géométrie d'origine était invalide et a été réparée
    pub repaired: bool,
}

/// Promeut une géométrie surfacique en `MultiPolygon`
pub fn promote(geometry: Geometry, index: usize) -> Result<MultiPolygon, FeatureError> {
    match geometry {
        Geometry::Polygon(p) => Ok(MultiPolygon::new(vec![p])),
        Geometry::MultiPolygon(mp) => Ok(mp),
        Geometry::Rect(r) => Ok(MultiPolygon::new(vec![r.to_polygon()])),
        Geometry::Triangle(t) => Ok(MultiPolygon::new(vec![t.to_polygon()])),
        Geometry::GeometryCollection(gc) => {
            let mut polygons = Vec::new();
            for g in gc.0 {
                polygons.extend(promote(g, index)?.0);
            }
            Ok(MultiPolygon::new(polygons))
        }
        other => Err(FeatureError::Unsupported {
            index,
            kind: geometry_kind(&other),
        }),
    }
}

/// Normalise la géométrie d'une feature : promotion, contrôle de validité, réparation
pub fn normalize(geometry: Option<Geometry>, index: usize) -> Result<Normalized, FeatureError> {
    let geometry = geometry.ok_or(FeatureError::Empty { index })?;
    let mp = promote(geometry, index)?;
    if mp.0.is_empty() {
        return Err(FeatureError::Empty { index });
    }

    let reason = match check_multipolygon(&mp) {
        Ok(()) => {
            return Ok(Normalized {
                geometry: mp,
                repaired: false,
            })
        }
        Err(reason) => reason,
    };

    let repaired = make_valid(&mp).ok_or_else(|| FeatureError::Unrepairable {
        index,
        reason: reason.clone(),
    })?;

    match check_multipolygon(&repaired) {
        Ok(()) => {
            tracing::debug!(index, %reason, "Geometry repaired");
            Ok(Normalized {
                geometry: repaired,
                repaired: true,
            })
        }
        Err(after) => Err(FeatureError::Unrepairable {
            index,
            reason: format!("{reason}; after repair: {after}"),
        }),
    }
}

/// Réparation équivalente à un tampon de largeur nulle
///
/// Les rings sont nettoyés et découpés en boucles simples. Les extérieurs qui se
/// recouvrent sont fusionnés (union), puis chaque trou est soustrait de la surface
/// (différence), qu'il soit contenu dans son extérieur ou qu'il le traverse. Un trou
/// hors de toute surface disparaît. Retourne `None` si aucune surface ne subsiste.
pub fn make_valid(mp: &MultiPolygon) -> Option<MultiPolygon> {
    let mut shells = Vec::new();
    let mut holes = Vec::new();

    for polygon in &mp.0 {
        if let Some(exterior) = ring::clean_ring(polygon.exterior()) {
            shells.extend(split::split_ring(&exterior));
        }
        for interior in polygon.interiors() {
            if let Some(hole) = ring::clean_ring(interior) {
                holes.extend(split::split_ring(&hole));
            }
        }
    }

    if shells.is_empty() {
        return None;
    }

    let mut surface = MultiPolygon::new(merge_shells(shells));
    for hole in holes {
        let cut = MultiPolygon::new(vec![Polygon::new(hole, vec![]).orient(Direction::Default)]);
        if surface.intersection(&cut).unsigned_area() > 0.0 {
            surface = surface.difference(&cut);
        }
    }

    surface.0.retain(|p| p.unsigned_area() > 0.0);
    (!surface.0.is_empty()).then_some(surface)
}

/// Fusionne les extérieurs dont les surfaces se recouvrent
///
/// Deux boucles qui ne partagent qu'un sommet (papillon) restent deux polygones.
fn merge_shells(shells: Vec<LineString>) -> Vec<Polygon> {
    let mut merged: Vec<Polygon> = Vec::with_capacity(shells.len());

    for shell in shells {
        let mut current = MultiPolygon::new(vec![Polygon::new(shell, vec![]).orient(Direction::Default)]);
        // L'union peut atteindre un polygone déjà écarté : on recommence jusqu'à stabilité
        while let Some(i) = merged.iter().position(|other| overlaps(&current, other)) {
            let other = merged.swap_remove(i);
            current = current.union(&MultiPolygon::new(vec![other]));
        }
        merged.extend(current.0);
    }

    merged
}

fn overlaps(surface: &MultiPolygon, polygon: &Polygon) -> bool {
    surface
        .intersection(&MultiPolygon::new(vec![polygon.clone()]))
        .unsigned_area()
        > 0.0
}

fn geometry_kind(geometry: &Geometry) -> &'static str {
    match geometry {
        Geometry::Point(_) => "Point",
        Geometry::Line(_) => "Line",
        Geometry::LineString(_) => "LineString",
        Geometry::Polygon(_) => "Polygon",
        Geometry::MultiPoint(_) => "MultiPoint",
        Geometry::MultiLineString(_) => "MultiLineString",
        Geometry::MultiPolygon(_) => "MultiPolygon",
        Geometry::GeometryCollection(_) => "GeometryCollection",
        Geometry::Rect(_) => "Rect",
        Geometry::Triangle(_) => "Triangle",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{polygon, Area, LineString, Point};

    #[test]
    fn test_polygon_promoted() {
        let p = polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0), (x: 0.0, y: 0.0)];
        let n = normalize(Some(Geometry::Polygon(p)), 0).unwrap();
        assert_eq!(n.geometry.0.len(), 1);
        assert!(!n.repaired);
    }

    #[test]
    fn test_unsupported_and_empty() {
        let err = normalize(Some(Geometry::Point(Point::new(1.0, 2.0))), 7).unwrap_err();
        assert_eq!(err, FeatureError::Unsupported { index: 7, kind: "Point" });

        assert_eq!(normalize(None, 2).unwrap_err(), FeatureError::Empty { index: 2 });
        let empty = Geometry::MultiPolygon(MultiPolygon::new(vec![]));
        assert_eq!(normalize(Some(empty), 3).unwrap_err(), FeatureError::Empty { index: 3 });
    }

    #[test]
    fn test_bowtie_repaired() {
        let bowtie = polygon![(x: 0.0, y: 0.0), (x: 2.0, y: 2.0), (x: 2.0, y: 0.0), (x: 0.0, y: 2.0), (x: 0.0, y: 0.0)];
        let n = normalize(Some(Geometry::Polygon(bowtie)), 0).unwrap();
        assert!(n.repaired);
        assert_eq!(n.geometry.0.len(), 2);
        assert!((n.geometry.unsigned_area() - 2.0).abs() < 1e-9);
        assert!(is_valid(&n.geometry));
    }

    fn square(x0: f64, y0: f64, size: f64) -> Polygon {
        polygon![
            (x: x0, y: y0),
            (x: x0 + size, y: y0),
            (x: x0 + size, y: y0 + size),
            (x: x0, y: y0 + size),
            (x: x0, y: y0),
        ]
    }

    #[test]
    fn test_overlapping_parts_merged() {
        let mp = MultiPolygon::new(vec![square(0.0, 0.0, 2.0), square(1.0, 1.0, 2.0)]);
        let n = normalize(Some(Geometry::MultiPolygon(mp)), 0).unwrap();
        assert!(n.repaired);
        assert_eq!(n.geometry.0.len(), 1);
        assert!((n.geometry.unsigned_area() - 7.0).abs() < 1e-9);
        assert!(is_valid(&n.geometry));
    }

    #[test]
    fn test_overlap_chain_merged() {
        // Le troisième carré relie les deux premiers, disjoints entre eux
        let mp = MultiPolygon::new(vec![
            square(0.0, 0.0, 2.0),
            square(3.0, 0.0, 2.0),
            square(1.0, 0.5, 3.0),
        ]);
        let n = normalize(Some(Geometry::MultiPolygon(mp)), 0).unwrap();
        assert_eq!(n.geometry.0.len(), 1);
        assert!(is_valid(&n.geometry));
    }

    #[test]
    fn test_hole_crossing_exterior_subtracted() {
        let hole = LineString::from(vec![(3.0, 1.0), (5.0, 1.0), (5.0, 2.0), (3.0, 2.0), (3.0, 1.0)]);
        let p = Polygon::new(square(0.0, 0.0, 4.0).exterior().clone(), vec![hole]);
        let n = normalize(Some(Geometry::Polygon(p)), 0).unwrap();
        assert!(n.repaired);
        assert_eq!(n.geometry.0.len(), 1);
        assert!((n.geometry.unsigned_area() - 15.0).abs() < 1e-9);
        assert!(is_valid(&n.geometry));
    }

    #[test]
    fn test_hole_outside_exterior_dropped() {
        let hole = square(10.0, 10.0, 1.0).exterior().clone();
        let p = Polygon::new(square(0.0, 0.0, 4.0).exterior().clone(), vec![hole]);
        let n = normalize(Some(Geometry::Polygon(p)), 0).unwrap();
        assert!(n.repaired);
        assert!((n.geometry.unsigned_area() - 16.0).abs() < 1e-9);
        assert!(n.geometry.0[0].interiors().is_empty());
    }

    #[test]
    fn test_collapsed_polygon_unrepairable() {
        let flat = Polygon::new(
            LineString::from(vec![(0.0, 0.0), (1.0, 0.0), (2.0, 0.0), (0.0, 0.0)]),
            vec![],
        );
        let err = normalize(Some(Geometry::Polygon(flat)), 4).unwrap_err();
        assert!(matches!(err, FeatureError::Unrepairable { index: 4, .. }));
    }
}
