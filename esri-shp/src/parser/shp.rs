//! Parser pour les fichiers SHP (géométries)
//!
//! En-tête de 100 octets (mots big-endian pour le code et la longueur, little-endian pour
//! le reste), puis des enregistrements `[numéro BE][longueur BE en mots de 16 bits][contenu]`.

use geo::{Coord, Geometry, LineString, MultiLineString, MultiPoint, Point, Rect};

use crate::repair::topology::assemble_rings;
use crate::types::{ShapeType, ShpHeader};
use crate::{FeatureError, ShpError};

pub const HEADER_LEN: usize = 100;
const FILE_CODE: i32 = 9994;
const RECORD_HEADER_LEN: usize = 8;

/// Parse l'en-tête d'un fichier .shp
pub fn parse_header(data: &[u8]) -> Result<ShpHeader, ShpError> {
    if data.len() < HEADER_LEN {
        return Err(ShpError::invalid_header(
            "shp",
            format!("file too short ({} bytes)", data.len()),
        ));
    }

    let code = read_i32_be(data, 0).unwrap_or_default();
    if code != FILE_CODE {
        return Err(ShpError::invalid_header(
            "shp",
            format!("bad file code {code}, expected {FILE_CODE}"),
        ));
    }

    // Longueur exprimée en mots de 16 bits
    let file_length = read_i32_be(data, 24).unwrap_or_default().max(0) as usize * 2;

    let type_code = read_i32_le(data, 32).unwrap_or_default();
    let shape_type = ShapeType::from_code(type_code).ok_or_else(|| {
        ShpError::invalid_header("shp", format!("unknown shape type {type_code}"))
    })?;

    let extent = read_bbox(data, 36).filter(|r| {
        r.min().x.is_finite() && r.min().y.is_finite() && r.max().x.is_finite() && r.max().y.is_finite()
    });

    Ok(ShpHeader {
        shape_type,
        file_length,
        extent,
    })
}

/// Parse l'enregistrement situé à `offset` (octets) dans le fichier .shp
///
/// Retourne `Ok(None)` pour un shape Null.
pub fn parse_record(data: &[u8], offset: usize, index: usize) -> Result<Option<Geometry>, FeatureError> {
    let malformed = |reason: String| FeatureError::Malformed { index, reason };

    let content_words = read_i32_be(data, offset + 4)
        .ok_or_else(|| malformed(format!("record header out of bounds at offset {offset}")))?;
    if content_words < 2 {
        return Err(malformed(format!("content length {content_words} too small")));
    }

    let start = offset + RECORD_HEADER_LEN;
    let end = start + content_words as usize * 2;
    let content = data
        .get(start..end)
        .ok_or_else(|| malformed(format!("content overflows file ({start}..{end})")))?;

    let type_code = read_i32_le(content, 0).unwrap_or_default();
    let shape_type = ShapeType::from_code(type_code)
        .ok_or_else(|| malformed(format!("unknown shape type {type_code}")))?;

    match shape_type {
        ShapeType::Null => Ok(None),
        ShapeType::Point | ShapeType::PointZ | ShapeType::PointM => {
            let coord = read_coord(content, 4).ok_or_else(|| malformed("truncated point".into()))?;
            Ok(Some(Geometry::Point(Point(coord))))
        }
        ShapeType::MultiPoint | ShapeType::MultiPointZ | ShapeType::MultiPointM => {
            let count = read_count(content, 36).ok_or_else(|| malformed("truncated multipoint".into()))?;
            let points = (0..count)
                .map(|i| read_coord(content, 40 + i * 16).map(Point))
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| malformed("multipoint coordinates out of bounds".into()))?;
            Ok(Some(Geometry::MultiPoint(MultiPoint::new(points))))
        }
        ShapeType::PolyLine | ShapeType::PolyLineZ | ShapeType::PolyLineM => {
            let parts = read_parts(content).map_err(malformed)?;
            let lines = parts.into_iter().filter(|l| l.0.len() >= 2).collect::<Vec<_>>();
            Ok(Some(Geometry::MultiLineString(MultiLineString::new(lines))))
        }
        ShapeType::Polygon | ShapeType::PolygonZ | ShapeType::PolygonM => {
            let rings = read_parts(content).map_err(malformed)?;
            Ok(assemble_rings(rings))
        }
        ShapeType::MultiPatch => Err(FeatureError::Unsupported {
            index,
            kind: shape_type.label(),
        }),
    }
}

/// Lit les parts d'un contenu PolyLine/Polygon : box(32) numParts numPoints parts[] points[]
fn read_parts(content: &[u8]) -> Result<Vec<LineString>, String> {
    let num_parts = read_count(content, 36).ok_or("truncated part count")?;
    let num_points = read_count(content, 40).ok_or("truncated point count")?;

    let parts_start = 44;
    let points_start = parts_start + num_parts * 4;
    if content.len() < points_start + num_points * 16 {
        return Err(format!(
            "{num_parts} parts / {num_points} points exceed record length {}",
            content.len()
        ));
    }

    let mut starts = Vec::with_capacity(num_parts + 1);
    for i in 0..num_parts {
        let s = read_count(content, parts_start + i * 4).ok_or("truncated part index")?;
        if s > num_points {
            return Err(format!("part index {s} beyond {num_points} points"));
        }
        starts.push(s);
    }
    starts.push(num_points);

    let mut rings = Vec::with_capacity(num_parts);
    for w in starts.windows(2) {
        let (from, to) = (w[0], w[1]);
        if to < from {
            return Err(format!("part indices not increasing ({from} > {to})"));
        }
        let coords: Vec<Coord> = (from..to)
            .filter_map(|i| read_coord(content, points_start + i * 16))
            .collect();
        rings.push(LineString::new(coords));
    }

    Ok(rings)
}

fn read_bbox(data: &[u8], at: usize) -> Option<Rect<f64>> {
    let min = read_coord(data, at)?;
    let max = read_coord(data, at + 16)?;
    Some(Rect::new(min, max))
}

fn read_coord(data: &[u8], at: usize) -> Option<Coord> {
    Some(Coord {
        x: read_f64_le(data, at)?,
        y: read_f64_le(data, at + 8)?,
    })
}

fn read_count(data: &[u8], at: usize) -> Option<usize> {
    let n = read_i32_le(data, at)?;
    usize::try_from(n).ok()
}

pub(crate) fn read_i32_be(data: &[u8], at: usize) -> Option<i32> {
    data.get(at..at + 4)
        .map(|b| i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
}

pub(crate) fn read_i32_le(data: &[u8], at: usize) -> Option<i32> {
    data.get(at..at + 4)
        .map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

fn read_f64_le(data: &[u8], at: usize) -> Option<f64> {
    let b = data.get(at..at + 8)?;
    let mut buf = [0u8; 8];
    buf.copy_from_slice(b);
    Some(f64::from_le_bytes(buf))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(shape_type: i32) -> Vec<u8> {
        let mut h = vec![0u8; HEADER_LEN];
        h[0..4].copy_from_slice(&FILE_CODE.to_be_bytes());
        h[24..28].copy_from_slice(&50i32.to_be_bytes());
        h[28..32].copy_from_slice(&1000i32.to_le_bytes());
        h[32..36].copy_from_slice(&shape_type.to_le_bytes());
        for (i, v) in [1.0f64, 2.0, 3.0, 4.0].iter().enumerate() {
            h[36 + i * 8..44 + i * 8].copy_from_slice(&v.to_le_bytes());
        }
        h
    }

    #[test]
    fn test_parse_header() {
        let h = parse_header(&header(5)).unwrap();
        assert_eq!(h.shape_type, ShapeType::Polygon);
        assert_eq!(h.file_length, 100);
        let extent = h.extent.unwrap();
        assert_eq!(extent.min(), Coord { x: 1.0, y: 2.0 });
        assert_eq!(extent.max(), Coord { x: 3.0, y: 4.0 });
    }

    #[test]
    fn test_parse_header_rejects_bad_code() {
        let mut h = header(5);
        h[0..4].copy_from_slice(&1234i32.to_be_bytes());
        assert!(matches!(parse_header(&h), Err(ShpError::InvalidHeader { .. })));
        assert!(parse_header(&h[..50]).is_err());
    }

    #[test]
    fn test_parse_null_and_truncated_records() {
        let mut data = header(5);
        // Enregistrement Null : 4 octets de contenu (2 mots)
        data.extend_from_slice(&1i32.to_be_bytes());
        data.extend_from_slice(&2i32.to_be_bytes());
        data.extend_from_slice(&0i32.to_le_bytes());
        assert_eq!(parse_record(&data, HEADER_LEN, 0).unwrap(), None);

        // Longueur annoncée supérieure aux données disponibles
        let mut bad = header(5);
        bad.extend_from_slice(&1i32.to_be_bytes());
        bad.extend_from_slice(&500i32.to_be_bytes());
        bad.extend_from_slice(&5i32.to_le_bytes());
        let err = parse_record(&bad, HEADER_LEN, 3).unwrap_err();
        assert!(matches!(err, FeatureError::Malformed { index: 3, .. }));
    }
}
