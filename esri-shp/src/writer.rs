//! Écriture minimale de shapefiles polygonaux
//!
//! Sert à produire des jeux de contrôle (tests, benchmarks, démonstrations) : un fichier
//! .shp de type Polygon, son index .shx, la table .dbf et, en option, .prj et .cpg.

use std::fs;
use std::path::{Path, PathBuf};

use encoding_rs::Encoding;
use geo::{BoundingRect, Coord, LineString, MultiPolygon, Point, Rect, Winding};

use crate::parser::shp::HEADER_LEN;
use crate::types::{FieldDef, FieldType, FieldValue, ShapeType};
use crate::ShpError;

/// Géométrie d'un enregistrement à écrire
#[derive(Debug, Clone)]
pub enum Shape {
    Null,
    /// Écrit tel quel, extérieurs réorientés en sens horaire et trous en sens anti-horaire
    Polygon(MultiPolygon),
    /// Rings bruts, sans réorientation (permet d'écrire des géométries invalides)
    Rings(Vec<LineString>),
    Point(Point),
}

/// Un enregistrement : géométrie et valeurs dans l'ordre des champs
#[derive(Debug, Clone)]
pub struct Record {
    pub shape: Shape,
    pub values: Vec<FieldValue>,
}

/// Options des fichiers annexes
#[derive(Debug, Clone, Default)]
pub struct Sidecars<'a> {
    pub prj: Option<&'a str>,
    pub cpg: Option<&'a str>,
}

/// Écrit `<base>.shp`, `.shx`, `.dbf` (et `.prj`/`.cpg` si fournis), retourne le chemin du .shp
pub fn write(
    base: &Path,
    fields: &[FieldDef],
    records: &[Record],
    sidecars: Sidecars<'_>,
) -> Result<PathBuf, ShpError> {
    let encoding = sidecars
        .cpg
        .and_then(crate::parser::cpg::encoding_for_cpg)
        .unwrap_or(encoding_rs::UTF_8);

    let contents: Vec<Vec<u8>> = records.iter().map(|r| encode_shape(&r.shape)).collect();
    let extent = records
        .iter()
        .filter_map(|r| shape_bbox(&r.shape))
        .reduce(|a, b| {
            Rect::new(
                Coord {
                    x: a.min().x.min(b.min().x),
                    y: a.min().y.min(b.min().y),
                },
                Coord {
                    x: a.max().x.max(b.max().x),
                    y: a.max().y.max(b.max().y),
                },
            )
        });

    let shp_len = HEADER_LEN + contents.iter().map(|c| 8 + c.len()).sum::<usize>();
    let shx_len = HEADER_LEN + contents.len() * 8;

    let mut shp = file_header(shp_len, extent);
    let mut shx = file_header(shx_len, extent);
    for (i, content) in contents.iter().enumerate() {
        let offset_words = (shp.len() / 2) as i32;
        let length_words = (content.len() / 2) as i32;
        shx.extend_from_slice(&offset_words.to_be_bytes());
        shx.extend_from_slice(&length_words.to_be_bytes());
        shp.extend_from_slice(&(i as i32 + 1).to_be_bytes());
        shp.extend_from_slice(&length_words.to_be_bytes());
        shp.extend_from_slice(content);
    }

    let shp_path = base.with_extension("shp");
    fs::write(&shp_path, shp)?;
    fs::write(base.with_extension("shx"), shx)?;
    fs::write(base.with_extension("dbf"), encode_dbf(fields, records, encoding))?;
    if let Some(prj) = sidecars.prj {
        fs::write(base.with_extension("prj"), prj)?;
    }
    if let Some(cpg) = sidecars.cpg {
        fs::write(base.with_extension("cpg"), cpg)?;
    }

    Ok(shp_path)
}

fn file_header(total_len: usize, extent: Option<Rect<f64>>) -> Vec<u8> {
    let mut h = vec![0u8; HEADER_LEN];
    h[0..4].copy_from_slice(&9994i32.to_be_bytes());
    h[24..28].copy_from_slice(&((total_len / 2) as i32).to_be_bytes());
    h[28..32].copy_from_slice(&1000i32.to_le_bytes());
    h[32..36].copy_from_slice(&ShapeType::Polygon.code().to_le_bytes());
    if let Some(r) = extent {
        put_bbox(&mut h[36..68], r);
    }
    h
}

fn put_bbox(out: &mut [u8], r: Rect<f64>) {
    for (i, v) in [r.min().x, r.min().y, r.max().x, r.max().y].iter().enumerate() {
        out[i * 8..i * 8 + 8].copy_from_slice(&v.to_le_bytes());
    }
}

fn shape_bbox(shape: &Shape) -> Option<Rect<f64>> {
    match shape {
        Shape::Null => None,
        Shape::Polygon(mp) => mp.bounding_rect(),
        Shape::Rings(rings) => MultiPolygon::new(
            rings
                .iter()
                .map(|r| geo::Polygon::new(r.clone(), vec![]))
                .collect(),
        )
        .bounding_rect(),
        Shape::Point(p) => Some(Rect::new(p.0, p.0)),
    }
}

fn encode_shape(shape: &Shape) -> Vec<u8> {
    match shape {
        Shape::Null => ShapeType::Null.code().to_le_bytes().to_vec(),
        Shape::Point(p) => {
            let mut out = ShapeType::Point.code().to_le_bytes().to_vec();
            out.extend_from_slice(&p.x().to_le_bytes());
            out.extend_from_slice(&p.y().to_le_bytes());
            out
        }
        Shape::Polygon(mp) => {
            let mut rings = Vec::new();
            for polygon in &mp.0 {
                let mut exterior = polygon.exterior().clone();
                exterior.make_cw_winding();
                rings.push(exterior);
                for hole in polygon.interiors() {
                    let mut hole = hole.clone();
                    hole.make_ccw_winding();
                    rings.push(hole);
                }
            }
            encode_rings(&rings, shape_bbox(shape))
        }
        Shape::Rings(rings) => encode_rings(rings, shape_bbox(shape)),
    }
}

fn encode_rings(rings: &[LineString], bbox: Option<Rect<f64>>) -> Vec<u8> {
    let num_points: usize = rings.iter().map(|r| r.0.len()).sum();
    let mut out = ShapeType::Polygon.code().to_le_bytes().to_vec();
    let mut bbox_bytes = [0u8; 32];
    if let Some(r) = bbox {
        put_bbox(&mut bbox_bytes, r);
    }
    out.extend_from_slice(&bbox_bytes);
    out.extend_from_slice(&(rings.len() as i32).to_le_bytes());
    out.extend_from_slice(&(num_points as i32).to_le_bytes());
    let mut start = 0i32;
    for r in rings {
        out.extend_from_slice(&start.to_le_bytes());
        start += r.0.len() as i32;
    }
    for c in rings.iter().flat_map(|r| r.0.iter()) {
        out.extend_from_slice(&c.x.to_le_bytes());
        out.extend_from_slice(&c.y.to_le_bytes());
    }
    out
}

fn encode_dbf(fields: &[FieldDef], records: &[Record], encoding: &'static Encoding) -> Vec<u8> {
    let header_len = 32 + fields.len() * 32 + 1;
    let record_len = 1 + fields.iter().map(|f| f.length as usize).sum::<usize>();

    let mut out = vec![0u8; 32];
    out[0] = 0x03;
    out[4..8].copy_from_slice(&(records.len() as u32).to_le_bytes());
    out[8..10].copy_from_slice(&(header_len as u16).to_le_bytes());
    out[10..12].copy_from_slice(&(record_len as u16).to_le_bytes());
    for field in fields {
        let mut desc = [0u8; 32];
        let name = field.name.as_bytes();
        let n = name.len().min(10);
        desc[..n].copy_from_slice(&name[..n]);
        desc[11] = match field.field_type {
            FieldType::Character => b'C',
            FieldType::Numeric => b'N',
            FieldType::Float => b'F',
            FieldType::Logical => b'L',
            FieldType::Date => b'D',
            FieldType::Integer => b'I',
            FieldType::Memo => b'M',
            FieldType::Other(b) => b,
        };
        desc[16] = field.length;
        desc[17] = field.decimals;
        out.extend_from_slice(&desc);
    }
    out.push(0x0D);

    for record in records {
        out.push(b' ');
        for (i, field) in fields.iter().enumerate() {
            let value = record.values.get(i).unwrap_or(&FieldValue::Null);
            out.extend_from_slice(&encode_cell(field, value, encoding));
        }
    }
    out.push(0x1A);
    out
}

fn encode_cell(field: &FieldDef, value: &FieldValue, encoding: &'static Encoding) -> Vec<u8> {
    let width = field.length as usize;
    let prec = field.decimals as usize;
    let mut cell = match (field.field_type, value) {
        (_, FieldValue::Null) => Vec::new(),
        (FieldType::Integer, FieldValue::Integer(i)) => (*i as i32).to_le_bytes().to_vec(),
        (_, FieldValue::Integer(i)) => format!("{i:>width$}").into_bytes(),
        (_, FieldValue::Number(n)) => format!("{n:>width$.prec$}").into_bytes(),
        (_, FieldValue::Logical(b)) => vec![if *b { b'T' } else { b'F' }],
        (_, FieldValue::Date(d)) => d.replace('-', "").into_bytes(),
        (_, FieldValue::Text(s)) => encoding.encode(s).0.into_owned(),
    };
    cell.resize(width, b' ');
    cell
}
