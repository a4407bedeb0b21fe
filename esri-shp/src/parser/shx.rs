//! Parser pour les fichiers SHX (index des enregistrements)

use super::shp::{read_i32_be, HEADER_LEN};
use crate::ShpError;

/// Entrée d'index : position et longueur d'un enregistrement du .shp, en octets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    pub offset: usize,
    pub content_length: usize,
}

/// Parse un fichier .shx et retourne les entrées d'index dans l'ordre des enregistrements
pub fn parse(data: &[u8]) -> Result<Vec<IndexEntry>, ShpError> {
    if data.len() < HEADER_LEN {
        return Err(ShpError::invalid_header(
            "shx",
            format!("file too short ({} bytes)", data.len()),
        ));
    }

    let body = &data[HEADER_LEN..];
    if body.len() % 8 != 0 {
        tracing::warn!(
            trailing = body.len() % 8,
            "SHX body is not a multiple of 8 bytes, ignoring trailing bytes"
        );
    }

    body.chunks_exact(8)
        .enumerate()
        .map(|(i, chunk)| {
            let offset = read_i32_be(chunk, 0).unwrap_or(-1);
            let length = read_i32_be(chunk, 4).unwrap_or(-1);
            if offset < 0 || length < 0 {
                return Err(ShpError::parse_error(
                    "shx",
                    format!("negative offset/length in entry {i}"),
                ));
            }
            Ok(IndexEntry {
                offset: offset as usize * 2,
                content_length: length as usize * 2,
            })
        })
        .collect()
}

/// Nombre d'enregistrements annoncé par un .shx, sans le parser entièrement
pub fn record_count(data: &[u8]) -> usize {
    data.len().saturating_sub(HEADER_LEN) / 8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_entries() {
        let mut data = vec![0u8; HEADER_LEN];
        for (offset, len) in [(50i32, 4i32), (58, 68)] {
            data.extend_from_slice(&offset.to_be_bytes());
            data.extend_from_slice(&len.to_be_bytes());
        }

        let entries = parse(&data).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(
            entries[0],
            IndexEntry {
                offset: 100,
                content_length: 8
            }
        );
        assert_eq!(entries[1].offset, 116);
        assert_eq!(record_count(&data), 2);
    }

    #[test]
    fn test_short_file() {
        assert!(parse(&[0u8; 20]).is_err());
        assert_eq!(record_count(&[0u8; 20]), 0);
    }
}
