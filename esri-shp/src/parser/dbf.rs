//! Parser pour les fichiers DBF (table attributaire dBase III/IV)

use encoding_rs::Encoding;
use memchr::memchr;

use crate::types::{FieldDef, FieldType, FieldValue};
use crate::ShpError;

const FIELD_DESCRIPTOR_LEN: usize = 32;
const HEADER_TERMINATOR: u8 = 0x0D;
const DELETED_FLAG: u8 = b'*';

/// En-tête d'une table DBF
#[derive(Debug, Clone)]
pub struct DbfHeader {
    pub record_count: usize,
    pub header_len: usize,
    pub record_len: usize,
    /// Octet "language driver ID" (offset 29)
    pub language_driver: u8,
    pub fields: Vec<FieldDef>,
    /// Offset de chaque champ dans un enregistrement (après l'octet de suppression)
    offsets: Vec<usize>,
}

/// Parse l'en-tête et les descripteurs de champs
///
/// Les noms de champs sont décodés avec `encoding` (ils sont le plus souvent ASCII).
pub fn parse_header(data: &[u8], encoding: &'static Encoding) -> Result<DbfHeader, ShpError> {
    if data.len() < 32 {
        return Err(ShpError::invalid_header(
            "dbf",
            format!("file too short ({} bytes)", data.len()),
        ));
    }

    let record_count = u32::from_le_bytes([data[4], data[5], data[6], data[7]]) as usize;
    let header_len = u16::from_le_bytes([data[8], data[9]]) as usize;
    let record_len = u16::from_le_bytes([data[10], data[11]]) as usize;
    let language_driver = data[29];

    // Les descripteurs s'arrêtent au terminateur 0x0D (testé en tête de descripteur :
    // l'octet peut apparaître comme longueur de champ)
    let descriptors_end = header_len.min(data.len());

    let mut fields = Vec::new();
    let mut offsets = Vec::new();
    let mut offset = 1;
    let mut pos = 32;
    while pos + FIELD_DESCRIPTOR_LEN <= descriptors_end && data[pos] != HEADER_TERMINATOR {
        let desc = &data[pos..pos + FIELD_DESCRIPTOR_LEN];
        let name_end = memchr(0, &desc[..11]).unwrap_or(11);
        let name = decode_text(&desc[..name_end], encoding).trim().to_string();
        let field = FieldDef {
            name,
            field_type: FieldType::from_byte(desc[11]),
            length: desc[16],
            decimals: desc[17],
        };
        offsets.push(offset);
        offset += field.length as usize;
        fields.push(field);
        pos += FIELD_DESCRIPTOR_LEN;
    }

    if offset > record_len {
        return Err(ShpError::invalid_header(
            "dbf",
            format!("field lengths ({offset}) exceed record length ({record_len})"),
        ));
    }

    Ok(DbfHeader {
        record_count,
        header_len,
        record_len,
        language_driver,
        fields,
        offsets,
    })
}

impl DbfHeader {
    /// Lit l'enregistrement `index` ; `None` s'il est hors du fichier
    ///
    /// Les enregistrements marqués supprimés sont retournés comme les autres : le .shp
    /// garde une géométrie à la même position.
    pub fn read_record(
        &self,
        data: &[u8],
        index: usize,
        encoding: &'static Encoding,
    ) -> Option<Vec<(String, FieldValue)>> {
        if index >= self.record_count {
            return None;
        }
        let start = self.header_len + index * self.record_len;
        let record = data.get(start..start + self.record_len)?;
        if record[0] == DELETED_FLAG {
            tracing::debug!(index, "DBF record flagged as deleted");
        }

        let values = self
            .fields
            .iter()
            .zip(&self.offsets)
            .map(|(field, &off)| {
                let raw = record.get(off..off + field.length as usize).unwrap_or(&[]);
                (field.name.clone(), decode_value(field, raw, encoding))
            })
            .collect();

        Some(values)
    }
}

/// Décode une valeur brute selon le type du champ
pub fn decode_value(field: &FieldDef, raw: &[u8], encoding: &'static Encoding) -> FieldValue {
    match field.field_type {
        FieldType::Character => FieldValue::Text(decode_text(raw, encoding).trim().to_string()),
        FieldType::Numeric | FieldType::Float => decode_number(raw, field.decimals),
        FieldType::Integer => match raw {
            [a, b, c, d] => FieldValue::Integer(i32::from_le_bytes([*a, *b, *c, *d]) as i64),
            _ => FieldValue::Null,
        },
        FieldType::Logical => match raw.first() {
            Some(b'T' | b't' | b'Y' | b'y') => FieldValue::Logical(true),
            Some(b'F' | b'f' | b'N' | b'n') => FieldValue::Logical(false),
            _ => FieldValue::Null,
        },
        FieldType::Date => decode_date(raw),
        FieldType::Memo | FieldType::Other(_) => {
            let text = decode_text(raw, encoding).trim().to_string();
            if text.is_empty() {
                FieldValue::Null
            } else {
                FieldValue::Text(text)
            }
        }
    }
}

fn decode_number(raw: &[u8], decimals: u8) -> FieldValue {
    let Ok(text) = simdutf8::basic::from_utf8(raw) else {
        return FieldValue::Null;
    };
    let text = text.trim_matches(|c: char| c == ' ' || c == '\0');
    // Champ vide ou débordement dBase ("*****")
    if text.is_empty() || text.bytes().all(|b| b == b'*') {
        return FieldValue::Null;
    }
    if decimals == 0 {
        if let Ok(i) = text.parse::<i64>() {
            return FieldValue::Integer(i);
        }
    }
    match fast_float::parse::<f64, _>(text) {
        Ok(n) if n.is_finite() => FieldValue::Number(n),
        _ => FieldValue::Text(text.to_string()),
    }
}

fn decode_date(raw: &[u8]) -> FieldValue {
    let Ok(text) = simdutf8::basic::from_utf8(raw) else {
        return FieldValue::Null;
    };
    let text = text.trim();
    if text.is_empty() || text.bytes().all(|b| b == b'0') {
        return FieldValue::Null;
    }
    if text.len() == 8 && text.bytes().all(|b| b.is_ascii_digit()) {
        FieldValue::Date(format!("{}-{}-{}", &text[..4], &text[4..6], &text[6..]))
    } else {
        FieldValue::Text(text.to_string())
    }
}

/// Décode du texte avec l'encodage donné (chemin rapide SIMD pour l'UTF-8 et l'ASCII)
pub fn decode_text(raw: &[u8], encoding: &'static Encoding) -> String {
    let raw = match memchr(0, raw) {
        Some(end) => &raw[..end],
        None => raw,
    };
    if encoding == encoding_rs::UTF_8 || raw.is_ascii() {
        if let Ok(s) = simdutf8::basic::from_utf8(raw) {
            return s.to_string();
        }
    }
    let (decoded, _, _) = encoding.decode(raw);
    decoded.into_owned()
}
