//! Parser pour les fichiers PRJ (WKT ESRI / OGC)
//!
//! Seule la détection du code EPSG est faite ici ; la transformation elle-même est
//! hors du crate.

use memchr::memmem;

/// Datums connus pour les projections UTM : (motif normalisé, base EPSG nord, base EPSG sud)
///
/// Arc 1960 est testé avant WGS 84 : les PRJ ESRI d'Arc 1960 mentionnent aussi WGS 84
/// dans leurs paramètres TOWGS84.
const UTM_DATUMS: &[(&str, u32, u32)] = &[
    ("ARC_1960", 21060, 21000),
    ("WGS_1984", 32600, 32700),
    ("WGS_84", 32600, 32700),
];

/// Systèmes géographiques connus : (motif normalisé, EPSG)
const GEOGRAPHIC: &[(&str, u32)] = &[("ARC_1960", 4210), ("WGS_1984", 4326), ("WGS_84", 4326)];

/// Informations extraites d'un PRJ
#[derive(Debug, Clone, PartialEq)]
pub struct PrjInfo {
    /// Texte brut (trimé)
    pub wkt: String,
    /// Nom du système racine (`PROJCS["..."]` ou `GEOGCS["..."]`)
    pub name: Option<String>,
    /// Code EPSG détecté
    pub epsg: Option<u32>,
}

/// Parse le contenu d'un fichier .prj
pub fn parse(text: &str) -> PrjInfo {
    let wkt = text.trim().to_string();
    let name = root_name(&wkt);
    let epsg = root_authority(&wkt).or_else(|| epsg_from_names(&wkt));
    PrjInfo { wkt, name, epsg }
}

/// Nom entre guillemets du premier nœud WKT
fn root_name(wkt: &str) -> Option<String> {
    let open = wkt.find('[')?;
    let rest = &wkt[open + 1..];
    let rest = rest.strip_prefix('"')?;
    let end = rest.find('"')?;
    Some(rest[..end].to_string())
}

/// `AUTHORITY["EPSG","n"]` (WKT1) ou `ID["EPSG",n]` (WKT2) au niveau racine
fn root_authority(wkt: &str) -> Option<u32> {
    let bytes = wkt.as_bytes();
    for pattern in [&b"AUTHORITY[\"EPSG\","[..], &b"ID[\"EPSG\","[..]] {
        let Some(pos) = memmem::rfind(bytes, pattern) else {
            continue;
        };
        // Profondeur 1 = enfant direct du nœud racine
        if bracket_depth(&bytes[..pos]) != 1 {
            continue;
        }
        let digits: String = wkt[pos + pattern.len()..]
            .chars()
            .skip_while(|c| *c == '"' || c.is_whitespace())
            .take_while(|c| c.is_ascii_digit())
            .collect();
        if let Ok(code) = digits.parse() {
            return Some(code);
        }
    }
    None
}

fn bracket_depth(prefix: &[u8]) -> i32 {
    prefix.iter().fold(0, |depth, b| match b {
        b'[' | b'(' => depth + 1,
        b']' | b')' => depth - 1,
        _ => depth,
    })
}

/// Détection par motifs de noms (`Arc_1960_UTM_Zone_37S`, `WGS_1984_UTM_Zone_36S`, ...)
fn epsg_from_names(wkt: &str) -> Option<u32> {
    let normalized = wkt.to_ascii_uppercase().replace([' ', '-'], "_");
    let bytes = normalized.as_bytes();

    if let Some((zone, south)) = utm_zone(bytes) {
        for (pattern, north_base, south_base) in UTM_DATUMS {
            if memmem::find(bytes, pattern.as_bytes()).is_some() {
                let base = if south { *south_base } else { *north_base };
                return Some(base + zone);
            }
        }
        return None;
    }

    if normalized.starts_with("GEOGCS") || normalized.starts_with("GEOGCRS") {
        for (pattern, code) in GEOGRAPHIC {
            if memmem::find(bytes, pattern.as_bytes()).is_some() {
                return Some(*code);
            }
        }
    }

    None
}

/// Zone UTM et hémisphère depuis un motif `UTM_ZONE_<n><N|S>`
fn utm_zone(normalized: &[u8]) -> Option<(u32, bool)> {
    let pos = memmem::find(normalized, b"UTM_ZONE_")?;
    let rest = &normalized[pos + 9..];
    let digits = rest.iter().take_while(|b| b.is_ascii_digit()).count();
    if digits == 0 {
        return None;
    }
    let zone: u32 = std::str::from_utf8(&rest[..digits]).ok()?.parse().ok()?;
    if !(1..=60).contains(&zone) {
        return None;
    }
    let south = match rest.get(digits) {
        Some(b'S') => true,
        Some(b'N') => false,
        _ => return None,
    };
    Some((zone, south))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARC_1960_37S: &str = r#"PROJCS["Arc_1960_UTM_Zone_37S",GEOGCS["GCS_Arc_1960",DATUM["D_Arc_1960",SPHEROID["Clarke_1880_RGS",6378249.145,293.465]],PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]],PROJECTION["Transverse_Mercator"],PARAMETER["False_Easting",500000.0],PARAMETER["False_Northing",10000000.0],PARAMETER["Central_Meridian",39.0],PARAMETER["Scale_Factor",0.9996],PARAMETER["Latitude_Of_Origin",0.0],UNIT["Meter",1.0]]"#;

    const WGS84_36S: &str = r#"PROJCS["WGS_1984_UTM_Zone_36S",GEOGCS["GCS_WGS_1984",DATUM["D_WGS_1984",SPHEROID["WGS_1984",6378137.0,298.257223563]],PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]],PROJECTION["Transverse_Mercator"],PARAMETER["False_Easting",500000.0],PARAMETER["False_Northing",10000000.0],PARAMETER["Central_Meridian",33.0],PARAMETER["Scale_Factor",0.9996],PARAMETER["Latitude_Of_Origin",0.0],UNIT["Meter",1.0]]"#;

    const GEOG_WGS84: &str = r#"GEOGCS["GCS_WGS_1984",DATUM["D_WGS_1984",SPHEROID["WGS_1984",6378137.0,298.257223563]],PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]]"#;

    #[test]
    fn test_esri_names() {
        let info = parse(ARC_1960_37S);
        assert_eq!(info.name.as_deref(), Some("Arc_1960_UTM_Zone_37S"));
        assert_eq!(info.epsg, Some(21037));

        assert_eq!(parse(WGS84_36S).epsg, Some(32736));
        assert_eq!(parse(GEOG_WGS84).epsg, Some(4326));
    }

    #[test]
    fn test_root_authority_wins() {
        let wkt = r#"PROJCS["WGS 84 / UTM zone 37S",GEOGCS["WGS 84",DATUM["WGS_1984",SPHEROID["WGS 84",6378137,298.257223563,AUTHORITY["EPSG","7030"]],AUTHORITY["EPSG","6326"]],AUTHORITY["EPSG","4326"]],UNIT["metre",1],AUTHORITY["EPSG","32737"]]"#;
        assert_eq!(parse(wkt).epsg, Some(32737));
    }

    #[test]
    fn test_nested_authority_ignored() {
        // Seule l'autorité du GEOGCS est présente : on retombe sur les motifs de noms
        let wkt = r#"PROJCS["WGS 84 / UTM zone 36S",GEOGCS["WGS 84",AUTHORITY["EPSG","4326"]],UNIT["metre",1]]"#;
        assert_eq!(parse(wkt).epsg, Some(32736));
    }

    #[test]
    fn test_unknown() {
        let info = parse("LOCAL_CS[\"Engineering\"]\n");
        assert_eq!(info.epsg, None);
        assert_eq!(info.wkt, "LOCAL_CS[\"Engineering\"]");
    }
}
