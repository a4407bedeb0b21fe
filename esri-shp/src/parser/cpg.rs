//! Résolution de l'encodage des attributs (.cpg et octet "language driver" du DBF)

use encoding_rs::Encoding;

/// Mappe le contenu d'un fichier .cpg vers un encodage
///
/// Accepte les libellés WHATWG (`UTF-8`, `ISO-8859-1`, `windows-1252`...) et les codes
/// de page numériques écrits par ArcGIS/QGIS (`65001`, `1252`, `ANSI 1252`, `88591`).
pub fn encoding_for_cpg(label: &str) -> Option<&'static Encoding> {
    let upper = label.trim().to_ascii_uppercase();
    let code = upper.strip_prefix("ANSI").unwrap_or(&upper).trim();
    let code = code.strip_prefix("CP").unwrap_or(code);

    if !code.is_empty() && code.bytes().all(|b| b.is_ascii_digit()) {
        return match code {
            "65001" => Some(encoding_rs::UTF_8),
            "866" => Some(encoding_rs::IBM866),
            "874" => Some(encoding_rs::WINDOWS_874),
            "932" => Some(encoding_rs::SHIFT_JIS),
            "936" => Some(encoding_rs::GBK),
            "949" => Some(encoding_rs::EUC_KR),
            "950" => Some(encoding_rs::BIG5),
            "1250" | "1251" | "1252" | "1253" | "1254" | "1255" | "1256" | "1257" | "1258" => {
                Encoding::for_label(format!("windows-{code}").as_bytes())
            }
            // 88591..885916 (forme compacte de ISO-8859-n)
            c if c.starts_with("8859") && c.len() > 4 => {
                Encoding::for_label(format!("iso-8859-{}", &c[4..]).as_bytes())
            }
            c if c.starts_with("2859") && c.len() == 5 => {
                Encoding::for_label(format!("iso-8859-{}", &c[4..]).as_bytes())
            }
            _ => None,
        };
    }

    Encoding::for_label(label.trim().as_bytes())
}

/// Mappe l'octet "language driver ID" (offset 29 de l'en-tête DBF) vers un encodage
pub fn encoding_for_ldid(ldid: u8) -> Option<&'static Encoding> {
    match ldid {
        0x03 | 0x57 | 0x58 | 0x59 => Some(encoding_rs::WINDOWS_1252),
        0x13 | 0x7B => Some(encoding_rs::SHIFT_JIS),
        0x4D | 0x7A => Some(encoding_rs::GBK),
        0x4E | 0x79 => Some(encoding_rs::EUC_KR),
        0x4F | 0x78 => Some(encoding_rs::BIG5),
        0x50 | 0x7C => Some(encoding_rs::WINDOWS_874),
        0x65 => Some(encoding_rs::IBM866),
        0x7D => Some(encoding_rs::WINDOWS_1255),
        0x7E => Some(encoding_rs::WINDOWS_1256),
        0xC8 => Some(encoding_rs::WINDOWS_1250),
        0xC9 => Some(encoding_rs::WINDOWS_1251),
        0xCA => Some(encoding_rs::WINDOWS_1254),
        0xCB => Some(encoding_rs::WINDOWS_1253),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpg_labels() {
        assert_eq!(encoding_for_cpg("UTF-8"), Some(encoding_rs::UTF_8));
        assert_eq!(encoding_for_cpg("utf-8\n"), Some(encoding_rs::UTF_8));
        assert_eq!(encoding_for_cpg("65001"), Some(encoding_rs::UTF_8));
        assert_eq!(encoding_for_cpg("1252"), Some(encoding_rs::WINDOWS_1252));
        assert_eq!(encoding_for_cpg("ANSI 1251"), Some(encoding_rs::WINDOWS_1251));
        assert_eq!(encoding_for_cpg("88592"), Some(encoding_rs::ISO_8859_2));
        // encoding_rs aligne ISO-8859-1 sur windows-1252 (WHATWG)
        assert_eq!(encoding_for_cpg("ISO-8859-1"), Some(encoding_rs::WINDOWS_1252));
        assert_eq!(encoding_for_cpg("not-an-encoding"), None);
    }

    #[test]
    fn test_ldid() {
        assert_eq!(encoding_for_ldid(0x57), Some(encoding_rs::WINDOWS_1252));
        assert_eq!(encoding_for_ldid(0xC9), Some(encoding_rs::WINDOWS_1251));
        assert_eq!(encoding_for_ldid(0x00), None);
    }
}
