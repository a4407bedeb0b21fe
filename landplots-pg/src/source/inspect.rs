//! Métadonnées d'une couche : `ogrinfo -so -al`, complété par les en-têtes natifs
//!
//! La sortie d'ogrinfo est lue ligne par ligne ; une ligne non reconnue est
//! ignorée. Ce que l'outil n'a pas fourni est repris des en-têtes SHP/SHX/DBF.

use std::path::Path;
use std::sync::OnceLock;

use anyhow::{Context, Result};
use esri_shp::Shapefile;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};

use super::tool::run_tool;
use crate::config::ToolConfig;

/// Métadonnées d'une couche
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LayerMetadata {
    pub layer_name: Option<String>,
    pub geometry_type: Option<String>,
    pub feature_count: Option<usize>,
    /// [min_x, min_y, max_x, max_y] dans le système source
    pub extent: Option<[f64; 4]>,
    /// Nom de champ et type au format ogrinfo, dans l'ordre de la table
    pub fields: Vec<(String, String)>,
}

impl LayerMetadata {
    /// Complète les informations manquantes avec `other`
    pub fn fill_from(mut self, other: LayerMetadata) -> Self {
        self.layer_name = self.layer_name.or(other.layer_name);
        self.geometry_type = self.geometry_type.or(other.geometry_type);
        self.feature_count = self.feature_count.or(other.feature_count);
        self.extent = self.extent.or(other.extent);
        if self.fields.is_empty() {
            self.fields = other.fields;
        }
        self
    }
}

struct Patterns {
    extent: Regex,
    field: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        extent: Regex::new(
            r"^Extent:\s*\(\s*([-+\d.eE]+),\s*([-+\d.eE]+)\)\s*-\s*\(\s*([-+\d.eE]+),\s*([-+\d.eE]+)\)",
        )
        .expect("extent pattern"),
        field: Regex::new(r"^([^\s:][^:]*):\s+([A-Za-z][\w()]*(?: List)?)\s+\((\d+)\.(\d+)\)\s*$")
            .expect("field pattern"),
    })
}

/// Parse la sortie de `ogrinfo -so -al`
pub fn parse_ogrinfo(output: &str) -> LayerMetadata {
    let patterns = patterns();
    let mut meta = LayerMetadata::default();

    for line in output.lines() {
        let line = line.trim_end();
        if let Some(name) = line.strip_prefix("Layer name:") {
            meta.layer_name = Some(name.trim().to_string());
        } else if let Some(kind) = line.strip_prefix("Geometry:") {
            meta.geometry_type = Some(kind.trim().to_string());
        } else if let Some(count) = line.strip_prefix("Feature Count:") {
            meta.feature_count = count.trim().parse().ok();
        } else if let Some(caps) = patterns.extent.captures(line) {
            let values: Vec<f64> = (1..=4).filter_map(|i| caps[i].parse().ok()).collect();
            if let [min_x, min_y, max_x, max_y] = values[..] {
                meta.extent = Some([min_x, min_y, max_x, max_y]);
            }
        } else if let Some(caps) = patterns.field.captures(line) {
            let name = caps[1].trim();
            if name.eq_ignore_ascii_case("extent") || name.eq_ignore_ascii_case("fid") {
                continue;
            }
            meta.fields.push((
                name.to_string(),
                format!("{} ({}.{})", &caps[2], &caps[3], &caps[4]),
            ));
        }
    }

    meta
}

/// Métadonnées lues directement dans les en-têtes
pub fn native_metadata(shp: &Path, encoding: Option<&str>) -> Result<LayerMetadata> {
    let shapefile = Shapefile::open_with_encoding(shp, encoding)
        .with_context(|| format!("Failed to open {}", shp.display()))?;

    Ok(LayerMetadata {
        layer_name: shp.file_stem().map(|s| s.to_string_lossy().into_owned()),
        geometry_type: Some(shapefile.header.shape_type.label().to_string()),
        feature_count: Some(shapefile.len()),
        extent: shapefile
            .header
            .extent
            .map(|r| [r.min().x, r.min().y, r.max().x, r.max().y]),
        fields: shapefile
            .fields
            .iter()
            .map(|f| (f.name.clone(), f.type_label()))
            .collect(),
    })
}

/// ogrinfo si disponible, puis en-têtes natifs pour les trous
pub async fn inspect_layer(shp: &Path, tool: &ToolConfig, encoding: Option<&str>) -> LayerMetadata {
    let mut meta = LayerMetadata::default();

    if tool.enabled {
        let path = shp.to_string_lossy();
        match run_tool(&tool.program, ["-so", "-al", path.as_ref()], &[], tool.timeout()).await {
            Ok(output) => {
                meta = parse_ogrinfo(&output.stdout);
                debug!(fields = meta.fields.len(), "ogrinfo metadata parsed");
            }
            Err(e) => debug!(error = %e, "ogrinfo unavailable, using native headers"),
        }
    }

    match native_metadata(shp, encoding) {
        Ok(native) => meta.fill_from(native),
        Err(e) => {
            warn!(error = %format!("{e:#}"), "Native metadata unavailable");
            meta
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OGRINFO: &str = r#"INFO: Open of `/data/mbuyuni.shp'
      using driver `ESRI Shapefile' successful.

Layer name: mbuyuni
Metadata:
  DBF_DATE_LAST_UPDATE=2023-05-12
Geometry: Polygon
Feature Count: 214
Extent: (532100.125000, 9245001.500000) - (538877.000000, 9251234.750000)
Layer SRS WKT:
PROJCS["Arc_1960_UTM_Zone_37S",
    GEOGCS["GCS_Arc_1960",
        DATUM["Arc_1960",
            SPHEROID["Clarke_1880_RGS",6378249.145,293.465]],
        PRIMEM["Greenwich",0.0],
        UNIT["Degree",0.0174532925199433]],
    PROJECTION["Transverse_Mercator"],
    UNIT["Meter",1.0]]
Data axis to CRS axis mapping: 1,2
PLOT_NO: String (10.0)
AREA_HA: Real (19.11)
OWNER: String (80.0)
SURVEYED: Date (10.0)
PARCEL_ID: Integer64 (18.0)
"#;

    #[test]
    fn test_parse_ogrinfo() {
        let meta = parse_ogrinfo(OGRINFO);
        assert_eq!(meta.layer_name.as_deref(), Some("mbuyuni"));
        assert_eq!(meta.geometry_type.as_deref(), Some("Polygon"));
        assert_eq!(meta.feature_count, Some(214));
        assert_eq!(meta.extent, Some([532100.125, 9245001.5, 538877.0, 9251234.75]));
        assert_eq!(
            meta.fields,
            vec![
                ("PLOT_NO".to_string(), "String (10.0)".to_string()),
                ("AREA_HA".to_string(), "Real (19.11)".to_string()),
                ("OWNER".to_string(), "String (80.0)".to_string()),
                ("SURVEYED".to_string(), "Date (10.0)".to_string()),
                ("PARCEL_ID".to_string(), "Integer64 (18.0)".to_string()),
            ]
        );
    }

    #[test]
    fn test_unrecognized_output_degrades() {
        let meta = parse_ogrinfo("something changed\nFeature Count: many\n");
        assert_eq!(meta, LayerMetadata::default());
    }

    #[test]
    fn test_fill_from_keeps_tool_values() {
        let tool = LayerMetadata {
            feature_count: Some(10),
            ..Default::default()
        };
        let native = LayerMetadata {
            layer_name: Some("x".into()),
            feature_count: Some(12),
            fields: vec![("A".into(), "String (1.0)".into())],
            ..Default::default()
        };
        let merged = tool.fill_from(native);
        assert_eq!(merged.feature_count, Some(10));
        assert_eq!(merged.layer_name.as_deref(), Some("x"));
        assert_eq!(merged.fields.len(), 1);
    }
}
