//! Fusion du staging en parcelles canoniques
//!
//! Les deux formes de staging (une colonne `attributes` JSONB ou une colonne par
//! champ d'origine) sont ramenées à une seule table d'attributs. Le code de
//! parcelle et la surface sont dérivés des sondes configurées ; les lignes sans
//! géométrie exploitable sont rejetées et ne consomment pas de numéro.

use std::collections::BTreeMap;

use esri_shp::repair;
use geo::{BoundingRect, GeodesicArea, MultiPolygon, Rect};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, trace};

use crate::config::FieldProbes;
use crate::source::ImportMethod;
use crate::store::staging::StagedRow;

/// Colonnes techniques, jamais reprises dans les attributs
pub const SYSTEM_COLUMNS: [&str; 8] = [
    "id",
    "ogc_fid",
    "geometry",
    "geom",
    "wkb_geometry",
    "attributes",
    "original_fid",
    "import_timestamp",
];

/// Clés de provenance, prioritaires sur les champs homonymes de la source
pub const PROVENANCE_KEYS: [&str; 2] = ["import_method", "original_fid"];

/// Localisation administrative commune à tout le jeu de données
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Location {
    pub district: String,
    pub ward: String,
    pub village: String,
}

/// Origine de la surface retenue
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AreaSource {
    /// Champ de la source (nom d'origine)
    Field(String),
    /// Surface géodésique calculée sur l'ellipsoïde WGS 84
    Geodesic,
}

/// Parcelle prête pour l'upsert
#[derive(Debug, Clone)]
pub struct CanonicalPlot {
    pub plot_code: String,
    /// Arrondie à 4 décimales, toujours > 0
    pub area_hectares: f64,
    pub area_source: AreaSource,
    pub geometry: MultiPolygon,
    pub attributes: Map<String, Value>,
    pub original_fid: Option<i64>,
}

/// Ligne de staging écartée
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectedRow {
    /// Position 0-based dans l'ordre du staging
    pub position: usize,
    pub original_fid: Option<i64>,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct MergeOutcome {
    pub plots: Vec<CanonicalPlot>,
    pub rejected: Vec<RejectedRow>,
    /// Géométries réparées au passage (chemin ogr2ogr)
    pub repaired: usize,
    /// Emprise des parcelles retenues
    pub bbox: Option<Rect<f64>>,
}

/// Arrondi à 4 décimales
pub fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// Fusionne les lignes de staging, dans leur ordre d'insertion
pub fn merge_rows(
    rows: Vec<StagedRow>,
    dataset: &str,
    method: ImportMethod,
    probes: &FieldProbes,
) -> MergeOutcome {
    let mut outcome = MergeOutcome::default();

    for (position, row) in rows.into_iter().enumerate() {
        let original_fid = staged_fid(&row);

        let normalized = match repair::normalize(row.geometry.clone(), position) {
            Ok(n) => n,
            Err(e) => {
                debug!(position, error = %e, "Staged row rejected");
                outcome.rejected.push(RejectedRow {
                    position,
                    original_fid,
                    reason: e.to_string(),
                });
                continue;
            }
        };

        let fields = canonical_fields(&row);

        let (area_hectares, area_source) = match probe_area(&fields, probes) {
            Some(found) => found,
            None => (
                round4(normalized.geometry.geodesic_area_unsigned() / 10_000.0),
                AreaSource::Geodesic,
            ),
        };
        if area_hectares <= 0.0 {
            outcome.rejected.push(RejectedRow {
                position,
                original_fid,
                reason: format!("Zero area for record #{position}"),
            });
            continue;
        }

        let plot_code = probe_plot_code(&fields, probes)
            .unwrap_or_else(|| synthesize_plot_code(dataset, outcome.plots.len() + 1));

        let mut attributes: Map<String, Value> = fields
            .into_iter()
            .map(|(k, v)| (k, Value::String(v)))
            .collect();
        attributes.insert("import_method".into(), Value::String(method.as_str().into()));
        if let Some(fid) = original_fid {
            attributes.insert("original_fid".into(), Value::from(fid));
        }

        if let Some(rect) = normalized.geometry.bounding_rect() {
            outcome.bbox = Some(match outcome.bbox {
                Some(acc) => union(acc, rect),
                None => rect,
            });
        }
        if normalized.repaired {
            outcome.repaired += 1;
        }

        trace!(position, plot_code = %plot_code, area_hectares, "Plot merged");
        outcome.plots.push(CanonicalPlot {
            plot_code,
            area_hectares,
            area_source,
            geometry: normalized.geometry,
            attributes,
            original_fid,
        });
    }

    debug!(
        dataset,
        accepted = outcome.plots.len(),
        rejected = outcome.rejected.len(),
        repaired = outcome.repaired,
        "Staging merged"
    );
    outcome
}

/// `<dataset>_<séquence sur 4 chiffres>`
pub fn synthesize_plot_code(dataset: &str, sequence: usize) -> String {
    format!("{}_{:04}", dataset, sequence)
}

fn is_system_column(name: &str) -> bool {
    SYSTEM_COLUMNS.iter().any(|c| c.eq_ignore_ascii_case(name))
}

fn staged_fid(row: &StagedRow) -> Option<i64> {
    row.column("original_fid")
        .or_else(|| row.column("ogc_fid"))
        .and_then(|v| v.trim().parse().ok())
}

/// Table d'attributs canonique : JSON `attributes` puis colonnes d'origine.
///
/// Valeurs en texte, nulles et vides écartées, colonnes techniques exclues.
fn canonical_fields(row: &StagedRow) -> BTreeMap<String, String> {
    let mut fields = BTreeMap::new();

    if let Some(Value::Object(map)) = row
        .column("attributes")
        .and_then(|raw| serde_json::from_str::<Value>(raw).ok())
    {
        for (key, value) in map {
            if let Some(text) = json_to_text(value) {
                fields.insert(key, text);
            }
        }
    }

    for (name, value) in &row.columns {
        if is_system_column(name) {
            continue;
        }
        if let Some(text) = value.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            fields.insert(name.clone(), text.to_string());
        }
    }

    fields.retain(|k, _| !is_system_column(k) && !PROVENANCE_KEYS.contains(&k.as_str()));
    fields
}

fn json_to_text(value: Value) -> Option<String> {
    let text = match value {
        Value::Null => return None,
        Value::String(s) => s,
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    };
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn lookup<'a>(fields: &'a BTreeMap<String, String>, name: &str) -> Option<&'a str> {
    fields
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

fn probe_plot_code(fields: &BTreeMap<String, String>, probes: &FieldProbes) -> Option<String> {
    probes
        .plot_code
        .iter()
        .find_map(|name| lookup(fields, name))
        .map(str::to_string)
}

fn probe_area(fields: &BTreeMap<String, String>, probes: &FieldProbes) -> Option<(f64, AreaSource)> {
    probes.area.iter().find_map(|probe| {
        let (name, raw) = fields
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(&probe.field))?;
        let value: f64 = raw.trim().parse().ok()?;
        if !value.is_finite() || value <= 0.0 {
            return None;
        }
        let hectares = round4(probe.unit.to_hectares(value));
        (hectares > 0.0).then(|| (hectares, AreaSource::Field(name.clone())))
    })
}

fn union(a: Rect<f64>, b: Rect<f64>) -> Rect<f64> {
    Rect::new(
        geo::coord! { x: a.min().x.min(b.min().x), y: a.min().y.min(b.min().y) },
        geo::coord! { x: a.max().x.max(b.max().x), y: a.max().y.max(b.max().y) },
    )
}
