//! Registre des imports : une ligne de provenance par jeu de données

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use geo::Rect;
use tracing::{info, warn};

use super::{Store, IMPORTS_TABLE};

/// Provenance d'un import
#[derive(Debug, Clone, Default)]
pub struct LedgerEntry {
    pub dataset_name: String,
    /// Texte brut du `.prj`
    pub prj: Option<String>,
    /// Encodage déclaré par le `.cpg`
    pub cpg: Option<String>,
    /// Nom de champ → type (`String (80.0)`, `Real (19.11)`, ...)
    pub dbf_schema: BTreeMap<String, String>,
    /// Extension → empreinte blake3
    pub file_hashes: BTreeMap<String, String>,
    /// Nombre d'entités de la source, avant tout filtrage
    pub feature_count: usize,
    /// Emprise en EPSG:4326
    pub bbox: Option<Rect<f64>>,
}

/// Écrit ou remplace la ligne du jeu de données
pub async fn record_import(store: &Store, entry: &LedgerEntry) -> Result<()> {
    let client = store.client().await?;

    let dbf_schema = serde_json::to_string(&entry.dbf_schema)?;
    let file_hashes = serde_json::to_string(&entry.file_hashes)?;
    let feature_count = i32::try_from(entry.feature_count).context("Feature count overflows INTEGER")?;
    let (min_x, min_y, max_x, max_y) = match entry.bbox {
        Some(rect) => (
            Some(rect.min().x),
            Some(rect.min().y),
            Some(rect.max().x),
            Some(rect.max().y),
        ),
        None => (None, None, None, None),
    };

    client
        .execute(
            &format!(
                r#"
                INSERT INTO {} (dataset_name, prj, cpg, dbf_schema, file_hashes, feature_count, bbox, imported_at)
                VALUES (
                    $1, $2, $3, $4::text::jsonb, $5::text::jsonb, $6,
                    CASE WHEN $7::float8 IS NULL THEN NULL
                         ELSE ST_MakeEnvelope($7::float8, $8::float8, $9::float8, $10::float8, 4326)
                    END,
                    NOW()
                )
                ON CONFLICT (dataset_name) DO UPDATE SET
                    prj = EXCLUDED.prj,
                    cpg = EXCLUDED.cpg,
                    dbf_schema = EXCLUDED.dbf_schema,
                    file_hashes = EXCLUDED.file_hashes,
                    feature_count = EXCLUDED.feature_count,
                    bbox = EXCLUDED.bbox,
                    imported_at = NOW()
                "#,
                store.table(IMPORTS_TABLE)
            ),
            &[
                &entry.dataset_name,
                &entry.prj,
                &entry.cpg,
                &dbf_schema,
                &file_hashes,
                &feature_count,
                &min_x,
                &min_y,
                &max_x,
                &max_y,
            ],
        )
        .await
        .with_context(|| format!("Failed to record import of {}", entry.dataset_name))?;

    info!(
        dataset = %entry.dataset_name,
        features = entry.feature_count,
        fields = entry.dbf_schema.len(),
        "Import recorded"
    );
    Ok(())
}

/// Variante non fatale : l'échec est journalisé et signalé par `false`
pub async fn record_import_logged(store: &Store, entry: &LedgerEntry) -> bool {
    match record_import(store, entry).await {
        Ok(()) => true,
        Err(e) => {
            warn!(dataset = %entry.dataset_name, error = %format!("{e:#}"), "Failed to record import provenance");
            false
        }
    }
}
