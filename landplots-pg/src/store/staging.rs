//! Table de staging d'un import
//!
//! Deux formes coexistent : colonnes d'origine (ogr2ogr) ou colonne `attributes`
//! JSONB (lecteur natif). La lecture renvoie toutes les colonnes en texte ; la
//! réconciliation est faite par `merge`.

use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use bytes::{Bytes, BytesMut};
use futures::SinkExt;
use geo::Geometry;
use geozero::wkb::Wkb;
use geozero::ToGeo;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::{quote_ident, Store};
use crate::reproject::Envelope;

/// Colonnes géométriques reconnues, par ordre de préférence
pub const GEOMETRY_COLUMNS: [&str; 3] = ["geometry", "geom", "wkb_geometry"];

/// Chunk CSV pré-formaté pour COPY
#[derive(Debug)]
pub struct CopyChunk {
    pub data: Bytes,
    pub rows: u64,
}

/// Ligne lue depuis le staging, dans l'ordre d'insertion
#[derive(Debug, Clone, Default)]
pub struct StagedRow {
    pub geometry: Option<Geometry>,
    /// Colonnes non géométriques, valeurs en texte (`None` = NULL)
    pub columns: Vec<(String, Option<String>)>,
}

impl StagedRow {
    pub fn column(&self, name: &str) -> Option<&str> {
        self.columns
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .and_then(|(_, v)| v.as_deref())
    }
}

/// `_staging_<dataset>_<8 hex>` ; un nom imposé est repris tel quel
pub fn staging_table_name(dataset: &str, fixed: Option<&str>) -> String {
    if let Some(name) = fixed {
        return name.to_string();
    }
    let slug: String = dataset
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .take(32)
        .collect();

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let mut hasher = blake3::Hasher::new();
    hasher.update(dataset.as_bytes());
    hasher.update(&nanos.to_le_bytes());
    hasher.update(&std::process::id().to_le_bytes());
    let suffix = hasher.finalize().to_hex();

    format!("_staging_{}_{}", slug, &suffix[..8])
}

/// Crée la table de staging du lecteur natif (vidée si elle existait)
pub async fn create_attributes_staging(store: &Store, table: &str) -> Result<()> {
    let client = store.client().await?;
    let qualified = store.table(table);
    client
        .batch_execute(&format!(
            r#"
            DROP TABLE IF EXISTS {qualified} CASCADE;
            CREATE UNLOGGED TABLE {qualified} (
                id BIGSERIAL PRIMARY KEY,
                geometry geometry(MultiPolygon, 4326),
                attributes JSONB NOT NULL DEFAULT '{{}}'::jsonb,
                original_fid INTEGER,
                import_timestamp TIMESTAMPTZ DEFAULT NOW()
            );
            "#
        ))
        .await
        .with_context(|| format!("Failed to create staging table {}", qualified))?;
    debug!(table = %qualified, "Staging table created");
    Ok(())
}

/// Insère des lignes CSV pré-formatées via COPY (pipeline streaming).
///
/// Chaque chunk contient des lignes `geometry,attributes,original_fid` terminées
/// par `\n`. Une seule transaction pour tout le flux.
pub async fn copy_csv_chunks(store: &Store, table: &str, mut rx: mpsc::Receiver<CopyChunk>) -> Result<u64> {
    let mut client = store.client().await?;
    let tx = client.transaction().await?;

    let copy_sql = format!(
        "COPY {} (geometry, attributes, original_fid) FROM STDIN WITH (FORMAT csv, DELIMITER ',', QUOTE '\"', ESCAPE '\"', NULL '')",
        store.table(table)
    );

    let copy_in = tx.copy_in(&copy_sql).await?;
    let mut pinned = std::pin::pin!(copy_in);

    let mut total_rows: u64 = 0;

    while let Some(chunk) = rx.recv().await {
        if chunk.data.is_empty() {
            continue;
        }
        pinned
            .as_mut()
            .send(chunk.data)
            .await
            .context("Failed to send COPY chunk")?;
        total_rows += chunk.rows;
    }

    pinned.close().await.context("Failed to finish COPY")?;
    tx.commit().await.context("Failed to commit staging load")?;

    info!(table, rows = total_rows, "Staging rows copied");
    Ok(total_rows)
}

/// Ajoute un champ CSV quoté (guillemets doublés, fins de ligne remplacées)
pub fn push_csv_text_field(buf: &mut BytesMut, value: &str) {
    buf.extend_from_slice(b"\"");
    for b in value.as_bytes() {
        match *b {
            b'"' => buf.extend_from_slice(b"\"\""),
            b'\n' | b'\r' => buf.extend_from_slice(b" "),
            _ => buf.extend_from_slice(&[*b]),
        }
    }
    buf.extend_from_slice(b"\"");
}

/// Supprime la table de staging
pub async fn drop_staging(store: &Store, table: &str) -> Result<()> {
    let client = store.client().await?;
    client
        .execute(&format!("DROP TABLE IF EXISTS {} CASCADE", store.table(table)), &[])
        .await
        .with_context(|| format!("Failed to drop staging table {}", table))?;
    debug!(table, "Staging table dropped");
    Ok(())
}

/// Nombre de lignes (0 si la table n'existe pas)
pub async fn count_rows(store: &Store, table: &str) -> Result<u64> {
    let client = store.client().await?;
    if !table_exists(&client, store.schema(), table).await? {
        return Ok(0);
    }
    let row = client
        .query_one(&format!("SELECT count(*) FROM {}", store.table(table)), &[])
        .await
        .with_context(|| format!("Failed to count rows of {}", table))?;
    Ok(row.get::<_, i64>(0) as u64)
}

/// Lignes dont l'emprise sort de l'enveloppe (signalées, jamais rejetées)
pub async fn count_outside_envelope(store: &Store, table: &str, envelope: &Envelope) -> Result<u64> {
    let client = store.client().await?;
    let row = client
        .query_one(
            &format!(
                "SELECT count(*) FROM {} WHERE geometry IS NOT NULL \
                 AND NOT ST_Contains(ST_MakeEnvelope($1, $2, $3, $4, 4326), ST_Envelope(geometry))",
                store.table(table)
            ),
            &[&envelope.west, &envelope.south, &envelope.east, &envelope.north],
        )
        .await
        .context("Failed to check staged extent")?;
    Ok(row.get::<_, i64>(0) as u64)
}

async fn table_exists(client: &deadpool_postgres::Object, schema: &str, table: &str) -> Result<bool> {
    Ok(client
        .query_opt(
            "SELECT 1 FROM information_schema.tables WHERE table_schema = $1 AND table_name = $2",
            &[&schema, &table],
        )
        .await?
        .is_some())
}

/// Lit toutes les lignes du staging, dans l'ordre d'insertion (`id` ou `ogc_fid`)
pub async fn read_staged_rows(store: &Store, table: &str) -> Result<Vec<StagedRow>> {
    let client = store.client().await?;

    let columns: Vec<String> = client
        .query(
            "SELECT column_name::text FROM information_schema.columns \
             WHERE table_schema = $1 AND table_name = $2 ORDER BY ordinal_position",
            &[&store.schema(), &table],
        )
        .await
        .context("Failed to list staging columns")?
        .iter()
        .map(|r| r.get(0))
        .collect();

    let plan = SelectPlan::new(&columns)
        .with_context(|| format!("Staging table {} has no geometry column", table))?;
    let sql = plan.sql(&store.table(table));

    let rows = client
        .query(&sql, &[])
        .await
        .with_context(|| format!("Failed to read staging table {}", table))?;

    let staged = rows
        .iter()
        .map(|row| {
            let wkb: Option<Vec<u8>> = row.get(0);
            let geometry = wkb.and_then(|bytes| match Wkb(bytes).to_geo() {
                Ok(g) => Some(g),
                Err(e) => {
                    debug!(error = %e, "Undecodable staged geometry");
                    None
                }
            });
            let columns = plan
                .data_columns
                .iter()
                .enumerate()
                .map(|(i, name)| (name.clone(), row.get::<_, Option<String>>(i + 1)))
                .collect();
            StagedRow { geometry, columns }
        })
        .collect::<Vec<_>>();

    debug!(table, rows = staged.len(), columns = plan.data_columns.len(), "Staging rows read");
    Ok(staged)
}

/// Requête de lecture construite d'après les colonnes présentes
#[derive(Debug, PartialEq)]
struct SelectPlan {
    geometry_column: String,
    data_columns: Vec<String>,
    order_column: Option<String>,
}

impl SelectPlan {
    fn new(columns: &[String]) -> Option<Self> {
        let find = |name: &str| columns.iter().find(|c| c.eq_ignore_ascii_case(name)).cloned();
        let geometry_column = GEOMETRY_COLUMNS.iter().find_map(|g| find(g))?;
        let order_column = find("id").or_else(|| find("ogc_fid"));
        let data_columns = columns
            .iter()
            .filter(|c| **c != geometry_column)
            .cloned()
            .collect();
        Some(Self {
            geometry_column,
            data_columns,
            order_column,
        })
    }

    fn sql(&self, qualified_table: &str) -> String {
        let mut select = vec![format!("ST_AsBinary({})", quote_ident(&self.geometry_column))];
        select.extend(
            self.data_columns
                .iter()
                .map(|c| format!("{}::text", quote_ident(c))),
        );
        let order = self
            .order_column
            .as_ref()
            .map(|c| format!(" ORDER BY {}", quote_ident(c)))
            .unwrap_or_default();
        format!("SELECT {} FROM {}{}", select.join(", "), qualified_table, order)
    }
}
