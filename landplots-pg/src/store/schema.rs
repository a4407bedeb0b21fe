//! Création idempotente du schéma : extension PostGIS, tables et index

use anyhow::{Context, Result};
use deadpool_postgres::Object;
use tracing::{info, warn};

use super::{quote_ident, Store, IMPORTS_TABLE, PLOTS_TABLE};

/// Crée l'extension, le schéma, les tables et les index s'ils n'existent pas
pub async fn ensure_schema(store: &Store) -> Result<()> {
    let client = store.client().await?;

    ensure_postgis(&client).await?;

    client
        .execute(
            &format!("CREATE SCHEMA IF NOT EXISTS {}", quote_ident(store.schema())),
            &[],
        )
        .await
        .context("Failed to create schema")?;

    let plots = store.table(PLOTS_TABLE);
    let imports = store.table(IMPORTS_TABLE);

    client
        .batch_execute(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {plots} (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                plot_code TEXT NOT NULL UNIQUE,
                status TEXT NOT NULL DEFAULT 'available'
                    CHECK (status IN ('available', 'taken', 'pending')),
                area_hectares NUMERIC(12,4) NOT NULL CHECK (area_hectares > 0),
                district TEXT NOT NULL,
                ward TEXT NOT NULL,
                village TEXT NOT NULL,
                dataset_name TEXT,
                geometry geometry(MultiPolygon, 4326) NOT NULL,
                attributes JSONB NOT NULL DEFAULT '{{}}'::jsonb,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            );

            CREATE TABLE IF NOT EXISTS {imports} (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                dataset_name TEXT NOT NULL UNIQUE,
                prj TEXT,
                cpg TEXT,
                dbf_schema JSONB,
                file_hashes JSONB,
                feature_count INTEGER,
                bbox geometry(Polygon, 4326),
                imported_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            );
            "#
        ))
        .await
        .context("Failed to create tables")?;

    create_indexes(&client, store).await?;

    info!(schema = store.schema(), "Database schema ensured");
    Ok(())
}

/// Active PostGIS si nécessaire (peut nécessiter des droits superuser).
///
/// Si l'extension existe déjà mais que l'utilisateur ne peut pas la (re)créer,
/// on dégrade gracieusement.
async fn ensure_postgis(client: &Object) -> Result<()> {
    if let Err(e) = client
        .execute("CREATE EXTENSION IF NOT EXISTS postgis", &[])
        .await
    {
        warn!("CREATE EXTENSION postgis failed (will check if already installed): {e}");
        let exists = client
            .query_opt("SELECT 1 FROM pg_extension WHERE extname = 'postgis'", &[])
            .await
            .context("Failed to check pg_extension")?
            .is_some();
        if !exists {
            return Err(anyhow::anyhow!(
                "PostGIS extension is not installed and could not be created: {e}"
            ));
        }
    }
    Ok(())
}

async fn create_indexes(client: &Object, store: &Store) -> Result<()> {
    let plots = store.table(PLOTS_TABLE);
    let imports = store.table(IMPORTS_TABLE);
    let indexes = [
        ("idx_land_plots_geometry", format!("{plots} USING GIST (geometry)")),
        ("idx_land_plots_status", format!("{plots} (status)")),
        ("idx_land_plots_district", format!("{plots} (lower(district))")),
        ("idx_land_plots_ward", format!("{plots} (lower(ward))")),
        ("idx_land_plots_village", format!("{plots} (lower(village))")),
        ("idx_land_plots_dataset", format!("{plots} (dataset_name)")),
        ("idx_shapefile_imports_bbox", format!("{imports} USING GIST (bbox)")),
    ];

    for (name, target) in indexes {
        client
            .execute(&format!("CREATE INDEX IF NOT EXISTS {name} ON {target}"), &[])
            .await
            .with_context(|| format!("Failed to create index {name}"))?;
    }
    Ok(())
}
