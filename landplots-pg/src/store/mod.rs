//! Accès PostgreSQL/PostGIS : pool, schéma, staging, upsert et registre des imports

pub mod ledger;
pub mod pool;
pub mod schema;
pub mod staging;
pub mod transaction;
pub mod upsert;

pub use pool::{create_pool, test_connection, DatabaseConfig, DatabaseOverrides, SslMode};

use anyhow::{bail, Context, Result};
use deadpool_postgres::{Object, Pool};

/// Table des parcelles
pub const PLOTS_TABLE: &str = "land_plots";
/// Registre des imports
pub const IMPORTS_TABLE: &str = "shapefile_imports";

/// Poignée vers le store, construite explicitement pour chaque exécution
#[derive(Clone)]
pub struct Store {
    pool: Pool,
    schema: String,
}

impl Store {
    pub fn new(pool: Pool, schema: &str) -> Result<Self> {
        if !is_valid_identifier(schema) {
            bail!("Invalid schema name: {}", schema);
        }
        Ok(Self {
            pool,
            schema: schema.to_string(),
        })
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Nom qualifié et quoté : `"schema"."table"`
    pub fn table(&self, name: &str) -> String {
        format!("{}.{}", quote_ident(&self.schema), quote_ident(name))
    }

    pub async fn client(&self) -> Result<Object> {
        self.pool
            .get()
            .await
            .context("Failed to get connection from pool")
    }
}

/// Quote un identifiant SQL (guillemets doublés)
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Identifiant non quoté sûr : `[a-z_][a-z0-9_]*`, 63 caractères au plus
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_lowercase() || c == '_')
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        && name.len() <= 63
}
