//! Pont `ogr2ogr` : GDAL charge directement le shapefile dans le staging
//!
//! Outil absent, code de sortie non nul, délai dépassé ou staging vide sont des
//! échecs de conversion : le pipeline bascule sur le lecteur natif.

use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::{debug, info, warn};

use super::tool::{run_tool, tool_version};
use super::{GeometrySource, ImportMethod, LoadContext, StagedLoad};
use crate::config::ToolConfig;
use crate::error::SourceFailure;
use crate::store::{staging, DatabaseConfig, SslMode};

const STRATEGY: &str = "ogr2ogr";

/// Source de géométries via `ogr2ogr`
pub struct OgrBridge {
    tool: ToolConfig,
    database: DatabaseConfig,
}

impl OgrBridge {
    pub fn new(tool: ToolConfig, database: DatabaseConfig) -> Self {
        Self { tool, database }
    }

    /// Chaîne de connexion du pilote PostgreSQL de GDAL (sans mot de passe)
    fn connection_string(&self) -> String {
        let db = &self.database;
        let mut conn = format!(
            "PG:host={} port={} dbname={} user={}",
            db.host, db.port, db.dbname, db.user
        );
        match db.ssl_mode {
            SslMode::Disable => {}
            SslMode::Prefer => conn.push_str(" sslmode=prefer"),
            SslMode::Require => conn.push_str(" sslmode=require"),
        }
        conn
    }

    /// Arguments complets de la conversion
    pub fn build_args(&self, ctx: &LoadContext<'_>) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "-f".into(),
            "PostgreSQL".into(),
            self.connection_string(),
            ctx.shapefile.shp.to_string_lossy().into_owned(),
            "-nln".into(),
            format!("{}.{}", ctx.store.schema(), ctx.staging_table),
            "-nlt".into(),
            "MULTIPOLYGON".into(),
            "-t_srs".into(),
            "EPSG:4326".into(),
        ];

        if let Some(srs) = ctx.crs.srs_arg() {
            args.push("-s_srs".into());
            args.push(srs);
        }

        args.extend(
            [
                "-overwrite",
                "-preserve_fid",
                "-lco",
                "GEOMETRY_NAME=geometry",
                "-lco",
                "FID=ogc_fid",
                "-lco",
                "PRECISION=NO",
                "--config",
                "PG_USE_COPY",
                "YES",
            ]
            .map(String::from),
        );

        if let Some(encoding) = ctx.encoding {
            args.push("--config".into());
            args.push("SHAPE_ENCODING".into());
            args.push(encoding.to_string());
        }

        args
    }

    async fn run(&self, ctx: &LoadContext<'_>) -> Result<StagedLoad, SourceFailure> {
        let fail = |reason: String| SourceFailure::conversion(STRATEGY, reason);

        if !self.tool.enabled {
            return Err(fail("disabled by configuration".into()));
        }

        let version = tool_version(&self.tool.program, self.tool.version_timeout())
            .await
            .map_err(|e| fail(e.to_string()))?;
        debug!(version = %version, "ogr2ogr available");

        let args = self.build_args(ctx);
        let envs: Vec<(&str, &str)> = self
            .database
            .password
            .as_deref()
            .map(|p| vec![("PGPASSWORD", p)])
            .unwrap_or_default();

        let output = run_tool(&self.tool.program, &args, &envs, self.tool.timeout())
            .await
            .map_err(|e| fail(e.to_string()))?;
        if !output.stderr.is_empty() {
            debug!(stderr = %output.stderr, "ogr2ogr diagnostics");
        }

        let rows = staging::count_rows(ctx.store, ctx.staging_table)
            .await
            .map_err(|e| fail(format!("{e:#}")))?;
        if rows == 0 {
            return Err(fail("zero rows loaded".into()));
        }

        let flagged = match staging::count_outside_envelope(ctx.store, ctx.staging_table, ctx.envelope).await {
            Ok(n) => n,
            Err(e) => {
                warn!(error = %format!("{e:#}"), "Envelope check skipped");
                0
            }
        };
        if flagged > 0 {
            warn!(flagged, "Staged geometries outside the national envelope");
        }

        let source_features = ctx
            .shapefile
            .component("shx")
            .and_then(|c| c.path.as_ref())
            .and_then(|p| std::fs::read(p).ok())
            .map(|data| esri_shp::parser::shx::record_count(&data))
            .unwrap_or(rows as usize);

        info!(rows, source_features, "ogr2ogr conversion finished");

        Ok(StagedLoad {
            method: ImportMethod::Ogr2Ogr,
            rows,
            source_features,
            rejected: Vec::new(),
            repaired: 0,
            flagged,
        })
    }
}

impl GeometrySource for OgrBridge {
    fn name(&self) -> &'static str {
        STRATEGY
    }

    fn load<'a>(&'a self, ctx: &'a LoadContext<'a>) -> BoxFuture<'a, Result<StagedLoad, SourceFailure>> {
        self.run(ctx).boxed()
    }
}
