//! Orchestration d'un import
//!
//! VALIDATE → sources (pont puis lecteur natif) → MERGE → UPSERT → LEDGER.
//! Tout échec avant l'upsert interrompt l'import ; l'upsert est validé ou annulé
//! en bloc ; le registre n'est jamais bloquant. La table de staging est supprimée
//! dans tous les cas.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::anyhow;
use tracing::{info, warn};

use crate::config::ImportConfig;
use crate::error::ImportError;
use crate::merge::{merge_rows, Location};
use crate::reproject::{resolve_source_crs, SourceCrs};
use crate::report::ImportReport;
use crate::source::inspect::{inspect_layer, LayerMetadata};
use crate::source::native::{read_shapefile, ReadJob, ReadStats};
use crate::source::{load_with_fallback, GeometrySource, LoadContext, NativeReader, OgrBridge, StagedLoad};
use crate::store::ledger::{record_import_logged, LedgerEntry};
use crate::store::staging::{self, StagedRow};
use crate::store::upsert::{upsert_plots, verify_dataset};
use crate::store::{is_valid_identifier, schema, DatabaseConfig, Store};
use crate::validate::{validate, ValidatedShapefile};

/// Paramètres d'un import
#[derive(Debug, Clone)]
pub struct ImportRequest {
    pub shapefile: PathBuf,
    /// Nom du jeu de données ; par défaut le nom du fichier sans extension
    pub dataset: Option<String>,
    pub location: Location,
    /// Surcharge du système source (`EPSG:n`)
    pub source_srs: Option<String>,
    /// Surcharge de l'encodage des attributs
    pub encoding: Option<String>,
    /// Nom de staging imposé (sinon aléatoire)
    pub staging_table: Option<String>,
}

impl ImportRequest {
    pub fn dataset_name(&self) -> String {
        self.dataset
            .clone()
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| dataset_from_path(&self.shapefile))
    }
}

fn dataset_from_path(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Sources par défaut : le pont si activé, puis le lecteur natif
pub fn default_sources(config: &ImportConfig, database: &DatabaseConfig) -> Vec<Box<dyn GeometrySource>> {
    let mut sources: Vec<Box<dyn GeometrySource>> = Vec::new();
    if config.bridge.enabled {
        sources.push(Box::new(OgrBridge::new(config.bridge.clone(), database.clone())));
    }
    sources.push(Box::new(NativeReader::new(config.batch_size)));
    sources
}

pub struct Pipeline {
    store: Store,
    config: ImportConfig,
    sources: Vec<Box<dyn GeometrySource>>,
}

impl Pipeline {
    pub fn new(store: Store, config: ImportConfig, sources: Vec<Box<dyn GeometrySource>>) -> Self {
        Self {
            store,
            config,
            sources,
        }
    }

    /// Exécute l'import ; le rapport est rempli même en cas d'échec
    pub async fn run(&self, request: &ImportRequest, report: &mut ImportReport) -> Result<(), ImportError> {
        let result = self.execute(request, report).await;
        match &result {
            Ok(()) => {}
            Err(ImportError::Upsert(e)) => report.mark_rolled_back(format!("{e:#}")),
            Err(e) => report.record_fatal(fatal_kind(e), e.to_string()),
        }
        result
    }

    async fn execute(&self, request: &ImportRequest, report: &mut ImportReport) -> Result<(), ImportError> {
        // VALIDATE
        let shapefile = validate(&request.shapefile)?;
        let dataset = request.dataset_name();
        report.shapefile = shapefile.shp.display().to_string();

        let staging_table = staging::staging_table_name(&dataset, request.staging_table.as_deref());
        if !is_valid_identifier(&staging_table) {
            return Err(anyhow!("Invalid staging table name: {}", staging_table).into());
        }

        let prj = shapefile.projection.as_deref().map(esri_shp::parser::prj::parse);
        let crs = resolve_source_crs(request.source_srs.as_deref(), prj.as_ref())?;
        let encoding = request.encoding.clone().or_else(|| shapefile.encoding.clone());

        info!(
            dataset = %dataset,
            epsg = ?crs.epsg,
            crs_origin = ?crs.origin,
            encoding = ?encoding,
            "Shapefile validated"
        );

        schema::ensure_schema(&self.store).await?;

        let metadata = inspect_layer(&shapefile.shp, &self.config.inspector, encoding.as_deref()).await;

        // SOURCES : staging toujours supprimé ensuite
        let ctx = LoadContext {
            store: &self.store,
            shapefile: &shapefile,
            dataset: &dataset,
            staging_table: &staging_table,
            crs: &crs,
            envelope: &self.config.envelope,
            encoding: encoding.as_deref(),
        };
        let staged = self.stage(&ctx).await;
        if let Err(e) = staging::drop_staging(&self.store, &staging_table).await {
            warn!(table = %staging_table, error = %format!("{e:#}"), "Failed to drop staging table");
        }
        let (load, rows) = match staged {
            Ok(staged) => staged,
            Err(e) => {
                if let ImportError::SourcesExhausted(failures) = &e {
                    report.source_failures = failures.iter().map(ToString::to_string).collect();
                }
                return Err(e);
            }
        };

        report.method = Some(load.method);
        report.source_features = load.source_features;
        report.staged_rows = load.rows;
        report.geometries_repaired = load.repaired;
        report.outside_envelope = load.flagged;
        for e in &load.rejected {
            report.record_rejection(e.kind(), Some(e.index()), e.to_string());
        }
        if load.flagged > 0 {
            report.record_warning(format!(
                "{} geometries fall outside the national envelope",
                load.flagged
            ));
        }

        // MERGE
        let outcome = merge_rows(rows, &dataset, load.method, &self.config.probes);
        report.plots_merged = outcome.plots.len();
        report.geometries_repaired += outcome.repaired;
        for rejected in &outcome.rejected {
            report.record_rejection("merge", Some(rejected.position), rejected.reason.clone());
        }
        if outcome.plots.is_empty() {
            return Err(ImportError::NothingToImport {
                rejected: outcome.rejected.len(),
            });
        }

        // UPSERT
        let upsert = upsert_plots(
            &self.store,
            &outcome.plots,
            &request.location,
            &dataset,
            self.config.conflict_policy,
        )
        .await?;
        report.record_upsert(&upsert);

        match verify_dataset(&self.store, &dataset, &upsert, &self.config.envelope).await {
            Ok(diagnostics) => {
                if diagnostics.outside_envelope {
                    report.record_warning("dataset extent falls outside the national envelope");
                }
                report.diagnostics = Some(diagnostics);
            }
            Err(e) => warn!(error = %format!("{e:#}"), "Dataset diagnostics unavailable"),
        }

        // LEDGER
        let file_hashes = shapefile.file_hashes().unwrap_or_else(|e| {
            warn!(error = %format!("{e:#}"), "Failed to hash shapefile components");
            BTreeMap::new()
        });
        let entry = LedgerEntry {
            dataset_name: dataset.clone(),
            prj: shapefile.projection.clone(),
            cpg: shapefile.encoding.clone(),
            dbf_schema: metadata.fields.into_iter().collect(),
            file_hashes,
            feature_count: load.source_features,
            bbox: outcome.bbox,
        };
        report.ledger_recorded = record_import_logged(&self.store, &entry).await;
        if !report.ledger_recorded {
            report.record_warning("import provenance was not recorded");
        }

        info!(summary = %report.summary(), "Import finished");
        Ok(())
    }

    async fn stage(&self, ctx: &LoadContext<'_>) -> Result<(StagedLoad, Vec<StagedRow>), ImportError> {
        let load = load_with_fallback(&self.sources, ctx).await?;
        let rows = staging::read_staged_rows(ctx.store, ctx.staging_table).await?;
        Ok((load, rows))
    }
}

/// Résultat d'une inspection à blanc (aucune base de données)
#[derive(Debug)]
pub struct InspectOutcome {
    pub shapefile: ValidatedShapefile,
    pub crs: SourceCrs,
    pub encoding: Option<String>,
    pub metadata: LayerMetadata,
    pub stats: ReadStats,
}

/// Valide, résout le système source, lit les métadonnées et fait une lecture
/// native complète sans rien écrire
pub async fn inspect_dataset(
    path: &Path,
    source_srs: Option<&str>,
    encoding: Option<&str>,
    config: &ImportConfig,
) -> Result<InspectOutcome, ImportError> {
    let shapefile = validate(path)?;
    let prj = shapefile.projection.as_deref().map(esri_shp::parser::prj::parse);
    let crs = resolve_source_crs(source_srs, prj.as_ref())?;
    let encoding = encoding.map(str::to_string).or_else(|| shapefile.encoding.clone());

    let metadata = inspect_layer(&shapefile.shp, &config.inspector, encoding.as_deref()).await;

    let job = ReadJob {
        shp: shapefile.shp.clone(),
        encoding: encoding.clone(),
        crs: crs.clone(),
        envelope: config.envelope,
        batch_size: config.batch_size,
    };
    let stats = tokio::task::spawn_blocking(move || read_shapefile(&job, |_| Ok(())))
        .await
        .map_err(|e| anyhow!("Native reader task failed: {}", e))??;

    Ok(InspectOutcome {
        shapefile,
        crs,
        encoding,
        metadata,
        stats,
    })
}

fn fatal_kind(error: &ImportError) -> &'static str {
    match error {
        ImportError::Validation(_) => "validation",
        ImportError::SourcesExhausted(_) => "sources",
        ImportError::NothingToImport { .. } => "merge",
        ImportError::Upsert(_) => "upsert",
        ImportError::Store(_) => "store",
    }
}
