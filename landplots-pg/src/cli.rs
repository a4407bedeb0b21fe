//! Définition et implémentation des commandes CLI
//!
//! - `import`: shapefile → PostGIS (upsert idempotent + registre)
//! - `inspect`: validation, métadonnées et lecture à blanc (sans DB)

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Result;
use clap::{Args, Subcommand};
use tracing::info;

use landplots_pg::config::{ConflictPolicy, ImportConfig};
use landplots_pg::merge::Location;
use landplots_pg::pipeline::{default_sources, inspect_dataset, ImportRequest, Pipeline};
use landplots_pg::report::ImportReport;
use landplots_pg::store::{create_pool, test_connection, DatabaseConfig, DatabaseOverrides, SslMode, Store};

#[derive(Subcommand)]
pub enum Commands {
    /// Import a land-plot shapefile into PostGIS
    Import(ImportArgs),

    /// Validate and dry-read a shapefile (no database required)
    Inspect(InspectArgs),
}

#[derive(Args)]
pub struct ImportArgs {
    /// Path to the .shp file (sibling .shx/.dbf/.prj/.cpg are discovered)
    #[arg(short, long)]
    pub shapefile: PathBuf,

    /// Dataset name (default: file stem)
    #[arg(short, long)]
    pub dataset: Option<String>,

    /// District of every plot in the dataset
    #[arg(long)]
    pub district: String,

    /// Ward of every plot in the dataset
    #[arg(long)]
    pub ward: String,

    /// Village of every plot in the dataset
    #[arg(long)]
    pub village: String,

    /// Target PostgreSQL schema
    #[arg(long, default_value = "public")]
    pub schema: String,

    /// Config preset name (tanzania) or path to a JSON config
    #[arg(long, default_value = "tanzania")]
    pub config: String,

    /// On plot_code conflict: skip, update_attributes (default from config)
    #[arg(long)]
    pub conflict_policy: Option<ConflictPolicy>,

    /// Never call ogr2ogr, read the shapefile natively
    #[arg(long)]
    pub no_bridge: bool,

    /// Source CRS override (EPSG:<code>), takes precedence over the .prj
    #[arg(long)]
    pub s_srs: Option<String>,

    /// Attribute encoding override (default: .cpg, then DBF language driver, then Windows-1252)
    #[arg(long)]
    pub encoding: Option<String>,

    /// Fixed staging table name (default: randomized per run)
    #[arg(long)]
    pub staging_table: Option<String>,

    /// Save the import report as JSON
    #[arg(long)]
    pub report: Option<PathBuf>,

    #[command(flatten)]
    pub database: DatabaseArgs,
}

#[derive(Args)]
pub struct DatabaseArgs {
    /// PostgreSQL host (défaut : env PGHOST / localhost)
    #[arg(long)]
    pub host: Option<String>,

    /// PostgreSQL port (défaut : env PGPORT / 5432)
    #[arg(long)]
    pub port: Option<u16>,

    /// PostgreSQL database name (défaut : env PGDATABASE / landplots)
    #[arg(long, alias = "dbname")]
    pub database: Option<String>,

    /// PostgreSQL user (défaut : env PGUSER / postgres)
    #[arg(long)]
    pub user: Option<String>,

    /// PostgreSQL password (défaut : env PGPASSWORD)
    #[arg(long)]
    pub password: Option<String>,

    /// SSL mode: disable, prefer, require (défaut : env PGSSLMODE / disable)
    #[arg(long)]
    pub ssl: Option<SslMode>,
}

impl From<DatabaseArgs> for DatabaseOverrides {
    fn from(args: DatabaseArgs) -> Self {
        Self {
            host: args.host,
            port: args.port,
            dbname: args.database,
            user: args.user,
            password: args.password,
            ssl_mode: args.ssl,
        }
    }
}

#[derive(Args)]
pub struct InspectArgs {
    /// Path to the .shp file
    #[arg(short, long)]
    pub shapefile: PathBuf,

    /// Source CRS override (EPSG:<code>)
    #[arg(long)]
    pub s_srs: Option<String>,

    /// Attribute encoding override (default: .cpg, then DBF language driver, then Windows-1252)
    #[arg(long)]
    pub encoding: Option<String>,

    /// Config preset name (tanzania) or path to a JSON config
    #[arg(long, default_value = "tanzania")]
    pub config: String,
}

/// Exécute la commande import
pub async fn cmd_import(args: ImportArgs) -> Result<()> {
    let mut config = ImportConfig::resolve(&args.config)?;
    if let Some(policy) = args.conflict_policy {
        config.conflict_policy = policy;
    }
    if args.no_bridge {
        config.bridge.enabled = false;
    }

    let request = ImportRequest {
        shapefile: args.shapefile,
        dataset: args.dataset,
        location: Location {
            district: args.district,
            ward: args.ward,
            village: args.village,
        },
        source_srs: args.s_srs,
        encoding: args.encoding,
        staging_table: args.staging_table,
    };
    let dataset = request.dataset_name();

    println!("=== Import {} ===", dataset);
    println!("Shapefile: {}", request.shapefile.display());
    println!("Schema: {}", args.schema);
    println!("Config: {} (probes v{})", args.config, config.version);
    println!("Conflict policy: {:?}", config.conflict_policy);
    println!(
        "Bridge: {}",
        if config.bridge.enabled { config.bridge.program.as_str() } else { "disabled" }
    );

    // Connecter à PostgreSQL
    let db_config = DatabaseConfig::from_env().with_overrides(args.database.into());
    println!(
        "Database: {}@{}:{}/{} (SSL: {:?})",
        db_config.user, db_config.host, db_config.port, db_config.dbname, db_config.ssl_mode
    );

    let pool = create_pool(&db_config).await?;
    test_connection(&pool).await?;
    let store = Store::new(pool, &args.schema)?;

    let sources = default_sources(&config, &db_config);
    let pipeline = Pipeline::new(store, config, sources);

    let started_at = Instant::now();
    let mut report = ImportReport::new(&dataset, &request.shapefile);
    let result = pipeline.run(&request, &mut report).await;

    report.set_duration(started_at.elapsed());
    report.finalize();
    report.display();

    if let Some(path) = &args.report {
        report.save_to_file(path)?;
        info!(path = %path.display(), "Report saved");
    }

    result?;
    Ok(())
}

/// Exécute la commande inspect
pub async fn cmd_inspect(args: InspectArgs) -> Result<()> {
    let config = ImportConfig::resolve(&args.config)?;
    let outcome = inspect_dataset(
        &args.shapefile,
        args.s_srs.as_deref(),
        args.encoding.as_deref(),
        &config,
    )
    .await?;

    println!("=== Inspect {} ===", outcome.shapefile.stem());
    println!("Shapefile: {}", outcome.shapefile.shp.display());
    for component in &outcome.shapefile.components {
        let state = match (component.exists, component.readable) {
            (false, _) => "missing".to_string(),
            (true, false) => "unreadable".to_string(),
            (true, true) => format!("{} bytes", component.size),
        };
        println!("  .{:<4} {}", component.extension, state);
    }
    println!(
        "CRS: {} ({:?})",
        outcome
            .crs
            .epsg
            .map(|c| format!("EPSG:{}", c))
            .unwrap_or_else(|| "unknown".into()),
        outcome.crs.origin
    );
    let encoding_origin = match (&args.encoding, &outcome.shapefile.encoding) {
        (Some(_), _) => "override",
        (None, Some(_)) => ".cpg",
        (None, None) => "DBF language driver or Windows-1252 default",
    };
    println!("Encoding: {} ({})", outcome.stats.encoding, encoding_origin);

    let meta = &outcome.metadata;
    println!("\n--- LAYER ---");
    println!("Name: {}", meta.layer_name.as_deref().unwrap_or("-"));
    println!("Geometry: {}", meta.geometry_type.as_deref().unwrap_or("-"));
    if let Some([min_x, min_y, max_x, max_y]) = meta.extent {
        println!("Extent: ({}, {}) - ({}, {})", min_x, min_y, max_x, max_y);
    }
    for (name, kind) in &meta.fields {
        println!("  {}: {}", name, kind);
    }

    let stats = &outcome.stats;
    println!("\n--- DRY READ ---");
    println!("Features: {}", stats.source_features);
    println!("Readable: {}", stats.accepted);
    println!("Rejected: {}", stats.rejected.len());
    println!("Repaired: {}", stats.repaired);
    println!("Outside envelope: {}", stats.flagged);
    for e in stats.rejected.iter().take(20) {
        println!("  {}", e);
    }

    Ok(())
}
