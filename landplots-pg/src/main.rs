//! Point d'entrée CLI pour landplots-pg

use anyhow::Result;
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::{fmt, EnvFilter};

// Charger .env au démarrage
fn load_env() {
    // Chercher .env dans le répertoire courant ou parent
    if dotenvy::dotenv().is_err() {
        // Essayer depuis le répertoire du binaire
        if let Ok(exe) = std::env::current_exe() {
            if let Some(dir) = exe.parent() {
                let _ = dotenvy::from_path(dir.join(".env"));
            }
        }
    }
}

mod cli;

use cli::Commands;

/// Importer des parcelles foncières (shapefiles) vers PostGIS
#[derive(Parser)]
#[command(name = "landplots-pg")]
#[command(author, version)]
#[command(about = "Importer des shapefiles de parcelles foncières vers PostGIS")]
#[command(long_about = "Charge un shapefile via ogr2ogr (ou le lecteur natif), reprojette en EPSG:4326, \
fusionne les attributs et fait un upsert idempotent dans land_plots.\n\n\
Utilisez 'inspect' pour une lecture à blanc sans base de données.")]
struct Cli {
    /// Augmenter la verbosité (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Mode silencieux
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Charger .env avant tout
    load_env();

    let cli = Cli::parse();

    // Configurer le logging
    init_logging(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Import(args) => {
            info!(shapefile = %args.shapefile.display(), dataset = ?args.dataset, "Import vers PostGIS");
            cli::cmd_import(args).await?;
        }
        Commands::Inspect(args) => {
            info!(shapefile = %args.shapefile.display(), "Inspection");
            cli::cmd_inspect(args).await?;
        }
    }

    Ok(())
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => Level::WARN,
        (_, 0) => Level::INFO,
        (_, 1) => Level::DEBUG,
        (_, _) => Level::TRACE,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .init();
}
