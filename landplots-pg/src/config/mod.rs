//! Configuration de l'import
//!
//! Les listes de champs sondés, l'enveloppe nationale et la politique de conflit
//! sont des données versionnées (preset JSON embarqué ou fichier), jamais des
//! littéraux dispersés dans le code.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::reproject::Envelope;

/// Configuration principale
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ImportConfig {
    /// Version du jeu de règles de sondage
    pub version: u32,
    pub probes: FieldProbes,
    /// Enveloppe de contrôle après reprojection (EPSG:4326)
    pub envelope: Envelope,
    #[serde(default)]
    pub conflict_policy: ConflictPolicy,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    pub bridge: ToolConfig,
    pub inspector: ToolConfig,
}

/// Candidats ordonnés, comparés sans tenir compte de la casse
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FieldProbes {
    pub plot_code: Vec<String>,
    pub area: Vec<AreaProbe>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AreaProbe {
    pub field: String,
    pub unit: AreaUnit,
}

/// Unité d'un champ surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AreaUnit {
    Hectares,
    SquareMetres,
}

impl AreaUnit {
    /// Convertit une valeur dans cette unité en hectares
    pub fn to_hectares(self, value: f64) -> f64 {
        match self {
            AreaUnit::Hectares => value,
            AreaUnit::SquareMetres => value / 10_000.0,
        }
    }
}

/// Comportement sur conflit de `plot_code`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// `DO NOTHING`
    Skip,
    /// `DO UPDATE SET attributes, updated_at` (géométrie et localisation inchangées)
    #[default]
    UpdateAttributes,
}

impl FromStr for ConflictPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "skip" | "nothing" => Ok(ConflictPolicy::Skip),
            "update_attributes" | "update" => Ok(ConflictPolicy::UpdateAttributes),
            _ => Err(format!(
                "Invalid conflict policy: {}. Use: skip, update_attributes",
                s
            )),
        }
    }
}

/// Outil externe (ogr2ogr, ogrinfo)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ToolConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub program: String,
    pub timeout_secs: u64,
    #[serde(default = "default_version_timeout")]
    pub version_timeout_secs: u64,
}

impl ToolConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn version_timeout(&self) -> Duration {
        Duration::from_secs(self.version_timeout_secs)
    }
}

fn default_batch_size() -> usize {
    100
}

fn default_true() -> bool {
    true
}

fn default_version_timeout() -> u64 {
    10
}

impl ImportConfig {
    /// Charge une configuration depuis un fichier
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = serde_json::from_str(&content).context("Failed to parse config JSON")?;
        config.check()?;
        Ok(config)
    }

    /// Charge une configuration depuis un preset embarqué
    pub fn from_preset(preset: &str) -> Result<Self> {
        match preset {
            "tanzania" => Self::load_embedded(include_str!("presets/tanzania.json")),
            _ => anyhow::bail!("Unknown preset: {}. Use: tanzania", preset),
        }
    }

    /// Preset si le nom est connu, sinon chemin vers un fichier JSON
    pub fn resolve(spec: &str) -> Result<Self> {
        let path = Path::new(spec);
        if path.extension().is_some_and(|e| e.eq_ignore_ascii_case("json")) || path.is_file() {
            Self::load(path)
        } else {
            Self::from_preset(spec)
        }
    }

    fn load_embedded(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).context("Failed to parse embedded config")?;
        config.check()?;
        Ok(config)
    }

    fn check(&self) -> Result<()> {
        anyhow::ensure!(self.batch_size > 0, "batch_size must be positive");
        anyhow::ensure!(
            !self.probes.plot_code.is_empty(),
            "probes.plot_code must list at least one candidate"
        );
        anyhow::ensure!(self.envelope.is_valid(), "envelope bounds are inverted");
        Ok(())
    }
}
