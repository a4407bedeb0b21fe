//! Validation des composants d'un shapefile
//!
//! `.shp`, `.shx` et `.dbf` sont obligatoires (présents, lisibles, non vides) ;
//! `.prj` et `.cpg` sont optionnels et leur absence est seulement journalisée.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::ValidationError;

pub const REQUIRED: [&str; 3] = ["shp", "shx", "dbf"];
pub const OPTIONAL: [&str; 2] = ["prj", "cpg"];

/// État d'un fichier composant
#[derive(Debug, Clone, Serialize)]
pub struct ComponentStatus {
    /// Extension en minuscules, sans point
    pub extension: String,
    pub path: Option<PathBuf>,
    pub required: bool,
    pub exists: bool,
    pub readable: bool,
    pub size: u64,
}

/// Shapefile dont les composants obligatoires ont été vérifiés
#[derive(Debug, Clone, Serialize)]
pub struct ValidatedShapefile {
    /// Chemin effectif du `.shp`
    pub shp: PathBuf,
    pub components: Vec<ComponentStatus>,
    pub total_size: u64,
    /// Contenu trimé du `.cpg`
    pub encoding: Option<String>,
    /// Contenu trimé du `.prj`
    pub projection: Option<String>,
}

impl ValidatedShapefile {
    pub fn component(&self, extension: &str) -> Option<&ComponentStatus> {
        self.components.iter().find(|c| c.extension == extension)
    }

    /// Nom de fichier sans extension, utilisé comme nom de dataset par défaut
    pub fn stem(&self) -> String {
        self.shp
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Empreinte blake3 de chaque composant lisible, par extension
    pub fn file_hashes(&self) -> Result<BTreeMap<String, String>> {
        let mut hashes = BTreeMap::new();
        for component in self.components.iter().filter(|c| c.readable) {
            if let Some(path) = &component.path {
                hashes.insert(component.extension.clone(), compute_file_checksum(path)?);
            }
        }
        Ok(hashes)
    }
}

/// Base commune des composants : le chemin sans son extension de composant
fn base_path(path: &Path) -> PathBuf {
    let known = path.extension().and_then(|e| e.to_str()).is_some_and(|ext| {
        REQUIRED
            .iter()
            .chain(OPTIONAL.iter())
            .any(|c| c.eq_ignore_ascii_case(ext))
    });
    if known {
        path.with_extension("")
    } else {
        path.to_path_buf()
    }
}

/// Chemin du composant, extension en minuscules puis en majuscules
fn locate(base: &Path, extension: &str) -> Option<PathBuf> {
    [extension.to_ascii_lowercase(), extension.to_ascii_uppercase()]
        .into_iter()
        .map(|ext| {
            let mut name = base.as_os_str().to_owned();
            name.push(".");
            name.push(ext);
            PathBuf::from(name)
        })
        .find(|p| p.is_file())
}

fn inspect_component(base: &Path, extension: &str, required: bool) -> ComponentStatus {
    let path = locate(base, extension);
    let (readable, size) = match &path {
        Some(p) => match File::open(p).and_then(|f| f.metadata()) {
            Ok(meta) => (true, meta.len()),
            Err(e) => {
                debug!(path = %p.display(), error = %e, "Component not readable");
                (false, 0)
            }
        },
        None => (false, 0),
    };
    ComponentStatus {
        extension: extension.to_string(),
        exists: path.is_some(),
        path,
        required,
        readable,
        size,
    }
}

fn read_trimmed(path: &Path) -> Option<String> {
    match std::fs::read(path) {
        Ok(raw) => {
            let text = String::from_utf8_lossy(&raw).trim().to_string();
            (!text.is_empty()).then_some(text)
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Optional component unreadable");
            None
        }
    }
}

/// Vérifie les composants à partir du `.shp`, d'un autre composant ou du chemin de base
pub fn validate(path: &Path) -> Result<ValidatedShapefile, ValidationError> {
    let base = base_path(path);

    let mut components = Vec::with_capacity(REQUIRED.len() + OPTIONAL.len());
    let mut missing = Vec::new();
    let mut unreadable = Vec::new();

    for ext in REQUIRED {
        let status = inspect_component(&base, ext, true);
        if !status.exists {
            missing.push(format!(".{ext}"));
        } else if !status.readable {
            unreadable.push(format!(".{ext}"));
        } else if status.size == 0 {
            unreadable.push(format!(".{ext} (empty)"));
        }
        components.push(status);
    }

    for ext in OPTIONAL {
        let status = inspect_component(&base, ext, false);
        if !status.exists {
            debug!(extension = ext, "Optional component absent");
        }
        components.push(status);
    }

    let shp = components
        .first()
        .and_then(|c| c.path.clone())
        .unwrap_or_else(|| base.with_extension("shp"));

    if !missing.is_empty() || !unreadable.is_empty() {
        return Err(ValidationError {
            path: shp,
            missing,
            unreadable,
        });
    }

    let optional_text = |ext: &str| {
        components
            .iter()
            .find(|c| c.extension == ext && c.readable)
            .and_then(|c| c.path.as_deref())
            .and_then(read_trimmed)
    };
    let encoding = optional_text("cpg");
    let projection = optional_text("prj");
    let total_size = components.iter().map(|c| c.size).sum();

    debug!(
        shp = %shp.display(),
        total_size,
        encoding = ?encoding,
        has_prj = projection.is_some(),
        "Shapefile components validated"
    );

    Ok(ValidatedShapefile {
        shp,
        components,
        total_size,
        encoding,
        projection,
    })
}

/// Calcule le checksum blake3 d'un fichier
pub fn compute_file_checksum(path: &Path) -> Result<String> {
    let mut file = File::open(path).with_context(|| format!("Cannot open {}", path.display()))?;
    let mut hasher = blake3::Hasher::new();
    let mut buffer = [0u8; 65536];

    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hasher.finalize().to_hex().to_string())
}
