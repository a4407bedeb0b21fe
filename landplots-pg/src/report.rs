//! Rapport d'import avec graceful degradation
//!
//! Ce module collecte les compteurs de chaque étape, les erreurs par entité et
//! les avertissements, puis les affiche ou les sauvegarde en JSON.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use serde::Serialize;

use crate::source::ImportMethod;
use crate::store::upsert::{DatasetDiagnostics, UpsertReport};

/// Statut global de l'import
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ImportStatus {
    /// Import réussi sans erreur
    Success,
    /// Import réussi avec des entités rejetées
    PartialSuccess,
    /// Upsert annulé (rollback)
    RolledBack,
    /// Import échoué avant l'upsert
    Failed,
}

/// Niveau de sévérité des erreurs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorLevel {
    /// Erreur fatale: import abandonné
    Fatal,
    /// Erreur: entité écartée
    Error,
}

/// Erreur d'import avec contexte
#[derive(Debug, Clone, Serialize)]
pub struct ReportError {
    pub level: ErrorLevel,
    /// Catégorie (`empty`, `unrepairable`, `upsert`, ...)
    pub kind: String,
    /// Index de l'enregistrement source ou position dans le staging
    pub record: Option<usize>,
    pub message: String,
}

/// Rapport complet d'import
#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    pub dataset: String,
    pub shapefile: String,
    pub duration_secs: f64,
    pub status: ImportStatus,

    /// Stratégie ayant chargé le staging
    pub method: Option<ImportMethod>,
    /// Échecs des stratégies essayées avant (ou à la place de) celle retenue
    pub source_failures: Vec<String>,

    // Compteurs
    pub source_features: usize,
    pub staged_rows: u64,
    pub plots_merged: usize,
    pub features_rejected: usize,
    pub geometries_repaired: usize,
    pub outside_envelope: u64,
    pub plots_inserted: usize,
    pub plots_updated: usize,
    pub plots_unchanged: usize,
    pub plots_rejected_by_store: usize,

    /// Rejets par catégorie
    pub rejected_by_kind: BTreeMap<String, usize>,

    pub ledger_recorded: bool,
    pub diagnostics: Option<DatasetDiagnostics>,

    pub errors: Vec<ReportError>,
    pub warnings: Vec<String>,
}

impl ImportReport {
    pub fn new(dataset: &str, shapefile: &Path) -> Self {
        Self {
            dataset: dataset.to_string(),
            shapefile: shapefile.display().to_string(),
            duration_secs: 0.0,
            status: ImportStatus::Success,
            method: None,
            source_failures: Vec::new(),
            source_features: 0,
            staged_rows: 0,
            plots_merged: 0,
            features_rejected: 0,
            geometries_repaired: 0,
            outside_envelope: 0,
            plots_inserted: 0,
            plots_updated: 0,
            plots_unchanged: 0,
            plots_rejected_by_store: 0,
            rejected_by_kind: BTreeMap::new(),
            ledger_recorded: false,
            diagnostics: None,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Enregistre une entité écartée (lecture ou fusion)
    pub fn record_rejection(&mut self, kind: &str, record: Option<usize>, message: String) {
        self.features_rejected += 1;
        *self.rejected_by_kind.entry(kind.to_string()).or_default() += 1;
        self.errors.push(ReportError {
            level: ErrorLevel::Error,
            kind: kind.to_string(),
            record,
            message,
        });
    }

    /// Enregistre une erreur fatale
    pub fn record_fatal(&mut self, kind: &str, message: String) {
        self.errors.push(ReportError {
            level: ErrorLevel::Fatal,
            kind: kind.to_string(),
            record: None,
            message,
        });
    }

    pub fn record_warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    /// Reporte les compteurs de l'upsert
    pub fn record_upsert(&mut self, upsert: &UpsertReport) {
        self.plots_inserted = upsert.inserted;
        self.plots_updated = upsert.updated;
        self.plots_unchanged = upsert.unchanged;
        self.plots_rejected_by_store = upsert.rejected;
        if upsert.rejected > 0 {
            *self.rejected_by_kind.entry("store_guard".into()).or_default() += upsert.rejected;
        }
    }

    /// Définit la durée de l'import
    pub fn set_duration(&mut self, duration: Duration) {
        self.duration_secs = duration.as_secs_f64();
    }

    /// Marque l'upsert comme annulé
    pub fn mark_rolled_back(&mut self, reason: String) {
        self.record_fatal("upsert", reason);
        self.plots_inserted = 0;
        self.plots_updated = 0;
        self.plots_unchanged = 0;
        self.status = ImportStatus::RolledBack;
    }

    /// Détermine le statut final basé sur les erreurs
    pub fn finalize(&mut self) {
        if self.status == ImportStatus::RolledBack {
            return;
        }
        let has_fatal = self.errors.iter().any(|e| e.level == ErrorLevel::Fatal);
        let has_rejections = self.features_rejected > 0 || self.plots_rejected_by_store > 0;

        self.status = if has_fatal {
            ImportStatus::Failed
        } else if has_rejections && self.total_plots() > 0 {
            ImportStatus::PartialSuccess
        } else if has_rejections {
            ImportStatus::Failed
        } else {
            ImportStatus::Success
        };
    }

    /// Parcelles traitées par l'upsert (hors rejets)
    pub fn total_plots(&self) -> usize {
        self.plots_inserted + self.plots_updated + self.plots_unchanged
    }

    /// Affiche le rapport sur la console
    pub fn display(&self) {
        println!("\n{}", "=".repeat(60));
        println!("IMPORT REPORT - Dataset {}", self.dataset);
        println!("{}", "=".repeat(60));

        println!("\nStatus: {:?}", self.status);
        println!("Shapefile: {}", self.shapefile);
        println!("Duration: {:.2}s", self.duration_secs);
        if let Some(method) = self.method {
            println!("Method: {}", method);
        }
        for failure in &self.source_failures {
            println!("  fallback after: {}", failure);
        }

        println!("\n--- SUMMARY ---");
        println!(
            "Features: {} in source, {} staged, {} merged, {} rejected, {} repaired, {} outside envelope",
            self.source_features,
            self.staged_rows,
            self.plots_merged,
            self.features_rejected,
            self.geometries_repaired,
            self.outside_envelope
        );
        println!(
            "Plots: {} inserted, {} updated, {} unchanged, {} rejected by store",
            self.plots_inserted, self.plots_updated, self.plots_unchanged, self.plots_rejected_by_store
        );
        println!("Ledger: {}", if self.ledger_recorded { "recorded" } else { "not recorded" });

        if !self.rejected_by_kind.is_empty() {
            println!("\n--- REJECTIONS ---");
            for (kind, count) in &self.rejected_by_kind {
                println!("  {}: {}", kind, count);
            }
        }

        if let Some(d) = &self.diagnostics {
            println!("\n--- DIAGNOSTICS ---");
            println!("  plots stored for dataset: {}", d.plot_count);
            if let (Some(min), Some(max), Some(avg), Some(total)) =
                (d.area_min, d.area_max, d.area_avg, d.area_total)
            {
                println!(
                    "  area (ha): min {:.4}, max {:.4}, avg {:.4}, total {:.4}",
                    min, max, avg, total
                );
            }
            if let Some([min_x, min_y, max_x, max_y]) = d.extent {
                println!(
                    "  extent: ({:.6}, {:.6}) - ({:.6}, {:.6})",
                    min_x, min_y, max_x, max_y
                );
            }
        }

        if !self.warnings.is_empty() {
            println!("\n--- WARNINGS ({}) ---", self.warnings.len());
            for w in self.warnings.iter().take(10) {
                println!("  {}", w);
            }
            if self.warnings.len() > 10 {
                println!("  ... and {} more", self.warnings.len() - 10);
            }
        }

        if !self.errors.is_empty() {
            println!("\n--- ERRORS ({}) ---", self.errors.len());
            for e in self.errors.iter().take(20) {
                let location = e.record.map(|r| format!("[#{}]", r)).unwrap_or_default();
                println!("  {:?} {} {}", e.level, location, e.message);
            }
            if self.errors.len() > 20 {
                println!("  ... and {} more", self.errors.len() - 20);
            }
        }

        println!("\n{}", "=".repeat(60));
    }

    /// Sauvegarde le rapport en JSON
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Affichage compact pour le résumé
    pub fn summary(&self) -> String {
        format!(
            "{}: {} inserted, {} updated, {} unchanged, {} rejected",
            self.dataset,
            self.plots_inserted,
            self.plots_updated,
            self.plots_unchanged,
            self.features_rejected + self.plots_rejected_by_store
        )
    }
}
