//! Transaction atomique de l'étape d'upsert
//!
//! Garantit le rollback en cas d'erreur : la table des parcelles n'est jamais
//! à moitié écrite pour un import.

use anyhow::{Context, Result};
use deadpool_postgres::{Object, Transaction};
use tracing::{error, info};

use super::upsert::{UpsertReport, UpsertResult};

/// Transaction d'upsert pour un jeu de données
pub struct UpsertTransaction<'a> {
    transaction: Transaction<'a>,
    dataset: String,
    report: UpsertReport,
}

impl<'a> UpsertTransaction<'a> {
    /// Démarre la transaction
    ///
    /// # Errors
    /// Retourne une erreur si la transaction ne peut pas être démarrée
    pub async fn begin(client: &'a mut Object, dataset: &str) -> Result<Self> {
        let transaction = client
            .transaction()
            .await
            .context("Failed to begin transaction")?;

        info!(dataset, "Starting upsert transaction");

        Ok(Self {
            transaction,
            dataset: dataset.to_string(),
            report: UpsertReport::default(),
        })
    }

    /// Accède à la transaction sous-jacente pour exécuter des requêtes
    pub fn transaction(&self) -> &Transaction<'a> {
        &self.transaction
    }

    pub fn dataset(&self) -> &str {
        &self.dataset
    }

    /// Enregistre le résultat d'une ligne
    pub fn record(&mut self, result: UpsertResult) {
        self.report.record(result);
    }

    /// Valide la transaction et renvoie les compteurs
    ///
    /// # Errors
    /// Retourne une erreur si le commit échoue
    pub async fn commit(self) -> Result<UpsertReport> {
        self.transaction
            .commit()
            .await
            .context("Failed to commit transaction")?;

        info!(
            dataset = %self.dataset,
            inserted = self.report.inserted,
            updated = self.report.updated,
            unchanged = self.report.unchanged,
            rejected = self.report.rejected,
            "Upsert transaction committed"
        );

        Ok(self.report)
    }

    /// Annule la transaction (rollback)
    ///
    /// La transaction est également annulée si elle est droppée.
    pub async fn rollback(self, reason: &str) {
        error!(
            dataset = %self.dataset,
            reason = %reason,
            rows_attempted = self.report.total(),
            "Rolling back upsert transaction"
        );

        if let Err(e) = self.transaction.rollback().await {
            error!(error = %e, "Explicit rollback failed (will rollback on drop anyway)");
        }
    }
}
