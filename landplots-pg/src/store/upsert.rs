//! Upsert des parcelles canoniques, indexé par `plot_code`
//!
//! Une requête par ligne dans une transaction unique : la garde SQL rejette les
//! géométries nulles, invalides ou d'aire nulle, et `xmax = 0` distingue une
//! insertion d'une mise à jour.

use anyhow::{Context, Result};
use geo::Geometry;
use serde::Serialize;
use tracing::{debug, info, trace, warn};
use wkb::geom_to_wkb;

use super::transaction::UpsertTransaction;
use super::{Store, PLOTS_TABLE};
use crate::config::ConflictPolicy;
use crate::error::ImportError;
use crate::merge::{CanonicalPlot, Location};
use crate::reproject::{Envelope, WGS84_EPSG};

/// Résultat d'un upsert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertResult {
    /// Nouvelle parcelle insérée
    Inserted,
    /// Parcelle existante : attributs remplacés
    Updated,
    /// Parcelle existante laissée telle quelle (`skip`)
    Unchanged,
    /// Refusée par la garde SQL (géométrie invalide ou vide)
    Rejected,
}

/// Compteurs de l'étape d'upsert
#[derive(Debug, Clone, Default, Serialize)]
pub struct UpsertReport {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub rejected: usize,
}

impl UpsertReport {
    pub fn total(&self) -> usize {
        self.inserted + self.updated + self.unchanged + self.rejected
    }

    /// Lignes effectivement écrites (insérées ou mises à jour)
    pub fn written(&self) -> usize {
        self.inserted + self.updated
    }

    pub fn record(&mut self, result: UpsertResult) {
        match result {
            UpsertResult::Inserted => self.inserted += 1,
            UpsertResult::Updated => self.updated += 1,
            UpsertResult::Unchanged => self.unchanged += 1,
            UpsertResult::Rejected => self.rejected += 1,
        }
    }
}

/// Indicateurs calculés après commit, pour l'observabilité uniquement
#[derive(Debug, Clone, Default, Serialize)]
pub struct DatasetDiagnostics {
    pub plot_count: i64,
    pub area_min: Option<f64>,
    pub area_max: Option<f64>,
    pub area_avg: Option<f64>,
    pub area_total: Option<f64>,
    /// [min_x, min_y, max_x, max_y] en EPSG:4326
    pub extent: Option<[f64; 4]>,
    pub outside_envelope: bool,
}

/// Requête d'upsert d'une ligne selon la politique de conflit
pub fn upsert_sql(table: &str, policy: ConflictPolicy) -> String {
    let on_conflict = match policy {
        ConflictPolicy::Skip => "DO NOTHING".to_string(),
        ConflictPolicy::UpdateAttributes => {
            "DO UPDATE SET attributes = EXCLUDED.attributes, updated_at = NOW()".to_string()
        }
    };

    format!(
        r#"
        WITH candidate AS (
            SELECT $1::text AS plot_code,
                   ROUND($2::float8::numeric, 4) AS area_hectares,
                   $3::text AS district,
                   $4::text AS ward,
                   $5::text AS village,
                   $6::text AS dataset_name,
                   ST_Multi(ST_GeomFromEWKB($7::bytea)) AS geometry,
                   $8::text::jsonb || jsonb_build_object('import_timestamp', NOW()) AS attributes
        ),
        accepted AS (
            SELECT * FROM candidate
            WHERE geometry IS NOT NULL AND ST_IsValid(geometry) AND ST_Area(geometry) > 0
        ),
        written AS (
            INSERT INTO {table}
                (plot_code, status, area_hectares, district, ward, village, dataset_name, geometry, attributes)
            SELECT plot_code, 'available', area_hectares, district, ward, village, dataset_name, geometry, attributes
            FROM accepted
            ON CONFLICT (plot_code) {on_conflict}
            RETURNING (xmax = 0) AS inserted
        )
        SELECT (SELECT count(*) FROM accepted) AS valid,
               (SELECT inserted FROM written) AS inserted
        "#
    )
}

/// Interprète le retour de la requête d'upsert
fn classify(valid: i64, inserted: Option<bool>) -> UpsertResult {
    match (valid, inserted) {
        (0, _) => UpsertResult::Rejected,
        (_, Some(true)) => UpsertResult::Inserted,
        (_, Some(false)) => UpsertResult::Updated,
        (_, None) => UpsertResult::Unchanged,
    }
}

/// Écrit toutes les parcelles dans une transaction unique.
///
/// Toute erreur SQL annule la transaction entière ([`ImportError::Upsert`]).
pub async fn upsert_plots(
    store: &Store,
    plots: &[CanonicalPlot],
    location: &Location,
    dataset: &str,
    policy: ConflictPolicy,
) -> Result<UpsertReport, ImportError> {
    let mut client = store.client().await.map_err(ImportError::Upsert)?;
    let mut upsert = UpsertTransaction::begin(&mut client, dataset)
        .await
        .map_err(ImportError::Upsert)?;

    let sql = upsert_sql(&store.table(PLOTS_TABLE), policy);

    match write_plots(&mut upsert, &sql, plots, location).await {
        Ok(()) => upsert.commit().await.map_err(ImportError::Upsert),
        Err(e) => {
            upsert.rollback(&format!("{e:#}")).await;
            Err(ImportError::Upsert(e))
        }
    }
}

async fn write_plots(
    upsert: &mut UpsertTransaction<'_>,
    sql: &str,
    plots: &[CanonicalPlot],
    location: &Location,
) -> Result<()> {
    let statement = upsert
        .transaction()
        .prepare(sql)
        .await
        .context("Failed to prepare upsert statement")?;
    let dataset = upsert.dataset().to_string();

    for plot in plots {
        let ewkb = geometry_to_ewkb(&Geometry::MultiPolygon(plot.geometry.clone()), WGS84_EPSG)?;
        let attributes = serde_json::to_string(&plot.attributes)
            .context("Failed to serialize attributes")?;

        let row = upsert
            .transaction()
            .query_one(
                &statement,
                &[
                    &plot.plot_code,
                    &plot.area_hectares,
                    &location.district,
                    &location.ward,
                    &location.village,
                    &dataset,
                    &ewkb,
                    &attributes,
                ],
            )
            .await
            .with_context(|| format!("Failed to upsert plot {}", plot.plot_code))?;

        let result = classify(row.get("valid"), row.get("inserted"));
        match result {
            UpsertResult::Rejected => {
                warn!(plot_code = %plot.plot_code, "Plot rejected by store geometry guard")
            }
            other => trace!(plot_code = %plot.plot_code, result = ?other, "Plot upserted"),
        }
        upsert.record(result);
    }

    debug!(rows = plots.len(), "All plots written");
    Ok(())
}

/// Vérifie le nombre de lignes du jeu de données et calcule les indicateurs.
///
/// Une emprise hors de l'enveloppe nationale produit un avertissement, jamais une erreur.
pub async fn verify_dataset(
    store: &Store,
    dataset: &str,
    report: &UpsertReport,
    envelope: &Envelope,
) -> Result<DatasetDiagnostics> {
    let client = store.client().await?;
    let row = client
        .query_one(
            &format!(
                r#"
                SELECT count(*),
                       min(area_hectares)::float8,
                       max(area_hectares)::float8,
                       avg(area_hectares)::float8,
                       sum(area_hectares)::float8,
                       ST_XMin(ST_Extent(geometry))::float8,
                       ST_YMin(ST_Extent(geometry))::float8,
                       ST_XMax(ST_Extent(geometry))::float8,
                       ST_YMax(ST_Extent(geometry))::float8
                FROM {}
                WHERE dataset_name = $1
                "#,
                store.table(PLOTS_TABLE)
            ),
            &[&dataset],
        )
        .await
        .context("Failed to compute dataset diagnostics")?;

    let extent = match (
        row.get::<_, Option<f64>>(5),
        row.get::<_, Option<f64>>(6),
        row.get::<_, Option<f64>>(7),
        row.get::<_, Option<f64>>(8),
    ) {
        (Some(min_x), Some(min_y), Some(max_x), Some(max_y)) => Some([min_x, min_y, max_x, max_y]),
        _ => None,
    };

    let outside_envelope = extent
        .map(|[min_x, min_y, max_x, max_y]| {
            !envelope.contains(&geo::Rect::new(
                geo::coord! { x: min_x, y: min_y },
                geo::coord! { x: max_x, y: max_y },
            ))
        })
        .unwrap_or(false);

    let diagnostics = DatasetDiagnostics {
        plot_count: row.get(0),
        area_min: row.get(1),
        area_max: row.get(2),
        area_avg: row.get(3),
        area_total: row.get(4),
        extent,
        outside_envelope,
    };

    // Les mises à jour de parcelles d'autres jeux de données ne comptent pas ici
    if (diagnostics.plot_count as usize) < report.inserted {
        warn!(
            dataset,
            stored = diagnostics.plot_count,
            inserted = report.inserted,
            "Fewer stored plots than inserted rows"
        );
    }
    if outside_envelope {
        warn!(dataset, extent = ?extent, "Dataset extent falls outside the national envelope");
    }

    info!(
        dataset,
        plots = diagnostics.plot_count,
        area_total = ?diagnostics.area_total,
        "Dataset verified"
    );
    Ok(diagnostics)
}

/// Convertit une géométrie geo en EWKB PostGIS
pub(crate) fn geometry_to_ewkb(geom: &Geometry, srid: u32) -> Result<Vec<u8>> {
    let wkb = geom_to_wkb(geom)
        .map_err(|e| anyhow::anyhow!("Failed to convert geometry to WKB: {:?}", e))?;

    let mut ewkb = Vec::with_capacity(wkb.len() + 4);

    if wkb.len() >= 5 {
        let little_endian = wkb[0] == 1;
        ewkb.push(wkb[0]);

        // Type avec flag SRID (0x20000000)
        let type_bytes = [wkb[1], wkb[2], wkb[3], wkb[4]];
        if little_endian {
            let geom_type = u32::from_le_bytes(type_bytes) | 0x2000_0000;
            ewkb.extend_from_slice(&geom_type.to_le_bytes());
            ewkb.extend_from_slice(&srid.to_le_bytes());
        } else {
            let geom_type = u32::from_be_bytes(type_bytes) | 0x2000_0000;
            ewkb.extend_from_slice(&geom_type.to_be_bytes());
            ewkb.extend_from_slice(&srid.to_be_bytes());
        }

        ewkb.extend_from_slice(&wkb[5..]);
    }

    Ok(ewkb)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{polygon, MultiPolygon};

    #[test]
    fn test_upsert_report() {
        let mut report = UpsertReport::default();
        report.record(UpsertResult::Inserted);
        report.record(UpsertResult::Inserted);
        report.record(UpsertResult::Updated);
        report.record(UpsertResult::Unchanged);
        report.record(UpsertResult::Rejected);

        assert_eq!(report.inserted, 2);
        assert_eq!(report.written(), 3);
        assert_eq!(report.total(), 5);
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify(0, None), UpsertResult::Rejected);
        assert_eq!(classify(1, Some(true)), UpsertResult::Inserted);
        assert_eq!(classify(1, Some(false)), UpsertResult::Updated);
        assert_eq!(classify(1, None), UpsertResult::Unchanged);
    }

    #[test]
    fn test_upsert_sql_policies() {
        let skip = upsert_sql("\"public\".\"land_plots\"", ConflictPolicy::Skip);
        assert!(skip.contains("ON CONFLICT (plot_code) DO NOTHING"));
        assert!(skip.contains("'available'"));

        let update = upsert_sql("\"public\".\"land_plots\"", ConflictPolicy::UpdateAttributes);
        assert!(update.contains("DO UPDATE SET attributes = EXCLUDED.attributes, updated_at = NOW()"));
        // géométrie et localisation jamais modifiées sur conflit
        assert!(!update.contains("geometry = EXCLUDED"));
        assert!(!update.contains("district = EXCLUDED"));
    }

    #[test]
    fn test_geometry_to_ewkb() {
        let mp = MultiPolygon::new(vec![polygon![
            (x: 39.0, y: -6.0),
            (x: 39.1, y: -6.0),
            (x: 39.1, y: -6.1),
            (x: 39.0, y: -6.0),
        ]]);
        let ewkb = geometry_to_ewkb(&Geometry::MultiPolygon(mp), 4326).unwrap();

        assert_eq!(ewkb[0], 1);
        let type_word = u32::from_le_bytes([ewkb[1], ewkb[2], ewkb[3], ewkb[4]]);
        assert_eq!(type_word & 0x2000_0000, 0x2000_0000);
        assert_eq!(type_word & 0xFF, 6);
        let srid = u32::from_le_bytes([ewkb[5], ewkb[6], ewkb[7], ewkb[8]]);
        assert_eq!(srid, 4326);
    }
}
