//! Lecteur natif : `esri-shp` en processus, sans GDAL
//!
//! Le parsing tourne dans `spawn_blocking` et alimente un COPY par un canal borné.
//! Par lot : lecture et reprojection séquentielles, réparation en parallèle (rayon).

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use bytes::BytesMut;
use esri_shp::{repair, Feature, FeatureError, FieldValue, Shapefile};
use futures::future::BoxFuture;
use futures::FutureExt;
use geo::Geometry;
use geozero::wkt::WktWriter;
use geozero::GeozeroGeometry;
use rayon::prelude::*;
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{GeometrySource, ImportMethod, LoadContext, StagedLoad};
use crate::error::SourceFailure;
use crate::reproject::{Envelope, SmartReprojector, SourceCrs};
use crate::store::staging::{self, push_csv_text_field, CopyChunk};

const STRATEGY: &str = "native";

/// Paramètres d'une lecture, transférables vers un thread bloquant
#[derive(Debug, Clone)]
pub struct ReadJob {
    pub shp: PathBuf,
    pub encoding: Option<String>,
    pub crs: SourceCrs,
    pub envelope: Envelope,
    pub batch_size: usize,
}

/// Entité normalisée, prête pour le staging
#[derive(Debug, Clone)]
pub struct PreparedFeature {
    pub index: usize,
    /// Toujours un `MultiPolygon` valide en EPSG:4326
    pub geometry: Geometry,
    pub attributes: Map<String, Value>,
    pub repaired: bool,
    pub flagged: bool,
}

/// Bilan d'une lecture
#[derive(Debug, Clone, Default)]
pub struct ReadStats {
    pub source_features: usize,
    pub accepted: usize,
    pub rejected: Vec<FeatureError>,
    pub repaired: usize,
    pub flagged: usize,
    /// Encodage effectivement appliqué aux attributs (libellé `encoding_rs`)
    pub encoding: &'static str,
}

/// Lit, reprojette et normalise toutes les entités ; `on_batch` reçoit chaque lot accepté.
///
/// Les erreurs par entité sont comptées ; seules l'ouverture du fichier, l'absence de
/// backend de reprojection ou une erreur de `on_batch` interrompent la lecture.
pub fn read_shapefile<F>(job: &ReadJob, mut on_batch: F) -> Result<ReadStats>
where
    F: FnMut(&[PreparedFeature]) -> Result<()>,
{
    let shapefile = Shapefile::open_with_encoding(&job.shp, job.encoding.as_deref())
        .with_context(|| format!("Failed to open {}", job.shp.display()))?;
    let reprojector = SmartReprojector::new(&job.crs)?;

    debug!(
        features = shapefile.len(),
        shape_type = shapefile.header.shape_type.label(),
        reprojector = reprojector.description(),
        "Native read started"
    );

    let mut stats = ReadStats {
        source_features: shapefile.len(),
        encoding: shapefile.encoding.name(),
        ..Default::default()
    };
    let batch_size = job.batch_size.max(1);

    for start in (0..shapefile.len()).step_by(batch_size) {
        let end = (start + batch_size).min(shapefile.len());

        let mut staged = Vec::with_capacity(end - start);
        for index in start..end {
            match shapefile
                .feature(index)
                .and_then(|feature| reproject_feature(feature, &reprojector))
            {
                Ok(item) => staged.push(item),
                Err(e) => {
                    warn!("{e}");
                    stats.rejected.push(e);
                }
            }
        }

        let normalized: Vec<Result<PreparedFeature, FeatureError>> = staged
            .into_par_iter()
            .map(|(index, geometry, attributes)| {
                let n = repair::normalize(Some(geometry), index)?;
                let geometry = Geometry::MultiPolygon(n.geometry);
                let flagged = job.envelope.flags(&geometry);
                Ok(PreparedFeature {
                    index,
                    geometry,
                    attributes,
                    repaired: n.repaired,
                    flagged,
                })
            })
            .collect();

        let mut batch = Vec::with_capacity(normalized.len());
        for result in normalized {
            match result {
                Ok(feature) => {
                    if feature.flagged {
                        warn!(index = feature.index, "Geometry outside the national envelope");
                        stats.flagged += 1;
                    }
                    if feature.repaired {
                        stats.repaired += 1;
                    }
                    batch.push(feature);
                }
                Err(e) => {
                    warn!("{e}");
                    stats.rejected.push(e);
                }
            }
        }

        stats.accepted += batch.len();
        on_batch(&batch)?;
    }

    Ok(stats)
}

/// Promotion en multipolygone puis reprojection vers WGS 84
fn reproject_feature(
    feature: Feature,
    reprojector: &SmartReprojector,
) -> Result<(usize, Geometry, Map<String, Value>), FeatureError> {
    let index = feature.index;
    let geometry = feature.geometry.ok_or(FeatureError::Empty { index })?;
    let mp = repair::promote(geometry, index)?;
    if mp.0.is_empty() {
        return Err(FeatureError::Empty { index });
    }

    let geometry = reprojector
        .transform_geometry(&Geometry::MultiPolygon(mp))
        .map_err(|e| FeatureError::Reprojection {
            index,
            reason: format!("{e:#}"),
        })?;

    let attributes = feature
        .attributes
        .into_iter()
        .filter_map(|(name, value)| field_to_json(value).map(|v| (name, v)))
        .collect();

    Ok((index, geometry, attributes))
}

fn field_to_json(value: FieldValue) -> Option<Value> {
    match value {
        FieldValue::Null => None,
        FieldValue::Text(s) | FieldValue::Date(s) => Some(Value::String(s)),
        FieldValue::Integer(i) => Some(Value::from(i)),
        FieldValue::Number(n) => serde_json::Number::from_f64(n).map(Value::Number),
        FieldValue::Logical(b) => Some(Value::Bool(b)),
    }
}

/// Ligne CSV `geometry,attributes,original_fid` (géométrie en EWKT)
fn write_copy_row(buf: &mut BytesMut, feature: &PreparedFeature, wkt_buf: &mut Vec<u8>) -> Result<()> {
    wkt_buf.clear();
    {
        let mut writer = WktWriter::new(&mut *wkt_buf);
        feature
            .geometry
            .process_geom(&mut writer)
            .context("Failed to encode geometry to WKT")?;
    }
    buf.extend_from_slice(b"\"SRID=4326;");
    buf.extend_from_slice(&wkt_buf[..]);
    buf.extend_from_slice(b"\",");

    let attributes = serde_json::to_string(&feature.attributes)?;
    push_csv_text_field(buf, &attributes);
    buf.extend_from_slice(b",");

    buf.extend_from_slice(feature.index.to_string().as_bytes());
    buf.extend_from_slice(b"\n");
    Ok(())
}

/// Source de géométries en processus
pub struct NativeReader {
    batch_size: usize,
}

impl NativeReader {
    pub fn new(batch_size: usize) -> Self {
        Self { batch_size }
    }

    async fn run(&self, ctx: &LoadContext<'_>) -> Result<StagedLoad, SourceFailure> {
        let fail = |reason: String| SourceFailure::fallback(STRATEGY, reason);

        // Backend de reprojection absent : inutile de créer le staging
        SmartReprojector::new(ctx.crs).map_err(|e| fail(format!("{e:#}")))?;

        staging::create_attributes_staging(ctx.store, ctx.staging_table)
            .await
            .map_err(|e| fail(format!("{e:#}")))?;

        let (tx, rx) = mpsc::channel::<CopyChunk>(16);
        let copy = tokio::spawn({
            let store = ctx.store.clone();
            let table = ctx.staging_table.to_string();
            async move { staging::copy_csv_chunks(&store, &table, rx).await }
        });

        let job = ReadJob {
            shp: ctx.shapefile.shp.clone(),
            encoding: ctx.encoding.map(str::to_string),
            crs: ctx.crs.clone(),
            envelope: *ctx.envelope,
            batch_size: self.batch_size,
        };

        let produced = tokio::task::spawn_blocking(move || {
            let mut buf = BytesMut::with_capacity(64 * 1024);
            let mut wkt_buf: Vec<u8> = Vec::with_capacity(1024);
            read_shapefile(&job, |batch| {
                for feature in batch {
                    write_copy_row(&mut buf, feature, &mut wkt_buf)?;
                }
                if !batch.is_empty() {
                    let data = buf.split().freeze();
                    tx.blocking_send(CopyChunk {
                        data,
                        rows: batch.len() as u64,
                    })
                    .map_err(|_| anyhow!("COPY stream closed"))?;
                }
                Ok(())
            })
        })
        .await;

        // Le COPY se termine quand le producteur lâche l'émetteur
        let copied = copy.await;

        let rows = match copied {
            Ok(Ok(rows)) => rows,
            Ok(Err(e)) => return Err(fail(format!("{e:#}"))),
            Err(e) => return Err(fail(format!("COPY task failed: {e}"))),
        };
        let stats = match produced {
            Ok(Ok(stats)) => stats,
            Ok(Err(e)) => return Err(fail(format!("{e:#}"))),
            Err(e) => return Err(fail(format!("reader task failed: {e}"))),
        };

        if stats.accepted == 0 || rows == 0 {
            return Err(fail(format!(
                "zero features survived out of {} ({} rejected)",
                stats.source_features,
                stats.rejected.len()
            )));
        }

        info!(
            rows,
            source_features = stats.source_features,
            rejected = stats.rejected.len(),
            repaired = stats.repaired,
            flagged = stats.flagged,
            "Native read finished"
        );

        Ok(StagedLoad {
            method: ImportMethod::NativeFallback,
            rows,
            source_features: stats.source_features,
            rejected: stats.rejected,
            repaired: stats.repaired,
            flagged: stats.flagged as u64,
        })
    }
}

impl GeometrySource for NativeReader {
    fn name(&self) -> &'static str {
        STRATEGY
    }

    fn load<'a>(&'a self, ctx: &'a LoadContext<'a>) -> BoxFuture<'a, Result<StagedLoad, SourceFailure>> {
        self.run(ctx).boxed()
    }
}
