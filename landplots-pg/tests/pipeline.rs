//! Tests d'intégration sans base de données
//!
//! Shapefiles générés par `esri_shp::writer` dans un répertoire temporaire ; les
//! sources de géométries sont remplacées par des fakes quand un staging serait
//! nécessaire.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use esri_shp::writer::{self, Record, Shape, Sidecars};
use esri_shp::{FeatureError, FieldDef, FieldType, FieldValue};
use futures::future::BoxFuture;
use futures::FutureExt;
use geo::{coord, MultiPolygon, Rect};
use serde_json::Value;

use landplots_pg::config::ImportConfig;
use landplots_pg::error::{ImportError, SourceFailure};
use landplots_pg::merge::{merge_rows, AreaSource, Location};
use landplots_pg::pipeline::{inspect_dataset, ImportRequest, Pipeline};
use landplots_pg::report::{ErrorLevel, ImportReport};
use landplots_pg::reproject::{CrsOrigin, SourceCrs};
use landplots_pg::source::native::{read_shapefile, ReadJob};
use landplots_pg::source::{load_with_fallback, GeometrySource, ImportMethod, LoadContext, StagedLoad};
use landplots_pg::store::staging::StagedRow;
use landplots_pg::store::{create_pool, DatabaseConfig, Store};
use landplots_pg::validate::validate;

const ARC_1960_37S: &str = r#"PROJCS["Arc_1960_UTM_Zone_37S",GEOGCS["GCS_Arc_1960",DATUM["D_Arc_1960",SPHEROID["Clarke_1880_RGS",6378249.145,293.465]],PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]],PROJECTION["Transverse_Mercator"],PARAMETER["False_Easting",500000.0],PARAMETER["False_Northing",10000000.0],PARAMETER["Central_Meridian",39.0],PARAMETER["Scale_Factor",0.9996],PARAMETER["Latitude_Of_Origin",0.0],UNIT["Meter",1.0]]"#;

fn config() -> ImportConfig {
    let mut config = ImportConfig::from_preset("tanzania").unwrap();
    // Pas de GDAL dans les tests : métadonnées natives uniquement
    config.inspector.enabled = false;
    config.bridge.enabled = false;
    config
}

fn square(x: f64, y: f64, size: f64) -> MultiPolygon {
    MultiPolygon::new(vec![Rect::new(
        coord! { x: x, y: y },
        coord! { x: x + size, y: y + size },
    )
    .to_polygon()])
}

fn text_field(name: &str, length: u8) -> FieldDef {
    FieldDef {
        name: name.into(),
        field_type: FieldType::Character,
        length,
        decimals: 0,
    }
}

fn area_field() -> FieldDef {
    FieldDef {
        name: "AREA_HA".into(),
        field_type: FieldType::Numeric,
        length: 12,
        decimals: 4,
    }
}

fn polygon_record(x: f64, y: f64, values: Vec<FieldValue>) -> Record {
    Record {
        shape: Shape::Polygon(square(x, y, 0.001)),
        values,
    }
}

/// Lecture native puis mise en forme des lignes comme le staging natif
/// (`attributes` JSON + `original_fid`)
fn read_as_staged_rows(shp: &Path, crs: SourceCrs) -> (Vec<StagedRow>, usize, Vec<FeatureError>) {
    let config = config();
    let job = ReadJob {
        shp: shp.to_path_buf(),
        encoding: None,
        crs,
        envelope: config.envelope,
        batch_size: 2,
    };
    let mut rows = Vec::new();
    let stats = read_shapefile(&job, |batch| {
        for feature in batch {
            rows.push(StagedRow {
                geometry: Some(feature.geometry.clone()),
                columns: vec![
                    ("id".into(), Some((rows.len() + 1).to_string())),
                    (
                        "attributes".into(),
                        Some(Value::Object(feature.attributes.clone()).to_string()),
                    ),
                    ("original_fid".into(), Some(feature.index.to_string())),
                ],
            });
        }
        Ok(())
    })
    .unwrap();
    (rows, stats.source_features, stats.rejected)
}

async fn offline_store() -> Store {
    // Aucune connexion n'est ouverte tant que personne n'appelle get()
    let pool = create_pool(&DatabaseConfig::default()).await.unwrap();
    Store::new(pool, "public").unwrap()
}

// ============================================================================
// Sources factices
// ============================================================================

struct FakeSource {
    name: &'static str,
    outcome: Result<StagedLoad, SourceFailure>,
    calls: Arc<AtomicUsize>,
}

impl FakeSource {
    fn boxed(
        name: &'static str,
        outcome: Result<StagedLoad, SourceFailure>,
        calls: &Arc<AtomicUsize>,
    ) -> Box<dyn GeometrySource> {
        Box::new(Self {
            name,
            outcome,
            calls: Arc::clone(calls),
        })
    }
}

impl GeometrySource for FakeSource {
    fn name(&self) -> &'static str {
        self.name
    }

    fn load<'a>(&'a self, _ctx: &'a LoadContext<'a>) -> BoxFuture<'a, Result<StagedLoad, SourceFailure>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        futures::future::ready(self.outcome.clone()).boxed()
    }
}

fn staged(method: ImportMethod, rows: u64) -> StagedLoad {
    StagedLoad {
        method,
        rows,
        source_features: rows as usize,
        rejected: Vec::new(),
        repaired: 0,
        flagged: 0,
    }
}

fn write_fixture(dir: &Path) -> PathBuf {
    writer::write(
        &dir.join("mbuyuni.shp"),
        &[text_field("PLOT_CODE", 16), area_field()],
        &[polygon_record(
            39.2,
            -6.8,
            vec![FieldValue::Text("A1".into()), FieldValue::Number(2.5)],
        )],
        Sidecars::default(),
    )
    .unwrap()
}

// ============================================================================
// Fallback
// ============================================================================

#[tokio::test]
async fn test_fallback_after_conversion_failure() {
    let dir = tempfile::tempdir().unwrap();
    let shapefile = validate(&write_fixture(dir.path())).unwrap();
    let store = offline_store().await;
    let crs = SourceCrs::wgs84();
    let config = config();
    let ctx = LoadContext {
        store: &store,
        shapefile: &shapefile,
        dataset: "mbuyuni",
        staging_table: "_staging_mbuyuni_test",
        crs: &crs,
        envelope: &config.envelope,
        encoding: None,
    };

    let bridge_calls = Arc::new(AtomicUsize::new(0));
    let native_calls = Arc::new(AtomicUsize::new(0));
    let sources = vec![
        FakeSource::boxed(
            "ogr2ogr",
            Err(SourceFailure::conversion("ogr2ogr", "program not found")),
            &bridge_calls,
        ),
        FakeSource::boxed("native", Ok(staged(ImportMethod::NativeFallback, 3)), &native_calls),
    ];

    let load = load_with_fallback(&sources, &ctx).await.unwrap();
    assert_eq!(load.method, ImportMethod::NativeFallback);
    assert_eq!(load.rows, 3);
    assert_eq!(bridge_calls.load(Ordering::SeqCst), 1);
    assert_eq!(native_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_first_success_wins() {
    let dir = tempfile::tempdir().unwrap();
    let shapefile = validate(&write_fixture(dir.path())).unwrap();
    let store = offline_store().await;
    let crs = SourceCrs::wgs84();
    let config = config();
    let ctx = LoadContext {
        store: &store,
        shapefile: &shapefile,
        dataset: "mbuyuni",
        staging_table: "_staging_mbuyuni_test",
        crs: &crs,
        envelope: &config.envelope,
        encoding: None,
    };

    let bridge_calls = Arc::new(AtomicUsize::new(0));
    let native_calls = Arc::new(AtomicUsize::new(0));
    let sources = vec![
        FakeSource::boxed("ogr2ogr", Ok(staged(ImportMethod::Ogr2Ogr, 5)), &bridge_calls),
        FakeSource::boxed("native", Ok(staged(ImportMethod::NativeFallback, 5)), &native_calls),
    ];

    let load = load_with_fallback(&sources, &ctx).await.unwrap();
    assert_eq!(load.method, ImportMethod::Ogr2Ogr);
    assert_eq!(native_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_all_sources_failed_names_each_strategy() {
    let dir = tempfile::tempdir().unwrap();
    let shapefile = validate(&write_fixture(dir.path())).unwrap();
    let store = offline_store().await;
    let crs = SourceCrs::wgs84();
    let config = config();
    let ctx = LoadContext {
        store: &store,
        shapefile: &shapefile,
        dataset: "mbuyuni",
        staging_table: "_staging_mbuyuni_test",
        crs: &crs,
        envelope: &config.envelope,
        encoding: None,
    };

    let calls = Arc::new(AtomicUsize::new(0));
    let sources = vec![
        FakeSource::boxed(
            "ogr2ogr",
            Err(SourceFailure::conversion("ogr2ogr", "exit status 1")),
            &calls,
        ),
        FakeSource::boxed(
            "native",
            Err(SourceFailure::fallback("native", "zero features survived")),
            &calls,
        ),
    ];

    let err = load_with_fallback(&sources, &ctx).await.unwrap_err();
    let msg = err.to_string();
    let ImportError::SourcesExhausted(failures) = &err else {
        panic!("unexpected {err}");
    };
    let strategies: Vec<_> = failures.iter().map(SourceFailure::strategy).collect();
    assert_eq!(strategies, ["ogr2ogr", "native"]);
    assert!(msg.contains("ogr2ogr: conversion failed: exit status 1"), "{msg}");
    assert!(msg.contains("native: fallback failed: zero features survived"), "{msg}");
}

// ============================================================================
// Pipeline : validation avant toute mutation
// ============================================================================

#[tokio::test]
async fn test_missing_component_aborts_before_any_source() {
    let dir = tempfile::tempdir().unwrap();
    let shp = write_fixture(dir.path());
    std::fs::remove_file(shp.with_extension("shx")).unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let pipeline = Pipeline::new(
        offline_store().await,
        config(),
        vec![FakeSource::boxed("native", Ok(staged(ImportMethod::NativeFallback, 1)), &calls)],
    );
    let request = ImportRequest {
        shapefile: shp.clone(),
        dataset: None,
        location: Location::default(),
        source_srs: None,
        encoding: None,
        staging_table: None,
    };

    let mut report = ImportReport::new(&request.dataset_name(), &shp);
    let err = pipeline.run(&request, &mut report).await.unwrap_err();
    report.finalize();

    match err {
        ImportError::Validation(e) => assert_eq!(e.missing, vec![".shx".to_string()]),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(report.dataset, "mbuyuni");
    assert!(report
        .errors
        .iter()
        .any(|e| e.level == ErrorLevel::Fatal && e.kind == "validation"));
}

// ============================================================================
// Lecture native → fusion
// ============================================================================

#[test]
fn test_single_plot_with_code_and_area() {
    let dir = tempfile::tempdir().unwrap();
    let shp = write_fixture(dir.path());

    let (rows, source_features, rejected) = read_as_staged_rows(&shp, SourceCrs::wgs84());
    assert_eq!(source_features, 1);
    assert!(rejected.is_empty());

    let outcome = merge_rows(rows, "mbuyuni", ImportMethod::NativeFallback, &config().probes);
    assert_eq!(outcome.plots.len(), 1);

    let plot = &outcome.plots[0];
    assert_eq!(plot.plot_code, "A1");
    assert_eq!(plot.area_hectares, 2.5);
    assert!(matches!(plot.area_source, AreaSource::Field(_)));
    assert_eq!(plot.original_fid, Some(0));
    assert_eq!(plot.attributes["import_method"], "native_fallback");
    assert_eq!(plot.attributes["original_fid"], 0);
    assert_eq!(plot.attributes["PLOT_CODE"], "A1");
}

#[test]
fn test_synthesized_codes_in_source_order() {
    let dir = tempfile::tempdir().unwrap();
    let shp = writer::write(
        &dir.path().join("survey1.shp"),
        &[text_field("OWNER", 32)],
        &[
            polygon_record(39.20, -6.80, vec![FieldValue::Text("Juma".into())]),
            polygon_record(39.21, -6.80, vec![FieldValue::Text("Neema".into())]),
            polygon_record(39.22, -6.80, vec![FieldValue::Text("Baraka".into())]),
        ],
        Sidecars::default(),
    )
    .unwrap();

    let (rows, _, _) = read_as_staged_rows(&shp, SourceCrs::wgs84());
    let outcome = merge_rows(rows, "survey1", ImportMethod::NativeFallback, &config().probes);

    let codes: Vec<_> = outcome.plots.iter().map(|p| p.plot_code.as_str()).collect();
    assert_eq!(codes, vec!["survey1_0001", "survey1_0002", "survey1_0003"]);
    let owners: Vec<_> = outcome
        .plots
        .iter()
        .map(|p| p.attributes["OWNER"].as_str().unwrap())
        .collect();
    assert_eq!(owners, vec!["Juma", "Neema", "Baraka"]);
    assert!(outcome
        .plots
        .iter()
        .all(|p| p.area_source == AreaSource::Geodesic && p.area_hectares > 0.0));
}

#[test]
fn test_rejected_features_reduce_considered_rows() {
    let dir = tempfile::tempdir().unwrap();
    let shp = writer::write(
        &dir.path().join("mixed.shp"),
        &[text_field("PLOT_NO", 10)],
        &[
            polygon_record(39.20, -6.80, vec![FieldValue::Text("P1".into())]),
            Record {
                shape: Shape::Null,
                values: vec![FieldValue::Text("P2".into())],
            },
            polygon_record(39.22, -6.80, vec![FieldValue::Text("P3".into())]),
            polygon_record(39.23, -6.80, vec![FieldValue::Text("P4".into())]),
        ],
        Sidecars::default(),
    )
    .unwrap();

    let (rows, source_features, rejected) = read_as_staged_rows(&shp, SourceCrs::wgs84());
    assert_eq!(source_features, 4);
    assert_eq!(rejected, vec![FeatureError::Empty { index: 1 }]);

    let outcome = merge_rows(rows, "mixed", ImportMethod::NativeFallback, &config().probes);
    assert_eq!(outcome.plots.len(), source_features - rejected.len());
    let fids: Vec<_> = outcome.plots.iter().map(|p| p.original_fid).collect();
    assert_eq!(fids, vec![Some(0), Some(2), Some(3)]);
}

#[test]
fn test_arc_1960_plots_land_in_tanzania() {
    let dir = tempfile::tempdir().unwrap();
    // ~ Dar es Salaam en Arc 1960 / UTM 37S
    let shp = writer::write(
        &dir.path().join("dar.shp"),
        &[text_field("PLOT_NO", 10)],
        &[Record {
            shape: Shape::Polygon(MultiPolygon::new(vec![Rect::new(
                coord! { x: 531_000.0, y: 9_248_000.0 },
                coord! { x: 531_100.0, y: 9_248_100.0 },
            )
            .to_polygon()])),
            values: vec![FieldValue::Text("D1".into())],
        }],
        Sidecars {
            prj: Some(ARC_1960_37S),
            cpg: None,
        },
    )
    .unwrap();

    let crs = SourceCrs {
        epsg: Some(21037),
        wkt: None,
        origin: CrsOrigin::Prj,
    };
    let (rows, _, rejected) = read_as_staged_rows(&shp, crs);
    assert!(rejected.is_empty());

    let outcome = merge_rows(rows, "dar", ImportMethod::NativeFallback, &config().probes);
    let bbox = outcome.bbox.unwrap();
    assert!(config().envelope.contains(&bbox), "{bbox:?}");
    assert!((39.2..39.4).contains(&bbox.min().x), "{bbox:?}");
    assert!((-6.9..-6.7).contains(&bbox.min().y), "{bbox:?}");

    // 100 m × 100 m ≈ 1 ha
    let area = outcome.plots[0].area_hectares;
    assert!((area - 1.0).abs() < 0.01, "{area}");
}

// ============================================================================
// Inspection à blanc
// ============================================================================

#[tokio::test]
async fn test_inspect_reads_prj_and_native_headers() {
    let dir = tempfile::tempdir().unwrap();
    let shp = writer::write(
        &dir.path().join("dar.shp"),
        &[text_field("PLOT_NO", 10), area_field()],
        &[
            Record {
                shape: Shape::Polygon(MultiPolygon::new(vec![Rect::new(
                    coord! { x: 531_000.0, y: 9_248_000.0 },
                    coord! { x: 531_100.0, y: 9_248_100.0 },
                )
                .to_polygon()])),
                values: vec![FieldValue::Text("D1".into()), FieldValue::Number(1.0)],
            },
            Record {
                shape: Shape::Null,
                values: vec![FieldValue::Text("D2".into()), FieldValue::Null],
            },
        ],
        Sidecars {
            prj: Some(ARC_1960_37S),
            cpg: Some("UTF-8"),
        },
    )
    .unwrap();

    let outcome = inspect_dataset(&shp, None, None, &config()).await.unwrap();
    assert_eq!(outcome.crs.epsg, Some(21037));
    assert_eq!(outcome.crs.origin, CrsOrigin::Prj);
    assert_eq!(outcome.encoding.as_deref(), Some("UTF-8"));
    assert_eq!(outcome.stats.encoding, "UTF-8");
    assert_eq!(outcome.metadata.layer_name.as_deref(), Some("dar"));
    assert_eq!(outcome.metadata.feature_count, Some(2));
    let names: Vec<_> = outcome.metadata.fields.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, vec!["PLOT_NO", "AREA_HA"]);
    assert_eq!(outcome.stats.source_features, 2);
    assert_eq!(outcome.stats.accepted, 1);
    assert_eq!(outcome.stats.rejected.len(), 1);
}

#[tokio::test]
async fn test_inspect_override_takes_precedence() {
    let dir = tempfile::tempdir().unwrap();
    let shp = write_fixture(dir.path());

    let outcome = inspect_dataset(&shp, Some("EPSG:4326"), Some("latin1"), &config())
        .await
        .unwrap();
    assert_eq!(outcome.crs.epsg, Some(4326));
    assert_eq!(outcome.crs.origin, CrsOrigin::Override);
    assert_eq!(outcome.encoding.as_deref(), Some("latin1"));
    assert_eq!(outcome.stats.encoding, "windows-1252");
    assert_eq!(outcome.stats.accepted, 1);

    let err = inspect_dataset(&shp, Some("EPSG:abc"), None, &config()).await.unwrap_err();
    assert!(err.to_string().contains("Invalid CRS override"), "{err}");
}
