//! Integration tests for the production pipeline: idempotence, per-spec
//! failure isolation and field normalization.

mod common;

use std::fs;
use std::time::{Duration, SystemTime};

use common::{list_files, FixedReader, ScriptedEngine, TextWriter};
use gridding::{run_item, FieldPolicy, ItemReport, Pipeline, SpecOutcome, UnavailableBackend};
use radar_common::WorkItem;
use test_utils::{small_catalog, synthetic_volume, temp_test_dir, VolumeFixture};

fn item(root: &std::path::Path) -> WorkItem {
    WorkItem::new("/archive/2021/20210312/cpol_20210312_054000.nc", root, "502")
}

fn reader_with(fields: &[&str]) -> FixedReader {
    FixedReader(Some(synthetic_volume(&VolumeFixture {
        fields: fields.iter().map(|s| s.to_string()).collect(),
        ..VolumeFixture::default()
    })))
}

fn processed(report: ItemReport) -> Vec<SpecOutcome> {
    match report {
        ItemReport::Processed { specs, .. } => specs,
        other => panic!("expected processed report, got {:?}", other),
    }
}

#[test]
fn test_second_run_skips_every_spec() {
    let out = temp_test_dir();
    let engine = ScriptedEngine::default();
    let writer = TextWriter::default();
    let pipeline = Pipeline::new(&engine, &writer);
    let reader = reader_with(&["reflectivity", "velocity"]);
    let catalog = small_catalog();
    let work = item(out.path());

    let first = processed(run_item(&pipeline, &reader, &work, &catalog.specs, &FieldPolicy::default()));
    assert!(first.iter().all(|o| matches!(o, SpecOutcome::Success { .. })));
    assert_eq!(engine.calls(), 3);

    let files = list_files(out.path());
    assert_eq!(
        files,
        vec![
            "grid_a/2021/20210312/502_20210312_054000_grid.nc",
            "grid_b/2021/20210312/502_20210312_054000_grid.nc",
            "grid_c/2021/20210312/502_20210312_054000_grid.nc",
        ]
    );
    let before: Vec<Vec<u8>> = files.iter().map(|f| fs::read(out.path().join(f)).unwrap()).collect();

    let second = processed(run_item(&pipeline, &reader, &work, &catalog.specs, &FieldPolicy::default()));
    assert!(second.iter().all(|o| matches!(o, SpecOutcome::SkippedExists { .. })));
    assert_eq!(engine.calls(), 3, "engine must not run for existing outputs");

    let after: Vec<Vec<u8>> = files.iter().map(|f| fs::read(out.path().join(f)).unwrap()).collect();
    assert_eq!(before, after);
}

#[test]
fn test_failing_spec_does_not_stop_others() {
    let out = temp_test_dir();
    let engine = ScriptedEngine::failing_on("b");
    let writer = TextWriter::default();
    let pipeline = Pipeline::new(&engine, &writer);
    let reader = reader_with(&["reflectivity"]);
    let catalog = small_catalog();

    let outcomes = processed(run_item(
        &pipeline,
        &reader,
        &item(out.path()),
        &catalog.specs,
        &FieldPolicy::default(),
    ));

    assert_eq!(outcomes.len(), 3);
    assert!(matches!(&outcomes[0], SpecOutcome::Success { spec, .. } if spec == "a"));
    assert!(
        matches!(&outcomes[1], SpecOutcome::GridFailure { spec, reason } if spec == "b" && reason.contains("valid gates"))
    );
    assert!(matches!(&outcomes[2], SpecOutcome::Success { spec, .. } if spec == "c"));

    let files = list_files(out.path());
    assert_eq!(files.len(), 2);
    assert!(files.iter().all(|f| !f.starts_with("grid_b/")));
}

#[test]
fn test_products_contain_finalized_fields() {
    let out = temp_test_dir();
    let engine = ScriptedEngine::default();
    let writer = TextWriter::default();
    let pipeline = Pipeline::new(&engine, &writer);
    let reader = reader_with(&["corrected_reflectivity", "raw_velocity", "total_power"]);
    let catalog = small_catalog();

    let outcomes = processed(run_item(
        &pipeline,
        &reader,
        &item(out.path()),
        &catalog.specs[..1],
        &FieldPolicy::default(),
    ));
    let SpecOutcome::Success { path, .. } = &outcomes[0] else {
        panic!("expected success, got {:?}", outcomes[0]);
    };

    let text = fs::read_to_string(path).unwrap();
    assert_eq!(
        text.lines().filter(|l| l.starts_with("field ")).collect::<Vec<_>>(),
        vec!["field reflectivity"]
    );
    assert!(text.contains("title Gridded radar volume on a 40x40x4km grid"));
    assert!(text.contains("extra latitude [21, 21]"));
    assert!(text.contains("extra longitude [21, 21]"));
}

#[test]
fn test_write_failure_leaves_no_partial_file() {
    let out = temp_test_dir();
    let engine = ScriptedEngine::default();
    let writer = TextWriter { broken: true };
    let pipeline = Pipeline::new(&engine, &writer);
    let reader = reader_with(&["reflectivity"]);
    let catalog = small_catalog();

    let outcomes = processed(run_item(
        &pipeline,
        &reader,
        &item(out.path()),
        &catalog.specs,
        &FieldPolicy::default(),
    ));
    assert!(outcomes.iter().all(SpecOutcome::is_failure));
    assert!(list_files(out.path()).is_empty());
}

#[test]
fn test_all_masked_volume_fails_each_spec() {
    let out = temp_test_dir();
    let engine = ScriptedEngine::default();
    let writer = TextWriter::default();
    let pipeline = Pipeline::new(&engine, &writer);
    let reader = FixedReader(Some(synthetic_volume(&VolumeFixture {
        all_masked: true,
        ..VolumeFixture::default()
    })));
    let catalog = small_catalog();

    let outcomes = processed(run_item(
        &pipeline,
        &reader,
        &item(out.path()),
        &catalog.specs,
        &FieldPolicy::default(),
    ));
    assert_eq!(engine.calls(), 3);
    for outcome in &outcomes {
        assert!(
            matches!(outcome, SpecOutcome::GridFailure { reason, .. } if reason.contains("interpolation failed"))
        );
    }
}

#[test]
fn test_unreadable_or_unusable_volume_is_read_failure() {
    let out = temp_test_dir();
    let engine = ScriptedEngine::default();
    let writer = TextWriter::default();
    let pipeline = Pipeline::new(&engine, &writer);
    let catalog = small_catalog();
    let work = item(out.path());

    let report = run_item(&pipeline, &FixedReader(None), &work, &catalog.specs, &FieldPolicy::default());
    assert!(matches!(report, ItemReport::ReadFailure { reason } if reason.contains("corrupt")));

    let report = run_item(
        &pipeline,
        &reader_with(&["velocity"]),
        &work,
        &catalog.specs,
        &FieldPolicy::default(),
    );
    assert!(matches!(report, ItemReport::ReadFailure { reason } if reason.contains("reflectivity")));

    let report = run_item(&pipeline, &UnavailableBackend, &work, &catalog.specs, &FieldPolicy::default());
    assert!(matches!(report, ItemReport::ReadFailure { reason } if reason.contains("netcdf")));

    assert_eq!(engine.calls(), 0);
    assert!(list_files(out.path()).is_empty());
}

#[test]
fn test_stale_temporaries_swept_before_writing() {
    let out = temp_test_dir();
    let day_dir = out.path().join("grid_a/2021/20210312");
    fs::create_dir_all(&day_dir).unwrap();
    let leftover = day_dir.join(".502_20210312_054000_grid.nc.0a1b2c.tmp");
    fs::write(&leftover, b"partial").unwrap();
    let old = SystemTime::now() - Duration::from_secs(2 * 3600);
    fs::File::options()
        .write(true)
        .open(&leftover)
        .unwrap()
        .set_modified(old)
        .unwrap();

    let engine = ScriptedEngine::default();
    let writer = TextWriter::default();
    let pipeline = Pipeline::new(&engine, &writer).with_stale_temp_age(Duration::from_secs(180));
    let reader = reader_with(&["reflectivity"]);

    let outcomes = processed(run_item(
        &pipeline,
        &reader,
        &item(out.path()),
        &small_catalog().specs,
        &FieldPolicy::default(),
    ));
    assert!(outcomes.iter().all(|o| matches!(o, SpecOutcome::Success { .. })));
    assert!(!leftover.exists());
    assert_eq!(list_files(out.path()).len(), 3);
}
