//! Round trips of benchmark tables and measurement series through the file system

use fmais_simulation_engine::storage::{self, ResultTable, insert_cell};
use fmais_simulation_engine::{ModelError, measurement::Series};

fn table() -> ResultTable {
    let mut table = ResultTable::new();
    insert_cell(&mut table, 1, 1, 1, 12.5);
    insert_cell(&mut table, 2, 6, 1, 40.25);
    insert_cell(&mut table, 2, 6, 6, 81.0);
    insert_cell(&mut table, 3, 11, 6, 190.75);
    table
}

#[test]
fn test_save_writes_json_and_csv() {
    let dir = tempfile::tempdir().unwrap();
    let paths = storage::save_table(dir.path(), "benchmark_fmais", &table()).unwrap();

    assert_eq!(paths.len(), 2);
    assert!(paths[0].ends_with("benchmark_fmais.json"));
    assert!(paths[1].ends_with("benchmark_fmais.csv"));
    assert!(paths.iter().all(|p| p.exists()));
}

#[test]
fn test_load_table_both_formats() {
    let dir = tempfile::tempdir().unwrap();
    let saved = table();
    storage::save_table(dir.path(), "docker_benchmark_meertcore", &saved).unwrap();

    let stem = dir.path().join("docker_benchmark_meertcore");
    let from_json = storage::load_table(&stem.with_extension("json")).unwrap();
    let from_csv = storage::load_table(&stem.with_extension("csv")).unwrap();

    assert_eq!(from_json, saved);
    assert_eq!(from_csv, saved);
    assert_eq!(storage::table_dimensions(&from_csv).unwrap(), (3, 11, 6));
}

#[test]
fn test_save_creates_missing_directory() {
    let dir = tempfile::tempdir().unwrap();
    let nested = dir.path().join("data").join("run1");
    storage::save_table(&nested, "t", &table()).unwrap();
    assert!(nested.join("t.csv").exists());
}

#[test]
fn test_load_rejects_unknown_extension() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("table.txt");
    std::fs::write(&path, "1;1;1;1.0\n").unwrap();
    assert!(matches!(storage::load_table(&path), Err(ModelError::Csv(_))));
}

#[test]
fn test_load_rejects_header_only_csv() {
    let dir = tempfile::tempdir().unwrap();
    storage::save_table(dir.path(), "empty", &ResultTable::new()).unwrap();
    assert!(storage::load_table(&dir.path().join("empty.csv")).is_err());
}

#[test]
fn test_malformed_csv_row() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.csv");
    std::fs::write(&path, "1;2;three;4.0\n").unwrap();
    assert!(matches!(storage::import_csv(&path), Err(ModelError::Csv(_))));
}

#[test]
fn test_series_json_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let series: Series = [(1, 0.75), (2, 0.625), (300, 0.5)].into_iter().collect();

    let path = storage::export_json(dir.path(), "depth2_reliability", &series).unwrap();
    let back: Series = storage::import_json(&path).unwrap();
    assert_eq!(back, series);
}
