//! JSON and CSV persistence of benchmark tables and measurement series
//!
//! A [`ResultTable`] is keyed by model depth, application count and maximum
//! instances per application. Tables are written twice, as pretty JSON and as
//! `;`-separated CSV with a header row, and read back by file extension.

use crate::error::{ModelError, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// depth -> application count -> instance count -> value
pub type ResultTable = BTreeMap<usize, BTreeMap<usize, BTreeMap<usize, f64>>>;

const CSV_DELIMITER: char = ';';

/// Header written in front of every CSV table
pub const CSV_HEADER: [&str; 4] = [
    "Fractal MAIS Depth [-]",
    "Application Number in Fractal MAIS [-]",
    "Maximum Number of Instances Deployed by Application [-]",
    "Time [us]",
];

/// Insert one cell, creating the intermediate maps
pub fn insert_cell(
    table: &mut ResultTable,
    depth: usize,
    apps: usize,
    instances: usize,
    value: f64,
) {
    table
        .entry(depth)
        .or_default()
        .entry(apps)
        .or_default()
        .insert(instances, value);
}

/// Write any serializable value as pretty JSON to `<dir>/<name>.json`
pub fn export_json<T: Serialize + ?Sized>(dir: &Path, name: &str, value: &T) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(format!("{}.json", name));
    fs::write(&path, serde_json::to_string_pretty(value)?)?;
    Ok(path)
}

/// Write a table as `<dir>/<name>.csv`
pub fn export_csv(dir: &Path, name: &str, table: &ResultTable) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(format!("{}.csv", name));
    fs::write(&path, table_to_csv(table))?;
    Ok(path)
}

fn table_to_csv(table: &ResultTable) -> String {
    let mut out = CSV_HEADER.join(&CSV_DELIMITER.to_string());
    out.push('\n');
    for (depth, apps) in table {
        for (app_count, instances) in apps {
            for (instance_count, value) in instances {
                out.push_str(&format!(
                    "{depth}{d}{app_count}{d}{instance_count}{d}{value}\n",
                    d = CSV_DELIMITER
                ));
            }
        }
    }
    out
}

/// Store a table in both formats
pub fn save_table(dir: &Path, name: &str, table: &ResultTable) -> Result<Vec<PathBuf>> {
    let paths = vec![export_json(dir, name, table)?, export_csv(dir, name, table)?];
    info!(?paths, "table saved");
    Ok(paths)
}

/// Read JSON into any deserializable value
pub fn import_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

/// Parse a CSV table; header rows are skipped
pub fn import_csv(path: &Path) -> Result<ResultTable> {
    let text = fs::read_to_string(path)?;
    let mut table = ResultTable::new();
    for (line_no, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(CSV_DELIMITER).map(str::trim).collect();
        if fields.len() != CSV_HEADER.len() {
            return Err(ModelError::csv(format!(
                "line {}: expected {} fields, found {}",
                line_no + 1,
                CSV_HEADER.len(),
                fields.len()
            )));
        }
        if fields[0].contains("Depth") {
            continue;
        }

        let invalid = |i: usize, e: &dyn std::fmt::Display| {
            ModelError::csv(format!("line {}: {:?}: {}", line_no + 1, fields[i], e))
        };
        let key = |i: usize| fields[i].parse::<usize>().map_err(|e| invalid(i, &e));
        let value = fields[3].parse::<f64>().map_err(|e| invalid(3, &e))?;
        insert_cell(&mut table, key(0)?, key(1)?, key(2)?, value);
    }
    Ok(table)
}

/// Load a table saved by [`save_table`], picking the format from the extension
pub fn load_table(path: &Path) -> Result<ResultTable> {
    let table = match path.extension().and_then(|e| e.to_str()) {
        Some("json") => import_json(path)?,
        Some("csv") => import_csv(path)?,
        _ => {
            return Err(ModelError::csv(format!(
                "{}: only .json and .csv are supported",
                path.display()
            )));
        }
    };
    if table.is_empty() {
        return Err(ModelError::csv(format!("{}: no data", path.display())));
    }
    Ok(table)
}

/// Largest depth, application count and instance count present in a table
pub fn table_dimensions(table: &ResultTable) -> Result<(usize, usize, usize)> {
    let depth = table
        .keys()
        .next_back()
        .copied()
        .ok_or_else(|| ModelError::csv("empty table"))?;
    let apps = table
        .values()
        .filter_map(|apps| apps.keys().next_back().copied())
        .max()
        .unwrap_or(0);
    let instances = table
        .values()
        .flat_map(|apps| apps.values())
        .filter_map(|instances| instances.keys().next_back().copied())
        .max()
        .unwrap_or(0);
    Ok((depth, apps, instances))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ResultTable {
        let mut table = ResultTable::new();
        insert_cell(&mut table, 1, 1, 1, 2.5);
        insert_cell(&mut table, 1, 6, 11, 3.0);
        insert_cell(&mut table, 4, 101, 6, 17.25);
        table
    }

    #[test]
    fn test_csv_layout() {
        let csv = table_to_csv(&sample());
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("Fractal MAIS Depth [-];"));
        assert_eq!(lines[1], "1;1;1;2.5");
        assert_eq!(lines[3], "4;101;6;17.25");
    }

    #[test]
    fn test_dimensions() {
        assert_eq!(table_dimensions(&sample()).unwrap(), (4, 101, 11));
        assert!(table_dimensions(&ResultTable::new()).is_err());
    }

    #[test]
    fn test_insert_cell_merges() {
        let table = sample();
        assert_eq!(table[&1].len(), 2);
        assert_eq!(table[&1][&6][&11], 3.0);
    }
}
