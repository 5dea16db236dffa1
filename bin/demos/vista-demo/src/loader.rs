// SPDX-License-Identifier: AGPL-3.0-only
// Copyright (C) 2024 Jonathan Lee
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License version 3
// as published by the Free Software Foundation.
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU Affero General Public License for more details.
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see https://www.gnu.org/licenses/.

use anyhow::{Context, Result};
use std::path::Path;
use vista::{Dataset, Value};

/// Parses one CSV cell: integer, then float, else text; empty is null.
pub fn parse_cell(raw: &str) -> Value {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }
    if let Ok(v) = trimmed.parse::<i64>() {
        return Value::Int(v);
    }
    match trimmed.parse::<f64>() {
        Ok(v) if v.is_finite() => Value::Float(v),
        _ => Value::Text(trimmed.to_string()),
    }
}

pub fn load_csv(path: &Path) -> Result<Dataset> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open CSV file '{}'", path.display()))?;
    let headers: Vec<String> = reader
        .headers()
        .context("Failed to read CSV header")?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    let mut columns: Vec<Vec<Value>> = vec![Vec::new(); headers.len()];
    for (line, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("Malformed CSV record {}", line + 1))?;
        for (i, column) in columns.iter_mut().enumerate() {
            column.push(record.get(i).map_or(Value::Null, parse_cell));
        }
    }
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "dataset".to_string());
    let dataset = Dataset::from_columns(name, headers.into_iter().zip(columns))
        .context("Failed to build dataset from CSV")?;
    Ok(dataset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_cells_by_shape() {
        assert_eq!(parse_cell("42"), Value::Int(42));
        assert_eq!(parse_cell(" 2.5 "), Value::Float(2.5));
        assert_eq!(parse_cell(""), Value::Null);
        assert_eq!(parse_cell("North"), Value::from("North"));
        assert_eq!(parse_cell("NaN"), Value::from("NaN"));
    }

    #[test]
    fn loads_columns_in_header_order() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "region,units_sold\nNorth,10\nSouth,").unwrap();
        let dataset = load_csv(file.path()).unwrap();
        assert_eq!(dataset.column_names(), &["region", "units_sold"]);
        assert_eq!(dataset.value("units_sold", 1), Some(&Value::Null));
    }

    #[test]
    fn sample_data_runs_through_the_engine() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("data");
        let dataset = load_csv(&dir.join("sales.csv")).unwrap();
        let engine = vista::ChartEngine::new();
        let kinds = engine.profile(&dataset);
        assert_eq!(kinds.datetime, vec!["order_date"]);

        let spec_text = std::fs::read_to_string(dir.join("revenue_by_region.json")).unwrap();
        let spec: vista::ChartSpec = serde_json::from_str(&spec_text).unwrap();
        let result = engine.generate(&spec, &dataset, &kinds).unwrap();
        assert_eq!(result.data().len(), 3);
        assert!(result
            .transformations()
            .contains("Calculated revenue = units_sold * unit_price (Units times price)"));
    }
}
