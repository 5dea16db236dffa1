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

use crate::data::{Dataset, Value};
use crate::formatter::to_json;
use crate::spec::{ChartType, ResolvedSpec};
use serde_json::{json, Map};

pub type SummaryStats = Map<String, serde_json::Value>;

pub const NO_DATA_MESSAGE: &str = "No data after processing";

/// Best-effort descriptive statistics; anything not computable is left out.
pub fn summarize(dataset: &Dataset, spec: &ResolvedSpec) -> SummaryStats {
    let mut stats = SummaryStats::new();
    stats.insert("total_records".to_string(), json!(dataset.row_count()));
    stats.insert("chart_type".to_string(), json!(spec.chart_type().as_str()));

    if let Some((y, column)) = spec.y().and_then(|y| dataset.get_column(y).map(|c| (y, c))) {
        let values: Vec<f64> = column.numeric().into_iter().flatten().collect();
        if !values.is_empty() {
            let total: f64 = values.iter().sum();
            let mean = total / values.len() as f64;
            let min = values.iter().copied().fold(f64::INFINITY, f64::min);
            let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            for (suffix, value) in [("total", total), ("mean", mean), ("min", min), ("max", max)] {
                stats.insert(format!("{y}_{suffix}"), to_json(&Value::Float(value)));
            }
        }
    }
    if let Some(x) = spec.x() {
        if let Some(column) = dataset.get_column(x) {
            stats.insert(format!("{x}_unique_count"), json!(column.unique_count()));
        }
    }
    for name in spec.group_by() {
        if let Some(column) = dataset.get_column(name) {
            stats.insert(format!("{name}_groups"), json!(column.unique_count()));
        }
    }
    stats
}

/// Statistics reported when processing leaves no rows.
pub fn empty_stats(chart_type: ChartType) -> SummaryStats {
    let mut stats = SummaryStats::new();
    stats.insert("total_records".to_string(), json!(0));
    stats.insert("chart_type".to_string(), json!(chart_type.as_str()));
    stats.insert("error".to_string(), json!(NO_DATA_MESSAGE));
    stats
}
