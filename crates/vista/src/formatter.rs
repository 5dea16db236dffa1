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

use crate::config::EngineConfig;
use crate::data::{Dataset, Value};
use crate::spec::{ChartType, ResolvedSpec};
use crate::trace::TransformationTrace;
use serde_json::{Map, Number};
use std::cmp::Ordering;
use tracing::{debug, warn};

/// One output record, keys in insertion order.
pub type Record = Map<String, serde_json::Value>;

pub const OTHERS_LABEL: &str = "Others";

/// Largest magnitude at which every integer is exactly representable in f64.
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Coerces a cell to a JSON-safe primitive: null, number or string.
pub fn to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Int(v) => serde_json::Value::Number(Number::from(*v)),
        Value::Float(v) if !v.is_finite() => serde_json::Value::Null,
        Value::Float(v) if v.fract() == 0.0 && v.abs() <= MAX_EXACT_INTEGER => {
            serde_json::Value::Number(Number::from(*v as i64))
        }
        Value::Float(v) => Number::from_f64(*v)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::Timestamp(_) | Value::Text(_) => serde_json::Value::String(value.to_string()),
    }
}

pub struct OutputFormatter<'a> {
    config: &'a EngineConfig,
}
impl<'a> OutputFormatter<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self { config }
    }

    /// Keeps the first `max_data_points` rows.
    pub fn cap_rows(&self, dataset: &Dataset, trace: &mut TransformationTrace) -> Dataset {
        let limit = self.config.max_data_points;
        let total = dataset.row_count();
        if total <= limit {
            return dataset.clone();
        }
        warn!(limit, total, "Row cap applied");
        trace.record(format!("Limited output to first {limit} of {total} rows"));
        dataset.head(limit)
    }

    /// Ascending stable sort on `x`; a missing column leaves the order as is.
    pub fn sort_by_x(dataset: &Dataset, x: Option<&str>, trace: &mut TransformationTrace) -> Dataset {
        let Some(x) = x else {
            return dataset.clone();
        };
        match dataset.sort_by(x, true) {
            Ok(sorted) => {
                trace.record(format!("Sorted by {x} ascending"));
                sorted
            }
            Err(err) => {
                debug!(error = %err, "Sort skipped");
                dataset.clone()
            }
        }
    }

    pub fn format(
        &self,
        dataset: &Dataset,
        spec: &ResolvedSpec,
        trace: &mut TransformationTrace,
    ) -> Vec<Record> {
        if spec.chart_type() == ChartType::Pie {
            if let (Some(x), Some(y)) = (spec.x(), spec.y()) {
                if dataset.has_column(x) && dataset.has_column(y) {
                    return self.format_pie(dataset, x, y, trace);
                }
            }
            warn!("Pie chart without usable x and y columns; using standard layout");
        }
        Self::format_standard(dataset, spec)
    }

    /// `{name, value}` pairs, collapsing the smallest categories into
    /// "Others" when there are more than `max_categories`.
    pub fn format_pie(
        &self,
        dataset: &Dataset,
        x: &str,
        y: &str,
        trace: &mut TransformationTrace,
    ) -> Vec<Record> {
        let (Some(names), Some(values)) = (dataset.get_column(x), dataset.get_column(y)) else {
            return Vec::new();
        };
        let pair = |name: serde_json::Value, value: serde_json::Value| {
            let mut record = Record::new();
            record.insert("name".to_string(), name);
            record.insert("value".to_string(), value);
            record
        };
        let max = self.config.max_categories;
        if dataset.row_count() <= max {
            return (0..dataset.row_count())
                .map(|row| pair(to_json(&names.values()[row]), to_json(&values.values()[row])))
                .collect();
        }
        let numeric = values.numeric();
        let mut order: Vec<usize> = (0..dataset.row_count()).collect();
        order.sort_by(|&a, &b| match (numeric[a], numeric[b]) {
            (Some(va), Some(vb)) => vb.total_cmp(&va),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        });
        let (kept, excluded) = order.split_at(max.saturating_sub(1));
        let mut records: Vec<Record> = kept
            .iter()
            .map(|&row| pair(to_json(&names.values()[row]), to_json(&values.values()[row])))
            .collect();
        let others: f64 = excluded.iter().filter_map(|&row| numeric[row]).sum();
        if others != 0.0 {
            records.push(pair(
                serde_json::Value::String(OTHERS_LABEL.to_string()),
                to_json(&Value::Float(others)),
            ));
        }
        trace.record(format!(
            "Grouped {} smallest categories into {OTHERS_LABEL}",
            excluded.len()
        ));
        records
    }

    /// One record per row with `x`, `y` and every `group_by` column present.
    pub fn format_standard(dataset: &Dataset, spec: &ResolvedSpec) -> Vec<Record> {
        let mut fields: Vec<&str> = Vec::new();
        for name in spec
            .x()
            .into_iter()
            .chain(spec.y())
            .chain(spec.group_by().iter().map(String::as_str))
        {
            if dataset.has_column(name) && !fields.contains(&name) {
                fields.push(name);
            }
        }
        let columns: Vec<_> = fields
            .iter()
            .filter_map(|name| dataset.get_column(name).map(|column| (*name, column)))
            .collect();
        (0..dataset.row_count())
            .map(|row| {
                columns
                    .iter()
                    .map(|(name, column)| {
                        let value = column.get(row).map(to_json).unwrap_or_default();
                        (name.to_string(), value)
                    })
                    .collect()
            })
            .collect()
    }
}
