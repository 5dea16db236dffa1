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
use crate::data::{Column, Dataset, OrderedValue, Value};
use crate::error::{DataError, DataResult, ProcessingError, Result};
use crate::spec::{Aggregation, ResolvedSpec};
use crate::trace::TransformationTrace;
use itertools::Itertools;
use rayon::prelude::*;
use std::collections::BTreeMap;
use tracing::{debug, warn};

pub const COUNT_COLUMN: &str = "count";

type Groups = Vec<(Vec<OrderedValue>, Vec<usize>)>;

/// Numeric reduction over one group; `values` excludes missing cells.
pub fn reduce(aggregation: Aggregation, values: &[f64]) -> Option<f64> {
    match aggregation {
        Aggregation::Count => Some(values.len() as f64),
        Aggregation::Mean => {
            (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
        }
        Aggregation::Min => values.iter().copied().reduce(f64::min),
        Aggregation::Max => values.iter().copied().reduce(f64::max),
        Aggregation::Sum | Aggregation::None => Some(values.iter().sum()),
    }
}

/// The function actually applied for `aggregation`; `none` sums.
fn effective(aggregation: Aggregation) -> Aggregation {
    match aggregation {
        Aggregation::None => Aggregation::Sum,
        other => other,
    }
}

pub struct AggregationEngine<'a> {
    config: &'a EngineConfig,
}
impl<'a> AggregationEngine<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self { config }
    }

    /// `group_by` followed by `x`, restricted to existing columns, without
    /// duplicates.
    pub fn grouping_columns(spec: &ResolvedSpec, dataset: &Dataset) -> Vec<String> {
        spec.group_by()
            .iter()
            .map(String::as_str)
            .chain(spec.x())
            .filter(|name| dataset.has_column(name))
            .unique()
            .map(str::to_string)
            .collect()
    }

    /// Groups and reduces when the spec asks for it. Returns the (possibly
    /// unchanged) dataset with the spec the later stages must use.
    pub fn apply(
        &self,
        dataset: &Dataset,
        spec: &ResolvedSpec,
        trace: &mut TransformationTrace,
    ) -> Result<(Dataset, ResolvedSpec)> {
        if !spec.needs_aggregation() {
            return Ok((dataset.clone(), spec.clone()));
        }
        let keys = Self::grouping_columns(spec, dataset);
        if keys.is_empty() {
            warn!("No valid grouping columns; skipping aggregation");
            trace.record("Skipped aggregation: no grouping columns found");
            return Ok((dataset.clone(), spec.clone()));
        }
        let key_list = format!("[{}]", keys.iter().join(", "));
        let groups = self.group_rows(dataset, &keys);
        debug!(keys = %key_list, groups = groups.len(), "Grouped rows");

        if spec.aggregation() == Aggregation::Count {
            let counts = groups
                .iter()
                .map(|(_, rows)| Value::Int(rows.len() as i64))
                .collect();
            let result = build_output(dataset, &keys, &groups, COUNT_COLUMN, counts)
                .map_err(stage_failure)?;
            trace.record(format!("Grouped by {key_list} and counted rows"));
            if let Some(y) = spec.y().filter(|y| *y != COUNT_COLUMN) {
                trace.record(format!("Replaced y '{y}' with generated '{COUNT_COLUMN}' column"));
            }
            return Ok((result, spec.with_y(COUNT_COLUMN)));
        }

        let Some(y) = spec.y() else {
            warn!("Aggregation requested without a y column; skipping");
            trace.record("Skipped aggregation: no y column specified");
            return Ok((dataset.clone(), spec.clone()));
        };
        let Some(target) = dataset.get_column(y) else {
            warn!(y = %y, "Y column not found; skipping aggregation");
            trace.record(format!("Skipped aggregation: y column '{y}' not found"));
            return Ok((dataset.clone(), spec.clone()));
        };
        if keys.iter().any(|k| k == y) {
            warn!(y = %y, "Y column is also a grouping column; skipping aggregation");
            trace.record(format!(
                "Skipped aggregation: y column '{y}' is also a grouping column"
            ));
            return Ok((dataset.clone(), spec.clone()));
        }
        let function = effective(spec.aggregation());
        let numeric = target.numeric();
        let reduce_group = |rows: &[usize]| {
            let values: Vec<f64> = rows.iter().filter_map(|&row| numeric[row]).collect();
            Value::from(reduce(function, &values))
        };
        let reduced: Vec<Value> = if dataset.row_count() > self.config.parallel_threshold {
            groups.par_iter().map(|(_, rows)| reduce_group(rows.as_slice())).collect()
        } else {
            groups.iter().map(|(_, rows)| reduce_group(rows.as_slice())).collect()
        };
        let result = build_output(dataset, &keys, &groups, y, reduced).map_err(stage_failure)?;
        trace.record(format!("Grouped by {key_list}, applied {function} to {y}"));
        Ok((result, spec.clone()))
    }

    /// Row indices per distinct key, in ascending key order. Rows with any
    /// missing key value belong to no group.
    fn group_rows(&self, dataset: &Dataset, keys: &[String]) -> Groups {
        let columns: Vec<&Column> = keys
            .iter()
            .filter_map(|k| dataset.get_column(k))
            .collect();
        let mut groups: BTreeMap<Vec<OrderedValue>, Vec<usize>> = BTreeMap::new();
        'rows: for row in 0..dataset.row_count() {
            let mut key = Vec::with_capacity(columns.len());
            for column in &columns {
                match column.get(row) {
                    Some(value) if !value.is_null() => key.push(OrderedValue(value.clone())),
                    _ => continue 'rows,
                }
            }
            groups.entry(key).or_default().push(row);
        }
        groups.into_iter().collect()
    }
}

fn stage_failure(err: DataError) -> ProcessingError {
    ProcessingError::Stage {
        stage: "aggregation".to_string(),
        reason: err.to_string(),
    }
}

fn build_output(
    source: &Dataset,
    keys: &[String],
    groups: &Groups,
    value_column: &str,
    values: Vec<Value>,
) -> DataResult<Dataset> {
    let mut result = Dataset::new(source.metadata.name.clone());
    result.metadata.id = source.metadata.id.clone();
    for (i, key) in keys.iter().enumerate() {
        let column: Column = groups.iter().map(|(k, _)| k[i].0.clone()).collect();
        result.add_column(key.clone(), column)?;
    }
    result.add_column(value_column, Column::new(values))?;
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::{ChartSpec, ChartType};

    fn sales() -> Dataset {
        Dataset::from_columns(
            "sales",
            vec![
                ("region", vec![Value::from("North"), Value::from("South"), Value::from("East"), Value::from("North"), Value::Null]),
                ("product", vec![Value::from("A"), Value::from("A"), Value::from("B"), Value::from("B"), Value::from("A")]),
                ("units", vec![Value::Int(10), Value::Int(15), Value::Int(12), Value::from("8"), Value::Int(99)]),
            ],
        )
        .unwrap()
    }

    fn run(spec: ChartSpec) -> (Dataset, ResolvedSpec, TransformationTrace) {
        let config = EngineConfig::default();
        let resolved = ResolvedSpec::resolve(&spec, config.max_group_by);
        let mut trace = TransformationTrace::new();
        let (dataset, resolved) = AggregationEngine::new(&config)
            .apply(&sales(), &resolved, &mut trace)
            .unwrap();
        (dataset, resolved, trace)
    }

    #[test]
    fn sums_per_group_in_key_order() {
        let (result, _, trace) = run(ChartSpec::new(ChartType::Bar)
            .with_x("region")
            .with_y("units")
            .with_aggregation(Aggregation::Sum));
        assert_eq!(
            result.get_column("region").unwrap().values(),
            &[Value::from("East"), Value::from("North"), Value::from("South")]
        );
        assert_eq!(
            result.get_column("units").unwrap().values(),
            &[Value::Float(12.0), Value::Float(18.0), Value::Float(15.0)]
        );
        assert_eq!(trace.entries(), &["Grouped by [region], applied sum to units"]);
    }

    #[test]
    fn count_reassigns_y() {
        let (result, resolved, trace) = run(ChartSpec::new(ChartType::Bar)
            .with_x("region")
            .with_y("units")
            .with_group_by(["product"])
            .with_aggregation(Aggregation::Count));
        assert_eq!(resolved.y(), Some("count"));
        assert_eq!(result.column_names(), &["product", "region", "count"]);
        assert_eq!(result.row_count(), 4);
        assert_eq!(
            trace.entries(),
            &[
                "Grouped by [product, region] and counted rows",
                "Replaced y 'units' with generated 'count' column",
            ]
        );
    }

    #[test]
    fn mean_min_max_reduce_numeric_values() {
        for (aggregation, north) in [
            (Aggregation::Mean, 9.0),
            (Aggregation::Min, 8.0),
            (Aggregation::Max, 10.0),
        ] {
            let (result, _, _) = run(ChartSpec::new(ChartType::Bar)
                .with_x("region")
                .with_y("units")
                .with_aggregation(aggregation));
            assert_eq!(result.value("units", 1), Some(&Value::Float(north)));
        }
    }

    #[test]
    fn group_by_without_aggregation_sums() {
        let (result, _, trace) = run(ChartSpec::new(ChartType::Bar)
            .with_x("product")
            .with_y("units")
            .with_group_by(["product"]));
        assert_eq!(result.row_count(), 2);
        assert_eq!(result.value("units", 0), Some(&Value::Float(124.0)));
        assert!(trace.contains("applied sum to units"));
    }

    #[test]
    fn missing_y_or_keys_pass_through() {
        let (result, resolved, trace) = run(ChartSpec::new(ChartType::Bar)
            .with_x("region")
            .with_y("revenue")
            .with_aggregation(Aggregation::Sum));
        assert_eq!(result.row_count(), 5);
        assert_eq!(resolved.y(), Some("revenue"));
        assert_eq!(trace.entries(), &["Skipped aggregation: y column 'revenue' not found"]);

        let (result, _, trace) = run(ChartSpec::new(ChartType::Bar)
            .with_x("nowhere")
            .with_y("units")
            .with_aggregation(Aggregation::Sum));
        assert_eq!(result.row_count(), 5);
        assert!(trace.contains("no grouping columns"));
    }

    #[test]
    fn reduce_handles_empty_groups() {
        assert_eq!(reduce(Aggregation::Sum, &[]), Some(0.0));
        assert_eq!(reduce(Aggregation::Mean, &[]), None);
        assert_eq!(reduce(Aggregation::Max, &[]), None);
    }
}
