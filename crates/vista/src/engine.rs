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

use crate::aggregation::AggregationEngine;
use crate::config::EngineConfig;
use crate::data::{Column, ColumnKind, ColumnKinds, Dataset, Value};
use crate::error::Result;
use crate::expression::apply_calculation;
use crate::filter::FilterEngine;
use crate::formatter::{OutputFormatter, Record};
use crate::spec::{ChartSpec, ResolvedSpec};
use crate::stats::{self, SummaryStats};
use crate::time_period::{Period, TimePeriodExtractor};
use crate::trace::TransformationTrace;
use crate::validator::{self, ValidationOutcome};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Output of one [`ChartEngine::generate`] call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartResult {
    spec: ChartSpec,
    data: Vec<Record>,
    summary_stats: SummaryStats,
    transformations: TransformationTrace,
}
impl ChartResult {
    /// The specification as the caller supplied it.
    pub fn spec(&self) -> &ChartSpec {
        &self.spec
    }
    pub fn data(&self) -> &[Record] {
        &self.data
    }
    pub fn summary_stats(&self) -> &SummaryStats {
        &self.summary_stats
    }
    pub fn transformations(&self) -> &TransformationTrace {
        &self.transformations
    }
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Runs chart specifications against datasets. Holds nothing but its
/// read-only configuration, so one instance can serve concurrent callers.
#[derive(Debug, Clone, Default)]
pub struct ChartEngine {
    config: EngineConfig,
}
impl ChartEngine {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_config(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Calculation, time extraction, validation, filtering, aggregation,
    /// capping, sorting, formatting and statistics, in that order.
    pub fn generate(
        &self,
        spec: &ChartSpec,
        dataset: &Dataset,
        kinds: &ColumnKinds,
    ) -> Result<ChartResult> {
        info!(
            dataset_id = %dataset.metadata.id,
            chart_type = %spec.chart_type,
            rows = dataset.row_count(),
            columns = dataset.column_count(),
            "Generating chart"
        );
        let mut trace = TransformationTrace::new();
        let resolved = self.resolve(spec, &mut trace);

        let mut working = match resolved.calculation() {
            Some(calculation) => apply_calculation(dataset, calculation, &mut trace)?,
            None => dataset.clone(),
        };
        working = TimePeriodExtractor::new(&self.config).apply(&working, resolved.x(), &mut trace);

        let working_kinds = self.working_kinds(&resolved, &working, kinds);
        if let Err(err) = validator::validate(&resolved, &working_kinds) {
            warn!(dataset_id = %dataset.metadata.id, error = %err, "Chart specification failed validation");
            return Err(err.into());
        }
        debug!("Specification passed structural validation");

        working = FilterEngine::apply_all(&working, resolved.filters(), &mut trace);
        debug!(rows = working.row_count(), "Filters applied");
        let (aggregated, resolved) =
            AggregationEngine::new(&self.config).apply(&working, &resolved, &mut trace)?;

        if aggregated.is_empty() {
            warn!("No rows left after processing");
            return Ok(ChartResult {
                spec: spec.clone(),
                data: Vec::new(),
                summary_stats: stats::empty_stats(resolved.chart_type()),
                transformations: trace,
            });
        }

        let formatter = OutputFormatter::new(&self.config);
        let capped = formatter.cap_rows(&aggregated, &mut trace);
        let sorted = OutputFormatter::sort_by_x(&capped, resolved.x(), &mut trace);
        let data = formatter.format(&sorted, &resolved, &mut trace);
        let summary_stats = stats::summarize(&sorted, &resolved);
        info!(
            dataset_id = %sorted.metadata.id,
            records = data.len(),
            steps = trace.len(),
            "Chart generated"
        );
        Ok(ChartResult {
            spec: spec.clone(),
            data,
            summary_stats,
            transformations: trace,
        })
    }

    /// Dry run of the structural checks, with derived columns projected.
    pub fn validate(&self, spec: &ChartSpec, kinds: &ColumnKinds) -> ValidationOutcome {
        let resolved = ResolvedSpec::resolve(spec, self.config.max_group_by);
        let projected = validator::project_kinds(&resolved, kinds);
        let outcome = ValidationOutcome::from(validator::validate_request(&resolved, &projected));
        debug!(is_valid = outcome.is_valid, "Validated chart specification");
        outcome
    }

    /// Column kinds as the profiling collaborator would report them: all
    /// numbers is numeric, a detected date column is datetime, anything
    /// else is categorical.
    pub fn profile(&self, dataset: &Dataset) -> ColumnKinds {
        let extractor = TimePeriodExtractor::new(&self.config);
        let mut kinds = ColumnKinds::new().with_row_count(dataset.row_count());
        for name in dataset.column_names() {
            if let Some(column) = dataset.get_column(name) {
                kinds.insert(name.clone(), infer_kind(column, &extractor));
            }
        }
        kinds
    }

    fn resolve(&self, spec: &ChartSpec, trace: &mut TransformationTrace) -> ResolvedSpec {
        let resolved = ResolvedSpec::resolve(spec, self.config.max_group_by);
        if !resolved.dropped_group_by().is_empty() {
            let dropped = resolved.dropped_group_by().join(", ");
            warn!(dropped = %dropped, "group_by truncated");
            trace.record(format!(
                "Truncated group_by to first {} columns (dropped: {dropped})",
                self.config.max_group_by
            ));
        }
        resolved
    }

    /// Kinds for the columns actually present after calculation and time
    /// extraction. Columns the caller did not profile are inferred.
    fn working_kinds(
        &self,
        spec: &ResolvedSpec,
        dataset: &Dataset,
        kinds: &ColumnKinds,
    ) -> ColumnKinds {
        let extractor = TimePeriodExtractor::new(&self.config);
        let mut working = ColumnKinds::new().with_row_count(dataset.row_count());
        for name in dataset.column_names() {
            let Some(column) = dataset.get_column(name) else {
                continue;
            };
            let kind = kinds
                .kind_of(name)
                .unwrap_or_else(|| infer_kind(column, &extractor));
            working.insert(name.clone(), kind);
        }
        if let Some(calculation) = spec.calculation() {
            working.insert(calculation.field_name.clone(), ColumnKind::Numeric);
        }
        if let Some(x) = spec.x() {
            if let Some(period) = Period::from_axis(x) {
                if dataset.has_column(x) && !kinds.contains(x) {
                    let kind = match period {
                        Period::Year => ColumnKind::Numeric,
                        _ => ColumnKind::Categorical,
                    };
                    working.insert(x.to_string(), kind);
                }
            }
        }
        working
    }
}

fn infer_kind(column: &Column, extractor: &TimePeriodExtractor<'_>) -> ColumnKind {
    let mut present = column.iter().filter(|v| !v.is_null()).peekable();
    if present.peek().is_none() {
        return ColumnKind::Categorical;
    }
    if present.all(Value::is_numeric) {
        return ColumnKind::Numeric;
    }
    match extractor.score_column(column) {
        Some((strict, ratio)) if strict || ratio >= 1.0 => ColumnKind::Datetime,
        _ => ColumnKind::Categorical,
    }
}
