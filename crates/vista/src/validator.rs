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

use crate::data::{ColumnKind, ColumnKinds};
use crate::error::{ValidationError, ValidationResult};
use crate::spec::{Aggregation, ChartType, ResolvedSpec};
use crate::time_period::Period;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// Terminal verdict of [`validate`], shaped for API callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub is_valid: bool,
    pub error_message: Option<String>,
    pub suggestions: Vec<String>,
}
impl ValidationOutcome {
    pub fn success() -> Self {
        Self {
            is_valid: true,
            error_message: None,
            suggestions: Vec::new(),
        }
    }
    pub fn failure(message: impl Into<String>, suggestions: Vec<String>) -> Self {
        Self {
            is_valid: false,
            error_message: Some(message.into()),
            suggestions,
        }
    }
    pub fn into_result(self) -> ValidationResult<()> {
        if self.is_valid {
            return Ok(());
        }
        Err(ValidationError::StructuralRule {
            message: self.error_message.unwrap_or_default(),
            suggestions: self.suggestions,
        })
    }
}
impl From<ValidationResult<()>> for ValidationOutcome {
    fn from(result: ValidationResult<()>) -> Self {
        match result {
            Ok(()) => Self::success(),
            Err(err) => Self::failure(err.to_string(), err.suggestions()),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ChartRule {
    chart_type: ChartType,
    x: Option<ColumnKind>,
    y: Option<ColumnKind>,
    /// Any aggregation other than `none` satisfies the y requirement.
    y_waived_by_aggregation: bool,
}

const RULES: &[ChartRule] = &[
    ChartRule {
        chart_type: ChartType::Scatter,
        x: Some(ColumnKind::Numeric),
        y: Some(ColumnKind::Numeric),
        y_waived_by_aggregation: false,
    },
    ChartRule {
        chart_type: ChartType::Pie,
        x: Some(ColumnKind::Categorical),
        y: Some(ColumnKind::Numeric),
        y_waived_by_aggregation: false,
    },
    ChartRule {
        chart_type: ChartType::Bar,
        x: None,
        y: Some(ColumnKind::Numeric),
        y_waived_by_aggregation: true,
    },
    ChartRule {
        chart_type: ChartType::Line,
        x: None,
        y: Some(ColumnKind::Numeric),
        y_waived_by_aggregation: true,
    },
];

fn rule_for(chart_type: ChartType) -> Option<&'static ChartRule> {
    RULES.iter().find(|rule| rule.chart_type == chart_type)
}

/// Adds the columns the pipeline will derive before validation runs: the
/// calculated field (numeric) and a period x axis (only when some datetime
/// column exists to derive it from).
pub fn project_kinds(spec: &ResolvedSpec, kinds: &ColumnKinds) -> ColumnKinds {
    let mut projected = kinds.clone();
    if let Some(calculation) = spec.calculation() {
        projected.insert(calculation.field_name.clone(), ColumnKind::Numeric);
    }
    if let Some(x) = spec.x() {
        if let Some(period) = Period::from_axis(x) {
            if !projected.contains(x) && !kinds.datetime.is_empty() {
                let kind = match period {
                    Period::Year => ColumnKind::Numeric,
                    _ => ColumnKind::Categorical,
                };
                projected.insert(x.to_string(), kind);
            }
        }
    }
    projected
}

/// Checks axis and group columns, then the chart-type rule table, against
/// `kinds`. Filter columns are not checked here; the filter stage skips
/// filters on unknown columns.
pub fn validate(spec: &ResolvedSpec, kinds: &ColumnKinds) -> ValidationResult<()> {
    check_presence(axis_columns(spec), kinds)?;
    check_rules(spec, kinds)
}

/// [`validate`] plus presence of every filter column, for dry runs.
pub fn validate_request(spec: &ResolvedSpec, kinds: &ColumnKinds) -> ValidationResult<()> {
    let mut referenced = axis_columns(spec);
    referenced.extend(spec.filters().iter().map(|f| f.column.as_str()));
    check_presence(referenced, kinds)?;
    check_rules(spec, kinds)
}

fn axis_columns(spec: &ResolvedSpec) -> Vec<&str> {
    let mut referenced: Vec<&str> = Vec::new();
    referenced.extend(spec.x());
    if spec.aggregation() != Aggregation::Count {
        referenced.extend(spec.y());
    }
    referenced.extend(spec.group_by().iter().map(String::as_str));
    referenced
}

fn check_presence(referenced: Vec<&str>, kinds: &ColumnKinds) -> ValidationResult<()> {
    let missing: Vec<String> = referenced
        .into_iter()
        .filter(|name| !kinds.contains(name))
        .unique()
        .map(str::to_string)
        .collect();
    if !missing.is_empty() {
        return Err(ValidationError::MissingColumns {
            missing,
            available: kinds.columns.clone(),
        });
    }
    Ok(())
}

fn check_rules(spec: &ResolvedSpec, kinds: &ColumnKinds) -> ValidationResult<()> {
    let counting = spec.aggregation() == Aggregation::Count;
    let Some(rule) = rule_for(spec.chart_type()) else {
        return Ok(());
    };
    let chart = spec.chart_type();
    if let Some(required) = rule.x {
        let Some(x) = spec.x() else {
            return Err(rule_violation(
                format!("{chart} charts require an x column"),
                required,
                kinds,
            ));
        };
        check_kind("x", x, required, chart, kinds)?;
    }
    if let Some(required) = rule.y {
        let waived = counting || (rule.y_waived_by_aggregation && !spec.aggregation().is_none());
        if !waived {
            let Some(y) = spec.y() else {
                return Err(rule_violation(
                    format!("{chart} charts require a y column"),
                    required,
                    kinds,
                ));
            };
            check_kind("y", y, required, chart, kinds)?;
        }
    }
    Ok(())
}

fn check_kind(
    axis: &str,
    column: &str,
    required: ColumnKind,
    chart: ChartType,
    kinds: &ColumnKinds,
) -> ValidationResult<()> {
    if kinds.kind_of(column) == Some(required) {
        return Ok(());
    }
    Err(rule_violation(
        format!("{axis} column '{column}' must be {required} for {chart} charts"),
        required,
        kinds,
    ))
}

fn rule_violation(message: String, required: ColumnKind, kinds: &ColumnKinds) -> ValidationError {
    let candidates = kinds.columns_of(required);
    let label = match required {
        ColumnKind::Numeric => "Numeric",
        ColumnKind::Categorical => "Categorical",
        ColumnKind::Datetime => "Datetime",
    };
    let suggestion = if candidates.is_empty() {
        format!("No {required} columns are available")
    } else {
        format!("{label} columns: {}", candidates.join(", "))
    };
    ValidationError::StructuralRule {
        message,
        suggestions: vec![suggestion],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::{CalculationSpec, ChartSpec, FilterOperator, FilterSpec};

    fn kinds() -> ColumnKinds {
        ColumnKinds::new()
            .with_column("region", ColumnKind::Categorical)
            .with_column("product", ColumnKind::Categorical)
            .with_column("units_sold", ColumnKind::Numeric)
            .with_column("unit_price", ColumnKind::Numeric)
            .with_column("order_date", ColumnKind::Datetime)
    }

    fn check(spec: ChartSpec) -> ValidationResult<()> {
        let resolved = ResolvedSpec::resolve(&spec, 3);
        validate_request(&resolved, &project_kinds(&resolved, &kinds()))
    }

    #[test]
    fn scatter_needs_numeric_x() {
        let err = check(ChartSpec::new(ChartType::Scatter).with_x("region").with_y("units_sold"))
            .unwrap_err();
        assert!(err.to_string().contains("must be numeric"));
        assert_eq!(err.suggestions(), vec!["Numeric columns: units_sold, unit_price"]);
    }

    #[test]
    fn pie_needs_categorical_x() {
        let err = check(ChartSpec::new(ChartType::Pie).with_x("unit_price").with_y("units_sold"))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "x column 'unit_price' must be categorical for pie charts"
        );
    }

    #[test]
    fn bar_y_is_waived_by_aggregation() {
        let spec = ChartSpec::new(ChartType::Bar).with_x("region").with_y("product");
        assert!(check(spec.clone()).is_err());
        assert!(check(spec.with_aggregation(Aggregation::Count)).is_ok());
    }

    #[test]
    fn missing_columns_are_all_named() {
        let err = check(
            ChartSpec::new(ChartType::Bar)
                .with_x("country")
                .with_y("units_sold")
                .with_filter(FilterSpec::new("channel", FilterOperator::Equal, "web")),
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "Column(s) not found: country, channel");
        assert!(err.suggestions()[0].starts_with("Available columns: region, product"));
    }

    #[test]
    fn pipeline_check_leaves_filter_columns_to_the_filter_stage() {
        let spec = ResolvedSpec::resolve(
            &ChartSpec::new(ChartType::Bar)
                .with_x("region")
                .with_y("units_sold")
                .with_filter(FilterSpec::new("channel", FilterOperator::Equal, "web")),
            3,
        );
        assert!(validate(&spec, &kinds()).is_ok());
        assert!(matches!(
            validate_request(&spec, &kinds()),
            Err(ValidationError::MissingColumns { .. })
        ));
    }

    #[test]
    fn derived_columns_are_projected() {
        let spec = ChartSpec::new(ChartType::Scatter)
            .with_x("year")
            .with_y("revenue")
            .with_calculation(CalculationSpec::new("revenue", "units_sold * unit_price"));
        assert!(check(spec).is_ok());
        let by_month = ChartSpec::new(ChartType::Pie).with_x("month").with_y("units_sold");
        assert!(check(by_month).is_ok());
    }

    #[test]
    fn period_needs_a_datetime_column() {
        let kinds = ColumnKinds::new().with_column("units_sold", ColumnKind::Numeric);
        let spec = ResolvedSpec::resolve(
            &ChartSpec::new(ChartType::Line).with_x("month").with_y("units_sold"),
            3,
        );
        let err = validate(&spec, &project_kinds(&spec, &kinds)).unwrap_err();
        assert!(matches!(err, ValidationError::MissingColumns { .. }));
    }

    #[test]
    fn outcome_round_trips_to_result() {
        let outcome = ValidationOutcome::from(check(
            ChartSpec::new(ChartType::Scatter).with_x("region").with_y("units_sold"),
        ));
        assert!(!outcome.is_valid);
        assert!(outcome.clone().into_result().is_err());
        assert_eq!(
            serde_json::to_value(ValidationOutcome::success()).unwrap(),
            serde_json::json!({"is_valid": true, "error_message": null, "suggestions": []})
        );
    }
}
