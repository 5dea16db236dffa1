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

//! Declarative chart specifications as produced by the specification
//! generator, plus the immutable [`ResolvedSpec`] the pipeline threads
//! through its stages.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartType {
    Bar,
    Line,
    Scatter,
    Pie,
}
impl ChartType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChartType::Bar => "bar",
            ChartType::Line => "line",
            ChartType::Scatter => "scatter",
            ChartType::Pie => "pie",
        }
    }
    pub fn title(&self) -> &'static str {
        match self {
            ChartType::Bar => "Bar",
            ChartType::Line => "Line",
            ChartType::Scatter => "Scatter",
            ChartType::Pie => "Pie",
        }
    }
    pub fn all() -> [ChartType; 4] {
        [ChartType::Bar, ChartType::Line, ChartType::Scatter, ChartType::Pie]
    }
}
impl fmt::Display for ChartType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reduction applied per group. Unknown names deserialise as `Sum`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Aggregation {
    Sum,
    Mean,
    Count,
    Min,
    Max,
    #[default]
    None,
}
impl Aggregation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Aggregation::Sum => "sum",
            Aggregation::Mean => "mean",
            Aggregation::Count => "count",
            Aggregation::Min => "min",
            Aggregation::Max => "max",
            Aggregation::None => "none",
        }
    }
    pub fn is_none(&self) -> bool {
        matches!(self, Aggregation::None)
    }
}
impl From<String> for Aggregation {
    fn from(name: String) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "none" | "" => Aggregation::None,
            "count" => Aggregation::Count,
            "mean" => Aggregation::Mean,
            "min" => Aggregation::Min,
            "max" => Aggregation::Max,
            _ => Aggregation::Sum,
        }
    }
}
impl From<Aggregation> for String {
    fn from(aggregation: Aggregation) -> Self {
        aggregation.as_str().to_string()
    }
}
impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationSpec {
    pub field_name: String,
    pub formula: String,
    #[serde(default)]
    pub description: String,
}
impl CalculationSpec {
    pub fn new(field_name: impl Into<String>, formula: impl Into<String>) -> Self {
        Self {
            field_name: field_name.into(),
            formula: formula.into(),
            description: String::new(),
        }
    }
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilterOperator {
    #[serde(rename = "==")]
    Equal,
    #[serde(rename = "!=")]
    NotEqual,
    #[serde(rename = ">")]
    GreaterThan,
    #[serde(rename = ">=")]
    GreaterThanOrEqual,
    #[serde(rename = "<")]
    LessThan,
    #[serde(rename = "<=")]
    LessThanOrEqual,
    #[serde(rename = "in")]
    In,
    #[serde(rename = "not_in")]
    NotIn,
}
impl FilterOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOperator::Equal => "==",
            FilterOperator::NotEqual => "!=",
            FilterOperator::GreaterThan => ">",
            FilterOperator::GreaterThanOrEqual => ">=",
            FilterOperator::LessThan => "<",
            FilterOperator::LessThanOrEqual => "<=",
            FilterOperator::In => "in",
            FilterOperator::NotIn => "not_in",
        }
    }
    pub fn is_range(&self) -> bool {
        matches!(
            self,
            FilterOperator::GreaterThan
                | FilterOperator::GreaterThanOrEqual
                | FilterOperator::LessThan
                | FilterOperator::LessThanOrEqual
        )
    }
}
impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
}
impl Literal {
    /// Float conversion used by the range operators.
    pub fn to_f64(&self) -> Option<f64> {
        match self {
            Literal::Int(v) => Some(*v as f64),
            Literal::Float(v) if v.is_finite() => Some(*v),
            Literal::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Literal::Text(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
            Literal::Float(_) => None,
        }
    }
}
impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Int(v) => write!(f, "{v}"),
            Literal::Float(v) => write!(f, "{v}"),
            Literal::Bool(v) => write!(f, "{v}"),
            Literal::Text(s) => write!(f, "{s}"),
        }
    }
}
impl From<&str> for Literal {
    fn from(v: &str) -> Self {
        Literal::Text(v.to_string())
    }
}
impl From<i64> for Literal {
    fn from(v: i64) -> Self {
        Literal::Int(v)
    }
}
impl From<f64> for Literal {
    fn from(v: f64) -> Self {
        Literal::Float(v)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    List(Vec<Literal>),
    Scalar(Literal),
}
impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterValue::Scalar(literal) => write!(f, "{literal}"),
            FilterValue::List(items) => {
                let rendered: Vec<String> = items.iter().map(ToString::to_string).collect();
                write!(f, "[{}]", rendered.join(", "))
            }
        }
    }
}
impl From<Literal> for FilterValue {
    fn from(v: Literal) -> Self {
        FilterValue::Scalar(v)
    }
}
impl From<&str> for FilterValue {
    fn from(v: &str) -> Self {
        FilterValue::Scalar(v.into())
    }
}
impl From<i64> for FilterValue {
    fn from(v: i64) -> Self {
        FilterValue::Scalar(v.into())
    }
}
impl From<f64> for FilterValue {
    fn from(v: f64) -> Self {
        FilterValue::Scalar(v.into())
    }
}
impl From<Vec<Literal>> for FilterValue {
    fn from(v: Vec<Literal>) -> Self {
        FilterValue::List(v)
    }
}
impl<T: Into<Literal>> FromIterator<T> for FilterValue {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        FilterValue::List(iter.into_iter().map(Into::into).collect())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterSpec {
    pub column: String,
    pub operator: FilterOperator,
    /// `None` when upstream sent `null` or left the value out; such a
    /// filter is skipped rather than rejecting the whole spec.
    #[serde(default)]
    pub value: Option<FilterValue>,
}
impl FilterSpec {
    pub fn new(
        column: impl Into<String>,
        operator: FilterOperator,
        value: impl Into<FilterValue>,
    ) -> Self {
        Self {
            column: column.into(),
            operator,
            value: Some(value.into()),
        }
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSpec {
    pub chart_type: ChartType,
    #[serde(default)]
    pub x: Option<String>,
    #[serde(default)]
    pub y: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub aggregation: Aggregation,
    #[serde(default, deserialize_with = "null_as_default")]
    pub group_by: Vec<String>,
    #[serde(default)]
    pub calculation: Option<CalculationSpec>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub filters: Vec<FilterSpec>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub explanation: Option<String>,
}
impl ChartSpec {
    pub fn new(chart_type: ChartType) -> Self {
        Self {
            chart_type,
            x: None,
            y: None,
            aggregation: Aggregation::None,
            group_by: Vec::new(),
            calculation: None,
            filters: Vec::new(),
            title: None,
            explanation: None,
        }
    }
    pub fn with_x(mut self, x: impl Into<String>) -> Self {
        self.x = Some(x.into());
        self
    }
    pub fn with_y(mut self, y: impl Into<String>) -> Self {
        self.y = Some(y.into());
        self
    }
    pub fn with_aggregation(mut self, aggregation: Aggregation) -> Self {
        self.aggregation = aggregation;
        self
    }
    pub fn with_group_by<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.group_by = columns.into_iter().map(Into::into).collect();
        self
    }
    pub fn with_calculation(mut self, calculation: CalculationSpec) -> Self {
        self.calculation = Some(calculation);
        self
    }
    pub fn with_filter(mut self, filter: FilterSpec) -> Self {
        self.filters.push(filter);
        self
    }
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

/// Working copy of a [`ChartSpec`] with defaults applied. Stages never
/// mutate it; they derive a new value instead (see [`ResolvedSpec::with_y`]).
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSpec {
    chart_type: ChartType,
    x: Option<String>,
    y: Option<String>,
    aggregation: Aggregation,
    group_by: Vec<String>,
    dropped_group_by: Vec<String>,
    calculation: Option<CalculationSpec>,
    filters: Vec<FilterSpec>,
    title: String,
    explanation: String,
}
impl ResolvedSpec {
    /// Applies defaults and truncates `group_by` to `max_group_by` entries.
    pub fn resolve(spec: &ChartSpec, max_group_by: usize) -> Self {
        let x = non_blank(spec.x.as_deref());
        let y = non_blank(spec.y.as_deref());
        let explanation = non_blank(spec.explanation.as_deref()).unwrap_or_else(|| {
            match (&x, &y) {
                (Some(x), Some(y)) => format!("{} chart of {y} by {x}", spec.chart_type.title()),
                _ => format!("{} chart", spec.chart_type.title()),
            }
        });
        let title = non_blank(spec.title.as_deref()).unwrap_or_else(|| explanation.clone());
        let aggregation = if y.is_none()
            && spec.aggregation.is_none()
            && matches!(
                spec.chart_type,
                ChartType::Bar | ChartType::Line | ChartType::Scatter
            ) {
            Aggregation::Sum
        } else {
            spec.aggregation
        };
        let mut group_by: Vec<String> = spec
            .group_by
            .iter()
            .filter_map(|c| non_blank(Some(c)))
            .collect();
        let dropped_group_by = if group_by.len() > max_group_by {
            group_by.split_off(max_group_by)
        } else {
            Vec::new()
        };
        Self {
            chart_type: spec.chart_type,
            x,
            y,
            aggregation,
            group_by,
            dropped_group_by,
            calculation: spec.calculation.clone(),
            filters: spec.filters.clone(),
            title,
            explanation,
        }
    }
    pub fn with_y(&self, y: impl Into<String>) -> Self {
        Self {
            y: Some(y.into()),
            ..self.clone()
        }
    }
    pub fn chart_type(&self) -> ChartType {
        self.chart_type
    }
    pub fn x(&self) -> Option<&str> {
        self.x.as_deref()
    }
    pub fn y(&self) -> Option<&str> {
        self.y.as_deref()
    }
    pub fn aggregation(&self) -> Aggregation {
        self.aggregation
    }
    pub fn group_by(&self) -> &[String] {
        &self.group_by
    }
    /// `group_by` entries beyond the configured maximum.
    pub fn dropped_group_by(&self) -> &[String] {
        &self.dropped_group_by
    }
    pub fn calculation(&self) -> Option<&CalculationSpec> {
        self.calculation.as_ref()
    }
    pub fn filters(&self) -> &[FilterSpec] {
        &self.filters
    }
    pub fn title(&self) -> &str {
        &self.title
    }
    pub fn explanation(&self) -> &str {
        &self.explanation
    }
    pub fn needs_aggregation(&self) -> bool {
        !self.aggregation.is_none() || !self.group_by.is_empty()
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialises_generator_output() {
        let spec: ChartSpec = serde_json::from_str(
            r#"{
                "chart_type": "bar",
                "x": "region",
                "y": "revenue",
                "aggregation": "sum",
                "group_by": null,
                "calculation": {"field_name": "revenue", "formula": "units_sold * unit_price", "description": "Revenue"},
                "filters": [
                    {"column": "region", "operator": "in", "value": ["North", "South"]},
                    {"column": "units_sold", "operator": ">=", "value": 10}
                ],
                "title": null
            }"#,
        )
        .unwrap();
        assert_eq!(spec.chart_type, ChartType::Bar);
        assert_eq!(spec.aggregation, Aggregation::Sum);
        assert!(spec.group_by.is_empty());
        assert_eq!(
            spec.filters[0].value,
            Some(FilterValue::List(vec!["North".into(), "South".into()]))
        );
        assert_eq!(spec.filters[1].operator, FilterOperator::GreaterThanOrEqual);
        assert_eq!(spec.filters[1].value, Some(FilterValue::Scalar(Literal::Int(10))));
    }

    #[test]
    fn null_or_absent_filter_value_still_deserializes() {
        let spec: ChartSpec = serde_json::from_str(
            r#"{
                "chart_type": "bar",
                "filters": [
                    {"column": "region", "operator": "==", "value": null},
                    {"column": "units_sold", "operator": ">"}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(spec.filters.len(), 2);
        assert!(spec.filters.iter().all(|f| f.value.is_none()));
    }

    #[test]
    fn unknown_aggregation_falls_back_to_sum() {
        let spec: ChartSpec =
            serde_json::from_str(r#"{"chart_type": "line", "y": "v", "aggregation": "median"}"#)
                .unwrap();
        assert_eq!(spec.aggregation, Aggregation::Sum);
        let spec: ChartSpec =
            serde_json::from_str(r#"{"chart_type": "line", "aggregation": null}"#).unwrap();
        assert_eq!(spec.aggregation, Aggregation::None);
    }

    #[test]
    fn resolve_fills_title_and_explanation() {
        let spec = ChartSpec::new(ChartType::Pie)
            .with_x("region")
            .with_y("units_sold");
        let resolved = ResolvedSpec::resolve(&spec, 3);
        assert_eq!(resolved.explanation(), "Pie chart of units_sold by region");
        assert_eq!(resolved.title(), "Pie chart of units_sold by region");
    }

    #[test]
    fn resolve_defaults_aggregation_when_y_missing() {
        let spec = ChartSpec::new(ChartType::Bar).with_x("region");
        assert_eq!(ResolvedSpec::resolve(&spec, 3).aggregation(), Aggregation::Sum);
        let pie = ChartSpec::new(ChartType::Pie).with_x("region");
        assert_eq!(ResolvedSpec::resolve(&pie, 3).aggregation(), Aggregation::None);
    }

    #[test]
    fn resolve_truncates_group_by() {
        let spec = ChartSpec::new(ChartType::Bar)
            .with_x("a")
            .with_y("v")
            .with_group_by(["b", "c", "d", "e"]);
        let resolved = ResolvedSpec::resolve(&spec, 3);
        assert_eq!(resolved.group_by(), &["b", "c", "d"]);
        assert_eq!(resolved.dropped_group_by(), &["e"]);
    }

    #[test]
    fn with_y_leaves_original_untouched() {
        let spec = ChartSpec::new(ChartType::Bar)
            .with_x("region")
            .with_aggregation(Aggregation::Count);
        let resolved = ResolvedSpec::resolve(&spec, 3);
        let counted = resolved.with_y("count");
        assert_eq!(resolved.y(), None);
        assert_eq!(counted.y(), Some("count"));
    }
}
