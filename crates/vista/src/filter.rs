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

use crate::data::{Column, Dataset, Value};
use crate::spec::{FilterOperator, FilterSpec, FilterValue, Literal};
use crate::trace::TransformationTrace;
use std::fmt;
use tracing::{debug, warn};

/// Why a single filter was not applied.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    ColumnNotFound,
    MissingValue,
    NonNumericValue(String),
    ExpectsList,
    ExpectsSingleValue,
}
impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::ColumnNotFound => write!(f, "column not found"),
            SkipReason::MissingValue => write!(f, "no value given"),
            SkipReason::NonNumericValue(value) => {
                write!(f, "value '{value}' is not numeric")
            }
            SkipReason::ExpectsList => write!(f, "operator expects a list of values"),
            SkipReason::ExpectsSingleValue => write!(f, "operator expects a single value"),
        }
    }
}

/// A filter bound to its column, ready to test rows by index.
#[derive(Debug)]
pub enum CompiledPredicate<'a> {
    Equal(&'a Column, Literal),
    NotEqual(&'a Column, Literal),
    Range {
        values: Vec<Option<f64>>,
        operator: FilterOperator,
        bound: f64,
    },
    In(&'a Column, Vec<Literal>),
    NotIn(&'a Column, Vec<Literal>),
}
impl<'a> CompiledPredicate<'a> {
    pub fn compile(dataset: &'a Dataset, filter: &FilterSpec) -> Result<Self, SkipReason> {
        let column = dataset
            .get_column(&filter.column)
            .ok_or(SkipReason::ColumnNotFound)?;
        let value = filter.value.as_ref().ok_or(SkipReason::MissingValue)?;
        match (filter.operator, value) {
            (FilterOperator::In, FilterValue::List(items)) => Ok(Self::In(column, items.clone())),
            (FilterOperator::NotIn, FilterValue::List(items)) => {
                Ok(Self::NotIn(column, items.clone()))
            }
            (FilterOperator::In | FilterOperator::NotIn, FilterValue::Scalar(_)) => {
                Err(SkipReason::ExpectsList)
            }
            (_, FilterValue::List(_)) => Err(SkipReason::ExpectsSingleValue),
            (FilterOperator::Equal, FilterValue::Scalar(literal)) => {
                Ok(Self::Equal(column, literal.clone()))
            }
            (FilterOperator::NotEqual, FilterValue::Scalar(literal)) => {
                Ok(Self::NotEqual(column, literal.clone()))
            }
            (operator, FilterValue::Scalar(literal)) => {
                let bound = literal
                    .to_f64()
                    .ok_or_else(|| SkipReason::NonNumericValue(literal.to_string()))?;
                Ok(Self::Range {
                    values: column.numeric(),
                    operator,
                    bound,
                })
            }
        }
    }

    pub fn evaluate(&self, row: usize) -> bool {
        match self {
            Self::Equal(column, literal) => column.get(row).is_some_and(|v| cell_matches(v, literal)),
            Self::NotEqual(column, literal) => !column.get(row).is_some_and(|v| cell_matches(v, literal)),
            Self::Range {
                values,
                operator,
                bound,
            } => match values.get(row).copied().flatten() {
                Some(v) => match operator {
                    FilterOperator::GreaterThan => v > *bound,
                    FilterOperator::GreaterThanOrEqual => v >= *bound,
                    FilterOperator::LessThan => v < *bound,
                    FilterOperator::LessThanOrEqual => v <= *bound,
                    _ => false,
                },
                None => false,
            },
            Self::In(column, items) => column
                .get(row)
                .is_some_and(|v| items.iter().any(|item| cell_matches(v, item))),
            Self::NotIn(column, items) => !column
                .get(row)
                .is_some_and(|v| items.iter().any(|item| cell_matches(v, item))),
        }
    }
}

/// Raw-cell equality: numbers compare numerically, text compares exactly,
/// and nothing converts between the two.
pub fn cell_matches(cell: &Value, literal: &Literal) -> bool {
    match (cell, literal) {
        (Value::Int(a), Literal::Int(b)) => a == b,
        (Value::Int(_) | Value::Float(_), Literal::Int(_) | Literal::Float(_) | Literal::Bool(_)) => {
            match (cell.to_f64(), literal.to_f64()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            }
        }
        (Value::Text(a), Literal::Text(b)) => a == b,
        _ => false,
    }
}

pub struct FilterEngine;
impl FilterEngine {
    /// Applies `filters` in order as a conjunction. Filters that cannot be
    /// applied are skipped and noted in the trace.
    pub fn apply_all(dataset: &Dataset, filters: &[FilterSpec], trace: &mut TransformationTrace) -> Dataset {
        filters
            .iter()
            .fold(dataset.clone(), |current, filter| Self::apply(&current, filter, trace))
    }

    pub fn apply(dataset: &Dataset, filter: &FilterSpec, trace: &mut TransformationTrace) -> Dataset {
        let (predicate, value) = match CompiledPredicate::compile(dataset, filter) {
            Ok(predicate) => (predicate, filter.value.as_ref()),
            Err(reason) => {
                warn!(column = %filter.column, operator = %filter.operator, reason = %reason, "Skipping filter");
                trace.record(format!("Skipped filter on '{}': {reason}", filter.column));
                return dataset.clone();
            }
        };
        let before = dataset.row_count();
        let result = dataset.filter(|row| predicate.evaluate(row));
        let after = result.row_count();
        debug!(column = %filter.column, before, after, "Filter applied");
        trace.record(format!(
            "Filtered {} {} {} ({before} → {after} rows)",
            filter.column,
            filter.operator,
            value.map(ToString::to_string).unwrap_or_default()
        ));
        result
    }
}
