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

//! Restricted arithmetic expressions for calculated fields.
//!
//! Formulas are tokenised, parsed into an [`Expr`] tree and interpreted over
//! column-aligned numeric values. Nothing outside the fixed operator and
//! function tables can run.

pub mod eval;
pub mod lexer;
pub mod parser;

pub use eval::{Evaluator, Operand};
pub use parser::{BinaryOperator, Expr, Function, UnaryOperator};

use crate::data::{Column, Dataset, Value};
use crate::error::{ExpressionError, Result, ValidationError};
use crate::spec::CalculationSpec;
use crate::trace::TransformationTrace;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use tracing::{debug, warn};

static UNSAFE_TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"__|\b(import|exec|eval|compile|open|file|input|globals|locals|getattr|setattr|delattr|vars|dir|subprocess|os|sys|lambda|breakpoint)\b",
    )
    .unwrap()
});

/// First denylisted token in `formula`, if any.
pub fn find_unsafe_token(formula: &str) -> Option<&str> {
    UNSAFE_TOKEN_RE.find(formula).map(|m| m.as_str())
}

/// A parsed formula together with the source text it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    source: String,
    root: Expr,
}
impl Expression {
    pub fn parse(formula: &str) -> std::result::Result<Self, ExpressionError> {
        let tokens = lexer::tokenize(formula)?;
        let root = parser::parse(&tokens)?;
        Ok(Self {
            source: formula.to_string(),
            root,
        })
    }
    pub fn source(&self) -> &str {
        &self.source
    }
    pub fn root(&self) -> &Expr {
        &self.root
    }
    pub fn columns(&self) -> Vec<&str> {
        self.root.columns()
    }
    /// Evaluates against `dataset`, broadcasting scalars and zero-filling nulls.
    pub fn evaluate(&self, dataset: &Dataset) -> std::result::Result<Column, ExpressionError> {
        let values = Evaluator::new(dataset)
            .evaluate(&self.root)?
            .into_values(dataset.row_count());
        Ok(values
            .into_iter()
            .map(|v| Value::Float(v.unwrap_or(0.0)))
            .collect())
    }
}
impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.root)
    }
}

/// Checks a formula against the dataset without evaluating it.
pub fn check_formula(formula: &str, dataset: &Dataset) -> std::result::Result<Expression, ValidationError> {
    let trimmed = formula.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyFormula);
    }
    if let Some(token) = find_unsafe_token(trimmed) {
        warn!(formula = %trimmed, token = %token, "Rejected unsafe formula");
        return Err(ValidationError::UnsafeFormula {
            formula: trimmed.to_string(),
            token: token.to_string(),
        });
    }
    let available = dataset.column_names().to_vec();
    let invalid = |err: ExpressionError| ValidationError::InvalidFormula {
        formula: trimmed.to_string(),
        reason: err.to_string(),
        available: available.clone(),
    };
    let tokens = lexer::tokenize(trimmed).map_err(invalid)?;
    let missing: Vec<String> = lexer::column_references(&tokens)
        .into_iter()
        .filter(|name| !dataset.has_column(name))
        .collect();
    if !missing.is_empty() {
        return Err(ValidationError::MissingColumns {
            missing,
            available: available.clone(),
        });
    }
    let root = parser::parse(&tokens).map_err(invalid)?;
    Ok(Expression {
        source: trimmed.to_string(),
        root,
    })
}

/// Adds the calculated field to a copy of `dataset`.
pub fn apply_calculation(
    dataset: &Dataset,
    calculation: &CalculationSpec,
    trace: &mut TransformationTrace,
) -> Result<Dataset> {
    let expression = check_formula(&calculation.formula, dataset)?;
    debug!(
        field = %calculation.field_name,
        columns = ?expression.columns(),
        "Evaluating calculated field"
    );
    let column = expression
        .evaluate(dataset)
        .map_err(|err| ValidationError::FormulaEvaluation {
            formula: expression.source().to_string(),
            reason: err.to_string(),
            available: dataset.column_names().to_vec(),
        })?;
    let result = dataset.with_column(calculation.field_name.clone(), column)?;
    let mut entry = format!("Calculated {} = {}", calculation.field_name, expression);
    let description = calculation.description.trim();
    if !description.is_empty() {
        entry.push_str(&format!(" ({description})"));
    }
    trace.record(entry);
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ChartEngineError;

    fn sales() -> Dataset {
        Dataset::from_columns(
            "sales",
            vec![
                ("units_sold", vec![Value::Int(10), Value::Int(15), Value::Null]),
                ("unit_price", vec![Value::Float(10.0), Value::Float(12.5), Value::Float(3.0)]),
                ("unit price", vec![Value::Int(1), Value::Int(2), Value::Int(3)]),
            ],
        )
        .unwrap()
    }

    fn validation_error(result: Result<Dataset>) -> ValidationError {
        match result {
            Err(ChartEngineError::Validation(err)) => err,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn adds_column_and_traces_canonical_formula() {
        let mut trace = TransformationTrace::new();
        let calc = CalculationSpec::new("revenue", "units_sold*unit_price")
            .with_description("Total revenue");
        let result = apply_calculation(&sales(), &calc, &mut trace).unwrap();
        assert_eq!(
            result.get_column("revenue").unwrap().values(),
            &[Value::Float(100.0), Value::Float(187.5), Value::Float(0.0)]
        );
        assert_eq!(
            trace.entries(),
            &["Calculated revenue = units_sold * unit_price (Total revenue)"]
        );
    }

    #[test]
    fn scalar_results_broadcast() {
        let mut trace = TransformationTrace::new();
        let calc = CalculationSpec::new("total", "sum(units_sold)");
        let result = apply_calculation(&sales(), &calc, &mut trace).unwrap();
        assert_eq!(result.get_column("total").unwrap().to_f64(2), Some(25.0));
    }

    #[test]
    fn quoted_names_reach_columns_with_spaces() {
        let mut trace = TransformationTrace::new();
        let calc = CalculationSpec::new("double", "`unit price` * 2");
        let result = apply_calculation(&sales(), &calc, &mut trace).unwrap();
        assert_eq!(result.get_column("double").unwrap().to_f64(1), Some(4.0));
    }

    #[test]
    fn names_every_missing_column() {
        let mut trace = TransformationTrace::new();
        let calc = CalculationSpec::new("x", "cost * qty + units_sold");
        let err = validation_error(apply_calculation(&sales(), &calc, &mut trace));
        match err {
            ValidationError::MissingColumns { missing, available } => {
                assert_eq!(missing, vec!["cost".to_string(), "qty".into()]);
                assert!(available.contains(&"units_sold".to_string()));
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(trace.is_empty());
    }

    #[test]
    fn rejects_unsafe_and_empty_formulas() {
        let mut trace = TransformationTrace::new();
        for formula in ["__import__('os')", "open(units_sold)", "exec(1)", "lambda: 1"] {
            let calc = CalculationSpec::new("x", formula);
            let err = validation_error(apply_calculation(&sales(), &calc, &mut trace));
            assert!(
                matches!(err, ValidationError::UnsafeFormula { .. }),
                "{formula} gave {err:?}"
            );
        }
        let calc = CalculationSpec::new("x", "   ");
        assert_eq!(
            validation_error(apply_calculation(&sales(), &calc, &mut trace)),
            ValidationError::EmptyFormula
        );
    }

    #[test]
    fn parsed_expression_reports_columns() {
        let expression = Expression::parse("round(units_sold * unit_price, 1) / units_sold").unwrap();
        assert_eq!(expression.columns(), vec!["units_sold", "unit_price"]);
        assert_eq!(expression.to_string(), "round(units_sold * unit_price, 1) / units_sold");
        assert!(Expression::parse("units_sold *").is_err());
    }

    #[test]
    fn word_boundaries_keep_safe_identifiers() {
        assert_eq!(find_unsafe_token("opening_balance + os_count"), None);
        assert_eq!(find_unsafe_token("x + sys"), Some("sys"));
    }

    #[test]
    fn syntax_errors_list_available_columns() {
        let mut trace = TransformationTrace::new();
        let calc = CalculationSpec::new("x", "units_sold * (unit_price");
        let err = validation_error(apply_calculation(&sales(), &calc, &mut trace));
        assert!(matches!(err, ValidationError::InvalidFormula { .. }));
        assert!(err.to_string().contains("Available columns: units_sold, unit_price"));
    }
}
