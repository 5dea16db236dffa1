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

use crate::data::Dataset;
use crate::error::{ExpressionError, ExpressionResult};
use crate::expression::parser::{BinaryOperator, Expr, Function, UnaryOperator};

/// Intermediate result: one value, or one value per row.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Scalar(Option<f64>),
    Series(Vec<Option<f64>>),
}
impl Operand {
    fn map(self, f: impl Fn(f64) -> Option<f64>) -> Operand {
        let apply = |v: Option<f64>| v.and_then(&f).and_then(finite);
        match self {
            Operand::Scalar(v) => Operand::Scalar(apply(v)),
            Operand::Series(values) => Operand::Series(values.into_iter().map(apply).collect()),
        }
    }
    fn zip(self, other: Operand, f: impl Fn(f64, f64) -> Option<f64>) -> Operand {
        let apply = |a: Option<f64>, b: Option<f64>| match (a, b) {
            (Some(a), Some(b)) => f(a, b).and_then(finite),
            _ => None,
        };
        match (self, other) {
            (Operand::Scalar(a), Operand::Scalar(b)) => Operand::Scalar(apply(a, b)),
            (Operand::Scalar(a), Operand::Series(b)) => {
                Operand::Series(b.into_iter().map(|b| apply(a, b)).collect())
            }
            (Operand::Series(a), Operand::Scalar(b)) => {
                Operand::Series(a.into_iter().map(|a| apply(a, b)).collect())
            }
            (Operand::Series(a), Operand::Series(b)) => Operand::Series(
                a.into_iter().zip(b).map(|(a, b)| apply(a, b)).collect(),
            ),
        }
    }
    fn reduce(self, f: impl Fn(&[f64]) -> Option<f64>) -> Operand {
        let present: Vec<f64> = match self {
            Operand::Scalar(v) => v.into_iter().collect(),
            Operand::Series(values) => values.into_iter().flatten().collect(),
        };
        Operand::Scalar(f(&present).and_then(finite))
    }
    /// Broadcasts to `rows` values.
    pub fn into_values(self, rows: usize) -> Vec<Option<f64>> {
        match self {
            Operand::Scalar(v) => vec![v; rows],
            Operand::Series(values) => values,
        }
    }
}

fn finite(v: f64) -> Option<f64> {
    v.is_finite().then_some(v)
}

fn truth(v: f64) -> bool {
    v != 0.0
}

fn flag(b: bool) -> Option<f64> {
    Some(if b { 1.0 } else { 0.0 })
}

/// Rounds to `digits` places, ties to even.
fn round_half_even(x: f64, digits: f64) -> Option<f64> {
    let scale = 10f64.powi(digits.trunc() as i32);
    let scaled = x * scale;
    let rounded = scaled.round();
    let result = if (scaled - scaled.trunc()).abs() == 0.5 {
        2.0 * (scaled / 2.0).round()
    } else {
        rounded
    };
    Some(result / scale)
}

pub struct Evaluator<'a> {
    dataset: &'a Dataset,
}
impl<'a> Evaluator<'a> {
    pub fn new(dataset: &'a Dataset) -> Self {
        Self { dataset }
    }

    pub fn evaluate(&self, expr: &Expr) -> ExpressionResult<Operand> {
        match expr {
            Expr::NumericLiteral(v) => Ok(Operand::Scalar(finite(*v))),
            Expr::ColumnRef(name) => {
                let column =
                    self.dataset
                        .get_column(name)
                        .ok_or_else(|| ExpressionError::UnknownColumn {
                            column: name.clone(),
                        })?;
                Ok(Operand::Series(column.numeric()))
            }
            Expr::Unary { op, operand } => {
                let value = self.evaluate(operand)?;
                Ok(match op {
                    UnaryOperator::Negate => value.map(|v| Some(-v)),
                    UnaryOperator::Plus => value,
                    UnaryOperator::Not => value.map(|v| flag(!truth(v))),
                })
            }
            Expr::BinaryOp { op, left, right } => {
                let left = self.evaluate(left)?;
                let right = self.evaluate(right)?;
                Ok(apply_binary(*op, left, right))
            }
            Expr::FunctionCall { function, args } => {
                let args = args
                    .iter()
                    .map(|arg| self.evaluate(arg))
                    .collect::<ExpressionResult<Vec<_>>>()?;
                Ok(apply_function(*function, args))
            }
            Expr::Conditional {
                condition,
                then_branch,
                else_branch,
            } => {
                let rows = self.dataset.row_count();
                let condition = self.evaluate(condition)?;
                let then_value = self.evaluate(then_branch)?;
                let else_value = self.evaluate(else_branch)?;
                if let Operand::Scalar(c) = condition {
                    return Ok(match c {
                        Some(c) if truth(c) => then_value,
                        Some(_) => else_value,
                        None => Operand::Scalar(None),
                    });
                }
                let then_values = then_value.into_values(rows);
                let else_values = else_value.into_values(rows);
                let picked = condition
                    .into_values(rows)
                    .into_iter()
                    .zip(then_values.into_iter().zip(else_values))
                    .map(|(c, (t, e))| match c {
                        Some(c) if truth(c) => t,
                        Some(_) => e,
                        None => None,
                    })
                    .collect();
                Ok(Operand::Series(picked))
            }
        }
    }
}

fn apply_binary(op: BinaryOperator, left: Operand, right: Operand) -> Operand {
    match op {
        BinaryOperator::Add => left.zip(right, |a, b| Some(a + b)),
        BinaryOperator::Subtract => left.zip(right, |a, b| Some(a - b)),
        BinaryOperator::Multiply => left.zip(right, |a, b| Some(a * b)),
        BinaryOperator::Divide => left.zip(right, |a, b| (b != 0.0).then(|| a / b)),
        BinaryOperator::FloorDivide => left.zip(right, |a, b| (b != 0.0).then(|| (a / b).floor())),
        BinaryOperator::Modulo => {
            left.zip(right, |a, b| (b != 0.0).then(|| a - b * (a / b).floor()))
        }
        BinaryOperator::Power => left.zip(right, |a, b| Some(a.powf(b))),
        BinaryOperator::Equal => left.zip(right, |a, b| flag(a == b)),
        BinaryOperator::NotEqual => left.zip(right, |a, b| flag(a != b)),
        BinaryOperator::Greater => left.zip(right, |a, b| flag(a > b)),
        BinaryOperator::GreaterEqual => left.zip(right, |a, b| flag(a >= b)),
        BinaryOperator::Less => left.zip(right, |a, b| flag(a < b)),
        BinaryOperator::LessEqual => left.zip(right, |a, b| flag(a <= b)),
        BinaryOperator::And => left.zip(right, |a, b| flag(truth(a) && truth(b))),
        BinaryOperator::Or => left.zip(right, |a, b| flag(truth(a) || truth(b))),
    }
}

fn apply_function(function: Function, mut args: Vec<Operand>) -> Operand {
    // Arity was checked at parse time.
    let first = if args.is_empty() {
        Operand::Scalar(None)
    } else {
        args.remove(0)
    };
    match function {
        Function::Abs => first.map(|v| Some(v.abs())),
        Function::Sqrt => first.map(|v| (v >= 0.0).then(|| v.sqrt())),
        Function::Exp => first.map(|v| Some(v.exp())),
        Function::Round => match args.pop() {
            Some(digits) => first.zip(digits, round_half_even),
            None => first.map(|v| round_half_even(v, 0.0)),
        },
        Function::Pow => match args.pop() {
            Some(exponent) => first.zip(exponent, |a, b| Some(a.powf(b))),
            None => Operand::Scalar(None),
        },
        Function::Log => match args.pop() {
            Some(base) => first.zip(base, |x, base| {
                (x > 0.0 && base > 0.0 && base != 1.0).then(|| x.ln() / base.ln())
            }),
            None => first.map(|v| (v > 0.0).then(|| v.ln())),
        },
        Function::Sum => first.reduce(|values| Some(values.iter().sum())),
        Function::Mean => first.reduce(|values| {
            (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
        }),
        Function::Min | Function::Max if args.is_empty() => {
            let pick = if function == Function::Min { f64::min } else { f64::max };
            first.reduce(|values| values.iter().copied().reduce(pick))
        }
        Function::Min => args
            .into_iter()
            .fold(first, |acc, next| acc.zip(next, |a, b| Some(a.min(b)))),
        Function::Max => args
            .into_iter()
            .fold(first, |acc, next| acc.zip(next, |a, b| Some(a.max(b)))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Value;
    use crate::expression::lexer::tokenize;
    use crate::expression::parser::parse;

    fn dataset() -> Dataset {
        Dataset::from_columns(
            "calc",
            vec![
                ("a", vec![Value::Int(10), Value::Int(-4), Value::Null, Value::from("7")]),
                ("b", vec![Value::Float(2.0), Value::Float(0.0), Value::Float(1.0), Value::from("x")]),
            ],
        )
        .unwrap()
    }

    fn eval(formula: &str) -> Vec<Option<f64>> {
        let dataset = dataset();
        let expr = parse(&tokenize(formula).unwrap()).unwrap();
        Evaluator::new(&dataset)
            .evaluate(&expr)
            .unwrap()
            .into_values(dataset.row_count())
    }

    #[test]
    fn arithmetic_propagates_nulls() {
        assert_eq!(eval("a * b"), vec![Some(20.0), Some(-0.0), None, None]);
        assert_eq!(eval("a + 1"), vec![Some(11.0), Some(-3.0), None, Some(8.0)]);
    }

    #[test]
    fn division_by_zero_is_null() {
        assert_eq!(eval("a / b"), vec![Some(5.0), None, None, None]);
        assert_eq!(eval("a % b"), vec![Some(0.0), None, None, None]);
        assert_eq!(eval("-7 // 2"), vec![Some(-4.0); 4]);
        assert_eq!(eval("-7 % 3"), vec![Some(2.0); 4]);
    }

    #[test]
    fn reductions_broadcast() {
        assert_eq!(eval("sum(a)"), vec![Some(13.0); 4]);
        assert_eq!(eval("a - mean(a)")[0], Some(10.0 - 13.0 / 3.0));
        assert_eq!(eval("max(a)"), vec![Some(10.0); 4]);
        assert_eq!(eval("min(a, 0)"), vec![Some(0.0), Some(-4.0), None, Some(0.0)]);
    }

    #[test]
    fn domain_errors_become_null() {
        assert_eq!(eval("sqrt(a)")[1], None);
        assert_eq!(eval("log(a)")[1], None);
        let log10 = eval("log(100, 10)")[0].unwrap();
        assert!((log10 - 2.0).abs() < 1e-12);
        assert_eq!(eval("exp(1000)")[0], None);
    }

    #[test]
    fn round_ties_to_even() {
        assert_eq!(eval("round(2.5)")[0], Some(2.0));
        assert_eq!(eval("round(3.5)")[0], Some(4.0));
        assert_eq!(eval("round(1.234, 2)")[0], Some(1.23));
    }

    #[test]
    fn conditional_selects_per_row() {
        assert_eq!(
            eval("a if a > 0 else 0"),
            vec![Some(10.0), Some(0.0), None, Some(7.0)]
        );
        assert_eq!(eval("1 if true else 2"), vec![Some(1.0); 4]);
    }
}
