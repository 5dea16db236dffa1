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

use crate::data::value::{OrderedValue, Value};
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::sync::Arc;

const PARALLEL_COERCE_THRESHOLD: usize = 10_000;

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    values: Arc<[Value]>,
}
impl Column {
    pub fn new(values: Vec<Value>) -> Self {
        Self {
            values: values.into(),
        }
    }
    pub fn nulls(len: usize) -> Self {
        Self::new(vec![Value::Null; len])
    }
    pub fn len(&self) -> usize {
        self.values.len()
    }
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }
    pub fn values(&self) -> &[Value] {
        &self.values
    }
    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.values.iter()
    }
    pub fn to_f64(&self, index: usize) -> Option<f64> {
        self.values.get(index).and_then(Value::to_f64)
    }
    /// Column-aligned numeric view; cells that fail coercion are `None`.
    pub fn numeric(&self) -> Vec<Option<f64>> {
        if self.values.len() > PARALLEL_COERCE_THRESHOLD {
            self.values.par_iter().map(Value::to_f64).collect()
        } else {
            self.values.iter().map(Value::to_f64).collect()
        }
    }
    pub fn null_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_null()).count()
    }
    /// Distinct non-null values, comparing numbers numerically.
    pub fn unique_count(&self) -> usize {
        self.values
            .iter()
            .filter(|v| !v.is_null())
            .map(|v| OrderedValue(v.clone()))
            .collect::<BTreeSet<_>>()
            .len()
    }
    pub fn select_rows(&self, indices: &[usize]) -> Column {
        indices
            .iter()
            .map(|&i| self.values.get(i).cloned().unwrap_or(Value::Null))
            .collect()
    }
}
impl FromIterator<Value> for Column {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
impl<'a> IntoIterator for &'a Column {
    type Item = &'a Value;
    type IntoIter = std::slice::Iter<'a, Value>;
    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_view_keeps_alignment() {
        let column = Column::new(vec![
            Value::Int(1),
            Value::from("x"),
            Value::Null,
            Value::from("2.5"),
        ]);
        assert_eq!(column.numeric(), vec![Some(1.0), None, None, Some(2.5)]);
        assert_eq!(column.null_count(), 1);
    }

    #[test]
    fn unique_count_ignores_nulls() {
        let column = Column::new(vec![
            Value::from("a"),
            Value::from("a"),
            Value::Null,
            Value::from("b"),
        ]);
        assert_eq!(column.unique_count(), 2);
    }

    #[test]
    fn select_rows_reorders() {
        let column: Column = (0..4).map(|i: i64| Value::Int(i)).collect();
        let picked = column.select_rows(&[3, 0]);
        assert_eq!(picked.values(), &[Value::Int(3), Value::Int(0)]);
    }
}
