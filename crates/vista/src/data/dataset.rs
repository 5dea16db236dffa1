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

use crate::data::column::Column;
use crate::data::common::DatasetMetadata;
use crate::data::value::Value;
use crate::error::{DataError, DataResult};
use rayon::prelude::*;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

const PARALLEL_FILTER_THRESHOLD: usize = 10_000;

/// Ordered, column-oriented table. Columns are shared immutably between
/// copies, so stages that add or drop rows never alias each other's data.
#[derive(Debug, Clone)]
pub struct Dataset {
    columns: HashMap<String, Arc<Column>>,
    pub metadata: DatasetMetadata,
    column_order: Vec<String>,
}
impl Dataset {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            columns: HashMap::new(),
            metadata: DatasetMetadata::named(name),
            column_order: Vec::new(),
        }
    }
    pub fn from_columns<I, S>(name: impl Into<String>, columns: I) -> DataResult<Self>
    where
        I: IntoIterator<Item = (S, Vec<Value>)>,
        S: Into<String>,
    {
        let mut dataset = Self::new(name);
        for (column_name, values) in columns {
            let column_name = column_name.into();
            if dataset.has_column(&column_name) {
                return Err(DataError::DuplicateColumn {
                    column: column_name,
                });
            }
            dataset.add_column(column_name, Column::new(values))?;
        }
        Ok(dataset)
    }
    /// Builds a dataset from row maps. Column order follows first appearance;
    /// a row lacking a column gets `Null` there.
    pub fn from_rows<R, K>(name: impl Into<String>, rows: impl IntoIterator<Item = R>) -> Self
    where
        R: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let mut order: Vec<String> = Vec::new();
        let mut cells: HashMap<String, Vec<Value>> = HashMap::new();
        let mut row_count = 0;
        for row in rows {
            for (key, value) in row {
                let key = key.into();
                let column = cells.entry(key.clone()).or_insert_with(|| {
                    order.push(key.clone());
                    Vec::new()
                });
                column.resize(row_count, Value::Null);
                column.push(value);
            }
            row_count += 1;
        }
        let mut dataset = Self::new(name);
        for key in order {
            let mut values = cells.remove(&key).unwrap_or_default();
            values.resize(row_count, Value::Null);
            dataset.insert_unchecked(key, Column::new(values));
        }
        dataset.metadata.row_count = row_count;
        dataset
    }
    fn insert_unchecked(&mut self, name: String, column: Column) {
        if !self.columns.contains_key(&name) {
            self.column_order.push(name.clone());
        }
        self.columns.insert(name, Arc::new(column));
        self.metadata.column_count = self.columns.len();
    }
    /// Adds a column, replacing any column of the same name in place.
    pub fn add_column(&mut self, name: impl Into<String>, column: Column) -> DataResult<()> {
        let name = name.into();
        if !self.columns.is_empty() && column.len() != self.row_count() {
            return Err(DataError::LengthMismatch {
                column: name,
                expected: self.row_count(),
                found: column.len(),
            });
        }
        self.metadata.row_count = column.len();
        self.insert_unchecked(name, column);
        Ok(())
    }
    pub fn with_column(&self, name: impl Into<String>, column: Column) -> DataResult<Self> {
        let mut result = self.clone();
        result.add_column(name, column)?;
        Ok(result)
    }
    pub fn row_count(&self) -> usize {
        self.metadata.row_count
    }
    pub fn column_count(&self) -> usize {
        self.column_order.len()
    }
    pub fn is_empty(&self) -> bool {
        self.row_count() == 0
    }
    pub fn column_names(&self) -> &[String] {
        &self.column_order
    }
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }
    pub fn get_column(&self, name: &str) -> Option<&Column> {
        self.columns.get(name).map(Arc::as_ref)
    }
    pub fn require_column(&self, name: &str) -> DataResult<&Column> {
        self.get_column(name).ok_or_else(|| DataError::ColumnNotFound {
            column: name.to_string(),
        })
    }
    pub fn value(&self, column: &str, row: usize) -> Option<&Value> {
        self.get_column(column).and_then(|c| c.get(row))
    }
    pub fn select_rows(&self, indices: &[usize]) -> Self {
        let mut result = Self::new(self.metadata.name.clone());
        for name in &self.column_order {
            result.insert_unchecked(name.clone(), self.columns[name].select_rows(indices));
        }
        result.metadata.id = self.metadata.id.clone();
        result.metadata.row_count = indices.len();
        result
    }
    pub fn filter<P>(&self, predicate: P) -> Self
    where
        P: Fn(usize) -> bool + Send + Sync,
    {
        let indices: Vec<usize> = if self.row_count() > PARALLEL_FILTER_THRESHOLD {
            (0..self.row_count())
                .into_par_iter()
                .filter(|&i| predicate(i))
                .collect()
        } else {
            (0..self.row_count()).filter(|&i| predicate(i)).collect()
        };
        self.select_rows(&indices)
    }
    pub fn head(&self, limit: usize) -> Self {
        if limit >= self.row_count() {
            return self.clone();
        }
        let indices: Vec<usize> = (0..limit).collect();
        self.select_rows(&indices)
    }
    /// Stable sort on one column; missing values go last in either direction.
    pub fn sort_by(&self, column_name: &str, ascending: bool) -> DataResult<Self> {
        let column = self.require_column(column_name)?;
        let mut indices: Vec<usize> = (0..self.row_count()).collect();
        indices.sort_by(|&a, &b| {
            let (va, vb) = (&column.values()[a], &column.values()[b]);
            match (va.is_null(), vb.is_null()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) if ascending => va.total_cmp(vb),
                (false, false) => vb.total_cmp(va),
            }
        });
        Ok(self.select_rows(&indices))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Dataset {
        Dataset::from_columns(
            "sample",
            vec![
                ("region", vec!["North".into(), "South".into(), "East".into()]),
                ("units", vec![Value::Int(10), Value::Null, Value::Int(5)]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn derived_datasets_keep_the_source_id() {
        let source = sample();
        let filtered = source.filter(|row| row != 1);
        let sorted = source.sort_by("units", true).unwrap();
        assert_eq!(filtered.metadata.id, source.metadata.id);
        assert_eq!(sorted.metadata.id, source.metadata.id);
        assert_ne!(Dataset::new("other").metadata.id, source.metadata.id);
    }

    #[test]
    fn rejects_mismatched_lengths() {
        let mut dataset = sample();
        let err = dataset
            .add_column("extra", Column::nulls(2))
            .unwrap_err();
        assert_eq!(
            err,
            DataError::LengthMismatch {
                column: "extra".into(),
                expected: 3,
                found: 2
            }
        );
    }

    #[test]
    fn from_rows_fills_missing_cells() {
        let rows = vec![
            vec![("a", Value::Int(1))],
            vec![("a", Value::Int(2)), ("b", Value::from("x"))],
            vec![("b", Value::from("y"))],
        ];
        let dataset = Dataset::from_rows("rows", rows);
        assert_eq!(dataset.column_names(), &["a", "b"]);
        assert_eq!(dataset.row_count(), 3);
        assert_eq!(dataset.value("b", 0), Some(&Value::Null));
        assert_eq!(dataset.value("a", 2), Some(&Value::Null));
    }

    #[test]
    fn sort_keeps_nulls_last() {
        let sorted = sample().sort_by("units", true).unwrap();
        assert_eq!(
            sorted.get_column("region").unwrap().values(),
            &[Value::from("East"), Value::from("North"), Value::from("South")]
        );
        let desc = sample().sort_by("units", false).unwrap();
        assert_eq!(desc.value("region", 2), Some(&Value::from("South")));
    }

    #[test]
    fn filter_and_head_copy_rows() {
        let dataset = sample();
        let filtered = dataset.filter(|i| i != 1);
        assert_eq!(filtered.row_count(), 2);
        assert_eq!(dataset.row_count(), 3);
        assert_eq!(dataset.head(1).row_count(), 1);
    }
}
