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

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetId(String);
impl DatasetId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}
impl Default for DatasetId {
    fn default() -> Self {
        Self::new()
    }
}
impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a dataset and its derived copies. Row selections keep the
/// source id so log lines from every stage can be correlated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetMetadata {
    pub id: DatasetId,
    pub name: String,
    pub row_count: usize,
    pub column_count: usize,
}
impl DatasetMetadata {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            id: DatasetId::new(),
            name: name.into(),
            row_count: 0,
            column_count: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Numeric,
    Categorical,
    Datetime,
}
impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnKind::Numeric => write!(f, "numeric"),
            ColumnKind::Categorical => write!(f, "categorical"),
            ColumnKind::Datetime => write!(f, "datetime"),
        }
    }
}

/// Column-kind profile produced by the dataset profiler.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnKinds {
    pub columns: Vec<String>,
    #[serde(default)]
    pub numeric: Vec<String>,
    #[serde(default)]
    pub categorical: Vec<String>,
    #[serde(default)]
    pub datetime: Vec<String>,
    #[serde(default)]
    pub row_count: usize,
}
impl ColumnKinds {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_column(mut self, name: impl Into<String>, kind: ColumnKind) -> Self {
        self.insert(name.into(), kind);
        self
    }
    pub fn with_row_count(mut self, row_count: usize) -> Self {
        self.row_count = row_count;
        self
    }
    /// Adds or reclassifies a column, keeping `columns` in first-seen order.
    pub fn insert(&mut self, name: String, kind: ColumnKind) {
        self.numeric.retain(|c| c != &name);
        self.categorical.retain(|c| c != &name);
        self.datetime.retain(|c| c != &name);
        match kind {
            ColumnKind::Numeric => self.numeric.push(name.clone()),
            ColumnKind::Categorical => self.categorical.push(name.clone()),
            ColumnKind::Datetime => self.datetime.push(name.clone()),
        }
        if !self.columns.contains(&name) {
            self.columns.push(name);
        }
    }
    pub fn kind_of(&self, column: &str) -> Option<ColumnKind> {
        if self.numeric.iter().any(|c| c == column) {
            Some(ColumnKind::Numeric)
        } else if self.categorical.iter().any(|c| c == column) {
            Some(ColumnKind::Categorical)
        } else if self.datetime.iter().any(|c| c == column) {
            Some(ColumnKind::Datetime)
        } else {
            None
        }
    }
    pub fn contains(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }
    pub fn columns_of(&self, kind: ColumnKind) -> &[String] {
        match kind {
            ColumnKind::Numeric => &self.numeric,
            ColumnKind::Categorical => &self.categorical,
            ColumnKind::Datetime => &self.datetime,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_reclassifies_without_duplicating() {
        let mut kinds = ColumnKinds::new()
            .with_column("region", ColumnKind::Categorical)
            .with_column("units", ColumnKind::Numeric);
        kinds.insert("units".to_string(), ColumnKind::Categorical);
        assert_eq!(kinds.columns, vec!["region", "units"]);
        assert_eq!(kinds.kind_of("units"), Some(ColumnKind::Categorical));
        assert!(kinds.numeric.is_empty());
    }

    #[test]
    fn deserialises_profiler_output() {
        let kinds: ColumnKinds = serde_json::from_str(
            r#"{"columns":["a","b"],"numeric":["a"],"categorical":["b"],"datetime":[],"row_count":4}"#,
        )
        .unwrap();
        assert_eq!(kinds.kind_of("a"), Some(ColumnKind::Numeric));
        assert_eq!(kinds.row_count, 4);
    }
}
