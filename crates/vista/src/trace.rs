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

/// Ordered audit log of the steps one pipeline run applied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransformationTrace(Vec<String>);
impl TransformationTrace {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn record(&mut self, entry: impl Into<String>) {
        let entry = entry.into();
        tracing::debug!(step = %entry, "Transformation applied");
        self.0.push(entry);
    }
    pub fn entries(&self) -> &[String] {
        &self.0
    }
    pub fn len(&self) -> usize {
        self.0.len()
    }
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
    pub fn contains(&self, needle: &str) -> bool {
        self.0.iter().any(|entry| entry.contains(needle))
    }
    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.0.iter()
    }
}
impl fmt::Display for TransformationTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, entry) in self.0.iter().enumerate() {
            writeln!(f, "{}. {entry}", i + 1)?;
        }
        Ok(())
    }
}
impl<'a> IntoIterator for &'a TransformationTrace {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;
    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_insertion_order_and_duplicates() {
        let mut trace = TransformationTrace::new();
        trace.record("Sorted by region ascending");
        trace.record("Sorted by region ascending");
        trace.record("Limited output to first 2 of 3 rows");
        assert_eq!(trace.len(), 3);
        assert_eq!(trace.entries()[2], "Limited output to first 2 of 3 rows");
        assert_eq!(
            serde_json::to_string(&trace).unwrap(),
            r#"["Sorted by region ascending","Sorted by region ascending","Limited output to first 2 of 3 rows"]"#
        );
    }
}
