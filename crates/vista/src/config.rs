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

use crate::error::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_MAX_DATA_POINTS: usize = 1000;
pub const DEFAULT_MAX_CATEGORIES: usize = 50;
pub const DEFAULT_MAX_GROUP_BY: usize = 3;

/// Read-only limits and heuristics handed to [`crate::ChartEngine`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub max_data_points: usize,
    pub max_categories: usize,
    pub max_group_by: usize,
    pub date_sample_size: usize,
    pub generic_date_threshold: f64,
    pub parallel_threshold: usize,
    pub date_formats: Vec<String>,
}
impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_data_points: DEFAULT_MAX_DATA_POINTS,
            max_categories: DEFAULT_MAX_CATEGORIES,
            max_group_by: DEFAULT_MAX_GROUP_BY,
            date_sample_size: 5,
            generic_date_threshold: 0.7,
            parallel_threshold: 10_000,
            date_formats: vec![
                "%Y-%m-%d".to_string(),
                "%Y-%m-%d %H:%M:%S".to_string(),
                "%Y-%m-%dT%H:%M:%S".to_string(),
                "%Y-%m-%dT%H:%M:%SZ".to_string(),
                "%m/%d/%Y".to_string(),
                "%d/%m/%Y".to_string(),
                "%Y%m%d".to_string(),
            ],
        }
    }
}
impl EngineConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_data_points == 0 {
            return Err(invalid("max_data_points", self.max_data_points, "must be greater than 0"));
        }
        if self.max_categories < 2 {
            return Err(invalid(
                "max_categories",
                self.max_categories,
                "must leave room for at least one category plus 'Others'",
            ));
        }
        if self.max_group_by == 0 {
            return Err(invalid("max_group_by", self.max_group_by, "must be greater than 0"));
        }
        if self.date_sample_size == 0 {
            return Err(invalid("date_sample_size", self.date_sample_size, "must be greater than 0"));
        }
        if !(self.generic_date_threshold > 0.0 && self.generic_date_threshold <= 1.0) {
            return Err(invalid(
                "generic_date_threshold",
                self.generic_date_threshold,
                "must be in (0, 1]",
            ));
        }
        Ok(())
    }
    pub fn from_yaml_str(yaml: &str) -> ConfigResult<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ConfigFileError {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&content)
    }
    pub fn with_max_data_points(mut self, max_data_points: usize) -> Self {
        self.max_data_points = max_data_points;
        self
    }
    pub fn with_max_categories(mut self, max_categories: usize) -> Self {
        self.max_categories = max_categories;
        self
    }
}

fn invalid(field: &str, value: impl ToString, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_data_points, 1000);
        assert_eq!(config.max_categories, 50);
    }

    #[test]
    fn partial_yaml_falls_back_to_defaults() {
        let config = EngineConfig::from_yaml_str("max_categories: 10\n").unwrap();
        assert_eq!(config.max_categories, 10);
        assert_eq!(config.max_data_points, DEFAULT_MAX_DATA_POINTS);
    }

    #[test]
    fn rejects_out_of_range_values() {
        assert!(EngineConfig::from_yaml_str("max_categories: 1\n").is_err());
        assert!(EngineConfig::from_yaml_str("generic_date_threshold: 1.5\n").is_err());
        assert!(EngineConfig::default().with_max_data_points(0).validate().is_err());
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_data_points: 250\ndate_sample_size: 3").unwrap();
        let config = EngineConfig::from_yaml_file(file.path()).unwrap();
        assert_eq!(config.max_data_points, 250);
        assert_eq!(config.date_sample_size, 3);
    }

    #[test]
    fn missing_file_reports_path() {
        let err = EngineConfig::from_yaml_file("/definitely/not/here.yml").unwrap_err();
        assert!(err.to_string().contains("/definitely/not/here.yml"));
    }
}
