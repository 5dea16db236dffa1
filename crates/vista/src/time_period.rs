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

use crate::config::EngineConfig;
use crate::data::{Column, Dataset, Value};
use crate::trace::TransformationTrace;
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use rayon::prelude::*;
use std::cmp::Ordering;
use std::fmt;
use tracing::{debug, warn};

/// Formats tried by the generic parser after RFC 3339 and RFC 2822.
const GENERIC_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d",
    "%Y/%m/%d %H:%M:%S",
    "%Y.%m.%d",
    "%d.%m.%Y",
    "%d-%m-%Y",
    "%m-%d-%Y",
    "%m/%d/%y",
    "%m/%d/%Y %H:%M",
    "%B %d, %Y",
    "%b %d, %Y",
    "%d %B %Y",
    "%d %b %Y",
];
/// Month-resolution formats; parsed as the first day of the month.
const MONTH_FORMATS: &[&str] = &["%Y-%m", "%Y/%m", "%B %Y", "%b %Y"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Month,
    Year,
    Quarter,
    Week,
}
impl Period {
    /// Recognises an x-axis reference naming a period, case-insensitively.
    pub fn from_axis(x: &str) -> Option<Self> {
        match x.trim().to_ascii_lowercase().as_str() {
            "month" => Some(Period::Month),
            "year" => Some(Period::Year),
            "quarter" => Some(Period::Quarter),
            "week" => Some(Period::Week),
            _ => None,
        }
    }
    pub fn name(&self) -> &'static str {
        match self {
            Period::Month => "month",
            Period::Year => "year",
            Period::Quarter => "quarter",
            Period::Week => "week",
        }
    }
    pub fn derive(&self, timestamp: &NaiveDateTime) -> Value {
        match self {
            Period::Month => Value::Text(timestamp.format("%Y-%m").to_string()),
            Period::Year => Value::Int(i64::from(timestamp.year())),
            Period::Quarter => Value::Text(format!(
                "{}-Q{}",
                timestamp.year(),
                (timestamp.month() - 1) / 3 + 1
            )),
            Period::Week => {
                let week = timestamp.iso_week();
                Value::Text(format!("{}-W{:02}", week.year(), week.week()))
            }
        }
    }
}
impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome of scoring one column as a date source.
#[derive(Debug, Clone, PartialEq)]
pub struct DateCandidate {
    pub column: String,
    pub position: usize,
    /// One configured format parsed every sampled value.
    pub strict: bool,
    pub parse_ratio: f64,
}
impl DateCandidate {
    /// Strict before generic, then higher ratio, then earlier column.
    fn rank(&self, other: &Self) -> Ordering {
        other
            .strict
            .cmp(&self.strict)
            .then(other.parse_ratio.total_cmp(&self.parse_ratio))
            .then(self.position.cmp(&other.position))
    }
}

pub struct TimePeriodExtractor<'a> {
    config: &'a EngineConfig,
}
impl<'a> TimePeriodExtractor<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self { config }
    }

    /// Adds the period column named by `x` when `x` is a period keyword that
    /// is not already a column. Never fails; on any problem the dataset is
    /// returned unchanged.
    pub fn apply(&self, dataset: &Dataset, x: Option<&str>, trace: &mut TransformationTrace) -> Dataset {
        let Some(x) = x else {
            return dataset.clone();
        };
        let Some(period) = Period::from_axis(x) else {
            return dataset.clone();
        };
        if dataset.has_column(x) {
            return dataset.clone();
        }
        let Some(candidate) = self.detect_date_column(dataset) else {
            warn!(period = %period, "No date column found for time extraction");
            trace.record(format!("Skipped {period} extraction: no date column found"));
            return dataset.clone();
        };
        debug!(
            column = %candidate.column,
            strict = candidate.strict,
            ratio = candidate.parse_ratio,
            "Selected date column"
        );
        match self.extract(dataset, &candidate.column, period) {
            Some(column) => match dataset.with_column(x, column) {
                Ok(result) => {
                    trace.record(format!("Extracted {period} from {}", candidate.column));
                    result
                }
                Err(err) => {
                    warn!(error = %err, "Failed to add period column");
                    dataset.clone()
                }
            },
            None => {
                warn!(column = %candidate.column, period = %period, "No values could be parsed as dates");
                trace.record(format!(
                    "Skipped {period} extraction: no parsable dates in {}",
                    candidate.column
                ));
                dataset.clone()
            }
        }
    }

    /// Derives `period` for every row of `source`; `None` when no row parses.
    pub fn extract(&self, dataset: &Dataset, source: &str, period: Period) -> Option<Column> {
        let column = dataset.get_column(source)?;
        let derive = |value: &Value| match self.parse_value(value) {
            Some(ts) => period.derive(&ts),
            None => Value::Null,
        };
        let values: Vec<Value> = if column.len() > self.config.parallel_threshold {
            column.values().par_iter().map(derive).collect()
        } else {
            column.iter().map(derive).collect()
        };
        if values.iter().all(Value::is_null) {
            return None;
        }
        Some(Column::new(values))
    }

    pub fn detect_date_column(&self, dataset: &Dataset) -> Option<DateCandidate> {
        dataset
            .column_names()
            .iter()
            .enumerate()
            .filter_map(|(position, name)| {
                let column = dataset.get_column(name)?;
                let (strict, parse_ratio) = self.score_column(column)?;
                (strict || parse_ratio >= self.config.generic_date_threshold).then(|| DateCandidate {
                    column: name.clone(),
                    position,
                    strict,
                    parse_ratio,
                })
            })
            .min_by(DateCandidate::rank)
    }

    /// `(strict, ratio)` over the first `date_sample_size` non-null values.
    /// Columns holding numbers are never dates.
    pub fn score_column(&self, column: &Column) -> Option<(bool, f64)> {
        let sample: Vec<&Value> = column
            .iter()
            .filter(|v| !v.is_null())
            .take(self.config.date_sample_size)
            .collect();
        if sample.is_empty() || sample.iter().any(|v| v.is_numeric()) {
            return None;
        }
        let strict = self.config.date_formats.iter().any(|format| {
            sample.iter().all(|value| match value {
                Value::Timestamp(_) => true,
                Value::Text(text) => parse_with_format(text.trim(), format).is_some(),
                _ => false,
            })
        });
        let parsed = sample
            .iter()
            .filter(|value| self.parse_value(value).is_some())
            .count();
        Some((strict, parsed as f64 / sample.len() as f64))
    }

    pub fn parse_value(&self, value: &Value) -> Option<NaiveDateTime> {
        match value {
            Value::Timestamp(ts) => Some(*ts),
            Value::Text(text) => {
                let text = text.trim();
                self.config
                    .date_formats
                    .iter()
                    .find_map(|format| parse_with_format(text, format))
                    .or_else(|| parse_generic(text))
            }
            _ => None,
        }
    }
}

fn parse_with_format(value: &str, format: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
        return Some(dt);
    }
    NaiveDate::parse_from_str(value, format)
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

fn parse_generic(value: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.naive_utc());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(value) {
        return Some(dt.naive_utc());
    }
    GENERIC_FORMATS
        .iter()
        .find_map(|format| parse_with_format(value, format))
        .or_else(|| {
            MONTH_FORMATS.iter().find_map(|format| {
                parse_with_format(&format!("{value} 1"), &format!("{format} %d"))
            })
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn orders() -> Dataset {
        Dataset::from_columns(
            "orders",
            vec![
                ("note", vec![Value::from("Jan 5, 2024"), Value::from("hello"), Value::from("Mar 3, 2024"), Value::from("Apr 1, 2024")]),
                ("order_date", vec![Value::from("2024-01-15"), Value::from("2024-02-29"), Value::from("2024-05-01"), Value::from("not a date")]),
                ("units", vec![Value::Int(20240101), Value::Int(20240102), Value::Int(3), Value::Int(4)]),
            ],
        )
        .unwrap()
    }

    fn config() -> EngineConfig {
        EngineConfig::default()
    }

    #[test]
    fn period_keywords_are_case_insensitive() {
        assert_eq!(Period::from_axis(" Month "), Some(Period::Month));
        assert_eq!(Period::from_axis("QUARTER"), Some(Period::Quarter));
        assert_eq!(Period::from_axis("region"), None);
    }

    #[test]
    fn derives_each_period_shape() {
        let ts = NaiveDate::from_ymd_opt(2024, 12, 30)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert_eq!(Period::Month.derive(&ts), Value::from("2024-12"));
        assert_eq!(Period::Year.derive(&ts), Value::Int(2024));
        assert_eq!(Period::Quarter.derive(&ts), Value::from("2024-Q4"));
        assert_eq!(Period::Week.derive(&ts), Value::from("2025-W01"));
    }

    #[test]
    fn numeric_columns_never_qualify() {
        let config = config();
        let extractor = TimePeriodExtractor::new(&config);
        let dataset = orders();
        assert_eq!(extractor.score_column(dataset.get_column("units").unwrap()), None);
    }

    #[test]
    fn strict_candidates_beat_earlier_generic_ones() {
        let config = config();
        let extractor = TimePeriodExtractor::new(&config);
        let dataset = Dataset::from_columns(
            "dates",
            vec![
                ("shipped", vec![Value::from("Jan 5, 2024"), Value::from("Feb 1, 2024")]),
                ("ordered", vec![Value::from("2024-01-02"), Value::from("2024-01-30")]),
            ],
        )
        .unwrap();
        assert_eq!(
            extractor.score_column(dataset.get_column("shipped").unwrap()),
            Some((false, 1.0))
        );
        let candidate = extractor.detect_date_column(&dataset).unwrap();
        assert_eq!(candidate.column, "ordered");
        assert!(candidate.strict);
        assert_eq!(extractor.detect_date_column(&orders().head(3)).unwrap().column, "order_date");
    }

    #[test]
    fn generic_threshold_admits_mostly_dates() {
        let config = config();
        let extractor = TimePeriodExtractor::new(&config);
        let dataset = orders();
        let note = extractor
            .score_column(dataset.get_column("note").unwrap())
            .unwrap();
        assert_eq!(note, (false, 0.75));
        // order_date is no longer strict with its unparsable fourth value,
        // and both score 0.75, so the earlier column wins.
        let candidate = extractor.detect_date_column(&dataset).unwrap();
        assert_eq!(candidate.column, "note");
    }

    #[test]
    fn extracts_month_and_nulls_unparsable_rows() {
        let config = config();
        let extractor = TimePeriodExtractor::new(&config);
        let dataset = orders().head(3);
        let mut trace = TransformationTrace::new();
        let result = extractor.apply(&dataset, Some("month"), &mut trace);
        assert_eq!(
            result.get_column("month").unwrap().values(),
            &[Value::from("2024-01"), Value::from("2024-02"), Value::from("2024-05")]
        );
        assert_eq!(trace.entries(), &["Extracted month from order_date"]);

        let full = orders();
        let quarters = extractor.extract(&full, "order_date", Period::Quarter).unwrap();
        assert_eq!(quarters.get(3), Some(&Value::Null));
    }

    #[test]
    fn no_date_column_is_a_noop() {
        let config = config();
        let extractor = TimePeriodExtractor::new(&config);
        let dataset = Dataset::from_columns(
            "plain",
            vec![("region", vec![Value::from("North"), Value::from("South")])],
        )
        .unwrap();
        let mut trace = TransformationTrace::new();
        let result = extractor.apply(&dataset, Some("year"), &mut trace);
        assert!(!result.has_column("year"));
        assert_eq!(trace.len(), 1);
    }

    #[test]
    fn existing_period_column_is_left_alone() {
        let config = config();
        let extractor = TimePeriodExtractor::new(&config);
        let dataset = orders().with_column("month", Column::nulls(4)).unwrap();
        let mut trace = TransformationTrace::new();
        let result = extractor.apply(&dataset, Some("month"), &mut trace);
        assert!(trace.is_empty());
        assert_eq!(result.get_column("month").unwrap().null_count(), 4);
    }
}
