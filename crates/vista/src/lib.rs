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

//! Chart specification execution engine.
//!
//! A [`ChartSpec`] produced upstream is run against an in-memory [`Dataset`]
//! through a fixed pipeline: calculated field, time-period extraction,
//! structural validation, filtering, aggregation, row capping, sorting,
//! output formatting and summary statistics. Every applied step is recorded
//! in a [`TransformationTrace`] returned with the [`ChartResult`].
//!
//! ```no_run
//! use vista::{ChartEngine, ChartSpec, ChartType, Aggregation, Dataset, Value};
//!
//! let dataset = Dataset::from_rows(
//!     "sales",
//!     vec![vec![("region", Value::from("North")), ("units", Value::Int(10))]],
//! );
//! let engine = ChartEngine::new();
//! let kinds = engine.profile(&dataset);
//! let spec = ChartSpec::new(ChartType::Bar)
//!     .with_x("region")
//!     .with_y("units")
//!     .with_aggregation(Aggregation::Sum);
//! let result = engine.generate(&spec, &dataset, &kinds)?;
//! println!("{}", result.to_json_pretty()?);
//! # Ok::<(), vista::ChartEngineError>(())
//! ```

pub mod aggregation;
pub mod config;
pub mod data;
pub mod engine;
pub mod error;
pub mod expression;
pub mod filter;
pub mod formatter;
pub mod spec;
pub mod stats;
pub mod time_period;
pub mod trace;
pub mod validator;

pub use config::EngineConfig;
pub use data::{Column, ColumnKind, ColumnKinds, Dataset, DatasetId, DatasetMetadata, Value};
pub use engine::{ChartEngine, ChartResult};
pub use error::{
    ChartEngineError, ConfigError, DataError, ErrorReporter, ErrorSeverity, ExpressionError,
    ProcessingError, Result, SerialisationError, ValidationError,
};
pub use expression::Expression;
pub use spec::{
    Aggregation, CalculationSpec, ChartSpec, ChartType, FilterOperator, FilterSpec, FilterValue,
    Literal, ResolvedSpec,
};
pub use trace::TransformationTrace;
pub use validator::ValidationOutcome;
