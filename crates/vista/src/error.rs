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

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChartEngineError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
    #[error("Processing error: {0}")]
    Processing(#[from] ProcessingError),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Serialisation error: {0}")]
    Serialisation(#[from] SerialisationError),
}

/// User-fixable problems with a chart specification. Callers turn these into
/// clarification prompts rather than hard failures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Column(s) not found: {}", missing.join(", "))]
    MissingColumns {
        missing: Vec<String>,
        available: Vec<String>,
    },
    #[error("Calculation formula is empty")]
    EmptyFormula,
    #[error("Formula '{formula}' contains unsafe token '{token}'")]
    UnsafeFormula { formula: String, token: String },
    #[error("Invalid formula '{formula}': {reason}. Available columns: {}", available.join(", "))]
    InvalidFormula {
        formula: String,
        reason: String,
        available: Vec<String>,
    },
    #[error("Failed to evaluate formula '{formula}': {reason}. Available columns: {}", available.join(", "))]
    FormulaEvaluation {
        formula: String,
        reason: String,
        available: Vec<String>,
    },
    #[error("{message}")]
    StructuralRule {
        message: String,
        suggestions: Vec<String>,
    },
}

/// Unexpected failures while running the pipeline. Never downgraded to a
/// clarification request.
#[derive(Error, Debug)]
pub enum ProcessingError {
    #[error("Dataset error: {0}")]
    Data(#[from] DataError),
    #[error("Stage '{stage}' failed: {reason}")]
    Stage { stage: String, reason: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DataError {
    #[error("Column '{column}' not found in dataset")]
    ColumnNotFound { column: String },
    #[error("Column length mismatch for '{column}': expected {expected}, got {found}")]
    LengthMismatch {
        column: String,
        expected: usize,
        found: usize,
    },
    #[error("Duplicate column name '{column}'")]
    DuplicateColumn { column: String },
}

/// Lexing, parsing and evaluation failures of a calculation formula.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExpressionError {
    #[error("unexpected character '{ch}' at position {position}")]
    UnexpectedCharacter { ch: char, position: usize },
    #[error("unterminated quoted column name starting at position {position}")]
    UnterminatedQuote { position: usize },
    #[error("invalid number '{text}'")]
    InvalidNumber { text: String },
    #[error("unexpected end of formula")]
    UnexpectedEnd,
    #[error("unexpected token '{token}'")]
    UnexpectedToken { token: String },
    #[error("unknown function '{name}'")]
    UnknownFunction { name: String },
    #[error("function '{name}' takes {expected} argument(s), got {found}")]
    Arity {
        name: String,
        expected: String,
        found: usize,
    },
    #[error("column '{column}' is not available")]
    UnknownColumn { column: String },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid engine configuration: {field} = {value} ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
    #[error("Failed to read configuration file '{path}': {source}")]
    ConfigFileError {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse YAML configuration: {source}")]
    YamlParseError {
        #[from]
        source: serde_yaml::Error,
    },
}

#[derive(Error, Debug)]
pub enum SerialisationError {
    #[error("JSON serialisation failed: {source}")]
    JsonSerialisationError {
        #[from]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, ChartEngineError>;
pub type ValidationResult<T> = std::result::Result<T, ValidationError>;
pub type ProcessingResult<T> = std::result::Result<T, ProcessingError>;
pub type DataResult<T> = std::result::Result<T, DataError>;
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
pub type ExpressionResult<T> = std::result::Result<T, ExpressionError>;

impl From<DataError> for ChartEngineError {
    fn from(err: DataError) -> Self {
        ChartEngineError::Processing(ProcessingError::Data(err))
    }
}
impl From<serde_json::Error> for ChartEngineError {
    fn from(err: serde_json::Error) -> Self {
        ChartEngineError::Serialisation(SerialisationError::JsonSerialisationError {
            source: err,
        })
    }
}

impl ValidationError {
    pub fn suggestions(&self) -> Vec<String> {
        match self {
            ValidationError::MissingColumns { available, .. }
            | ValidationError::InvalidFormula { available, .. }
            | ValidationError::FormulaEvaluation { available, .. } => {
                vec![format!("Available columns: {}", available.join(", "))]
            }
            ValidationError::EmptyFormula => {
                vec!["Provide a formula such as 'units_sold * unit_price'".to_string()]
            }
            ValidationError::UnsafeFormula { .. } => vec![
                "Use only column names, numbers, arithmetic operators and abs, min, max, sum, round, pow, sqrt, log, exp".to_string(),
            ],
            ValidationError::StructuralRule { suggestions, .. } => suggestions.clone(),
        }
    }
}

impl ChartEngineError {
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ChartEngineError::Validation(_))
    }
    pub fn category(&self) -> &'static str {
        match self {
            ChartEngineError::Validation(_) => "Validation",
            ChartEngineError::Processing(_) => "Processing",
            ChartEngineError::Config(_) => "Configuration",
            ChartEngineError::Serialisation(_) => "Serialisation",
        }
    }
    pub fn suggestions(&self) -> Vec<String> {
        match self {
            ChartEngineError::Validation(err) => err.suggestions(),
            ChartEngineError::Config(ConfigError::YamlParseError { .. }) => vec![
                "Check the YAML syntax of the configuration file".to_string(),
                "Remove unknown keys; missing keys fall back to defaults".to_string(),
            ],
            ChartEngineError::Processing(_) => {
                vec!["This is an internal failure; check the logs for details".to_string()]
            }
            _ => vec!["Check the error message for specific guidance".to_string()],
        }
    }
    pub fn user_message(&self) -> String {
        match self {
            ChartEngineError::Validation(err) => err.to_string(),
            ChartEngineError::Processing(_) => {
                "Something went wrong while preparing the chart data.".to_string()
            }
            _ => self.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Warning,
    Error,
    Critical,
}
impl ErrorSeverity {
    pub fn of(error: &ChartEngineError) -> Self {
        match error {
            ChartEngineError::Validation(_) => ErrorSeverity::Warning,
            ChartEngineError::Config(_) | ChartEngineError::Serialisation(_) => {
                ErrorSeverity::Error
            }
            ChartEngineError::Processing(_) => ErrorSeverity::Critical,
        }
    }
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorSeverity::Warning => "WARNING",
            ErrorSeverity::Error => "ERROR",
            ErrorSeverity::Critical => "CRITICAL",
        }
    }
    pub fn color_code(&self) -> &'static str {
        match self {
            ErrorSeverity::Warning => "\x1b[33m",
            ErrorSeverity::Error => "\x1b[31m",
            ErrorSeverity::Critical => "\x1b[35m",
        }
    }
}

pub struct ErrorReporter {
    pub show_suggestions: bool,
    pub colored_output: bool,
}
impl ErrorReporter {
    pub fn new() -> Self {
        Self {
            show_suggestions: true,
            colored_output: true,
        }
    }
    pub fn plain() -> Self {
        Self {
            colored_output: false,
            ..Self::new()
        }
    }
    pub fn report(&self, error: &ChartEngineError) -> String {
        let severity = ErrorSeverity::of(error);
        let mut output = String::new();
        if self.colored_output {
            output.push_str(severity.color_code());
        }
        output.push_str(&format!("[{}] {}\n", severity.as_str(), error));
        if self.colored_output {
            output.push_str("\x1b[0m");
        }
        if self.show_suggestions {
            let suggestions = error.suggestions();
            if !suggestions.is_empty() {
                output.push_str("\nSuggestions:\n");
                for suggestion in suggestions {
                    output.push_str(&format!("  • {suggestion}\n"));
                }
            }
        }
        output
    }
}
impl Default for ErrorReporter {
    fn default() -> Self {
        Self::new()
    }
}
