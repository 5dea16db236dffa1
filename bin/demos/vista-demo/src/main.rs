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

mod loader;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;
use vista::{ChartEngine, ChartEngineError, ChartSpec, EngineConfig, ErrorReporter};

#[derive(Parser, Debug)]
#[command(
    name = "vista-demo",
    version,
    about = "Run a chart specification against a CSV file and print the chart-ready JSON"
)]
struct Args {
    #[arg(long, help = "CSV file holding the dataset")]
    csv: PathBuf,
    #[arg(long, help = "JSON file holding the chart specification")]
    spec: PathBuf,
    #[arg(long, help = "Optional YAML engine configuration")]
    config: Option<PathBuf>,
    #[arg(long, default_value_t = false, help = "Only run structural validation")]
    validate_only: bool,
    #[arg(long, default_value_t = false, help = "Emit logs as JSON lines")]
    json_logs: bool,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn build_engine(config: Option<&PathBuf>) -> Result<ChartEngine, ChartEngineError> {
    match config {
        Some(path) => ChartEngine::with_config(EngineConfig::from_yaml_file(path)?),
        None => Ok(ChartEngine::new()),
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.json_logs);
    let reporter = ErrorReporter::new();

    let engine = build_engine(args.config.as_ref()).map_err(|err| {
        eprint!("{}", reporter.report(&err));
        err
    })?;
    let dataset = loader::load_csv(&args.csv)?;
    let kinds = engine.profile(&dataset);
    info!(
        rows = dataset.row_count(),
        numeric = kinds.numeric.len(),
        categorical = kinds.categorical.len(),
        datetime = kinds.datetime.len(),
        "Dataset loaded"
    );
    let spec_text = std::fs::read_to_string(&args.spec)
        .with_context(|| format!("Failed to read spec file '{}'", args.spec.display()))?;
    let spec: ChartSpec =
        serde_json::from_str(&spec_text).context("Spec file is not a valid chart specification")?;

    if args.validate_only {
        let outcome = engine.validate(&spec, &kinds);
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    match engine.generate(&spec, &dataset, &kinds) {
        Ok(result) => {
            println!("{}", result.to_json_pretty()?);
            Ok(())
        }
        Err(err) => {
            eprint!("{}", reporter.report(&err));
            if err.is_recoverable() {
                eprintln!("Clarification needed: {}", err.user_message());
            }
            Err(err.into())
        }
    }
}
