//! Logsift - streaming log anomaly detection CLI
//!
//! Surfaces rare, high-signal lines from log streams using an online
//! information model with adaptive quantile thresholds.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() -> Result<()> {
    // Diagnostics go to stderr; stdout is reserved for ranked/alert output
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let cli = logsift::cli::Cli::parse();
    logsift::cli::run(cli)
}
