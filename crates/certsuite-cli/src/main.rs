//! certsuite-qe
//!
//! Runs the harness wait primitives against a live cluster.

use clap::Parser;

use certsuite_cli::{Cli, Result};
use certsuite_common::telemetry::init_logging;
use certsuite_common::SuiteConfig;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = SuiteConfig::load(cli.config.as_deref())?;
    if let Some(format) = cli.log_format {
        config.log_format = format;
    }
    init_logging(config.log_format)?;

    cli.run(config).await
}
