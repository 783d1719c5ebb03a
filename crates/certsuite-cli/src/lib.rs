//! certsuite-qe CLI library

pub mod commands;
pub mod error;

pub use error::{Error, Result};

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use certsuite_common::telemetry::LogFormat;
use certsuite_common::SuiteConfig;

/// certsuite-qe - wait for cluster state during certification QE runs
#[derive(Parser, Debug)]
#[command(name = "certsuite-qe")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// YAML config file (falls back to CERTSUITE_QE_CONFIG)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log output format, overriding the config file
    #[arg(long, global = true)]
    pub log_format: Option<LogFormat>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Wait until MachineConfigPools stay converged for a full window
    WaitPoolsStable(commands::pools::WaitPoolsStableArgs),
    /// Wait until every named node has gone down and come back
    WaitNodesReboot(commands::nodes::WaitNodesRebootArgs),
    /// Wait until a deployment has all desired replicas available
    WaitDeployment(commands::deployment::WaitDeploymentArgs),
    /// Delete a namespace, optionally waiting for it to disappear
    DeleteNamespace(commands::namespace::DeleteNamespaceArgs),
}

impl Cli {
    /// Run the CLI command
    pub async fn run(self, config: SuiteConfig) -> Result<()> {
        let ctx = commands::CommandContext::connect(config).await?;
        match self.command {
            Commands::WaitPoolsStable(args) => commands::pools::run(args, &ctx).await,
            Commands::WaitNodesReboot(args) => commands::nodes::run(args, &ctx).await,
            Commands::WaitDeployment(args) => commands::deployment::run(args, &ctx).await,
            Commands::DeleteNamespace(args) => commands::namespace::run(args, &ctx).await,
        }
    }
}
