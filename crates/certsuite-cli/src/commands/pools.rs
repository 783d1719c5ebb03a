//! wait-pools-stable command

use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use tracing::info;

use certsuite_resource::kinds::machine_config_pool::{wait_for_pools_stable, MachineConfigPool};
use certsuite_resource::{EntitySet, KubeApi, ListSelector, StabilityWindow};

use super::CommandContext;
use crate::Result;

/// Wait for MachineConfigPools to stay converged
#[derive(Args, Debug)]
pub struct WaitPoolsStableArgs {
    /// Pool to watch (repeatable); all pools when omitted
    #[arg(long = "pool", conflicts_with = "selector")]
    pub pools: Vec<String>,

    /// Label selector choosing the pools
    #[arg(short = 'l', long)]
    pub selector: Option<String>,

    /// Seconds every pool must stay converged
    #[arg(long, default_value_t = 60)]
    pub stable_for: u64,

    /// Overall budget in seconds (defaults to the configured timeout)
    #[arg(long)]
    pub timeout: Option<u64>,
}

impl WaitPoolsStableArgs {
    fn entity_set(&self) -> EntitySet {
        match (&self.selector, self.pools.is_empty()) {
            (Some(selector), _) => EntitySet::Selected(ListSelector::labels(selector.clone())),
            (None, true) => EntitySet::Selected(ListSelector::all()),
            (None, false) => EntitySet::named(self.pools.iter().cloned()),
        }
    }
}

pub async fn run(args: WaitPoolsStableArgs, ctx: &CommandContext) -> Result<()> {
    let api = Arc::new(KubeApi::<MachineConfigPool>::all(ctx.client.clone()));
    let window = StabilityWindow::new(
        Duration::from_secs(args.stable_for),
        ctx.timeout(args.timeout),
        &ctx.config,
    )
    .with_cancellation(ctx.cancel.clone());

    let pools = args.entity_set();
    info!(pools = ?pools, stable_for = ?window.stable_duration, "Waiting for pools to stabilize");
    wait_for_pools_stable(api, &pools, &window, ctx.config.fetch_concurrency).await?;
    info!("Pools are stable");
    Ok(())
}
