//! wait-nodes-reboot command

use std::sync::Arc;

use clap::Args;
use k8s_openapi::api::core::v1::Node;
use tracing::info;

use certsuite_resource::{wait_for_nodes_reboot, KubeApi};

use super::CommandContext;
use crate::{Error, Result};

/// Wait for nodes to reboot
#[derive(Args, Debug)]
pub struct WaitNodesRebootArgs {
    /// Node expected to reboot (repeatable)
    #[arg(long = "node", required = true)]
    pub nodes: Vec<String>,

    /// Budget in seconds for every node to come back (defaults to the configured timeout)
    #[arg(long)]
    pub timeout: Option<u64>,
}

pub async fn run(args: WaitNodesRebootArgs, ctx: &CommandContext) -> Result<()> {
    let api = Arc::new(KubeApi::<Node>::all(ctx.client.clone()));
    let timeout = ctx.timeout(args.timeout);

    info!(nodes = ?args.nodes, timeout = ?timeout, "Waiting for nodes to reboot");
    let rebooted = wait_for_nodes_reboot(
        api,
        &args.nodes,
        timeout,
        &ctx.config,
        Some(ctx.cancel.clone()),
    )
    .await?;

    if !rebooted {
        return Err(Error::command_failed(format!(
            "nodes did not all reboot within {:?}",
            timeout
        )));
    }
    info!("All nodes rebooted");
    Ok(())
}
