//! delete-namespace command

use std::sync::Arc;

use clap::Args;
use k8s_openapi::api::core::v1::Namespace;
use tracing::info;

use certsuite_resource::kinds::namespace::namespace;
use certsuite_resource::{KubeApi, PollSpec};

use super::CommandContext;
use crate::Result;

/// Delete a namespace
#[derive(Args, Debug)]
pub struct DeleteNamespaceArgs {
    /// Namespace to delete
    pub name: String,

    /// Wait until the namespace is gone
    #[arg(long)]
    pub wait: bool,

    /// Budget in seconds for --wait (defaults to the configured timeout)
    #[arg(long)]
    pub timeout: Option<u64>,
}

pub async fn run(args: DeleteNamespaceArgs, ctx: &CommandContext) -> Result<()> {
    let api = Arc::new(KubeApi::<Namespace>::all(ctx.client.clone()));
    let mut handle = namespace(api, &args.name)
        .with_existence_policy(ctx.config.existence_policy)
        .build()?;

    handle.delete().await?;
    if args.wait {
        let spec = PollSpec::from_config(&ctx.config)
            .with_timeout(ctx.timeout(args.timeout))
            .with_cancellation(ctx.cancel.clone());
        handle.wait_until_deleted(&spec).await?;
    }
    info!(namespace = %args.name, waited = args.wait, "Namespace deleted");
    Ok(())
}
