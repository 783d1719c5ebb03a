//! wait-deployment command

use std::sync::Arc;

use clap::Args;
use k8s_openapi::api::apps::v1::Deployment;
use tracing::info;

use certsuite_resource::kinds::deployment::deployment;
use certsuite_resource::{KubeApi, PollSpec};

use super::CommandContext;
use crate::Result;

/// Wait for a deployment to become ready
#[derive(Args, Debug)]
pub struct WaitDeploymentArgs {
    /// Deployment name
    pub name: String,

    /// Namespace of the deployment
    #[arg(short = 'n', long, default_value = "default")]
    pub namespace: String,

    /// Budget in seconds (defaults to the configured timeout)
    #[arg(long)]
    pub timeout: Option<u64>,
}

pub async fn run(args: WaitDeploymentArgs, ctx: &CommandContext) -> Result<()> {
    let api = Arc::new(KubeApi::<Deployment>::namespaced(ctx.client.clone(), &args.namespace));
    let mut handle = deployment(api, &args.name, &args.namespace)
        .with_existence_policy(ctx.config.existence_policy)
        .build()?;
    let spec = PollSpec::from_config(&ctx.config)
        .with_timeout(ctx.timeout(args.timeout))
        .with_cancellation(ctx.cancel.clone());

    handle.wait_until_ready(&spec).await?;
    info!(deployment = %handle.key(), "Deployment is ready");
    Ok(())
}
