//! CLI commands

use std::time::Duration;

use kube::Client;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use certsuite_common::SuiteConfig;
use certsuite_resource::create_client;

use crate::Result;

pub mod deployment;
pub mod namespace;
pub mod nodes;
pub mod pools;

/// Everything a command needs: a client, settings and a Ctrl-C token
pub struct CommandContext {
    pub client: Client,
    pub config: SuiteConfig,
    pub cancel: CancellationToken,
}

impl CommandContext {
    /// Build a client from the config and arm the interrupt handler
    pub async fn connect(config: SuiteConfig) -> Result<Self> {
        let client = create_client(config.kubeconfig.as_deref()).await?;
        Ok(Self {
            client,
            config,
            cancel: cancel_on_interrupt(),
        })
    }

    /// `secs` when given, otherwise the configured default timeout
    pub fn timeout(&self, secs: Option<u64>) -> Duration {
        secs.map(Duration::from_secs)
            .unwrap_or_else(|| self.config.default_timeout())
    }
}

/// Token cancelled on the first Ctrl-C
fn cancel_on_interrupt() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling wait");
            trigger.cancel();
        }
    });
    token
}
