//! Relay Hook
//!
//! Launched by the traffic-shift controller once per deployment. Validates the
//! new revision and reports a single status, then exits.

use anyhow::{Context, Result};
use clap::Parser;
use relay_core::dto::hook::HookEvent;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use relay_client::OrchestratorClient;
use relay_hook::reporter::OrchestratorReporter;
use relay_hook::{HookConfig, PreTrafficHook, report_setup_failure};

#[derive(Parser)]
#[command(name = "relay-hook")]
#[command(about = "Relay pre-traffic validation hook", long_about = None)]
struct Args {
    /// Deployment under validation
    #[arg(long)]
    deployment_id: Uuid,

    /// Hook execution to report against
    #[arg(long)]
    hook_execution_id: Uuid,

    /// Direct address of the new revision
    #[arg(long)]
    revision_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "relay_hook=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let event = HookEvent {
        deployment_id: args.deployment_id,
        hook_execution_id: args.hook_execution_id,
        revision_url: args.revision_url,
    };

    // Without an orchestrator address there is nobody to report to; the
    // controller notices the exit instead.
    let orchestrator_url = std::env::var("ORCHESTRATOR_URL")
        .context("ORCHESTRATOR_URL environment variable not set")?;

    let setup = HookConfig::from_env().and_then(|config| {
        info!(
            "Loaded configuration: service_url={}, table={}, propagation_wait={:?}",
            config.service_url, config.record_table, config.propagation_wait
        );
        PreTrafficHook::from_config(&config)
    });

    let outcome = match setup {
        Ok(hook) => {
            let hook = Arc::new(hook);
            hook.handle(event).await
        }
        Err(e) => {
            let reporter = OrchestratorReporter::new(OrchestratorClient::new(orchestrator_url));
            report_setup_failure(&reporter, &event, &e).await
        }
    }
    .context("Hook status could not be reported")?;

    info!("Hook finished with status {}", outcome.status);
    Ok(())
}
