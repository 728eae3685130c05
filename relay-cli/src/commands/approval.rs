//! Approval command handlers

use anyhow::{Context, Result, anyhow};
use colored::*;
use relay_client::OrchestratorClient;
use relay_core::domain::approval::ApprovalDecision;

use super::colorize;
use crate::config::Config;
use crate::id_resolver::resolve_run_id;

/// Submit the single decision for a paused stage
pub async fn decide(
    config: &Config,
    run: &str,
    stage: &str,
    decision: ApprovalDecision,
    comment: String,
) -> Result<()> {
    let client = OrchestratorClient::new(&config.orchestrator_url);
    let run_id = resolve_run_id(&client, run).await?;

    let record = match client.submit_approval(run_id, stage, decision, comment).await {
        Ok(record) => record,
        Err(e) if e.is_conflict() => {
            return Err(anyhow!(
                "Stage '{}' of run {} cannot take a decision: {}",
                stage,
                run_id,
                e
            ));
        }
        Err(e) => return Err(e).context("Failed to submit approval"),
    };

    println!(
        "{} Stage '{}' of run {} {}",
        "✓".green(),
        record.stage.bold(),
        record.run_id.to_string().cyan(),
        colorize(record.decision)
    );
    if !record.comment.is_empty() {
        println!("  Comment: {}", record.comment);
    }

    Ok(())
}
