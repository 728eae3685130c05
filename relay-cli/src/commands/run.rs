//! Run command handlers
//!
//! Starting, triggering, inspecting, cancelling and retrying pipeline runs.

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::*;
use relay_client::OrchestratorClient;
use relay_core::domain::run::{Run, SourceRef, StageExecution};
use relay_core::dto::run::RunSummary;
use relay_core::dto::trigger::PushEvent;

use super::colorize;
use crate::config::Config;
use crate::id_resolver::resolve_run_id;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Run subcommands
#[derive(Subcommand)]
pub enum RunCommands {
    /// Start a run for a branch
    Start {
        /// Branch to run; must be the orchestrator's trigger branch
        #[arg(short, long, default_value = "main")]
        branch: String,
        /// Commit to record on the run
        #[arg(long)]
        commit: Option<String>,
    },
    /// Deliver a push notification as the repository webhook would
    Trigger {
        /// Branch that was pushed
        branch: String,
        /// Commit the branch now points to
        #[arg(long)]
        commit: Option<String>,
    },
    /// List all runs
    List,
    /// Get run details
    Get {
        /// Run ID or unambiguous prefix
        id: String,
        /// Print the raw run document
        #[arg(long)]
        json: bool,
    },
    /// Cancel a running run
    Cancel {
        /// Run ID or unambiguous prefix
        id: String,
    },
    /// Retry the failed stage of a run
    Retry {
        /// Run ID or unambiguous prefix
        id: String,
    },
}

/// Handle run commands
pub async fn handle_run_command(command: RunCommands, config: &Config) -> Result<()> {
    let client = OrchestratorClient::new(&config.orchestrator_url);

    match command {
        RunCommands::Start { branch, commit } => start_run(&client, branch, commit).await,
        RunCommands::Trigger { branch, commit } => trigger(&client, branch, commit).await,
        RunCommands::List => list_runs(&client).await,
        RunCommands::Get { id, json } => get_run(&client, &id, json).await,
        RunCommands::Cancel { id } => cancel_run(&client, &id).await,
        RunCommands::Retry { id } => retry_run(&client, &id).await,
    }
}

async fn start_run(
    client: &OrchestratorClient,
    branch: String,
    commit: Option<String>,
) -> Result<()> {
    let run = client
        .start_run(SourceRef { branch, commit })
        .await
        .context("Failed to start run")?;

    println!("{} Run started", "✓".green());
    println!("  ID:     {}", run.id.to_string().cyan());
    println!("  Branch: {}", run.source_ref.branch);
    Ok(())
}

async fn trigger(client: &OrchestratorClient, branch: String, commit: Option<String>) -> Result<()> {
    let response = client
        .push(PushEvent {
            git_ref: format!("refs/heads/{}", branch),
            after: commit,
        })
        .await
        .context("Failed to deliver push notification")?;

    match response.run_id {
        Some(run_id) if response.triggered => {
            println!(
                "{} Push to {} started run {}",
                "✓".green(),
                branch.bold(),
                run_id.to_string().cyan()
            );
        }
        _ => println!(
            "{}",
            format!("Push to {} did not trigger a run.", branch).yellow()
        ),
    }
    Ok(())
}

async fn list_runs(client: &OrchestratorClient) -> Result<()> {
    let runs = client.list_runs().await?;

    if runs.is_empty() {
        println!("{}", "No runs found.".yellow());
    } else {
        println!("{}", format!("Found {} run(s):", runs.len()).bold());
        println!();
        for run in runs {
            print_run_summary(&run);
        }
    }

    Ok(())
}

async fn get_run(client: &OrchestratorClient, id: &str, json: bool) -> Result<()> {
    let run_id = resolve_run_id(client, id).await?;
    let run = client.get_run(run_id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&run)?);
    } else {
        print_run_details(&run);
    }
    Ok(())
}

async fn cancel_run(client: &OrchestratorClient, id: &str) -> Result<()> {
    let run_id = resolve_run_id(client, id).await?;
    let run = client
        .cancel_run(run_id)
        .await
        .context("Failed to cancel run")?;

    println!(
        "{} Run {} is {}",
        "✓".green(),
        run.id.to_string().cyan(),
        colorize(run.status)
    );
    Ok(())
}

async fn retry_run(client: &OrchestratorClient, id: &str) -> Result<()> {
    let run_id = resolve_run_id(client, id).await?;
    let run = client.retry_run(run_id).await.context("Failed to retry run")?;

    println!(
        "{} Run {} resumed at stage {}",
        "✓".green(),
        run.id.to_string().cyan(),
        run.current_stage.as_deref().unwrap_or("-").bold()
    );
    Ok(())
}

fn print_run_summary(run: &RunSummary) {
    println!("  {} Run {}", "▸".cyan(), run.id.to_string().dimmed());
    println!("    Branch:  {}", run.branch);
    println!("    Status:  {}", colorize(run.status));
    if let Some(stage) = &run.current_stage {
        println!("    Stage:   {}", stage);
    }
    if let Some(failure) = &run.failure {
        println!(
            "    Failure: {} ({:?})",
            failure.message.red(),
            failure.kind
        );
    }
    println!(
        "    Created: {}",
        run.created_at.format(TIME_FORMAT).to_string().dimmed()
    );
    println!();
}

fn print_run_details(run: &Run) {
    println!("{}", "Run Details:".bold());
    println!("  ID:        {}", run.id.to_string().cyan());
    println!("  Pipeline:  {}", run.pipeline);
    println!("  Branch:    {}", run.source_ref.branch);
    if let Some(commit) = &run.source_ref.commit {
        println!("  Commit:    {}", commit.dimmed());
    }
    println!("  Status:    {}", colorize(run.status));
    println!("  Created:   {}", run.created_at.format(TIME_FORMAT));
    if let Some(completed) = run.completed_at {
        println!("  Completed: {}", completed.format(TIME_FORMAT));
        let seconds = completed.signed_duration_since(run.created_at).num_seconds();
        println!("  Duration:  {}s", seconds);
    }

    println!("\n{}", "Stages:".bold());
    for stage in &run.stages {
        print_stage(stage);
    }

    if !run.artifacts.is_empty() {
        println!("\n{}", "Artifacts:".bold());
        for (name, artifact) in &run.artifacts {
            println!(
                "  {} v{} {} {}",
                name.cyan(),
                artifact.version,
                artifact.location,
                artifact.digest.dimmed()
            );
        }
    }

    if !run.variables.is_empty() {
        println!("\n{}", "Variables:".bold());
        for (name, namespace) in &run.variables {
            println!("  {} (from {})", name.cyan(), namespace.produced_by.dimmed());
            for (key, value) in &namespace.values {
                println!("    {} = {}", key, value);
            }
        }
    }

    if !run.approvals.is_empty() {
        println!("\n{}", "Approvals:".bold());
        for record in &run.approvals {
            println!(
                "  {} {} at {}",
                record.stage,
                colorize(record.decision),
                record.decided_at.format(TIME_FORMAT)
            );
            if !record.comment.is_empty() {
                println!("    {}", record.comment.dimmed());
            }
        }
    }

    if let Some(failure) = &run.failure {
        println!("\n{}", "Failure:".bold());
        println!("  Stage:  {}", failure.stage);
        println!("  Action: {}", failure.action);
        println!("  Kind:   {:?}", failure.kind);
        println!("  {}", failure.message.red());
    }
}

fn print_stage(stage: &StageExecution) {
    println!(
        "  {} {} {}",
        "▸".cyan(),
        stage.name.bold(),
        colorize(format!("{:?}", stage.status))
    );
    for action in &stage.actions {
        println!(
            "    [{}] {} {} (attempt {})",
            action.run_order,
            action.name,
            colorize(format!("{:?}", action.status)),
            action.attempt
        );
        if let Some(deployment_id) = action.deployment_id {
            println!("        deployment {}", deployment_id.to_string().dimmed());
        }
        if let Some(error) = &action.error {
            println!("        {}", error.red());
        }
    }
}
