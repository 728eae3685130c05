//! Deployment and environment command handlers

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::*;
use relay_client::OrchestratorClient;
use relay_core::domain::deployment::{Deployment, Environment, EnvironmentAlias, Revision};
use uuid::Uuid;

use super::colorize;
use crate::config::Config;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Deployment subcommands
#[derive(Subcommand)]
pub enum DeploymentCommands {
    /// Get deployment details, including its hook execution
    Get {
        /// Deployment ID
        id: Uuid,
    },
}

/// Environment subcommands
#[derive(Subcommand)]
pub enum EnvironmentCommands {
    /// Show which revisions receive traffic in an environment
    Get {
        /// staging or production
        name: Environment,
    },
}

pub async fn handle_deployment_command(command: DeploymentCommands, config: &Config) -> Result<()> {
    let client = OrchestratorClient::new(&config.orchestrator_url);

    match command {
        DeploymentCommands::Get { id } => {
            let deployment = client
                .get_deployment(id)
                .await
                .with_context(|| format!("Failed to fetch deployment {}", id))?;
            print_deployment(&deployment);
            Ok(())
        }
    }
}

pub async fn handle_environment_command(
    command: EnvironmentCommands,
    config: &Config,
) -> Result<()> {
    let client = OrchestratorClient::new(&config.orchestrator_url);

    match command {
        EnvironmentCommands::Get { name } => {
            let alias = client
                .get_environment(name)
                .await
                .with_context(|| format!("Failed to fetch environment {}", name))?;
            print_alias(&alias);
            Ok(())
        }
    }
}

fn print_deployment(deployment: &Deployment) {
    println!("{}", "Deployment Details:".bold());
    println!("  ID:          {}", deployment.id.to_string().cyan());
    println!("  Run:         {}", deployment.run_id.to_string().dimmed());
    println!("  Environment: {}", deployment.environment);
    println!("  Stack:       {}", deployment.stack_name);
    println!("  Artifacts:   {}", deployment.artifacts_path);
    println!("  State:       {}", colorize(deployment.state));
    println!("  Created:     {}", deployment.created_at.format(TIME_FORMAT));

    if let Some(revision) = &deployment.revision {
        println!("\n{}", "Revision:".bold());
        print_revision(revision);
    }
    if let Some(previous) = deployment.previous_revision {
        println!("  Previous:    {}", previous.to_string().dimmed());
    }

    if let Some(hook) = &deployment.hook_execution {
        println!("\n{}", "Pre-traffic hook:".bold());
        println!("  Execution:   {}", hook.id.to_string().dimmed());
        println!("  Status:      {}", colorize(format!("{:?}", hook.status)));
        println!("  Started:     {}", hook.started_at.format(TIME_FORMAT));
        if let Some(reported) = hook.reported_at {
            println!("  Reported:    {}", reported.format(TIME_FORMAT));
        }
        if hook.timed_out {
            println!("  {}", "Timed out waiting for a report".red());
        }
    }

    if let Some(error) = &deployment.error {
        println!("\n{}", "Error:".bold());
        println!("{}", error.red());
    }
}

fn print_alias(alias: &EnvironmentAlias) {
    println!("{}", format!("Environment {}:", alias.environment).bold());

    match &alias.live {
        Some(revision) => {
            println!("\n{}", "Live:".bold());
            print_revision(revision);
        }
        None => println!("{}", "  No live revision.".yellow()),
    }

    if let Some(candidate) = &alias.candidate {
        println!(
            "\n{}",
            format!("Candidate ({}% of traffic):", alias.candidate_weight).bold()
        );
        print_revision(candidate);
    }

    if let Some(previous) = &alias.previous {
        println!("\n{}", "Previous:".bold());
        print_revision(previous);
    }

    println!(
        "\n  Updated: {}",
        alias.updated_at.format(TIME_FORMAT).to_string().dimmed()
    );
}

fn print_revision(revision: &Revision) {
    println!("  ID:          {}", revision.id.to_string().cyan());
    println!("  Artifacts:   {}", revision.artifacts_path);
    if let Some(url) = &revision.url {
        println!("  URL:         {}", url);
    }
    println!("  Created:     {}", revision.created_at.format(TIME_FORMAT));
}
