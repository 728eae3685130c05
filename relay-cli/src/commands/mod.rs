//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod approval;
mod deployment;
mod run;

pub use deployment::{DeploymentCommands, EnvironmentCommands};
pub use run::RunCommands;

use anyhow::Result;
use clap::Subcommand;
use colored::{ColoredString, Colorize};
use relay_core::domain::approval::ApprovalDecision;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Pipeline run management
    Run {
        #[command(subcommand)]
        command: RunCommands,
    },
    /// Approve a run paused at an approval gate
    Approve {
        /// Run ID or unambiguous prefix
        run: String,
        /// Stage holding the approval gate
        stage: String,
        /// Justification recorded with the decision
        #[arg(short, long, default_value = "")]
        comment: String,
    },
    /// Reject a run paused at an approval gate
    Reject {
        /// Run ID or unambiguous prefix
        run: String,
        /// Stage holding the approval gate
        stage: String,
        /// Justification recorded with the decision
        #[arg(short, long, default_value = "")]
        comment: String,
    },
    /// Deployment inspection
    Deployment {
        #[command(subcommand)]
        command: DeploymentCommands,
    },
    /// Environment traffic inspection
    Environment {
        #[command(subcommand)]
        command: EnvironmentCommands,
    },
}

/// Routes a command to the appropriate handler module
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Run { command } => run::handle_run_command(command, config).await,
        Commands::Approve {
            run,
            stage,
            comment,
        } => approval::decide(config, &run, &stage, ApprovalDecision::Approved, comment).await,
        Commands::Reject {
            run,
            stage,
            comment,
        } => approval::decide(config, &run, &stage, ApprovalDecision::Rejected, comment).await,
        Commands::Deployment { command } => {
            deployment::handle_deployment_command(command, config).await
        }
        Commands::Environment { command } => {
            deployment::handle_environment_command(command, config).await
        }
    }
}

/// Colorize any status by its display name
pub(crate) fn colorize(status: impl std::fmt::Display) -> ColoredString {
    let status = status.to_string();
    match status.as_str() {
        "Succeeded" | "Live" | "Approved" => status.green(),
        "Running" | "InProgress" | "Provisioning" | "ValidationPending" => status.cyan(),
        "Failed" | "RolledBack" | "Rejected" => status.red(),
        "Pending" => status.yellow(),
        _ => status.dimmed(),
    }
}
