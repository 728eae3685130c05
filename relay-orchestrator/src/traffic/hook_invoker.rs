//! Pre-traffic hook launching
//!
//! The hook reports its status back through the HTTP API, and the controller
//! waits for that report. A launched process also hands back a [`HookExit`]
//! so that a hook which dies before reporting fails the deployment at once
//! instead of running out the hook timeout.

use async_trait::async_trait;
use relay_core::dto::hook::HookEvent;
use tokio::process::Command;
use tokio::sync::oneshot;
use tracing::{info, warn};

/// Resolves once a launched hook has finished, with a description of how
pub struct HookExit(Option<oneshot::Receiver<String>>);

impl HookExit {
    /// A hook whose lifetime is not observed; [`HookExit::wait`] never resolves
    pub fn untracked() -> Self {
        Self(None)
    }

    /// A hook that signals its exit through the returned sender
    pub fn channel() -> (oneshot::Sender<String>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self(Some(rx)))
    }

    pub async fn wait(self) -> String {
        match self.0 {
            Some(rx) => match rx.await {
                Ok(description) => description,
                // Sender dropped without signalling: nothing is known about the exit
                Err(_) => std::future::pending().await,
            },
            None => std::future::pending().await,
        }
    }
}

#[async_trait]
pub trait HookInvoker: Send + Sync {
    /// Starts one hook execution for the event
    async fn invoke(&self, event: &HookEvent) -> Result<HookExit, std::io::Error>;
}

/// Spawns the `relay-hook` executable for each hook execution
pub struct CommandHookInvoker {
    command: String,
    orchestrator_url: String,
}

impl CommandHookInvoker {
    pub fn new(command: impl Into<String>, orchestrator_url: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            orchestrator_url: orchestrator_url.into(),
        }
    }
}

#[async_trait]
impl HookInvoker for CommandHookInvoker {
    async fn invoke(&self, event: &HookEvent) -> Result<HookExit, std::io::Error> {
        let mut command = Command::new(&self.command);
        command
            .arg("--deployment-id")
            .arg(event.deployment_id.to_string())
            .arg("--hook-execution-id")
            .arg(event.hook_execution_id.to_string())
            .env("ORCHESTRATOR_URL", &self.orchestrator_url);

        if let Some(url) = &event.revision_url {
            command.arg("--revision-url").arg(url);
        }

        let mut child = command.spawn()?;
        info!(
            "Launched pre-traffic hook {} for deployment {}",
            event.hook_execution_id, event.deployment_id
        );

        let (exited, exit) = HookExit::channel();
        let hook_execution_id = event.hook_execution_id;
        tokio::spawn(async move {
            let description = match child.wait().await {
                Ok(status) if status.success() => {
                    info!("Pre-traffic hook {} exited", hook_execution_id);
                    status.to_string()
                }
                Ok(status) => {
                    warn!("Pre-traffic hook {} exited with {}", hook_execution_id, status);
                    status.to_string()
                }
                Err(e) => {
                    warn!("Failed to wait for pre-traffic hook {}: {}", hook_execution_id, e);
                    format!("could not be waited on: {}", e)
                }
            };
            let _ = exited.send(description);
        });

        Ok(exit)
    }
}
