//! Orchestrator configuration
//!
//! Defines all configurable parameters for the orchestrator: listen address,
//! persistence, the external build/deploy/hook commands and the traffic-shift
//! policy.

use std::path::PathBuf;
use std::time::Duration;

use crate::traffic::{DEFAULT_RETENTION, ShiftPolicy};

/// Orchestrator configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP API binds to
    pub bind_addr: String,

    /// URL the hook uses to reach this orchestrator
    pub public_url: String,

    /// Postgres URL; runs are kept in memory when unset
    pub database_url: Option<String>,

    /// Root directory of the artifact store
    pub artifact_root: PathBuf,

    /// Root directory for per-action working directories
    pub workspace_root: PathBuf,

    /// Optional JSON pipeline definition; the built-in pipeline is used otherwise
    pub pipeline_file: Option<PathBuf>,

    /// Only pushes to this branch start a run
    pub trigger_branch: String,

    /// Bucket identity handed to the build as `S3_BUCKET`
    pub api_artifact_bucket: String,

    /// Shell command implementing the build procedure
    pub build_command: String,

    /// Shell command provisioning a revision
    pub deploy_command: String,

    /// Path of the pre-traffic hook executable
    pub hook_command: String,

    /// How long the traffic-shift controller waits for a hook report
    pub hook_timeout: Duration,

    /// How traffic moves to a validated revision
    pub traffic_shift: ShiftPolicy,

    /// How long finished deployments stay queryable
    pub deployment_retention: Duration,
}

impl Config {
    /// Creates a new configuration with defaults
    pub fn new() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            public_url: "http://localhost:8080".to_string(),
            database_url: None,
            artifact_root: PathBuf::from("/tmp/relay-artifacts"),
            workspace_root: PathBuf::from("/tmp/relay-workspaces"),
            pipeline_file: None,
            trigger_branch: "main".to_string(),
            api_artifact_bucket: "customers-api-artifacts".to_string(),
            build_command: "./pipeline/build.sh".to_string(),
            deploy_command: "./pipeline/deploy.sh".to_string(),
            hook_command: "relay-hook".to_string(),
            hook_timeout: Duration::from_secs(3600),
            traffic_shift: ShiftPolicy::AllAtOnce,
            deployment_retention: DEFAULT_RETENTION,
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Every variable is optional:
    /// - ORCHESTRATOR_BIND_ADDR (default: 0.0.0.0:8080)
    /// - ORCHESTRATOR_PUBLIC_URL (default: http://localhost:8080)
    /// - DATABASE_URL (default: unset, in-memory runs)
    /// - ARTIFACT_ROOT, WORKSPACE_ROOT
    /// - PIPELINE_FILE
    /// - TRIGGER_BRANCH (default: main)
    /// - API_ARTIFACT_BUCKET
    /// - BUILD_COMMAND, DEPLOY_COMMAND, HOOK_COMMAND
    /// - HOOK_TIMEOUT (seconds, default: 3600)
    /// - TRAFFIC_SHIFT (all-at-once | linear:<pct>:<secs> | canary:<pct>:<secs>)
    /// - DEPLOYMENT_RETENTION (seconds, default: 86400)
    pub fn from_env() -> anyhow::Result<Self> {
        let mut config = Self::new();

        if let Ok(addr) = std::env::var("ORCHESTRATOR_BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Ok(url) = std::env::var("ORCHESTRATOR_PUBLIC_URL") {
            config.public_url = url;
        }
        config.database_url = std::env::var("DATABASE_URL").ok();
        if let Ok(root) = std::env::var("ARTIFACT_ROOT") {
            config.artifact_root = PathBuf::from(root);
        }
        if let Ok(root) = std::env::var("WORKSPACE_ROOT") {
            config.workspace_root = PathBuf::from(root);
        }
        config.pipeline_file = std::env::var("PIPELINE_FILE").ok().map(PathBuf::from);
        if let Ok(branch) = std::env::var("TRIGGER_BRANCH") {
            config.trigger_branch = branch;
        }
        if let Ok(bucket) = std::env::var("API_ARTIFACT_BUCKET") {
            config.api_artifact_bucket = bucket;
        }
        if let Ok(command) = std::env::var("BUILD_COMMAND") {
            config.build_command = command;
        }
        if let Ok(command) = std::env::var("DEPLOY_COMMAND") {
            config.deploy_command = command;
        }
        if let Ok(command) = std::env::var("HOOK_COMMAND") {
            config.hook_command = command;
        }

        config.hook_timeout = std::env::var("HOOK_TIMEOUT")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(config.hook_timeout);

        config.deployment_retention = std::env::var("DEPLOYMENT_RETENTION")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(config.deployment_retention);

        if let Ok(shift) = std::env::var("TRAFFIC_SHIFT") {
            config.traffic_shift = shift
                .parse()
                .map_err(|e| anyhow::anyhow!("Invalid TRAFFIC_SHIFT: {}", e))?;
        }

        Ok(config)
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.bind_addr.is_empty() {
            anyhow::bail!("bind_addr cannot be empty");
        }

        if !self.public_url.starts_with("http://") && !self.public_url.starts_with("https://") {
            anyhow::bail!("public_url must start with http:// or https://");
        }

        if self.trigger_branch.trim().is_empty() {
            anyhow::bail!("trigger_branch cannot be empty");
        }

        for (name, command) in [
            ("build_command", &self.build_command),
            ("deploy_command", &self.deploy_command),
            ("hook_command", &self.hook_command),
        ] {
            if command.trim().is_empty() {
                anyhow::bail!("{} cannot be empty", name);
            }
        }

        if self.hook_timeout.as_secs() == 0 {
            anyhow::bail!("hook_timeout must be greater than 0");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.trigger_branch, "main");
        assert_eq!(config.hook_timeout, Duration::from_secs(3600));
        assert_eq!(config.traffic_shift, ShiftPolicy::AllAtOnce);
        assert_eq!(config.deployment_retention, Duration::from_secs(86400));
        assert!(config.database_url.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();

        config.public_url = "localhost:8080".to_string();
        assert!(config.validate().is_err());

        config.public_url = "http://localhost:8080".to_string();
        config.build_command = "  ".to_string();
        assert!(config.validate().is_err());

        config.build_command = "make".to_string();
        config.hook_timeout = Duration::ZERO;
        assert!(config.validate().is_err());
    }
}
