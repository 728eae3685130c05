//! Hook configuration
//!
//! All endpoints are injected at construction time; there is no ambient
//! switch between local and remote backends.

use std::time::Duration;

use crate::error::{HookError, Result};

/// Validation hook configuration
#[derive(Debug, Clone)]
pub struct HookConfig {
    /// Orchestrator base URL, used to report the hook status
    pub orchestrator_url: String,

    /// Base URL of the deployed service's record store API
    pub service_url: String,

    /// Record table the service writes into
    pub record_table: String,

    /// Fixed wait between the synthetic write and the consistency read
    pub propagation_wait: Duration,

    /// Timeout for each outbound HTTP request
    pub request_timeout: Duration,
}

impl HookConfig {
    /// Creates a new configuration with defaults
    pub fn new(orchestrator_url: String, service_url: String) -> Self {
        Self {
            orchestrator_url,
            service_url,
            record_table: "customers".to_string(),
            propagation_wait: Duration::from_millis(1500),
            request_timeout: Duration::from_secs(10),
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Expected environment variables:
    /// - ORCHESTRATOR_URL (required)
    /// - SERVICE_URL (required)
    /// - RECORD_TABLE (optional, default: customers)
    /// - PROPAGATION_WAIT_MS (optional, milliseconds, default: 1500)
    /// - REQUEST_TIMEOUT (optional, seconds, default: 10)
    pub fn from_env() -> Result<Self> {
        let orchestrator_url = std::env::var("ORCHESTRATOR_URL").map_err(|_| {
            HookError::Config("ORCHESTRATOR_URL environment variable not set".to_string())
        })?;

        let service_url = std::env::var("SERVICE_URL").map_err(|_| {
            HookError::Config("SERVICE_URL environment variable not set".to_string())
        })?;

        let mut config = Self::new(orchestrator_url, service_url);

        if let Ok(table) = std::env::var("RECORD_TABLE") {
            config.record_table = table;
        }

        if let Some(ms) = std::env::var("PROPAGATION_WAIT_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
        {
            config.propagation_wait = Duration::from_millis(ms);
        }

        if let Some(secs) = std::env::var("REQUEST_TIMEOUT")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
        {
            config.request_timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }

    /// Validates the configuration
    pub fn validate(&self) -> Result<()> {
        for (name, url) in [
            ("orchestrator_url", &self.orchestrator_url),
            ("service_url", &self.service_url),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(HookError::Config(format!(
                    "{} must start with http:// or https://",
                    name
                )));
            }
        }

        if self.record_table.trim().is_empty() {
            return Err(HookError::Config("record_table cannot be empty".to_string()));
        }

        // Must stay a single short wait, never an open-ended retry budget
        if self.propagation_wait > Duration::from_secs(10) {
            return Err(HookError::Config(
                "propagation_wait must not exceed 10 seconds".to_string(),
            ));
        }

        Ok(())
    }
}
