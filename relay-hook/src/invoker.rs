//! Direct invocation of the revision under validation

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::debug;

use crate::error::{HookError, Result};
use crate::record::SyntheticRecord;

/// Invokes a specific revision of the service, bypassing its traffic alias
#[async_trait]
pub trait RevisionInvoker: Send + Sync {
    async fn invoke_write(&self, revision_url: &str, record: &SyntheticRecord) -> Result<()>;
}

/// HTTP implementation of RevisionInvoker
///
/// Sends the record the way the service's API gateway would: a JSON envelope
/// whose `body` is the serialized record.
pub struct HttpRevisionInvoker {
    client: Client,
}

impl HttpRevisionInvoker {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RevisionInvoker for HttpRevisionInvoker {
    async fn invoke_write(&self, revision_url: &str, record: &SyntheticRecord) -> Result<()> {
        let url = format!("{}/records", revision_url.trim_end_matches('/'));
        let body = serde_json::to_string(record).map_err(|e| HookError::Invoke(e.to_string()))?;

        debug!("Invoking revision write path at {}", url);

        let response = self
            .client
            .post(&url)
            .json(&json!({ "body": body }))
            .send()
            .await
            .map_err(|e| HookError::Invoke(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(HookError::Invoke(format!("{} - {}", status, text)));
        }

        Ok(())
    }
}
