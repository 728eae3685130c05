//! Record store access
//!
//! The hook reads back the synthetic record through the deployed service's
//! record API, which must support a strongly-consistent point read. Cleanup
//! deletes are issued with eventual consistency.

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::time::Instant;
use tracing::{Instrument, debug, info_span, warn};

use crate::error::{HookError, Result};

/// Synthetic record exercising the service's primary write path
///
/// `full_name` is the natural key used for the read-back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyntheticRecord {
    pub full_name: String,
    pub email: String,
    pub birth: String,
    pub city: String,
    pub country: String,
}

impl SyntheticRecord {
    pub fn key(&self) -> &str {
        &self.full_name
    }
}

impl Default for SyntheticRecord {
    fn default() -> Self {
        Self {
            full_name: "Relay Pretraffic Check".to_string(),
            email: "pretraffic@relay.invalid".to_string(),
            birth: "24/09/1985".to_string(),
            city: "São Paulo".to_string(),
            country: "Brazil".to_string(),
        }
    }
}

/// Consistency requested from the store for a point read or delete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadConsistency {
    Strong,
    Eventual,
}

impl ReadConsistency {
    fn as_query(&self) -> &'static str {
        match self {
            ReadConsistency::Strong => "true",
            ReadConsistency::Eventual => "false",
        }
    }
}

/// Point access to the service's backing record store
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Reads a record by natural key; `None` when it does not exist
    async fn get(
        &self,
        table: &str,
        key: &str,
        consistency: ReadConsistency,
    ) -> Result<Option<JsonValue>>;

    /// Deletes a record by natural key
    async fn delete(&self, table: &str, key: &str, consistency: ReadConsistency) -> Result<()>;
}

/// HTTP implementation of RecordStore against the service's record API
pub struct HttpRecordStore {
    client: Client,
    base_url: String,
}

impl HttpRecordStore {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn record_url(&self, table: &str, key: &str) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| HookError::Config(format!("invalid service url: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| HookError::Config("service url cannot be a base".to_string()))?
            .extend(["records", table, key]);
        Ok(url)
    }
}

#[async_trait]
impl RecordStore for HttpRecordStore {
    async fn get(
        &self,
        table: &str,
        key: &str,
        consistency: ReadConsistency,
    ) -> Result<Option<JsonValue>> {
        let url = self.record_url(table, key)?;

        let response = self
            .client
            .get(url)
            .query(&[("consistent", consistency.as_query())])
            .send()
            .await
            .map_err(|e| HookError::Store(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => response
                .json()
                .await
                .map(Some)
                .map_err(|e| HookError::Store(format!("invalid record body: {}", e))),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(HookError::Store(format!("{} - {}", status, body)))
            }
        }
    }

    async fn delete(&self, table: &str, key: &str, consistency: ReadConsistency) -> Result<()> {
        let url = self.record_url(table, key)?;

        let response = self
            .client
            .delete(url)
            .query(&[("consistent", consistency.as_query())])
            .send()
            .await
            .map_err(|e| HookError::Store(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(HookError::Store(format!("{} - {}", status, body)));
        }

        Ok(())
    }
}

/// Decorator that records a tracing span around every store call
///
/// Applied explicitly when the store client is constructed.
pub struct TracedRecordStore<S> {
    inner: S,
}

impl<S: RecordStore> TracedRecordStore<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<S: RecordStore> RecordStore for TracedRecordStore<S> {
    async fn get(
        &self,
        table: &str,
        key: &str,
        consistency: ReadConsistency,
    ) -> Result<Option<JsonValue>> {
        let span = info_span!("record_store.get", table, key, consistency = ?consistency);
        async {
            let started = Instant::now();
            let result = self.inner.get(table, key, consistency).await;
            match &result {
                Ok(found) => debug!(
                    found = found.is_some(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "get completed"
                ),
                Err(e) => warn!("get failed: {}", e),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn delete(&self, table: &str, key: &str, consistency: ReadConsistency) -> Result<()> {
        let span = info_span!("record_store.delete", table, key, consistency = ?consistency);
        async {
            let started = Instant::now();
            let result = self.inner.delete(table, key, consistency).await;
            match &result {
                Ok(()) => debug!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "delete completed"
                ),
                Err(e) => warn!("delete failed: {}", e),
            }
            result
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MapStore {
        records: Mutex<HashMap<String, JsonValue>>,
        deletes: Mutex<Vec<ReadConsistency>>,
    }

    #[async_trait]
    impl RecordStore for MapStore {
        async fn get(&self, _: &str, key: &str, _: ReadConsistency) -> Result<Option<JsonValue>> {
            Ok(self.records.lock().unwrap().get(key).cloned())
        }

        async fn delete(&self, _: &str, key: &str, consistency: ReadConsistency) -> Result<()> {
            self.deletes.lock().unwrap().push(consistency);
            self.records.lock().unwrap().remove(key);
            Ok(())
        }
    }

    #[test]
    fn test_record_url_escapes_key() {
        let store = HttpRecordStore::new(Client::new(), "http://localhost:3000/");
        let url = store.record_url("customers", "Relay Pretraffic Check").unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:3000/records/customers/Relay%20Pretraffic%20Check"
        );
    }

    #[test]
    fn test_synthetic_record_key_is_full_name() {
        let record = SyntheticRecord::default();
        assert_eq!(record.key(), record.full_name);
    }

    #[tokio::test]
    async fn test_traced_store_delegates() {
        let inner = MapStore::default();
        inner
            .records
            .lock()
            .unwrap()
            .insert("k".to_string(), serde_json::json!({"full_name": "k"}));
        let store = TracedRecordStore::new(inner);

        let found = store
            .get("customers", "k", ReadConsistency::Strong)
            .await
            .unwrap();
        assert!(found.is_some());

        store
            .delete("customers", "k", ReadConsistency::Eventual)
            .await
            .unwrap();
        let found = store
            .get("customers", "k", ReadConsistency::Strong)
            .await
            .unwrap();
        assert!(found.is_none());
        assert_eq!(
            *store.inner.deletes.lock().unwrap(),
            vec![ReadConsistency::Eventual]
        );
    }

    #[test]
    fn test_consistency_query_values() {
        assert_eq!(ReadConsistency::Strong.as_query(), "true");
        assert_eq!(ReadConsistency::Eventual.as_query(), "false");
    }
}
