//! Artifact store
//!
//! Durable, versioned blob storage keyed by run. Stores are append-only: a
//! published version is never overwritten, and every read is checked against
//! the digest recorded at publish time.

use async_trait::async_trait;
use chrono::Utc;
use relay_core::domain::artifact::ArtifactRef;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("artifact store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("artifact not found at {0}")]
    NotFound(String),

    #[error("artifact at {0} does not match its recorded digest")]
    Corrupted(String),
}

/// Metadata of an artifact about to be published
#[derive(Debug, Clone)]
pub struct NewArtifact {
    pub run_id: Uuid,
    pub name: String,
    pub stage: String,
    pub produced_by: String,
}

/// Run-scoped, append-only blob storage
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Publishes a new version of an artifact
    async fn put(&self, artifact: NewArtifact, content: Vec<u8>) -> Result<ArtifactRef, ArtifactError>;

    /// Reads the content of a published artifact
    async fn get(&self, artifact: &ArtifactRef) -> Result<Vec<u8>, ArtifactError>;
}

fn digest(content: &[u8]) -> String {
    format!("{:x}", Sha256::digest(content))
}

fn artifact_ref(artifact: NewArtifact, version: u32, location: String, content: &[u8]) -> ArtifactRef {
    ArtifactRef {
        run_id: artifact.run_id,
        name: artifact.name,
        version,
        location,
        digest: digest(content),
        size: content.len() as u64,
        stage: artifact.stage,
        produced_by: artifact.produced_by,
        created_at: Utc::now(),
    }
}

/// Filesystem implementation of ArtifactStore
///
/// Layout: `<root>/<run_id>/<name>/v<version>`.
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn put(&self, artifact: NewArtifact, content: Vec<u8>) -> Result<ArtifactRef, ArtifactError> {
        let dir = self
            .root
            .join(artifact.run_id.to_string())
            .join(&artifact.name);
        tokio::fs::create_dir_all(&dir).await?;

        let mut version = 1;
        let (path, mut file) = loop {
            let path = dir.join(format!("v{}", version));
            match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => break (path, file),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => version += 1,
                Err(e) => return Err(e.into()),
            }
        };

        file.write_all(&content).await?;
        file.sync_all().await?;

        let location = path.to_string_lossy().to_string();
        tracing::debug!(
            "Published artifact {} v{} for run {} at {}",
            artifact.name,
            version,
            artifact.run_id,
            location
        );

        Ok(artifact_ref(artifact, version, location, &content))
    }

    async fn get(&self, artifact: &ArtifactRef) -> Result<Vec<u8>, ArtifactError> {
        let content = match tokio::fs::read(&artifact.location).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ArtifactError::NotFound(artifact.location.clone()));
            }
            Err(e) => return Err(e.into()),
        };

        if digest(&content) != artifact.digest {
            return Err(ArtifactError::Corrupted(artifact.location.clone()));
        }

        Ok(content)
    }
}

/// In-memory implementation of ArtifactStore
#[derive(Default)]
pub struct InMemoryArtifactStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    async fn put(&self, artifact: NewArtifact, content: Vec<u8>) -> Result<ArtifactRef, ArtifactError> {
        let mut blobs = self.blobs.lock().unwrap();

        let prefix = format!("mem://{}/{}/v", artifact.run_id, artifact.name);
        let version = blobs.keys().filter(|k| k.starts_with(&prefix)).count() as u32 + 1;
        let location = format!("{}{}", prefix, version);

        blobs.insert(location.clone(), content.clone());
        Ok(artifact_ref(artifact, version, location, &content))
    }

    async fn get(&self, artifact: &ArtifactRef) -> Result<Vec<u8>, ArtifactError> {
        let blobs = self.blobs.lock().unwrap();
        let content = blobs
            .get(&artifact.location)
            .cloned()
            .ok_or_else(|| ArtifactError::NotFound(artifact.location.clone()))?;

        if digest(&content) != artifact.digest {
            return Err(ArtifactError::Corrupted(artifact.location.clone()));
        }

        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_artifact(run_id: Uuid) -> NewArtifact {
        NewArtifact {
            run_id,
            name: "BuildArtifact".to_string(),
            stage: "Build".to_string(),
            produced_by: "Build".to_string(),
        }
    }

    #[tokio::test]
    async fn test_fs_store_versions_are_append_only() {
        let root = std::env::temp_dir().join(format!("relay-artifacts-{}", Uuid::new_v4()));
        let store = FsArtifactStore::new(&root);
        let run_id = Uuid::new_v4();

        let first = store.put(new_artifact(run_id), b"first".to_vec()).await.unwrap();
        let second = store.put(new_artifact(run_id), b"second".to_vec()).await.unwrap();

        assert_eq!(first.version, 1);
        assert_eq!(second.version, 2);
        assert_ne!(first.location, second.location);
        assert_eq!(store.get(&first).await.unwrap(), b"first");
        assert_eq!(store.get(&second).await.unwrap(), b"second");

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn test_fs_store_detects_tampering() {
        let root = std::env::temp_dir().join(format!("relay-artifacts-{}", Uuid::new_v4()));
        let store = FsArtifactStore::new(&root);

        let artifact = store
            .put(new_artifact(Uuid::new_v4()), b"original".to_vec())
            .await
            .unwrap();
        std::fs::write(&artifact.location, b"tampered").unwrap();

        assert!(matches!(
            store.get(&artifact).await,
            Err(ArtifactError::Corrupted(_))
        ));

        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn test_runs_do_not_share_locations() {
        let store = InMemoryArtifactStore::new();

        let a = store.put(new_artifact(Uuid::new_v4()), b"a".to_vec()).await.unwrap();
        let b = store.put(new_artifact(Uuid::new_v4()), b"b".to_vec()).await.unwrap();

        assert_eq!(a.version, 1);
        assert_eq!(b.version, 1);
        assert_ne!(a.location, b.location);
        assert_eq!(store.get(&b).await.unwrap(), b"b");
    }
}
