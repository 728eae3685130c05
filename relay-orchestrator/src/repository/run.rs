//! Run Repository
//!
//! Runs are stored as a single JSON document so every transition is one
//! upsert.

use async_trait::async_trait;
use relay_core::domain::run::Run;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("failed to (de)serialize run document: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[async_trait]
pub trait RunRepository: Send + Sync {
    /// Inserts or replaces a run
    async fn save(&self, run: &Run) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Run>, RepositoryError>;

    /// All runs, newest first
    async fn list_all(&self) -> Result<Vec<Run>, RepositoryError>;
}

pub struct PgRunRepository {
    pool: PgPool,
}

impl PgRunRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RunRepository for PgRunRepository {
    async fn save(&self, run: &Run) -> Result<(), RepositoryError> {
        let document = serde_json::to_value(run)?;

        sqlx::query(
            r#"
            INSERT INTO runs (id, pipeline, branch, status, document, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE
            SET status = EXCLUDED.status,
                document = EXCLUDED.document,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(run.id)
        .bind(&run.pipeline)
        .bind(&run.source_ref.branch)
        .bind(run.status.to_string())
        .bind(document)
        .bind(run.created_at)
        .bind(run.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Run>, RepositoryError> {
        let row = sqlx::query_as::<_, RunRow>("SELECT document FROM runs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Run::try_from).transpose()
    }

    async fn list_all(&self) -> Result<Vec<Run>, RepositoryError> {
        let rows =
            sqlx::query_as::<_, RunRow>("SELECT document FROM runs ORDER BY created_at DESC")
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(Run::try_from).collect()
    }
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct RunRow {
    document: serde_json::Value,
}

impl TryFrom<RunRow> for Run {
    type Error = RepositoryError;

    fn try_from(row: RunRow) -> Result<Self, Self::Error> {
        Ok(serde_json::from_value(row.document)?)
    }
}

/// Keeps runs in process memory
#[derive(Default)]
pub struct InMemoryRunRepository {
    runs: Mutex<HashMap<Uuid, Run>>,
}

impl InMemoryRunRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RunRepository for InMemoryRunRepository {
    async fn save(&self, run: &Run) -> Result<(), RepositoryError> {
        self.runs.lock().unwrap().insert(run.id, run.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Run>, RepositoryError> {
        Ok(self.runs.lock().unwrap().get(&id).cloned())
    }

    async fn list_all(&self) -> Result<Vec<Run>, RepositoryError> {
        let mut runs: Vec<Run> = self.runs.lock().unwrap().values().cloned().collect();
        runs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(runs)
    }
}
