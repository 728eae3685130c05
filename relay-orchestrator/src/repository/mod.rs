//! Repository Module
//!
//! Persistence of runs. Postgres is used when a database is configured;
//! otherwise runs live in memory for the lifetime of the process.

pub mod run;

pub use run::{InMemoryRunRepository, PgRunRepository, RepositoryError, RunRepository};
