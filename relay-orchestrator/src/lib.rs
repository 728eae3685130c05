//! Relay Orchestrator
//!
//! Drives pipeline runs through their stages:
//! - Engine: the per-run state machine, run-order dispatch and approval gates
//! - Executors: source capture, build and deploy actions
//! - Traffic: the traffic-shift controller that gates revisions on the
//!   pre-traffic validation hook
//! - Repository / artifact store: run persistence and immutable artifacts
//! - API: the HTTP surface used by the CLI, the webhook and the hook

pub mod api;
pub mod artifact;
pub mod config;
pub mod db;
pub mod engine;
pub mod executor;
pub mod pipeline;
pub mod process;
pub mod repository;
pub mod traffic;
