//! Relay Core
//!
//! Core types and abstractions for the Relay release orchestrator.
//!
//! This crate contains:
//! - Domain types: Core business entities (Run, Deployment, Approval, etc.)
//! - DTOs: Data transfer objects for inter-service communication

pub mod domain;
pub mod dto;
