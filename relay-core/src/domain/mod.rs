//! Core domain types
//!
//! This module contains the core domain structures used across Relay services.
//! These types are shared between the orchestrator (which drives and persists
//! them), the validation hook and the CLI.

pub mod approval;
pub mod artifact;
pub mod deployment;
pub mod hook;
pub mod pipeline;
pub mod run;
pub mod variables;
