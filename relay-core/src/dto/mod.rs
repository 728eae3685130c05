//! Data Transfer Objects for inter-service communication
//!
//! This module contains DTOs used for communication between Relay services
//! (orchestrator, validation hook, CLI). DTOs are lightweight representations
//! of domain entities optimized for network transfer.

pub mod approval;
pub mod hook;
pub mod run;
pub mod trigger;
