//! Relay Pre-Traffic Validation Hook
//!
//! Validates a freshly provisioned revision before it receives live traffic:
//!
//! 1. Invoke the new revision directly with a synthetic record
//! 2. Wait a bounded, fixed time for the write to propagate
//! 3. Confirm the record with a strongly-consistent read
//! 4. Delete the synthetic record
//! 5. Report exactly one status for the hook execution
//!
//! Collaborators (revision invoker, record store, status reporter) are traits
//! so that the state machine in [`hook`] can be exercised without a network.

pub mod config;
pub mod error;
pub mod hook;
pub mod invoker;
pub mod record;
pub mod reporter;

pub use config::HookConfig;
pub use error::{HookError, Result};
pub use hook::{PreTrafficHook, report_setup_failure};
