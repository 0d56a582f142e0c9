//! Operation lifecycle feedback for callers.
//!
//! # Responsibility
//! - Track pending/success/error state of store operations.
//! - Publish every transition to subscribers.
//!
//! # Invariants
//! - Reporting never touches the ledger and never retries.

pub mod status;
