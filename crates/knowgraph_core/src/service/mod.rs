//! Use-case services over the ledger repositories.
//!
//! # Responsibility
//! - Orchestrate index and node repositories into store operations.
//! - Keep CLI and embedders decoupled from ledger key layout.

pub mod node_store;
pub mod node_view;
