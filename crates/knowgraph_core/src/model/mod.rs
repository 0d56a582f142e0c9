//! Domain model for knowledge nodes stored on a key-value ledger.
//!
//! # Responsibility
//! - Define the canonical node record and its closed-but-extensible kinds.
//! - Own the ledger key layout shared by the repository layer.
//!
//! # Invariants
//! - A node is never physically deleted; archiving is the only mutation.
//! - `created_at` and `owner` are fixed at creation.

pub mod node;
