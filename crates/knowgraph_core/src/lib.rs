//! Knowledge node store over a primitive key-value ledger.
//! This crate owns the index/record protocol and its failure model.

pub mod codec;
pub mod config;
pub mod db;
pub mod ledger;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;
pub mod session;
pub mod sync;
pub mod transform;

pub use config::{ConfigError, IndexDecodePolicy, StoreConfig};
pub use ledger::{Ledger, LedgerError, LedgerResult, MemoryLedger, SqliteLedger};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::node::{NodeId, NodeKind, NodeRecord, NodeStatus, INDEX_KEY};
pub use service::node_store::{
    ArchiveOutcome, CommitPhase, CreateNodeRequest, IndexAudit, NodeStore, RecoveryReport,
    StoreError, StoreResult,
};
pub use service::node_view::{NodeFilter, NodeStats};
pub use session::{IdentityProvider, Session};
pub use sync::status::{StatusReporter, StatusSnapshot, StatusTicket, SyncOperation, SyncState};
pub use transform::{ConfidentialityTransform, EnvelopeTransform};

/// Minimal health-check API.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
