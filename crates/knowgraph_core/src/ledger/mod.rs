//! Ledger client contract and bundled adapters.
//!
//! # Responsibility
//! - Define the narrow `get`/`set`/`is_available` contract the store runs on.
//! - Ship an in-process adapter and a SQLite-backed adapter.
//!
//! # Invariants
//! - `get` of a never-written key returns empty bytes, not an error.
//! - `set` applies atomically per key; there is no multi-key atomicity.
//! - The contract has no enumeration primitive.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

mod memory;
mod sqlite;

pub use memory::MemoryLedger;
pub use sqlite::SqliteLedger;

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Failure reported by a ledger client call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Network, storage or signer failure.
    Transport(String),
    /// The identity provider declined to sign or submit the write.
    Rejected(String),
    /// The client gave up waiting for the ledger.
    Timeout(String),
}

impl LedgerError {
    /// Stable machine-readable code for log lines.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Transport(_) => "ledger_transport",
            Self::Rejected(_) => "ledger_rejected",
            Self::Timeout(_) => "ledger_timeout",
        }
    }
}

impl Display for LedgerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport(message) => write!(f, "ledger transport error: {message}"),
            Self::Rejected(message) => write!(f, "ledger write rejected: {message}"),
            Self::Timeout(message) => write!(f, "ledger call timed out: {message}"),
        }
    }
}

impl Error for LedgerError {}

/// Primitive key-value ledger.
///
/// Implementations must bound every call; a hung substrate surfaces as
/// `LedgerError::Timeout`.
pub trait Ledger: Send + Sync {
    /// Reads the bytes stored under `key`; empty when never written.
    fn get(&self, key: &str) -> LedgerResult<Vec<u8>>;
    /// Replaces the bytes stored under `key`.
    fn set(&self, key: &str, value: &[u8]) -> LedgerResult<()>;
    /// Cheap liveness probe, checked before any read sequence.
    fn is_available(&self) -> bool;
}

impl<L: Ledger + ?Sized> Ledger for &L {
    fn get(&self, key: &str) -> LedgerResult<Vec<u8>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &[u8]) -> LedgerResult<()> {
        (**self).set(key, value)
    }

    fn is_available(&self) -> bool {
        (**self).is_available()
    }
}

impl<L: Ledger + ?Sized> Ledger for Arc<L> {
    fn get(&self, key: &str) -> LedgerResult<Vec<u8>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &[u8]) -> LedgerResult<()> {
        (**self).set(key, value)
    }

    fn is_available(&self) -> bool {
        (**self).is_available()
    }
}

impl<L: Ledger + ?Sized> Ledger for Box<L> {
    fn get(&self, key: &str) -> LedgerResult<Vec<u8>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &[u8]) -> LedgerResult<()> {
        (**self).set(key, value)
    }

    fn is_available(&self) -> bool {
        (**self).is_available()
    }
}
