//! Ledger-backed persistence for nodes and the node index.
//!
//! # Responsibility
//! - Translate between ledger keys/bytes and domain values via the codec.
//! - Report semantic errors (decode, transport) tagged with the ledger key.
//!
//! # Invariants
//! - Empty bytes from the ledger always mean "absent".
//! - Repositories never retry; callers decide.

use crate::codec::CodecError;
use crate::ledger::LedgerError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod index_repo;
pub mod node_repo;

pub type RepoResult<T> = Result<T, RepoError>;

/// Persistence error for one ledger key.
#[derive(Debug)]
pub enum RepoError {
    Ledger { key: String, source: LedgerError },
    Decode { key: String, source: CodecError },
    Encode { key: String, source: CodecError },
}

impl RepoError {
    pub fn key(&self) -> &str {
        match self {
            Self::Ledger { key, .. } | Self::Decode { key, .. } | Self::Encode { key, .. } => key,
        }
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ledger { key, source } => write!(f, "`{key}`: {source}"),
            Self::Decode { key, source } => write!(f, "cannot decode `{key}`: {source}"),
            Self::Encode { key, source } => write!(f, "cannot encode `{key}`: {source}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Ledger { source, .. } => Some(source),
            Self::Decode { source, .. } | Self::Encode { source, .. } => Some(source),
        }
    }
}
