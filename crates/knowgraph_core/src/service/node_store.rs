//! Node store orchestration over a primitive key-value ledger.
//!
//! # Responsibility
//! - Reconstruct the node collection from the index plus per-node reads.
//! - Sequence create (record, then index) and archive mutations.
//! - Report every operation through the shared `StatusReporter`.
//!
//! # Invariants
//! - Availability is probed before any ledger read or write.
//! - Mutations need an authorized `Session` and run one at a time per store.
//! - A record is written before its id is appended to the index; a failed
//!   append leaves an orphan record and is reported as
//!   `StoreError::PartialIndexFailure`.
//! - Per-node failures during `list()` drop that node only.
//! - Nothing is retried here.
//!
//! # Known limitation
//! Index appends are read-modify-write of the whole list. Two processes
//! appending concurrently can lose one append; there is no cross-process lock.

use crate::codec::CodecError;
use crate::config::{IndexDecodePolicy, StoreConfig};
use crate::ledger::{Ledger, LedgerError};
use crate::model::node::{is_valid_node_id, NodeId, NodeKind, NodeRecord};
use crate::repo::index_repo::{generate_node_id, now_epoch_millis, IndexManager};
use crate::repo::node_repo::NodeRepository;
use crate::repo::RepoError;
use crate::session::Session;
use crate::sync::status::{StatusReporter, SyncOperation};
use crate::transform::ConfidentialityTransform;
use log::{debug, error, info, warn};
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use std::thread;
use std::time::{Duration, Instant};

const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(5);

pub type StoreResult<T> = Result<T, StoreError>;

/// Node store operation failure.
#[derive(Debug)]
pub enum StoreError {
    /// The ledger probe failed; nothing was read or written.
    Unavailable,
    /// The session has no identity; nothing was written.
    NotAuthorized,
    /// The targeted node key was never written.
    NotFound(NodeId),
    /// The id cannot form a ledger key.
    InvalidId(String),
    /// Another mutation held the store lock past the configured timeout.
    Busy(Duration),
    /// A directly targeted payload could not be decoded.
    Decode { key: String, source: CodecError },
    /// A value could not be encoded for writing.
    Encode { key: String, source: CodecError },
    /// A ledger call failed for a directly targeted key.
    Transport { key: String, source: LedgerError },
    /// The record was written but its id could not be appended to the index.
    ///
    /// The record is orphaned: invisible to `list()` but still readable by
    /// id. Retrying creation is safe and mints a new id.
    PartialIndexFailure { id: NodeId, source: Box<StoreError> },
}

impl StoreError {
    /// Orphaned node id left behind by a failed index append.
    pub fn orphaned_id(&self) -> Option<&str> {
        match self {
            Self::PartialIndexFailure { id, .. } => Some(id),
            _ => None,
        }
    }

    /// Whether the signer declined a write somewhere in the chain.
    pub fn is_rejected(&self) -> bool {
        match self {
            Self::Transport {
                source: LedgerError::Rejected(_),
                ..
            } => true,
            Self::PartialIndexFailure { source, .. } => source.is_rejected(),
            _ => false,
        }
    }

    /// Stable machine-readable code for log lines.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unavailable => "unavailable",
            Self::NotAuthorized => "not_authorized",
            Self::NotFound(_) => "not_found",
            Self::InvalidId(_) => "invalid_id",
            Self::Busy(_) => "busy",
            Self::Decode { .. } => "decode_error",
            Self::Encode { .. } => "encode_error",
            Self::Transport { source, .. } => source.code(),
            Self::PartialIndexFailure { .. } => "partial_index_failure",
        }
    }
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unavailable => write!(f, "ledger is not available"),
            Self::NotAuthorized => write!(f, "no identity connected; connect before writing"),
            Self::NotFound(id) => write!(f, "node not found: {id}"),
            Self::InvalidId(id) => write!(f, "invalid node id: `{id}`"),
            Self::Busy(waited) => write!(
                f,
                "another write is still in progress after {}ms",
                waited.as_millis()
            ),
            Self::Decode { key, source } => write!(f, "cannot decode `{key}`: {source}"),
            Self::Encode { key, source } => write!(f, "cannot encode `{key}`: {source}"),
            Self::Transport { key, source } => write!(f, "`{key}`: {source}"),
            Self::PartialIndexFailure { id, source } => write!(
                f,
                "node {id} was written but not added to the index ({source}); retry creates a new node"
            ),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Decode { source, .. } | Self::Encode { source, .. } => Some(source),
            Self::Transport { source, .. } => Some(source),
            Self::PartialIndexFailure { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl From<RepoError> for StoreError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::Ledger { key, source } => Self::Transport { key, source },
            RepoError::Decode { key, source } => Self::Decode { key, source },
            RepoError::Encode { key, source } => Self::Encode { key, source },
        }
    }
}

/// Write phases of `NodeStore::create`, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitPhase {
    /// The node record under `node_<id>`.
    Record,
    /// The id append to `node_keys`.
    Index,
}

impl CommitPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Record => "record",
            Self::Index => "index",
        }
    }
}

/// Input for `NodeStore::create`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateNodeRequest {
    pub kind: NodeKind,
    /// Raw content; only its transformed form reaches the ledger.
    pub content: String,
    pub relations: Vec<NodeId>,
}

impl CreateNodeRequest {
    pub fn new(kind: NodeKind, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
            relations: Vec::new(),
        }
    }

    pub fn with_relations(mut self, relations: Vec<NodeId>) -> Self {
        self.relations = relations;
        self
    }
}

/// Result of `NodeStore::archive`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveOutcome {
    /// The record moved to archived and was written back.
    Archived(NodeRecord),
    /// The record was already archived; nothing was written.
    AlreadyArchived(NodeRecord),
}

impl ArchiveOutcome {
    pub fn record(&self) -> &NodeRecord {
        match self {
            Self::Archived(record) | Self::AlreadyArchived(record) => record,
        }
    }
}

/// Read-only consistency report between the index and node keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexAudit {
    /// Number of entries in the index, duplicates included.
    pub indexed: usize,
    /// Indexed ids whose record decoded.
    pub readable: usize,
    /// Indexed ids with no record (index-only entries).
    pub missing: Vec<NodeId>,
    /// Indexed ids whose record failed to read or decode.
    pub unreadable: Vec<NodeId>,
    /// Ids listed more than once; each repeated id is reported once.
    pub duplicates: Vec<NodeId>,
}

impl IndexAudit {
    pub fn is_consistent(&self) -> bool {
        self.missing.is_empty() && self.unreadable.is_empty() && self.duplicates.is_empty()
    }
}

/// Result of `NodeStore::recover`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Orphan records appended to the index.
    pub adopted: Vec<NodeId>,
    /// Candidates already present in the index.
    pub already_indexed: Vec<NodeId>,
    /// Candidates with no record under their key.
    pub missing: Vec<NodeId>,
    /// Candidates whose record failed to read or decode, or whose id is invalid.
    pub unreadable: Vec<NodeId>,
}

/// Client-side node store over a ledger.
pub struct NodeStore<L: Ledger, T: ConfidentialityTransform> {
    ledger: L,
    transform: T,
    config: StoreConfig,
    reporter: Arc<StatusReporter>,
    mutation_lock: Mutex<()>,
}

impl<L: Ledger, T: ConfidentialityTransform> NodeStore<L, T> {
    pub fn new(ledger: L, transform: T, config: StoreConfig) -> Self {
        let reporter = Arc::new(StatusReporter::new(
            config.success_display(),
            config.error_display(),
        ));
        Self::with_reporter(ledger, transform, config, reporter)
    }

    /// Builds a store publishing to an existing reporter.
    pub fn with_reporter(
        ledger: L,
        transform: T,
        config: StoreConfig,
        reporter: Arc<StatusReporter>,
    ) -> Self {
        Self {
            ledger,
            transform,
            config,
            reporter,
            mutation_lock: Mutex::new(()),
        }
    }

    pub fn reporter(&self) -> Arc<StatusReporter> {
        Arc::clone(&self.reporter)
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Rebuilds the full collection, newest first.
    ///
    /// Ties on `created_at` keep index order. Ids whose record is missing,
    /// unreadable or undecodable are skipped and logged; repeated index
    /// entries are listed once.
    ///
    /// # Errors
    /// - `Unavailable` when the probe fails.
    /// - `Transport` when the index itself cannot be read.
    /// - `Decode` when the index cannot be decoded under `Strict` policy.
    pub fn list(&self) -> StoreResult<Vec<NodeRecord>> {
        self.reported(
            SyncOperation::Refresh,
            "Refreshing knowledge nodes...",
            |nodes: &Vec<NodeRecord>| format!("Loaded {} knowledge nodes", nodes.len()),
            || self.list_inner(),
        )
    }

    /// Reads one node by id, bypassing the index.
    ///
    /// Orphan records are visible here even though `list()` omits them.
    pub fn get(&self, id: &str) -> StoreResult<Option<NodeRecord>> {
        validate_id(id)?;
        self.require_available("get")?;
        Ok(self.nodes().read(id)?)
    }

    /// Creates one node: transform, mint id, write record, append to index.
    ///
    /// # Errors
    /// - `NotAuthorized` / `Unavailable` before any ledger call.
    /// - `Transport` when the record write fails; the index is untouched.
    /// - `PartialIndexFailure` when the record exists but the index append
    ///   failed.
    pub fn create(
        &self,
        session: &Session,
        request: &CreateNodeRequest,
    ) -> StoreResult<NodeRecord> {
        self.reported(
            SyncOperation::Create,
            "Creating knowledge node...",
            |_: &NodeRecord| "Knowledge node created".to_string(),
            || self.create_inner(session, request),
        )
    }

    /// Archives one node. Archiving an archived node succeeds without a write.
    ///
    /// # Errors
    /// - `NotAuthorized` / `Unavailable` before any ledger call.
    /// - `NotFound` when the node key was never written.
    /// - `Decode` when the stored record is corrupt.
    pub fn archive(&self, session: &Session, id: &str) -> StoreResult<ArchiveOutcome> {
        self.reported(
            SyncOperation::Archive,
            "Archiving knowledge node...",
            |outcome: &ArchiveOutcome| match outcome {
                ArchiveOutcome::Archived(_) => "Knowledge node archived".to_string(),
                ArchiveOutcome::AlreadyArchived(_) => {
                    "Knowledge node was already archived".to_string()
                }
            },
            || self.archive_inner(session, id),
        )
    }

    /// Compares the index against node keys without writing anything.
    ///
    /// The index is always decoded strictly here, so a corrupt index is a
    /// `Decode` error instead of an empty report.
    pub fn audit(&self) -> StoreResult<IndexAudit> {
        self.require_available("audit")?;
        let ids = self.index(IndexDecodePolicy::Strict).load()?;

        let mut audit = IndexAudit {
            indexed: ids.len(),
            ..IndexAudit::default()
        };
        let mut seen = HashSet::new();
        let mut reported_duplicates = HashSet::new();
        for id in &ids {
            if !seen.insert(id.as_str()) {
                if reported_duplicates.insert(id.as_str()) {
                    audit.duplicates.push(id.clone());
                }
                continue;
            }
            if !is_valid_node_id(id) {
                audit.unreadable.push(id.clone());
                continue;
            }
            match self.nodes().read(id) {
                Ok(Some(_)) => audit.readable += 1,
                Ok(None) => audit.missing.push(id.clone()),
                Err(err) => {
                    debug!("event=index_audit module=service status=error key={} error={err}", err.key());
                    audit.unreadable.push(id.clone());
                }
            }
        }

        info!(
            "event=index_audit module=service status=ok indexed={} readable={} missing={} unreadable={} duplicates={}",
            audit.indexed,
            audit.readable,
            audit.missing.len(),
            audit.unreadable.len(),
            audit.duplicates.len()
        );
        Ok(audit)
    }

    /// Appends orphan records among `candidates` to the index.
    ///
    /// Candidates come from outside the store, e.g. ids reported by
    /// `StoreError::orphaned_id`. Only ids with a decodable record that are
    /// not yet indexed are adopted, with one index write.
    pub fn recover(&self, session: &Session, candidates: &[NodeId]) -> StoreResult<RecoveryReport> {
        self.reported(
            SyncOperation::Recover,
            "Recovering orphan nodes...",
            |report: &RecoveryReport| format!("Recovered {} orphan nodes", report.adopted.len()),
            || self.recover_inner(session, candidates),
        )
    }

    fn list_inner(&self) -> StoreResult<Vec<NodeRecord>> {
        let started_at = Instant::now();
        self.require_available("list")?;
        let ids = self.index(self.config.index_decode_policy).load()?;

        let mut seen = HashSet::with_capacity(ids.len());
        let unique: Vec<&NodeId> = ids
            .iter()
            .filter(|id| {
                let first = seen.insert(id.as_str());
                if !first {
                    debug!("event=node_list module=service status=skip reason=duplicate id={id}");
                }
                first
            })
            .collect();

        let mut nodes = self.read_listed(&unique);
        nodes.sort_by(|left, right| right.created_at.cmp(&left.created_at));

        info!(
            "event=node_list module=service status=ok indexed={} listed={} duration_ms={}",
            ids.len(),
            nodes.len(),
            started_at.elapsed().as_millis()
        );
        Ok(nodes)
    }

    /// Reads listed ids, at most `read_fan_out` at a time, keeping index order.
    fn read_listed(&self, ids: &[&NodeId]) -> Vec<NodeRecord> {
        let fan_out = self.config.read_fan_out.max(1);
        if fan_out == 1 {
            return ids.iter().filter_map(|id| self.read_listed_node(id)).collect();
        }

        let mut nodes = Vec::with_capacity(ids.len());
        for batch in ids.chunks(fan_out) {
            let loaded: Vec<Option<NodeRecord>> = thread::scope(|scope| {
                let handles: Vec<_> = batch
                    .iter()
                    .map(|id| scope.spawn(move || self.read_listed_node(id)))
                    .collect();
                handles
                    .into_iter()
                    .map(|handle| handle.join().unwrap_or(None))
                    .collect()
            });
            nodes.extend(loaded.into_iter().flatten());
        }
        nodes
    }

    fn read_listed_node(&self, id: &str) -> Option<NodeRecord> {
        if !is_valid_node_id(id) {
            warn!("event=node_read module=service status=skip reason=invalid_id");
            return None;
        }
        match self.nodes().read(id) {
            Ok(Some(node)) => Some(node),
            Ok(None) => {
                debug!("event=node_read module=service status=skip reason=missing id={id}");
                None
            }
            Err(err) => {
                warn!(
                    "event=node_read module=service status=error key={} error={err}",
                    err.key()
                );
                None
            }
        }
    }

    fn create_inner(&self, session: &Session, request: &CreateNodeRequest) -> StoreResult<NodeRecord> {
        let owner = require_identity(session)?;
        let _guard = self.lock_mutations()?;
        self.require_available("create")?;

        let payload = self
            .transform
            .transform(&request.kind, request.content.as_bytes());
        let record = NodeRecord::new(
            generate_node_id(),
            request.kind.clone(),
            payload,
            owner,
            now_epoch_millis() / 1_000,
        )
        .with_relations(request.relations.clone());

        // Nothing else is attempted if the record write fails.
        self.commit(CommitPhase::Record, &record)?;

        // A failed append leaves an orphan record.
        self.commit(CommitPhase::Index, &record)
            .map_err(|err| StoreError::PartialIndexFailure {
                id: record.id.clone(),
                source: Box::new(err.into()),
            })?;

        info!(
            "event=node_create module=service status=ok id={} kind={} relations={}",
            record.id,
            record.kind,
            record.relations.len()
        );
        Ok(record)
    }

    fn commit(&self, phase: CommitPhase, record: &NodeRecord) -> Result<(), RepoError> {
        let result = match phase {
            CommitPhase::Record => self.nodes().write(record),
            CommitPhase::Index => self
                .index(self.config.index_decode_policy)
                .append(&record.id)
                .map(|_| ()),
        };
        if let Err(err) = &result {
            error!(
                "event=node_create module=service status=error phase={} id={} orphaned={} error={err}",
                phase.as_str(),
                record.id,
                phase == CommitPhase::Index
            );
        }
        result
    }

    fn archive_inner(&self, session: &Session, id: &str) -> StoreResult<ArchiveOutcome> {
        require_identity(session)?;
        validate_id(id)?;
        let _guard = self.lock_mutations()?;
        self.require_available("archive")?;

        let nodes = self.nodes();
        let Some(mut record) = nodes.read(id)? else {
            return Err(StoreError::NotFound(id.to_string()));
        };
        if !record.archive() {
            info!("event=node_archive module=service status=skip reason=already_archived id={id}");
            return Ok(ArchiveOutcome::AlreadyArchived(record));
        }

        nodes.write(&record)?;
        info!("event=node_archive module=service status=ok id={id}");
        Ok(ArchiveOutcome::Archived(record))
    }

    fn recover_inner(&self, session: &Session, candidates: &[NodeId]) -> StoreResult<RecoveryReport> {
        require_identity(session)?;
        let _guard = self.lock_mutations()?;
        self.require_available("recover")?;

        let index = self.index(IndexDecodePolicy::Strict);
        let indexed: HashSet<NodeId> = index.load()?.into_iter().collect();

        let mut report = RecoveryReport::default();
        let mut considered = HashSet::new();
        for id in candidates {
            if !considered.insert(id.as_str()) {
                continue;
            }
            if indexed.contains(id) {
                report.already_indexed.push(id.clone());
                continue;
            }
            if !is_valid_node_id(id) {
                report.unreadable.push(id.clone());
                continue;
            }
            match self.nodes().read(id) {
                Ok(Some(_)) => report.adopted.push(id.clone()),
                Ok(None) => report.missing.push(id.clone()),
                Err(err) => {
                    warn!(
                        "event=node_recover module=service status=error key={} error={err}",
                        err.key()
                    );
                    report.unreadable.push(id.clone());
                }
            }
        }

        if !report.adopted.is_empty() {
            index.append_all(&report.adopted)?;
        }
        info!(
            "event=node_recover module=service status=ok adopted={} already_indexed={} missing={} unreadable={}",
            report.adopted.len(),
            report.already_indexed.len(),
            report.missing.len(),
            report.unreadable.len()
        );
        Ok(report)
    }

    fn reported<R>(
        &self,
        operation: SyncOperation,
        pending_message: &str,
        success_message: impl FnOnce(&R) -> String,
        run: impl FnOnce() -> StoreResult<R>,
    ) -> StoreResult<R> {
        let ticket = self.reporter.begin(operation, pending_message);
        let result = run();
        match &result {
            Ok(value) => {
                self.reporter.succeed(ticket, success_message(value));
            }
            Err(err) => {
                warn!(
                    "event=store_op module=service status=error op={} error_code={} error={err}",
                    operation.as_str(),
                    err.code()
                );
                self.reporter.fail(ticket, failure_message(operation, err));
            }
        }
        result
    }

    fn require_available(&self, op: &str) -> StoreResult<()> {
        if self.ledger.is_available() {
            return Ok(());
        }
        warn!("event=ledger_probe module=service status=error op={op} error_code=unavailable");
        Err(StoreError::Unavailable)
    }

    fn lock_mutations(&self) -> StoreResult<MutexGuard<'_, ()>> {
        let timeout = self.config.mutation_lock_timeout();
        let deadline = Instant::now() + timeout;
        loop {
            match self.mutation_lock.try_lock() {
                Ok(guard) => return Ok(guard),
                Err(TryLockError::Poisoned(poisoned)) => return Ok(poisoned.into_inner()),
                Err(TryLockError::WouldBlock) => {
                    if Instant::now() >= deadline {
                        return Err(StoreError::Busy(timeout));
                    }
                    thread::sleep(LOCK_POLL_INTERVAL);
                }
            }
        }
    }

    fn nodes(&self) -> NodeRepository<'_, L> {
        NodeRepository::new(&self.ledger)
    }

    fn index(&self, policy: IndexDecodePolicy) -> IndexManager<'_, L> {
        IndexManager::new(&self.ledger, policy)
    }
}

/// User-facing status message for a failed operation.
pub fn failure_message(operation: SyncOperation, err: &StoreError) -> String {
    if err.is_rejected() {
        return "Transaction rejected by user".to_string();
    }
    format!("{} failed: {err}", operation.failure_label())
}

fn require_identity(session: &Session) -> StoreResult<String> {
    session
        .current_address()
        .map(str::to_string)
        .ok_or(StoreError::NotAuthorized)
}

fn validate_id(id: &str) -> StoreResult<()> {
    if is_valid_node_id(id) {
        Ok(())
    } else {
        Err(StoreError::InvalidId(id.to_string()))
    }
}
