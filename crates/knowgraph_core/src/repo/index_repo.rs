//! Node index maintenance under the well-known `node_keys` ledger key.
//!
//! # Responsibility
//! - Load, append to and persist the ordered list of node ids.
//! - Mint collision-resistant node ids without ledger coordination.
//!
//! # Invariants
//! - The index is append-only; ids are never removed.
//! - Appends are read-modify-write of the whole list and are not atomic with
//!   record writes or with other clients' appends.
//! - An index that cannot be decoded is never overwritten.

use crate::codec::{decode_index, encode_index, CodecError};
use crate::config::IndexDecodePolicy;
use crate::ledger::Ledger;
use crate::model::node::{NodeId, INDEX_KEY};
use crate::repo::{RepoError, RepoResult};
use log::{debug, warn};
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

const ID_SUFFIX_LEN: usize = 7;
const BASE36_DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

static LAST_ID_MILLIS: AtomicI64 = AtomicI64::new(0);

/// Mints a node id as `<millis>-<7 base36 chars>`.
///
/// The millisecond part never decreases within one process, even if the wall
/// clock steps back. Uniqueness is best-effort, not cryptographic.
pub fn generate_node_id() -> NodeId {
    let now = now_epoch_millis();
    let millis = LAST_ID_MILLIS.fetch_max(now, Ordering::SeqCst).max(now);
    format!("{millis}-{}", random_suffix())
}

fn random_suffix() -> String {
    let mut entropy = Uuid::new_v4().as_u128();
    let mut suffix = String::with_capacity(ID_SUFFIX_LEN);
    for _ in 0..ID_SUFFIX_LEN {
        suffix.push(char::from(BASE36_DIGITS[(entropy % 36) as usize]));
        entropy /= 36;
    }
    suffix
}

/// Wall-clock Unix epoch milliseconds; `0` if the clock is before the epoch.
pub(crate) fn now_epoch_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

/// Reader/writer for the node index key.
pub struct IndexManager<'l, L: Ledger + ?Sized> {
    ledger: &'l L,
    policy: IndexDecodePolicy,
}

impl<'l, L: Ledger + ?Sized> IndexManager<'l, L> {
    pub fn new(ledger: &'l L, policy: IndexDecodePolicy) -> Self {
        Self { ledger, policy }
    }

    /// Loads the ordered id list.
    ///
    /// An absent index is an empty list. An undecodable index is an empty
    /// list under `Lenient` and a decode error under `Strict`.
    pub fn load(&self) -> RepoResult<Vec<NodeId>> {
        match self.load_strict() {
            Err(RepoError::Decode { key, source }) if self.policy == IndexDecodePolicy::Lenient => {
                warn!(
                    "event=index_load module=repo status=degraded key={key} policy=lenient error={source}"
                );
                Ok(Vec::new())
            }
            other => other,
        }
    }

    /// Appends one id and persists the whole list. No de-duplication.
    ///
    /// Returns the persisted list.
    pub fn append(&self, id: &str) -> RepoResult<Vec<NodeId>> {
        self.append_all(&[id.to_string()])
    }

    /// Appends several ids with a single index write.
    pub fn append_all(&self, ids: &[NodeId]) -> RepoResult<Vec<NodeId>> {
        let mut current = self.load_strict()?;
        current.extend(ids.iter().cloned());
        self.persist(&current)?;
        debug!(
            "event=index_append module=repo status=ok appended={} total={}",
            ids.len(),
            current.len()
        );
        Ok(current)
    }

    /// Loads the list, always failing on undecodable payloads.
    pub fn load_strict(&self) -> RepoResult<Vec<NodeId>> {
        let bytes = self.ledger.get(INDEX_KEY).map_err(|source| RepoError::Ledger {
            key: INDEX_KEY.to_string(),
            source,
        })?;
        if bytes.is_empty() {
            return Ok(Vec::new());
        }
        decode_index(&bytes).map_err(decode_error)
    }

    fn persist(&self, ids: &[NodeId]) -> RepoResult<()> {
        let bytes = encode_index(ids).map_err(|source| RepoError::Encode {
            key: INDEX_KEY.to_string(),
            source,
        })?;
        self.ledger
            .set(INDEX_KEY, &bytes)
            .map_err(|source| RepoError::Ledger {
                key: INDEX_KEY.to_string(),
                source,
            })
    }
}

fn decode_error(source: CodecError) -> RepoError {
    RepoError::Decode {
        key: INDEX_KEY.to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::{generate_node_id, IndexManager};
    use crate::config::IndexDecodePolicy;
    use crate::ledger::{Ledger, MemoryLedger};
    use crate::model::node::{is_valid_node_id, INDEX_KEY};
    use crate::repo::RepoError;
    use std::collections::HashSet;

    #[test]
    fn generated_ids_are_well_formed_unique_and_ordered() {
        let ids: Vec<String> = (0..500).map(|_| generate_node_id()).collect();
        let unique: HashSet<&String> = ids.iter().collect();
        assert_eq!(unique.len(), ids.len());

        let mut previous = 0_i64;
        for id in &ids {
            assert!(is_valid_node_id(id), "{id} should be a valid node id");
            let (millis, suffix) = id.split_once('-').expect("id has a dash");
            assert_eq!(suffix.len(), 7);
            let millis: i64 = millis.parse().expect("millis prefix");
            assert!(millis >= previous);
            previous = millis;
        }
    }

    #[test]
    fn absent_index_loads_as_empty() {
        let ledger = MemoryLedger::new();
        let index = IndexManager::new(&ledger, IndexDecodePolicy::Strict);
        assert!(index.load().expect("load should succeed").is_empty());
    }

    #[test]
    fn append_preserves_order_and_duplicates() {
        let ledger = MemoryLedger::new();
        let index = IndexManager::new(&ledger, IndexDecodePolicy::Lenient);
        index.append("1-a").expect("append a");
        index.append("2-b").expect("append b");
        let persisted = index.append("1-a").expect("append duplicate");
        assert_eq!(persisted, vec!["1-a", "2-b", "1-a"]);
        assert_eq!(index.load().expect("load"), persisted);
    }

    #[test]
    fn corrupt_index_loads_empty_when_lenient_and_fails_when_strict() {
        let ledger = MemoryLedger::new();
        ledger.seed(INDEX_KEY, b"{broken".to_vec());

        let lenient = IndexManager::new(&ledger, IndexDecodePolicy::Lenient);
        assert!(lenient.load().expect("lenient load").is_empty());

        let strict = IndexManager::new(&ledger, IndexDecodePolicy::Strict);
        assert!(matches!(strict.load(), Err(RepoError::Decode { .. })));
    }

    #[test]
    fn append_never_overwrites_corrupt_index() {
        let ledger = MemoryLedger::new();
        ledger.seed(INDEX_KEY, b"{broken".to_vec());
        let index = IndexManager::new(&ledger, IndexDecodePolicy::Lenient);

        let err = index.append("1-a").expect_err("append must fail");
        assert!(matches!(err, RepoError::Decode { .. }));
        assert_eq!(ledger.set_calls(), 0);
        assert_eq!(ledger.peek(INDEX_KEY), Some(b"{broken".to_vec()));
    }

    #[test]
    fn append_surfaces_write_failure() {
        let ledger = MemoryLedger::new();
        ledger.fail_writes_to(INDEX_KEY);
        let index = IndexManager::new(&ledger, IndexDecodePolicy::Lenient);
        let err = index.append("1-a").expect_err("append must fail");
        assert!(matches!(err, RepoError::Ledger { ref key, .. } if key == INDEX_KEY));
        assert!(ledger.get(INDEX_KEY).expect("get").is_empty());
    }
}
