//! Per-node record reads and writes under `node_<id>` keys.

use crate::codec::{decode_node, encode_node};
use crate::ledger::Ledger;
use crate::model::node::{node_key, NodeRecord};
use crate::repo::{RepoError, RepoResult};

/// Reader/writer for individual node keys.
pub struct NodeRepository<'l, L: Ledger + ?Sized> {
    ledger: &'l L,
}

impl<'l, L: Ledger + ?Sized> NodeRepository<'l, L> {
    pub fn new(ledger: &'l L) -> Self {
        Self { ledger }
    }

    /// Reads one node. `Ok(None)` when the key was never written.
    pub fn read(&self, id: &str) -> RepoResult<Option<NodeRecord>> {
        let key = node_key(id);
        let bytes = match self.ledger.get(&key) {
            Ok(bytes) => bytes,
            Err(source) => return Err(RepoError::Ledger { key, source }),
        };
        if bytes.is_empty() {
            return Ok(None);
        }
        match decode_node(id, &bytes) {
            Ok(record) => Ok(Some(record)),
            Err(source) => Err(RepoError::Decode { key, source }),
        }
    }

    /// Writes the full record under its key, replacing any previous value.
    pub fn write(&self, record: &NodeRecord) -> RepoResult<()> {
        let key = record.key();
        let bytes = match encode_node(record) {
            Ok(bytes) => bytes,
            Err(source) => return Err(RepoError::Encode { key, source }),
        };
        self.ledger
            .set(&key, &bytes)
            .map_err(|source| RepoError::Ledger { key, source })
    }
}

#[cfg(test)]
mod tests {
    use super::NodeRepository;
    use crate::ledger::MemoryLedger;
    use crate::model::node::{NodeKind, NodeRecord};
    use crate::repo::RepoError;

    #[test]
    fn write_then_read_returns_record() {
        let ledger = MemoryLedger::new();
        let repo = NodeRepository::new(&ledger);
        let record = NodeRecord::new("1-a", NodeKind::Concept, "blob", "0x1", 1);
        repo.write(&record).expect("write should succeed");
        assert_eq!(repo.read("1-a").expect("read"), Some(record));
        assert!(ledger.peek("node_1-a").is_some());
    }

    #[test]
    fn missing_record_reads_as_none() {
        let ledger = MemoryLedger::new();
        assert_eq!(NodeRepository::new(&ledger).read("9-z").expect("read"), None);
    }

    #[test]
    fn corrupt_record_reports_its_key() {
        let ledger = MemoryLedger::new();
        ledger.seed("node_2-b", b"[1,2".to_vec());
        let err = NodeRepository::new(&ledger).read("2-b").expect_err("decode must fail");
        assert!(matches!(err, RepoError::Decode { .. }));
        assert_eq!(err.key(), "node_2-b");
    }
}
