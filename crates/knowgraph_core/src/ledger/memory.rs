//! In-process ledger adapter with fault injection.
//!
//! Reference implementation of the `Ledger` contract. Availability, per-key
//! read/write failures and signer rejections can be switched on to exercise
//! partial-failure paths.

use super::{Ledger, LedgerError, LedgerResult};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Default)]
struct MemoryState {
    entries: HashMap<String, Vec<u8>>,
    failing_reads: HashSet<String>,
    failing_writes: HashSet<String>,
    rejected_writes: HashSet<String>,
}

/// Thread-safe in-memory ledger.
pub struct MemoryLedger {
    state: Mutex<MemoryState>,
    available: AtomicBool,
    get_calls: AtomicUsize,
    set_calls: AtomicUsize,
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            available: AtomicBool::new(true),
            get_calls: AtomicUsize::new(0),
            set_calls: AtomicUsize::new(0),
        }
    }

    /// Stores a value without counting it as a client call.
    pub fn seed(&self, key: &str, value: impl Into<Vec<u8>>) {
        self.lock().entries.insert(key.to_string(), value.into());
    }

    /// Returns the stored value without counting it as a client call.
    pub fn peek(&self, key: &str) -> Option<Vec<u8>> {
        self.lock().entries.get(key).cloned()
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Makes every subsequent `get(key)` fail with a transport error.
    pub fn fail_reads_from(&self, key: &str) {
        self.lock().failing_reads.insert(key.to_string());
    }

    /// Makes every subsequent `set(key, ..)` fail with a transport error.
    pub fn fail_writes_to(&self, key: &str) {
        self.lock().failing_writes.insert(key.to_string());
    }

    /// Makes every subsequent `set(key, ..)` fail as a declined signature.
    pub fn reject_writes_to(&self, key: &str) {
        self.lock().rejected_writes.insert(key.to_string());
    }

    pub fn clear_faults(&self) {
        let mut state = self.lock();
        state.failing_reads.clear();
        state.failing_writes.clear();
        state.rejected_writes.clear();
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn set_calls(&self) -> usize {
        self.set_calls.load(Ordering::SeqCst)
    }

    pub fn reset_counters(&self) {
        self.get_calls.store(0, Ordering::SeqCst);
        self.set_calls.store(0, Ordering::SeqCst);
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Ledger for MemoryLedger {
    fn get(&self, key: &str) -> LedgerResult<Vec<u8>> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        let state = self.lock();
        if state.failing_reads.contains(key) {
            return Err(LedgerError::Transport(format!("injected read failure for `{key}`")));
        }
        Ok(state.entries.get(key).cloned().unwrap_or_default())
    }

    fn set(&self, key: &str, value: &[u8]) -> LedgerResult<()> {
        self.set_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.lock();
        if state.rejected_writes.contains(key) {
            return Err(LedgerError::Rejected("user rejected transaction".to_string()));
        }
        if state.failing_writes.contains(key) {
            return Err(LedgerError::Transport(format!("injected write failure for `{key}`")));
        }
        state.entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::MemoryLedger;
    use crate::ledger::{Ledger, LedgerError};

    #[test]
    fn unwritten_key_reads_as_empty() {
        let ledger = MemoryLedger::new();
        assert!(ledger.get("missing").expect("get should succeed").is_empty());
        assert_eq!(ledger.get_calls(), 1);
    }

    #[test]
    fn set_then_get_returns_value_and_counts_calls() {
        let ledger = MemoryLedger::new();
        ledger.set("k", b"v").expect("set should succeed");
        assert_eq!(ledger.get("k").expect("get should succeed"), b"v".to_vec());
        assert_eq!(ledger.set_calls(), 1);
        assert_eq!(ledger.get_calls(), 1);

        ledger.seed("s", b"seeded".to_vec());
        assert_eq!(ledger.peek("s"), Some(b"seeded".to_vec()));
        assert_eq!(ledger.set_calls(), 1);
        assert_eq!(ledger.get_calls(), 1);
    }

    #[test]
    fn injected_faults_leave_state_untouched() {
        let ledger = MemoryLedger::new();
        ledger.fail_writes_to("k");
        let err = ledger.set("k", b"v").expect_err("write should fail");
        assert!(matches!(err, LedgerError::Transport(_)));
        assert_eq!(ledger.peek("k"), None);

        ledger.clear_faults();
        ledger.reject_writes_to("k");
        let err = ledger.set("k", b"v").expect_err("write should be rejected");
        assert!(matches!(err, LedgerError::Rejected(_)));

        ledger.clear_faults();
        ledger.seed("r", b"x".to_vec());
        ledger.fail_reads_from("r");
        assert!(ledger.get("r").is_err());
    }

    #[test]
    fn availability_is_switchable() {
        let ledger = MemoryLedger::new();
        assert!(ledger.is_available());
        ledger.set_available(false);
        assert!(!ledger.is_available());
    }
}
