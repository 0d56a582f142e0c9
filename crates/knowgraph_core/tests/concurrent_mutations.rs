use knowgraph_core::codec::decode_index;
use knowgraph_core::{
    CreateNodeRequest, EnvelopeTransform, Ledger, LedgerResult, MemoryLedger, NodeKind,
    NodeStore, Session, StoreConfig, StoreError, SyncOperation, SyncState, INDEX_KEY,
};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

/// Parks the first matching `set` until the test releases it.
struct GatedLedger {
    inner: MemoryLedger,
    gated_key: Option<&'static str>,
    gate: Mutex<Option<Gate>>,
}

struct Gate {
    entered: Sender<()>,
    release: Receiver<()>,
}

/// Handles the test keeps: wait for the parked write, then let it go.
struct GateControl {
    entered: Receiver<()>,
    release: Sender<()>,
}

impl GateControl {
    fn wait_until_parked(&self) {
        self.entered
            .recv_timeout(Duration::from_secs(10))
            .expect("write should reach the gate");
    }

    fn open(&self) {
        self.release.send(()).expect("parked write is waiting");
    }
}

impl GatedLedger {
    /// `gated_key = None` parks the first write to any key.
    fn new(gated_key: Option<&'static str>) -> (Self, GateControl) {
        let (entered_tx, entered_rx) = channel();
        let (release_tx, release_rx) = channel();
        let ledger = Self {
            inner: MemoryLedger::new(),
            gated_key,
            gate: Mutex::new(Some(Gate {
                entered: entered_tx,
                release: release_rx,
            })),
        };
        let control = GateControl {
            entered: entered_rx,
            release: release_tx,
        };
        (ledger, control)
    }

    fn take_gate(&self, key: &str) -> Option<Gate> {
        if self.gated_key.is_some_and(|gated| gated != key) {
            return None;
        }
        self.gate.lock().unwrap().take()
    }
}

impl Ledger for GatedLedger {
    fn get(&self, key: &str) -> LedgerResult<Vec<u8>> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &[u8]) -> LedgerResult<()> {
        if let Some(gate) = self.take_gate(key) {
            gate.entered.send(()).unwrap();
            gate.release.recv().unwrap();
        }
        self.inner.set(key, value)
    }

    fn is_available(&self) -> bool {
        self.inner.is_available()
    }
}

fn config(lock_timeout_ms: u64) -> StoreConfig {
    StoreConfig {
        mutation_lock_timeout_ms: lock_timeout_ms,
        ..StoreConfig::default()
    }
}

fn request(content: &str) -> CreateNodeRequest {
    CreateNodeRequest::new(NodeKind::Concept, content)
}

#[test]
fn refresh_during_create_does_not_hide_the_create_outcome() {
    let (ledger, gate) = GatedLedger::new(Some(INDEX_KEY));
    ledger.inner.fail_writes_to(INDEX_KEY);
    let store = NodeStore::new(ledger, EnvelopeTransform, StoreConfig::default());
    let reporter = store.reporter();
    let events = reporter.subscribe();
    let session = Session::connected("0xabc");

    let create_result = thread::scope(|scope| {
        let create = scope.spawn(|| store.create(&session, &request("slow")));
        gate.wait_until_parked();

        let listed = store.list().unwrap();
        assert!(listed.is_empty());

        gate.open();
        create.join().unwrap()
    });

    let err = create_result.unwrap_err();
    assert_eq!(err.code(), "partial_index_failure");

    let seen: Vec<(SyncState, Option<SyncOperation>)> = events
        .try_iter()
        .map(|event| (event.state, event.operation))
        .collect();
    assert_eq!(
        seen,
        vec![
            (SyncState::Pending, Some(SyncOperation::Create)),
            (SyncState::Pending, Some(SyncOperation::Refresh)),
            (SyncState::Success, Some(SyncOperation::Refresh)),
            (SyncState::Error, Some(SyncOperation::Create)),
        ]
    );
    let last = reporter.snapshot();
    assert_eq!(last.state, SyncState::Error);
    assert!(last.message.starts_with("Creation failed: "));
    assert_eq!(reporter.pending_count(), 0);
}

#[test]
fn second_create_times_out_busy_without_touching_the_ledger() {
    let (ledger, gate) = GatedLedger::new(None);
    let store = NodeStore::new(ledger, EnvelopeTransform, config(20));
    let session = Session::connected("0xabc");

    let first = thread::scope(|scope| {
        let first = scope.spawn(|| store.create(&session, &request("first")));
        gate.wait_until_parked();

        let gets_before = store.ledger().inner.get_calls();
        let sets_before = store.ledger().inner.set_calls();
        let err = store.create(&session, &request("second")).unwrap_err();
        assert!(matches!(err, StoreError::Busy(waited) if waited == Duration::from_millis(20)));
        assert_eq!(store.ledger().inner.get_calls(), gets_before);
        assert_eq!(store.ledger().inner.set_calls(), sets_before);

        gate.open();
        first.join().unwrap()
    });

    let first = first.unwrap();
    let index = decode_index(&store.ledger().inner.peek(INDEX_KEY).unwrap()).unwrap();
    assert_eq!(index, vec![first.id]);
}

#[test]
fn waiting_create_runs_after_the_parked_one_finishes_both_phases() {
    let (ledger, gate) = GatedLedger::new(None);
    let store = NodeStore::new(ledger, EnvelopeTransform, config(10_000));
    let session = Session::connected("0xabc");

    let (first, second) = thread::scope(|scope| {
        let first = scope.spawn(|| store.create(&session, &request("first")));
        gate.wait_until_parked();

        let second = scope.spawn(|| store.create(&session, &request("second")));
        thread::sleep(Duration::from_millis(50));
        assert_eq!(store.ledger().inner.get_calls(), 0);
        assert_eq!(store.ledger().inner.set_calls(), 0);
        assert!(store.ledger().inner.peek(INDEX_KEY).is_none());

        gate.open();
        (first.join().unwrap(), second.join().unwrap())
    });

    let first = first.unwrap();
    let second = second.unwrap();
    let index = decode_index(&store.ledger().inner.peek(INDEX_KEY).unwrap()).unwrap();
    assert_eq!(index, vec![first.id, second.id]);
    assert_eq!(store.list().unwrap().len(), 2);
}
