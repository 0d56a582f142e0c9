//! Sync status state machine.
//!
//! `idle -> pending -> success|error -> idle`. The return to idle is driven
//! by the caller's clock through `reset_if_elapsed`, so no timer lives inside
//! the store.
//!
//! # Invariants
//! - Every `begin` hands out a `StatusTicket`; each ticket is finished at most
//!   once and its outcome is always published, even when other operations
//!   started in between.
//! - No reset to idle happens while any ticket is still pending.

use log::debug;
use std::collections::BTreeMap;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Visible lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Pending,
    Success,
    Error,
}

impl SyncState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

/// Store operation being reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOperation {
    Create,
    Archive,
    Refresh,
    Recover,
}

impl SyncOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Archive => "archive",
            Self::Refresh => "refresh",
            Self::Recover => "recover",
        }
    }

    /// Noun used in user-facing failure messages.
    pub fn failure_label(self) -> &'static str {
        match self {
            Self::Create => "Creation",
            Self::Archive => "Archive",
            Self::Refresh => "Refresh",
            Self::Recover => "Recovery",
        }
    }
}

/// Handle for one reported operation, returned by `StatusReporter::begin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StatusTicket(u64);

/// One observed state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub state: SyncState,
    pub operation: Option<SyncOperation>,
    pub message: String,
    pub changed_at: Instant,
}

impl StatusSnapshot {
    fn idle(at: Instant) -> Self {
        Self {
            state: SyncState::Idle,
            operation: None,
            message: String::new(),
            changed_at: at,
        }
    }
}

struct ReporterState {
    current: StatusSnapshot,
    subscribers: Vec<Sender<StatusSnapshot>>,
    next_ticket: u64,
    in_flight: BTreeMap<StatusTicket, SyncOperation>,
}

/// Observable status machine shared between the store and its callers.
pub struct StatusReporter {
    state: Mutex<ReporterState>,
    success_display: Duration,
    error_display: Duration,
}

impl StatusReporter {
    pub fn new(success_display: Duration, error_display: Duration) -> Self {
        Self {
            state: Mutex::new(ReporterState {
                current: StatusSnapshot::idle(Instant::now()),
                subscribers: Vec::new(),
                next_ticket: 0,
                in_flight: BTreeMap::new(),
            }),
            success_display,
            error_display,
        }
    }

    /// Returns a receiver for every future transition.
    pub fn subscribe(&self) -> Receiver<StatusSnapshot> {
        let (sender, receiver) = channel();
        self.lock().subscribers.push(sender);
        receiver
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        self.lock().current.clone()
    }

    /// Number of operations begun but not yet finished.
    pub fn pending_count(&self) -> usize {
        self.lock().in_flight.len()
    }

    /// Enters `pending` for `operation` and returns its ticket.
    pub fn begin(&self, operation: SyncOperation, message: impl Into<String>) -> StatusTicket {
        let mut state = self.lock();
        let ticket = StatusTicket(state.next_ticket);
        state.next_ticket += 1;
        state.in_flight.insert(ticket, operation);
        publish(
            &mut state,
            StatusSnapshot {
                state: SyncState::Pending,
                operation: Some(operation),
                message: message.into(),
                changed_at: Instant::now(),
            },
        );
        ticket
    }

    /// Publishes success for `ticket`. Ignored when the ticket already finished.
    pub fn succeed(&self, ticket: StatusTicket, message: impl Into<String>) -> bool {
        self.finish(ticket, SyncState::Success, message.into())
    }

    /// Publishes an error for `ticket`. Ignored when the ticket already finished.
    pub fn fail(&self, ticket: StatusTicket, message: impl Into<String>) -> bool {
        self.finish(ticket, SyncState::Error, message.into())
    }

    /// Returns to `idle` once the success/error display interval has passed
    /// and nothing is pending.
    ///
    /// Returns `true` when a reset happened.
    pub fn reset_if_elapsed(&self, now: Instant) -> bool {
        let mut state = self.lock();
        if !state.in_flight.is_empty() {
            return false;
        }
        let display = match state.current.state {
            SyncState::Success => self.success_display,
            SyncState::Error => self.error_display,
            SyncState::Idle | SyncState::Pending => return false,
        };
        if now.saturating_duration_since(state.current.changed_at) < display {
            return false;
        }
        publish(&mut state, StatusSnapshot::idle(now));
        true
    }

    fn finish(&self, ticket: StatusTicket, next: SyncState, message: String) -> bool {
        let mut state = self.lock();
        let Some(operation) = state.in_flight.remove(&ticket) else {
            debug!(
                "event=status_transition module=sync status=skip ticket={} reason=finished",
                ticket.0
            );
            return false;
        };
        publish(
            &mut state,
            StatusSnapshot {
                state: next,
                operation: Some(operation),
                message,
                changed_at: Instant::now(),
            },
        );
        true
    }

    fn lock(&self) -> MutexGuard<'_, ReporterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn publish(state: &mut ReporterState, next: StatusSnapshot) {
    state.current = next;
    let snapshot = &state.current;
    state
        .subscribers
        .retain(|subscriber| subscriber.send(snapshot.clone()).is_ok());
}

#[cfg(test)]
mod tests {
    use super::{StatusReporter, SyncOperation, SyncState};
    use std::time::{Duration, Instant};

    fn reporter() -> StatusReporter {
        StatusReporter::new(Duration::from_millis(2_000), Duration::from_millis(3_000))
    }

    #[test]
    fn starts_idle() {
        let snapshot = reporter().snapshot();
        assert_eq!(snapshot.state, SyncState::Idle);
        assert!(snapshot.message.is_empty());
    }

    #[test]
    fn subscribers_see_every_transition() {
        let reporter = reporter();
        let events = reporter.subscribe();
        let ticket = reporter.begin(SyncOperation::Create, "Creating knowledge node...");
        assert!(reporter.succeed(ticket, "Knowledge node created"));

        let states: Vec<SyncState> = events.try_iter().map(|event| event.state).collect();
        assert_eq!(states, vec![SyncState::Pending, SyncState::Success]);
    }

    #[test]
    fn ticket_finishes_once() {
        let reporter = reporter();
        let ticket = reporter.begin(SyncOperation::Archive, "Archiving...");
        assert!(reporter.fail(ticket, "Archive failed: boom"));
        assert_eq!(reporter.snapshot().state, SyncState::Error);
        assert!(!reporter.succeed(ticket, "late"));
        assert_eq!(reporter.snapshot().state, SyncState::Error);
    }

    #[test]
    fn overlapping_operations_each_publish_their_outcome() {
        let reporter = reporter();
        let events = reporter.subscribe();
        let create = reporter.begin(SyncOperation::Create, "Creating...");
        let refresh = reporter.begin(SyncOperation::Refresh, "Refreshing...");
        assert!(reporter.succeed(refresh, "Loaded 0 knowledge nodes"));
        assert!(reporter.fail(create, "Creation failed: boom"));

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
        assert_eq!(reporter.pending_count(), 0);
    }

    #[test]
    fn success_and_error_reset_after_their_display_interval() {
        let reporter = reporter();
        let ticket = reporter.begin(SyncOperation::Refresh, "Refreshing...");
        reporter.succeed(ticket, "ok");
        let changed = reporter.snapshot().changed_at;
        assert!(!reporter.reset_if_elapsed(changed + Duration::from_millis(1_999)));
        assert!(reporter.reset_if_elapsed(changed + Duration::from_millis(2_000)));
        assert_eq!(reporter.snapshot().state, SyncState::Idle);

        let ticket = reporter.begin(SyncOperation::Refresh, "Refreshing...");
        reporter.fail(ticket, "Refresh failed");
        let changed = reporter.snapshot().changed_at;
        assert!(!reporter.reset_if_elapsed(changed + Duration::from_millis(2_500)));
        assert!(reporter.reset_if_elapsed(changed + Duration::from_millis(3_000)));
    }

    #[test]
    fn no_reset_while_another_operation_is_pending() {
        let reporter = reporter();
        let create = reporter.begin(SyncOperation::Create, "Creating...");
        let refresh = reporter.begin(SyncOperation::Refresh, "Refreshing...");
        reporter.succeed(refresh, "ok");

        let later = Instant::now() + Duration::from_secs(60);
        assert!(!reporter.reset_if_elapsed(later));
        assert_eq!(reporter.snapshot().state, SyncState::Success);

        reporter.succeed(create, "Knowledge node created");
        let changed = reporter.snapshot().changed_at;
        assert!(reporter.reset_if_elapsed(changed + Duration::from_millis(2_000)));
    }

    #[test]
    fn pending_never_auto_resets() {
        let reporter = reporter();
        reporter.begin(SyncOperation::Create, "Creating...");
        assert!(!reporter.reset_if_elapsed(Instant::now() + Duration::from_secs(60)));
        assert_eq!(reporter.snapshot().state, SyncState::Pending);
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let reporter = reporter();
        drop(reporter.subscribe());
        reporter.begin(SyncOperation::Create, "Creating...");
        assert!(reporter.lock().subscribers.is_empty());
    }
}
