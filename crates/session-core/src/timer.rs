//! Cancellable one-shot timers keyed by call id and timer kind
//!
//! At most one timer of each kind is armed per call. Arming again replaces
//! (and aborts) the previous timer; cancelling is always safe, including
//! after the timer has fired. A fired callback only runs if its timer is
//! still the one registered for the key.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::AbortHandle;
use tracing::debug;

use crate::types::CallId;

/// What a timer bounds
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum TimerKind {
    /// Time allowed for a call to be answered
    Ring,
    /// Time a closed channel waits for the peer's termination notice
    CloseGrace,
}

type TimerKey = (CallId, TimerKind);

/// Handle to an armed timer
#[derive(Debug)]
struct ArmedTimer {
    id: u64,
    handle: AbortHandle,
}

/// One-shot timer service
#[derive(Debug, Clone, Default)]
pub struct TimerService {
    timers: Arc<DashMap<TimerKey, ArmedTimer>>,
    next_id: Arc<AtomicU64>,
}

impl TimerService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a `kind` timer for `scope`, replacing any such timer already armed
    pub fn arm<F>(&self, scope: CallId, kind: TimerKind, after: Duration, on_fire: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let timers = self.timers.clone();
        let key = (scope, kind);
        let task_key = key.clone();

        // Hold the entry while spawning so a zero-length timer cannot fire
        // before it is registered
        let entry = self.timers.entry(key.clone());
        let task = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            // Only the timer still registered for the key may fire
            if timers.remove_if(&task_key, |_, armed| armed.id == id).is_some() {
                debug!("{:?} timer {} fired for call {}", task_key.1, id, task_key.0);
                on_fire();
            }
        });

        let armed = ArmedTimer {
            id,
            handle: task.abort_handle(),
        };
        let previous = match entry {
            Entry::Occupied(mut occupied) => Some(occupied.insert(armed)),
            Entry::Vacant(vacant) => {
                vacant.insert(armed);
                None
            }
        };
        if let Some(previous) = previous {
            previous.handle.abort();
            debug!("Replaced {:?} timer {} for call {}", key.1, previous.id, key.0);
        }
        debug!("Armed {:?} timer {} for call {} ({:?})", key.1, id, key.0, after);
    }

    /// Cancel the `kind` timer for `scope`. Returns true if a pending timer was cancelled
    pub fn cancel(&self, scope: &CallId, kind: TimerKind) -> bool {
        match self.timers.remove(&(scope.clone(), kind)) {
            Some((_, armed)) => {
                armed.handle.abort();
                debug!("Cancelled {:?} timer {} for call {}", kind, armed.id, scope);
                true
            }
            None => false,
        }
    }

    /// Cancel every timer armed for `scope`; returns how many were pending
    pub fn cancel_all(&self, scope: &CallId) -> usize {
        let mut cancelled = 0;
        self.timers.retain(|(call_id, _), armed| {
            if call_id != scope {
                return true;
            }
            armed.handle.abort();
            cancelled += 1;
            false
        });
        cancelled
    }

    pub fn is_armed(&self, scope: &CallId, kind: TimerKind) -> bool {
        self.timers.contains_key(&(scope.clone(), kind))
    }

    pub fn armed_count(&self) -> usize {
        self.timers.len()
    }
}
