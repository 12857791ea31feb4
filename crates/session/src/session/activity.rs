// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Throttled capture of user-presence signals.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::session::tracker::SessionTracker;
use crate::store::{self, SessionStore};

/// Records "user is present" at most once per throttle window.
pub struct ActivityRecorder {
    tracker: Arc<SessionTracker>,
    store: Arc<dyn SessionStore>,
    throttle_ms: u64,
    last_write: Mutex<Option<u64>>,
    active: AtomicBool,
}

impl ActivityRecorder {
    pub fn new(tracker: Arc<SessionTracker>, store: Arc<dyn SessionStore>, throttle: Duration) -> Self {
        Self {
            tracker,
            store,
            throttle_ms: throttle.as_millis() as u64,
            last_write: Mutex::new(None),
            active: AtomicBool::new(false),
        }
    }

    /// Resume recording with a fresh throttle window.
    pub fn start(&self) {
        *self.last_write.lock() = None;
        self.active.store(true, Ordering::SeqCst);
    }

    /// Ignore further signals until the next [`start`](Self::start).
    pub fn stop(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Handle a raw interaction event. Returns whether a write happened.
    pub fn record(&self) -> bool {
        self.write(false)
    }

    /// Record regardless of the throttle window (session start, "keep session").
    pub fn record_now(&self) -> bool {
        self.write(true)
    }

    fn write(&self, force: bool) -> bool {
        if !self.is_active() {
            return false;
        }
        let now = self.tracker.now_ms();
        {
            let mut last = self.last_write.lock();
            if let Some(prev) = *last {
                if !force && now.saturating_sub(prev) < self.throttle_ms {
                    return false;
                }
            }
            *last = Some(now);
        }
        self.tracker.note_activity(now);
        store::save_or_warn(self.store.as_ref(), store::LAST_ACTIVITY, &now);
        tracing::trace!(at = now, "activity recorded");
        true
    }
}

#[cfg(test)]
#[path = "activity_tests.rs"]
mod tests;
