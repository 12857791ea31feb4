// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session termination: stop monitoring, clear state, route to the
//! "session ended" surface.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;

use crate::session::activity::ActivityRecorder;
use crate::session::tracker::SessionTracker;
use crate::session::{EndReason, SessionEvent, SessionPhase};
use crate::store::{self, SessionStore};
use crate::ui::{Navigator, WarningNotifier, SESSION_ENDED_ROUTE};

/// Path fragments never remembered as a return destination.
pub const SENSITIVE_ROUTE_PATTERNS: &[&str] = &["settings", "profile/edit", "payment", "checkout"];

/// Whether `location` must not be offered again after re-login.
pub fn is_sensitive_route(location: &str) -> bool {
    let lower = location.to_lowercase();
    SENSITIVE_ROUTE_PATTERNS.iter().any(|p| lower.contains(p))
}

/// Collaborators and shared state the handler acts on.
pub struct TerminationDeps {
    pub store: Arc<dyn SessionStore>,
    pub tracker: Arc<SessionTracker>,
    pub recorder: Arc<ActivityRecorder>,
    pub notifier: Arc<dyn WarningNotifier>,
    pub navigator: Arc<dyn Navigator>,
    pub phase: Arc<watch::Sender<SessionPhase>>,
    pub event_tx: broadcast::Sender<SessionEvent>,
}

/// Ends sessions. Also owns the poller's cancellation token so that every
/// stop path goes through one place.
pub struct TerminationHandler {
    deps: TerminationDeps,
    monitor: Mutex<Option<CancellationToken>>,
    terminated: AtomicBool,
}

impl TerminationHandler {
    pub fn new(deps: TerminationDeps) -> Self {
        Self { deps, monitor: Mutex::new(None), terminated: AtomicBool::new(false) }
    }

    /// Install the token of a freshly started poller, cancelling any previous one.
    pub fn arm(&self, token: CancellationToken) {
        if let Some(prev) = self.monitor.lock().replace(token) {
            prev.cancel();
        }
    }

    /// Cancel the poller, stop activity capture and close any open warning.
    ///
    /// An in-flight refresh is left to finish on its own.
    pub fn disarm(&self) {
        if let Some(token) = self.monitor.lock().take() {
            token.cancel();
        }
        self.deps.recorder.stop();
        self.deps.notifier.dismiss();
    }

    pub fn is_monitoring(&self) -> bool {
        self.monitor.lock().as_ref().is_some_and(|t| !t.is_cancelled())
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    /// Allow the next [`terminate`](Self::terminate) to run (new session).
    pub fn reset(&self) {
        self.terminated.store(false, Ordering::SeqCst);
    }

    /// End the session with `reason`. Returns `false` if it had already ended.
    pub fn terminate(&self, reason: EndReason) -> bool {
        if self.terminated.swap(true, Ordering::SeqCst) {
            tracing::debug!(%reason, "session already terminated");
            return false;
        }
        let deps = &self.deps;

        self.disarm();

        // Ending the generation first stops a late refresh from writing
        // credentials back after the keys are gone.
        deps.tracker.clear();
        for key in store::SESSION_KEYS {
            store::remove_or_warn(deps.store.as_ref(), key);
        }

        match deps.navigator.current_location() {
            Some(location) if !is_sensitive_route(&location) => {
                store::save_or_warn(deps.store.as_ref(), store::RETURN_URL, &location);
            }
            location => {
                if let Some(location) = location {
                    tracing::debug!(%location, "not remembering sensitive return destination");
                }
                // A destination left by an earlier session must not outlive this one.
                store::remove_or_warn(deps.store.as_ref(), store::RETURN_URL);
            }
        }

        deps.phase.send_replace(SessionPhase::Expired(reason));
        let _ = deps.event_tx.send(SessionEvent::Ended { reason });
        deps.navigator.go_to(SESSION_ENDED_ROUTE, &[("reason", reason.as_str())]);
        tracing::info!(%reason, "session terminated");
        true
    }
}

#[cfg(test)]
#[path = "terminate_tests.rs"]
mod tests;
