// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Single-flight refresh coordinator.
//!
//! The first caller to find no refresh in flight starts the network call on a
//! detached task; everyone arriving before it settles subscribes to the same
//! broadcast. The coordinator never navigates or clears session state: it
//! persists new credentials on success and reports the outcome, nothing else.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::error::{HttpError, RefreshFailure};
use crate::refresh::{RefreshClient, Refresher};
use crate::session::tracker::SessionTracker;
use crate::session::{AuthResponse, RefreshOutcome, SessionEvent};
use crate::store::{self, SessionStore};

struct Inner {
    client: Arc<dyn RefreshClient>,
    store: Arc<dyn SessionStore>,
    tracker: Arc<SessionTracker>,
    event_tx: broadcast::Sender<SessionEvent>,
    /// Sender for the refresh currently in flight, if any.
    in_flight: Mutex<Option<broadcast::Sender<RefreshOutcome>>>,
}

/// Cheap to clone; clones share the in-flight state.
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<Inner>,
}

impl RefreshCoordinator {
    pub fn new(
        client: Arc<dyn RefreshClient>,
        store: Arc<dyn SessionStore>,
        tracker: Arc<SessionTracker>,
        event_tx: broadcast::Sender<SessionEvent>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner { client, store, tracker, event_tx, in_flight: Mutex::new(None) }),
        }
    }

    pub fn is_in_flight(&self) -> bool {
        self.inner.in_flight.lock().is_some()
    }

    /// Refresh credentials, joining the in-flight refresh if there is one.
    pub async fn refresh(&self) -> RefreshOutcome {
        let mut rx = {
            let mut slot = self.inner.in_flight.lock();
            match slot.as_ref() {
                Some(tx) => {
                    tracing::debug!("joining in-flight refresh");
                    tx.subscribe()
                }
                None => {
                    let (tx, rx) = broadcast::channel(1);
                    *slot = Some(tx);
                    tokio::spawn(Arc::clone(&self.inner).run());
                    rx
                }
            }
        };
        match rx.recv().await {
            Ok(outcome) => outcome,
            // The refresh task went away without reporting (runtime shutdown).
            Err(_) => Err(RefreshFailure::Network),
        }
    }
}

#[async_trait]
impl Refresher for RefreshCoordinator {
    async fn refresh(&self) -> RefreshOutcome {
        RefreshCoordinator::refresh(self).await
    }
}

impl Inner {
    async fn run(self: Arc<Self>) {
        let generation = self.tracker.generation();
        // The attempt runs on its own task so that a panic in it still
        // settles the flight below.
        let worker = Arc::clone(&self);
        let outcome = match tokio::spawn(async move { worker.perform(generation).await }).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(err = %e, "refresh attempt aborted");
                Err(RefreshFailure::Network)
            }
        };

        // Clear in-flight before broadcasting so a caller woken by this
        // outcome can start a new refresh.
        let tx = self.in_flight.lock().take();
        let event = match &outcome {
            Ok(_) => SessionEvent::Refreshed,
            Err(reason) => SessionEvent::RefreshFailed { reason: *reason },
        };
        let _ = self.event_tx.send(event);
        if let Some(tx) = tx {
            let _ = tx.send(outcome);
        }
    }

    async fn perform(&self, generation: u64) -> RefreshOutcome {
        let Some(refresh_token) =
            store::load_or_warn::<String>(self.store.as_ref(), store::REFRESH_TOKEN)
        else {
            tracing::info!("no refresh token stored, cannot refresh");
            return Err(RefreshFailure::MissingToken);
        };

        let response = match self.client.refresh(&refresh_token).await {
            Ok(r) => r,
            Err(e) => {
                let failure = classify(&e);
                tracing::warn!(err = %e, failure = %failure, "credential refresh failed");
                return Err(failure);
            }
        };

        // Checked and written under the tracker's transition lock, so a
        // concurrent termination either precedes the check or follows the writes.
        if self.tracker.run_if_current(generation, || self.persist(&response)).is_none() {
            tracing::debug!("session ended during refresh, discarding new credentials");
            return Err(RefreshFailure::SessionEnded);
        }
        tracing::info!("credentials refreshed");
        Ok(response.credentials())
    }

    fn persist(&self, response: &AuthResponse) {
        let store = self.store.as_ref();
        store::save_or_warn(store, store::ACCESS_TOKEN, &response.access_token);
        if let Some(ref rt) = response.refresh_token {
            store::save_or_warn(store, store::REFRESH_TOKEN, rt);
        }
        if let Some(ref user) = response.user {
            store::save_or_warn(store, store::USER, user);
        }
        if let Some(info) = response.session_info(self.tracker.info(), self.tracker.now_ms()) {
            self.tracker.adopt(info);
        }
    }
}

/// A server answer means the credential was refused; anything else is the network.
fn classify(err: &anyhow::Error) -> RefreshFailure {
    match err.downcast_ref::<HttpError>() {
        Some(HttpError::Unauthorized { .. } | HttpError::Status { .. }) => RefreshFailure::Rejected,
        _ => RefreshFailure::Network,
    }
}

#[cfg(test)]
#[path = "coordinator_tests.rs"]
mod tests;
