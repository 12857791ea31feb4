// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session manager: one explicitly constructed owner for the whole lifecycle
//! of a context (tracker, recorder, poller, coordinator, retry layer,
//! termination).

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::SessionConfig;
use crate::error::RefreshFailure;
use crate::http::{AuthenticatedClient, Transport};
use crate::refresh::{RefreshClient, RefreshCoordinator, Refresher};
use crate::session::activity::ActivityRecorder;
use crate::session::clock::Clock;
use crate::session::poller::{spawn_expiration_poller, PollerDeps};
use crate::session::terminate::{TerminationDeps, TerminationHandler};
use crate::session::tracker::{SessionTracker, TrackerDefaults};
use crate::session::{AuthResponse, EndReason, RefreshOutcome, SessionEvent, SessionInfo, SessionPhase};
use crate::store::{self, SessionStore};
use crate::ui::{Navigator, WarningNotifier};

/// External collaborators, injected once at construction.
pub struct Collaborators {
    pub store: Arc<dyn SessionStore>,
    pub transport: Arc<dyn Transport>,
    pub refresh_client: Arc<dyn RefreshClient>,
    pub notifier: Arc<dyn WarningNotifier>,
    pub navigator: Arc<dyn Navigator>,
    pub clock: Arc<dyn Clock>,
}

/// Point-in-time view of the session, for status output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionStatus {
    pub phase: SessionPhase,
    pub monitoring: bool,
    pub has_access_token: bool,
    pub has_refresh_token: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<SessionInfo>,
    pub last_activity_ms: u64,
    pub idle_ms: u64,
    pub inactivity_remaining_ms: u64,
    /// `None` when the access credential has no known expiry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_remaining_ms: Option<u64>,
}

pub struct SessionManager {
    poll_interval: std::time::Duration,
    store: Arc<dyn SessionStore>,
    tracker: Arc<SessionTracker>,
    recorder: Arc<ActivityRecorder>,
    coordinator: RefreshCoordinator,
    terminator: Arc<TerminationHandler>,
    notifier: Arc<dyn WarningNotifier>,
    http: AuthenticatedClient,
    phase: Arc<watch::Sender<SessionPhase>>,
    event_tx: broadcast::Sender<SessionEvent>,
}

impl SessionManager {
    pub fn new(config: &SessionConfig, c: Collaborators) -> Self {
        let (event_tx, _) = broadcast::channel(64);
        let (phase, _) = watch::channel(SessionPhase::Active);
        let phase = Arc::new(phase);

        let tracker = Arc::new(SessionTracker::new(
            Arc::clone(&c.store),
            Arc::clone(&c.clock),
            TrackerDefaults::from(config),
        ));
        let recorder = Arc::new(ActivityRecorder::new(
            Arc::clone(&tracker),
            Arc::clone(&c.store),
            config.activity_throttle(),
        ));
        let coordinator = RefreshCoordinator::new(
            Arc::clone(&c.refresh_client),
            Arc::clone(&c.store),
            Arc::clone(&tracker),
            event_tx.clone(),
        );
        let terminator = Arc::new(TerminationHandler::new(TerminationDeps {
            store: Arc::clone(&c.store),
            tracker: Arc::clone(&tracker),
            recorder: Arc::clone(&recorder),
            notifier: Arc::clone(&c.notifier),
            navigator: Arc::clone(&c.navigator),
            phase: Arc::clone(&phase),
            event_tx: event_tx.clone(),
        }));
        let http = AuthenticatedClient::new(
            Arc::clone(&c.transport),
            Arc::clone(&c.store),
            Arc::new(coordinator.clone()),
        );

        Self {
            poll_interval: config.poll_interval(),
            store: c.store,
            tracker,
            recorder,
            coordinator,
            terminator,
            notifier: c.notifier,
            http,
            phase,
            event_tx,
        }
    }

    /// Install the session returned by login or registration and start monitoring.
    pub fn establish(&self, response: &AuthResponse) {
        let store = self.store.as_ref();
        store::save_or_warn(store, store::ACCESS_TOKEN, &response.access_token);
        match response.refresh_token {
            Some(ref rt) => store::save_or_warn(store, store::REFRESH_TOKEN, rt),
            None => store::remove_or_warn(store, store::REFRESH_TOKEN),
        }
        if let Some(ref user) = response.user {
            store::save_or_warn(store, store::USER, user);
        }

        let info = response.session_info(None, self.tracker.now_ms());
        self.initialize(info);
        let _ = self.event_tx.send(SessionEvent::Established);
        self.start_monitoring();
        tracing::info!(has_metadata = info.is_some(), "session established");
    }

    /// Begin tracking a session: adopt `info` or load the persisted copy,
    /// and record activity once.
    pub fn initialize(&self, info: Option<SessionInfo>) {
        self.terminator.reset();
        self.tracker.begin();
        self.tracker.initialize(info);
        self.recorder.start();
        self.recorder.record_now();
        self.phase.send_replace(SessionPhase::Active);
    }

    /// Spawn the expiration poller and the refresh-failure listener.
    ///
    /// Replaces any poller already running for this manager.
    pub fn start_monitoring(&self) {
        let cancel = CancellationToken::new();
        self.terminator.arm(cancel.clone());

        let deps = PollerDeps {
            tracker: Arc::clone(&self.tracker),
            recorder: Arc::clone(&self.recorder),
            refresher: Arc::new(self.coordinator.clone()),
            notifier: Arc::clone(&self.notifier),
            terminator: Arc::clone(&self.terminator),
            phase: Arc::clone(&self.phase),
            event_tx: self.event_tx.clone(),
        };
        spawn_expiration_poller(deps, self.poll_interval, cancel.clone());
        spawn_refresh_failure_listener(
            self.event_tx.subscribe(),
            Arc::clone(&self.terminator),
            cancel,
        );
    }

    /// Cancel the poller and activity capture and close any open warning.
    /// An in-flight refresh is left to finish.
    pub fn stop_monitoring(&self) {
        self.terminator.disarm();
    }

    pub fn is_monitoring(&self) -> bool {
        self.terminator.is_monitoring()
    }

    /// Feed a raw interaction event (pointer, key, touch, scroll).
    pub fn record_activity(&self) -> bool {
        self.recorder.record()
    }

    /// End the session because the user asked to.
    pub fn logout(&self) -> bool {
        self.terminate(EndReason::UserLogout)
    }

    pub fn terminate(&self, reason: EndReason) -> bool {
        self.terminator.terminate(reason)
    }

    /// Refresh credentials through the single-flight coordinator.
    pub async fn refresh(&self) -> RefreshOutcome {
        Refresher::refresh(&self.coordinator).await
    }

    /// The single-flight coordinator shared by the poller and [`http`](Self::http).
    pub fn refresher(&self) -> &RefreshCoordinator {
        &self.coordinator
    }

    /// The authenticated API client (bearer + 401 recovery).
    pub fn http(&self) -> &AuthenticatedClient {
        &self.http
    }

    pub fn tracker(&self) -> &SessionTracker {
        &self.tracker
    }

    pub fn phase(&self) -> SessionPhase {
        *self.phase.borrow()
    }

    pub fn watch_phase(&self) -> watch::Receiver<SessionPhase> {
        self.phase.subscribe()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    /// Whether an access credential is stored.
    pub fn has_session(&self) -> bool {
        store::load_or_warn::<String>(self.store.as_ref(), store::ACCESS_TOKEN).is_some()
    }

    /// Take (and forget) the remembered return destination.
    pub fn take_return_url(&self) -> Option<String> {
        let url = store::load_or_warn::<String>(self.store.as_ref(), store::RETURN_URL)?;
        store::remove_or_warn(self.store.as_ref(), store::RETURN_URL);
        Some(url)
    }

    pub fn status(&self) -> SessionStatus {
        let store = self.store.as_ref();
        let tracker = &self.tracker;
        let now = tracker.now_ms();
        SessionStatus {
            phase: self.phase(),
            monitoring: self.is_monitoring(),
            has_access_token: store::load_or_warn::<String>(store, store::ACCESS_TOKEN).is_some(),
            has_refresh_token: store::load_or_warn::<String>(store, store::REFRESH_TOKEN).is_some(),
            info: tracker.info(),
            last_activity_ms: tracker.last_activity_ms(),
            idle_ms: tracker.idle_ms(now),
            inactivity_remaining_ms: tracker.inactivity_remaining_ms(now),
            token_remaining_ms: tracker.token_remaining_ms(now),
        }
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.terminator.disarm();
    }
}

/// End the session when any refresh (poller- or 401-driven) fails while it is
/// live. Runs until `cancel` fires.
fn spawn_refresh_failure_listener(
    mut event_rx: broadcast::Receiver<SessionEvent>,
    terminator: Arc<TerminationHandler>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                event = event_rx.recv() => event,
            };
            match event {
                Ok(SessionEvent::RefreshFailed { reason }) if reason != RefreshFailure::SessionEnded => {
                    if !terminator.is_terminated() {
                        tracing::info!(%reason, "refresh failed, ending session");
                        terminator.terminate(EndReason::TokenExpired);
                    }
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::debug!(skipped = n, "refresh listener lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
