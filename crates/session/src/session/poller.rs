// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Expiration poller: the recurring state machine that warns, refreshes or
//! terminates.
//!
//! Each tick runs one cycle, and at most one of {inactivity expiry, warning,
//! refresh} fires per cycle. While a warning is open its deadline is awaited
//! alongside the timer, so an unanswered prompt ends the session on time.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::refresh::Refresher;
use crate::session::activity::ActivityRecorder;
use crate::session::terminate::TerminationHandler;
use crate::session::tracker::SessionTracker;
use crate::session::{remaining_minutes, EndReason, SessionEvent, SessionPhase};
use crate::ui::{WarningChoice, WarningNotifier};

/// Inputs of one cycle, captured at a single instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    pub now_ms: u64,
    pub last_activity_ms: u64,
    pub inactivity_timeout_ms: u64,
    pub warning_before_ms: u64,
    pub expires_at: Option<u64>,
}

impl Snapshot {
    pub fn capture(tracker: &SessionTracker) -> Self {
        Self {
            now_ms: tracker.now_ms(),
            last_activity_ms: tracker.last_activity_ms(),
            inactivity_timeout_ms: tracker.inactivity_timeout_ms(),
            warning_before_ms: tracker.warning_before_ms(),
            expires_at: tracker.expires_at(),
        }
    }
}

/// Which countdown a warning was sized to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    Inactivity,
    Token,
}

/// What a cycle decided to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Continue,
    Expire(EndReason),
    Warn { kind: WarningKind, remaining_ms: u64 },
    Refresh,
}

/// Evaluate one cycle. Inactivity is checked before token liveness.
pub fn evaluate(s: &Snapshot, warning_shown: bool) -> Decision {
    let idle = s.now_ms.saturating_sub(s.last_activity_ms);
    if idle >= s.inactivity_timeout_ms {
        return Decision::Expire(EndReason::Inactivity);
    }

    let idle_remaining = s.inactivity_timeout_ms - idle;
    if idle_remaining <= s.warning_before_ms && !warning_shown {
        return Decision::Warn { kind: WarningKind::Inactivity, remaining_ms: idle_remaining };
    }

    if let Some(expires_at) = s.expires_at {
        if s.now_ms >= expires_at {
            return Decision::Refresh;
        }
        let token_remaining = expires_at - s.now_ms;
        if token_remaining <= s.warning_before_ms && !warning_shown {
            return Decision::Warn { kind: WarningKind::Token, remaining_ms: token_remaining };
        }
    }

    Decision::Continue
}

/// Collaborators the poller drives.
#[derive(Clone)]
pub struct PollerDeps {
    pub tracker: Arc<SessionTracker>,
    pub recorder: Arc<ActivityRecorder>,
    pub refresher: Arc<dyn Refresher>,
    pub notifier: Arc<dyn WarningNotifier>,
    pub terminator: Arc<TerminationHandler>,
    pub phase: Arc<watch::Sender<SessionPhase>>,
    pub event_tx: broadcast::Sender<SessionEvent>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

#[derive(Debug, Clone, Copy)]
struct OpenWarning {
    seq: u64,
    kind: WarningKind,
    deadline_ms: u64,
}

/// Spawn the poll loop. It runs until `cancel` fires or the session ends.
pub fn spawn_expiration_poller(
    deps: PollerDeps,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let (choice_tx, choice_rx) = mpsc::channel(4);
        let poller = ExpirationPoller {
            deps,
            cancel: cancel.clone(),
            choice_tx,
            warning: None,
            warning_seq: 0,
            prompt: None,
        };
        poller.run(interval, choice_rx).await;
    })
}

struct ExpirationPoller {
    deps: PollerDeps,
    cancel: CancellationToken,
    choice_tx: mpsc::Sender<(u64, WarningChoice)>,
    warning: Option<OpenWarning>,
    warning_seq: u64,
    prompt: Option<JoinHandle<()>>,
}

impl ExpirationPoller {
    async fn run(mut self, interval: Duration, mut choice_rx: mpsc::Receiver<(u64, WarningChoice)>) {
        let cancel = self.cancel.clone();
        let mut timer = tokio::time::interval_at(Instant::now() + interval, interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tracing::debug!(interval_ms = interval.as_millis() as u64, "expiration poller started");

        loop {
            let until_deadline = self.until_deadline();

            let flow = tokio::select! {
                biased;
                _ = cancel.cancelled() => Flow::Stop,
                Some((seq, choice)) = choice_rx.recv() => self.on_choice(seq, choice).await,
                _ = tokio::time::sleep(until_deadline.unwrap_or_default()), if until_deadline.is_some() => {
                    self.on_deadline()
                }
                _ = timer.tick() => self.cycle().await,
            };
            if flow == Flow::Stop {
                break;
            }
        }

        self.close_prompt();
        tracing::debug!("expiration poller stopped");
    }

    /// Time left on the open warning, if one is open.
    fn until_deadline(&self) -> Option<Duration> {
        let now = self.deps.tracker.now_ms();
        self.warning.map(|w| Duration::from_millis(w.deadline_ms.saturating_sub(now)))
    }

    async fn cycle(&mut self) -> Flow {
        let tracker = &self.deps.tracker;
        tracker.sync_activity_from_store();
        let snapshot = Snapshot::capture(tracker);

        match evaluate(&snapshot, self.warning.is_some()) {
            Decision::Continue => Flow::Continue,
            Decision::Expire(reason) => self.end(reason),
            Decision::Warn { kind, remaining_ms } => {
                self.warn(kind, snapshot.now_ms, remaining_ms);
                Flow::Continue
            }
            Decision::Refresh => {
                tracing::info!("access token expired, refreshing");
                self.refresh().await
            }
        }
    }

    fn warn(&mut self, kind: WarningKind, now_ms: u64, remaining_ms: u64) {
        let minutes = remaining_minutes(remaining_ms);
        self.warning_seq += 1;
        let seq = self.warning_seq;
        self.warning = Some(OpenWarning { seq, kind, deadline_ms: now_ms + remaining_ms });
        self.deps.phase.send_replace(SessionPhase::WarningShown);
        let _ = self.deps.event_tx.send(SessionEvent::WarningShown { remaining_minutes: minutes });
        tracing::info!(?kind, remaining_ms, minutes, "session expiry warning shown");

        let notifier = Arc::clone(&self.deps.notifier);
        let tx = self.choice_tx.clone();
        self.prompt = Some(tokio::spawn(async move {
            let choice = notifier.present(minutes).await;
            let _ = tx.send((seq, choice)).await;
        }));
    }

    async fn on_choice(&mut self, seq: u64, choice: WarningChoice) -> Flow {
        match self.warning {
            Some(w) if w.seq == seq => {}
            _ => {
                tracing::debug!(seq, "ignoring answer to a closed warning");
                return Flow::Continue;
            }
        }
        self.prompt = None;
        match choice {
            WarningChoice::Keep => {
                tracing::info!("user chose to keep the session");
                self.deps.recorder.record_now();
                self.warning = None;
                self.refresh().await
            }
            WarningChoice::Logout => self.end(EndReason::UserLogout),
        }
    }

    /// The open warning went unanswered. Inactivity is authoritative if its
    /// allowance is also spent.
    fn on_deadline(&mut self) -> Flow {
        let tracker = &self.deps.tracker;
        tracker.sync_activity_from_store();
        let now = tracker.now_ms();
        let reason = if tracker.idle_ms(now) >= tracker.inactivity_timeout_ms() {
            EndReason::Inactivity
        } else {
            EndReason::Timeout
        };
        tracing::info!(%reason, "warning deadline passed");
        self.end(reason)
    }

    async fn refresh(&mut self) -> Flow {
        self.deps.phase.send_replace(SessionPhase::Refreshing);
        let cancel = self.cancel.clone();
        let refresher = Arc::clone(&self.deps.refresher);
        let until_deadline = self.until_deadline();
        // An open warning still ends on time; the refresh settles in the
        // coordinator without us.
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Flow::Stop,
            _ = tokio::time::sleep(until_deadline.unwrap_or_default()), if until_deadline.is_some() => {
                return self.on_deadline();
            }
            outcome = refresher.refresh() => outcome,
        };
        match outcome {
            Ok(_) => {
                if self.warning.is_some_and(|w| w.kind == WarningKind::Token) {
                    self.warning = None;
                    self.close_prompt();
                }
                let phase = if self.warning.is_some() {
                    SessionPhase::WarningShown
                } else {
                    SessionPhase::Active
                };
                self.deps.phase.send_replace(phase);
                Flow::Continue
            }
            Err(failure) => {
                tracing::warn!(%failure, "refresh failed, ending session");
                self.end(EndReason::TokenExpired)
            }
        }
    }

    fn end(&mut self, reason: EndReason) -> Flow {
        self.close_prompt();
        self.warning = None;
        self.deps.terminator.terminate(reason);
        Flow::Stop
    }

    fn close_prompt(&mut self) {
        if let Some(prompt) = self.prompt.take() {
            prompt.abort();
            self.deps.notifier.dismiss();
        }
    }
}

#[cfg(test)]
#[path = "poller_tests.rs"]
mod tests;
