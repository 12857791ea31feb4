// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Current session metadata and the countdowns derived from it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};

use crate::config::{SessionConfig, DEFAULT_INACTIVITY_MS, DEFAULT_WARNING_MS};
use crate::session::clock::Clock;
use crate::session::SessionInfo;
use crate::store::{self, SessionStore};

/// Fallbacks applied when the session carries no metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerDefaults {
    pub inactivity_ms: u64,
    pub warning_ms: u64,
}

impl Default for TrackerDefaults {
    fn default() -> Self {
        Self { inactivity_ms: DEFAULT_INACTIVITY_MS, warning_ms: DEFAULT_WARNING_MS }
    }
}

impl From<&SessionConfig> for TrackerDefaults {
    fn from(config: &SessionConfig) -> Self {
        Self {
            inactivity_ms: config.default_inactivity_ms,
            warning_ms: config.default_warning_ms,
        }
    }
}

/// Owner of the in-memory [`SessionInfo`] and last-activity instant.
pub struct SessionTracker {
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    defaults: TrackerDefaults,
    info: RwLock<Option<SessionInfo>>,
    /// Epoch millis of the last known activity; 0 when none is known.
    last_activity: AtomicU64,
    /// Bumped whenever a session starts or ends, so late results can tell
    /// they belong to a session that is gone.
    generation: AtomicU64,
    /// Held while the generation changes and while writes bound to one
    /// generation run.
    transition: Mutex<()>,
}

impl SessionTracker {
    pub fn new(
        store: Arc<dyn SessionStore>,
        clock: Arc<dyn Clock>,
        defaults: TrackerDefaults,
    ) -> Self {
        Self {
            store,
            clock,
            defaults,
            info: RwLock::new(None),
            last_activity: AtomicU64::new(0),
            generation: AtomicU64::new(0),
            transition: Mutex::new(()),
        }
    }

    /// Adopt `info` when given, otherwise load the persisted copy.
    ///
    /// A missing persisted copy leaves the tracker on its defaults.
    pub fn initialize(&self, info: Option<SessionInfo>) {
        match info {
            Some(info) => self.adopt(info),
            None => {
                let loaded = store::load_or_warn::<SessionInfo>(self.store.as_ref(), store::SESSION_INFO);
                if loaded.is_none() {
                    tracing::debug!("no persisted session metadata, using defaults");
                }
                *self.info.write() = loaded;
            }
        }
        self.sync_activity_from_store();
    }

    /// Replace the session metadata and persist the copy.
    pub fn adopt(&self, info: SessionInfo) {
        *self.info.write() = Some(info);
        store::save_or_warn(self.store.as_ref(), store::SESSION_INFO, &info);
    }

    pub fn info(&self) -> Option<SessionInfo> {
        *self.info.read()
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    pub fn inactivity_timeout_ms(&self) -> u64 {
        self.info().and_then(|i| i.inactivity_timeout).unwrap_or(self.defaults.inactivity_ms)
    }

    pub fn warning_before_ms(&self) -> u64 {
        self.info().and_then(|i| i.warning_before).unwrap_or(self.defaults.warning_ms)
    }

    pub fn expires_at(&self) -> Option<u64> {
        self.info().and_then(|i| i.expires_at)
    }

    pub fn last_activity_ms(&self) -> u64 {
        self.last_activity.load(Ordering::SeqCst)
    }

    /// Move the last-activity instant forward. Older values are ignored.
    pub fn note_activity(&self, at_ms: u64) {
        self.last_activity.fetch_max(at_ms, Ordering::SeqCst);
    }

    /// Absorb activity recorded by other contexts through the store.
    pub fn sync_activity_from_store(&self) {
        if let Some(at) = store::load_or_warn::<u64>(self.store.as_ref(), store::LAST_ACTIVITY) {
            self.note_activity(at);
        }
    }

    pub fn idle_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.last_activity_ms())
    }

    /// Remaining idle allowance at `now_ms`.
    pub fn inactivity_remaining_ms(&self, now_ms: u64) -> u64 {
        self.inactivity_timeout_ms().saturating_sub(self.idle_ms(now_ms))
    }

    /// Remaining access-credential lifetime at `now_ms`; `None` when unknown.
    pub fn token_remaining_ms(&self, now_ms: u64) -> Option<u64> {
        self.expires_at().map(|at| at.saturating_sub(now_ms))
    }

    /// Time until the access credential lapses: `Duration::MAX` when no
    /// expiry is known, zero once it has passed.
    pub fn time_until_token_expiry(&self) -> Duration {
        match self.token_remaining_ms(self.now_ms()) {
            Some(ms) => Duration::from_millis(ms),
            None => Duration::MAX,
        }
    }

    pub fn time_until_inactivity_expiry(&self) -> Duration {
        Duration::from_millis(self.inactivity_remaining_ms(self.now_ms()))
    }

    pub fn is_expiring_soon(&self) -> bool {
        match self.token_remaining_ms(self.now_ms()) {
            Some(ms) => ms <= self.warning_before_ms(),
            None => false,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Mark the start of a new session.
    pub fn begin(&self) -> u64 {
        let _guard = self.transition.lock();
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Run `f` only while the session of `generation` is still current.
    /// No session can start or end while `f` runs.
    pub fn run_if_current<R>(&self, generation: u64, f: impl FnOnce() -> R) -> Option<R> {
        let _guard = self.transition.lock();
        (self.generation() == generation).then(f)
    }

    /// Drop in-memory state and end the current generation. Callers remove
    /// the persisted copies afterwards.
    pub fn clear(&self) {
        let _guard = self.transition.lock();
        *self.info.write() = None;
        self.last_activity.store(0, Ordering::SeqCst);
        self.generation.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
#[path = "tracker_tests.rs"]
mod tests;
