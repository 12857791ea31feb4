// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::time::sleep;

use crate::error::HttpError;
use crate::http::{ApiRequest, ApiResponse};
use crate::session::clock::SystemClock;
use crate::store::MemoryStore;
use crate::test_support::{tokens, Answer, FakeNavigator, FakeNotifier, ScriptedRefresh};
use crate::ui::{WarningChoice, SESSION_ENDED_ROUTE};

use super::*;

/// API that refuses every credential.
struct RejectingApi;

#[async_trait]
impl Transport for RejectingApi {
    async fn send(&self, _request: ApiRequest) -> Result<ApiResponse, HttpError> {
        Err(HttpError::Unauthorized { body: json!({ "detail": "expired" }) })
    }
}

struct Ctx {
    manager: SessionManager,
    store: Arc<MemoryStore>,
    clock: Arc<SystemClock>,
    notifier: Arc<FakeNotifier>,
    navigator: Arc<FakeNavigator>,
    refresh: Arc<ScriptedRefresh>,
}

fn config(poll_ms: u64) -> SessionConfig {
    SessionConfig { poll_ms, activity_throttle_ms: 1_000, ..SessionConfig::default() }
}

fn ctx_with(
    config: SessionConfig,
    store: Arc<MemoryStore>,
    clock: Arc<SystemClock>,
    answer: Answer,
    script: Vec<anyhow::Result<AuthResponse>>,
) -> Ctx {
    let notifier = Arc::new(FakeNotifier::new(answer));
    let navigator = Arc::new(FakeNavigator::at("/home"));
    let refresh = Arc::new(ScriptedRefresh::new(script, Duration::ZERO));
    let manager = SessionManager::new(
        &config,
        Collaborators {
            store: store.clone(),
            transport: Arc::new(RejectingApi),
            refresh_client: refresh.clone(),
            notifier: notifier.clone(),
            navigator: navigator.clone(),
            clock: clock.clone(),
        },
    );
    Ctx { manager, store, clock, notifier, navigator, refresh }
}

fn ctx(config: SessionConfig, answer: Answer, script: Vec<anyhow::Result<AuthResponse>>) -> Ctx {
    ctx_with(config, Arc::new(MemoryStore::new()), Arc::new(SystemClock::new()), answer, script)
}

fn login(info: SessionInfo) -> AuthResponse {
    AuthResponse { user: Some(json!({ "id": 1, "role": "clinic_staff" })), session: Some(info), ..tokens("at-0", "rt-0") }
}

fn idle_policy(inactivity_ms: u64, warning_ms: u64) -> SessionInfo {
    SessionInfo {
        inactivity_timeout: Some(inactivity_ms),
        warning_before: Some(warning_ms),
        ..SessionInfo::default()
    }
}

fn assert_session_keys_cleared(store: &MemoryStore) {
    for key in store::SESSION_KEYS {
        assert!(!store.contains(key), "{key} not cleared");
    }
}

#[tokio::test(start_paused = true)]
async fn idle_session_expires_for_inactivity() -> anyhow::Result<()> {
    let c = ctx(config(1_000), Answer::Never, vec![]);
    c.manager.establish(&login(idle_policy(5_000, 1_000)));

    sleep(Duration::from_millis(6_000)).await;

    assert_eq!(c.manager.phase(), SessionPhase::Expired(EndReason::Inactivity));
    assert_session_keys_cleared(&c.store);
    assert_eq!(c.navigator.last_reason().as_deref(), Some("inactivity"));
    assert_eq!(c.navigator.visits.lock()[0].0, SESSION_ENDED_ROUTE);
    assert_eq!(c.store.get(store::RETURN_URL)?, Some(json!("/home")));
    assert_eq!(c.notifier.present_count(), 1);
    assert!(!c.manager.is_monitoring());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn unanswered_warning_forces_timeout_at_deadline() -> anyhow::Result<()> {
    let c = ctx(config(500), Answer::Never, vec![]);
    let info = SessionInfo {
        expires_at: Some(c.clock.now_ms() + 3_000),
        ..idle_policy(3_600_000, 1_000)
    };
    c.manager.establish(&login(info));

    sleep(Duration::from_millis(2_100)).await;
    assert_eq!(c.manager.phase(), SessionPhase::WarningShown);
    assert_eq!(*c.notifier.presented.lock(), vec![1]);

    sleep(Duration::from_millis(899)).await;
    assert_eq!(c.manager.phase(), SessionPhase::WarningShown);

    sleep(Duration::from_millis(2)).await;
    assert_eq!(c.manager.phase(), SessionPhase::Expired(EndReason::Timeout));
    assert_eq!(c.navigator.last_reason().as_deref(), Some("timeout"));
    assert!(c.notifier.dismiss_count() >= 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn keep_resets_the_warning_once() -> anyhow::Result<()> {
    let keep = Answer::After(Duration::from_millis(100), WarningChoice::Keep);
    let c = ctx(config(500), keep, vec![Ok(tokens("at-1", "rt-1"))]);
    c.manager.establish(&login(idle_policy(5_000, 1_000)));

    sleep(Duration::from_millis(4_300)).await;
    assert_eq!(c.notifier.present_count(), 1);
    assert_eq!(c.manager.phase(), SessionPhase::Active);
    assert_eq!(c.refresh.call_count(), 1);
    assert_eq!(c.store.get(store::ACCESS_TOKEN)?, Some(json!("at-1")));

    // Activity was recorded at ~4100ms, so the next warning is due at ~8500ms.
    sleep(Duration::from_millis(3_900)).await;
    assert_eq!(c.notifier.present_count(), 1);
    sleep(Duration::from_millis(400)).await;
    assert_eq!(c.notifier.present_count(), 2);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn logout_choice_ends_the_session() -> anyhow::Result<()> {
    let logout = Answer::After(Duration::from_millis(10), WarningChoice::Logout);
    let c = ctx(config(500), logout, vec![]);
    c.manager.establish(&login(idle_policy(5_000, 1_000)));

    sleep(Duration::from_millis(4_100)).await;

    assert_eq!(c.manager.phase(), SessionPhase::Expired(EndReason::UserLogout));
    assert_session_keys_cleared(&c.store);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn failed_refresh_ends_session_without_retrying() -> anyhow::Result<()> {
    let c = ctx(config(500), Answer::Never, vec![Err(anyhow::anyhow!("refresh token revoked"))]);
    let info = SessionInfo { expires_at: Some(c.clock.now_ms() + 1_000), ..idle_policy(3_600_000, 0) };
    c.manager.establish(&login(info));

    sleep(Duration::from_millis(10_000)).await;

    assert_eq!(c.manager.phase(), SessionPhase::Expired(EndReason::TokenExpired));
    assert_eq!(c.refresh.call_count(), 1);
    assert_eq!(c.navigator.visit_count(), 1);
    assert_session_keys_cleared(&c.store);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn expired_token_is_refreshed_in_place() -> anyhow::Result<()> {
    let renewed = AuthResponse { expires_in: Some(600), ..tokens("at-1", "rt-1") };
    let c = ctx(config(500), Answer::Never, vec![Ok(renewed)]);
    let info = SessionInfo { expires_at: Some(c.clock.now_ms() + 1_000), ..idle_policy(3_600_000, 0) };
    c.manager.establish(&login(info));

    sleep(Duration::from_millis(5_000)).await;

    assert_eq!(c.manager.phase(), SessionPhase::Active);
    assert_eq!(c.refresh.call_count(), 1);
    assert_eq!(*c.refresh.seen_tokens.lock(), vec!["rt-0".to_owned()]);
    assert_eq!(c.store.get(store::ACCESS_TOKEN)?, Some(json!("at-1")));
    assert_eq!(c.store.get(store::REFRESH_TOKEN)?, Some(json!("rt-1")));
    // Refreshed at the 1000ms tick with a 600s lifetime.
    assert_eq!(c.manager.tracker().token_remaining_ms(c.clock.now_ms()), Some(596_000));
    assert_eq!(c.manager.tracker().inactivity_timeout_ms(), 3_600_000);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn inactivity_takes_precedence_over_refresh() -> anyhow::Result<()> {
    let c = ctx(config(3_000), Answer::Never, vec![Ok(tokens("at-1", "rt-1"))]);
    let info = SessionInfo { expires_at: Some(c.clock.now_ms() + 1_000), ..idle_policy(2_000, 0) };
    c.manager.establish(&login(info));

    sleep(Duration::from_millis(3_100)).await;

    assert_eq!(c.manager.phase(), SessionPhase::Expired(EndReason::Inactivity));
    assert_eq!(c.refresh.call_count(), 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn activity_in_another_context_keeps_session_alive() -> anyhow::Result<()> {
    let shared = Arc::new(MemoryStore::new());
    let clock = Arc::new(SystemClock::new());
    let a = ctx_with(config(1_000), shared.clone(), clock.clone(), Answer::Never, vec![]);
    let b = ctx_with(config(1_000), shared, clock, Answer::Never, vec![]);
    a.manager.establish(&login(idle_policy(5_000, 1_000)));
    b.manager.initialize(None);

    sleep(Duration::from_millis(3_000)).await;
    assert!(b.manager.record_activity());

    sleep(Duration::from_millis(3_500)).await;
    assert_eq!(a.manager.phase(), SessionPhase::Active);
    assert_eq!(a.notifier.present_count(), 0);
    assert_eq!(a.manager.tracker().idle_ms(a.clock.now_ms()), 3_500);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn rejected_request_refresh_failure_ends_session() -> anyhow::Result<()> {
    let c = ctx(config(30_000), Answer::Never, vec![Err(anyhow::anyhow!("revoked"))]);
    c.manager.establish(&login(idle_policy(3_600_000, 60_000)));

    let result = c.manager.http().get("/patients").await;
    assert!(result.is_err_and(|e| e.is_unauthorized()));

    let mut phase = c.manager.watch_phase();
    tokio::time::timeout(Duration::from_secs(1), phase.wait_for(|p| p.is_expired())).await??;
    assert_eq!(c.manager.phase(), SessionPhase::Expired(EndReason::TokenExpired));
    assert_eq!(c.refresh.call_count(), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn stop_monitoring_leaves_session_in_place() -> anyhow::Result<()> {
    let c = ctx(config(500), Answer::Never, vec![]);
    c.manager.establish(&login(idle_policy(2_000, 500)));
    c.manager.stop_monitoring();

    sleep(Duration::from_millis(10_000)).await;

    assert_eq!(c.manager.phase(), SessionPhase::Active);
    assert!(c.store.contains(store::ACCESS_TOKEN));
    assert_eq!(c.notifier.present_count(), 0);
    assert!(!c.manager.record_activity());
    Ok(())
}

#[tokio::test]
async fn logout_is_idempotent_and_remembers_destination() -> anyhow::Result<()> {
    let c = ctx(config(30_000), Answer::Never, vec![]);
    c.manager.establish(&login(idle_policy(3_600_000, 60_000)));
    let mut events = c.manager.subscribe();

    assert!(c.manager.logout());
    assert!(!c.manager.logout());

    assert_eq!(events.recv().await?, SessionEvent::Ended { reason: EndReason::UserLogout });
    assert_eq!(c.navigator.visit_count(), 1);
    assert!(!c.manager.has_session());
    assert_eq!(c.manager.take_return_url().as_deref(), Some("/home"));
    assert_eq!(c.manager.take_return_url(), None);
    Ok(())
}

#[tokio::test]
async fn sensitive_location_is_not_remembered() -> anyhow::Result<()> {
    let c = ctx(config(30_000), Answer::Never, vec![]);
    *c.navigator.location.lock() = Some("/payment/checkout".to_owned());
    c.manager.establish(&login(idle_policy(3_600_000, 60_000)));

    c.manager.terminate(EndReason::Timeout);

    assert!(!c.store.contains(store::RETURN_URL));
    assert_eq!(c.navigator.last_reason().as_deref(), Some("timeout"));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn session_without_metadata_uses_defaults() -> anyhow::Result<()> {
    let c = ctx(config(30_000), Answer::Never, vec![]);
    c.manager.establish(&tokens("at-0", "rt-0"));

    let status = c.manager.status();
    assert!(status.info.is_none());
    assert!(status.monitoring);
    assert!(status.has_access_token);
    assert!(status.has_refresh_token);
    assert_eq!(status.inactivity_remaining_ms, crate::config::DEFAULT_INACTIVITY_MS);
    assert_eq!(status.token_remaining_ms, None);
    assert_eq!(c.manager.tracker().time_until_token_expiry(), Duration::MAX);
    Ok(())
}

#[tokio::test]
async fn new_login_after_termination_starts_fresh() -> anyhow::Result<()> {
    let c = ctx(config(30_000), Answer::Never, vec![]);
    c.manager.establish(&login(idle_policy(3_600_000, 60_000)));
    c.manager.logout();

    c.manager.establish(&login(idle_policy(3_600_000, 60_000)));
    assert_eq!(c.manager.phase(), SessionPhase::Active);
    assert!(c.manager.is_monitoring());
    assert!(c.manager.has_session());
    assert!(c.manager.logout());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn manual_refresh_goes_through_the_coordinator() -> anyhow::Result<()> {
    let c = ctx(config(30_000), Answer::Never, vec![Ok(tokens("at-1", "rt-1"))]);
    c.manager.establish(&login(idle_policy(3_600_000, 60_000)));
    let mut events = c.manager.subscribe();

    let (a, b) = tokio::join!(c.manager.refresh(), c.manager.refresher().refresh());
    assert_eq!(a?.access_token, "at-1");
    assert_eq!(b?.access_token, "at-1");
    assert_eq!(c.refresh.call_count(), 1);
    assert!(!c.manager.refresher().is_in_flight());
    assert_eq!(events.recv().await?, SessionEvent::Refreshed);
    assert_eq!(c.manager.status().token_remaining_ms, None);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn slow_refresh_does_not_delay_the_warning_deadline() -> anyhow::Result<()> {
    let c = ctx(config(250), Answer::Never, vec![Ok(tokens("at-1", "rt-1"))]);
    c.refresh.set_delay(Duration::from_secs(5));
    let info = SessionInfo { expires_at: Some(c.clock.now_ms() + 4_500), ..idle_policy(5_000, 1_000) };
    c.manager.establish(&login(info));

    // Inactivity warning at 4000ms (deadline 5000ms); the token lapses at
    // 4500ms and its refresh takes five seconds.
    sleep(Duration::from_millis(4_600)).await;
    assert_eq!(c.manager.phase(), SessionPhase::Refreshing);
    assert_eq!(c.refresh.call_count(), 1);

    sleep(Duration::from_millis(500)).await;
    assert_eq!(c.manager.phase(), SessionPhase::Expired(EndReason::Inactivity));
    assert_eq!(c.navigator.visit_count(), 1);

    // The late refresh result belongs to the ended session and is dropped.
    sleep(Duration::from_secs(6)).await;
    assert!(!c.manager.refresher().is_in_flight());
    assert_session_keys_cleared(&c.store);
    assert_eq!(c.navigator.visit_count(), 1);
    Ok(())
}
