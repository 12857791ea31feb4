// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Recording fakes for the UI and refresh collaborators.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::refresh::RefreshClient;
use crate::session::AuthResponse;
use crate::ui::{Navigator, WarningChoice, WarningNotifier};

/// How the fake notifier answers.
#[derive(Debug, Clone, Copy)]
pub enum Answer {
    Never,
    After(Duration, WarningChoice),
}

pub struct FakeNotifier {
    answer: Mutex<Answer>,
    pub presented: Mutex<Vec<u64>>,
    pub dismissed: AtomicUsize,
}

impl FakeNotifier {
    pub fn new(answer: Answer) -> Self {
        Self { answer: Mutex::new(answer), presented: Mutex::new(vec![]), dismissed: AtomicUsize::new(0) }
    }

    pub fn set_answer(&self, answer: Answer) {
        *self.answer.lock() = answer;
    }

    pub fn present_count(&self) -> usize {
        self.presented.lock().len()
    }

    pub fn dismiss_count(&self) -> usize {
        self.dismissed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WarningNotifier for FakeNotifier {
    async fn present(&self, remaining_minutes: u64) -> WarningChoice {
        self.presented.lock().push(remaining_minutes);
        let answer = *self.answer.lock();
        match answer {
            Answer::Never => std::future::pending().await,
            Answer::After(delay, choice) => {
                tokio::time::sleep(delay).await;
                choice
            }
        }
    }

    fn dismiss(&self) {
        self.dismissed.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct FakeNavigator {
    pub location: Mutex<Option<String>>,
    pub visits: Mutex<Vec<(String, Vec<(String, String)>)>>,
}

impl FakeNavigator {
    pub fn at(location: &str) -> Self {
        Self { location: Mutex::new(Some(location.to_owned())), visits: Mutex::new(vec![]) }
    }

    pub fn visit_count(&self) -> usize {
        self.visits.lock().len()
    }

    /// `reason` parameter of the last visit.
    pub fn last_reason(&self) -> Option<String> {
        let visits = self.visits.lock();
        let (_, params) = visits.last()?;
        params.iter().find(|(k, _)| k == "reason").map(|(_, v)| v.clone())
    }
}

impl Navigator for FakeNavigator {
    fn current_location(&self) -> Option<String> {
        self.location.lock().clone()
    }

    fn go_to(&self, route: &str, params: &[(&str, &str)]) {
        let params = params.iter().map(|(k, v)| ((*k).to_owned(), (*v).to_owned())).collect();
        self.visits.lock().push((route.to_owned(), params));
        *self.location.lock() = Some(route.to_owned());
    }
}

/// Refresh client that replays scripted results, each after `delay`.
pub struct ScriptedRefresh {
    script: Mutex<VecDeque<anyhow::Result<AuthResponse>>>,
    delay: Mutex<Duration>,
    pub calls: AtomicUsize,
    pub seen_tokens: Mutex<Vec<String>>,
}

impl ScriptedRefresh {
    pub fn new(script: Vec<anyhow::Result<AuthResponse>>, delay: Duration) -> Self {
        Self {
            script: Mutex::new(script.into()),
            delay: Mutex::new(delay),
            calls: AtomicUsize::new(0),
            seen_tokens: Mutex::new(vec![]),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }
}

#[async_trait]
impl RefreshClient for ScriptedRefresh {
    async fn refresh(&self, refresh_token: &str) -> anyhow::Result<AuthResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen_tokens.lock().push(refresh_token.to_owned());
        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.script.lock().pop_front().unwrap_or_else(|| Err(anyhow::anyhow!("script exhausted")))
    }
}

/// A refresh response carrying only tokens.
pub fn tokens(access: &str, refresh: &str) -> AuthResponse {
    AuthResponse {
        access_token: access.to_owned(),
        refresh_token: Some(refresh.to_owned()),
        user: None,
        session: None,
        expires_in: None,
    }
}
