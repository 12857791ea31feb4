// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Terminal implementations of the UI collaborators, used by the binary.

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::ui::{Navigator, WarningChoice, WarningNotifier};

/// Prompts on stderr and takes the answer from the next stdin line.
#[derive(Default)]
pub struct TerminalNotifier {
    pending: Mutex<Option<oneshot::Sender<WarningChoice>>>,
}

impl TerminalNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a prompt is waiting for an answer.
    pub fn is_prompting(&self) -> bool {
        self.pending.lock().is_some()
    }

    /// Route an input line to the open prompt. Returns false when no prompt
    /// is open, in which case the line is plain activity.
    pub fn answer(&self, line: &str) -> bool {
        let Some(tx) = self.pending.lock().take() else {
            return false;
        };
        let _ = tx.send(parse_choice(line));
        true
    }
}

/// `l`/`logout` ends the session; anything else keeps it.
pub fn parse_choice(line: &str) -> WarningChoice {
    match line.trim().to_ascii_lowercase().as_str() {
        "l" | "logout" | "q" | "quit" => WarningChoice::Logout,
        _ => WarningChoice::Keep,
    }
}

#[async_trait]
impl WarningNotifier for TerminalNotifier {
    async fn present(&self, remaining_minutes: u64) -> WarningChoice {
        let (tx, rx) = oneshot::channel();
        *self.pending.lock() = Some(tx);
        let unit = if remaining_minutes == 1 { "minute" } else { "minutes" };
        eprintln!(
            "Your session expires in {remaining_minutes} {unit}. \
             Press Enter to stay signed in, or type 'logout' to sign out."
        );
        match rx.await {
            Ok(choice) => choice,
            // Dismissed: the poller has already stopped listening.
            Err(_) => std::future::pending().await,
        }
    }

    fn dismiss(&self) {
        if self.pending.lock().take().is_some() {
            eprintln!("Session warning closed.");
        }
    }
}

/// Records the current location and logs navigations.
#[derive(Default)]
pub struct LogNavigator {
    location: Mutex<Option<String>>,
}

impl LogNavigator {
    pub fn new(location: Option<String>) -> Self {
        Self { location: Mutex::new(location) }
    }
}

impl Navigator for LogNavigator {
    fn current_location(&self) -> Option<String> {
        self.location.lock().clone()
    }

    fn go_to(&self, route: &str, params: &[(&str, &str)]) {
        let query = params.iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join("&");
        let target = if query.is_empty() { route.to_owned() } else { format!("{route}?{query}") };
        tracing::info!(%target, "navigate");
        eprintln!("Session ended: {target}");
        *self.location.lock() = Some(target);
    }
}

#[cfg(test)]
#[path = "terminal_tests.rs"]
mod tests;
