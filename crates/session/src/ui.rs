// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! UI-side collaborators: the expiry warning prompt and navigation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Route of the "session ended" surface.
pub const SESSION_ENDED_ROUTE: &str = "/session-ended";

/// The user's answer to the expiry warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningChoice {
    Keep,
    Logout,
}

/// Presents the "keep session / log out" prompt.
#[async_trait]
pub trait WarningNotifier: Send + Sync {
    /// Show the prompt. May never resolve; the poller enforces the deadline.
    async fn present(&self, remaining_minutes: u64) -> WarningChoice;

    /// Close the prompt if it is open.
    fn dismiss(&self);
}

/// Navigation collaborator.
pub trait Navigator: Send + Sync {
    /// Path of the current location, if any.
    fn current_location(&self) -> Option<String>;

    fn go_to(&self, route: &str, params: &[(&str, &str)]);
}
