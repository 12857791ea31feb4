// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session lifecycle: state tracking, activity, expiry polling and termination.

pub mod activity;
pub mod clock;
pub mod poller;
pub mod terminate;
pub mod tracker;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::RefreshFailure;

/// Session metadata from the authentication exchange.
///
/// Instants are epoch milliseconds, durations are milliseconds. Replaced
/// wholesale on login and on every successful refresh.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    /// When the access credential stops being valid.
    #[serde(default, alias = "expires_at", skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
    /// When the refresh credential stops being valid.
    #[serde(default, alias = "refresh_expires_at", skip_serializing_if = "Option::is_none")]
    pub refresh_expires_at: Option<u64>,
    /// Allowed idle time.
    #[serde(default, alias = "inactivity_timeout", skip_serializing_if = "Option::is_none")]
    pub inactivity_timeout: Option<u64>,
    /// Lead time for the expiry warning.
    #[serde(default, alias = "warning_before", skip_serializing_if = "Option::is_none")]
    pub warning_before: Option<u64>,
}

/// Why a session ended. Carried to the "session ended" surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    Inactivity,
    TokenExpired,
    UserLogout,
    Timeout,
}

impl EndReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inactivity => "inactivity",
            Self::TokenExpired => "token_expired",
            Self::UserLogout => "user_logout",
            Self::Timeout => "timeout",
        }
    }
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derived lifecycle phase. Never persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", content = "reason", rename_all = "snake_case")]
pub enum SessionPhase {
    #[default]
    Active,
    WarningShown,
    Refreshing,
    Expired(EndReason),
}

impl SessionPhase {
    pub fn is_expired(&self) -> bool {
        matches!(self, Self::Expired(_))
    }
}

/// Access credential plus the refresh credential that came with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

/// Body of a successful login, registration or refresh response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthResponse {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionInfo>,
    /// Access credential lifetime in seconds, used when `session` is absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
}

impl AuthResponse {
    /// Session metadata implied by this response.
    ///
    /// Without a `session` payload, `expires_in` dates the new credential;
    /// failing that the previous settings are kept with an unknown expiry.
    pub fn session_info(&self, previous: Option<SessionInfo>, now_ms: u64) -> Option<SessionInfo> {
        match (self.session, self.expires_in, previous) {
            (Some(info), _, _) => Some(info),
            // An unrepresentable lifetime leaves the expiry unknown.
            (None, Some(secs), prev) => Some(SessionInfo {
                expires_at: secs.checked_mul(1000).and_then(|ms| ms.checked_add(now_ms)),
                ..prev.unwrap_or_default()
            }),
            (None, None, Some(prev)) => Some(SessionInfo { expires_at: None, ..prev }),
            (None, None, None) => None,
        }
    }

    pub fn credentials(&self) -> Credentials {
        Credentials {
            access_token: self.access_token.clone(),
            refresh_token: self.refresh_token.clone(),
        }
    }
}

/// Outcome shared by every caller of one refresh.
pub type RefreshOutcome = Result<Credentials, RefreshFailure>;

/// Lifecycle events published on the manager's broadcast channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A login/registration installed a new session.
    Established,
    /// The expiry warning was presented.
    WarningShown { remaining_minutes: u64 },
    /// Credentials were refreshed.
    Refreshed,
    /// A refresh settled without new credentials.
    RefreshFailed { reason: RefreshFailure },
    /// The session was terminated.
    Ended { reason: EndReason },
}

/// Minutes shown to the user for a remaining duration: rounded up, at least 1.
pub fn remaining_minutes(remaining_ms: u64) -> u64 {
    remaining_ms.div_ceil(60_000).max(1)
}
