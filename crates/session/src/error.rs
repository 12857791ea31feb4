// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;

use serde::{Deserialize, Serialize};

/// Failure of an outbound API request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpError {
    /// The server answered 401.
    Unauthorized { body: serde_json::Value },
    /// Any other non-success status.
    Status { status: u16, body: serde_json::Value },
    /// The request never produced a response.
    Transport(String),
}

impl HttpError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Unauthorized { .. } => Some(401),
            Self::Status { status, .. } => Some(*status),
            Self::Transport(_) => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthorized { .. } => "UNAUTHORIZED",
            Self::Status { .. } => "HTTP_STATUS",
            Self::Transport(_) => "TRANSPORT",
        }
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unauthorized { .. } => f.write_str("UNAUTHORIZED (401)"),
            Self::Status { status, .. } => write!(f, "HTTP_STATUS ({status})"),
            Self::Transport(msg) => write!(f, "TRANSPORT: {msg}"),
        }
    }
}

impl std::error::Error for HttpError {}

/// Why a credential refresh did not produce a new access token.
///
/// Callers only distinguish success from failure; the variant is kept for logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshFailure {
    /// No refresh credential is stored.
    MissingToken,
    /// The server rejected the refresh credential.
    Rejected,
    /// The refresh call did not complete.
    Network,
    /// The session ended while the call was in flight; its outcome was dropped.
    SessionEnded,
}

impl RefreshFailure {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingToken => "MISSING_TOKEN",
            Self::Rejected => "REJECTED",
            Self::Network => "NETWORK",
            Self::SessionEnded => "SESSION_ENDED",
        }
    }
}

impl fmt::Display for RefreshFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::error::Error for RefreshFailure {}
