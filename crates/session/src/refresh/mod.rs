// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Credential refresh: the network call and its single-flight coordinator.

pub mod client;
pub mod coordinator;

pub use client::HttpRefreshClient;
pub use coordinator::RefreshCoordinator;

use async_trait::async_trait;

use crate::session::{AuthResponse, RefreshOutcome};

/// The refresh network call: exchange a refresh credential for new tokens.
#[async_trait]
pub trait RefreshClient: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> anyhow::Result<AuthResponse>;
}

/// Capability to obtain fresh credentials. Every caller of one in-flight
/// refresh observes the same outcome.
#[async_trait]
pub trait Refresher: Send + Sync {
    async fn refresh(&self) -> RefreshOutcome;
}
