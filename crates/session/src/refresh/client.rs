// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `POST /auth/refresh` over reqwest.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::HttpError;
use crate::refresh::RefreshClient;
use crate::session::AuthResponse;

/// Path of the refresh endpoint, relative to the API base URL.
pub const REFRESH_PATH: &str = "/auth/refresh";

pub struct HttpRefreshClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpRefreshClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder().timeout(timeout).build().unwrap_or_default();
        Self { base_url: base_url.into().trim_end_matches('/').to_owned(), client }
    }
}

#[async_trait]
impl RefreshClient for HttpRefreshClient {
    /// Perform a single refresh request (no retries).
    async fn refresh(&self, refresh_token: &str) -> anyhow::Result<AuthResponse> {
        let url = format!("{}{REFRESH_PATH}", self.base_url);
        let resp = self
            .client
            .post(url)
            .json(&serde_json::json!({ "refresh_token": refresh_token }))
            .send()
            .await
            .map_err(|e| HttpError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.json::<serde_json::Value>().await.unwrap_or(serde_json::Value::Null);
            let err = if status.as_u16() == 401 {
                HttpError::Unauthorized { body }
            } else {
                HttpError::Status { status: status.as_u16(), body }
            };
            return Err(err.into());
        }

        let token: AuthResponse = resp.json().await?;
        Ok(token)
    }
}
