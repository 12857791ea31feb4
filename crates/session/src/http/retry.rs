// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Credential-attaching client that recovers from a 401 with one refresh
//! and one retry.

use std::sync::Arc;

use crate::error::HttpError;
use crate::http::{ApiRequest, ApiResponse, Transport};
use crate::refresh::Refresher;
use crate::store::{self, SessionStore};

/// Endpoints sent as-is: no bearer header, no refresh on 401.
pub const PUBLIC_ENDPOINTS: &[&str] =
    &["/auth/login", "/auth/register", "/auth/forgot-password", "/auth/refresh"];

/// Whether `path` (query string ignored) is on the public allow-list.
pub fn is_public(path: &str) -> bool {
    let path = path.split(['?', '#']).next().unwrap_or(path).trim_end_matches('/');
    PUBLIC_ENDPOINTS.iter().any(|p| path.ends_with(p))
}

/// Wraps a [`Transport`] with bearer auth and 401 recovery.
pub struct AuthenticatedClient {
    transport: Arc<dyn Transport>,
    store: Arc<dyn SessionStore>,
    refresher: Arc<dyn Refresher>,
}

impl AuthenticatedClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        store: Arc<dyn SessionStore>,
        refresher: Arc<dyn Refresher>,
    ) -> Self {
        Self { transport, store, refresher }
    }

    /// Send `request`. On 401 the refresh coordinator runs (or is joined) and
    /// the request is retried once with the new credential. A failed refresh
    /// returns the original 401.
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse, HttpError> {
        if is_public(&request.path) {
            return self.transport.send(request).await;
        }

        let token = store::load_or_warn::<String>(self.store.as_ref(), store::ACCESS_TOKEN);
        let first = self.transport.send(with_bearer(request.clone(), token.as_deref())).await;
        let err = match first {
            Err(e) if e.is_unauthorized() => e,
            other => return other,
        };

        match self.refresher.refresh().await {
            Ok(creds) => {
                tracing::debug!(path = %request.path, "retrying request after refresh");
                self.transport.send(with_bearer(request, Some(&creds.access_token))).await
            }
            Err(reason) => {
                tracing::info!(path = %request.path, %reason, "refresh after 401 failed");
                Err(err)
            }
        }
    }

    pub async fn get(&self, path: &str) -> Result<serde_json::Value, HttpError> {
        Ok(self.send(ApiRequest::get(path)).await?.body)
    }

    pub async fn post(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<serde_json::Value, HttpError> {
        Ok(self.send(ApiRequest::post(path, body)).await?.body)
    }

    pub async fn put(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<serde_json::Value, HttpError> {
        Ok(self.send(ApiRequest::put(path, body)).await?.body)
    }

    pub async fn delete(&self, path: &str) -> Result<serde_json::Value, HttpError> {
        Ok(self.send(ApiRequest::delete(path)).await?.body)
    }
}

fn with_bearer(request: ApiRequest, token: Option<&str>) -> ApiRequest {
    match token {
        Some(token) => request.with_header("authorization", format!("Bearer {token}")),
        None => request,
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
