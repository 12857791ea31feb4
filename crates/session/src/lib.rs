// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Clinic session lifecycle: inactivity tracking, expiry warnings,
//! single-flight credential refresh and termination.

pub mod config;
pub mod error;
pub mod http;
pub mod manager;
pub mod refresh;
pub mod session;
pub mod store;
pub mod terminal;
pub mod ui;

#[cfg(test)]
mod test_support;

pub use config::{Command, SessionConfig};
pub use error::{HttpError, RefreshFailure};
pub use manager::{Collaborators, SessionManager, SessionStatus};
pub use session::{AuthResponse, EndReason, SessionEvent, SessionInfo, SessionPhase};
pub use store::{FileStore, MemoryStore, SessionStore};

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use crate::http::ReqwestTransport;
use crate::refresh::HttpRefreshClient;
use crate::session::clock::SystemClock;
use crate::terminal::{LogNavigator, TerminalNotifier};

/// Run the selected subcommand against the persisted session.
pub async fn run(config: SessionConfig) -> anyhow::Result<()> {
    let dir = config.state_dir();
    let store = Arc::new(FileStore::open(&dir)?);
    let notifier = Arc::new(TerminalNotifier::new());
    let manager = SessionManager::new(
        &config,
        Collaborators {
            store,
            transport: Arc::new(ReqwestTransport::new(&config.api_url, config.request_timeout())),
            refresh_client: Arc::new(HttpRefreshClient::new(&config.api_url, config.request_timeout())),
            notifier: Arc::clone(&notifier) as Arc<dyn ui::WarningNotifier>,
            navigator: Arc::new(LogNavigator::default()),
            clock: Arc::new(SystemClock::new()),
        },
    );

    match config.command.clone().unwrap_or(Command::Monitor) {
        Command::Status => {
            manager.tracker().initialize(None);
            println!("{}", serde_json::to_string_pretty(&manager.status())?);
            Ok(())
        }
        Command::Logout => {
            if !manager.has_session() {
                tracing::info!(dir = %dir.display(), "no session to end");
                return Ok(());
            }
            manager.logout();
            Ok(())
        }
        Command::Monitor => monitor(&manager, &notifier, &dir).await,
    }
}

/// Enforce expiry until the session ends or a signal arrives. Each stdin
/// line counts as activity unless it answers an open warning.
async fn monitor(
    manager: &SessionManager,
    notifier: &TerminalNotifier,
    dir: &std::path::Path,
) -> anyhow::Result<()> {
    if !manager.has_session() {
        anyhow::bail!("no session in {}; log in first", dir.display());
    }

    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone());

    manager.initialize(None);
    manager.start_monitoring();
    tracing::info!(dir = %dir.display(), "monitoring session");

    let mut phase = manager.watch_phase();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                manager.stop_monitoring();
                break;
            }
            _ = phase.wait_for(|p| p.is_expired()) => break,
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => {
                    if !notifier.answer(&line) {
                        manager.record_activity();
                    }
                }
                Ok(None) => stdin_open = false,
                Err(e) => {
                    tracing::warn!(err = %e, "stdin read failed");
                    stdin_open = false;
                }
            },
        }
    }

    if let session::SessionPhase::Expired(reason) = manager.phase() {
        tracing::info!(%reason, "session ended");
    }
    Ok(())
}

fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).ok();
        let mut sigint =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt()).ok();

        tokio::select! {
            _ = async {
                if let Some(ref mut s) = sigterm { s.recv().await } else { std::future::pending().await }
            } => {
                tracing::info!("received SIGTERM");
            }
            _ = async {
                if let Some(ref mut s) = sigint { s.recv().await } else { std::future::pending().await }
            } => {
                tracing::info!("received SIGINT");
            }
        }
        shutdown.cancel();
    });
}
