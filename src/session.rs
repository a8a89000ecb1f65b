use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::{AgentError, Result};
use crate::page::PageDriver;

/// A live browser with its page.
pub trait Session: Send + 'static {
    type Page: PageDriver;

    fn page(&self) -> &Self::Page;

    fn close(self) -> anyhow::Result<()>;
}

/// Creates sessions on demand.
pub trait Launcher: Send + Sync + 'static {
    type Session: Session;

    fn launch(&self) -> anyhow::Result<Self::Session>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserStatus {
    pub is_open: bool,
    pub has_page: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CloseOutcome {
    pub success: bool,
    pub message: &'static str,
}

/// Owns the single browser session and serializes access to it.
///
/// The session is launched lazily by the first [`run`](Self::run), reused by
/// every later run, and only torn down by [`close`](Self::close). Failed
/// runs leave it open.
pub struct SessionManager<L: Launcher> {
    launcher: Arc<L>,
    slot: Arc<Mutex<Option<L::Session>>>,
    open: Arc<AtomicBool>,
}

impl<L: Launcher> SessionManager<L> {
    pub fn new(launcher: L) -> Self {
        Self {
            launcher: Arc::new(launcher),
            slot: Arc::new(Mutex::new(None)),
            open: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Run `job` against the session page on a blocking worker, launching the
    /// browser first if none is open. Concurrent callers wait their turn.
    pub async fn run<F, T>(&self, job: F) -> Result<T>
    where
        F: FnOnce(&<L::Session as Session>::Page) -> T + Send + 'static,
        T: Send + 'static,
    {
        let mut slot = self.slot.clone().lock_owned().await;
        let launcher = self.launcher.clone();
        let open = self.open.clone();

        tokio::task::spawn_blocking(move || -> Result<T> {
            if slot.is_none() {
                info!("starting new browser session");
                let session = launcher
                    .launch()
                    .map_err(|e| AgentError::Session(format!("{e:#}")))?;
                *slot = Some(session);
                open.store(true, Ordering::SeqCst);
            } else {
                info!("reusing browser session");
            }
            let session = slot
                .as_ref()
                .ok_or_else(|| AgentError::Session("session vanished".into()))?;
            Ok(job(session.page()))
        })
        .await
        .map_err(|e| AgentError::Session(format!("browser worker failed: {e}")))?
    }

    pub fn status(&self) -> BrowserStatus {
        let open = self.open.load(Ordering::SeqCst);
        BrowserStatus {
            is_open: open,
            has_page: open,
            timestamp: Utc::now(),
        }
    }

    /// Close the session if one is open. The slot is emptied even when the
    /// browser fails to shut down cleanly.
    pub async fn close(&self) -> Result<CloseOutcome> {
        let session = self.slot.lock().await.take();
        let Some(session) = session else {
            return Ok(CloseOutcome {
                success: false,
                message: "No active browser session",
            });
        };
        self.open.store(false, Ordering::SeqCst);

        tokio::task::spawn_blocking(move || session.close())
            .await
            .map_err(|e| AgentError::Session(format!("browser worker failed: {e}")))?
            .map_err(|e| {
                warn!(error = %format!("{e:#}"), "browser did not close cleanly");
                AgentError::Session(format!("{e:#}"))
            })?;

        Ok(CloseOutcome {
            success: true,
            message: "Browser closed successfully",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeLauncher, FakePage};
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn close_without_session_reports_failure() {
        let manager = SessionManager::new(FakeLauncher::new(FakePage::default));
        let outcome = manager.close().await.unwrap();
        assert_eq!(
            outcome,
            CloseOutcome {
                success: false,
                message: "No active browser session"
            }
        );
        assert!(!manager.status().is_open);
    }

    #[tokio::test]
    async fn session_is_launched_once_and_reused() {
        let launcher = FakeLauncher::new(FakePage::default);
        let launches = launcher.launches();
        let manager = SessionManager::new(launcher);

        manager.run(|page| page.navigate("https://a.com")).await.unwrap().unwrap();
        manager.run(|page| page.navigate("https://b.com")).await.unwrap().unwrap();

        assert_eq!(launches.load(Ordering::SeqCst), 1);
        let status = manager.status();
        assert!(status.is_open && status.has_page);
    }

    #[tokio::test]
    async fn close_clears_the_session() {
        let manager = SessionManager::new(FakeLauncher::new(FakePage::default));
        manager.run(|_| ()).await.unwrap();
        assert!(manager.status().is_open);

        let outcome = manager.close().await.unwrap();
        assert!(outcome.success);
        assert!(!manager.status().is_open);
        assert!(!manager.close().await.unwrap().success);
    }

    #[tokio::test]
    async fn failed_close_still_clears_the_session() {
        let manager = SessionManager::new(FakeLauncher::new(FakePage::default).failing_close());
        manager.run(|_| ()).await.unwrap();

        assert!(manager.close().await.is_err());
        assert!(!manager.status().is_open);
    }

    #[tokio::test]
    async fn launch_failure_is_a_session_error() {
        let manager = SessionManager::new(FakeLauncher::new(FakePage::default).failing_launch());
        let err = manager.run(|_| ()).await.unwrap_err();
        assert!(matches!(err, AgentError::Session(_)));
        assert!(!manager.status().is_open);
    }
}
