//! HTTP-served preview surfaces.
//!
//! Each opened preview is a session keyed by a random id and served at
//! `/previews/{id}`. Sessions end when the client posts a close request or
//! after sitting idle; either way the window's close event fires once.

use async_trait::async_trait;
use moka::future::Cache;
use moka::notification::RemovalCause;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::{PreviewCloser, PreviewError, PreviewHost, PreviewWindow};
use crate::render::CorrelationToken;

const MAX_OPEN_PREVIEWS: u64 = 1_000;

pub struct PreviewSession {
    pub path: PathBuf,
    pub token: CorrelationToken,
    closer: PreviewCloser,
}

#[derive(Clone)]
pub struct PreviewRegistry {
    sessions: Cache<Uuid, Arc<PreviewSession>>,
    base_url: String,
}

impl PreviewRegistry {
    pub fn new(base_url: impl Into<String>, idle: Duration) -> Self {
        let sessions = Cache::builder()
            .max_capacity(MAX_OPEN_PREVIEWS)
            .time_to_idle(idle)
            .eviction_listener(
                |id: Arc<Uuid>, session: Arc<PreviewSession>, cause: RemovalCause| {
                    if cause != RemovalCause::Explicit {
                        log::info!(
                            "[token={}] preview {} closed ({:?})",
                            session.token,
                            id,
                            cause
                        );
                    }
                    session.closer.close();
                },
            )
            .build();

        Self {
            sessions,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Artifact backing an open preview.
    pub async fn artifact(&self, id: &Uuid) -> Option<PathBuf> {
        self.sessions.get(id).await.map(|s| s.path.clone())
    }

    /// Close a preview. Returns `false` when no such preview is open.
    pub async fn close(&self, id: &Uuid) -> bool {
        match self.sessions.remove(id).await {
            Some(session) => {
                log::info!("[token={}] preview {} closed by client", session.token, id);
                session.closer.close();
                true
            }
            None => false,
        }
    }

    pub async fn is_open(&self, id: &Uuid) -> bool {
        self.sessions.contains_key(id)
    }

    /// Drive idle expiry so abandoned previews get closed without traffic.
    pub fn spawn_janitor(&self, every: Duration) -> JoinHandle<()> {
        let sessions = self.sessions.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                sessions.run_pending_tasks().await;
            }
        })
    }

    fn url_for(&self, id: &Uuid) -> String {
        format!("{}/previews/{}", self.base_url, id)
    }
}

#[async_trait]
impl PreviewHost for PreviewRegistry {
    async fn open(
        &self,
        artifact: &Path,
        token: &CorrelationToken,
    ) -> Result<PreviewWindow, PreviewError> {
        if !tokio::fs::try_exists(artifact).await.unwrap_or(false) {
            return Err(PreviewError::MissingArtifact(
                artifact.display().to_string(),
            ));
        }

        let id = Uuid::new_v4();
        let url = self.url_for(&id);
        let (window, closer) = PreviewWindow::new(Some(url.clone()));
        let session = PreviewSession {
            path: artifact.to_path_buf(),
            token: token.clone(),
            closer,
        };
        self.sessions.insert(id, Arc::new(session)).await;
        log::info!("[token={}] preview {} opened at {}", token, id, url);
        Ok(window)
    }
}
