//! Process-wide, lazily constructed pipeline handles.
//!
//! Each external pipeline is built on first use and shared by every request
//! afterwards. Construction runs inside a [`OnceCell`], so concurrent first
//! callers wait for the one in-flight construction instead of starting
//! their own.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::error::{PipelineError, PipelineKind};

/// What to do when constructing a pipeline fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnLoadFailure {
    /// Leave the cell empty; the next caller tries again.
    Retry,
    /// Remember the failure for the lifetime of the process.
    Remember,
}

/// Reported by `/api/debug`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PipelineStatus {
    #[serde(rename = "loaded")]
    Loaded,
    #[serde(rename = "not loaded")]
    NotLoaded,
}

enum Slot<T: ?Sized> {
    Ready(Arc<T>),
    Unavailable(String),
}

pub struct LazyPipeline<T: ?Sized> {
    kind: PipelineKind,
    on_failure: OnLoadFailure,
    cell: OnceCell<Slot<T>>,
}

impl<T: ?Sized + Send + Sync> LazyPipeline<T> {
    pub fn new(kind: PipelineKind, on_failure: OnLoadFailure) -> Self {
        Self {
            kind,
            on_failure,
            cell: OnceCell::new(),
        }
    }

    /// Return the cached pipeline, constructing it with `load` if this is the
    /// first call. `load` runs at most once per successful construction.
    pub async fn get_or_load<F, Fut>(&self, load: F) -> Result<Arc<T>, PipelineError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Arc<T>, PipelineError>>,
    {
        let kind = self.kind;
        let slot = match self.on_failure {
            OnLoadFailure::Retry => {
                self.cell
                    .get_or_try_init(move || async move {
                        timed_load(kind, load).await.map(Slot::Ready)
                    })
                    .await?
            }
            OnLoadFailure::Remember => {
                self.cell
                    .get_or_init(move || async move {
                        match timed_load(kind, load).await {
                            Ok(pipeline) => Slot::Ready(pipeline),
                            Err(err) => {
                                warn!("{} pipeline not available: {}", kind, err);
                                Slot::Unavailable(err.to_string())
                            }
                        }
                    })
                    .await
            }
        };

        match slot {
            Slot::Ready(pipeline) => Ok(Arc::clone(pipeline)),
            Slot::Unavailable(reason) => Err(PipelineError::Unavailable {
                kind,
                reason: reason.clone(),
            }),
        }
    }

    pub fn status(&self) -> PipelineStatus {
        match self.cell.get() {
            Some(Slot::Ready(_)) => PipelineStatus::Loaded,
            _ => PipelineStatus::NotLoaded,
        }
    }
}

async fn timed_load<T, F, Fut>(kind: PipelineKind, load: F) -> Result<Arc<T>, PipelineError>
where
    T: ?Sized,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Arc<T>, PipelineError>>,
{
    info!("Loading {} pipeline...", kind);
    let start = Instant::now();
    let result = load().await;
    if result.is_ok() {
        info!(
            "{} pipeline loaded in {}ms",
            kind,
            start.elapsed().as_millis()
        );
    }
    result
}
