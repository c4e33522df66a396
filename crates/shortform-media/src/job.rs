//! Per-invocation job context.
//!
//! Every pipeline run carries its own `JobContext`: a unique id, a private
//! scratch directory, and the external cancellation signal. There is no
//! process-wide "current job" state, so concurrent jobs cannot overwrite
//! each other's intermediates.

use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio::sync::watch;
use uuid::Uuid;

use crate::error::{PipelineError, PipelineResult, Stage};

/// State owned by a single pipeline invocation.
///
/// The scratch directory is removed when the context is dropped.
pub struct JobContext {
    id: Uuid,
    workdir: TempDir,
    cancel_rx: Option<watch::Receiver<bool>>,
}

impl JobContext {
    /// Create a context with a fresh scratch directory.
    pub fn new() -> PipelineResult<Self> {
        let workdir = tempfile::Builder::new().prefix("shortform-").tempdir()?;
        Ok(Self {
            id: Uuid::new_v4(),
            workdir,
            cancel_rx: None,
        })
    }

    /// Attach an external cancellation signal.
    ///
    /// Stages observe the signal at sample/frame boundaries and before each
    /// FFmpeg invocation.
    pub fn with_cancel(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.cancel_rx = Some(cancel_rx);
        self
    }

    /// Unique job id.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The job's private scratch directory.
    pub fn workdir(&self) -> &Path {
        self.workdir.path()
    }

    /// Path for a named scratch artifact inside the job's directory.
    pub fn scratch_path(&self, name: &str) -> PathBuf {
        self.workdir.path().join(name)
    }

    /// Clone of the cancellation receiver, if one is attached.
    pub fn cancel_receiver(&self) -> Option<watch::Receiver<bool>> {
        self.cancel_rx.clone()
    }

    /// Fail with a stage-attributed cancellation error if the signal fired.
    pub fn check_cancelled(&self, stage: Stage) -> PipelineResult<()> {
        if let Some(rx) = &self.cancel_rx {
            if *rx.borrow() {
                return Err(PipelineError::Cancelled { stage });
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for JobContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobContext")
            .field("id", &self.id)
            .field("workdir", &self.workdir.path())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contexts_get_distinct_scratch_dirs() {
        let a = JobContext::new().unwrap();
        let b = JobContext::new().unwrap();
        assert_ne!(a.id(), b.id());
        assert_ne!(a.workdir(), b.workdir());
        assert_ne!(a.scratch_path("part.mp4"), b.scratch_path("part.mp4"));
    }

    #[test]
    fn test_scratch_dir_removed_on_drop() {
        let path = {
            let ctx = JobContext::new().unwrap();
            ctx.workdir().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn test_cancellation_check() {
        let (tx, rx) = watch::channel(false);
        let ctx = JobContext::new().unwrap().with_cancel(rx);

        assert!(ctx.check_cancelled(Stage::Assemble).is_ok());

        tx.send(true).unwrap();
        let err = ctx.check_cancelled(Stage::Letterbox).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Cancelled {
                stage: Stage::Letterbox
            }
        ));
    }

    #[test]
    fn test_no_signal_never_cancels() {
        let ctx = JobContext::new().unwrap();
        assert!(ctx.check_cancelled(Stage::Render).is_ok());
    }
}
