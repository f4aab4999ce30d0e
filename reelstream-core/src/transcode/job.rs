use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::error::{TranscodeError, TranscodeResult};
use super::types::{JobSnapshot, TranscodeReport};

/// Caller-side view of a job started with
/// [`TranscodeCoordinator::start`](super::TranscodeCoordinator::start).
///
/// Dropping the handle does not stop the job; call [`JobHandle::cancel`].
#[derive(Debug)]
pub struct JobHandle {
    job_id: String,
    movie_id: String,
    cancel: CancellationToken,
    snapshots: watch::Receiver<JobSnapshot>,
    task: JoinHandle<TranscodeResult<TranscodeReport>>,
}

impl JobHandle {
    pub(crate) fn new(
        job_id: String,
        movie_id: String,
        cancel: CancellationToken,
        snapshots: watch::Receiver<JobSnapshot>,
        task: JoinHandle<TranscodeResult<TranscodeReport>>,
    ) -> Self {
        Self {
            job_id,
            movie_id,
            cancel,
            snapshots,
            task,
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn movie_id(&self) -> &str {
        &self.movie_id
    }

    /// Stops queued qualities from starting and asks in-flight encodes to
    /// abort. Every affected row still ends up `Failed`.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn snapshot(&self) -> JobSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Waits for the next published snapshot. Returns `None` once the job
    /// has dropped its sender.
    pub async fn changed(&mut self) -> Option<JobSnapshot> {
        self.snapshots.changed().await.ok()?;
        Some(self.snapshots.borrow_and_update().clone())
    }

    pub async fn wait(self) -> TranscodeResult<TranscodeReport> {
        self.task
            .await
            .map_err(|err| TranscodeError::Task(err.to_string()))?
    }
}
