use tokio::sync::oneshot;

use crate::{CancellationToken, TaskError};

/// Handle to work running on one of the rayon pools.
///
/// Dropping the handle does not cancel the work; call [`BlockingTask::cancel`].
pub struct BlockingTask<T> {
    token: CancellationToken,
    rx: oneshot::Receiver<Result<T, TaskError>>,
}

impl<T> BlockingTask<T> {
    pub(crate) fn new(
        token: CancellationToken,
        rx: oneshot::Receiver<Result<T, TaskError>>,
    ) -> Self {
        Self { token, rx }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Waits for the job. Resolves early with [`TaskError::Cancelled`] once the
    /// token is cancelled, even if the job itself has not noticed yet.
    pub async fn join(self) -> Result<T, TaskError> {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(TaskError::Cancelled),
            result = self.rx => match result {
                Ok(result) => result,
                // The sender is only dropped without a value when the job unwound.
                Err(_) => Err(TaskError::Panicked),
            }
        }
    }
}
