use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use thiserror::Error;
use tokio::sync::oneshot;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TaskError {
    #[error("task was cancelled before it completed")]
    Cancelled,

    #[error("task panicked")]
    Panicked,
}

/// Resolves to the output of a submitted task.
///
/// Dropping the handle does not cancel the task; its output is discarded.
#[derive(Debug)]
pub struct TaskHandle<T> {
    rx: oneshot::Receiver<Result<T, TaskError>>,
}

impl<T> TaskHandle<T> {
    pub(super) fn channel() -> (TaskCompletion<T>, Self) {
        let (tx, rx) = oneshot::channel();
        (TaskCompletion { tx: Some(tx) }, Self { rx })
    }
}

impl<T> Future for TaskHandle<T> {
    type Output = Result<T, TaskError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(TaskError::Cancelled)),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Sending half of a `TaskHandle`. Dropping it unfinished resolves the handle
/// to `Cancelled`.
pub(super) struct TaskCompletion<T> {
    tx: Option<oneshot::Sender<Result<T, TaskError>>>,
}

impl<T> TaskCompletion<T> {
    pub(super) fn finish(mut self, result: Result<T, TaskError>) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(result);
        }
    }
}

impl<T> Drop for TaskCompletion<T> {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(Err(TaskError::Cancelled));
        }
    }
}
