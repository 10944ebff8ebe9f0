//! Single-resolution completion handle for submitted stage work.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::stage::ExecutorError;

/// Resolves once the submitted closure has run, on a worker or on the caller.
///
/// Resolves to `Err(ExecutorError::Abandoned)` if the closure panicked before
/// producing a value.
#[derive(Debug)]
pub struct StageTask<T> {
    rx: oneshot::Receiver<T>,
}

impl<T> StageTask<T> {
    pub(crate) fn new(rx: oneshot::Receiver<T>) -> Self {
        Self { rx }
    }

    /// Non-blocking check, used when the caller already ran the work inline.
    pub fn try_take(&mut self) -> Option<Result<T, ExecutorError>> {
        match self.rx.try_recv() {
            Ok(value) => Some(Ok(value)),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(ExecutorError::Abandoned)),
        }
    }
}

impl<T> Future for StageTask<T> {
    type Output = Result<T, ExecutorError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|res| res.map_err(|_| ExecutorError::Abandoned))
    }
}
