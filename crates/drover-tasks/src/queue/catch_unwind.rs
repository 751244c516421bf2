use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::error::TaskError;
use crate::task::TaskResult;

/// Runs a task future and converts a panic in user code into a plain
/// task failure, so one misbehaving task cannot take a worker down.
#[must_use = "Futures are lazy, call `.await` to perform a task"]
pub(crate) struct CatchUnwindTaskFuture<'a> {
    future: BoxFuture<'a, TaskResult>,
}

impl<'a> CatchUnwindTaskFuture<'a> {
    pub(crate) fn new(future: BoxFuture<'a, TaskResult>) -> Self {
        Self { future }
    }
}

impl Future for CatchUnwindTaskFuture<'_> {
    type Output = TaskResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let future = &mut self.future;
        match std::panic::catch_unwind(AssertUnwindSafe(move || future.poll_unpin(cx))) {
            Ok(poll) => poll,
            Err(cause) => Poll::Ready(Err(TaskError::panicked(cause))),
        }
    }
}
