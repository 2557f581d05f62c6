//! Concurrent task set with shared cancellation.
//!
//! A [`TaskGroup`] runs its tasks concurrently on the caller's task and is
//! bound to a child of the caller's [`CancellationToken`]. The first task to
//! fail cancels the group; tasks still in flight resolve to
//! [`Error::Cancelled`] at their next suspension point. Nothing is rolled
//! back: whatever a task already did to the runtime stays done.

use crate::{Error, Result};
use futures::future::{self, BoxFuture, Either};
use futures::stream::{FuturesUnordered, StreamExt};
use std::future::Future;
use std::pin::pin;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Drive `future` to completion unless `token` is cancelled first.
///
/// An already cancelled token never polls `future`.
pub async fn run_until_cancelled<F: Future>(
    token: &CancellationToken,
    future: F,
) -> Result<F::Output> {
    if token.is_cancelled() {
        return Err(Error::Cancelled);
    }
    match future::select(pin!(future), pin!(token.cancelled())).await {
        Either::Left((output, _)) => Ok(output),
        Either::Right(_) => Err(Error::Cancelled),
    }
}

/// A set of concurrent fallible tasks that fails fast
pub struct TaskGroup<'a> {
    token: CancellationToken,
    tasks: FuturesUnordered<BoxFuture<'a, Result<()>>>,
}

impl<'a> TaskGroup<'a> {
    /// Create a group cancelled along with `parent`
    pub fn new(parent: &CancellationToken) -> Self {
        Self {
            token: parent.child_token(),
            tasks: FuturesUnordered::new(),
        }
    }

    /// The group's token, for work that should stop with the group
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Add a task to the group
    pub fn spawn<F>(&mut self, task: F)
    where
        F: Future<Output = Result<()>> + Send + 'a,
    {
        let token = self.token.clone();
        self.tasks
            .push(Box::pin(async move { run_until_cancelled(&token, task).await? }));
    }

    /// Number of tasks not yet completed
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether the group has no pending tasks
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Wait for every task and return the first error, if any
    pub async fn wait(mut self) -> Result<()> {
        let mut first_error = None;
        while let Some(result) = self.tasks.next().await {
            if let Err(err) = result {
                if first_error.is_none() {
                    debug!("Task failed, cancelling {} sibling(s): {}", self.tasks.len(), err);
                    self.token.cancel();
                    first_error = Some(err);
                }
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
