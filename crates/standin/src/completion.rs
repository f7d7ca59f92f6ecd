//! Deadline-bounded waiting on a single completion
//!
//! A [`Completer`] and a [`Waiter`] share a oneshot slot. The waiter blocks
//! the calling thread while driving a runtime until either the completer
//! fires or the deadline passes, whichever comes first. Once the wait is
//! over the slot is closed, so a completion that arrives late is rejected
//! and cannot change the outcome that was already returned.

use std::future::Future;
use std::time::Duration;

use tokio::runtime::Runtime;
use tokio::sync::oneshot;

/// How a bounded wait ended
#[derive(Debug, PartialEq, Eq)]
pub enum Outcome<T> {
    Completed(T),
    TimedOut,
    /// The completer was dropped without firing
    Abandoned,
}

/// Sending half of a completion
#[derive(Debug)]
pub struct Completer<T> {
    tx: Option<oneshot::Sender<T>>,
}

impl<T> Completer<T> {
    /// Deliver `value`; returns `false` if the waiter is already gone or
    /// this completer has fired before
    pub fn complete(&mut self, value: T) -> bool {
        match self.tx.take() {
            Some(tx) => tx.send(value).is_ok(),
            None => false,
        }
    }
}

/// Receiving half of a completion
#[derive(Debug)]
pub struct Waiter<T> {
    rx: oneshot::Receiver<T>,
}

/// Create a linked completer/waiter pair
pub fn completion<T>() -> (Completer<T>, Waiter<T>) {
    let (tx, rx) = oneshot::channel();
    (Completer { tx: Some(tx) }, Waiter { rx })
}

impl<T> Waiter<T> {
    /// Drive `runtime` on the current thread until completion or deadline
    ///
    /// Must not be called from inside an async context.
    pub fn wait(self, runtime: &Runtime, deadline: Duration) -> Outcome<T> {
        let mut rx = self.rx;
        let outcome = runtime.block_on(async {
            tokio::select! {
                biased;
                result = &mut rx => match result {
                    Ok(value) => Outcome::Completed(value),
                    Err(_) => Outcome::Abandoned,
                },
                _ = tokio::time::sleep(deadline) => Outcome::TimedOut,
            }
        });

        // Close before dropping so a racing sender sees a dead slot
        rx.close();
        outcome
    }
}

/// Run `future` on `runtime`, waiting at most `deadline` for its output
///
/// The future runs as its own task. If the deadline wins, the task is
/// aborted and anything it would still deliver is discarded.
pub fn run_with_deadline<F>(runtime: &Runtime, deadline: Duration, future: F) -> Outcome<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    let (mut completer, waiter) = completion();
    let task = runtime.spawn(async move {
        let value = future.await;
        if !completer.complete(value) {
            tracing::warn!("Discarding completion that arrived after the wait ended");
        }
    });

    let outcome = waiter.wait(runtime, deadline);
    if !matches!(outcome, Outcome::Completed(_)) {
        task.abort();
    }
    outcome
}
