//! Cancellable fixed-interval polling.
//!
//! [`spawn_poll`] runs a tick closure on a fixed period until the closure breaks or the returned
//! [`PollHandle`] is stopped. Cancellation is observed while waiting for the next tick and while a
//! tick is in flight: the in-flight future is dropped, so a request that resolves after teardown
//! never gets to touch shared state.

use std::future::Future;
use std::ops::ControlFlow;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Handle to a running poll. Dropping the handle stops the poll.
#[derive(Debug)]
pub struct PollHandle {
    name: &'static str,
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl PollHandle {
    /// Signal the poll to stop. Idempotent.
    pub fn stop(&self) {
        if !self.token.is_cancelled() {
            tracing::debug!(poll = self.name, "Stopping poll");
            self.token.cancel();
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    /// True once the loop has exited, either because it was stopped or because a tick broke.
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(|t| t.is_finished())
    }

    /// Wait for the loop to exit without stopping it.
    pub async fn join(mut self) {
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    /// Stop the poll and wait for the loop to exit.
    pub async fn shutdown(self) {
        self.stop();
        self.join().await;
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        if self.task.is_some() {
            self.token.cancel();
        }
    }
}

/// Spawn a poll that calls `tick` every `period`, the first call one period after spawning.
///
/// Missed ticks are skipped rather than bunched up. The loop ends when `tick` returns
/// [`ControlFlow::Break`] or `token` (or the handle) is cancelled.
pub fn spawn_poll<F, Fut>(name: &'static str, period: Duration, token: CancellationToken, mut tick: F) -> PollHandle
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ControlFlow<()>> + Send + 'static,
{
    let loop_token = token.clone();
    let task = tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = loop_token.cancelled() => break,
                _ = interval.tick() => {}
            }

            let flow = tokio::select! {
                biased;
                _ = loop_token.cancelled() => break,
                flow = tick() => flow,
            };

            if flow.is_break() {
                break;
            }
        }

        tracing::debug!(poll = name, "Poll loop exited");
    });

    PollHandle {
        name,
        token,
        task: Some(task),
    }
}
