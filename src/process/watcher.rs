//! Completion watcher and the one-shot completion handle
//!
//! The watcher task owns the child. It publishes exactly one
//! [`ExitOutcome`] into a `watch` cell and then drops the sender, which is
//! the "closed" state. The same cell serves as the cached terminal result;
//! a shared flag makes the value deliverable to a single consumer.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::process::Child;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::debug;

use super::outcome::{classify, ExitOutcome};
use crate::error::AppError;

/// Request for the watcher to kill the immediate child; the reply carries
/// the result of issuing the kill.
pub(crate) type KillRequest = oneshot::Sender<io::Result<()>>;

/// One-shot completion notification returned by `App::start`.
#[derive(Debug, Clone)]
pub struct Completion {
    outcome: watch::Receiver<Option<ExitOutcome>>,
    delivered: Arc<AtomicBool>,
}

impl Completion {
    /// Wait for the published outcome.
    ///
    /// Only one consumer across all clones receives `Some`. Once the value
    /// has been taken every call returns `None` immediately.
    pub async fn recv(&mut self) -> Option<ExitOutcome> {
        if self.delivered.load(Ordering::Acquire) {
            return None;
        }

        let outcome = self.ready().await;

        if self.delivered.swap(true, Ordering::AcqRel) {
            None
        } else {
            outcome
        }
    }

    /// Cached outcome, without consuming the delivery.
    pub fn peek(&self) -> Option<ExitOutcome> {
        self.outcome.borrow().clone()
    }

    /// Whether the outcome has been published.
    pub fn is_ready(&self) -> bool {
        self.outcome.borrow().is_some()
    }

    /// Wait until the outcome is published, leaving the delivery in place.
    pub(crate) async fn ready(&mut self) -> Option<ExitOutcome> {
        let published = self
            .outcome
            .wait_for(Option::is_some)
            .await
            .map(|published| published.clone());

        match published {
            Ok(outcome) => outcome,
            // sender dropped without a value
            Err(_) => Some(ExitOutcome::Failed(AppError::WatcherAborted)),
        }
    }
}

/// Publishes the outcome on drop so waiters never hang, even if the task
/// unwinds before classification.
struct Publisher {
    tx: watch::Sender<Option<ExitOutcome>>,
    published: bool,
}

impl Publisher {
    fn publish(&mut self, outcome: ExitOutcome) {
        self.tx.send_replace(Some(outcome));
        self.published = true;
    }
}

impl Drop for Publisher {
    fn drop(&mut self) {
        if !self.published {
            self.tx
                .send_replace(Some(ExitOutcome::Failed(AppError::WatcherAborted)));
        }
    }
}

pub(crate) struct Watcher {
    pub(crate) completion: Completion,
    pub(crate) kill_tx: oneshot::Sender<KillRequest>,
    pub(crate) task: JoinHandle<()>,
}

/// Spawn the watcher for a freshly launched child.
pub(crate) fn spawn(mut child: Child, pid: Option<u32>) -> Watcher {
    let (tx, rx) = watch::channel(None);
    let (kill_tx, mut kill_rx) = oneshot::channel::<KillRequest>();

    let task = tokio::spawn(async move {
        let mut publisher = Publisher {
            tx,
            published: false,
        };

        let status = tokio::select! {
            status = child.wait() => status,
            Ok(reply) = &mut kill_rx => {
                let _ = reply.send(child.start_kill());
                child.wait().await
            }
        };

        let outcome = classify(status);
        debug!(?pid, ?outcome, "Process completed");
        publisher.publish(outcome);
        // publisher drops here, closing the channel
    });

    Watcher {
        completion: Completion {
            outcome: rx,
            delivered: Arc::new(AtomicBool::new(false)),
        },
        kill_tx,
        task,
    }
}
