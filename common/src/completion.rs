//! One-shot completion for operations that report progress item by item
//!
//! A fan-out copy is made of many independent writes, each running in its own task. Every task
//! holds a [`Notifier`] and reports on it, while the caller awaits a single [`Completion`]. The
//! first signal decides the outcome, anything reported afterwards is ignored.
//!
//! Items report either [`Notifier::item_done`] or [`Notifier::item_failed`]; a failed item is
//! remembered and surfaces once the last item reported, so the completion never resolves while
//! writes are still in flight. [`Notifier::end`] and [`Notifier::error`] settle the outcome
//! immediately.
//!
//! ```
//! # async fn example() -> anyhow::Result<()> {
//! let (notifier, completion) = common::completion::completion(2);
//! for _ in 0..2 {
//!     let notifier = notifier.clone();
//!     tokio::spawn(async move { notifier.item_done() });
//! }
//! completion.wait().await?;
//! # Ok(())
//! # }
//! ```

use anyhow::anyhow;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

type Outcome = Result<(), anyhow::Error>;

#[derive(Debug)]
struct Latch {
    remaining: AtomicUsize,
    first_error: Mutex<Option<anyhow::Error>>,
    sender: Mutex<Option<tokio::sync::oneshot::Sender<Outcome>>>,
}

impl Latch {
    fn count_down(&self) {
        let previous = self
            .remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |remaining| {
                remaining.checked_sub(1)
            });
        if previous == Ok(1) {
            let outcome = match self.first_error.lock().take() {
                Some(error) => Err(error),
                None => Ok(()),
            };
            self.settle(outcome);
        }
    }

    fn settle(&self, outcome: Outcome) {
        let sender = self.sender.lock().take();
        match sender {
            Some(sender) => {
                // the receiver may already be gone, nobody is waiting then
                let _ = sender.send(outcome);
            }
            None => {
                if let Err(error) = outcome {
                    tracing::debug!("ignoring error reported after completion: {error:#}");
                }
            }
        }
    }
}

/// Reporting side, cheap to clone and hand to every task taking part in the operation
#[derive(Debug, Clone)]
pub struct Notifier {
    latch: Arc<Latch>,
}

impl Notifier {
    /// One item finished, the operation completes once all expected items did
    pub fn item_done(&self) {
        self.latch.count_down();
    }

    /// One item failed, the first such error is reported once all expected items finished
    pub fn item_failed(&self, error: anyhow::Error) {
        {
            let mut first_error = self.latch.first_error.lock();
            if first_error.is_none() {
                *first_error = Some(error);
            } else {
                tracing::debug!("additional item failure: {error:#}");
            }
        }
        self.latch.count_down();
    }

    /// The source has nothing more to report
    pub fn end(&self) {
        self.latch.settle(Ok(()));
    }

    /// The operation failed, nothing reported afterwards changes the outcome
    pub fn error(&self, error: anyhow::Error) {
        self.latch.settle(Err(error));
    }

    /// True once an outcome was decided
    pub fn is_settled(&self) -> bool {
        self.latch.sender.lock().is_none()
    }
}

/// Awaiting side, resolves exactly once
#[derive(Debug)]
pub struct Completion {
    receiver: tokio::sync::oneshot::Receiver<Outcome>,
}

impl Completion {
    pub async fn wait(self) -> Outcome {
        match self.receiver.await {
            Ok(outcome) => outcome,
            Err(_) => Err(anyhow!(
                "operation ended without signaling completion or failure"
            )),
        }
    }
}

/// Creates a completion expecting `total` item reports (done or failed).
///
/// With `total == 0` the completion is resolved immediately.
pub fn completion(total: usize) -> (Notifier, Completion) {
    let (sender, receiver) = tokio::sync::oneshot::channel();
    let notifier = Notifier {
        latch: Arc::new(Latch {
            remaining: AtomicUsize::new(total),
            first_error: Mutex::new(None),
            sender: Mutex::new(Some(sender)),
        }),
    };
    if total == 0 {
        notifier.end();
    }
    (notifier, Completion { receiver })
}
