//! Progress events for uploads and downloads.
//!
//! # Design
//! Each transfer runs as its own Tokio task that feeds a bounded channel. The
//! consumer holds a `Transfer`, which is a `Stream` of
//! `Result<ProgressEvent<T>, NetworkError>`: any number of `Progress` items,
//! then exactly one terminal item (a `Completed` value or an error), then
//! `None`. Dropping the `Transfer` aborts the task, which drops the in-flight
//! transport future.
//!
//! Progress items are best effort. When the channel is full they are skipped;
//! the terminal item always waits for capacity.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{ready, Context, Poll};

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{NetworkError, Result};
use crate::transport::ProgressHandler;

const CHANNEL_CAPACITY: usize = 64;

/// One item of a transfer's event sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent<T> {
    /// Fraction of the transfer done, within `[0, 1]`.
    Progress(f64),
    Completed(T),
}

impl<T> ProgressEvent<T> {
    pub fn fraction(&self) -> Option<f64> {
        match self {
            ProgressEvent::Progress(fraction) => Some(*fraction),
            ProgressEvent::Completed(_) => None,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, ProgressEvent::Completed(_))
    }
}

/// `transferred / expected`, or `None` when the total is unknown or zero.
pub fn fraction(transferred: u64, expected: Option<u64>) -> Option<f64> {
    match expected {
        Some(total) if total > 0 => Some((transferred as f64 / total as f64).clamp(0.0, 1.0)),
        _ => None,
    }
}

type Item<T> = Result<ProgressEvent<T>>;

/// Producer half of a transfer.
pub(crate) struct ProgressSender<T> {
    events: mpsc::Sender<Item<T>>,
    last: Mutex<Option<f64>>,
}

impl<T: Send + 'static> ProgressSender<T> {
    /// A byte-count callback for the transport, translating into fractions.
    pub(crate) fn observer(self: &Arc<Self>) -> ProgressHandler {
        let sender = Arc::clone(self);
        Arc::new(move |transferred, expected| sender.report(transferred, expected))
    }

    fn report(&self, transferred: u64, expected: Option<u64>) {
        let Some(fraction) = fraction(transferred, expected) else {
            return;
        };
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        if last.is_some_and(|previous| fraction <= previous) {
            return;
        }
        *last = Some(fraction);
        let _ = self.events.try_send(Ok(ProgressEvent::Progress(fraction)));
    }

    /// Emit the terminal item. The receiver may already be gone.
    pub(crate) async fn finish(&self, outcome: Result<T>) {
        let _ = self.events.send(outcome.map(ProgressEvent::Completed)).await;
    }
}

/// Consumer half of a transfer: a single-pass stream of progress events.
pub struct Transfer<T> {
    events: mpsc::Receiver<Item<T>>,
    task: Option<JoinHandle<()>>,
    finished: bool,
}

impl<T: Send + 'static> Transfer<T> {
    /// Run `producer` on a new Tokio task. Must be called inside a runtime.
    pub(crate) fn spawn<F, Fut>(producer: F) -> Self
    where
        F: FnOnce(Arc<ProgressSender<T>>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let sender = Arc::new(ProgressSender {
            events: tx,
            last: Mutex::new(None),
        });
        let task = tokio::spawn(producer(sender));
        Self {
            events: rx,
            task: Some(task),
            finished: false,
        }
    }

    /// Skip progress and wait for the terminal outcome.
    pub async fn completion(mut self) -> Result<T> {
        while let Some(event) = self.next().await {
            if let ProgressEvent::Completed(value) = event? {
                return Ok(value);
            }
        }
        Err(NetworkError::Unknown)
    }
}

impl<T> Transfer<T> {
    /// Abort the transfer. Equivalent to dropping it.
    pub fn cancel(mut self) {
        self.abort();
    }

    /// True once the terminal item has been yielded.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn abort(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// Nothing in `Transfer` is structurally pinned.
impl<T> Unpin for Transfer<T> {}

impl<T> Stream for Transfer<T> {
    type Item = Item<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }
        match ready!(this.events.poll_recv(cx)) {
            Some(Ok(ProgressEvent::Progress(fraction))) => {
                Poll::Ready(Some(Ok(ProgressEvent::Progress(fraction))))
            }
            Some(terminal) => {
                this.finished = true;
                this.events.close();
                Poll::Ready(Some(terminal))
            }
            // The producer died without a terminal item.
            None => {
                this.finished = true;
                Poll::Ready(Some(Err(NetworkError::Unknown)))
            }
        }
    }
}

impl<T> Drop for Transfer<T> {
    fn drop(&mut self) {
        self.abort();
    }
}

impl<T> std::fmt::Debug for Transfer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transfer")
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}
