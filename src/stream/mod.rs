//! Event stream paired with a single eventual result.
//!
//! [`event_stream`] returns a producer ([`EventSender`]) and a consumer
//! ([`EventStream`]). Events travel through a bounded channel; the terminal
//! value lives in a write-once settlement cell so every reader of
//! [`EventStream::result`] sees the same outcome.

use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::ReceiverStream;

use crate::error::{ConductorError, SharedError};

/// Buffer size used when a caller does not pick one.
pub const DEFAULT_CAPACITY: usize = 64;

type Settlement<R> = Option<Result<R, SharedError>>;

struct Shared<T, R> {
    events: Mutex<Option<mpsc::Sender<T>>>,
    outcome: watch::Sender<Settlement<R>>,
}

/// Create a connected producer/consumer pair with the given buffer capacity.
pub fn event_stream<T, R>(capacity: usize) -> (EventSender<T, R>, EventStream<T, R>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let (outcome_tx, outcome_rx) = watch::channel(None);
    let sender = EventSender {
        shared: Arc::new(Shared {
            events: Mutex::new(Some(tx)),
            outcome: outcome_tx,
        }),
    };
    let stream = EventStream {
        events: ReceiverStream::new(rx),
        outcome: Outcome { rx: outcome_rx },
    };
    (sender, stream)
}

/// Producer half. Cheap to clone; all clones feed the same stream.
pub struct EventSender<T, R> {
    shared: Arc<Shared<T, R>>,
}

impl<T, R> Clone for EventSender<T, R> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T, R> std::fmt::Debug for EventSender<T, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSender")
            .field("settled", &self.is_settled())
            .finish()
    }
}

impl<T, R> EventSender<T, R> {
    /// Publish one event, waiting for buffer space.
    ///
    /// After the stream is settled, or once the consumer is gone, events are dropped.
    pub async fn push(&self, event: T) {
        let tx = match self.shared.events.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        if let Some(tx) = tx {
            let _ = tx.send(event).await;
        }
    }

    /// Settle with a value. Only the first settlement counts.
    pub fn end(&self, result: R) {
        self.settle(Ok(result));
    }

    /// Settle with an error. Only the first settlement counts.
    pub fn end_with_error(&self, error: ConductorError) {
        self.settle(Err(Arc::new(error)));
    }

    pub fn is_settled(&self) -> bool {
        self.shared.outcome.borrow().is_some()
    }

    fn settle(&self, result: Result<R, SharedError>) {
        // Closing the channel first means no push can start after settlement.
        match self.shared.events.lock() {
            Ok(mut guard) => drop(guard.take()),
            Err(poisoned) => drop(poisoned.into_inner().take()),
        }
        self.shared.outcome.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(result);
            true
        });
    }
}

/// Awaitable handle on the terminal value, detachable from the event sequence.
pub struct Outcome<R> {
    rx: watch::Receiver<Settlement<R>>,
}

impl<R> Clone for Outcome<R> {
    fn clone(&self) -> Self {
        Self {
            rx: self.rx.clone(),
        }
    }
}

impl<R: Clone> Outcome<R> {
    /// Wait for settlement. Repeated calls return the same value or error.
    pub async fn wait(&self) -> Result<R, SharedError> {
        let mut rx = self.rx.clone();
        let settled = match rx.wait_for(Option::is_some).await {
            Ok(value) => value.clone(),
            Err(_) => None,
        };
        settled.unwrap_or_else(|| {
            Err(Arc::new(ConductorError::Stream(
                "event stream producer dropped before settlement".to_string(),
            )))
        })
    }
}

/// Consumer half: a finite, single-pass [`Stream`] of events plus the result.
pub struct EventStream<T, R> {
    events: ReceiverStream<T>,
    outcome: Outcome<R>,
}

// No field is structurally pinned.
impl<T, R> Unpin for EventStream<T, R> {}

impl<T, R> EventStream<T, R> {
    /// Detached handle on the terminal value.
    pub fn outcome(&self) -> Outcome<R> {
        self.outcome.clone()
    }
}

impl<T, R: Clone> EventStream<T, R> {
    /// Wait for the terminal value without consuming events.
    pub async fn result(&self) -> Result<R, SharedError> {
        self.outcome.wait().await
    }

    /// Drain every remaining event, then return them with the result.
    pub async fn collect(mut self) -> (Vec<T>, Result<R, SharedError>) {
        use futures::StreamExt;

        let mut events = Vec::new();
        while let Some(event) = self.next().await {
            events.push(event);
        }
        let result = self.outcome.wait().await;
        (events, result)
    }
}

impl<T, R> Stream for EventStream<T, R> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        Pin::new(&mut self.events).poll_next(cx)
    }
}
