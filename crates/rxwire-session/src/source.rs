//! Demand-driven payload sources for the write sequencer.
//!
//! A source hands out one item per unit of demand. The sequencer never asks
//! for the next item before the previous one is confirmed sent, which is what
//! keeps a session's frames in source order.

use std::convert::Infallible;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use futures::executor::block_on;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;

/// One signal from a payload source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal<E> {
    /// The next payload.
    Next(Bytes),
    /// No more payloads.
    Complete,
    /// The source failed.
    Error(E),
}

/// A pull-one-at-a-time payload source.
pub trait DemandSource {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Grant one unit of demand and wait for the answer.
    ///
    /// Returns `None` if `cancel` fires before the source answers.
    fn request(&mut self, cancel: &CancellationToken) -> Option<Signal<Self::Error>>;

    /// Release the subscription. No further requests follow.
    fn cancel(&mut self) {}
}

impl<S: DemandSource + ?Sized> DemandSource for &mut S {
    type Error = S::Error;

    fn request(&mut self, cancel: &CancellationToken) -> Option<Signal<Self::Error>> {
        (**self).request(cancel)
    }

    fn cancel(&mut self) {
        (**self).cancel();
    }
}

/// A source backed by an iterator of fallible payloads.
#[derive(Debug)]
pub struct IterSource<I> {
    iter: I,
    done: bool,
}

/// Wrap an iterator of `Result`s as a [`DemandSource`].
pub fn iter_source<I, T, E>(iter: I) -> IterSource<I::IntoIter>
where
    I: IntoIterator<Item = Result<T, E>>,
    T: Into<Bytes>,
    E: std::error::Error + Send + Sync + 'static,
{
    IterSource {
        iter: iter.into_iter(),
        done: false,
    }
}

/// Wrap an iterator of payloads that cannot fail as a [`DemandSource`].
pub fn iter_ok<I>(iter: I) -> IterSource<OkIter<I::IntoIter>>
where
    I: IntoIterator,
    I::Item: Into<Bytes>,
{
    iter_source(OkIter(iter.into_iter()))
}

/// Adapter behind [`iter_ok`].
#[derive(Debug)]
pub struct OkIter<I>(I);

impl<I> Iterator for OkIter<I>
where
    I: Iterator,
    I::Item: Into<Bytes>,
{
    type Item = Result<Bytes, Infallible>;

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next().map(|item| Ok(item.into()))
    }
}

impl<I, T, E> DemandSource for IterSource<I>
where
    I: Iterator<Item = Result<T, E>>,
    T: Into<Bytes>,
    E: std::error::Error + Send + Sync + 'static,
{
    type Error = E;

    fn request(&mut self, cancel: &CancellationToken) -> Option<Signal<E>> {
        if cancel.is_cancelled() {
            return None;
        }
        if self.done {
            return Some(Signal::Complete);
        }

        match self.iter.next() {
            Some(Ok(item)) => Some(Signal::Next(item.into())),
            Some(Err(err)) => {
                self.done = true;
                Some(Signal::Error(err))
            }
            None => {
                self.done = true;
                Some(Signal::Complete)
            }
        }
    }

    fn cancel(&mut self) {
        self.done = true;
    }
}

/// Returned by [`DemandSender::send`] when the consumer is gone.
/// Carries the payload back.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("demand channel cancelled")]
pub struct SendError(pub Bytes);

enum Message<E> {
    Item(Bytes),
    Complete,
    Error(E),
}

/// Create a capacity-one handoff between a producer thread and a sequencer.
///
/// Demand travels as semaphore permits, one per [`DemandSource::request`].
/// The producer's [`DemandSender::send`] waits for a permit first, so a
/// producer can never run ahead of confirmed publishes. Terminal signals
/// need no demand.
pub fn demand_channel<E>() -> (DemandSender<E>, DemandReceiver<E>) {
    let demand = Arc::new(Semaphore::new(0));
    let (tx, rx) = mpsc::unbounded_channel();
    (
        DemandSender {
            demand: Arc::clone(&demand),
            tx,
        },
        DemandReceiver {
            demand,
            rx,
            finished: false,
        },
    )
}

/// Producer half of [`demand_channel`]. Dropping it completes the sequence.
pub struct DemandSender<E> {
    demand: Arc<Semaphore>,
    tx: mpsc::UnboundedSender<Message<E>>,
}

impl<E> DemandSender<E> {
    /// Hand over one payload, blocking the thread until there is demand.
    pub fn send(&self, payload: impl Into<Bytes>) -> Result<(), SendError> {
        let payload = payload.into();
        match block_on(self.demand.acquire()) {
            Ok(permit) => permit.forget(),
            Err(_) => return Err(SendError(payload)),
        }
        self.tx
            .send(Message::Item(payload.clone()))
            .map_err(|_| SendError(payload))
    }

    /// Finish the sequence successfully.
    pub fn complete(self) {
        let _ = self.tx.send(Message::Complete);
    }

    /// Finish the sequence with an error.
    pub fn error(self, err: E) {
        let _ = self.tx.send(Message::Error(err));
    }

    /// Outstanding demand not yet answered by [`DemandSender::send`].
    pub fn requested(&self) -> u64 {
        self.demand.available_permits() as u64
    }

    /// True once the consumer has cancelled or gone away.
    pub fn is_cancelled(&self) -> bool {
        self.demand.is_closed() || self.tx.is_closed()
    }
}

impl<E> fmt::Debug for DemandSender<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DemandSender")
            .field("requested", &self.requested())
            .finish()
    }
}

/// Consumer half of [`demand_channel`]. Dropping it cancels the sequence.
pub struct DemandReceiver<E> {
    demand: Arc<Semaphore>,
    rx: mpsc::UnboundedReceiver<Message<E>>,
    finished: bool,
}

impl<E> DemandReceiver<E> {
    fn close(&mut self) {
        self.demand.close();
        self.rx.close();
    }

    /// Take back a permit the producer never claimed.
    fn revoke(&self) {
        if let Ok(permit) = self.demand.try_acquire() {
            permit.forget();
        }
    }
}

impl<E> DemandSource for DemandReceiver<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    type Error = E;

    fn request(&mut self, cancel: &CancellationToken) -> Option<Signal<E>> {
        if self.demand.is_closed() {
            return None;
        }
        if self.finished {
            return Some(Signal::Complete);
        }
        self.demand.add_permits(1);

        let rx = &mut self.rx;
        let received = block_on(async {
            tokio::select! {
                biased;
                message = rx.recv() => Some(message),
                _ = cancel.cancelled() => None,
            }
        });

        match received {
            None => {
                self.revoke();
                None
            }
            Some(Some(Message::Item(item))) => Some(Signal::Next(item)),
            Some(Some(Message::Error(err))) => {
                self.finished = true;
                Some(Signal::Error(err))
            }
            Some(Some(Message::Complete)) | Some(None) => {
                self.finished = true;
                Some(Signal::Complete)
            }
        }
    }

    fn cancel(&mut self) {
        self.close();
    }
}

impl<E> Drop for DemandReceiver<E> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<E> fmt::Debug for DemandReceiver<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DemandReceiver")
            .field("demand", &self.demand.available_permits())
            .field("cancelled", &self.demand.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Duration;

    use super::*;

    #[derive(Debug, PartialEq, Eq, thiserror::Error)]
    #[error("boom")]
    struct Boom;

    #[test]
    fn iter_ok_yields_items_then_completes() {
        let mut source = iter_ok(["a", "b"]);
        let cancel = CancellationToken::new();

        assert_eq!(source.request(&cancel), Some(Signal::Next(Bytes::from("a"))));
        assert_eq!(source.request(&cancel), Some(Signal::Next(Bytes::from("b"))));
        assert_eq!(source.request(&cancel), Some(Signal::Complete));
        assert_eq!(source.request(&cancel), Some(Signal::Complete));
    }

    #[test]
    fn iter_source_stops_after_error() {
        let mut source = iter_source([Ok("a"), Err(Boom), Ok("never")]);
        let cancel = CancellationToken::new();

        assert!(matches!(source.request(&cancel), Some(Signal::Next(_))));
        assert!(matches!(source.request(&cancel), Some(Signal::Error(Boom))));
        assert!(matches!(source.request(&cancel), Some(Signal::Complete)));
    }

    #[test]
    fn cancelled_token_yields_nothing() {
        let mut source = iter_ok(["a"]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(source.request(&cancel).is_none());
    }

    #[test]
    fn sender_waits_for_demand() {
        let (tx, mut rx) = demand_channel::<Boom>();
        let producer = thread::spawn(move || {
            tx.send("first").unwrap();
            tx.send("second").unwrap();
            tx.complete();
        });

        let cancel = CancellationToken::new();
        assert_eq!(rx.request(&cancel), Some(Signal::Next(Bytes::from("first"))));
        assert_eq!(rx.request(&cancel), Some(Signal::Next(Bytes::from("second"))));
        assert!(matches!(rx.request(&cancel), Some(Signal::Complete)));
        producer.join().unwrap();
    }

    #[test]
    fn no_demand_means_no_progress() {
        let (tx, rx) = demand_channel::<Boom>();
        let producer = thread::spawn(move || {
            let result = tx.send("blocked");
            (result, tx.requested())
        });

        thread::sleep(Duration::from_millis(20));
        drop(rx);

        let (result, requested) = producer.join().unwrap();
        assert_eq!(result, Err(SendError(Bytes::from("blocked"))));
        assert_eq!(requested, 0);
    }

    #[test]
    fn dropping_sender_completes() {
        let (tx, mut rx) = demand_channel::<Boom>();
        drop(tx);
        assert!(matches!(
            rx.request(&CancellationToken::new()),
            Some(Signal::Complete)
        ));
    }

    #[test]
    fn error_needs_no_demand() {
        let (tx, mut rx) = demand_channel::<Boom>();
        tx.error(Boom);
        assert!(matches!(
            rx.request(&CancellationToken::new()),
            Some(Signal::Error(Boom))
        ));
    }

    #[test]
    fn request_observes_cancellation() {
        let (tx, mut rx) = demand_channel::<Boom>();
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            trigger.cancel();
        });

        assert!(rx.request(&cancel).is_none());
        canceller.join().unwrap();
        assert_eq!(tx.requested(), 0);
    }

    #[test]
    fn cancelled_request_leaves_the_channel_usable() {
        let (tx, mut rx) = demand_channel::<Boom>();
        let cancelled = CancellationToken::new();
        cancelled.cancel();
        assert!(rx.request(&cancelled).is_none());
        assert_eq!(tx.requested(), 0);

        let producer = thread::spawn(move || tx.send("after"));
        let cancel = CancellationToken::new();
        assert_eq!(rx.request(&cancel), Some(Signal::Next(Bytes::from("after"))));
        assert_eq!(producer.join().unwrap(), Ok(()));
        assert!(matches!(rx.request(&cancel), Some(Signal::Complete)));
    }

    #[test]
    fn receiver_cancel_releases_producer() {
        let (tx, mut rx) = demand_channel::<Boom>();
        rx.cancel();
        assert!(tx.is_cancelled());
        assert!(tx.send("late").is_err());
    }
}
