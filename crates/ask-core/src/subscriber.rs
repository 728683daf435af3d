//! Bounded, history-retaining delivery channel.
//!
//! A [`Subscriber`] carries values from one producer to one consumer. Every
//! published value is appended to an unbounded history; live delivery goes
//! through a fixed-capacity queue and never blocks the producer. When the
//! queue is full the value is kept in history only, so [`Subscriber::history`]
//! is the complete record while a [`Subscription`] sees what was delivered
//! live.
//!
//! ```ignore
//! let channel = Subscriber::new(16);
//! let mut live = channel.subscribe();
//! channel.publish("hello".to_string());
//! channel.close();
//! while let Some(value) = live.recv().await {
//!     println!("{value}");
//! }
//! ```

use std::fmt;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Outcome of a single publish attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Recorded in history and handed to the live queue.
    Live,
    /// Recorded in history; the live queue was full.
    Dropped,
    /// The channel was already closed. Nothing was recorded.
    Closed,
    /// Recorded in history; the subscription has been dropped.
    Disconnected,
}

impl Delivery {
    /// Whether a producer should keep producing after this outcome.
    ///
    /// A full queue only means a slow consumer; a closed channel or a dropped
    /// subscription means nobody is listening any more.
    pub fn is_accepted(self) -> bool {
        matches!(self, Delivery::Live | Delivery::Dropped)
    }
}

struct State<T> {
    history: Vec<T>,
    /// `None` once closed. Dropping the only sender ends the subscription.
    sender: Option<mpsc::Sender<T>>,
}

struct Shared<T> {
    state: RwLock<State<T>>,
    receiver: Mutex<Option<mpsc::Receiver<T>>>,
    capacity: usize,
}

/// Single-producer, single-consumer channel with full history.
///
/// Cloning yields another handle to the same channel.
pub struct Subscriber<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Subscriber<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Clone> Subscriber<T> {
    /// Create a channel whose live queue holds at most `capacity` values.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            shared: Arc::new(Shared {
                state: RwLock::new(State {
                    history: Vec::new(),
                    sender: Some(tx),
                }),
                receiver: Mutex::new(Some(rx)),
                capacity,
            }),
        }
    }

    /// Publish a value. Returns true only if it was delivered live.
    ///
    /// A false return means either the channel is closed (the value was not
    /// recorded) or the live queue was full (the value is in history).
    /// Use [`Subscriber::deliver`] to tell the two apart.
    pub fn publish(&self, value: T) -> bool {
        self.deliver(value) == Delivery::Live
    }

    /// Publish a value and report exactly what happened to it.
    pub fn deliver(&self, value: T) -> Delivery {
        let mut state = self.write();
        let State { history, sender } = &mut *state;
        let Some(sender) = sender.as_ref() else {
            return Delivery::Closed;
        };

        history.push(value.clone());
        match sender.try_send(value) {
            Ok(()) => Delivery::Live,
            Err(TrySendError::Full(_)) => Delivery::Dropped,
            Err(TrySendError::Closed(_)) => Delivery::Disconnected,
        }
    }

    /// Take the live end of the channel.
    ///
    /// There is one consumer per channel: the first call gets the queue, later
    /// calls get a subscription that is already finished. Values still queued
    /// when the channel is closed are yielded before the subscription ends.
    pub fn subscribe(&self) -> Subscription<T> {
        let receiver = self
            .shared
            .receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        Subscription { receiver }
    }

    /// Close the channel. Idempotent.
    pub fn close(&self) {
        self.write().sender.take();
    }

    pub fn is_closed(&self) -> bool {
        self.read().sender.is_none()
    }

    /// Snapshot of every value ever published, including ones that missed
    /// live delivery.
    pub fn history(&self) -> Vec<T> {
        self.read().history.clone()
    }

    /// Run `f` over the history without copying it.
    pub fn with_history<R>(&self, f: impl FnOnce(&[T]) -> R) -> R {
        f(&self.read().history)
    }

    pub fn find_first(&self, predicate: impl Fn(&T) -> bool) -> Option<T> {
        self.read().history.iter().find(|v| predicate(v)).cloned()
    }

    /// Value at `index`; negative indexes count from the end (`-1` is last).
    pub fn history_at(&self, index: isize) -> Option<T> {
        let state = self.read();
        let len = state.history.len() as isize;
        let index = if index < 0 { len + index } else { index };
        if index < 0 || index >= len {
            return None;
        }
        state.history.get(index as usize).cloned()
    }

    pub fn len(&self) -> usize {
        self.read().history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().history.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    fn read(&self) -> RwLockReadGuard<'_, State<T>> {
        self.shared
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, State<T>> {
        self.shared
            .state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Clone> fmt::Debug for Subscriber<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("published", &self.len())
            .field("capacity", &self.shared.capacity)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Live end of a [`Subscriber`].
pub struct Subscription<T> {
    receiver: Option<mpsc::Receiver<T>>,
}

impl<T> Subscription<T> {
    /// Next live value, or `None` once the channel is closed and drained.
    pub async fn recv(&mut self) -> Option<T> {
        match self.receiver.as_mut() {
            Some(rx) => rx.recv().await,
            None => None,
        }
    }
}

impl<T> Stream for Subscription<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        match self.get_mut().receiver.as_mut() {
            Some(rx) => rx.poll_recv(cx),
            None => Poll::Ready(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[test]
    fn test_publish_after_close() {
        let channel = Subscriber::new(4);
        assert!(channel.publish(1));
        channel.close();
        channel.close();

        assert!(!channel.publish(2));
        assert_eq!(channel.deliver(3), Delivery::Closed);
        assert_eq!(channel.history(), vec![1]);
        assert!(channel.is_closed());
    }

    #[test]
    fn test_history_keeps_values_dropped_from_live_queue() {
        let channel = Subscriber::new(2);
        let delivered: Vec<bool> = (0..5).map(|i| channel.publish(i)).collect();

        assert_eq!(delivered, vec![true, true, false, false, false]);
        assert_eq!(channel.len(), 5);
        assert_eq!(channel.history(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_subscription_ends_after_close_and_drain() {
        let channel = Subscriber::new(8);
        let live = channel.subscribe();
        for i in 0..3 {
            channel.publish(i);
        }
        channel.close();

        let received: Vec<i32> = live.collect().await;
        assert_eq!(received, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_subscribe_after_close() {
        let empty: Subscriber<u8> = Subscriber::new(4);
        empty.close();
        assert_eq!(empty.subscribe().next().await, None);

        let pending = Subscriber::new(4);
        pending.publish("queued");
        pending.close();
        let drained: Vec<&str> = pending.subscribe().collect().await;
        assert_eq!(drained, vec!["queued"]);
    }

    #[tokio::test]
    async fn test_second_subscription_is_finished() {
        let channel = Subscriber::new(4);
        let _first = channel.subscribe();
        channel.publish(7);

        let mut second = channel.subscribe();
        assert_eq!(second.recv().await, None);
    }

    #[tokio::test]
    async fn test_subscription_waits_for_producer() {
        let channel = Subscriber::new(4);
        let mut live = channel.subscribe();

        let producer = channel.clone();
        let handle = tokio::spawn(async move {
            for word in ["a", "b"] {
                tokio::task::yield_now().await;
                producer.publish(word.to_string());
            }
            producer.close();
        });

        assert_eq!(live.recv().await.as_deref(), Some("a"));
        assert_eq!(live.recv().await.as_deref(), Some("b"));
        assert_eq!(live.recv().await, None);
        handle.await.unwrap();
    }

    #[test]
    fn test_dropped_subscription_disconnects() {
        let channel = Subscriber::new(4);
        drop(channel.subscribe());

        let outcome = channel.deliver(1);
        assert_eq!(outcome, Delivery::Disconnected);
        assert!(!outcome.is_accepted());
        assert_eq!(channel.history(), vec![1]);
    }

    #[test]
    fn test_history_queries() {
        let channel = Subscriber::new(1);
        for word in ["alpha", "beta", "gamma"] {
            channel.publish(word);
        }

        assert_eq!(channel.history_at(0), Some("alpha"));
        assert_eq!(channel.history_at(-1), Some("gamma"));
        assert_eq!(channel.history_at(-3), Some("alpha"));
        assert_eq!(channel.history_at(3), None);
        assert_eq!(channel.history_at(-4), None);
        assert_eq!(channel.find_first(|w| w.starts_with('b')), Some("beta"));
        assert_eq!(channel.find_first(|w| w.is_empty()), None);

        let empty: Subscriber<u8> = Subscriber::new(1);
        assert_eq!(empty.history_at(-1), None);
    }

    #[test]
    fn test_publish_races_close() {
        let channel = Subscriber::new(16);
        let producer = channel.clone();
        let handle = std::thread::spawn(move || {
            (0..1000)
                .filter(|i| producer.deliver(*i) != Delivery::Closed)
                .count()
        });
        channel.close();

        let recorded = handle.join().unwrap();
        assert_eq!(channel.len(), recorded);
    }
}
