//! Single-assignment completion.
//!
//! The first value written wins; every later write is a no-op that
//! returns `false`. Any number of observers can wait for the value, from a
//! plain thread or from an async task.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

/// Write side of a completion.
pub struct CompletionSink<T> {
    tx: Arc<watch::Sender<Option<T>>>,
}

/// Read side of a completion.
pub struct Completion<T> {
    rx: watch::Receiver<Option<T>>,
}

/// Create a connected sink/completion pair.
pub fn completion<T: Clone>() -> (CompletionSink<T>, Completion<T>) {
    let (tx, rx) = watch::channel(None);
    (CompletionSink { tx: Arc::new(tx) }, Completion { rx })
}

impl<T> CompletionSink<T> {
    /// Assign the value. Returns `false` if a value was already assigned,
    /// in which case `value` is dropped.
    pub fn complete(&self, value: T) -> bool {
        self.tx.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(value);
            true
        })
    }

    /// Whether a value has been assigned.
    pub fn is_complete(&self) -> bool {
        self.tx.borrow().is_some()
    }
}

impl<T: Clone> Completion<T> {
    /// Whether a value has been assigned.
    pub fn is_complete(&self) -> bool {
        self.rx.borrow().is_some()
    }

    /// The assigned value, without waiting.
    pub fn try_get(&self) -> Option<T> {
        (*self.rx.borrow()).clone()
    }

    /// Wait for the value.
    ///
    /// Returns `None` if every sink was dropped without assigning one.
    pub async fn assigned(&self) -> Option<T> {
        let mut rx = self.rx.clone();
        let value = match rx.wait_for(Option::is_some).await {
            Ok(value) => (*value).clone(),
            Err(_) => None,
        };
        value
    }

    /// Block the current thread until the value is assigned.
    ///
    /// Returns `None` if every sink was dropped without assigning one.
    pub fn wait(&self) -> Option<T> {
        futures::executor::block_on(self.assigned())
    }

    /// Block the current thread until the value is assigned or `timeout`
    /// elapses.
    ///
    /// Drives its own timer, so it must not be called from inside a tokio
    /// runtime; use [`Completion::assigned`] with `tokio::time::timeout` there.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<T> {
        if let Some(value) = self.try_get() {
            return Some(value);
        }
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .ok()?;
        runtime.block_on(async {
            tokio::time::timeout(timeout, self.assigned())
                .await
                .ok()
                .flatten()
        })
    }
}

impl<T> Clone for CompletionSink<T> {
    fn clone(&self) -> Self {
        Self {
            tx: Arc::clone(&self.tx),
        }
    }
}

impl<T> Clone for Completion<T> {
    fn clone(&self) -> Self {
        Self {
            rx: self.rx.clone(),
        }
    }
}

impl<T> fmt::Debug for CompletionSink<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionSink")
            .field("complete", &self.is_complete())
            .finish()
    }
}

impl<T> fmt::Debug for Completion<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("complete", &self.rx.borrow().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn first_write_wins() {
        let (sink, done) = completion::<u32>();
        assert!(!done.is_complete());

        assert!(sink.complete(1));
        assert!(!sink.complete(2));
        assert!(!sink.clone().complete(3));

        assert_eq!(done.try_get(), Some(1));
        assert_eq!(done.wait(), Some(1));
    }

    #[test]
    fn wait_timeout_expires_without_value() {
        let (_sink, done) = completion::<u32>();
        assert_eq!(done.wait_timeout(Duration::from_millis(20)), None);
    }

    #[test]
    fn dropped_sinks_release_waiters() {
        let (sink, done) = completion::<u32>();
        let waiter = thread::spawn(move || done.wait());

        thread::sleep(Duration::from_millis(10));
        drop(sink);

        assert_eq!(waiter.join().expect("waiter should finish"), None);
    }

    #[test]
    fn value_outlives_its_sinks() {
        let (sink, done) = completion::<u32>();
        sink.complete(7);
        drop(sink);
        assert_eq!(done.wait(), Some(7));
    }

    #[test]
    fn waiters_on_other_threads_see_the_value() {
        let (sink, done) = completion::<&'static str>();
        let observers: Vec<_> = (0..3)
            .map(|_| {
                let done = done.clone();
                thread::spawn(move || done.wait())
            })
            .collect();

        thread::sleep(Duration::from_millis(10));
        assert!(sink.complete("done"));

        for observer in observers {
            let seen = observer.join().expect("observer should finish");
            assert_eq!(seen, Some("done"));
        }
    }

    #[test]
    fn racing_writers_assign_exactly_once() {
        let (sink, done) = completion::<usize>();
        let writers: Vec<_> = (0..8)
            .map(|i| {
                let sink = sink.clone();
                thread::spawn(move || sink.complete(i))
            })
            .collect();

        let wins = writers
            .into_iter()
            .map(|w| w.join().expect("writer should finish"))
            .filter(|won| *won)
            .count();

        assert_eq!(wins, 1);
        assert!(done.wait_timeout(Duration::from_secs(1)).is_some());
    }

    #[tokio::test]
    async fn async_observers_see_the_value() {
        let (sink, done) = completion::<u32>();
        let observer = tokio::spawn(async move { done.assigned().await });

        tokio::task::yield_now().await;
        sink.complete(5);

        assert_eq!(observer.await.expect("observer should finish"), Some(5));
    }
}
