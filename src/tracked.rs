//! A deferred value that can be shared between any number of waiters and
//! queried for settlement without blocking.
//!
//! The image cache publishes one `TrackedResult` per key *before* starting the
//! decode, so every concurrent caller clones the same handle and awaits the
//! same computation.

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;

#[derive(Clone)]
enum State<T> {
    Pending,
    Ready(T),
    /// The producer went away without settling.
    Abandoned,
}

/// Shared handle to a value that is being (or has been) computed.
pub struct TrackedResult<T> {
    inner: Arc<watch::Sender<State<T>>>,
}

impl<T> Clone for TrackedResult<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Write side of a pending [`TrackedResult`]. Settles at most once; dropping
/// it unsettled marks the result abandoned so waiters never hang.
pub struct Settler<T> {
    inner: Arc<watch::Sender<State<T>>>,
    done: bool,
}

impl<T: Clone + Send + Sync> TrackedResult<T> {
    /// Creates an unsettled result together with the handle used to settle it.
    pub fn pending() -> (Self, Settler<T>) {
        let (tx, _rx) = watch::channel(State::Pending);
        let inner = Arc::new(tx);
        (
            Self {
                inner: Arc::clone(&inner),
            },
            Settler { inner, done: false },
        )
    }

    /// A result that is settled from the start.
    pub fn ready(value: T) -> Self {
        let (tx, _rx) = watch::channel(State::Ready(value));
        Self { inner: Arc::new(tx) }
    }

    /// Non-blocking: has the producer finished (successfully or not)?
    pub fn is_settled(&self) -> bool {
        !matches!(*self.inner.borrow(), State::Pending)
    }

    /// The settled value, if any, without waiting.
    pub fn peek(&self) -> Option<T> {
        match &*self.inner.borrow() {
            State::Ready(v) => Some(v.clone()),
            _ => None,
        }
    }

    /// Waits for settlement. Returns `None` if the producer was abandoned.
    pub async fn wait(&self) -> Option<T> {
        let mut rx = self.inner.subscribe();
        let state = match rx.wait_for(|s| !matches!(s, State::Pending)).await {
            Ok(state) => state.clone(),
            // The sender lives inside `inner`, so this arm is unreachable while we hold `self`.
            Err(_) => State::Abandoned,
        };
        match state {
            State::Ready(v) => Some(v),
            _ => None,
        }
    }

    /// True when both handles refer to the same computation.
    pub fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T> Settler<T> {
    pub fn settle(mut self, value: T) {
        self.inner.send_replace(State::Ready(value));
        self.done = true;
    }
}

impl<T> Drop for Settler<T> {
    fn drop(&mut self) {
        if !self.done {
            self.inner.send_replace(State::Abandoned);
        }
    }
}

impl<T> fmt::Debug for TrackedResult<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &*self.inner.borrow() {
            State::Pending => "pending",
            State::Ready(_) => "ready",
            State::Abandoned => "abandoned",
        };
        f.debug_struct("TrackedResult").field("state", &state).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn settles_every_clone() {
        let (result, settler) = TrackedResult::<u32>::pending();
        let a = result.clone();
        let b = result.clone();
        assert!(!a.is_settled());

        let waiter = tokio::spawn(async move { b.wait().await });
        tokio::time::sleep(Duration::from_millis(5)).await;
        settler.settle(7);

        assert!(a.is_settled());
        assert_eq!(a.peek(), Some(7));
        assert_eq!(waiter.await.unwrap(), Some(7));
        assert!(a.same_as(&result));
    }

    #[tokio::test]
    async fn dropped_settler_releases_waiters() {
        let (result, settler) = TrackedResult::<u32>::pending();
        drop(settler);
        assert!(result.is_settled());
        assert_eq!(result.wait().await, None);
    }

    #[tokio::test]
    async fn ready_is_settled_immediately() {
        let result = TrackedResult::ready("x".to_string());
        assert!(result.is_settled());
        assert_eq!(result.wait().await.as_deref(), Some("x"));
        assert!(!result.same_as(&TrackedResult::ready("x".to_string())));
    }
}
