//! Races an operation against a deadline without cancelling it.
//!
//! The operation is spawned onto the runtime as soon as it is launched. When
//! the deadline wins, the join handle is dropped, which detaches the task: it
//! keeps running to completion and its result is discarded. Callers get
//! control back at the deadline and never wait for the abandoned work.

use std::{
    future::Future,
    time::Duration,
};
use tokio::{
    task::JoinHandle,
    time::Instant,
};

/// Terminal state of a guarded operation.
#[derive(Debug, PartialEq, Eq)]
pub enum Settled<T> {
    Completed(T),
    /// The operation panicked. Carries the panic description.
    Panicked(String),
    /// The deadline fired first. The operation may still be running.
    TimedOut(Duration),
}

impl<T> Settled<T> {
    pub fn completed(self) -> Option<T> {
        match self {
            Settled::Completed(value) => Some(value),
            _ => None,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutGuard {
    deadline: Option<Duration>,
}

impl TimeoutGuard {
    pub fn new(deadline: Option<Duration>) -> Self {
        Self { deadline }
    }

    /// A guard without a deadline. Panics are still contained.
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline
    }

    /// Spawns `operation` now. The deadline is measured from this call.
    pub fn launch<F>(&self, operation: F) -> Launched<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        Launched {
            handle: tokio::spawn(operation),
            deadline: self.deadline,
            started: Instant::now(),
        }
    }

    pub async fn run<F>(&self, operation: F) -> Settled<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.launch(operation).settle().await
    }

    /// Like [`TimeoutGuard::run`] but collapses every non-completed outcome to
    /// `fallback`.
    pub async fn run_or<F>(&self, operation: F, fallback: F::Output) -> F::Output
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.run(operation).await.completed().unwrap_or(fallback)
    }
}

/// An operation that is already running, waiting to be raced.
#[derive(Debug)]
pub struct Launched<T> {
    handle: JoinHandle<T>,
    deadline: Option<Duration>,
    started: Instant,
}

impl<T> Launched<T> {
    pub async fn settle(self) -> Settled<T> {
        let Self {
            handle,
            deadline,
            started,
        } = self;

        let joined = match deadline {
            Some(deadline) => {
                let remaining = deadline.saturating_sub(started.elapsed());
                match tokio::time::timeout(remaining, handle).await {
                    Ok(joined) => joined,
                    // Dropping the handle detaches the task.
                    Err(_) => return Settled::TimedOut(deadline),
                }
            }
            None => handle.await,
        };

        match joined {
            Ok(value) => Settled::Completed(value),
            Err(err) => Settled::Panicked(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        atomic::{
            AtomicBool,
            Ordering,
        },
        Arc,
    };

    #[tokio::test]
    async fn completes_within_deadline() {
        let guard = TimeoutGuard::new(Some(Duration::from_millis(500)));
        assert_eq!(guard.run(async { 7 }).await, Settled::Completed(7));
    }

    #[tokio::test]
    async fn deadline_returns_early_and_abandons_the_work() {
        let finished = Arc::new(AtomicBool::new(false));
        let guard = TimeoutGuard::new(Some(Duration::from_millis(50)));

        let started = std::time::Instant::now();
        let outcome = guard
            .run({
                let finished = finished.clone();
                async move {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    finished.store(true, Ordering::SeqCst);
                    1
                }
            })
            .await;

        assert_eq!(outcome, Settled::TimedOut(Duration::from_millis(50)));
        assert!(started.elapsed() < Duration::from_millis(180));
        assert!(!finished.load(Ordering::SeqCst));

        // The abandoned task keeps running to completion.
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn panics_are_contained() {
        let outcome = TimeoutGuard::unbounded()
            .run(async {
                if true {
                    panic!("probe exploded");
                }
                1
            })
            .await;
        assert!(matches!(outcome, Settled::Panicked(_)));
    }

    #[tokio::test]
    async fn fallback_on_expiry() {
        let guard = TimeoutGuard::new(Some(Duration::from_millis(10)));
        let value = guard
            .run_or(
                async {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    "late"
                },
                "fallback",
            )
            .await;
        assert_eq!(value, "fallback");
    }

    #[tokio::test]
    async fn deadline_counts_from_launch() {
        let guard = TimeoutGuard::new(Some(Duration::from_millis(60)));
        let launched = guard.launch(tokio::time::sleep(Duration::from_millis(100)));
        tokio::time::sleep(Duration::from_millis(40)).await;

        let before_settle = std::time::Instant::now();
        assert!(matches!(launched.settle().await, Settled::TimedOut(_)));
        assert!(before_settle.elapsed() < Duration::from_millis(55));
    }
}
