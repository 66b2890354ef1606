//! Readiness gates and the shutdown token.
//!
//! A [`Signal`] is a binary gate: [`Signal::give`] raises it and
//! [`Signal::take`] blocks until it is raised, then lowers it again. Giving
//! an already-raised gate does nothing, so a waiter that arrives late sees the
//! condition as already satisfied rather than counting multiple events.
//!
//! Waits are unbounded by default. Callers may pass a timeout and a
//! [`ShutdownToken`]. The node's bootstrap always passes its token and only
//! passes a timeout when one is configured.
//!
//! # Ordering
//!
//! The raised flag lives under a `Mutex`, so everything written before
//! `give()` happens-before everything read after the matching `take()`
//! returns.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::Notify;

use super::lock;

/// How often a cancellable wait re-checks its shutdown token.
const CANCEL_POLL: Duration = Duration::from_millis(50);

/// Error returned by a bounded or cancellable [`Signal::take`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SignalError {
    /// The deadline passed before the gate was raised.
    #[error("timed out after {0:?} waiting for {1}")]
    TimedOut(Duration, &'static str),
    /// The shutdown token fired while waiting.
    #[error("wait for {0} cancelled by shutdown")]
    Cancelled(&'static str),
}

/// A binary readiness gate.
#[derive(Debug)]
pub struct Signal {
    name: &'static str,
    raised: Mutex<bool>,
    cond: Condvar,
}

impl Signal {
    /// Creates a lowered gate. `name` appears in logs and errors.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            raised: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    /// The gate's name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Raises the gate and wakes every waiter.
    pub fn give(&self) {
        let mut raised = lock(&self.raised);
        *raised = true;
        self.cond.notify_all();
    }

    /// Lowers the gate without waiting.
    pub fn reset(&self) {
        *lock(&self.raised) = false;
    }

    /// Returns `true` if the gate is currently raised.
    pub fn is_raised(&self) -> bool {
        *lock(&self.raised)
    }

    /// Blocks until the gate is raised, then lowers it.
    ///
    /// `timeout = None` waits forever. When `shutdown` is given the wait
    /// wakes periodically and returns [`SignalError::Cancelled`] once the
    /// token is cancelled.
    ///
    /// # Errors
    ///
    /// [`SignalError::TimedOut`] if `timeout` elapses first;
    /// [`SignalError::Cancelled`] if `shutdown` fires first.
    pub fn take(
        &self,
        timeout: Option<Duration>,
        shutdown: Option<&ShutdownToken>,
    ) -> Result<(), SignalError> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut raised = lock(&self.raised);

        loop {
            if *raised {
                *raised = false;
                return Ok(());
            }
            if shutdown.is_some_and(ShutdownToken::is_cancelled) {
                return Err(SignalError::Cancelled(self.name));
            }

            let slice = match (deadline, shutdown) {
                (Some(d), _) => {
                    let now = Instant::now();
                    if now >= d {
                        // `timeout` is Some whenever `deadline` is.
                        return Err(SignalError::TimedOut(
                            timeout.unwrap_or_default(),
                            self.name,
                        ));
                    }
                    let remaining = d - now;
                    if shutdown.is_some() {
                        Some(remaining.min(CANCEL_POLL))
                    } else {
                        Some(remaining)
                    }
                }
                (None, Some(_)) => Some(CANCEL_POLL),
                (None, None) => None,
            };

            raised = match slice {
                Some(slice) => {
                    self.cond
                        .wait_timeout(raised, slice)
                        .unwrap_or_else(std::sync::PoisonError::into_inner)
                        .0
                }
                None => self
                    .cond
                    .wait(raised)
                    .unwrap_or_else(std::sync::PoisonError::into_inner),
            };
        }
    }
}

/// Cooperative shutdown flag shared by the long-running loops.
///
/// Cloning shares the flag. A fresh token is running; [`cancel`] stops it.
/// Blocking loops poll [`is_running`]; async tasks await [`cancelled`].
///
/// [`cancel`]: ShutdownToken::cancel
/// [`is_running`]: ShutdownToken::is_running
/// [`cancelled`]: ShutdownToken::cancelled
#[derive(Debug, Clone)]
pub struct ShutdownToken {
    inner: Arc<ShutdownInner>,
}

#[derive(Debug)]
struct ShutdownInner {
    running: AtomicBool,
    notify: Notify,
}

impl ShutdownToken {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ShutdownInner {
                running: AtomicBool::new(true),
                notify: Notify::new(),
            }),
        }
    }

    /// Requests shutdown of every holder of this token.
    pub fn cancel(&self) {
        self.inner.running.store(false, Ordering::Release);
        self.inner.notify.notify_waiters();
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    pub fn is_cancelled(&self) -> bool {
        !self.is_running()
    }

    /// Completes once [`cancel`](Self::cancel) has been called on any clone.
    pub async fn cancelled(&self) {
        loop {
            // Registered before the flag check so a concurrent cancel is not lost.
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

impl Default for ShutdownToken {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_take_returns_immediately_when_raised() {
        // Arrange
        let signal = Signal::new("test");
        signal.give();

        // Act
        let result = signal.take(Some(Duration::from_millis(10)), None);

        // Assert
        assert!(result.is_ok());
        assert!(!signal.is_raised(), "take must lower the gate");
    }

    #[test]
    fn test_take_times_out_when_never_raised() {
        // Arrange
        let signal = Signal::new("network-ready");

        // Act
        let result = signal.take(Some(Duration::from_millis(20)), None);

        // Assert
        assert!(matches!(result, Err(SignalError::TimedOut(_, "network-ready"))));
    }

    #[test]
    fn test_give_twice_is_consumed_by_a_single_take() {
        // Arrange
        let signal = Signal::new("peer-present");
        signal.give();
        signal.give();

        // Act
        let first = signal.take(Some(Duration::from_millis(10)), None);
        let second = signal.take(Some(Duration::from_millis(10)), None);

        // Assert – the gate saturates at one
        assert!(first.is_ok());
        assert!(second.is_err());
    }

    #[test]
    fn test_take_wakes_when_given_from_another_thread() {
        // Arrange
        let signal = Arc::new(Signal::new("supplicant-ready"));
        let giver = Arc::clone(&signal);

        // Act
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            giver.give();
        });
        let result = signal.take(Some(Duration::from_secs(2)), None);
        handle.join().expect("giver thread panicked");

        // Assert
        assert!(result.is_ok());
    }

    #[test]
    fn test_take_is_cancelled_by_shutdown_token() {
        // Arrange
        let signal = Arc::new(Signal::new("host-enabled"));
        let token = ShutdownToken::new();
        let canceller = token.clone();

        // Act
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            canceller.cancel();
        });
        let result = signal.take(None, Some(&token));
        handle.join().expect("canceller thread panicked");

        // Assert
        assert_eq!(result, Err(SignalError::Cancelled("host-enabled")));
    }

    #[test]
    fn test_reset_lowers_a_raised_gate() {
        let signal = Signal::new("test");
        signal.give();
        signal.reset();
        assert!(!signal.is_raised());
    }

    #[test]
    fn test_shutdown_token_clones_share_state() {
        // Arrange
        let token = ShutdownToken::new();
        let clone = token.clone();

        // Act
        clone.cancel();

        // Assert
        assert!(token.is_cancelled());
        assert!(!token.is_running());
    }

    #[tokio::test]
    async fn test_cancelled_completes_when_another_clone_cancels() {
        // Arrange
        let token = ShutdownToken::new();
        let canceller = token.clone();

        // Act
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            canceller.cancel();
        });
        let result = tokio::time::timeout(Duration::from_secs(2), token.cancelled()).await;
        handle.join().expect("canceller thread panicked");

        // Assert
        assert!(result.is_ok(), "cancelled() must wake without polling");
    }

    #[tokio::test]
    async fn test_cancelled_returns_at_once_for_cancelled_token() {
        let token = ShutdownToken::new();
        token.cancel();
        let result = tokio::time::timeout(Duration::from_millis(50), token.cancelled()).await;
        assert!(result.is_ok());
    }
}
