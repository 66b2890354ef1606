//! Application layer use cases for the node.
//!
//! - **`dispatcher`** – reacts to link events: opens readiness gates, feeds
//!   the peer table, pre-seeds the gateway target and restarts the device on
//!   fatal link loss.
//! - **`bootstrap`** – the blocking startup sequence for each role.
//! - **`discovery`** – two-phase DNS-SD lookup of the host, or a single
//!   name lookup, with a bounded retry loop.
//! - **`transport`** – the socket loop, passive peer learning, and chunked
//!   send.
//! - **`commands`** – executes administrative console commands.
//!
//! Every use case talks to the outside world through the traits in
//! **`ports`**.

pub mod bootstrap;
pub mod commands;
pub mod discovery;
pub mod dispatcher;
pub mod ports;
pub mod transport;

use std::thread;
use std::time::{Duration, Instant};

use audiolink_core::constants::{
    BIND_RETRY_DELAY, DISCOVERY_ATTEMPTS, DISCOVERY_POLL_BUDGET, DISCOVERY_POLL_TIMEOUT,
    DISCOVERY_QUERY_TIMEOUT, DISCOVERY_RETRY_DELAY, PEER_SETTLE_DELAY, RECONNECT_DELAY,
    RECV_POLL_TIMEOUT, RESTART_GRACE,
};
pub(crate) use audiolink_core::lock;
use audiolink_core::ShutdownToken;

/// Every delay and timeout the node uses.
///
/// `Default` gives the production values. Tests shrink them to milliseconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timings {
    /// Wait after a peer associates before its address is assumed.
    pub peer_settle: Duration,
    /// Wait before restarting on an unrecognised association failure.
    pub restart_grace: Duration,
    /// Wait between failed socket create/bind attempts.
    pub bind_retry: Duration,
    /// Wait after the receive loop ends before rebinding.
    pub reconnect_delay: Duration,
    /// Upper bound on one receive call.
    pub recv_poll: Duration,
    /// Wait for the first service instance.
    pub discovery_query: Duration,
    /// Wait for one host address poll.
    pub discovery_poll: Duration,
    /// Host address polls per attempt.
    pub discovery_poll_budget: u32,
    /// Discovery attempts before giving up.
    pub discovery_attempts: u32,
    /// Wait between discovery attempts.
    pub discovery_retry_delay: Duration,
    /// Bound on each bootstrap readiness wait. `None` waits forever.
    pub bootstrap_wait: Option<Duration>,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            peer_settle: PEER_SETTLE_DELAY,
            restart_grace: RESTART_GRACE,
            bind_retry: BIND_RETRY_DELAY,
            reconnect_delay: RECONNECT_DELAY,
            recv_poll: RECV_POLL_TIMEOUT,
            discovery_query: DISCOVERY_QUERY_TIMEOUT,
            discovery_poll: DISCOVERY_POLL_TIMEOUT,
            discovery_poll_budget: DISCOVERY_POLL_BUDGET,
            discovery_attempts: DISCOVERY_ATTEMPTS,
            discovery_retry_delay: DISCOVERY_RETRY_DELAY,
            bootstrap_wait: None,
        }
    }
}

/// Sleeps for `delay`, waking early if `shutdown` fires.
///
/// Returns `false` if shutdown was requested.
pub(crate) fn pause(delay: Duration, shutdown: &ShutdownToken) -> bool {
    const STEP: Duration = Duration::from_millis(50);
    let deadline = Instant::now() + delay;
    loop {
        if shutdown.is_cancelled() {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep((deadline - now).min(STEP));
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timings_match_transport_constants() {
        let t = Timings::default();
        assert_eq!(t.peer_settle, Duration::from_millis(1000));
        assert_eq!(t.discovery_attempts, 3);
        assert_eq!(t.discovery_poll_budget, 5);
        assert_eq!(t.bootstrap_wait, None);
    }

    #[test]
    fn test_pause_returns_false_when_cancelled() {
        // Arrange
        let token = ShutdownToken::new();
        token.cancel();

        // Act
        let started = Instant::now();
        let completed = pause(Duration::from_secs(5), &token);

        // Assert
        assert!(!completed);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_pause_completes_short_delay() {
        assert!(pause(Duration::from_millis(5), &ShutdownToken::new()));
    }
}
