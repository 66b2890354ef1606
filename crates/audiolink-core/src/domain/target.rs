//! Target address registry.
//!
//! Holds the single peer endpoint the transport sends to. Three writers race
//! to fill it: service discovery, the `set_target_addr` command, and the
//! receive loop's first-datagram observation. They converge through
//! [`TargetRegistry::set`], a compare-and-set under one lock:
//!
//! - the unspecified address `0.0.0.0` is never stored;
//! - writing the value already held is a no-op and notifies nobody;
//! - any other value replaces the current one.
//!
//! # Ready notification
//!
//! A single callback may be registered. It fires at most once per cycle, when
//! a target is set, the socket is ready, and the cycle has not notified yet.
//! Each of the three becoming true re-checks the conjunction. A cycle ends
//! on [`TargetRegistry::clear`] or when the socket session restarts
//! ([`TargetRegistry::end_socket_cycle`]).
//!
//! The callback is invoked after the lock is released, so it may call back
//! into the registry.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use super::lock;

/// Callback invoked once per cycle with the target that became ready.
pub type ReadyCallback = Arc<dyn Fn(SocketAddrV4) + Send + Sync>;

/// Result of a [`TargetRegistry::set`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOutcome {
    /// `0.0.0.0` was offered and rejected.
    IgnoredUnspecified,
    /// The registry already held this exact endpoint.
    Unchanged,
    /// The endpoint was stored; `previous` is what it replaced.
    Updated { previous: Option<SocketAddrV4> },
}

impl SetOutcome {
    pub fn is_updated(&self) -> bool {
        matches!(self, SetOutcome::Updated { .. })
    }
}

#[derive(Default)]
struct TargetState {
    addr: Option<SocketAddrV4>,
    socket_ready: bool,
    notified: bool,
    revision: u64,
    callback: Option<ReadyCallback>,
}

impl TargetState {
    /// Claims this cycle's notification if every precondition holds.
    fn claim_notification(&mut self) -> Option<(ReadyCallback, SocketAddrV4)> {
        if self.notified || !self.socket_ready {
            return None;
        }
        let addr = self.addr?;
        let cb = self.callback.clone()?;
        self.notified = true;
        Some((cb, addr))
    }
}

/// Process-wide registry of the peer endpoint.
pub struct TargetRegistry {
    default_port: u16,
    state: Mutex<TargetState>,
}

impl fmt::Debug for TargetRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = lock(&self.state);
        f.debug_struct("TargetRegistry")
            .field("addr", &s.addr)
            .field("socket_ready", &s.socket_ready)
            .field("notified", &s.notified)
            .field("revision", &s.revision)
            .finish()
    }
}

impl TargetRegistry {
    /// Creates an empty registry. `default_port` is used by [`set_ipv4`].
    ///
    /// [`set_ipv4`]: TargetRegistry::set_ipv4
    pub fn new(default_port: u16) -> Self {
        Self {
            default_port,
            state: Mutex::new(TargetState::default()),
        }
    }

    pub fn is_set(&self) -> bool {
        lock(&self.state).addr.is_some()
    }

    /// The current target, if any.
    pub fn target(&self) -> Option<SocketAddrV4> {
        lock(&self.state).addr
    }

    pub fn is_socket_ready(&self) -> bool {
        lock(&self.state).socket_ready
    }

    /// Whether the current cycle has already fired the ready callback.
    pub fn notified_this_cycle(&self) -> bool {
        lock(&self.state).notified
    }

    /// Number of effective writes since creation.
    pub fn revision(&self) -> u64 {
        lock(&self.state).revision
    }

    /// Stores `ip` with the default transport port.
    pub fn set_ipv4(&self, ip: Ipv4Addr) -> SetOutcome {
        self.set(SocketAddrV4::new(ip, self.default_port))
    }

    /// Stores `addr` unless it is unspecified or already current.
    ///
    /// Setting a target when none was held starts a fresh notification cycle.
    /// Replacing one target with another keeps the cycle, so a callback that
    /// already fired is not repeated.
    pub fn set(&self, addr: SocketAddrV4) -> SetOutcome {
        if addr.ip().is_unspecified() {
            debug!("ignoring unspecified target address");
            return SetOutcome::IgnoredUnspecified;
        }

        let (previous, pending) = {
            let mut s = lock(&self.state);
            if s.addr == Some(addr) {
                return SetOutcome::Unchanged;
            }
            let previous = s.addr.replace(addr);
            if previous.is_none() {
                s.notified = false;
            }
            s.revision += 1;
            (previous, s.claim_notification())
        };

        info!("target address set to {addr}");
        fire(pending);
        SetOutcome::Updated { previous }
    }

    /// Stores `addr` only if no target is held.
    ///
    /// Used by passive learning, where the first sender wins. A held target of
    /// any value reports [`SetOutcome::Unchanged`].
    pub fn set_if_unset(&self, addr: SocketAddrV4) -> SetOutcome {
        if addr.ip().is_unspecified() {
            return SetOutcome::IgnoredUnspecified;
        }

        let pending = {
            let mut s = lock(&self.state);
            if s.addr.is_some() {
                return SetOutcome::Unchanged;
            }
            s.addr = Some(addr);
            s.notified = false;
            s.revision += 1;
            s.claim_notification()
        };

        info!("target address learned from peer: {addr}");
        fire(pending);
        SetOutcome::Updated { previous: None }
    }

    /// Forgets the target and starts a new notification cycle.
    pub fn clear(&self) {
        let mut s = lock(&self.state);
        s.addr = None;
        s.socket_ready = false;
        s.notified = false;
        info!("cleared socket target state");
    }

    /// Records that the transport socket can carry traffic.
    ///
    /// Returns `true` if this call fired the ready callback.
    pub fn mark_socket_ready(&self) -> bool {
        let pending = {
            let mut s = lock(&self.state);
            s.socket_ready = true;
            s.claim_notification()
        };
        let fired = pending.is_some();
        fire(pending);
        fired
    }

    /// Ends the socket half of the cycle; the target itself is kept.
    pub fn end_socket_cycle(&self) {
        let mut s = lock(&self.state);
        s.socket_ready = false;
        s.notified = false;
    }

    /// Registers the ready callback, replacing any previous one, and
    /// re-evaluates the notification immediately.
    pub fn set_ready_callback(&self, cb: ReadyCallback) {
        let pending = {
            let mut s = lock(&self.state);
            s.callback = Some(cb);
            s.claim_notification()
        };
        fire(pending);
    }
}

fn fire(pending: Option<(ReadyCallback, SocketAddrV4)>) {
    if let Some((cb, addr)) = pending {
        debug!("target {addr} ready, notifying");
        cb(addr);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
