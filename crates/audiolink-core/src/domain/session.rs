//! Consolidated session state.
//!
//! Every flag and gate that the event dispatcher, the transport session and
//! the command surface share lives here, behind accessors. Components hold an
//! `Arc<SessionState>`; nothing is reachable through globals.
//!
//! The readiness pipeline of one connection cycle advances in this order:
//!
//! ```text
//! link_ready ─► address_bound ─► target_set ─► socket_ready ─► notified
//! ```
//!
//! Level flags use `Release` stores and `Acquire` loads so a reader that
//! observes a flag also observes everything its writer did before setting it.

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use super::event::Role;
use super::lock;
use super::peers::PeerRegistry;
use super::signal::Signal;
use super::target::TargetRegistry;

/// Point-in-time copy of the readiness pipeline, for logs and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub link_ready: bool,
    pub address_bound: bool,
    pub target_set: bool,
    pub socket_ready: bool,
    pub notified_this_cycle: bool,
    pub peer_connected: bool,
}

/// Shared state of one device session.
#[derive(Debug)]
pub struct SessionState {
    role: Role,
    supplicant_ready: Signal,
    network_ready: Signal,
    host_enabled: Signal,
    link_ready: AtomicBool,
    address_bound: AtomicBool,
    peer_connected: AtomicBool,
    local_addr: Mutex<Option<Ipv4Addr>>,
    last_ssid: Mutex<Option<String>>,
    target: TargetRegistry,
    peers: PeerRegistry,
}

impl SessionState {
    /// Creates the state for `role`. `port` is the default target port and
    /// `pool_start` seeds the host-role peer address heuristic.
    pub fn new(role: Role, port: u16, pool_start: Ipv4Addr) -> Self {
        Self {
            role,
            supplicant_ready: Signal::new("supplicant-ready"),
            network_ready: Signal::new("network-ready"),
            host_enabled: Signal::new("host-enabled"),
            link_ready: AtomicBool::new(false),
            address_bound: AtomicBool::new(false),
            peer_connected: AtomicBool::new(false),
            local_addr: Mutex::new(None),
            last_ssid: Mutex::new(None),
            target: TargetRegistry::new(port),
            peers: PeerRegistry::new(pool_start),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn target(&self) -> &TargetRegistry {
        &self.target
    }

    pub fn peers(&self) -> &PeerRegistry {
        &self.peers
    }

    // ── Gates ────────────────────────────────────────────────────────────────

    pub fn supplicant_ready(&self) -> &Signal {
        &self.supplicant_ready
    }

    pub fn network_ready(&self) -> &Signal {
        &self.network_ready
    }

    pub fn host_enabled(&self) -> &Signal {
        &self.host_enabled
    }

    pub fn peer_present(&self) -> &Signal {
        self.peers.peer_present()
    }

    // ── Link ────────────────────────────────────────────────────────────────

    /// Records supplicant readiness and opens the startup gate.
    pub fn set_link_ready(&self) {
        self.link_ready.store(true, Ordering::Release);
        self.supplicant_ready.give();
    }

    /// Records loss of supplicant readiness and closes the startup gate.
    pub fn clear_link_ready(&self) {
        self.link_ready.store(false, Ordering::Release);
        self.supplicant_ready.reset();
    }

    pub fn is_link_ready(&self) -> bool {
        self.link_ready.load(Ordering::Acquire)
    }

    /// Records the locally bound address and opens the network-ready gate.
    pub fn set_address_bound(&self, addr: Ipv4Addr) {
        *lock(&self.local_addr) = Some(addr);
        self.address_bound.store(true, Ordering::Release);
        self.network_ready.give();
    }

    /// Whether the network stack has bound an address to this device.
    pub fn is_address_bound(&self) -> bool {
        self.address_bound.load(Ordering::Acquire)
    }

    pub fn local_addr(&self) -> Option<Ipv4Addr> {
        *lock(&self.local_addr)
    }

    /// Remembers the SSID of the network most recently associated with.
    pub fn set_last_ssid(&self, ssid: impl Into<String>) {
        *lock(&self.last_ssid) = Some(ssid.into());
    }

    pub fn last_ssid(&self) -> Option<String> {
        lock(&self.last_ssid).clone()
    }

    // ── Transport ───────────────────────────────────────────────────────────

    /// Marks the transport as carrying traffic from a peer.
    ///
    /// Returns `true` only on the transition from disconnected.
    pub fn mark_connected(&self) -> bool {
        !self.peer_connected.swap(true, Ordering::AcqRel)
    }

    pub fn clear_connected(&self) {
        self.peer_connected.store(false, Ordering::Release);
    }

    pub fn is_connected(&self) -> bool {
        self.peer_connected.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            link_ready: self.is_link_ready(),
            address_bound: self.is_address_bound(),
            target_set: self.target.is_set(),
            socket_ready: self.target.is_socket_ready(),
            notified_this_cycle: self.target.notified_this_cycle(),
            peer_connected: self.is_connected(),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
