//! # audiolink-core
//!
//! Shared state and protocol helpers for the AudioLink wireless transport.
//!
//! The transport brings up a Wi-Fi link in one of two roles, learns the peer's
//! IPv4 endpoint, and keeps a best-effort UDP channel to it alive. This crate
//! holds the pieces of that machinery that do not touch sockets or radios:
//!
//! - **`domain`** – readiness gates, the target address registry with its
//!   edge-triggered ready notification, the fixed-capacity peer table used in
//!   host role, and the consolidated session state.
//! - **`protocol`** – DNS-SD naming rules, the administrative command parser,
//!   and payload chunking for outbound sends.
//!
//! The node crate (`audiolink-node`) drives these types from its event
//! dispatcher and transport session threads.

pub mod domain;
pub mod protocol;

pub use domain::event::{EventKind, MacAddr, NetworkEvent, Role};
pub use domain::lock;
pub use domain::peers::{DisassociateOutcome, PeerEntry, PeerRegistry};
pub use domain::session::{SessionSnapshot, SessionState};
pub use domain::signal::{ShutdownToken, Signal, SignalError};
pub use domain::target::{ReadyCallback, SetOutcome, TargetRegistry};
pub use protocol::command::{parse_command, AdminCommand, CommandError};

/// Fixed values of the transport, shared by every component.
pub mod constants {
    use std::net::Ipv4Addr;
    use std::time::Duration;

    /// Well-known UDP port for the audio transport, both roles.
    pub const TRANSPORT_PORT: u16 = 60010;

    /// Largest datagram accepted by the receive loop (Wi-Fi MTU).
    pub const MAX_DATAGRAM_SIZE: usize = 1500;

    /// Outbound payloads are split into chunks of this many bytes.
    pub const SEND_CHUNK_SIZE: usize = 1024;

    /// Datagrams held while no RX consumer is registered.
    pub const RX_QUEUE_DEPTH: usize = 4;

    /// Slots in the host-role peer table.
    pub const MAX_PEERS: usize = 4;

    /// First address handed out by the host's DHCP pool.
    pub const DHCP_POOL_START: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 2);

    /// Address of the gateway device when it runs its own access point.
    pub const GATEWAY_ADDR: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 1);

    /// SSID broadcast by the gateway device's access point.
    pub const GATEWAY_SSID: &str = "GatewayAP";

    /// Time allowed for DHCP to lease an address to a new peer.
    pub const PEER_SETTLE_DELAY: Duration = Duration::from_millis(1000);

    /// Grace period before restarting on an unclassified association failure.
    pub const RESTART_GRACE: Duration = Duration::from_secs(3);

    /// Delay between failed socket create/bind attempts.
    pub const BIND_RETRY_DELAY: Duration = Duration::from_secs(1);

    /// Delay after the receive loop ends before the socket is recreated.
    pub const RECONNECT_DELAY: Duration = Duration::from_secs(1);

    /// Wait for the first service instance during discovery.
    pub const DISCOVERY_QUERY_TIMEOUT: Duration = Duration::from_millis(3000);

    /// Per-poll wait for the host address record.
    pub const DISCOVERY_POLL_TIMEOUT: Duration = Duration::from_millis(300);

    /// Address polls allowed per discovery attempt.
    pub const DISCOVERY_POLL_BUDGET: u32 = 5;

    /// Discovery attempts before falling back to manual or passive learning.
    pub const DISCOVERY_ATTEMPTS: u32 = 3;

    /// Delay between discovery attempts.
    pub const DISCOVERY_RETRY_DELAY: Duration = Duration::from_secs(2);

    /// Bound on the receive call so the loop can observe shutdown.
    pub const RECV_POLL_TIMEOUT: Duration = Duration::from_millis(500);

    /// Stack reserved for the transport session thread.
    pub const TRANSPORT_STACK_SIZE: usize = 256 * 1024;
}
