//! audiolink-node library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does a node do?
//!
//! A node is one end of an AudioLink pair. In **host** role it runs the
//! wireless network and waits for a peer to join; in **client** role it joins
//! that network and works out where the host is. Either way it ends up with a
//! UDP socket on the transport port and, eventually, a peer endpoint to send
//! audio to.
//!
//! 1. Link events from the network stack are fed to the
//!    [`EventDispatcher`](application::dispatcher::EventDispatcher), which
//!    opens readiness gates, tracks peers and restarts the device on fatal
//!    link loss.
//! 2. The [`Bootstrap`](application::bootstrap::Bootstrap) sequence waits on
//!    those gates, configures the radio for its role, and (client role) runs
//!    endpoint discovery.
//! 3. The [`TransportSession`](application::transport::TransportSession)
//!    binds the socket, receives datagrams, learns the peer's address from
//!    traffic, and recovers from every socket failure by rebinding.

/// Application layer: use cases and the ports they depend on.
pub mod application;

/// Infrastructure layer: OS adapters, DNS-SD, configuration and the console.
pub mod infrastructure;
