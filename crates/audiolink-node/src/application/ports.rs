//! Ports: the traits the application layer uses to reach the outside world.
//!
//! Implementations live in the infrastructure layer. Tests substitute the
//! recording fakes under `infrastructure::*::mock`, or `mockall` mocks for the
//! two narrow control ports.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;

use thiserror::Error;

/// Error type for radio and connection-manager requests.
#[derive(Debug, Error)]
pub enum LinkError {
    /// The driver rejected the request.
    #[error("{operation} failed with code {code}")]
    Rejected { operation: &'static str, code: i32 },

    /// The request could not be issued at all.
    #[error("{operation} failed: {source}")]
    Io {
        operation: &'static str,
        #[source]
        source: io::Error,
    },
}

/// Parameters for hosting the wireless network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostParams {
    pub ssid: String,
    pub passphrase: String,
    pub channel: u8,
}

impl HostParams {
    /// Band the hosted network runs on.
    pub const BAND: &'static str = "2.4GHz";
    /// Authentication mode of the hosted network.
    pub const SECURITY: &'static str = "WPA2-PSK";
}

/// Radio status as reported by the driver.
///
/// Fields the driver cannot report are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkStatus {
    pub state: String,
    pub mode: String,
    pub ssid: Option<String>,
    pub bssid: Option<String>,
    pub band: Option<String>,
    pub channel: Option<u8>,
    pub security: Option<String>,
    pub rssi: Option<i32>,
}

/// Control surface of the radio driver and connection manager.
///
/// Every call returns once the request has been issued. Outcomes arrive later
/// as [`NetworkEvent`](audiolink_core::NetworkEvent)s.
#[cfg_attr(test, mockall::automock)]
pub trait LinkControl: Send + Sync {
    /// Sets the regulatory domain (ISO country code).
    fn set_regulatory_domain(&self, country: &str) -> Result<(), LinkError>;

    /// Starts the address-assignment service with its pool at `pool_start`.
    /// A service that is already running counts as started.
    fn start_dhcp_server(&self, pool_start: Ipv4Addr) -> Result<(), LinkError>;

    /// Switches the radio into host mode.
    fn enable_host(&self, params: &HostParams) -> Result<(), LinkError>;

    /// Joins a network using stored credentials.
    fn auto_connect(&self) -> Result<(), LinkError>;

    /// Asks the connection manager to bring every interface up.
    fn bring_up_all(&self) -> Result<(), LinkError>;

    /// Current radio status.
    fn status(&self) -> Result<LinkStatus, LinkError>;
}

/// The device's single hard recovery action.
#[cfg_attr(test, mockall::automock)]
pub trait DeviceControl: Send + Sync {
    /// Restarts the device. On real hardware this does not return.
    fn restart(&self, reason: &str);
}

/// A bound datagram endpoint.
pub trait DatagramSocket: Send + Sync {
    /// Receives one datagram.
    ///
    /// Implementations bound the wait; `WouldBlock` and `TimedOut` errors mean
    /// nothing arrived yet.
    fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)>;

    /// Sends one datagram to `dest`.
    fn send_to(&self, buf: &[u8], dest: SocketAddrV4) -> io::Result<usize>;

    fn local_addr(&self) -> io::Result<SocketAddr>;
}

/// Creates bound datagram endpoints.
pub trait SocketFactory: Send + Sync {
    fn bind(&self, addr: SocketAddrV4) -> io::Result<Arc<dyn DatagramSocket>>;
}

/// The transport session as seen by the event dispatcher.
pub trait SessionHandle: Send + Sync {
    /// Every peer has left. Connection state is reset; the listening socket
    /// stays open for the next peer.
    fn handle_peer_disconnect(&self);
}
