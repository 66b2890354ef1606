//! Link adapters.
//!
//! On a desktop or server the operating system owns the radio. The node
//! cannot drive association or host mode itself, so [`OsLink`] reports the
//! link as the OS already set it up and synthesises the event sequence the
//! dispatcher expects:
//!
//! | call            | events emitted                                  |
//! |-----------------|-------------------------------------------------|
//! | `start`         | `LinkUp`, `SupplicantReady`                     |
//! | `auto_connect`  | `AssocResult(0)`                                |
//! | `bring_up_all`  | `AddressBound(<local IPv4>)`                    |
//! | `enable_host`   | `HostEnableResult(0)`, `AddressBound`, then one `PeerAssociated` with a placeholder MAC |
//!
//! The local address is the source address the OS would pick to reach the
//! route target. It is found by connecting an unbound UDP socket, which
//! sends no packets.
//!
//! The OS does not tell the node which network it joined. In client role
//! `status` reports the SSID given to [`OsLink::with_station_ssid`], usually
//! the `[link] station_ssid` setting; without one the SSID is unknown and the
//! gateway target is never pre-seeded from it.
//!
//! The `mock` module has [`mock::ScriptedLink`] for tests.

pub mod mock;

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddrV4, UdpSocket};
use std::sync::mpsc::Sender;
use std::sync::Mutex;

use audiolink_core::{MacAddr, NetworkEvent, Role};
use tracing::{debug, info, warn};

use crate::application::lock;
use crate::application::ports::{HostParams, LinkControl, LinkError, LinkStatus};

/// Stands in for the MAC of a peer the OS let in. Locally administered.
pub const PLACEHOLDER_PEER: MacAddr = MacAddr([0x02, 0, 0, 0, 0, 0]);

/// [`LinkControl`] for hosts whose OS manages the wireless interface.
pub struct OsLink {
    role: Role,
    route_target: SocketAddrV4,
    station_ssid: Option<String>,
    events: Mutex<Option<Sender<NetworkEvent>>>,
}

impl OsLink {
    /// `route_target` is any routable endpoint on the peer's network,
    /// typically the well-known gateway address.
    pub fn new(role: Role, route_target: SocketAddrV4) -> Self {
        Self {
            role,
            route_target,
            station_ssid: None,
            events: Mutex::new(None),
        }
    }

    /// Names the network the OS joined, for client-role status reports.
    pub fn with_station_ssid(mut self, ssid: Option<String>) -> Self {
        self.station_ssid = ssid;
        self
    }

    /// Attaches the event channel and reports the link as up.
    pub fn start(&self, events: Sender<NetworkEvent>) {
        *lock(&self.events) = Some(events);
        self.emit(NetworkEvent::LinkUp);
        self.emit(NetworkEvent::SupplicantReady);
    }

    fn emit(&self, event: NetworkEvent) {
        match lock(&self.events).as_ref() {
            Some(tx) => {
                if tx.send(event).is_err() {
                    debug!("event receiver gone");
                }
            }
            None => warn!("link event {event:?} emitted before start"),
        }
    }

    fn local_ipv4(&self) -> Result<Ipv4Addr, LinkError> {
        let lookup_failed = |source: io::Error| LinkError::Io {
            operation: "local address lookup",
            source,
        };
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).map_err(lookup_failed)?;
        socket.connect(self.route_target).map_err(lookup_failed)?;
        match socket.local_addr().map_err(lookup_failed)?.ip() {
            IpAddr::V4(ip) if !ip.is_unspecified() => Ok(ip),
            other => Err(lookup_failed(io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                format!("no IPv4 route to {} (got {other})", self.route_target),
            ))),
        }
    }
}

impl LinkControl for OsLink {
    fn set_regulatory_domain(&self, country: &str) -> Result<(), LinkError> {
        debug!("regulatory domain {country} is managed by the OS");
        Ok(())
    }

    fn start_dhcp_server(&self, pool_start: Ipv4Addr) -> Result<(), LinkError> {
        debug!("address assignment from {pool_start} is managed by the OS");
        Ok(())
    }

    fn enable_host(&self, params: &HostParams) -> Result<(), LinkError> {
        info!(
            "hosting {} ({}, {}) is managed by the OS",
            params.ssid,
            HostParams::BAND,
            HostParams::SECURITY
        );
        self.emit(NetworkEvent::HostEnableResult(0));
        match self.local_ipv4() {
            Ok(ip) => self.emit(NetworkEvent::AddressBound(ip)),
            Err(e) => warn!("{e}"),
        }
        self.emit(NetworkEvent::PeerAssociated(PLACEHOLDER_PEER));
        Ok(())
    }

    fn auto_connect(&self) -> Result<(), LinkError> {
        self.emit(NetworkEvent::AssocResult(0));
        Ok(())
    }

    fn bring_up_all(&self) -> Result<(), LinkError> {
        let ip = self.local_ipv4()?;
        self.emit(NetworkEvent::AddressBound(ip));
        Ok(())
    }

    fn status(&self) -> Result<LinkStatus, LinkError> {
        Ok(LinkStatus {
            state: "connected".to_string(),
            mode: match self.role {
                Role::Host => "host".to_string(),
                Role::Client => "station".to_string(),
            },
            ssid: match self.role {
                Role::Host => None,
                Role::Client => self.station_ssid.clone(),
            },
            ..LinkStatus::default()
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::dispatcher::{EventDispatcher, GatewaySettings};
    use crate::application::ports::{MockDeviceControl, SessionHandle};
    use crate::application::Timings;
    use audiolink_core::constants::{DHCP_POOL_START, GATEWAY_ADDR, GATEWAY_SSID, TRANSPORT_PORT};
    use audiolink_core::SessionState;
    use std::sync::mpsc;
    use std::sync::Arc;

    struct IdleSession;

    impl SessionHandle for IdleSession {
        fn handle_peer_disconnect(&self) {}
    }

    fn loopback_route() -> SocketAddrV4 {
        SocketAddrV4::new(Ipv4Addr::LOCALHOST, TRANSPORT_PORT)
    }

    #[test]
    fn test_start_reports_link_and_supplicant() {
        // Arrange
        let link = OsLink::new(Role::Client, loopback_route());
        let (tx, rx) = mpsc::channel();

        // Act
        link.start(tx);

        // Assert
        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(events, vec![NetworkEvent::LinkUp, NetworkEvent::SupplicantReady]);
    }

    #[test]
    fn test_bring_up_all_reports_loopback_route() {
        // Arrange
        let link = OsLink::new(Role::Client, loopback_route());
        let (tx, rx) = mpsc::channel();
        link.start(tx);
        let _ = rx.try_iter().count();

        // Act
        link.bring_up_all().expect("loopback is always routable");

        // Assert
        assert_eq!(
            rx.try_recv().ok(),
            Some(NetworkEvent::AddressBound(Ipv4Addr::LOCALHOST))
        );
    }

    #[test]
    fn test_enable_host_admits_placeholder_peer() {
        // Arrange
        let link = OsLink::new(Role::Host, loopback_route());
        let (tx, rx) = mpsc::channel();
        link.start(tx);
        let _ = rx.try_iter().count();

        // Act
        link.enable_host(&HostParams {
            ssid: "AudioLink".to_string(),
            passphrase: "password".to_string(),
            channel: 1,
        })
        .expect("enable host");

        // Assert
        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(events.first(), Some(&NetworkEvent::HostEnableResult(0)));
        assert_eq!(events.last(), Some(&NetworkEvent::PeerAssociated(PLACEHOLDER_PEER)));
    }

    #[test]
    fn test_status_reports_role_mode() {
        let link = OsLink::new(Role::Host, loopback_route());
        assert_eq!(link.status().expect("status").mode, "host");
    }

    #[test]
    fn test_client_status_reports_configured_station_ssid() {
        // Arrange
        let link = OsLink::new(Role::Client, loopback_route())
            .with_station_ssid(Some("AudioGateway".to_string()));

        // Act
        let status = link.status().expect("status");

        // Assert
        assert_eq!(status.mode, "station");
        assert_eq!(status.ssid.as_deref(), Some("AudioGateway"));
    }

    #[test]
    fn test_status_without_station_ssid_leaves_it_unknown() {
        let link = OsLink::new(Role::Client, loopback_route());
        assert_eq!(link.status().expect("status").ssid, None);
    }

    #[test]
    fn test_joining_gateway_ssid_seeds_gateway_target() {
        // Arrange
        let state = Arc::new(SessionState::new(Role::Client, TRANSPORT_PORT, DHCP_POOL_START));
        let link = Arc::new(
            OsLink::new(Role::Client, loopback_route())
                .with_station_ssid(Some(GATEWAY_SSID.to_string())),
        );
        let dispatcher = EventDispatcher::new(
            Arc::clone(&state),
            Arc::clone(&link) as Arc<dyn LinkControl>,
            Arc::new(MockDeviceControl::new()),
            Arc::new(IdleSession),
            GatewaySettings {
                ssid: GATEWAY_SSID.to_string(),
                address: GATEWAY_ADDR,
            },
            Timings::default(),
        );
        let (tx, rx) = mpsc::channel();
        link.start(tx);

        // Act
        link.auto_connect().expect("auto connect");
        link.bring_up_all().expect("loopback is always routable");
        for event in rx.try_iter() {
            dispatcher.dispatch(&event);
        }

        // Assert
        assert_eq!(state.last_ssid().as_deref(), Some(GATEWAY_SSID));
        assert_eq!(
            state.target().target(),
            Some(SocketAddrV4::new(GATEWAY_ADDR, TRANSPORT_PORT))
        );
    }
}
