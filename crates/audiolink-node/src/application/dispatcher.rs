//! Event dispatcher: reacts to network stack events.
//!
//! Handlers are registered per [`EventKind`] when the dispatcher is built.
//! Host-only kinds (host enable result, peer association and disassociation)
//! are only registered in host role; in client role such events are logged
//! and dropped.
//!
//! | event | reaction |
//! |---|---|
//! | `LinkUp` / `LinkDown` | log |
//! | `AssocResult(0)` | log radio status, remember the SSID |
//! | `AssocResult(code)` | log the reason; unrecognised codes restart the device after a grace delay |
//! | `DisassocResult` | client: clear the target, restart. host: log |
//! | `SupplicantReady` / `NotReady` | open / close the supplicant gate |
//! | `AddressBound(ip)` | open the network gate; client on the gateway SSID pre-seeds the gateway target |
//! | `HostEnableResult` | open the host-enabled gate on success |
//! | `PeerAssociated` | claim a peer slot (sleeps the settle delay inline) |
//! | `PeerDisassociated` | free the slot; the last one out resets the transport session |
//!
//! Handlers run on whatever thread calls [`EventDispatcher::dispatch`]. The
//! peer-association handler blocks that thread for the settle delay.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::thread;

use audiolink_core::{DisassociateOutcome, EventKind, NetworkEvent, Role, SessionState};
use tracing::{debug, error, info, warn};

use super::ports::{DeviceControl, LinkControl, LinkStatus, SessionHandle};
use super::Timings;

type Handler = fn(&EventDispatcher, &NetworkEvent);

/// The well-known gateway the client falls back to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewaySettings {
    /// SSID broadcast by the gateway's own access point.
    pub ssid: String,
    /// The gateway's fixed address on that network.
    pub address: Ipv4Addr,
}

/// Human-readable reason for a known association failure code.
pub fn association_failure_reason(code: i32) -> Option<&'static str> {
    match code {
        1 => Some("Generic failure"),
        2 => Some("Authentication timeout"),
        3 => Some("Authentication failed"),
        15 => Some("AP not found"),
        16 => Some("Association timeout"),
        _ => None,
    }
}

/// Queries the radio status and logs it. Returns the status if available.
pub fn report_link_status(link: &dyn LinkControl) -> Option<LinkStatus> {
    let status = match link.status() {
        Ok(status) => status,
        Err(e) => {
            warn!("could not read link status: {e}");
            return None;
        }
    };

    let or_unknown = |v: Option<String>| v.unwrap_or_else(|| "unknown".to_string());
    info!("state: {}", status.state);
    info!("mode: {}", status.mode);
    info!("SSID: {}", or_unknown(status.ssid.clone()));
    info!("BSSID: {}", or_unknown(status.bssid.clone()));
    info!("band: {}", or_unknown(status.band.clone()));
    info!("channel: {}", or_unknown(status.channel.map(|c| c.to_string())));
    info!("security: {}", or_unknown(status.security.clone()));
    info!("RSSI: {}", or_unknown(status.rssi.map(|r| r.to_string())));
    Some(status)
}

/// Routes [`NetworkEvent`]s to their handlers.
pub struct EventDispatcher {
    state: Arc<SessionState>,
    link: Arc<dyn LinkControl>,
    device: Arc<dyn DeviceControl>,
    session: Arc<dyn SessionHandle>,
    gateway: GatewaySettings,
    timings: Timings,
    handlers: HashMap<EventKind, Handler>,
}

impl EventDispatcher {
    /// Builds a dispatcher and registers the handlers for the session's role.
    pub fn new(
        state: Arc<SessionState>,
        link: Arc<dyn LinkControl>,
        device: Arc<dyn DeviceControl>,
        session: Arc<dyn SessionHandle>,
        gateway: GatewaySettings,
        timings: Timings,
    ) -> Self {
        let role = state.role();
        let handlers = EventKind::ALL
            .into_iter()
            .filter(|kind| role == Role::Host || !kind.is_host_only())
            .map(|kind| (kind, handler_for(kind)))
            .collect();

        Self {
            state,
            link,
            device,
            session,
            gateway,
            timings,
            handlers,
        }
    }

    /// Whether a handler is registered for `kind`.
    pub fn handles(&self, kind: EventKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    /// Runs the handler registered for `event`'s kind.
    pub fn dispatch(&self, event: &NetworkEvent) {
        match self.handlers.get(&event.kind()) {
            Some(handler) => handler(self, event),
            None => debug!("no {} role handler for {event:?}", self.state.role()),
        }
    }

    fn on_link_up(&self, _: &NetworkEvent) {
        info!("network interface up");
    }

    fn on_link_down(&self, _: &NetworkEvent) {
        info!("network interface down");
    }

    fn on_assoc_result(&self, event: &NetworkEvent) {
        let NetworkEvent::AssocResult(code) = *event else {
            return;
        };

        if code == 0 {
            info!("connected to wireless network");
            if let Some(ssid) = report_link_status(self.link.as_ref()).and_then(|s| s.ssid) {
                self.state.set_last_ssid(ssid);
            }
            return;
        }

        match association_failure_reason(code) {
            Some(reason) => error!("connection failed: {reason} (code {code})"),
            None => {
                error!(
                    "connection failed with unrecognised code {code}, restarting in {:?}",
                    self.timings.restart_grace
                );
                thread::sleep(self.timings.restart_grace);
                self.device
                    .restart(&format!("unrecognised association failure code {code}"));
            }
        }
    }

    fn on_disassoc_result(&self, event: &NetworkEvent) {
        let NetworkEvent::DisassocResult(code) = *event else {
            return;
        };

        match self.state.role() {
            Role::Client => {
                error!("disconnected from wireless network (code {code})");
                self.state.target().clear();
                self.device.restart("wireless link lost");
            }
            Role::Host => info!("radio disassociated (code {code})"),
        }
    }

    fn on_supplicant_ready(&self, _: &NetworkEvent) {
        info!("supplicant ready");
        self.state.set_link_ready();
    }

    fn on_supplicant_not_ready(&self, _: &NetworkEvent) {
        warn!("supplicant not ready");
        self.state.clear_link_ready();
    }

    fn on_address_bound(&self, event: &NetworkEvent) {
        let NetworkEvent::AddressBound(addr) = *event else {
            return;
        };

        self.state.set_address_bound(addr);
        info!("network ready, got IP: {addr}");

        if self.state.role() != Role::Client || self.state.target().is_set() {
            return;
        }
        if self.state.last_ssid().as_deref() == Some(self.gateway.ssid.as_str()) {
            info!(
                "joined {}, using gateway {} as target",
                self.gateway.ssid, self.gateway.address
            );
            self.state.target().set_ipv4(self.gateway.address);
        }
    }

    fn on_host_enable_result(&self, event: &NetworkEvent) {
        let NetworkEvent::HostEnableResult(code) = *event else {
            return;
        };

        if code == 0 {
            info!("host mode enabled");
            self.state.host_enabled().give();
        } else {
            error!("host mode enable failed (code {code})");
        }
    }

    fn on_peer_associated(&self, event: &NetworkEvent) {
        let NetworkEvent::PeerAssociated(mac) = *event else {
            return;
        };

        info!("station {mac} joined");
        self.state.peers().on_associated(mac, self.timings.peer_settle);
    }

    fn on_peer_disassociated(&self, event: &NetworkEvent) {
        let NetworkEvent::PeerDisassociated(mac) = *event else {
            return;
        };

        match self.state.peers().on_disassociated(mac) {
            DisassociateOutcome::Unknown => debug!("ignoring departure of untracked station {mac}"),
            DisassociateOutcome::Removed { address, remaining } => {
                let address = address.map_or_else(|| "unknown".to_string(), |a| a.to_string());
                info!("station {mac} left, IP {address}");
                if remaining == 0 {
                    info!("no peers remain");
                    self.session.handle_peer_disconnect();
                }
            }
        }
    }
}

fn handler_for(kind: EventKind) -> Handler {
    match kind {
        EventKind::LinkUp => EventDispatcher::on_link_up,
        EventKind::LinkDown => EventDispatcher::on_link_down,
        EventKind::AssocResult => EventDispatcher::on_assoc_result,
        EventKind::DisassocResult => EventDispatcher::on_disassoc_result,
        EventKind::SupplicantReady => EventDispatcher::on_supplicant_ready,
        EventKind::SupplicantNotReady => EventDispatcher::on_supplicant_not_ready,
        EventKind::AddressBound => EventDispatcher::on_address_bound,
        EventKind::HostEnableResult => EventDispatcher::on_host_enable_result,
        EventKind::PeerAssociated => EventDispatcher::on_peer_associated,
        EventKind::PeerDisassociated => EventDispatcher::on_peer_disassociated,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::{MockDeviceControl, MockLinkControl};
    use audiolink_core::constants::{DHCP_POOL_START, GATEWAY_ADDR, GATEWAY_SSID, TRANSPORT_PORT};
    use audiolink_core::MacAddr;
    use std::net::SocketAddrV4;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct CountingSession {
        disconnects: AtomicUsize,
    }

    impl SessionHandle for CountingSession {
        fn handle_peer_disconnect(&self) {
            self.disconnects.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn timings() -> Timings {
        Timings {
            peer_settle: Duration::ZERO,
            restart_grace: Duration::from_millis(1),
            ..Timings::default()
        }
    }

    fn gateway() -> GatewaySettings {
        GatewaySettings {
            ssid: GATEWAY_SSID.to_string(),
            address: GATEWAY_ADDR,
        }
    }

    fn build(
        role: Role,
        link: MockLinkControl,
        device: MockDeviceControl,
    ) -> (EventDispatcher, Arc<SessionState>, Arc<CountingSession>) {
        let state = Arc::new(SessionState::new(role, TRANSPORT_PORT, DHCP_POOL_START));
        let session = Arc::new(CountingSession::default());
        let dispatcher = EventDispatcher::new(
            Arc::clone(&state),
            Arc::new(link),
            Arc::new(device),
            Arc::clone(&session) as Arc<dyn SessionHandle>,
            gateway(),
            timings(),
        );
        (dispatcher, state, session)
    }

    fn status_on(ssid: &str) -> LinkStatus {
        LinkStatus {
            state: "connected".to_string(),
            mode: "station".to_string(),
            ssid: Some(ssid.to_string()),
            ..LinkStatus::default()
        }
    }

    fn mac(n: u8) -> MacAddr {
        MacAddr([0x02, 0, 0, 0, 0, n])
    }

    // ── Registration ──────────────────────────────────────────────────────────

    #[test]
    fn test_client_role_skips_host_only_handlers() {
        let (d, _, _) = build(Role::Client, MockLinkControl::new(), MockDeviceControl::new());
        assert!(!d.handles(EventKind::PeerAssociated));
        assert!(!d.handles(EventKind::HostEnableResult));
        assert!(d.handles(EventKind::AddressBound));
    }

    #[test]
    fn test_host_role_registers_every_handler() {
        let (d, _, _) = build(Role::Host, MockLinkControl::new(), MockDeviceControl::new());
        assert!(EventKind::ALL.iter().all(|k| d.handles(*k)));
    }

    #[test]
    fn test_client_ignores_peer_events() {
        // Arrange
        let (d, state, _) = build(Role::Client, MockLinkControl::new(), MockDeviceControl::new());

        // Act
        d.dispatch(&NetworkEvent::PeerAssociated(mac(1)));

        // Assert
        assert!(state.peers().is_empty());
    }

    // ── Readiness gates ───────────────────────────────────────────────────────

    #[test]
    fn test_supplicant_events_toggle_link_ready() {
        // Arrange
        let (d, state, _) = build(Role::Client, MockLinkControl::new(), MockDeviceControl::new());

        // Act / Assert
        d.dispatch(&NetworkEvent::SupplicantReady);
        assert!(state.is_link_ready());
        assert!(state.supplicant_ready().is_raised());

        d.dispatch(&NetworkEvent::SupplicantNotReady);
        assert!(!state.is_link_ready());
        assert!(!state.supplicant_ready().is_raised());
    }

    #[test]
    fn test_host_enable_success_opens_gate() {
        let (d, state, _) = build(Role::Host, MockLinkControl::new(), MockDeviceControl::new());
        d.dispatch(&NetworkEvent::HostEnableResult(0));
        assert!(state.host_enabled().is_raised());
    }

    #[test]
    fn test_host_enable_failure_keeps_gate_closed() {
        let (d, state, _) = build(Role::Host, MockLinkControl::new(), MockDeviceControl::new());
        d.dispatch(&NetworkEvent::HostEnableResult(-1));
        assert!(!state.host_enabled().is_raised());
    }

    // ── Association ───────────────────────────────────────────────────────────

    #[test]
    fn test_assoc_success_records_ssid_from_status() {
        // Arrange
        let mut link = MockLinkControl::new();
        link.expect_status()
            .times(1)
            .returning(|| Ok(status_on("HomeNet")));
        let (d, state, _) = build(Role::Client, link, MockDeviceControl::new());

        // Act
        d.dispatch(&NetworkEvent::AssocResult(0));

        // Assert
        assert_eq!(state.last_ssid().as_deref(), Some("HomeNet"));
    }

    #[test]
    fn test_known_assoc_failure_does_not_restart() {
        // Arrange
        let mut device = MockDeviceControl::new();
        device.expect_restart().times(0);
        let (d, _, _) = build(Role::Client, MockLinkControl::new(), device);

        // Act / Assert – mock verifies on drop
        for code in [1, 2, 3, 15, 16] {
            d.dispatch(&NetworkEvent::AssocResult(code));
        }
    }

    #[test]
    fn test_unknown_assoc_failure_restarts_after_grace() {
        // Arrange
        let mut device = MockDeviceControl::new();
        device
            .expect_restart()
            .withf(|reason| reason.contains("42"))
            .times(1)
            .return_const(());
        let (d, _, _) = build(Role::Client, MockLinkControl::new(), device);

        // Act
        d.dispatch(&NetworkEvent::AssocResult(42));
    }

    #[test]
    fn test_association_failure_reasons() {
        assert_eq!(association_failure_reason(15), Some("AP not found"));
        assert_eq!(association_failure_reason(16), Some("Association timeout"));
        assert_eq!(association_failure_reason(99), None);
    }

    // ── Disassociation ────────────────────────────────────────────────────────

    #[test]
    fn test_client_disassociation_clears_target_and_restarts() {
        // Arrange
        let mut device = MockDeviceControl::new();
        device.expect_restart().times(1).return_const(());
        let (d, state, _) = build(Role::Client, MockLinkControl::new(), device);
        state.target().set_ipv4(GATEWAY_ADDR);

        // Act
        d.dispatch(&NetworkEvent::DisassocResult(8));

        // Assert
        assert!(!state.target().is_set());
    }

    #[test]
    fn test_host_disassociation_does_not_restart() {
        let mut device = MockDeviceControl::new();
        device.expect_restart().times(0);
        let (d, _, _) = build(Role::Host, MockLinkControl::new(), device);
        d.dispatch(&NetworkEvent::DisassocResult(8));
    }

    // ── Address bound ─────────────────────────────────────────────────────────

    #[test]
    fn test_address_bound_opens_network_gate() {
        // Arrange
        let (d, state, _) = build(Role::Client, MockLinkControl::new(), MockDeviceControl::new());
        let local = Ipv4Addr::new(192, 168, 1, 2);

        // Act
        d.dispatch(&NetworkEvent::AddressBound(local));

        // Assert
        assert!(state.is_address_bound());
        assert_eq!(state.local_addr(), Some(local));
        assert!(state.network_ready().is_raised());
    }

    #[test]
    fn test_gateway_ssid_preseeds_gateway_target() {
        // Arrange
        let (d, state, _) = build(Role::Client, MockLinkControl::new(), MockDeviceControl::new());
        state.set_last_ssid(GATEWAY_SSID);

        // Act
        d.dispatch(&NetworkEvent::AddressBound(Ipv4Addr::new(192, 168, 1, 2)));

        // Assert
        assert_eq!(
            state.target().target(),
            Some(SocketAddrV4::new(GATEWAY_ADDR, TRANSPORT_PORT))
        );
    }

    #[test]
    fn test_other_ssid_does_not_preseed() {
        let (d, state, _) = build(Role::Client, MockLinkControl::new(), MockDeviceControl::new());
        state.set_last_ssid("HomeNet");
        d.dispatch(&NetworkEvent::AddressBound(Ipv4Addr::new(10, 0, 0, 5)));
        assert!(!state.target().is_set());
    }

    #[test]
    fn test_preseed_keeps_configured_target() {
        // Arrange
        let (d, state, _) = build(Role::Client, MockLinkControl::new(), MockDeviceControl::new());
        let configured = SocketAddrV4::new(Ipv4Addr::new(192, 168, 1, 50), 7000);
        state.target().set(configured);
        state.set_last_ssid(GATEWAY_SSID);

        // Act
        d.dispatch(&NetworkEvent::AddressBound(Ipv4Addr::new(192, 168, 1, 2)));

        // Assert
        assert_eq!(state.target().target(), Some(configured));
    }

    #[test]
    fn test_host_role_never_preseeds() {
        let (d, state, _) = build(Role::Host, MockLinkControl::new(), MockDeviceControl::new());
        state.set_last_ssid(GATEWAY_SSID);
        d.dispatch(&NetworkEvent::AddressBound(GATEWAY_ADDR));
        assert!(!state.target().is_set());
    }

    // ── Peers ─────────────────────────────────────────────────────────────────

    #[test]
    fn test_peer_association_raises_peer_present() {
        // Arrange
        let (d, state, _) = build(Role::Host, MockLinkControl::new(), MockDeviceControl::new());

        // Act
        d.dispatch(&NetworkEvent::PeerAssociated(mac(1)));

        // Assert
        assert_eq!(state.peers().occupied(), 1);
        assert!(state.peer_present().is_raised());
    }

    #[test]
    fn test_last_peer_leaving_resets_session_once() {
        // Arrange
        let (d, _, session) = build(Role::Host, MockLinkControl::new(), MockDeviceControl::new());
        d.dispatch(&NetworkEvent::PeerAssociated(mac(1)));
        d.dispatch(&NetworkEvent::PeerAssociated(mac(2)));

        // Act
        d.dispatch(&NetworkEvent::PeerDisassociated(mac(1)));
        let after_first = session.disconnects.load(Ordering::SeqCst);
        d.dispatch(&NetworkEvent::PeerDisassociated(mac(2)));

        // Assert
        assert_eq!(after_first, 0);
        assert_eq!(session.disconnects.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unknown_peer_departure_is_ignored() {
        let (d, _, session) = build(Role::Host, MockLinkControl::new(), MockDeviceControl::new());
        d.dispatch(&NetworkEvent::PeerDisassociated(mac(7)));
        assert_eq!(session.disconnects.load(Ordering::SeqCst), 0);
    }
}
