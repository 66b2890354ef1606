//! The blocking startup sequence that runs before the socket loop.
//!
//! ```text
//! supplicant ready
//!   ├─ host:   regulatory domain → DHCP server → host mode → host enabled
//!   │          → advertise service → first peer
//!   └─ client: auto-connect → bring up interfaces → network ready
//!              → discovery (when no target is known)
//! ```
//!
//! Each wait uses [`Timings::bootstrap_wait`] as its bound and the node's
//! shutdown token for cancellation.

use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::Arc;

use audiolink_core::{Role, SessionState, ShutdownToken, Signal, SignalError};
use thiserror::Error;
use tracing::{error, info, warn};

use super::discovery::{DiscoveryError, EndpointDiscovery, ServiceAdvertiser};
use super::dispatcher::report_link_status;
use super::ports::{HostParams, LinkControl, LinkError};
use super::Timings;

/// Why bootstrap stopped before the socket loop could start.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Wait(#[from] SignalError),

    #[error(transparent)]
    Link(#[from] LinkError),
}

/// What the host role needs to bring up its network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostSettings {
    pub ssid: String,
    pub passphrase: String,
    pub regulatory_domain: String,
    pub channel: u8,
    pub pool_start: Ipv4Addr,
}

/// Fixed inputs of the startup sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapConfig {
    pub host: HostSettings,
    /// Target written before any wait, from configuration.
    pub preconfigured_target: Option<SocketAddrV4>,
    /// Transport port, used for the advertised service and the manual hint.
    pub port: u16,
    /// Instance name the host advertises.
    pub hostname: String,
}

/// Drives one node through the startup sequence for its role.
pub struct Bootstrap {
    state: Arc<SessionState>,
    link: Arc<dyn LinkControl>,
    discovery: EndpointDiscovery,
    advertiser: Option<Arc<dyn ServiceAdvertiser>>,
    config: BootstrapConfig,
    timings: Timings,
}

impl Bootstrap {
    pub fn new(
        state: Arc<SessionState>,
        link: Arc<dyn LinkControl>,
        discovery: EndpointDiscovery,
        advertiser: Option<Arc<dyn ServiceAdvertiser>>,
        config: BootstrapConfig,
        timings: Timings,
    ) -> Self {
        Self {
            state,
            link,
            discovery,
            advertiser,
            config,
            timings,
        }
    }

    /// Runs the sequence. Returns once the socket loop may start.
    ///
    /// Discovery failure is not an error: passive learning and manual
    /// configuration can still provide a target later.
    ///
    /// # Errors
    ///
    /// [`BootstrapError::Wait`] if a readiness wait timed out or was
    /// cancelled, [`BootstrapError::Link`] if the host network could not be
    /// brought up.
    pub fn run(&self, shutdown: &ShutdownToken) -> Result<(), BootstrapError> {
        if let Some(target) = self.config.preconfigured_target {
            info!("using configured target {target}");
            self.state.target().set(target);
        }

        self.wait(self.state.supplicant_ready(), shutdown)?;
        info!("supplicant ready, starting {} role", self.state.role());

        match self.state.role() {
            Role::Host => self.run_host(shutdown),
            Role::Client => self.run_client(shutdown),
        }
    }

    fn run_host(&self, shutdown: &ShutdownToken) -> Result<(), BootstrapError> {
        let host = &self.config.host;

        self.link
            .set_regulatory_domain(&host.regulatory_domain)
            .map_err(|e| {
                error!("could not set regulatory domain {}: {e}", host.regulatory_domain);
                e
            })?;

        self.link.start_dhcp_server(host.pool_start).map_err(|e| {
            error!("failed to start DHCP server: {e}");
            e
        })?;
        info!("DHCP server started, pool from {}", host.pool_start);

        let params = HostParams {
            ssid: host.ssid.clone(),
            passphrase: host.passphrase.clone(),
            channel: host.channel,
        };
        self.link.enable_host(&params)?;

        self.wait(self.state.host_enabled(), shutdown)?;
        info!("host network {} is up", host.ssid);
        report_link_status(self.link.as_ref());

        if let Some(advertiser) = &self.advertiser {
            match advertiser.advertise(&self.config.hostname, self.config.port) {
                Ok(()) => info!(
                    "advertising {} on port {}",
                    self.config.hostname, self.config.port
                ),
                Err(e) => warn!("service advertisement failed: {e}"),
            }
        }

        info!("waiting for a peer to join SSID {}", host.ssid);
        self.wait(self.state.peer_present(), shutdown)?;
        info!("peer joined");
        Ok(())
    }

    fn run_client(&self, shutdown: &ShutdownToken) -> Result<(), BootstrapError> {
        if let Err(e) = self.link.auto_connect() {
            warn!("auto-connect failed: {e}");
        }
        if let Err(e) = self.link.bring_up_all() {
            warn!("could not bring up interfaces: {e}");
        }

        self.wait(self.state.network_ready(), shutdown)?;
        info!("network ready");

        if self.state.target().is_set() {
            return Ok(());
        }

        match self.discovery.discover(self.state.target(), shutdown) {
            Ok(addr) => info!("peer endpoint {addr}"),
            Err(DiscoveryError::Cancelled) => {
                return Err(SignalError::Cancelled("discovery").into());
            }
            Err(e) => {
                warn!("discovery gave up: {e}");
                self.log_manual_hint();
            }
        }
        Ok(())
    }

    fn log_manual_hint(&self) {
        info!("waiting for a datagram from the host, or set the target manually:");
        info!("  socket set_target_addr 192.168.1.1:{}", self.config.port);
    }

    fn wait(&self, gate: &Signal, shutdown: &ShutdownToken) -> Result<(), SignalError> {
        gate.take(self.timings.bootstrap_wait, Some(shutdown))
            .map_err(|e| {
                warn!("{e}");
                e
            })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::discovery::DiscoveryBackend;
    use crate::application::ports::{LinkStatus, MockLinkControl};
    use audiolink_core::constants::{DHCP_POOL_START, TRANSPORT_PORT};
    use std::time::Duration;

    fn config() -> BootstrapConfig {
        BootstrapConfig {
            host: HostSettings {
                ssid: "AudioLink".to_string(),
                passphrase: "password".to_string(),
                regulatory_domain: "US".to_string(),
                channel: 1,
                pool_start: DHCP_POOL_START,
            },
            preconfigured_target: None,
            port: TRANSPORT_PORT,
            hostname: "audiogateway".to_string(),
        }
    }

    fn bootstrap(
        state: &Arc<SessionState>,
        link: MockLinkControl,
        cfg: BootstrapConfig,
    ) -> Bootstrap {
        let timings = Timings {
            bootstrap_wait: Some(Duration::from_millis(50)),
            ..Timings::default()
        };
        let discovery =
            EndpointDiscovery::new(DiscoveryBackend::Disabled, timings.clone(), TRANSPORT_PORT);
        Bootstrap::new(Arc::clone(state), Arc::new(link), discovery, None, cfg, timings)
    }

    #[test]
    fn test_missing_supplicant_times_out_when_bounded() {
        // Arrange
        let state = Arc::new(SessionState::new(Role::Client, TRANSPORT_PORT, DHCP_POOL_START));
        let b = bootstrap(&state, MockLinkControl::new(), config());

        // Act
        let result = b.run(&ShutdownToken::new());

        // Assert
        assert!(matches!(
            result,
            Err(BootstrapError::Wait(SignalError::TimedOut(_, "supplicant-ready")))
        ));
    }

    #[test]
    fn test_preconfigured_target_is_written_before_waiting() {
        // Arrange
        let state = Arc::new(SessionState::new(Role::Client, TRANSPORT_PORT, DHCP_POOL_START));
        let target = SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 9), 7000);
        let mut cfg = config();
        cfg.preconfigured_target = Some(target);
        let b = bootstrap(&state, MockLinkControl::new(), cfg);

        // Act
        let _ = b.run(&ShutdownToken::new());

        // Assert
        assert_eq!(state.target().target(), Some(target));
    }

    #[test]
    fn test_client_failures_before_network_ready_are_not_fatal() {
        // Arrange
        let state = Arc::new(SessionState::new(Role::Client, TRANSPORT_PORT, DHCP_POOL_START));
        let mut link = MockLinkControl::new();
        link.expect_auto_connect().times(1).returning(|| {
            Err(LinkError::Rejected {
                operation: "auto_connect",
                code: 5,
            })
        });
        link.expect_bring_up_all().times(1).returning(|| Ok(()));
        state.supplicant_ready().give();
        state.network_ready().give();
        let b = bootstrap(&state, link, config());

        // Act
        let result = b.run(&ShutdownToken::new());

        // Assert
        assert!(result.is_ok());
        assert!(!state.target().is_set());
    }

    #[test]
    fn test_host_dhcp_failure_aborts_bootstrap() {
        // Arrange
        let state = Arc::new(SessionState::new(Role::Host, TRANSPORT_PORT, DHCP_POOL_START));
        let mut link = MockLinkControl::new();
        link.expect_set_regulatory_domain().returning(|_| Ok(()));
        link.expect_start_dhcp_server().returning(|_| {
            Err(LinkError::Rejected {
                operation: "start_dhcp_server",
                code: -1,
            })
        });
        link.expect_enable_host().never();
        state.supplicant_ready().give();
        let b = bootstrap(&state, link, config());

        // Act
        let result = b.run(&ShutdownToken::new());

        // Assert
        assert!(matches!(result, Err(BootstrapError::Link(_))));
    }

    #[test]
    fn test_host_regulatory_domain_failure_aborts_bootstrap() {
        // Arrange
        let state = Arc::new(SessionState::new(Role::Host, TRANSPORT_PORT, DHCP_POOL_START));
        let mut link = MockLinkControl::new();
        link.expect_set_regulatory_domain()
            .withf(|country| country == "US")
            .times(1)
            .returning(|_| {
                Err(LinkError::Rejected {
                    operation: "set_regulatory_domain",
                    code: 2,
                })
            });
        link.expect_start_dhcp_server().never();
        link.expect_enable_host().never();
        state.supplicant_ready().give();
        let b = bootstrap(&state, link, config());

        // Act
        let result = b.run(&ShutdownToken::new());

        // Assert
        assert!(matches!(
            result,
            Err(BootstrapError::Link(LinkError::Rejected {
                operation: "set_regulatory_domain",
                ..
            }))
        ));
    }

    #[test]
    fn test_host_waits_for_peer_after_enabling() {
        // Arrange
        let state = Arc::new(SessionState::new(Role::Host, TRANSPORT_PORT, DHCP_POOL_START));
        let mut link = MockLinkControl::new();
        link.expect_set_regulatory_domain()
            .withf(|country| country == "US")
            .returning(|_| Ok(()));
        link.expect_start_dhcp_server()
            .withf(|pool| *pool == DHCP_POOL_START)
            .returning(|_| Ok(()));
        link.expect_enable_host()
            .withf(|p| p.ssid == "AudioLink" && p.channel == 1)
            .times(1)
            .returning(|_| Ok(()));
        link.expect_status().returning(|| {
            Ok(LinkStatus {
                state: "enabled".to_string(),
                mode: "host".to_string(),
                ..Default::default()
            })
        });
        state.supplicant_ready().give();
        state.host_enabled().give();
        let b = bootstrap(&state, link, config());

        // Act – no peer ever arrives
        let result = b.run(&ShutdownToken::new());

        // Assert
        assert!(matches!(
            result,
            Err(BootstrapError::Wait(SignalError::TimedOut(_, "peer-present")))
        ));
    }

    #[test]
    fn test_cancelled_token_ends_bootstrap() {
        let state = Arc::new(SessionState::new(Role::Client, TRANSPORT_PORT, DHCP_POOL_START));
        let b = bootstrap(&state, MockLinkControl::new(), config());
        let token = ShutdownToken::new();
        token.cancel();
        assert!(matches!(
            b.run(&token),
            Err(BootstrapError::Wait(SignalError::Cancelled(_)))
        ));
    }
}
