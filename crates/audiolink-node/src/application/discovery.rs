//! Endpoint discovery: finding the host's address from the client.
//!
//! # Two-phase DNS-SD lookup
//!
//! 1. **Service query** – browse `_audiolink._udp.local` and wait up to the
//!    query timeout for a record carrying an instance name. SRV data seen on
//!    the way updates the host and port; TXT strings are logged.
//! 2. **Host resolution** – derive `<instance label>.local` and poll an
//!    address query with short per-poll timeouts, up to the poll budget.
//!
//! On success the address (and the SRV port, if one arrived) is written into
//! the [`TargetRegistry`]. Any query still pending when an attempt ends is
//! cancelled.
//!
//! # Generic name resolution
//!
//! Builds configured with [`DiscoveryMethod::Name`] replace both phases with
//! a single lookup of a fixed host name. The outcome is written the same way.
//!
//! # Retry
//!
//! [`EndpointDiscovery::discover`] wraps one attempt in a fixed-count retry
//! loop. Running out of attempts is not fatal; the caller falls back to
//! manual configuration and passive learning.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use audiolink_core::protocol::dns_sd::{hostname_from_instance, service_name, DiscoveryRecord};
use audiolink_core::{ShutdownToken, TargetRegistry};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::{pause, Timings};

/// Error reported by a resolver backend.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("resolver backend error: {0}")]
    Backend(String),
    #[error("invalid name {0:?}")]
    InvalidName(String),
}

/// Why an attempt, or the whole retry loop, found no address.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("could not start {phase}: {source}")]
    QueryStart {
        phase: &'static str,
        #[source]
        source: ResolveError,
    },
    #[error("{phase} timed out after {timeout:?}")]
    Timeout {
        phase: &'static str,
        timeout: Duration,
    },
    #[error("{phase} failed with status {code}")]
    QueryFailed { phase: &'static str, code: i32 },
    #[error("service query finished without an instance name")]
    NoInstance,
    #[error("no address for {host} after {polls} polls")]
    NoAddress { host: String, polls: u32 },
    #[error("resolver error: {0}")]
    Resolve(#[from] ResolveError),
    #[error("no peer address after {0} attempts")]
    Exhausted(u32),
    #[error("discovery is disabled")]
    Disabled,
    #[error("discovery cancelled by shutdown")]
    Cancelled,
}

/// How the client looks for the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryMethod {
    /// Two-phase DNS-SD lookup.
    Service,
    /// Single lookup of a configured host name.
    Name,
    /// No lookup; manual configuration or passive learning only.
    Disabled,
}

impl DiscoveryMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            DiscoveryMethod::Service => "service",
            DiscoveryMethod::Name => "name",
            DiscoveryMethod::Disabled => "none",
        }
    }
}

impl fmt::Display for DiscoveryMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DiscoveryMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "service" | "dns-sd" => Ok(DiscoveryMethod::Service),
            "name" => Ok(DiscoveryMethod::Name),
            "none" | "disabled" => Ok(DiscoveryMethod::Disabled),
            other => Err(format!(
                "unknown discovery method {other:?}, expected \"service\", \"name\" or \"none\""
            )),
        }
    }
}

// ── Resolver ports ────────────────────────────────────────────────────────────

/// An in-flight resolver query.
pub trait PendingQuery: Send {
    /// Waits up to `timeout` for the next record. `Ok(None)` means nothing
    /// arrived in time.
    fn next_record(&mut self, timeout: Duration) -> Result<Option<DiscoveryRecord>, ResolveError>;

    /// Stops the query. Further records are discarded.
    fn cancel(&mut self);
}

/// DNS-SD browse and host-address queries.
pub trait ServiceResolver: Send + Sync {
    fn browse(&self, service: &str) -> Result<Box<dyn PendingQuery>, ResolveError>;
    fn resolve_host(&self, hostname: &str) -> Result<Box<dyn PendingQuery>, ResolveError>;
}

/// One-shot host name lookup.
pub trait NameResolver: Send + Sync {
    fn resolve(&self, hostname: &str, timeout: Duration) -> Result<Option<Ipv4Addr>, ResolveError>;
}

/// Publishes this node's service record (host role).
pub trait ServiceAdvertiser: Send + Sync {
    fn advertise(&self, instance: &str, port: u16) -> Result<(), ResolveError>;
}

// ── Per-attempt state ─────────────────────────────────────────────────────────

/// Where an attempt currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DiscoveryPhase {
    #[default]
    ServiceQuery,
    HostResolution,
    Resolved,
}

/// State of one discovery attempt.
///
/// Dropping the context cancels any query still pending.
#[derive(Default)]
pub struct DiscoveryContext {
    pub instance_name: Option<String>,
    pub host: Option<String>,
    pub address: Option<Ipv4Addr>,
    pub port: Option<u16>,
    pub phase: DiscoveryPhase,
    pending: Option<Box<dyn PendingQuery>>,
}

impl DiscoveryContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_pending_query(&self) -> bool {
        self.pending.is_some()
    }

    fn track(&mut self, query: Box<dyn PendingQuery>) {
        self.cancel_pending();
        self.pending = Some(query);
    }

    fn next_record(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<DiscoveryRecord>, ResolveError> {
        match self.pending.as_mut() {
            Some(query) => query.next_record(timeout),
            None => Ok(None),
        }
    }

    /// Cancels the pending query, if any.
    pub fn cancel_pending(&mut self) {
        if let Some(mut query) = self.pending.take() {
            query.cancel();
        }
    }
}

impl Drop for DiscoveryContext {
    fn drop(&mut self) {
        self.cancel_pending();
    }
}

impl fmt::Debug for DiscoveryContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscoveryContext")
            .field("instance_name", &self.instance_name)
            .field("host", &self.host)
            .field("address", &self.address)
            .field("port", &self.port)
            .field("phase", &self.phase)
            .field("pending", &self.pending.is_some())
            .finish()
    }
}

// ── Use case ──────────────────────────────────────────────────────────────────

/// Resolver wiring for the configured [`DiscoveryMethod`].
#[derive(Clone)]
pub enum DiscoveryBackend {
    Service(Arc<dyn ServiceResolver>),
    Name {
        resolver: Arc<dyn NameResolver>,
        hostname: String,
    },
    Disabled,
}

impl DiscoveryBackend {
    pub fn method(&self) -> DiscoveryMethod {
        match self {
            DiscoveryBackend::Service(_) => DiscoveryMethod::Service,
            DiscoveryBackend::Name { .. } => DiscoveryMethod::Name,
            DiscoveryBackend::Disabled => DiscoveryMethod::Disabled,
        }
    }
}

/// Locates the host and writes its endpoint into the target registry.
pub struct EndpointDiscovery {
    backend: DiscoveryBackend,
    timings: Timings,
    default_port: u16,
}

impl EndpointDiscovery {
    pub fn new(backend: DiscoveryBackend, timings: Timings, default_port: u16) -> Self {
        Self {
            backend,
            timings,
            default_port,
        }
    }

    pub fn method(&self) -> DiscoveryMethod {
        self.backend.method()
    }

    /// Runs attempts until one succeeds, the attempt budget runs out, or
    /// `shutdown` fires.
    ///
    /// A target that appears in the registry between attempts (manual
    /// override or passive learning) ends the loop successfully.
    ///
    /// # Errors
    ///
    /// [`DiscoveryError::Disabled`] without a backend,
    /// [`DiscoveryError::Exhausted`] after the last failed attempt,
    /// [`DiscoveryError::Cancelled`] on shutdown.
    pub fn discover(
        &self,
        target: &TargetRegistry,
        shutdown: &ShutdownToken,
    ) -> Result<SocketAddrV4, DiscoveryError> {
        if matches!(self.backend, DiscoveryBackend::Disabled) {
            return Err(DiscoveryError::Disabled);
        }

        let attempts = self.timings.discovery_attempts;
        for attempt in 1..=attempts {
            if shutdown.is_cancelled() {
                return Err(DiscoveryError::Cancelled);
            }
            if let Some(current) = target.target() {
                info!("target {current} already known, skipping discovery");
                return Ok(current);
            }

            match self.attempt(target) {
                Ok(addr) => return Ok(addr),
                Err(e) => warn!("discovery attempt {attempt}/{attempts} failed: {e}"),
            }

            if attempt < attempts && !pause(self.timings.discovery_retry_delay, shutdown) {
                return Err(DiscoveryError::Cancelled);
            }
        }

        Err(DiscoveryError::Exhausted(attempts))
    }

    /// One attempt with the configured backend.
    ///
    /// # Errors
    ///
    /// Any [`DiscoveryError`] describing why this attempt found nothing.
    pub fn attempt(&self, target: &TargetRegistry) -> Result<SocketAddrV4, DiscoveryError> {
        match &self.backend {
            DiscoveryBackend::Service(resolver) => self.attempt_service(resolver.as_ref(), target),
            DiscoveryBackend::Name { resolver, hostname } => {
                self.attempt_name(resolver.as_ref(), hostname, target)
            }
            DiscoveryBackend::Disabled => Err(DiscoveryError::Disabled),
        }
    }

    fn attempt_service(
        &self,
        resolver: &dyn ServiceResolver,
        target: &TargetRegistry,
    ) -> Result<SocketAddrV4, DiscoveryError> {
        let mut ctx = DiscoveryContext::new();

        self.query_service(resolver, &mut ctx)?;
        let address = self.resolve_host(resolver, &mut ctx)?;

        let port = ctx.port.filter(|p| *p != 0).unwrap_or(self.default_port);
        let addr = SocketAddrV4::new(address, port);
        info!("resolved peer: {addr}");
        target.set(addr);
        Ok(addr)
    }

    /// Phase 1: wait for an instance name.
    fn query_service(
        &self,
        resolver: &dyn ServiceResolver,
        ctx: &mut DiscoveryContext,
    ) -> Result<(), DiscoveryError> {
        const PHASE: &str = "service query";

        ctx.phase = DiscoveryPhase::ServiceQuery;
        let query = resolver
            .browse(&service_name())
            .map_err(|source| DiscoveryError::QueryStart { phase: PHASE, source })?;
        ctx.track(query);

        let timeout = self.timings.discovery_query;
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                ctx.cancel_pending();
                return Err(DiscoveryError::Timeout { phase: PHASE, timeout });
            }

            let record = match ctx.next_record(remaining) {
                Ok(Some(record)) => record,
                Ok(None) => {
                    ctx.cancel_pending();
                    return Err(DiscoveryError::Timeout { phase: PHASE, timeout });
                }
                Err(e) => {
                    ctx.cancel_pending();
                    return Err(e.into());
                }
            };

            match record {
                DiscoveryRecord::Instance(name) => {
                    info!("discovered service instance {name}");
                    ctx.instance_name = Some(name);
                    ctx.cancel_pending();
                    return Ok(());
                }
                DiscoveryRecord::Service { host, port } => {
                    info!("SRV record: host={host}, port={port}");
                    ctx.host = Some(host);
                    ctx.port = Some(port);
                }
                DiscoveryRecord::Text(text) => info!("DNS-SD TXT: {text}"),
                DiscoveryRecord::Ipv4(ip) => debug!("A record {ip} during service query"),
                DiscoveryRecord::Finished(Err(code)) => {
                    ctx.cancel_pending();
                    return Err(DiscoveryError::QueryFailed { phase: PHASE, code });
                }
                DiscoveryRecord::Finished(Ok(())) => {
                    ctx.cancel_pending();
                    return Err(DiscoveryError::NoInstance);
                }
            }
        }
    }

    /// Phase 2: poll for the host's address.
    fn resolve_host(
        &self,
        resolver: &dyn ServiceResolver,
        ctx: &mut DiscoveryContext,
    ) -> Result<Ipv4Addr, DiscoveryError> {
        const PHASE: &str = "host query";

        let instance = ctx.instance_name.clone().ok_or(DiscoveryError::NoInstance)?;
        let hostname = hostname_from_instance(&instance);
        info!("querying A record for: {hostname}");

        ctx.phase = DiscoveryPhase::HostResolution;
        let query = resolver
            .resolve_host(&hostname)
            .map_err(|source| DiscoveryError::QueryStart { phase: PHASE, source })?;
        ctx.track(query);

        let budget = self.timings.discovery_poll_budget;
        for poll in 1..=budget {
            match ctx.next_record(self.timings.discovery_poll) {
                Ok(Some(DiscoveryRecord::Ipv4(ip))) if !ip.is_unspecified() => {
                    info!("A record: {ip}");
                    ctx.address = Some(ip);
                    ctx.phase = DiscoveryPhase::Resolved;
                    ctx.cancel_pending();
                    return Ok(ip);
                }
                Ok(Some(DiscoveryRecord::Finished(Err(code)))) => {
                    ctx.cancel_pending();
                    return Err(DiscoveryError::QueryFailed { phase: PHASE, code });
                }
                Ok(Some(other)) => debug!("poll {poll}/{budget}: ignoring {other:?}"),
                Ok(None) => debug!("poll {poll}/{budget}: no address yet"),
                Err(e) => {
                    ctx.cancel_pending();
                    return Err(e.into());
                }
            }
        }

        ctx.cancel_pending();
        Err(DiscoveryError::NoAddress {
            host: hostname,
            polls: budget,
        })
    }

    fn attempt_name(
        &self,
        resolver: &dyn NameResolver,
        hostname: &str,
        target: &TargetRegistry,
    ) -> Result<SocketAddrV4, DiscoveryError> {
        info!("resolving {hostname}");
        let ip = resolver
            .resolve(hostname, self.timings.discovery_query)?
            .filter(|ip| !ip.is_unspecified())
            .ok_or_else(|| DiscoveryError::NoAddress {
                host: hostname.to_string(),
                polls: 1,
            })?;

        let addr = SocketAddrV4::new(ip, self.default_port);
        info!("resolved peer: {addr}");
        target.set(addr);
        Ok(addr)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::mdns::mock::{ScriptedNameResolver, ScriptedResolver};
    use audiolink_core::constants::TRANSPORT_PORT;

    const GATEWAY: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 1);

    fn fast_timings() -> Timings {
        Timings {
            discovery_query: Duration::from_millis(50),
            discovery_poll: Duration::from_millis(5),
            discovery_retry_delay: Duration::from_millis(1),
            ..Timings::default()
        }
    }

    fn discovery(resolver: &Arc<ScriptedResolver>) -> EndpointDiscovery {
        let backend = DiscoveryBackend::Service(Arc::clone(resolver) as Arc<dyn ServiceResolver>);
        EndpointDiscovery::new(backend, fast_timings(), TRANSPORT_PORT)
    }

    fn instance() -> DiscoveryRecord {
        DiscoveryRecord::Instance("audiogateway._audiolink._udp.local".to_string())
    }

    #[test]
    fn test_attempt_resolves_instance_then_address() {
        // Arrange
        let resolver = Arc::new(ScriptedResolver::new());
        resolver.push_browse(vec![instance()]);
        resolver.push_host(vec![DiscoveryRecord::Ipv4(GATEWAY)]);
        let target = TargetRegistry::new(TRANSPORT_PORT);

        // Act
        let addr = discovery(&resolver).attempt(&target).expect("resolved");

        // Assert
        assert_eq!(addr, SocketAddrV4::new(GATEWAY, TRANSPORT_PORT));
        assert_eq!(target.target(), Some(addr));
        assert_eq!(resolver.host_queries(), vec!["audiogateway.local".to_string()]);
    }

    #[test]
    fn test_srv_port_overrides_default_port() {
        // Arrange
        let resolver = Arc::new(ScriptedResolver::new());
        resolver.push_browse(vec![
            DiscoveryRecord::Service {
                host: "audiogateway.local".to_string(),
                port: 61000,
            },
            DiscoveryRecord::Text("codec=opus".to_string()),
            instance(),
        ]);
        resolver.push_host(vec![DiscoveryRecord::Ipv4(GATEWAY)]);
        let target = TargetRegistry::new(TRANSPORT_PORT);

        // Act
        let addr = discovery(&resolver).attempt(&target).expect("resolved");

        // Assert
        assert_eq!(addr.port(), 61000);
    }

    #[test]
    fn test_phase_one_timeout_cancels_query() {
        // Arrange
        let resolver = Arc::new(ScriptedResolver::new());
        resolver.push_browse(vec![]);
        let target = TargetRegistry::new(TRANSPORT_PORT);

        // Act
        let result = discovery(&resolver).attempt(&target);

        // Assert
        assert!(matches!(result, Err(DiscoveryError::Timeout { .. })));
        assert_eq!(resolver.cancelled(), 1);
        assert!(!target.is_set());
    }

    #[test]
    fn test_phase_one_error_status_is_reported() {
        let resolver = Arc::new(ScriptedResolver::new());
        resolver.push_browse(vec![DiscoveryRecord::Finished(Err(-3))]);
        let result = discovery(&resolver).attempt(&TargetRegistry::new(TRANSPORT_PORT));
        assert!(matches!(
            result,
            Err(DiscoveryError::QueryFailed { code: -3, .. })
        ));
    }

    #[test]
    fn test_phase_two_exhausts_poll_budget() {
        // Arrange – instance found, but the host never answers
        let resolver = Arc::new(ScriptedResolver::new());
        resolver.push_browse(vec![instance()]);
        resolver.push_host(vec![DiscoveryRecord::Text("noise".to_string())]);
        let target = TargetRegistry::new(TRANSPORT_PORT);

        // Act
        let result = discovery(&resolver).attempt(&target);

        // Assert
        assert!(matches!(
            result,
            Err(DiscoveryError::NoAddress { polls: 5, .. })
        ));
        assert_eq!(resolver.cancelled(), 2, "both queries cancelled");
    }

    #[test]
    fn test_three_timeouts_exhaust_retry_loop() {
        // Arrange
        let resolver = Arc::new(ScriptedResolver::new());
        for _ in 0..3 {
            resolver.push_browse(vec![]);
        }
        let target = TargetRegistry::new(TRANSPORT_PORT);

        // Act
        let result = discovery(&resolver).discover(&target, &ShutdownToken::new());

        // Assert
        assert!(matches!(result, Err(DiscoveryError::Exhausted(3))));
        assert_eq!(resolver.browses(), 3);
        assert!(!target.is_set());
    }

    #[test]
    fn test_success_on_third_attempt_writes_once() {
        // Arrange
        let resolver = Arc::new(ScriptedResolver::new());
        resolver.push_browse(vec![]);
        resolver.push_browse(vec![]);
        resolver.push_browse(vec![instance()]);
        resolver.push_host(vec![DiscoveryRecord::Ipv4(GATEWAY)]);
        let target = TargetRegistry::new(TRANSPORT_PORT);

        // Act
        let result = discovery(&resolver).discover(&target, &ShutdownToken::new());

        // Assert
        assert_eq!(result.ok(), Some(SocketAddrV4::new(GATEWAY, TRANSPORT_PORT)));
        assert_eq!(target.revision(), 1);
    }

    #[test]
    fn test_discover_skips_when_target_already_known() {
        // Arrange
        let resolver = Arc::new(ScriptedResolver::new());
        let target = TargetRegistry::new(TRANSPORT_PORT);
        target.set_ipv4(GATEWAY);

        // Act
        let result = discovery(&resolver).discover(&target, &ShutdownToken::new());

        // Assert
        assert!(result.is_ok());
        assert_eq!(resolver.browses(), 0);
    }

    #[test]
    fn test_disabled_backend_reports_disabled() {
        let d = EndpointDiscovery::new(DiscoveryBackend::Disabled, fast_timings(), TRANSPORT_PORT);
        let result = d.discover(&TargetRegistry::new(TRANSPORT_PORT), &ShutdownToken::new());
        assert!(matches!(result, Err(DiscoveryError::Disabled)));
    }

    #[test]
    fn test_cancelled_token_stops_retry_loop() {
        let resolver = Arc::new(ScriptedResolver::new());
        let token = ShutdownToken::new();
        token.cancel();
        let result = discovery(&resolver).discover(&TargetRegistry::new(TRANSPORT_PORT), &token);
        assert!(matches!(result, Err(DiscoveryError::Cancelled)));
    }

    #[test]
    fn test_name_backend_writes_resolved_address() {
        // Arrange
        let resolver = Arc::new(ScriptedNameResolver::answering(Some(GATEWAY)));
        let backend = DiscoveryBackend::Name {
            resolver: resolver as Arc<dyn NameResolver>,
            hostname: "audiogateway.local".to_string(),
        };
        let target = TargetRegistry::new(TRANSPORT_PORT);

        // Act
        let result = EndpointDiscovery::new(backend, fast_timings(), TRANSPORT_PORT)
            .discover(&target, &ShutdownToken::new());

        // Assert
        assert_eq!(result.ok(), Some(SocketAddrV4::new(GATEWAY, TRANSPORT_PORT)));
        assert!(target.is_set());
    }

    #[test]
    fn test_name_backend_without_answer_is_no_address() {
        let resolver = Arc::new(ScriptedNameResolver::answering(None));
        let backend = DiscoveryBackend::Name {
            resolver: resolver as Arc<dyn NameResolver>,
            hostname: "audiogateway.local".to_string(),
        };
        let result = EndpointDiscovery::new(backend, fast_timings(), TRANSPORT_PORT)
            .attempt(&TargetRegistry::new(TRANSPORT_PORT));
        assert!(matches!(result, Err(DiscoveryError::NoAddress { .. })));
    }

    #[test]
    fn test_discovery_method_parses_config_names() {
        assert_eq!("service".parse::<DiscoveryMethod>(), Ok(DiscoveryMethod::Service));
        assert_eq!("NAME".parse::<DiscoveryMethod>(), Ok(DiscoveryMethod::Name));
        assert_eq!("none".parse::<DiscoveryMethod>(), Ok(DiscoveryMethod::Disabled));
        assert!("mdns".parse::<DiscoveryMethod>().is_err());
    }

    #[test]
    fn test_dropping_context_cancels_pending_query() {
        // Arrange
        let resolver = ScriptedResolver::new();
        resolver.push_browse(vec![]);
        let mut ctx = DiscoveryContext::new();
        ctx.track(resolver.browse("_audiolink._udp.local").expect("browse"));

        // Act
        drop(ctx);

        // Assert
        assert_eq!(resolver.cancelled(), 1);
    }
}
