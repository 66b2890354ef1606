//! DNS-SD over multicast DNS, backed by `mdns-sd`.
//!
//! [`MdnsResolver`] implements every resolver port:
//!
//! - `ServiceResolver::browse` browses the service type. Each resolved
//!   instance is delivered as its SRV data, then one record per TXT entry,
//!   then the instance name.
//! - `ServiceResolver::resolve_host` and `NameResolver::resolve` run a
//!   multicast host-name lookup.
//! - `ServiceAdvertiser::advertise` registers this node's instance with the
//!   capability TXT record.
//!
//! The daemon runs its own thread. Queries read its event channels with
//! `recv_timeout`, so every wait stays bounded.

pub mod mock;

use std::collections::VecDeque;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use audiolink_core::protocol::dns_sd::{service_name, DiscoveryRecord, CAPABILITY_TXT};
use mdns_sd::{HostnameResolutionEvent, Receiver, ServiceDaemon, ServiceEvent, ServiceInfo};
use tracing::{debug, info, warn};

use crate::application::discovery::{
    NameResolver, PendingQuery, ResolveError, ServiceAdvertiser, ServiceResolver,
};
use crate::application::lock;

/// Appends the root label `mdns-sd` expects on every name.
fn fqdn(name: &str) -> String {
    if name.ends_with('.') {
        name.to_string()
    } else {
        format!("{name}.")
    }
}

fn backend(e: mdns_sd::Error) -> ResolveError {
    ResolveError::Backend(e.to_string())
}

/// Multicast DNS resolver and advertiser.
pub struct MdnsResolver {
    daemon: ServiceDaemon,
    registered: Mutex<Option<String>>,
}

impl MdnsResolver {
    /// Starts the mDNS daemon.
    ///
    /// # Errors
    ///
    /// [`ResolveError::Backend`] if the daemon cannot open its sockets.
    pub fn new() -> Result<Self, ResolveError> {
        Ok(Self {
            daemon: ServiceDaemon::new().map_err(backend)?,
            registered: Mutex::new(None),
        })
    }

    /// Withdraws the advertised service, if any, and stops the daemon.
    pub fn shutdown(&self) {
        if let Some(fullname) = lock(&self.registered).take() {
            if let Err(e) = self.daemon.unregister(&fullname) {
                warn!("failed to unregister {fullname}: {e}");
            }
        }
        if let Err(e) = self.daemon.shutdown() {
            debug!("mdns daemon shutdown: {e}");
        }
    }
}

impl ServiceResolver for MdnsResolver {
    fn browse(&self, service: &str) -> Result<Box<dyn PendingQuery>, ResolveError> {
        let service = fqdn(service);
        let events = self.daemon.browse(&service).map_err(backend)?;
        debug!("browsing {service}");
        Ok(Box::new(BrowseQuery {
            daemon: self.daemon.clone(),
            service,
            events,
            queued: VecDeque::new(),
            active: true,
        }))
    }

    fn resolve_host(&self, hostname: &str) -> Result<Box<dyn PendingQuery>, ResolveError> {
        let hostname = fqdn(hostname);
        if !hostname.ends_with(".local.") {
            return Err(ResolveError::InvalidName(hostname));
        }
        let events = self
            .daemon
            .resolve_hostname(&hostname, None)
            .map_err(backend)?;
        Ok(Box::new(HostQuery {
            daemon: self.daemon.clone(),
            hostname,
            events,
            queued: VecDeque::new(),
            active: true,
        }))
    }
}

impl NameResolver for MdnsResolver {
    fn resolve(&self, hostname: &str, timeout: Duration) -> Result<Option<Ipv4Addr>, ResolveError> {
        let mut query = self.resolve_host(hostname)?;
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                query.cancel();
                return Ok(None);
            }
            match query.next_record(remaining)? {
                Some(DiscoveryRecord::Ipv4(ip)) => {
                    query.cancel();
                    return Ok(Some(ip));
                }
                Some(_) => {}
                None => {
                    query.cancel();
                    return Ok(None);
                }
            }
        }
    }
}

impl ServiceAdvertiser for MdnsResolver {
    fn advertise(&self, instance: &str, port: u16) -> Result<(), ResolveError> {
        let properties: Vec<(String, String)> = CAPABILITY_TXT
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        let service = ServiceInfo::new(
            &fqdn(&service_name()),
            instance,
            &format!("{instance}.local."),
            "",
            port,
            &properties[..],
        )
        .map_err(backend)?
        .enable_addr_auto();

        let fullname = service.get_fullname().to_string();
        self.daemon.register(service).map_err(backend)?;
        info!("mDNS: registered {fullname}");
        *lock(&self.registered) = Some(fullname);
        Ok(())
    }
}

/// Phase-1 query over a browse channel.
struct BrowseQuery {
    daemon: ServiceDaemon,
    service: String,
    events: Receiver<ServiceEvent>,
    queued: VecDeque<DiscoveryRecord>,
    active: bool,
}

impl BrowseQuery {
    fn queue_resolved(&mut self, info: &ServiceInfo) {
        self.queued.push_back(DiscoveryRecord::Service {
            host: info.get_hostname().trim_end_matches('.').to_string(),
            port: info.get_port(),
        });
        for property in info.get_properties().iter() {
            self.queued.push_back(DiscoveryRecord::Text(format!(
                "{}={}",
                property.key(),
                property.val_str()
            )));
        }
        self.queued.push_back(DiscoveryRecord::Instance(
            info.get_fullname().trim_end_matches('.').to_string(),
        ));
    }
}

impl PendingQuery for BrowseQuery {
    fn next_record(&mut self, timeout: Duration) -> Result<Option<DiscoveryRecord>, ResolveError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(record) = self.queued.pop_front() {
                return Ok(Some(record));
            }
            if !self.active {
                return Ok(None);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            match self.events.recv_timeout(remaining) {
                Ok(ServiceEvent::ServiceResolved(info)) => self.queue_resolved(&info),
                Ok(ServiceEvent::SearchStopped(_)) => {
                    self.active = false;
                    return Ok(Some(DiscoveryRecord::Finished(Ok(()))));
                }
                Ok(other) => debug!("mDNS browse: {other:?}"),
                Err(_) => return Ok(None),
            }
        }
    }

    fn cancel(&mut self) {
        if !std::mem::take(&mut self.active) {
            return;
        }
        if let Err(e) = self.daemon.stop_browse(&self.service) {
            debug!("stop_browse {}: {e}", self.service);
        }
    }
}

/// Phase-2 query over a host-name resolution channel.
struct HostQuery {
    daemon: ServiceDaemon,
    hostname: String,
    events: Receiver<HostnameResolutionEvent>,
    queued: VecDeque<DiscoveryRecord>,
    active: bool,
}

impl PendingQuery for HostQuery {
    fn next_record(&mut self, timeout: Duration) -> Result<Option<DiscoveryRecord>, ResolveError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(record) = self.queued.pop_front() {
                return Ok(Some(record));
            }
            if !self.active {
                return Ok(None);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            match self.events.recv_timeout(remaining) {
                Ok(HostnameResolutionEvent::AddressesFound(_, addrs)) => {
                    self.queued.extend(addrs.into_iter().filter_map(|addr| match addr {
                        IpAddr::V4(ip) => Some(DiscoveryRecord::Ipv4(ip)),
                        IpAddr::V6(_) => None,
                    }));
                }
                Ok(other) => debug!("mDNS host query: {other:?}"),
                Err(_) => return Ok(None),
            }
        }
    }

    fn cancel(&mut self) {
        if !std::mem::take(&mut self.active) {
            return;
        }
        if let Err(e) = self.daemon.stop_resolve_hostname(&self.hostname) {
            debug!("stop_resolve_hostname {}: {e}", self.hostname);
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
