//! Scripted link for tests.
//!
//! [`ScriptedLink`] records every [`LinkControl`] call. A call can be given a
//! reaction (events pushed onto the channel handed to [`ScriptedLink::connect`],
//! the way a radio driver reports outcomes) or made to fail.
//!
//! ```ignore
//! let link = Arc::new(ScriptedLink::new());
//! link.connect(tx);
//! link.on(LinkOp::BringUpAll, vec![NetworkEvent::AddressBound(ip)]);
//! link.fail(LinkOp::AutoConnect);
//! ```

use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;
use std::sync::mpsc::Sender;
use std::sync::Mutex;

use audiolink_core::NetworkEvent;

use crate::application::lock;
use crate::application::ports::{HostParams, LinkControl, LinkError, LinkStatus};

/// A [`LinkControl`] operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkOp {
    SetRegulatoryDomain,
    StartDhcpServer,
    EnableHost,
    AutoConnect,
    BringUpAll,
    Status,
}

impl LinkOp {
    fn name(self) -> &'static str {
        match self {
            LinkOp::SetRegulatoryDomain => "set_regulatory_domain",
            LinkOp::StartDhcpServer => "start_dhcp_server",
            LinkOp::EnableHost => "enable_host",
            LinkOp::AutoConnect => "auto_connect",
            LinkOp::BringUpAll => "bring_up_all",
            LinkOp::Status => "status",
        }
    }
}

/// One recorded call with its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkCall {
    SetRegulatoryDomain(String),
    StartDhcpServer(Ipv4Addr),
    EnableHost(HostParams),
    AutoConnect,
    BringUpAll,
    Status,
}

/// A recording [`LinkControl`] with per-operation reactions.
#[derive(Default)]
pub struct ScriptedLink {
    calls: Mutex<Vec<LinkCall>>,
    reactions: Mutex<HashMap<LinkOp, Vec<NetworkEvent>>>,
    failing: Mutex<HashSet<LinkOp>>,
    events: Mutex<Option<Sender<NetworkEvent>>>,
    status: Mutex<LinkStatus>,
}

impl ScriptedLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the channel reactions are delivered on.
    pub fn connect(&self, events: Sender<NetworkEvent>) {
        *lock(&self.events) = Some(events);
    }

    /// Emits `events` whenever `op` succeeds.
    pub fn on(&self, op: LinkOp, events: Vec<NetworkEvent>) {
        lock(&self.reactions).insert(op, events);
    }

    /// Makes `op` fail with code `-1`.
    pub fn fail(&self, op: LinkOp) {
        lock(&self.failing).insert(op);
    }

    /// Sets the status `status()` reports.
    pub fn set_status(&self, status: LinkStatus) {
        *lock(&self.status) = status;
    }

    /// Pushes one event as if the driver reported it unprompted.
    pub fn emit(&self, event: NetworkEvent) {
        if let Some(tx) = lock(&self.events).as_ref() {
            let _ = tx.send(event);
        }
    }

    /// Every call so far, in order.
    pub fn calls(&self) -> Vec<LinkCall> {
        lock(&self.calls).clone()
    }

    fn record(&self, op: LinkOp, call: LinkCall) -> Result<(), LinkError> {
        lock(&self.calls).push(call);
        if lock(&self.failing).contains(&op) {
            return Err(LinkError::Rejected {
                operation: op.name(),
                code: -1,
            });
        }
        let reaction = lock(&self.reactions).get(&op).cloned().unwrap_or_default();
        for event in reaction {
            self.emit(event);
        }
        Ok(())
    }
}

impl LinkControl for ScriptedLink {
    fn set_regulatory_domain(&self, country: &str) -> Result<(), LinkError> {
        self.record(
            LinkOp::SetRegulatoryDomain,
            LinkCall::SetRegulatoryDomain(country.to_string()),
        )
    }

    fn start_dhcp_server(&self, pool_start: Ipv4Addr) -> Result<(), LinkError> {
        self.record(LinkOp::StartDhcpServer, LinkCall::StartDhcpServer(pool_start))
    }

    fn enable_host(&self, params: &HostParams) -> Result<(), LinkError> {
        self.record(LinkOp::EnableHost, LinkCall::EnableHost(params.clone()))
    }

    fn auto_connect(&self) -> Result<(), LinkError> {
        self.record(LinkOp::AutoConnect, LinkCall::AutoConnect)
    }

    fn bring_up_all(&self) -> Result<(), LinkError> {
        self.record(LinkOp::BringUpAll, LinkCall::BringUpAll)
    }

    fn status(&self) -> Result<LinkStatus, LinkError> {
        self.record(LinkOp::Status, LinkCall::Status)?;
        Ok(lock(&self.status).clone())
    }
}
