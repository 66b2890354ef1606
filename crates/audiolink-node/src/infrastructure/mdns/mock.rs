//! Scripted resolvers for discovery tests.
//!
//! Each `browse` / `resolve_host` call consumes the next queued script. A
//! query replays its records in order and then reports "nothing yet" forever,
//! which the discovery phases see as a timeout. Calls without a queued script
//! get an empty query.

use std::collections::VecDeque;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use audiolink_core::protocol::dns_sd::DiscoveryRecord;

use crate::application::discovery::{
    NameResolver, PendingQuery, ResolveError, ServiceAdvertiser, ServiceResolver,
};
use crate::application::lock;

/// A [`ServiceResolver`] that replays queued record scripts.
#[derive(Default)]
pub struct ScriptedResolver {
    browse_scripts: Mutex<VecDeque<Vec<DiscoveryRecord>>>,
    host_scripts: Mutex<VecDeque<Vec<DiscoveryRecord>>>,
    host_queries: Mutex<Vec<String>>,
    browses: AtomicUsize,
    cancelled: Arc<AtomicUsize>,
}

impl ScriptedResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the records for the next browse.
    pub fn push_browse(&self, records: Vec<DiscoveryRecord>) {
        lock(&self.browse_scripts).push_back(records);
    }

    /// Queues the records for the next host query.
    pub fn push_host(&self, records: Vec<DiscoveryRecord>) {
        lock(&self.host_scripts).push_back(records);
    }

    /// Number of browse calls so far.
    pub fn browses(&self) -> usize {
        self.browses.load(Ordering::SeqCst)
    }

    /// Host names passed to `resolve_host`, in order.
    pub fn host_queries(&self) -> Vec<String> {
        lock(&self.host_queries).clone()
    }

    /// Queries cancelled so far. Each query counts once.
    pub fn cancelled(&self) -> usize {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn query(&self, records: Option<Vec<DiscoveryRecord>>) -> Box<dyn PendingQuery> {
        Box::new(ScriptedQuery {
            records: records.unwrap_or_default().into(),
            cancelled: Arc::clone(&self.cancelled),
            active: true,
        })
    }
}

impl ServiceResolver for ScriptedResolver {
    fn browse(&self, _service: &str) -> Result<Box<dyn PendingQuery>, ResolveError> {
        self.browses.fetch_add(1, Ordering::SeqCst);
        let script = lock(&self.browse_scripts).pop_front();
        Ok(self.query(script))
    }

    fn resolve_host(&self, hostname: &str) -> Result<Box<dyn PendingQuery>, ResolveError> {
        lock(&self.host_queries).push(hostname.to_string());
        let script = lock(&self.host_scripts).pop_front();
        Ok(self.query(script))
    }
}

struct ScriptedQuery {
    records: VecDeque<DiscoveryRecord>,
    cancelled: Arc<AtomicUsize>,
    active: bool,
}

impl PendingQuery for ScriptedQuery {
    fn next_record(&mut self, _timeout: Duration) -> Result<Option<DiscoveryRecord>, ResolveError> {
        if !self.active {
            return Ok(None);
        }
        Ok(self.records.pop_front())
    }

    fn cancel(&mut self) {
        if std::mem::take(&mut self.active) {
            self.cancelled.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// A [`NameResolver`] with a fixed answer.
pub struct ScriptedNameResolver {
    answer: Option<Ipv4Addr>,
    calls: AtomicUsize,
}

impl ScriptedNameResolver {
    pub fn answering(answer: Option<Ipv4Addr>) -> Self {
        Self {
            answer,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl NameResolver for ScriptedNameResolver {
    fn resolve(&self, _hostname: &str, _timeout: Duration) -> Result<Option<Ipv4Addr>, ResolveError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.answer)
    }
}

/// A [`ServiceAdvertiser`] that records what was advertised.
#[derive(Default)]
pub struct RecordingAdvertiser {
    advertised: Mutex<Vec<(String, u16)>>,
    pub should_fail: bool,
}

impl RecordingAdvertiser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advertised(&self) -> Vec<(String, u16)> {
        lock(&self.advertised).clone()
    }
}

impl ServiceAdvertiser for RecordingAdvertiser {
    fn advertise(&self, instance: &str, port: u16) -> Result<(), ResolveError> {
        if self.should_fail {
            return Err(ResolveError::Backend("mock failure".into()));
        }
        lock(&self.advertised).push((instance.to_string(), port));
        Ok(())
    }
}
