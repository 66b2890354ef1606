//! Host-role peer table.
//!
//! Tracks up to [`MAX_PEERS`] stations associated with the hosted network.
//! Slots are claimed on association and freed on disassociation by MAC.
//!
//! Peer addresses are not read from the DHCP server's lease table. After a
//! settle delay the registry assumes the server handed out addresses
//! sequentially from the pool start, and assigns `pool_start + n` where `n`
//! is the number of peers that already have an address.
//!
//! [`MAX_PEERS`]: crate::constants::MAX_PEERS

use std::net::Ipv4Addr;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::event::MacAddr;
use super::lock;
use super::signal::Signal;
use crate::constants::MAX_PEERS;

/// One slot of the peer table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PeerEntry {
    pub mac: MacAddr,
    pub address: Option<Ipv4Addr>,
    pub occupied: bool,
}

/// Result of [`PeerRegistry::on_disassociated`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisassociateOutcome {
    /// No occupied slot carried this MAC.
    Unknown,
    /// The slot was freed.
    Removed {
        address: Option<Ipv4Addr>,
        /// Occupied slots left after removal.
        remaining: usize,
    },
}

impl DisassociateOutcome {
    /// `true` when this removal emptied the table.
    pub fn emptied_table(&self) -> bool {
        matches!(self, DisassociateOutcome::Removed { remaining: 0, .. })
    }
}

/// Fixed-capacity table of associated peers.
#[derive(Debug)]
pub struct PeerRegistry {
    pool_start: Ipv4Addr,
    slots: Mutex<[PeerEntry; MAX_PEERS]>,
    peer_present: Signal,
}

impl PeerRegistry {
    /// Creates an empty table whose address heuristic starts at `pool_start`.
    pub fn new(pool_start: Ipv4Addr) -> Self {
        Self {
            pool_start,
            slots: Mutex::new([PeerEntry::default(); MAX_PEERS]),
            peer_present: Signal::new("peer-present"),
        }
    }

    /// Gate raised whenever a peer associates.
    pub fn peer_present(&self) -> &Signal {
        &self.peer_present
    }

    /// Handles a station association.
    ///
    /// Claims the first free slot, sleeps `settle` on the calling thread so
    /// the DHCP server can lease an address, assigns the heuristic address,
    /// and raises the peer-present gate. The gate is raised even when the
    /// table was full. Returns the slot index, if one was claimed.
    pub fn on_associated(&self, mac: MacAddr, settle: Duration) -> Option<usize> {
        let slot = self.claim_slot(mac);
        if slot.is_none() {
            warn!("peer table full, not tracking {mac}");
        }

        thread::sleep(settle);

        if let Some(index) = slot {
            match self.assign_address(index, mac) {
                Some(ip) => info!("station {mac} assigned IP: {ip}"),
                None => warn!("could not determine IP address for station {mac}"),
            }
        }

        self.peer_present.give();
        info!("new device connected with AP");
        slot
    }

    /// Claims the first free slot for `mac` without any delay.
    pub fn claim_slot(&self, mac: MacAddr) -> Option<usize> {
        let mut slots = lock(&self.slots);
        let (index, entry) = slots.iter_mut().enumerate().find(|(_, e)| !e.occupied)?;
        *entry = PeerEntry {
            mac,
            address: None,
            occupied: true,
        };
        debug!("peer {mac} placed in slot {index}");
        Some(index)
    }

    /// Assigns the next sequential pool address to slot `index`.
    ///
    /// Returns `None` if the slot no longer holds `mac` (the peer left during
    /// the settle delay).
    pub fn assign_address(&self, index: usize, mac: MacAddr) -> Option<Ipv4Addr> {
        let mut slots = lock(&self.slots);
        let already_assigned = slots
            .iter()
            .filter(|e| e.occupied && e.address.is_some())
            .count() as u32;

        let entry = slots.get_mut(index)?;
        if !entry.occupied || entry.mac != mac {
            return None;
        }
        let ip = Ipv4Addr::from(u32::from(self.pool_start).wrapping_add(already_assigned));
        entry.address = Some(ip);
        Some(ip)
    }

    /// Frees the slot holding `mac`. Unknown MACs are a no-op.
    pub fn on_disassociated(&self, mac: MacAddr) -> DisassociateOutcome {
        let mut slots = lock(&self.slots);
        let Some(entry) = slots.iter_mut().find(|e| e.occupied && e.mac == mac) else {
            return DisassociateOutcome::Unknown;
        };
        let address = entry.address;
        *entry = PeerEntry::default();
        let remaining = slots.iter().filter(|e| e.occupied).count();
        DisassociateOutcome::Removed { address, remaining }
    }

    /// Number of occupied slots.
    pub fn occupied(&self) -> usize {
        lock(&self.slots).iter().filter(|e| e.occupied).count()
    }

    pub fn is_empty(&self) -> bool {
        self.occupied() == 0
    }

    /// Snapshot of the occupied entries.
    pub fn entries(&self) -> Vec<PeerEntry> {
        lock(&self.slots).iter().filter(|e| e.occupied).copied().collect()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
