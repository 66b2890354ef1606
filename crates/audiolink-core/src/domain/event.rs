//! Network stack events and the role the device plays.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// Which side of the link this device is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Hosts the wireless network and waits for a peer to associate.
    Host,
    /// Joins an existing network and locates the host.
    Client,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Host => "host",
            Role::Client => "client",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "host" => Ok(Role::Host),
            "client" => Ok(Role::Client),
            other => Err(format!("unknown role {other:?}, expected \"host\" or \"client\"")),
        }
    }
}

/// A 6-byte hardware address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MacAddr(pub [u8; 6]);

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            m[0], m[1], m[2], m[3], m[4], m[5]
        )
    }
}

impl FromStr for MacAddr {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 6];
        let mut parts = s.split(':');
        for byte in bytes.iter_mut() {
            let part = parts.next().ok_or_else(|| format!("too few octets in {s:?}"))?;
            *byte = u8::from_str_radix(part, 16).map_err(|e| format!("bad octet {part:?}: {e}"))?;
        }
        if parts.next().is_some() {
            return Err(format!("too many octets in {s:?}"));
        }
        Ok(MacAddr(bytes))
    }
}

/// An event produced by the network stack.
///
/// Status codes are the raw values reported by the radio driver; `0` means
/// success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkEvent {
    LinkUp,
    LinkDown,
    AssocResult(i32),
    DisassocResult(i32),
    SupplicantReady,
    SupplicantNotReady,
    AddressBound(Ipv4Addr),
    HostEnableResult(i32),
    PeerAssociated(MacAddr),
    PeerDisassociated(MacAddr),
}

/// Payload-free tag of a [`NetworkEvent`], used to key handler tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    LinkUp,
    LinkDown,
    AssocResult,
    DisassocResult,
    SupplicantReady,
    SupplicantNotReady,
    AddressBound,
    HostEnableResult,
    PeerAssociated,
    PeerDisassociated,
}

impl EventKind {
    /// Every tag, in declaration order.
    pub const ALL: [EventKind; 10] = [
        EventKind::LinkUp,
        EventKind::LinkDown,
        EventKind::AssocResult,
        EventKind::DisassocResult,
        EventKind::SupplicantReady,
        EventKind::SupplicantNotReady,
        EventKind::AddressBound,
        EventKind::HostEnableResult,
        EventKind::PeerAssociated,
        EventKind::PeerDisassociated,
    ];

    /// Tags that only exist while hosting a network.
    pub fn is_host_only(self) -> bool {
        matches!(
            self,
            EventKind::HostEnableResult | EventKind::PeerAssociated | EventKind::PeerDisassociated
        )
    }
}

impl NetworkEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            NetworkEvent::LinkUp => EventKind::LinkUp,
            NetworkEvent::LinkDown => EventKind::LinkDown,
            NetworkEvent::AssocResult(_) => EventKind::AssocResult,
            NetworkEvent::DisassocResult(_) => EventKind::DisassocResult,
            NetworkEvent::SupplicantReady => EventKind::SupplicantReady,
            NetworkEvent::SupplicantNotReady => EventKind::SupplicantNotReady,
            NetworkEvent::AddressBound(_) => EventKind::AddressBound,
            NetworkEvent::HostEnableResult(_) => EventKind::HostEnableResult,
            NetworkEvent::PeerAssociated(_) => EventKind::PeerAssociated,
            NetworkEvent::PeerDisassociated(_) => EventKind::PeerDisassociated,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
