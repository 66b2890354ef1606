//! DNS-SD naming for the audio service.
//!
//! The host advertises `<instance>._audiolink._udp.local` with a short static
//! capability TXT record. A client looks the service up in two steps: browse
//! the service type to learn an instance name, then resolve
//! `<first label of instance>.local` to an IPv4 address.

use std::net::Ipv4Addr;

/// Service type label.
pub const SERVICE_TYPE: &str = "_audiolink";
/// Transport protocol label.
pub const SERVICE_PROTO: &str = "_udp";
/// Service domain.
pub const SERVICE_DOMAIN: &str = "local";

/// Capability TXT entries advertised alongside the service.
pub const CAPABILITY_TXT: [(&str, &str); 4] = [
    ("codec", "opus"),
    ("rate", "320kbps"),
    ("channels", "2"),
    ("latency", "low"),
];

/// `_audiolink._udp.local`
pub fn service_name() -> String {
    format!("{SERVICE_TYPE}.{SERVICE_PROTO}.{SERVICE_DOMAIN}")
}

/// Derives the host name to resolve from a discovered instance name.
///
/// Takes everything before the first `.` and appends the service domain:
/// `audiogateway._audiolink._udp.local` becomes `audiogateway.local`.
pub fn hostname_from_instance(instance: &str) -> String {
    let label = instance.split('.').next().unwrap_or(instance);
    format!("{label}.{SERVICE_DOMAIN}")
}

/// A record delivered by a resolver while a query is in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryRecord {
    /// Browse result: a service instance name.
    Instance(String),
    /// SRV data: target host and port of the instance.
    Service { host: String, port: u16 },
    /// One TXT string.
    Text(String),
    /// A record for the queried host.
    Ipv4(Ipv4Addr),
    /// The resolver finished the query. `Err` carries its status code.
    Finished(Result<(), i32>),
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_name_joins_labels() {
        assert_eq!(service_name(), "_audiolink._udp.local");
    }

    #[test]
    fn test_hostname_from_full_instance_name() {
        assert_eq!(
            hostname_from_instance("audiogateway._audiolink._udp.local"),
            "audiogateway.local"
        );
    }

    #[test]
    fn test_hostname_from_bare_instance_name() {
        assert_eq!(hostname_from_instance("headset"), "headset.local");
    }

    #[test]
    fn test_capability_txt_has_codec_first() {
        assert_eq!(CAPABILITY_TXT[0], ("codec", "opus"));
    }
}
