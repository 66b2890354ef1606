//! TOML configuration for the node.
//!
//! Read from `--config <path>` when given, otherwise from the platform config
//! directory:
//! - Windows:  `%APPDATA%\AudioLink\config.toml`
//! - Linux:    `~/.config/audiolink/config.toml`
//! - macOS:    `~/Library/Application Support/AudioLink/config.toml`
//!
//! A missing file yields the defaults. Every field is optional:
//!
//! ```toml
//! [node]
//! role = "client"
//! discovery = "service"
//!
//! [network]
//! target = "192.168.1.1:60010"
//!
//! [link]
//! station_ssid = "AudioGateway"
//!
//! [timings]
//! bootstrap_wait_ms = 30000
//! ```
//!
//! Role, discovery method and transport are fixed for the life of the
//! process. [`NodeConfig::validate`] turns the text fields into typed values
//! and rejects anything the node cannot run with.

use std::net::{Ipv4Addr, SocketAddrV4};
use std::path::{Path, PathBuf};
use std::time::Duration;

use audiolink_core::constants::{
    BIND_RETRY_DELAY, DHCP_POOL_START, DISCOVERY_ATTEMPTS, DISCOVERY_POLL_BUDGET,
    DISCOVERY_POLL_TIMEOUT, DISCOVERY_QUERY_TIMEOUT, DISCOVERY_RETRY_DELAY, GATEWAY_ADDR,
    GATEWAY_SSID, PEER_SETTLE_DELAY, RECONNECT_DELAY, RECV_POLL_TIMEOUT, RESTART_GRACE,
    TRANSPORT_PORT,
};
use audiolink_core::protocol::command::parse_target;
use audiolink_core::Role;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::bootstrap::{BootstrapConfig, HostSettings};
use crate::application::discovery::DiscoveryMethod;
use crate::application::dispatcher::GatewaySettings;
use crate::application::Timings;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A value parsed but cannot be used.
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level node configuration stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NodeConfig {
    #[serde(default)]
    pub node: NodeSection,
    #[serde(default)]
    pub network: NetworkSection,
    #[serde(default)]
    pub link: LinkSection,
    #[serde(default)]
    pub timings: TimingsSection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeSection {
    /// `"host"` or `"client"`.
    #[serde(default = "default_role")]
    pub role: String,
    /// `"service"`, `"name"` or `"none"`.
    #[serde(default = "default_discovery")]
    pub discovery: String,
    /// Only `"datagram"` is supported.
    #[serde(default = "default_transport")]
    pub transport: String,
    /// `tracing` level used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Instance name the host advertises.
    #[serde(default = "default_hostname")]
    pub hostname: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkSection {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Pre-configured target as `"IP:Port"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// Host name looked up by the `"name"` discovery method.
    #[serde(default = "default_gateway_name")]
    pub gateway_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LinkSection {
    #[serde(default = "default_host_ssid")]
    pub host_ssid: String,
    #[serde(default = "default_host_passphrase")]
    pub host_passphrase: String,
    #[serde(default = "default_regulatory_domain")]
    pub regulatory_domain: String,
    #[serde(default = "default_channel")]
    pub channel: u8,
    #[serde(default = "default_gateway_ssid")]
    pub gateway_ssid: String,
    /// SSID of the network the OS joined in client role. Reported as the
    /// link's SSID so joining the gateway's network can be recognised.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub station_ssid: Option<String>,
    #[serde(default = "default_gateway_address")]
    pub gateway_address: Ipv4Addr,
    #[serde(default = "default_pool_start")]
    pub dhcp_pool_start: Ipv4Addr,
}

/// Delay overrides in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimingsSection {
    #[serde(default = "default_peer_settle_ms")]
    pub peer_settle_ms: u64,
    #[serde(default = "default_restart_grace_ms")]
    pub restart_grace_ms: u64,
    #[serde(default = "default_bind_retry_ms")]
    pub bind_retry_ms: u64,
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    #[serde(default = "default_recv_poll_ms")]
    pub recv_poll_ms: u64,
    #[serde(default = "default_discovery_query_ms")]
    pub discovery_query_ms: u64,
    #[serde(default = "default_discovery_poll_ms")]
    pub discovery_poll_ms: u64,
    #[serde(default = "default_discovery_poll_budget")]
    pub discovery_poll_budget: u32,
    #[serde(default = "default_discovery_attempts")]
    pub discovery_attempts: u32,
    #[serde(default = "default_discovery_retry_delay_ms")]
    pub discovery_retry_delay_ms: u64,
    /// Bound on each bootstrap wait. Absent means wait forever.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bootstrap_wait_ms: Option<u64>,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_role() -> String {
    "client".to_string()
}
fn default_discovery() -> String {
    "service".to_string()
}
fn default_transport() -> String {
    "datagram".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_hostname() -> String {
    "audiogateway".to_string()
}
fn default_port() -> u16 {
    TRANSPORT_PORT
}
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_gateway_name() -> String {
    "audiogateway.local".to_string()
}
fn default_host_ssid() -> String {
    "AudioLink".to_string()
}
fn default_host_passphrase() -> String {
    "audiolink".to_string()
}
fn default_regulatory_domain() -> String {
    "US".to_string()
}
fn default_channel() -> u8 {
    1
}
fn default_gateway_ssid() -> String {
    GATEWAY_SSID.to_string()
}
fn default_gateway_address() -> Ipv4Addr {
    GATEWAY_ADDR
}
fn default_pool_start() -> Ipv4Addr {
    DHCP_POOL_START
}
fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
fn default_peer_settle_ms() -> u64 {
    millis(PEER_SETTLE_DELAY)
}
fn default_restart_grace_ms() -> u64 {
    millis(RESTART_GRACE)
}
fn default_bind_retry_ms() -> u64 {
    millis(BIND_RETRY_DELAY)
}
fn default_reconnect_delay_ms() -> u64 {
    millis(RECONNECT_DELAY)
}
fn default_recv_poll_ms() -> u64 {
    millis(RECV_POLL_TIMEOUT)
}
fn default_discovery_query_ms() -> u64 {
    millis(DISCOVERY_QUERY_TIMEOUT)
}
fn default_discovery_poll_ms() -> u64 {
    millis(DISCOVERY_POLL_TIMEOUT)
}
fn default_discovery_poll_budget() -> u32 {
    DISCOVERY_POLL_BUDGET
}
fn default_discovery_attempts() -> u32 {
    DISCOVERY_ATTEMPTS
}
fn default_discovery_retry_delay_ms() -> u64 {
    millis(DISCOVERY_RETRY_DELAY)
}

impl Default for NodeSection {
    fn default() -> Self {
        Self {
            role: default_role(),
            discovery: default_discovery(),
            transport: default_transport(),
            log_level: default_log_level(),
            hostname: default_hostname(),
        }
    }
}

impl Default for NetworkSection {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind_address: default_bind_address(),
            target: None,
            gateway_name: default_gateway_name(),
        }
    }
}

impl Default for LinkSection {
    fn default() -> Self {
        Self {
            host_ssid: default_host_ssid(),
            host_passphrase: default_host_passphrase(),
            regulatory_domain: default_regulatory_domain(),
            channel: default_channel(),
            gateway_ssid: default_gateway_ssid(),
            station_ssid: None,
            gateway_address: default_gateway_address(),
            dhcp_pool_start: default_pool_start(),
        }
    }
}

impl Default for TimingsSection {
    fn default() -> Self {
        Self {
            peer_settle_ms: default_peer_settle_ms(),
            restart_grace_ms: default_restart_grace_ms(),
            bind_retry_ms: default_bind_retry_ms(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            recv_poll_ms: default_recv_poll_ms(),
            discovery_query_ms: default_discovery_query_ms(),
            discovery_poll_ms: default_discovery_poll_ms(),
            discovery_poll_budget: default_discovery_poll_budget(),
            discovery_attempts: default_discovery_attempts(),
            discovery_retry_delay_ms: default_discovery_retry_delay_ms(),
            bootstrap_wait_ms: None,
        }
    }
}

// ── Typed views ───────────────────────────────────────────────────────────────

impl NodeConfig {
    /// Checks every field that has to parse into something stricter than a
    /// string.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.role()?;
        self.discovery_method()?;
        self.bind_addr()?;
        self.target()?;
        if !self.node.transport.eq_ignore_ascii_case("datagram") {
            return Err(ConfigError::Invalid {
                field: "node.transport",
                reason: format!("{:?} is not supported, only \"datagram\"", self.node.transport),
            });
        }
        if self.network.port == 0 {
            return Err(ConfigError::Invalid {
                field: "network.port",
                reason: "must be between 1 and 65535".to_string(),
            });
        }
        if self.timings.discovery_attempts == 0 || self.timings.discovery_poll_budget == 0 {
            return Err(ConfigError::Invalid {
                field: "timings",
                reason: "discovery attempts and poll budget must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    pub fn role(&self) -> Result<Role, ConfigError> {
        self.node.role.parse::<Role>().map_err(|reason| ConfigError::Invalid {
            field: "node.role",
            reason,
        })
    }

    pub fn discovery_method(&self) -> Result<DiscoveryMethod, ConfigError> {
        self.node
            .discovery
            .parse::<DiscoveryMethod>()
            .map_err(|reason| ConfigError::Invalid {
                field: "node.discovery",
                reason,
            })
    }

    /// Local endpoint the transport binds.
    pub fn bind_addr(&self) -> Result<SocketAddrV4, ConfigError> {
        let ip: Ipv4Addr = self
            .network
            .bind_address
            .parse()
            .map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
                field: "network.bind_address",
                reason: e.to_string(),
            })?;
        Ok(SocketAddrV4::new(ip, self.network.port))
    }

    /// The pre-configured target, if one is set.
    pub fn target(&self) -> Result<Option<SocketAddrV4>, ConfigError> {
        self.network
            .target
            .as_deref()
            .map(|text| {
                parse_target(text).map_err(|e| ConfigError::Invalid {
                    field: "network.target",
                    reason: e.to_string(),
                })
            })
            .transpose()
    }

    pub fn timings(&self) -> Timings {
        let t = &self.timings;
        Timings {
            peer_settle: Duration::from_millis(t.peer_settle_ms),
            restart_grace: Duration::from_millis(t.restart_grace_ms),
            bind_retry: Duration::from_millis(t.bind_retry_ms),
            reconnect_delay: Duration::from_millis(t.reconnect_delay_ms),
            recv_poll: Duration::from_millis(t.recv_poll_ms),
            discovery_query: Duration::from_millis(t.discovery_query_ms),
            discovery_poll: Duration::from_millis(t.discovery_poll_ms),
            discovery_poll_budget: t.discovery_poll_budget,
            discovery_attempts: t.discovery_attempts,
            discovery_retry_delay: Duration::from_millis(t.discovery_retry_delay_ms),
            bootstrap_wait: t.bootstrap_wait_ms.map(Duration::from_millis),
        }
    }

    pub fn gateway(&self) -> GatewaySettings {
        GatewaySettings {
            ssid: self.link.gateway_ssid.clone(),
            address: self.link.gateway_address,
        }
    }

    /// Startup inputs for [`Bootstrap`](crate::application::bootstrap::Bootstrap).
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] if the configured target does not parse.
    pub fn bootstrap(&self) -> Result<BootstrapConfig, ConfigError> {
        Ok(BootstrapConfig {
            host: HostSettings {
                ssid: self.link.host_ssid.clone(),
                passphrase: self.link.host_passphrase.clone(),
                regulatory_domain: self.link.regulatory_domain.clone(),
                channel: self.link.channel,
                pool_start: self.link.dhcp_pool_start,
            },
            preconfigured_target: self.target()?,
            port: self.network.port,
            hostname: self.node.hostname.clone(),
        })
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Determines the platform-appropriate directory for the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the platform config base
/// directory cannot be determined from the environment.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads the configuration from `path`, or from the platform location when
/// `path` is `None`. A missing file yields [`NodeConfig::default`].
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(path: Option<&Path>) -> Result<NodeConfig, ConfigError> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => config_file_path()?,
    };

    match std::fs::read_to_string(&path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(NodeConfig::default()),
        Err(e) => Err(ConfigError::Io { path, source: e }),
    }
}

/// Writes `config` to `path`, or to the platform location when `path` is
/// `None`, creating the directory if needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config(config: &NodeConfig, path: Option<&Path>) -> Result<(), ConfigError> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => config_file_path()?,
    };

    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(&path, content).map_err(|source| ConfigError::Io {
        path: path.clone(),
        source,
    })
}

fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("AudioLink"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("audiolink"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("AudioLink")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
