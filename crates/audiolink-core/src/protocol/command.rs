//! Administrative command parser.
//!
//! The console accepts one line per command. The `socket` prefix is optional,
//! so both of these are the same command:
//!
//! ```text
//! socket set_target_addr 192.168.1.1:60010
//! set_target_addr 192.168.1.1:60010
//! ```
//!
//! Parsing is purely syntactic. Whether the command may run (the network must
//! be address-bound) is decided by the node when it executes the command.

use std::net::{Ipv4Addr, SocketAddrV4};

use thiserror::Error;

/// Usage line printed for a malformed `set_target_addr`.
pub const SET_TARGET_USAGE: &str = "Usage: socket set_target_addr <IP:Port>";

/// A parsed administrative command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCommand {
    /// Manually override the transport target.
    SetTargetAddr(SocketAddrV4),
    /// Print the session readiness pipeline.
    Status,
    /// List the available commands.
    Help,
}

/// Errors from [`parse_command`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("empty command")]
    Empty,
    #[error("unknown command: {0}")]
    Unknown(String),
    #[error("usage: socket set_target_addr <IP:Port>")]
    Usage,
    #[error("invalid format {0:?}, expected <IP>:<Port>")]
    InvalidFormat(String),
    #[error("invalid IP address format: {0}")]
    InvalidAddress(String),
    #[error("invalid port: {0}")]
    InvalidPort(String),
    #[error("network is not connected or no IP address has been assigned")]
    NotConnected,
}

/// Parses one console line.
///
/// # Errors
///
/// Returns a [`CommandError`] describing the first problem found. Parsing
/// never has side effects.
pub fn parse_command(line: &str) -> Result<AdminCommand, CommandError> {
    let mut words = line.split_whitespace().peekable();
    if words.peek() == Some(&"socket") {
        words.next();
    }

    let Some(name) = words.next() else {
        return Err(CommandError::Empty);
    };
    let args: Vec<&str> = words.collect();

    match name {
        "set_target_addr" => match args.as_slice() {
            [addr] => parse_target(addr).map(AdminCommand::SetTargetAddr),
            _ => Err(CommandError::Usage),
        },
        "status" => Ok(AdminCommand::Status),
        "help" => Ok(AdminCommand::Help),
        other => Err(CommandError::Unknown(other.to_string())),
    }
}

/// Parses `<IP>:<Port>` into an IPv4 endpoint.
///
/// # Errors
///
/// [`CommandError::InvalidFormat`] without a single `:` separator,
/// [`CommandError::InvalidAddress`] for a non-IPv4 host part,
/// [`CommandError::InvalidPort`] for a port outside `1..=65535`.
pub fn parse_target(text: &str) -> Result<SocketAddrV4, CommandError> {
    let (ip, port) = text
        .split_once(':')
        .ok_or_else(|| CommandError::InvalidFormat(text.to_string()))?;
    if ip.is_empty() || port.is_empty() || port.contains(':') {
        return Err(CommandError::InvalidFormat(text.to_string()));
    }

    let ip: Ipv4Addr = ip
        .parse()
        .map_err(|_| CommandError::InvalidAddress(ip.to_string()))?;
    let port: u16 = port
        .parse()
        .ok()
        .filter(|p| *p != 0)
        .ok_or_else(|| CommandError::InvalidPort(port.to_string()))?;

    Ok(SocketAddrV4::new(ip, port))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
