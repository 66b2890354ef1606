//! Executes administrative console commands against the session.

use std::fmt::Write as _;
use std::sync::Arc;

use audiolink_core::protocol::command::SET_TARGET_USAGE;
use audiolink_core::{parse_command, AdminCommand, CommandError, SessionState, SetOutcome};
use tracing::info;

/// The administrative command surface.
pub struct AdminConsole {
    state: Arc<SessionState>,
    port: u16,
}

impl AdminConsole {
    pub fn new(state: Arc<SessionState>, port: u16) -> Self {
        Self { state, port }
    }

    /// Parses and executes one console line.
    ///
    /// # Errors
    ///
    /// Any [`CommandError`] from parsing or execution.
    pub fn execute_line(&self, line: &str) -> Result<String, CommandError> {
        self.execute(parse_command(line)?)
    }

    /// Executes a parsed command and returns the text to print.
    ///
    /// `set_target_addr` requires a bound network address and then overrides
    /// the target unconditionally; an identical target is a no-op.
    ///
    /// # Errors
    ///
    /// [`CommandError::NotConnected`] when `set_target_addr` runs before the
    /// network has an address.
    pub fn execute(&self, command: AdminCommand) -> Result<String, CommandError> {
        match command {
            AdminCommand::SetTargetAddr(addr) => {
                if !self.state.is_address_bound() {
                    return Err(CommandError::NotConnected);
                }
                match self.state.target().set(addr) {
                    SetOutcome::Updated { .. } => {
                        info!("target set manually to {addr}");
                        Ok(format!("Target address set to {addr}"))
                    }
                    SetOutcome::Unchanged => Ok(format!("Target address already {addr}")),
                    SetOutcome::IgnoredUnspecified => {
                        Err(CommandError::InvalidAddress(addr.ip().to_string()))
                    }
                }
            }
            AdminCommand::Status => Ok(self.status()),
            AdminCommand::Help => Ok(format!(
                "{SET_TARGET_USAGE}\n  e.g. socket set_target_addr 192.168.1.1:{}\nsocket status\nsocket help",
                self.port
            )),
        }
    }

    fn status(&self) -> String {
        let snap = self.state.snapshot();
        let target = self
            .state
            .target()
            .target()
            .map_or_else(|| "none".to_string(), |t| t.to_string());
        let local = self
            .state
            .local_addr()
            .map_or_else(|| "none".to_string(), |a| a.to_string());

        let mut out = String::new();
        let _ = writeln!(out, "role: {}", self.state.role());
        let _ = writeln!(out, "local address: {local}");
        let _ = writeln!(out, "target: {target}");
        let _ = writeln!(out, "link ready: {}", snap.link_ready);
        let _ = writeln!(out, "address bound: {}", snap.address_bound);
        let _ = writeln!(out, "socket ready: {}", snap.socket_ready);
        let _ = writeln!(out, "notified: {}", snap.notified_this_cycle);
        let _ = write!(out, "peer connected: {}", snap.peer_connected);
        for peer in self.state.peers().entries() {
            let ip = peer
                .address
                .map_or_else(|| "unknown".to_string(), |ip| ip.to_string());
            let _ = write!(out, "\npeer {}: {ip}", peer.mac);
        }
        out
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
