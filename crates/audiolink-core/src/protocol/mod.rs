//! Protocol helpers: DNS-SD naming, the admin command grammar, and send
//! chunking.

pub mod chunk;
pub mod command;
pub mod dns_sd;

pub use chunk::{chunk_count, chunks};
pub use command::{parse_command, parse_target, AdminCommand, CommandError};
pub use dns_sd::{hostname_from_instance, service_name, DiscoveryRecord};
