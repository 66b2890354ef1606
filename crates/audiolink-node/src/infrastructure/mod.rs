//! Infrastructure layer for the node.
//!
//! OS-facing adapters for the application ports: UDP sockets, multicast DNS,
//! the OS-managed link, process restart, TOML storage and the stdin console.
//! Modules with a `mock` child also provide scripted fakes for tests.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `audiolink_core`, but MUST NOT be imported by the `application` layer
//! outside its tests.

pub mod console;
pub mod device;
pub mod link;
pub mod mdns;
pub mod socket;
pub mod storage;
