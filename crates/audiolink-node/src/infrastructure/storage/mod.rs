//! Storage infrastructure: configuration file persistence.
//!
//! The `config` sub-module reads the node's TOML file from `--config` or the
//! platform config directory, falls back to defaults on first run, and
//! validates the values that fix the node's role and transport.

pub mod config;
