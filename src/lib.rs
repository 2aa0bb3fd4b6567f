// ABOUTME: staging-sync library: incremental table-sync engine plus bucket mirroring
// ABOUTME: main.rs wires these modules to the CLI

pub mod config;
pub mod connect;
pub mod mirror;
pub mod sync;
