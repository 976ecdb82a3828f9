//! befw daemon library.
//!
//! Exposes the daemon's modules for integration testing.
//! In production `befw-daemon` runs as a binary (main.rs).

pub mod cli;
pub mod logging;
pub mod metrics_server;
pub mod orchestrator;
