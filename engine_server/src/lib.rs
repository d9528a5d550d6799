//! `engine_server`
//!
//! Server-side systems:
//! - Hybrid TCP+UDP handshake routing (`HybridServer`)
//! - Fixed-timestep authoritative world simulation
//! - Outbound snapshot replication over UDP

pub mod hybrid;

pub use hybrid::{HybridClientRecord, HybridServer, ServerPumpResult};
