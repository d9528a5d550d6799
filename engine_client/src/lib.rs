//! `engine_client`
//!
//! Client-side systems:
//! - `HybridClient`: handshake state machine plus steady-state pump
//! - Snapshot interpolation (re-exported from `engine_shared`)

pub mod hybrid;
pub mod interp;

pub use hybrid::{ClientPumpResult, ConnectionState, HybridClient};
