//! Snapshot interpolation.
//!
//! The buffer and bracketing logic live in
//! [`engine_shared::snapshot`] since `World` needs them directly (a
//! client-mode `World` owns its own `SnapshotBuffer`); this module
//! re-exports them under the client's historical name.

pub use engine_shared::snapshot::{Snapshot, SnapshotBuffer};
