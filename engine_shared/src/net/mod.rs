//! Hybrid TCP+UDP networking primitives: framing, the packet codec,
//! and the non-blocking socket wrappers both roles build on.

pub mod codec;
pub mod error;
pub mod frame;
pub mod tcp;
pub mod udp;

pub use codec::{default_registry, ids, Field, FieldKind, Packet, PacketCodec, PacketCodecEntry, PhysState};
pub use error::{NetworkError, NetworkResult};
pub use tcp::{TcpListenerHandle, TcpPeer};
pub use udp::UdpEndpoint;

/// Client identifier. 16-bit, unique per server while live, assigned
/// at TCP accept and freed on disconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(pub u16);

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "client#{}", self.0)
    }
}
