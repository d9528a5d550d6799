//! Error taxonomy for the hybrid transport and packet codec.
//!
//! `WouldBlock` is deliberately not a variant here: non-blocking reads
//! surface it as `Ok(None)`, never as an `Err`, so it cannot leak past
//! the framing layer.

use thiserror::Error;

/// Transport and codec failures.
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("malformed or empty tcp frame header")]
    FramingError,

    #[error("connection reset by peer")]
    ConnectionReset,

    #[error("unknown packet type id {0}")]
    UnknownPacketType(u16),

    #[error("payload too short to decode packet {0}")]
    ShortPayload(u16),

    #[error("packet id {0} already registered")]
    CodecRegistrationCollision(u16),

    #[error("datagram of {0} bytes exceeds the {1}-byte udp limit")]
    OversizeDatagram(usize, usize),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type NetworkResult<T> = Result<T, NetworkError>;
