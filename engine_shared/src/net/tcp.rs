//! Non-blocking TCP listener and per-peer framed packet I/O.
//!
//! The listener itself is a plain `std::net::TcpListener` set
//! non-blocking — accepting is then a synchronous, would-block-or-
//! succeed call with no need to drive an executor just to poll it.
//! Accepted streams are handed to tokio so peer I/O can use its
//! non-blocking `try_read`/`try_write`.

use std::net::SocketAddr;

use socket2::{Domain, Socket, Type};
use tokio::net::TcpStream;

use tracing::debug;

use super::codec::{Packet, PacketCodec};
use super::error::{NetworkError, NetworkResult};
use super::frame::{try_read_frame, try_write_frame};

/// Listen backlog, matching the reference's `socket.listen(5)`.
const LISTEN_BACKLOG: i32 = 5;

/// Non-blocking TCP listener with an explicit backlog of
/// [`LISTEN_BACKLOG`] — `std::net::TcpListener::bind` has no backlog
/// parameter, so the socket is built with `socket2` and converted.
pub struct TcpListenerHandle {
    listener: std::net::TcpListener,
}

impl TcpListenerHandle {
    pub fn bind(addr: SocketAddr) -> NetworkResult<Self> {
        let domain = if addr.is_ipv4() { Domain::IPV4 } else { Domain::IPV6 };
        let socket = Socket::new(domain, Type::STREAM, None)?;
        socket.set_reuse_address(true)?;
        socket.bind(&addr.into())?;
        socket.listen(LISTEN_BACKLOG)?;
        socket.set_nonblocking(true)?;
        let listener: std::net::TcpListener = socket.into();
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> NetworkResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Yields at most one newly-accepted peer per call; `Ok(None)`
    /// when nothing is pending.
    pub fn try_accept(&self) -> NetworkResult<Option<TcpPeer>> {
        match self.listener.accept() {
            Ok((stream, addr)) => {
                stream.set_nonblocking(true)?;
                let stream = TcpStream::from_std(stream)?;
                Ok(Some(TcpPeer { stream, addr }))
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(NetworkError::Io(e)),
        }
    }
}

/// One accepted (or client-side connected) TCP peer, speaking framed
/// packets over the codec.
pub struct TcpPeer {
    stream: TcpStream,
    addr: SocketAddr,
}

impl TcpPeer {
    /// Connects synchronously (blocking) to a server. This is a
    /// one-time setup call, not part of the per-tick non-blocking
    /// pump loop, so a short blocking wait is acceptable.
    pub fn connect(addr: SocketAddr) -> NetworkResult<Self> {
        let stream = std::net::TcpStream::connect(addr)?;
        stream.set_nonblocking(true)?;
        let stream = TcpStream::from_std(stream)?;
        Ok(Self { stream, addr })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn send_packet(&self, codec: &PacketCodec, packet: &Packet) -> NetworkResult<()> {
        let body = codec.pack(packet)?;
        try_write_frame(&self.stream, &body)?;
        Ok(())
    }

    /// Returns zero or one decoded packet. `Ok(None)` on would-block
    /// *or* on a decode failure (unknown type / short payload) — those
    /// are dropped and logged rather than treated as a disconnect.
    /// Framing errors and resets propagate as `Err`, which the caller
    /// must treat as a disconnect.
    pub fn recv_packet(&self, codec: &PacketCodec) -> NetworkResult<Option<Packet>> {
        let body = match try_read_frame(&self.stream)? {
            Some(body) => body,
            None => return Ok(None),
        };
        match codec.unpack(&body) {
            Ok(packet) => Ok(Some(packet)),
            Err(e @ (NetworkError::UnknownPacketType(_) | NetworkError::ShortPayload(_))) => {
                debug!(error = %e, "dropping malformed tcp packet");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Drains every packet currently framed and available, in order.
    ///
    /// Packets decoded before a disconnecting error occurs are still
    /// returned, alongside the error that ended the drain — a caller
    /// that only checked the `Err` case would otherwise lose whatever
    /// arrived earlier in the same call.
    pub fn drain_packets(&self, codec: &PacketCodec) -> (Vec<Packet>, Option<NetworkError>) {
        let mut out = Vec::new();
        loop {
            match self.recv_packet(codec) {
                Ok(Some(p)) => out.push(p),
                Ok(None) => return (out, None),
                Err(e) => return (out, Some(e)),
            }
        }
    }
}
