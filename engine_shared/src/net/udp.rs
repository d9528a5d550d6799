//! Non-blocking UDP endpoint.
//!
//! Datagrams are never reassembled; anything over
//! [`UDP_MAX_DATAGRAM`] bytes is dropped silently on send and on
//! receive.

use std::net::SocketAddr;

use tokio::net::UdpSocket;
use tracing::debug;

use super::error::{NetworkError, NetworkResult};
use super::frame::UDP_MAX_DATAGRAM;

/// A non-blocking UDP socket plus the oversize-datagram policy.
pub struct UdpEndpoint {
    socket: UdpSocket,
}

impl UdpEndpoint {
    /// Binds synchronously (via a `std` socket handed to tokio) so
    /// construction never needs an async runtime to drive it, only to
    /// register the resulting socket with the reactor.
    pub fn bind(addr: SocketAddr) -> NetworkResult<Self> {
        let std_socket = std::net::UdpSocket::bind(addr)?;
        std_socket.set_nonblocking(true)?;
        let socket = UdpSocket::from_std(std_socket)?;
        Ok(Self { socket })
    }

    pub fn local_addr(&self) -> NetworkResult<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Sends one datagram. Oversize payloads are rejected rather than
    /// silently truncated.
    pub fn send(&self, bytes: &[u8], addr: SocketAddr) -> NetworkResult<()> {
        if bytes.len() > UDP_MAX_DATAGRAM {
            return Err(NetworkError::OversizeDatagram(bytes.len(), UDP_MAX_DATAGRAM));
        }
        match self.socket.try_send_to(bytes, addr) {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(()),
            Err(e) => Err(NetworkError::Io(e)),
        }
    }

    /// Attempts to receive one datagram. `Ok(None)` on would-block.
    /// Datagrams over the cap are dropped (logged) rather than
    /// returned.
    pub fn recv(&self) -> NetworkResult<Option<(Vec<u8>, SocketAddr)>> {
        let mut buf = [0u8; UDP_MAX_DATAGRAM + 1];
        match self.socket.try_recv_from(&mut buf) {
            Ok((n, addr)) => {
                if n > UDP_MAX_DATAGRAM {
                    debug!(bytes = n, "dropping oversize udp datagram");
                    return Ok(None);
                }
                Ok(Some((buf[..n].to_vec(), addr)))
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(NetworkError::Io(e)),
        }
    }

    /// Drains all datagrams currently available, in arrival order.
    pub fn drain(&self) -> NetworkResult<Vec<(Vec<u8>, SocketAddr)>> {
        let mut out = Vec::new();
        while let Some(item) = self.recv()? {
            out.push(item);
        }
        Ok(out)
    }
}
