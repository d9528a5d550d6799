//! TCP length-prefixed framing and UDP single-datagram framing.
//!
//! TCP: a fixed 16-byte ASCII-decimal header, right-aligned and
//! zero-padded, followed by exactly that many body bytes. This is
//! bandwidth-inefficient compared to a binary `u32` length, but is
//! preserved byte-exact for wire compatibility with the reference
//! implementation (see design notes).
//!
//! UDP: one datagram, capped at [`UDP_MAX_DATAGRAM`] bytes, no
//! reassembly.

use tokio::net::TcpStream;

use super::error::{NetworkError, NetworkResult};

/// Fixed TCP frame header width, in bytes.
pub const HEADER_SIZE: usize = 16;

/// Maximum UDP datagram size this transport will send or accept.
pub const UDP_MAX_DATAGRAM: usize = 8096;

fn encode_header(body_len: usize) -> [u8; HEADER_SIZE] {
    let s = format!("{:0>width$}", body_len, width = HEADER_SIZE);
    let mut out = [0u8; HEADER_SIZE];
    out.copy_from_slice(s.as_bytes());
    out
}

fn decode_header(bytes: &[u8]) -> NetworkResult<usize> {
    let s = std::str::from_utf8(bytes).map_err(|_| NetworkError::FramingError)?;
    s.trim().parse::<usize>().map_err(|_| NetworkError::FramingError)
}

/// Writes one framed packet body to a TCP stream.
///
/// Non-blocking: returns `Ok(true)` once fully written, or `Ok(false)`
/// if the stream reported would-block before any bytes were sent
/// (caller should retry next pump). Partial writes after the first
/// byte are retried in a tight loop since the header+body is small
/// relative to the socket buffer in practice.
pub fn try_write_frame(stream: &TcpStream, body: &[u8]) -> NetworkResult<bool> {
    let header = encode_header(body.len());
    let mut full = Vec::with_capacity(HEADER_SIZE + body.len());
    full.extend_from_slice(&header);
    full.extend_from_slice(body);

    let mut written = 0;
    loop {
        match stream.try_write(&full[written..]) {
            Ok(0) => return Err(NetworkError::ConnectionReset),
            Ok(n) => {
                written += n;
                if written == full.len() {
                    return Ok(true);
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                if written == 0 {
                    return Ok(false);
                }
                // Bytes are already in flight for this frame; a short
                // frame on a LAN-quality link (per scope) is expected
                // to drain quickly, so spin rather than leave the
                // stream mid-frame for the next pump to misinterpret.
                continue;
            }
            Err(e) => return Err(NetworkError::Io(e)),
        }
    }
}

/// Attempts to read one framed packet body from a TCP stream.
///
/// Returns `Ok(None)` on would-block (no data ready). Returns
/// `Ok(Some(body))` once a full frame has arrived. A zero-length
/// header read, or a non-numeric header, is a framing error; the
/// caller should treat it as a disconnect.
pub fn try_read_frame(stream: &TcpStream) -> NetworkResult<Option<Vec<u8>>> {
    let mut header = [0u8; HEADER_SIZE];
    match stream.try_read(&mut header) {
        Ok(0) => return Err(NetworkError::ConnectionReset),
        Ok(n) if n < HEADER_SIZE => {
            // Partial header read under non-blocking I/O; treat as a
            // framing error rather than silently dropping bytes — the
            // reference assumes header reads are atomic on a LAN link.
            let _ = n;
            return Err(NetworkError::FramingError);
        }
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => return Ok(None),
        Err(e) => return Err(NetworkError::Io(e)),
    }

    let body_len = decode_header(&header)?;
    let mut body = vec![0u8; body_len];
    let mut read = 0;
    while read < body_len {
        match stream.try_read(&mut body[read..]) {
            Ok(0) => return Err(NetworkError::ConnectionReset),
            Ok(n) => read += n,
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                // Body hasn't fully arrived yet; spin — bodies are
                // small and this is a LAN-quality link per scope.
                continue;
            }
            Err(e) => return Err(NetworkError::Io(e)),
        }
    }
    Ok(Some(body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trip() {
        let h = encode_header(42);
        assert_eq!(h.len(), HEADER_SIZE);
        assert_eq!(&h, b"0000000000000042");
        assert_eq!(decode_header(&h).unwrap(), 42);
    }

    #[test]
    fn header_rejects_non_numeric() {
        let bad = *b"not a number1234";
        assert!(decode_header(&bad).is_err());
    }
}
