//! `HybridClient`: the four-state handshake state machine plus the
//! steady-state TCP/UDP pump.
//!
//! Ported from the reference `HClient.pump` (see
//! `original_source/scripts/engine/network.py`, states `"A"`/`"B"`/
//! `"C"`/`"F"`), with the injected [`Clock`] replacing the reference's
//! `time.time()` so the retry timer is unit-testable without sleeping.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use engine_shared::clock::Clock;
use engine_shared::net::{ids, ClientId, Field, NetworkError, NetworkResult, Packet, PacketCodec, TcpPeer, UdpEndpoint};

/// Initial retry timer: the first `INIT_UDP` may be dropped by a NAT
/// before the server has opened its binding, so the client resends.
const INITIAL_RETRY: Duration = Duration::from_millis(2500);
/// Rearm duration for every retry after the first.
const RETRY_REARM: Duration = Duration::from_millis(1000);
const MAX_RETRIES: u8 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Awaiting `INIT_TCP` on the newly-connected TCP stream.
    ConnectingA,
    /// `INIT_UDP` sent, awaiting `INIT_FINAL`; may retransmit.
    ConnectingB,
    Ready,
    Failed,
}

/// Result of one `pump()` call.
pub struct ClientPumpResult {
    pub events_tcp: Vec<Packet>,
    pub events_udp: Vec<Packet>,
    pub connected: bool,
    /// Edge-triggered: `+1` once on entering `Ready`, `-1` once on
    /// entering `Failed`, `0` every other tick.
    pub connection_status: i8,
}

pub struct HybridClient {
    codec: Arc<PacketCodec>,
    server_tcp_addr: SocketAddr,
    server_udp_addr: SocketAddr,
    tcp: Option<TcpPeer>,
    udp: UdpEndpoint,
    state: ConnectionState,
    client_id: Option<ClientId>,
    retry_deadline: Option<Instant>,
    retries_left: u8,
}

impl HybridClient {
    /// Binds an ephemeral local UDP socket; the TCP connection is made
    /// later by `connect()`.
    pub fn new(
        server_ip: std::net::IpAddr,
        tcp_port: u16,
        udp_port: u16,
        codec: Arc<PacketCodec>,
    ) -> NetworkResult<Self> {
        let local_udp: SocketAddr = SocketAddr::new(
            match server_ip {
                std::net::IpAddr::V4(_) => std::net::IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED),
                std::net::IpAddr::V6(_) => std::net::IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED),
            },
            0,
        );
        Ok(Self {
            codec,
            server_tcp_addr: SocketAddr::new(server_ip, tcp_port),
            server_udp_addr: SocketAddr::new(server_ip, udp_port),
            tcp: None,
            udp: UdpEndpoint::bind(local_udp)?,
            state: ConnectionState::ConnectingA,
            client_id: None,
            retry_deadline: None,
            retries_left: MAX_RETRIES,
        })
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn client_id(&self) -> Option<ClientId> {
        self.client_id
    }

    /// One-time blocking TCP connect; not part of the per-tick
    /// non-blocking pump.
    pub fn connect(&mut self) -> NetworkResult<()> {
        self.tcp = Some(TcpPeer::connect(self.server_tcp_addr)?);
        self.state = ConnectionState::ConnectingA;
        Ok(())
    }

    fn arm(&mut self, clock: &dyn Clock, after: Duration) {
        self.retry_deadline = Some(clock.now() + after);
    }

    fn fail(&mut self) {
        self.state = ConnectionState::Failed;
        self.tcp = None;
    }

    pub fn pump(&mut self, clock: &dyn Clock) -> ClientPumpResult {
        let mut events_tcp = Vec::new();
        let mut events_udp = Vec::new();
        let mut connection_status = 0i8;

        let Some(tcp) = &self.tcp else {
            return ClientPumpResult {
                events_tcp,
                events_udp,
                connected: false,
                connection_status,
            };
        };

        let (packets, err) = tcp.drain_packets(&self.codec);
        for packet in packets {
            match self.state {
                ConnectionState::ConnectingA if packet.id == ids::INIT_TCP => {
                    let cid = match packet.args.first() {
                        Some(Field::U16(cid)) => *cid,
                        _ => continue,
                    };
                    self.client_id = Some(ClientId(cid));
                    let udp_packet = Packet::new(ids::INIT_UDP, vec![Field::U16(cid)]);
                    if let Ok(bytes) = self.codec.pack(&udp_packet) {
                        let _ = self.udp.send(&bytes, self.server_udp_addr);
                    }
                    self.state = ConnectionState::ConnectingB;
                    self.retries_left = MAX_RETRIES;
                    self.arm(clock, INITIAL_RETRY);
                    info!(cid, "init_tcp received, entering connecting-b");
                }
                ConnectionState::ConnectingB if packet.id == ids::INIT_FINAL => {
                    self.state = ConnectionState::Ready;
                    self.retry_deadline = None;
                    connection_status = 1;
                    info!("handshake complete, ready");
                }
                ConnectionState::Ready => {
                    if packet.id == ids::RTT_PING && matches!(packet.args.first(), Some(Field::Bool(false))) {
                        let reply = Packet::new(ids::RTT_PING, vec![Field::Bool(true)]);
                        let _ = tcp.send_packet(&self.codec, &reply);
                    } else {
                        events_tcp.push(packet);
                    }
                }
                _ => {}
            }
        }
        if err.is_some() {
            if self.state != ConnectionState::Failed {
                self.fail();
                connection_status = -1;
                warn!("tcp connection lost, handshake failed");
            }
            return ClientPumpResult {
                events_tcp,
                events_udp,
                connected: false,
                connection_status,
            };
        }

        if self.state == ConnectionState::ConnectingB {
            if let Some(deadline) = self.retry_deadline {
                if clock.now() >= deadline {
                    self.retries_left = self.retries_left.saturating_sub(1);
                    if self.retries_left == 0 {
                        self.fail();
                        connection_status = -1;
                        warn!("handshake retries exhausted, failed");
                    } else {
                        if let Some(cid) = self.client_id {
                            let udp_packet = Packet::new(ids::INIT_UDP, vec![Field::U16(cid.0)]);
                            if let Ok(bytes) = self.codec.pack(&udp_packet) {
                                let _ = self.udp.send(&bytes, self.server_udp_addr);
                            }
                        }
                        self.arm(clock, RETRY_REARM);
                        warn!(retries_left = self.retries_left, "init_udp retry");
                    }
                }
            }
        }

        match self.udp.drain() {
            Ok(datagrams) => {
                for (bytes, addr) in datagrams {
                    if addr != self.server_udp_addr {
                        continue;
                    }
                    match self.codec.unpack(&bytes) {
                        Ok(packet) if self.state == ConnectionState::Ready => events_udp.push(packet),
                        Ok(_) => {}
                        Err(NetworkError::UnknownPacketType(_) | NetworkError::ShortPayload(_)) => {}
                        Err(_) => {}
                    }
                }
            }
            Err(_) => {}
        }

        ClientPumpResult {
            events_tcp,
            events_udp,
            connected: self.state == ConnectionState::Ready,
            connection_status,
        }
    }

    pub fn send_tcp(&self, packet: &Packet) -> NetworkResult<()> {
        match &self.tcp {
            Some(tcp) => tcp.send_packet(&self.codec, packet),
            None => Ok(()),
        }
    }

    pub fn send_udp(&self, packet: &Packet) -> NetworkResult<()> {
        let bytes = self.codec.pack(packet)?;
        self.udp.send(&bytes, self.server_udp_addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_shared::clock::TestClock;
    use engine_shared::net::default_registry;

    fn codec() -> Arc<PacketCodec> {
        Arc::new(default_registry())
    }

    #[test]
    fn new_client_starts_in_connecting_a() {
        let client = HybridClient::new(
            "127.0.0.1".parse().unwrap(),
            9183,
            9184,
            codec(),
        )
        .unwrap();
        assert_eq!(client.state(), ConnectionState::ConnectingA);
    }

    #[test]
    fn pump_with_no_tcp_connection_is_inert() {
        let mut client = HybridClient::new("127.0.0.1".parse().unwrap(), 9183, 9184, codec()).unwrap();
        let clock = TestClock::new();
        let result = client.pump(&clock);
        assert!(!result.connected);
        assert_eq!(result.connection_status, 0);
    }

    #[test]
    fn retry_timer_constants_match_handshake_schedule() {
        assert_eq!(INITIAL_RETRY, Duration::from_millis(2500));
        assert_eq!(RETRY_REARM, Duration::from_millis(1000));
        assert_eq!(MAX_RETRIES, 5);
    }
}
