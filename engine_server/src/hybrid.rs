//! `HybridServer`: owns the TCP listener and UDP endpoint, performs
//! the three-way handshake, and routes packets by client id.
//!
//! Ported from the reference `HSystem` (see
//! `original_source/scripts/engine/network.py`), generalized so the
//! opaque per-client application state is a type parameter instead of
//! a duck-typed struct.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use rand::Rng;
use tracing::{debug, info, warn};

use engine_shared::net::{
    ids, ClientId, Field, NetworkError, NetworkResult, Packet, PacketCodec, TcpListenerHandle,
    TcpPeer, UdpEndpoint,
};

/// Server-side bookkeeping for one connected client.
pub struct HybridClientRecord<M> {
    pub id: ClientId,
    pub tcp_addr: SocketAddr,
    /// `None` until the client's `INIT_UDP` arrives; immutable once set.
    pub udp_addr: Option<SocketAddr>,
    pub model: M,
    tcp: TcpPeer,
}

impl<M> HybridClientRecord<M> {
    pub fn model(&self) -> &M {
        &self.model
    }
}

/// Result of one `pump()` call.
pub struct ServerPumpResult {
    pub new_clients: Vec<ClientId>,
    pub disconnected_clients: Vec<ClientId>,
    pub events_tcp: Vec<(ClientId, Packet)>,
    pub events_udp: Vec<(ClientId, Packet)>,
}

pub struct HybridServer<M> {
    codec: Arc<PacketCodec>,
    listener: TcpListenerHandle,
    udp: UdpEndpoint,
    records: HashMap<ClientId, HybridClientRecord<M>>,
    tcp_addr_to_id: HashMap<SocketAddr, ClientId>,
    udp_addr_to_id: HashMap<SocketAddr, ClientId>,
    model_factory: Box<dyn Fn() -> M>,
}

impl<M> HybridServer<M> {
    pub fn new(
        tcp_addr: SocketAddr,
        udp_addr: SocketAddr,
        model_factory: impl Fn() -> M + 'static,
        codec: Arc<PacketCodec>,
    ) -> NetworkResult<Self> {
        let listener = TcpListenerHandle::bind(tcp_addr)?;
        let udp = UdpEndpoint::bind(udp_addr)?;
        Ok(Self {
            codec,
            listener,
            udp,
            records: HashMap::new(),
            tcp_addr_to_id: HashMap::new(),
            udp_addr_to_id: HashMap::new(),
            model_factory: Box::new(model_factory),
        })
    }

    pub fn model(&self, id: ClientId) -> Option<&M> {
        self.records.get(&id).map(|r| &r.model)
    }

    fn allocate_client_id(&self) -> ClientId {
        ClientId(alloc_unique_u16(&|id| self.records.contains_key(&ClientId(id))))
    }

    /// Drains newly-accepted TCP connections, provisions a record for
    /// each, and sends `INIT_TCP`.
    fn accept_new_connections(&mut self) -> NetworkResult<()> {
        while let Some(peer) = self.listener.try_accept()? {
            let id = self.allocate_client_id();
            let addr = peer.peer_addr();
            peer.send_packet(&self.codec, &Packet::new(ids::INIT_TCP, vec![Field::U16(id.0)]))?;

            self.tcp_addr_to_id.insert(addr, id);
            self.records.insert(
                id,
                HybridClientRecord {
                    id,
                    tcp_addr: addr,
                    udp_addr: None,
                    model: (self.model_factory)(),
                    tcp: peer,
                },
            );
            debug!(%id, %addr, "accepted provisional tcp connection");
        }
        Ok(())
    }

    /// Drains inbound UDP datagrams, completing the handshake for
    /// `INIT_UDP` and routing everything else to bound clients.
    fn drain_udp(&mut self, out: &mut Vec<(ClientId, Packet)>, new_clients: &mut Vec<ClientId>) -> NetworkResult<()> {
        for (bytes, addr) in self.udp.drain()? {
            let packet = match self.codec.unpack(&bytes) {
                Ok(p) => p,
                Err(NetworkError::UnknownPacketType(id)) => {
                    debug!(id, "dropping udp datagram with unknown packet type");
                    continue;
                }
                Err(NetworkError::ShortPayload(id)) => {
                    debug!(id, "dropping short udp datagram");
                    continue;
                }
                Err(e) => return Err(e),
            };

            if packet.id == ids::INIT_UDP {
                let cid = match packet.args.first() {
                    Some(Field::U16(cid)) => ClientId(*cid),
                    _ => continue,
                };
                let Some(record) = self.records.get_mut(&cid) else {
                    continue;
                };
                if record.udp_addr.is_some() {
                    // Duplicate INIT_UDP after binding: ignored.
                    continue;
                }
                record.udp_addr = Some(addr);
                self.udp_addr_to_id.insert(addr, cid);
                record
                    .tcp
                    .send_packet(&self.codec, &Packet::new(ids::INIT_FINAL, vec![]))?;
                info!(%cid, %addr, "udp peer bound, handshake complete");
                new_clients.push(cid);
                continue;
            }

            match self.udp_addr_to_id.get(&addr) {
                Some(&cid) => out.push((cid, packet)),
                None => debug!(%addr, "dropping udp packet from unbound address"),
            }
        }
        Ok(())
    }

    /// Drains framed TCP packets from every bound connection,
    /// detecting and reporting disconnects.
    fn drain_tcp(
        &mut self,
        out: &mut Vec<(ClientId, Packet)>,
        disconnected: &mut Vec<ClientId>,
    ) {
        for (&id, record) in self.records.iter() {
            let (packets, err) = record.tcp.drain_packets(&self.codec);
            for packet in packets {
                if packet.id == ids::RTT_PING && matches!(packet.args.first(), Some(Field::Bool(false))) {
                    let reply = Packet::new(ids::RTT_PING, vec![Field::Bool(true)]);
                    let _ = record.tcp.send_packet(&self.codec, &reply);
                    continue;
                }
                out.push((id, packet));
            }
            if err.is_some() {
                disconnected.push(id);
            }
        }
    }

    fn remove_client(&mut self, id: ClientId) {
        if let Some(record) = self.records.remove(&id) {
            self.tcp_addr_to_id.remove(&record.tcp_addr);
            if let Some(addr) = record.udp_addr {
                self.udp_addr_to_id.remove(&addr);
            }
            warn!(%id, "client disconnected");
        }
    }

    pub fn pump(&mut self) -> NetworkResult<ServerPumpResult> {
        self.accept_new_connections()?;

        let mut new_clients = Vec::new();
        let mut events_udp = Vec::new();
        self.drain_udp(&mut events_udp, &mut new_clients)?;

        let mut events_tcp = Vec::new();
        let mut disconnected_clients = Vec::new();
        self.drain_tcp(&mut events_tcp, &mut disconnected_clients);

        for id in &disconnected_clients {
            self.remove_client(*id);
        }

        Ok(ServerPumpResult {
            new_clients,
            disconnected_clients,
            events_tcp,
            events_udp,
        })
    }

    /// Unicasts to `target`, or fans out to every connected client
    /// when `target` is `None`.
    pub fn send_tcp(&self, packet: &Packet, target: Option<ClientId>) -> NetworkResult<()> {
        match target {
            Some(id) => {
                if let Some(record) = self.records.get(&id) {
                    record.tcp.send_packet(&self.codec, packet)?;
                }
            }
            None => {
                for record in self.records.values() {
                    record.tcp.send_packet(&self.codec, packet)?;
                }
            }
        }
        Ok(())
    }

    /// Unicasts to `target`'s bound UDP address, or fans out to every
    /// bound address when `target` is `None`. Unbound records are
    /// silently skipped.
    pub fn send_udp(&self, packet: &Packet, target: Option<ClientId>) -> NetworkResult<()> {
        let bytes = self.codec.pack(packet)?;
        match target {
            Some(id) => {
                if let Some(Some(addr)) = self.records.get(&id).map(|r| r.udp_addr) {
                    self.udp.send(&bytes, addr)?;
                }
            }
            None => {
                for record in self.records.values() {
                    if let Some(addr) = record.udp_addr {
                        self.udp.send(&bytes, addr)?;
                    }
                }
            }
        }
        Ok(())
    }
}

/// Uniform-random 16-bit id, retried against `taken` until free.
/// Extracted as a pure function so collision-retry can be tested
/// without standing up real connections.
fn alloc_unique_u16(taken: &dyn Fn(u16) -> bool) -> u16 {
    let mut rng = rand::thread_rng();
    loop {
        let candidate: u16 = rng.gen();
        if !taken(candidate) {
            return candidate;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ephemeral(codec: Arc<PacketCodec>) -> HybridServer<()> {
        HybridServer::new(
            "127.0.0.1:0".parse().unwrap(),
            "127.0.0.1:0".parse().unwrap(),
            || (),
            codec,
        )
        .unwrap()
    }

    #[test]
    fn pump_with_no_traffic_is_a_no_op() {
        let codec = Arc::new(engine_shared::net::default_registry());
        let mut server = ephemeral(codec);
        let result = server.pump().unwrap();
        assert!(result.new_clients.is_empty());
        assert!(result.disconnected_clients.is_empty());
    }

    #[test]
    fn id_allocation_avoids_taken_values() {
        let mut taken: std::collections::HashSet<u16> = (0..=u16::MAX).collect();
        // Leave exactly one value free; the allocator must find it
        // even though almost the entire space is taken.
        taken.remove(&12345);
        let id = alloc_unique_u16(&|id| taken.contains(&id));
        assert_eq!(id, 12345);
    }
}
