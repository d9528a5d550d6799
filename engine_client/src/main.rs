//! Standalone client binary.
//!
//! Usage:
//!   cargo run -p engine_client -- [--tcp-addr 127.0.0.1:9183] [--udp-addr 127.0.0.1:9184] [--tick-hz 60]
//!
//! Connects via the hybrid handshake and runs a fixed-tick client-mode
//! world, logging handshake progress and entity events as they arrive.

use std::env;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use engine_client::hybrid::HybridClient;
use engine_shared::clock::SystemClock;
use engine_shared::config::EngineConfig;
use engine_shared::entity::{Entity, EntityId, EntityRegistryBuilder, Physics};
use engine_shared::net::default_registry;
use engine_shared::world::World;
use tracing::{info, warn};

fn make_tank(id: EntityId, _world: &World, position: (f64, f64)) -> Entity {
    Entity::new(id, "tank", Physics { position, ..Default::default() })
}

fn parse_args() -> EngineConfig {
    let mut cfg = EngineConfig::default();
    let args: Vec<String> = env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--tcp-addr" if i + 1 < args.len() => {
                cfg.tcp_addr = args[i + 1].clone();
                i += 2;
            }
            "--udp-addr" if i + 1 < args.len() => {
                cfg.udp_addr = args[i + 1].clone();
                i += 2;
            }
            "--tick-hz" if i + 1 < args.len() => {
                cfg.client_tick_hz = args[i + 1].parse().unwrap_or(60);
                i += 2;
            }
            _ => i += 1,
        }
    }
    cfg
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cfg = parse_args();
    info!(tcp = %cfg.tcp_addr, udp = %cfg.udp_addr, "starting client");

    let tcp_addr: SocketAddr = cfg.tcp_addr.parse().context("invalid tcp-addr")?;
    let udp_addr: SocketAddr = cfg.udp_addr.parse().context("invalid udp-addr")?;
    let codec = Arc::new(default_registry());

    let mut client = HybridClient::new(tcp_addr.ip(), tcp_addr.port(), udp_addr.port(), codec)
        .context("bind hybrid client")?;
    client.connect().context("tcp connect")?;

    let registry = EntityRegistryBuilder::new().register("tank", make_tank).build();
    let mut world = World::new(registry, false);
    let clock = SystemClock;

    let tick_interval = std::time::Duration::from_secs_f32(1.0 / cfg.client_tick_hz as f32);
    let mut next_tick = tokio::time::Instant::now();

    loop {
        let result = client.pump(&clock);
        match result.connection_status {
            1 => info!("handshake ready"),
            -1 => warn!("handshake failed, exiting"),
            _ => {}
        }
        if result.connection_status == -1 {
            break;
        }

        for packet in result.events_tcp.into_iter().chain(result.events_udp) {
            world.handle_network_event(packet, &clock);
        }

        world.update(tick_interval.as_secs_f32(), &clock);

        let (_tcp_events, udp_events) = world.pump_network_events(&clock);
        for packet in udp_events {
            client.send_udp(&packet)?;
        }

        next_tick += tick_interval;
        tokio::time::sleep_until(next_tick).await;
    }

    Ok(())
}
