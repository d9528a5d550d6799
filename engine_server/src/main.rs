//! Standalone server binary.
//!
//! Usage:
//!   cargo run -p engine_server -- [--tcp-addr 127.0.0.1:9183] [--udp-addr 127.0.0.1:9184] [--tick-hz 20]
//!
//! Accepts clients via the hybrid handshake, spawns one entity per
//! client, and broadcasts authoritative snapshots at a fixed tick
//! rate.

use std::env;
use std::sync::Arc;

use anyhow::Context;
use engine_server::HybridServer;
use engine_shared::clock::SystemClock;
use engine_shared::config::EngineConfig;
use engine_shared::entity::{Entity, EntityId, EntityRegistryBuilder, Physics};
use engine_shared::net::{default_registry, ids, Field, Packet};
use engine_shared::world::World;
use tracing::info;

/// Opaque per-client application state. The core only ever sees this
/// through `HybridServer<ClientModel>`; it carries whatever the
/// application needs, here just the client's spawned entity.
#[derive(Default)]
struct ClientModel {
    entity: Option<EntityId>,
}

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
                cfg.server_tick_hz = args[i + 1].parse().unwrap_or(20);
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
    info!(tcp = %cfg.tcp_addr, udp = %cfg.udp_addr, tick_hz = cfg.server_tick_hz, "starting server");

    let codec = Arc::new(default_registry());
    let registry = EntityRegistryBuilder::new().register("tank", make_tank).build();
    let mut world = World::new(registry, true);
    let clock = SystemClock;

    let mut server = HybridServer::new(
        cfg.tcp_addr.parse().context("invalid tcp-addr")?,
        cfg.udp_addr.parse().context("invalid udp-addr")?,
        ClientModel::default,
        codec,
    )
    .context("bind hybrid server")?;

    let tick_interval = std::time::Duration::from_secs_f32(1.0 / cfg.server_tick_hz as f32);
    let mut next_tick = tokio::time::Instant::now();

    loop {
        let result = server.pump().context("server pump")?;

        for &id in &result.new_clients {
            let entity_id = world.assign_new_entity_id();

            // Backfill every pre-existing entity to the new client before
            // announcing its own, so it has the full world before anyone
            // else learns about it.
            for existing in world.entities() {
                server.send_tcp(
                    &Packet::new(
                        ids::ENTITY_CREATE,
                        vec![Field::U16(existing.id), Field::Str(existing.type_tag.clone())],
                    ),
                    Some(id),
                )?;
            }

            let entity = make_tank(entity_id, &world, (0.0, 0.0));
            world.create_entity(entity, true);

            server.send_tcp(
                &Packet::new(ids::ENTITY_CREATE, vec![Field::U16(entity_id), Field::Str("tank".into())]),
                None,
            )?;
            server.send_tcp(
                &Packet::new(ids::CLIENT_SET_LOCAL_ENTITY, vec![Field::U16(entity_id), Field::Bool(true)]),
                Some(id),
            )?;
            info!(%id, entity_id, "client spawned");
        }

        for (_id, packet) in &result.events_udp {
            if packet.id == ids::ENTITY_UPDATE_PHYS_MULTI {
                if let engine_shared::net::Field::PhysList(states) = &packet.args[1] {
                    for state in states {
                        world.apply_phys_state(state);
                    }
                }
            }
        }

        world.update(tick_interval.as_secs_f32(), &clock);
        let (_tcp_events, udp_events) = world.pump_network_events(&clock);
        for packet in udp_events {
            server.send_udp(&packet, None)?;
        }

        next_tick += tick_interval;
        tokio::time::sleep_until(next_tick).await;
    }
}
