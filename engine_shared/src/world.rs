//! Entity table, locality tracking, and the two `World` update modes
//! (authoritative server integration vs. client-side replication).

use std::collections::{HashMap, HashSet};

use rand::Rng;

use crate::clock::Clock;
use crate::entity::{Entity, EntityId, EntityRegistry, Physics};
use crate::net::{ids, Field, Packet, PhysState};
use crate::snapshot::{Snapshot, SnapshotBuffer};

/// Fixed temporal offset by which the client renders non-local
/// entities in the past, to absorb jitter via interpolation.
pub const RENDER_DELAY_SECS: f64 = 0.2;

/// Entity table plus replication state. `is_server` selects which of
/// the two update/event-handling modes applies.
pub struct World {
    registry: EntityRegistry,
    is_server: bool,
    entities: HashMap<EntityId, Entity>,
    local_entities: HashSet<EntityId>,
    /// Present only in client mode (`is_server == false`).
    snapshots: Option<SnapshotBuffer>,
    created_at: std::time::Instant,
}

impl World {
    pub fn new(registry: EntityRegistry, is_server: bool) -> Self {
        Self {
            registry,
            is_server,
            entities: HashMap::new(),
            local_entities: HashSet::new(),
            snapshots: if is_server {
                None
            } else {
                Some(SnapshotBuffer::new(SnapshotBuffer::DEFAULT_CAPACITY))
            },
            created_at: std::time::Instant::now(),
        }
    }

    pub fn is_server(&self) -> bool {
        self.is_server
    }

    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn is_local(&self, id: EntityId) -> bool {
        self.local_entities.contains(&id)
    }

    /// 16-bit uniform random id, collision-retried against the live
    /// entity set.
    pub fn assign_new_entity_id(&self) -> EntityId {
        let mut rng = rand::thread_rng();
        loop {
            let candidate: EntityId = rng.gen();
            if !self.entities.contains_key(&candidate) {
                return candidate;
            }
        }
    }

    pub fn create_entity(&mut self, entity: Entity, is_local: bool) -> EntityId {
        let id = entity.id;
        self.entities.insert(id, entity);
        if is_local {
            self.local_entities.insert(id);
        }
        id
    }

    pub fn destroy_entity(&mut self, id: EntityId) {
        self.entities.remove(&id);
        self.local_entities.remove(&id);
    }

    /// Directly overwrites one entity's physics state. Used by the
    /// server to accept a client's self-reported physics for entities
    /// it owns (its local set), submitted via `EntityUpdatePhysMulti`.
    pub fn apply_phys_state(&mut self, state: &PhysState) {
        if let Some(entity) = self.entities.get_mut(&state.id) {
            entity.physics = Physics {
                position: (state.x, state.y),
                velocity: (state.vx, state.vy),
                rotation: state.rot,
                angular_velocity: state.vrot,
            };
        }
    }

    pub fn set_entity_local(&mut self, id: EntityId, flag: bool) {
        if flag {
            self.local_entities.insert(id);
        } else {
            self.local_entities.remove(&id);
        }
    }

    /// Server-side authoritative advance: integrate every entity's
    /// physics. Client-side: interpolate non-local entities to
    /// `render_time`, tick every renderer, and advance local entities
    /// directly by `dt`.
    pub fn update(&mut self, dt: f32, clock: &dyn Clock) {
        if self.is_server {
            for entity in self.entities.values_mut() {
                entity.integrate(dt);
            }
            return;
        }

        let now = self.elapsed_secs(clock);
        let render_time = now - RENDER_DELAY_SECS;

        if let Some(buffer) = &self.snapshots {
            if let Some(blended) = buffer.interpolate(render_time) {
                for state in &blended.states {
                    if self.local_entities.contains(&state.id) {
                        continue;
                    }
                    if let Some(entity) = self.entities.get_mut(&state.id) {
                        entity.physics = Physics {
                            position: (state.x, state.y),
                            velocity: (state.vx, state.vy),
                            rotation: state.rot,
                            angular_velocity: state.vrot,
                        };
                    }
                }
            }
        }

        for entity in self.entities.values_mut() {
            entity.renderer.tick(dt);
        }

        for id in self.local_entities.clone() {
            if let Some(entity) = self.entities.get_mut(&id) {
                entity.integrate(dt);
            }
        }
    }

    fn elapsed_secs(&self, clock: &dyn Clock) -> f64 {
        clock.now().saturating_duration_since(self.created_at).as_secs_f64()
    }

    /// Dispatches one inbound replication packet. No-op for packet ids
    /// outside the replication set (handshake packets are consumed by
    /// the hybrid layer before reaching here).
    pub fn handle_network_event(&mut self, packet: Packet, clock: &dyn Clock) {
        match packet.id {
            ids::ENTITY_CREATE => {
                let (id, tag) = match (&packet.args[0], &packet.args[1]) {
                    (Field::U16(id), Field::Str(tag)) => (*id, tag.clone()),
                    _ => return,
                };
                if let Some(entity) = self.registry.get_instance(id, &tag, (0.0, 0.0), self) {
                    self.create_entity(entity, false);
                }
            }
            ids::ENTITY_DESTROY => {
                if let Field::U16(id) = packet.args[0] {
                    self.destroy_entity(id);
                }
            }
            ids::ENTITY_UPDATE_PHYS => {
                let id = match packet.args[0] {
                    Field::U16(id) => id,
                    _ => return,
                };
                if self.local_entities.contains(&id) {
                    return;
                }
                if let Some(entity) = self.entities.get_mut(&id) {
                    if let (
                        Field::F64(x),
                        Field::F64(y),
                        Field::F32(vx),
                        Field::F32(vy),
                        Field::F32(rot),
                        Field::F32(vrot),
                    ) = (
                        &packet.args[1],
                        &packet.args[2],
                        &packet.args[3],
                        &packet.args[4],
                        &packet.args[5],
                        &packet.args[6],
                    ) {
                        entity.physics = Physics {
                            position: (*x, *y),
                            velocity: (*vx, *vy),
                            rotation: *rot,
                            angular_velocity: *vrot,
                        };
                    }
                }
            }
            ids::ENTITY_UPDATE_PHYS_MULTI => {
                let (ref_time, states) = match (&packet.args[0], &packet.args[1]) {
                    (Field::F64(t), Field::PhysList(states)) => (*t, states.clone()),
                    _ => return,
                };
                if let Some(buffer) = &mut self.snapshots {
                    buffer.append(Snapshot {
                        reference_time: ref_time,
                        receive_time: self.elapsed_secs(clock),
                        states,
                    });
                }
            }
            ids::CLIENT_SET_LOCAL_ENTITY => {
                if let (Field::U16(id), Field::Bool(flag)) = (&packet.args[0], &packet.args[1]) {
                    self.set_entity_local(*id, *flag);
                }
            }
            _ => {}
        }
    }

    /// Produces outbound replication packets for this tick.
    ///
    /// Server mode: one `EntityUpdatePhysMulti` over UDP covering
    /// every entity. Client mode: one `EntityUpdatePhysMulti` over UDP
    /// covering only the local set (the player's own entities),
    /// giving the server authoritative updates for them.
    pub fn pump_network_events(&self, clock: &dyn Clock) -> (Vec<Packet>, Vec<Packet>) {
        let ref_time = self.elapsed_secs(clock);
        let ids_to_send: Vec<EntityId> = if self.is_server {
            self.entities.keys().copied().collect()
        } else {
            self.local_entities.iter().copied().collect()
        };

        let states: Vec<PhysState> = ids_to_send
            .into_iter()
            .filter_map(|id| self.entities.get(&id))
            .map(|e| PhysState {
                id: e.id,
                x: e.physics.position.0,
                y: e.physics.position.1,
                vx: e.physics.velocity.0,
                vy: e.physics.velocity.1,
                rot: e.physics.rotation,
                vrot: e.physics.angular_velocity,
            })
            .collect();

        let packet = Packet::new(
            ids::ENTITY_UPDATE_PHYS_MULTI,
            vec![Field::F64(ref_time), Field::PhysList(states)],
        );
        (Vec::new(), vec![packet])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TestClock;
    use crate::entity::EntityRegistryBuilder;

    fn registry() -> EntityRegistry {
        fn tank(id: EntityId, _world: &World, pos: (f64, f64)) -> Entity {
            Entity::new(id, "tank", Physics { position: pos, ..Default::default() })
        }
        EntityRegistryBuilder::new().register("tank", tank).build()
    }

    #[test]
    fn server_integration_advances_all_entities() {
        let mut world = World::new(registry(), true);
        let mut e = Entity::new(1, "tank", Physics::default());
        e.physics.velocity = (10.0, 0.0);
        world.create_entity(e, false);
        let clock = TestClock::new();
        world.update(1.0, &clock);
        assert_eq!(world.entity(1).unwrap().physics.position.0, 10.0);
    }

    #[test]
    fn local_entity_rejects_inbound_phys_update() {
        let mut world = World::new(registry(), false);
        let e = Entity::new(7, "tank", Physics::default());
        world.create_entity(e, true);
        let clock = TestClock::new();

        let packet = Packet::new(
            ids::ENTITY_UPDATE_PHYS,
            vec![
                Field::U16(7),
                Field::F64(99.0),
                Field::F64(99.0),
                Field::F32(0.0),
                Field::F32(0.0),
                Field::F32(0.0),
                Field::F32(0.0),
            ],
        );
        world.handle_network_event(packet, &clock);
        assert_eq!(world.entity(7).unwrap().physics.position, (0.0, 0.0));
    }

    #[test]
    fn non_local_entity_accepts_correction() {
        let mut world = World::new(registry(), false);
        let e = Entity::new(9, "tank", Physics::default());
        world.create_entity(e, false);
        let clock = TestClock::new();

        let packet = Packet::new(
            ids::ENTITY_UPDATE_PHYS,
            vec![
                Field::U16(9),
                Field::F64(5.0),
                Field::F64(5.0),
                Field::F32(0.0),
                Field::F32(0.0),
                Field::F32(0.0),
                Field::F32(0.0),
            ],
        );
        world.handle_network_event(packet, &clock);
        assert_eq!(world.entity(9).unwrap().physics.position, (5.0, 5.0));
    }

    #[test]
    fn set_local_entity_toggles_authority() {
        let mut world = World::new(registry(), false);
        let e = Entity::new(3, "tank", Physics::default());
        world.create_entity(e, false);
        assert!(!world.is_local(3));

        let clock = TestClock::new();
        let packet = Packet::new(ids::CLIENT_SET_LOCAL_ENTITY, vec![Field::U16(3), Field::Bool(true)]);
        world.handle_network_event(packet, &clock);
        assert!(world.is_local(3));
    }

    #[test]
    fn entity_create_event_uses_registry() {
        let mut world = World::new(registry(), false);
        let clock = TestClock::new();
        let packet = Packet::new(
            ids::ENTITY_CREATE,
            vec![Field::U16(42), Field::Str("tank".to_string())],
        );
        world.handle_network_event(packet, &clock);
        assert!(world.entity(42).is_some());
        assert!(!world.is_local(42));
    }
}
