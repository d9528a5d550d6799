//! Replication-side entity model and constructor registry.

use std::collections::HashMap;

use crate::render::{NullRenderer, RendererHandle};
use crate::world::World;

pub type EntityId = u16;

/// Physics state carried by every entity: position is double
/// precision (matching the reference's float64 world coordinates),
/// velocity/rotation are single precision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Physics {
    pub position: (f64, f64),
    pub velocity: (f32, f32),
    pub rotation: f32,
    pub angular_velocity: f32,
}

impl Default for Physics {
    fn default() -> Self {
        Self {
            position: (0.0, 0.0),
            velocity: (0.0, 0.0),
            rotation: 0.0,
            angular_velocity: 0.0,
        }
    }
}

/// A replicated entity. Identity is `id`; `type_tag` is the 16-byte
/// (NUL-trimmed) ASCII tag used on the wire by `EntityCreate`.
pub struct Entity {
    pub id: EntityId,
    pub type_tag: String,
    pub physics: Physics,
    pub renderer: Box<dyn RendererHandle>,
}

impl Entity {
    pub fn new(id: EntityId, type_tag: impl Into<String>, physics: Physics) -> Self {
        Self {
            id,
            type_tag: type_tag.into(),
            physics,
            renderer: Box::new(NullRenderer),
        }
    }

    pub fn with_renderer(mut self, renderer: Box<dyn RendererHandle>) -> Self {
        self.renderer = renderer;
        self
    }

    /// Authoritative integration step: `position += velocity*dt`,
    /// `velocity *= (1 - drag*dt)`, `drag = 0.1`.
    pub fn integrate(&mut self, dt: f32) {
        const DRAG: f32 = 0.1;
        self.physics.position.0 += self.physics.velocity.0 as f64 * dt as f64;
        self.physics.position.1 += self.physics.velocity.1 as f64 * dt as f64;
        let damping = 1.0 - DRAG * dt;
        self.physics.velocity.0 *= damping;
        self.physics.velocity.1 *= damping;
    }
}

/// Constructs an `Entity` of a registered type at a given id and
/// initial position. Receives the `World` it's being spawned into so
/// constructors can consult existing state (spawn point selection,
/// team balance, etc).
pub type EntityConstructor = fn(id: EntityId, world: &World, initial_position: (f64, f64)) -> Entity;

/// Builder-populated, frozen-after-`build` constructor table keyed by
/// type tag — replaces the reference's mutable string-keyed registry
/// dict with a table that can no longer be mutated once the world
/// starts.
#[derive(Default)]
pub struct EntityRegistryBuilder {
    definitions: HashMap<String, EntityConstructor>,
}

impl EntityRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, type_tag: impl Into<String>, constructor: EntityConstructor) -> Self {
        self.definitions.insert(type_tag.into(), constructor);
        self
    }

    pub fn build(self) -> EntityRegistry {
        EntityRegistry {
            definitions: self.definitions,
        }
    }
}

/// Immutable entity constructor table.
pub struct EntityRegistry {
    definitions: HashMap<String, EntityConstructor>,
}

impl EntityRegistry {
    pub fn get_instance(
        &self,
        id: EntityId,
        type_tag: &str,
        initial_position: (f64, f64),
        world: &World,
    ) -> Option<Entity> {
        self.definitions
            .get(type_tag)
            .map(|ctor| ctor(id, world, initial_position))
    }

    pub fn is_registered(&self, type_tag: &str) -> bool {
        self.definitions.contains_key(type_tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_tank(id: EntityId, _world: &World, pos: (f64, f64)) -> Entity {
        Entity::new(id, "tank", Physics { position: pos, ..Default::default() })
    }

    fn empty_world() -> World {
        World::new(EntityRegistryBuilder::new().build(), false)
    }

    #[test]
    fn registry_builds_registered_entity() {
        let registry = EntityRegistryBuilder::new()
            .register("tank", make_tank as EntityConstructor)
            .build();
        let world = empty_world();
        let e = registry.get_instance(7, "tank", (1.0, 2.0), &world).unwrap();
        assert_eq!(e.id, 7);
        assert_eq!(e.physics.position, (1.0, 2.0));
    }

    #[test]
    fn registry_rejects_unknown_tag() {
        let registry = EntityRegistryBuilder::new().build();
        let world = empty_world();
        assert!(registry.get_instance(1, "ghost", (0.0, 0.0), &world).is_none());
    }

    #[test]
    fn integrate_applies_drag() {
        let world = empty_world();
        let mut e = make_tank(1, &world, (0.0, 0.0));
        e.physics.velocity = (10.0, 0.0);
        e.integrate(1.0);
        assert_eq!(e.physics.position.0, 10.0);
        assert!((e.physics.velocity.0 - 9.0).abs() < 1e-6);
    }
}
