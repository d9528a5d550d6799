//! Renderer abstraction.
//!
//! The netcode core owns no rendering surface; each `Entity` carries
//! an opaque handle it ticks once per `World::update`. A real renderer
//! implementation lives entirely outside this crate.

/// Per-entity renderer hook. `NullRenderer` is used headlessly (and
/// exclusively on the server, which never draws).
pub trait RendererHandle: Send {
    fn tick(&mut self, dt: f32);
}

#[derive(Debug, Default)]
pub struct NullRenderer;

impl RendererHandle for NullRenderer {
    fn tick(&mut self, _dt: f32) {}
}
