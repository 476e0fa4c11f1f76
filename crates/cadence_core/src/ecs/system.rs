// system.rs - The update contract systems implement
//
// A system sees the world through `&World` and writes only the components
// it declared. Structural changes go into the command buffer handed to it
// for the tick; the scheduler plays that buffer back after the stage.

use crate::ecs::{CacheLookup, CommandBuffer, QuerySignature, World};

/// Error type systems report failures with.
pub type SystemError = Box<dyn std::error::Error + Send + Sync>;

pub type SystemResult = Result<(), SystemError>;

/// Everything a system may touch during one update.
pub struct SystemContext<'a> {
    world: &'a World,
    commands: &'a CommandBuffer,
    delta_time: f32,
    system_name: &'a str,
}

impl<'a> SystemContext<'a> {
    pub fn new(
        world: &'a World,
        commands: &'a CommandBuffer,
        delta_time: f32,
        system_name: &'a str,
    ) -> Self {
        Self {
            world,
            commands,
            delta_time,
            system_name,
        }
    }

    pub fn world(&self) -> &'a World {
        self.world
    }

    /// Buffer for structural changes, played back after the stage.
    pub fn commands(&self) -> &'a CommandBuffer {
        self.commands
    }

    /// Seconds since the previous tick.
    pub fn delta_time(&self) -> f32 {
        self.delta_time
    }

    pub fn system_name(&self) -> &'a str {
        self.system_name
    }

    /// Entities matching `signature`, through the world's query cache.
    pub fn query(&self, signature: &QuerySignature) -> CacheLookup {
        self.world.query_cached(signature)
    }
}

/// Game logic run once per tick by the scheduler.
pub trait System: Send {
    fn update(&mut self, ctx: &mut SystemContext<'_>) -> SystemResult;
}

/// Read-only presentation pass. Render systems are scheduled with an empty
/// write set and never receive a command buffer.
pub trait RenderSystem: Send {
    fn render(&mut self, world: &World) -> SystemResult;
}

/// Runs a [`RenderSystem`] through the regular update contract.
pub(crate) struct RenderAdapter<R>(pub(crate) R);

impl<R: RenderSystem> System for RenderAdapter<R> {
    fn update(&mut self, ctx: &mut SystemContext<'_>) -> SystemResult {
        self.0.render(ctx.world())
    }
}

/// Closure adapter for systems that keep no state of their own.
pub struct FnSystem<F>(F);

impl<F> FnSystem<F>
where
    F: FnMut(&mut SystemContext<'_>) -> SystemResult + Send,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> System for FnSystem<F>
where
    F: FnMut(&mut SystemContext<'_>) -> SystemResult + Send,
{
    fn update(&mut self, ctx: &mut SystemContext<'_>) -> SystemResult {
        (self.0)(ctx)
    }
}
