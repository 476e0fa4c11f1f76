//! Demo gameplay components and systems driven by the scheduler.

use cadence_core::define_component;
use cadence_core::ecs::{
    Component, PoolReset, QuerySignature, RenderSystem, System, SystemContext, SystemDescriptor,
    SystemResult, World,
};
use glam::Vec2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform(pub Vec2);
define_component!(Transform, 1, "Transform");

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Velocity(pub Vec2);
define_component!(Velocity, 2, "Velocity");

/// Seconds left before the entity is destroyed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Lifetime(pub f32);
define_component!(Lifetime, 3, "Lifetime");

/// Recent positions of a pooled projectile.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Trail(pub Vec<Vec2>);
define_component!(Trail, 4, "Trail");

impl PoolReset for Trail {
    fn reset(&mut self) {
        self.0.clear();
    }
}

/// Keeps a wandering population topped up through deferred creates.
pub struct Spawner {
    pub target_population: usize,
    pub per_tick: usize,
    spawned: u64,
}

impl Spawner {
    pub fn new(target_population: usize, per_tick: usize) -> Self {
        Self {
            target_population,
            per_tick,
            spawned: 0,
        }
    }

    pub fn descriptor() -> SystemDescriptor {
        SystemDescriptor::new("Spawner").read::<Lifetime>().priority(0)
    }
}

impl System for Spawner {
    fn update(&mut self, ctx: &mut SystemContext<'_>) -> SystemResult {
        let alive = ctx
            .query(&QuerySignature::new().with::<Lifetime>())
            .entities
            .len();
        let missing = self.target_population.saturating_sub(alive).min(self.per_tick);

        let commands = ctx.commands();
        for _ in 0..missing {
            // Spread spawns around a circle so runs are reproducible
            let angle = self.spawned as f32 * 0.618_034 * std::f32::consts::TAU;
            let heading = Vec2::from_angle(angle);
            let entity = commands.record_create();
            commands.record_add(entity, Transform(Vec2::ZERO));
            commands.record_add(entity, Velocity(heading * 4.0));
            commands.record_add(entity, Lifetime(1.0 + (self.spawned % 5) as f32 * 0.5));
            self.spawned += 1;
        }
        Ok(())
    }
}

/// Integrates velocity into position.
pub struct Mover;

impl Mover {
    pub fn descriptor() -> SystemDescriptor {
        SystemDescriptor::new("Mover")
            .read::<Velocity>()
            .write::<Transform>()
            .priority(10)
    }
}

impl System for Mover {
    fn update(&mut self, ctx: &mut SystemContext<'_>) -> SystemResult {
        let dt = ctx.delta_time();
        for (_, (transform, velocity)) in ctx.world().query::<(&mut Transform, &Velocity)>().iter() {
            transform.0 += velocity.0 * dt;
        }
        Ok(())
    }
}

/// Counts lifetimes down and destroys expired entities.
pub struct Reaper;

impl Reaper {
    pub fn descriptor() -> SystemDescriptor {
        SystemDescriptor::new("Reaper").write::<Lifetime>().priority(20)
    }
}

impl System for Reaper {
    fn update(&mut self, ctx: &mut SystemContext<'_>) -> SystemResult {
        let dt = ctx.delta_time();
        for (entity, lifetime) in ctx.world().query::<&mut Lifetime>().iter() {
            lifetime.0 -= dt;
            if lifetime.0 <= 0.0 {
                ctx.commands().record_destroy(entity);
            }
        }
        Ok(())
    }
}

/// Appends the current position to every trail.
pub struct TrailRecorder;

impl TrailRecorder {
    pub fn descriptor() -> SystemDescriptor {
        SystemDescriptor::new("TrailRecorder")
            .read::<Transform>()
            .write::<Trail>()
            .priority(30)
    }
}

impl System for TrailRecorder {
    fn update(&mut self, ctx: &mut SystemContext<'_>) -> SystemResult {
        for (_, (transform, trail)) in ctx.world().query::<(&Transform, &mut Trail)>().iter() {
            trail.0.push(transform.0);
        }
        Ok(())
    }
}

/// Read-only summary of where things are.
#[derive(Default)]
pub struct BoundsRenderer {
    pub frames: u64,
}

impl BoundsRenderer {
    pub fn descriptor() -> SystemDescriptor {
        SystemDescriptor::new("BoundsRenderer")
            .read::<Transform>()
            .priority(100)
    }
}

impl RenderSystem for BoundsRenderer {
    fn render(&mut self, world: &World) -> SystemResult {
        let mut min = Vec2::splat(f32::INFINITY);
        let mut max = Vec2::splat(f32::NEG_INFINITY);
        let mut count = 0usize;
        for (_, transform) in world.query::<&Transform>().iter() {
            min = min.min(transform.0);
            max = max.max(transform.0);
            count += 1;
        }
        self.frames += 1;
        if count > 0 && self.frames % 60 == 0 {
            tracing::debug!(count, ?min, ?max, "render bounds");
        }
        Ok(())
    }
}

/// Registers every component the demo touches so names resolve in logs.
pub fn register_components() {
    Transform::ensure_registered();
    Velocity::ensure_registered();
    Lifetime::ensure_registered();
    Trail::ensure_registered();
}
