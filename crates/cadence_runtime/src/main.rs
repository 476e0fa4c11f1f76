//! Cadence Runtime
//!
//! Demo main loop: builds a world, pools and the scheduler from config,
//! runs a fixed number of simulation ticks and logs diagnostics.
//!
//! Usage: `cadence [config.json] [ticks]`

mod systems;

use anyhow::{Context, Result};
use cadence_core::config::CoreConfig;
use cadence_core::ecs::{
    ComponentPool, ComponentPoolManager, Entity, EntityPool, EntityPoolManager, Scheduler, World,
};
use cadence_core::time::{SimulationTime, TICK_DURATION};
use cadence_metrics::FrameTimer;
use glam::Vec2;
use std::sync::Arc;
use systems::{BoundsRenderer, Mover, Reaper, Spawner, Trail, TrailRecorder, Transform, Velocity};
use tracing_subscriber::EnvFilter;

const DEFAULT_TICKS: u64 = 600;

/// Ticks between projectile bursts, and how long a burst stays alive.
const BURST_INTERVAL: u64 = 30;
const BURST_LIFETIME: u64 = 20;
const BURST_SIZE: usize = 8;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    tracing::info!("Cadence v{}", cadence_core::VERSION);

    let mut args = std::env::args().skip(1);
    let config = match args.next() {
        Some(path) => CoreConfig::load(&path).with_context(|| format!("loading config from {path}"))?,
        None => CoreConfig::default(),
    };
    let ticks = match args.next() {
        Some(raw) => raw
            .parse::<u64>()
            .with_context(|| format!("tick count '{raw}' is not a number"))?,
        None => DEFAULT_TICKS,
    };

    systems::register_components();

    let mut world = World::with_cache_config(config.query_cache.clone());
    let entity_pools = EntityPoolManager::new(&mut world, config.entity_pool.clone());
    let projectiles = entity_pools
        .create_pool(&mut world, "projectiles", config.entity_pool.clone())
        .context("creating projectile pool")?;
    let component_pools = ComponentPoolManager::new(config.component_pool.clone());
    let trails = component_pools.pool::<Trail>();
    trails.prewarm(BURST_SIZE);

    let mut scheduler = Scheduler::with_config(config.scheduler.clone())?;
    scheduler.register(Spawner::descriptor(), Spawner::new(256, 16))?;
    scheduler.register(Mover::descriptor(), Mover)?;
    scheduler.register(Reaper::descriptor(), Reaper)?;
    scheduler.register(TrailRecorder::descriptor(), TrailRecorder)?;
    scheduler.register_render(BoundsRenderer::descriptor(), BoundsRenderer::default())?;
    scheduler.rebuild_execution_plan()?;

    tracing::info!("dependency graph:\n{}", scheduler.dependency_graph());
    tracing::info!("execution plan:\n{}", scheduler.execution_plan());

    let mut time = SimulationTime::new();
    let mut timer = FrameTimer::new(120).with_budget(TICK_DURATION);
    let mut bursts: Vec<(u64, Vec<Entity>)> = Vec::new();

    while time.tick_count() < ticks {
        // Headless: each frame hands the clock exactly one tick of time
        time.accumulate(TICK_DURATION);
        while time.try_tick() {
            let tick = time.tick_count();

            if tick % BURST_INTERVAL == 0 {
                let burst = fire_burst(&mut world, &projectiles, &trails, tick)?;
                bursts.push((tick + BURST_LIFETIME, burst));
            }
            bursts.retain(|(expires, burst)| {
                if *expires > tick {
                    return true;
                }
                recall_burst(&mut world, &projectiles, &trails, burst);
                false
            });

            timer.begin();
            let report = scheduler.execute_tick(&mut world, time.delta_seconds())?;
            timer.end();

            if report.systems_failed > 0 {
                tracing::warn!(tick, failed = report.systems_failed, "tick had failing systems");
            }
            tracing::trace!(tick, ?report, "tick complete");
        }
    }

    for (_, burst) in bursts.drain(..) {
        recall_burst(&mut world, &projectiles, &trails, &burst);
    }

    report(&world, &scheduler, &entity_pools, &component_pools, &timer);
    Ok(())
}

/// Acquire a ring of pooled projectiles, each carrying a pooled trail.
fn fire_burst(
    world: &mut World,
    projectiles: &Arc<EntityPool>,
    trails: &Arc<ComponentPool<Trail>>,
    tick: u64,
) -> Result<Vec<Entity>> {
    let mut burst = Vec::with_capacity(BURST_SIZE);
    for index in 0..BURST_SIZE {
        let entity = match projectiles.acquire(world) {
            Ok(entity) => entity,
            Err(err) => {
                tracing::warn!(tick, error = %err, "skipping projectile");
                continue;
            }
        };
        let heading = Vec2::from_angle(index as f32 / BURST_SIZE as f32 * std::f32::consts::TAU);
        world.insert_one(entity, Transform(Vec2::ZERO))?;
        world.insert_one(entity, Velocity(heading * 10.0))?;
        match trails.rent() {
            Ok(trail) => world.insert_one(entity, trail)?,
            Err(err) => tracing::warn!(tick, error = %err, "projectile without trail"),
        }
        burst.push(entity);
    }
    tracing::debug!(tick, fired = burst.len(), "fired projectile burst");
    Ok(burst)
}

/// Give trails back and return projectiles to their pool.
fn recall_burst(
    world: &mut World,
    projectiles: &Arc<EntityPool>,
    trails: &Arc<ComponentPool<Trail>>,
    burst: &[Entity],
) {
    for &entity in burst {
        if let Ok(trail) = world.remove_one::<Trail>(entity) {
            if let Err(err) = trails.give_back(trail) {
                tracing::error!(error = %err, "trail return rejected");
            }
        }
        if let Err(err) = projectiles.release(world, entity) {
            tracing::error!(?entity, error = %err, "projectile release rejected");
        }
    }
}

fn report(
    world: &World,
    scheduler: &Scheduler,
    entity_pools: &EntityPoolManager,
    component_pools: &ComponentPoolManager,
    timer: &FrameTimer,
) {
    tracing::info!(
        ticks = scheduler.ticks(),
        entities = world.len(),
        stages = scheduler.stage_count(),
        "simulation finished"
    );

    let cache = world.query_cache().statistics();
    tracing::info!(
        lookups = cache.lookups,
        hit_rate = %format!("{:.1}%", cache.hit_rate * 100.0),
        entries = cache.entries,
        evictions = cache.evictions,
        "query cache"
    );

    let pools = entity_pools.statistics();
    for stats in pools.pools.iter().chain(std::iter::once(&pools.total)) {
        tracing::info!(
            pool = %stats.name,
            available = stats.available,
            active = stats.active,
            created = stats.total_created,
            acquisitions = stats.total_acquisitions,
            reuse_rate = %format!("{:.2}", stats.reuse_rate),
            latency = ?stats.average_acquire_latency,
            "entity pool"
        );
    }
    for stats in component_pools.statistics() {
        tracing::info!(
            component = stats.component,
            available = stats.available,
            rented = stats.rented,
            created = stats.total_created,
            reuse_rate = %format!("{:.2}", stats.reuse_rate),
            "component pool"
        );
    }

    for name in scheduler.system_names() {
        let average = scheduler
            .system_timing(&name)
            .map(|timing| timing.average())
            .unwrap_or_default();
        tracing::info!(
            system = %name,
            failures = scheduler.failure_count(&name),
            average = ?average,
            "system"
        );
    }

    let (fastest, slowest) = timer.frame_time_range_ms();
    tracing::info!(
        fps = %format!("{:.0}", timer.fps()),
        frame_ms = %format!("{:.3}", timer.frame_time_ms()),
        fastest_ms = %format!("{fastest:.3}"),
        slowest_ms = %format!("{slowest:.3}"),
        overruns = timer.overruns(),
        "tick timing"
    );
}
