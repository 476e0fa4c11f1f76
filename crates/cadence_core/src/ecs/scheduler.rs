//! # Scheduler
//!
//! Orders registered systems into stages from their declared access and
//! runs each stage in parallel.
//!
//! ## Planning
//! [`Scheduler::rebuild_execution_plan`] derives a dependency graph:
//! - two systems writing a common component are ordered by
//!   `(priority, registration order)`;
//! - otherwise a system that writes a component precedes every system
//!   reading it.
//!
//! Systems with disjoint writes that read each other's writes form a cycle,
//! which fails the rebuild. The graph is sorted topologically (ties broken by priority,
//! then registration order) and each system is placed in the earliest stage
//! after all its predecessors whose members it does not conflict with.
//!
//! ## Execution
//! Stages run one after another. Within a stage every enabled system runs
//! on the worker pool with its own command buffer. When the stage is done
//! the buffers are played back one at a time in stage order, and the query
//! cache is invalidated once if anything applied. A failing or panicking
//! system is logged and counted; its buffer is discarded and everything
//! else proceeds.

use crate::config::SchedulerConfig;
use crate::ecs::system::RenderAdapter;
use crate::ecs::system_registry::{RegisteredSystem, SystemRegistry};
use crate::ecs::{
    name_of, CommandBuffer, CommandBufferPool, ComponentId, FnSystem, PlaybackReport,
    RenderSystem, System, SystemContext, SystemDescriptor, SystemHandle,
    SystemRegistrationError, SystemResult, World,
};
use cadence_metrics::{SystemProfiler, SystemTiming};
use rayon::prelude::*;
use std::any::Any;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::PoisonError;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("system dependency cycle between: {}", systems.join(", "))]
    DependencyCycle { systems: Vec<String> },

    #[error("execution plan is out of date; call rebuild_execution_plan first")]
    PlanNotBuilt,

    #[error("last plan rebuild failed; fix the registered systems and rebuild")]
    PlanInvalid,

    #[error(transparent)]
    Registration(#[from] SystemRegistrationError),

    #[error("failed to start scheduler worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

/// One node of the dependency graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphNode {
    pub handle: SystemHandle,
    pub name: String,
    pub priority: i32,
    pub reads: Vec<ComponentId>,
    pub writes: Vec<ComponentId>,
    /// Indices of nodes that must run after this one.
    pub successors: Vec<usize>,
}

/// "A must precede B" relation over the registered systems.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    /// Ordered by `(priority, registration order)`.
    pub nodes: Vec<GraphNode>,
}

impl DependencyGraph {
    fn build(registry: &SystemRegistry) -> Self {
        let mut systems: Vec<&RegisteredSystem> = registry.iter().collect();
        systems.sort_by_key(|system| (system.descriptor.priority_value(), system.handle));

        let mut nodes: Vec<GraphNode> = systems
            .iter()
            .map(|system| GraphNode {
                handle: system.handle,
                name: system.descriptor.name().to_string(),
                priority: system.descriptor.priority_value(),
                reads: system.descriptor.read_components().to_vec(),
                writes: system.descriptor.write_components().to_vec(),
                successors: Vec::new(),
            })
            .collect();

        for i in 0..systems.len() {
            for j in (i + 1)..systems.len() {
                let (a, b) = (&systems[i].descriptor, &systems[j].descriptor);
                if a.shares_writes_with(b) {
                    // Both mutate the same data: priority order alone decides
                    nodes[i].successors.push(j);
                    continue;
                }
                if a.feeds(b) {
                    nodes[i].successors.push(j);
                }
                if b.feeds(a) {
                    nodes[j].successors.push(i);
                }
            }
        }
        Self { nodes }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Kahn's algorithm, always taking the ready node that sorts first.
    fn topological_order(&self) -> Result<Vec<usize>, SchedulerError> {
        let mut in_degree = vec![0usize; self.nodes.len()];
        for node in &self.nodes {
            for &next in &node.successors {
                in_degree[next] += 1;
            }
        }

        // Node indices already follow (priority, registration) order.
        let mut ready: BinaryHeap<Reverse<usize>> = in_degree
            .iter()
            .enumerate()
            .filter(|&(_, &degree)| degree == 0)
            .map(|(index, _)| Reverse(index))
            .collect();

        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(Reverse(index)) = ready.pop() {
            order.push(index);
            for &next in &self.nodes[index].successors {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    ready.push(Reverse(next));
                }
            }
        }

        if order.len() < self.nodes.len() {
            let systems = in_degree
                .iter()
                .enumerate()
                .filter(|&(_, &degree)| degree > 0)
                .map(|(index, _)| self.nodes[index].name.clone())
                .collect();
            return Err(SchedulerError::DependencyCycle { systems });
        }
        Ok(order)
    }
}

impl fmt::Display for DependencyGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for node in &self.nodes {
            writeln!(
                f,
                "{} (priority {}) reads [{}] writes [{}]",
                node.name,
                node.priority,
                component_list(&node.reads),
                component_list(&node.writes)
            )?;
            for &next in &node.successors {
                writeln!(f, "  -> {}", self.nodes[next].name)?;
            }
        }
        Ok(())
    }
}

fn component_list(ids: &[ComponentId]) -> String {
    ids.iter().map(|&id| name_of(id)).collect::<Vec<_>>().join(", ")
}

/// Systems proven safe to run together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    pub systems: Vec<SystemHandle>,
    pub names: Vec<String>,
}

/// Stages in execution order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionPlan {
    pub stages: Vec<Stage>,
}

impl ExecutionPlan {
    fn build(graph: &DependencyGraph, registry: &SystemRegistry) -> Result<Self, SchedulerError> {
        let order = graph.topological_order()?;

        let mut predecessors: Vec<Vec<usize>> = vec![Vec::new(); graph.nodes.len()];
        for (index, node) in graph.nodes.iter().enumerate() {
            for &next in &node.successors {
                predecessors[next].push(index);
            }
        }

        let descriptor = |index: usize| registry.descriptor(graph.nodes[index].handle);
        let mut stage_of = vec![0usize; graph.nodes.len()];
        let mut members: Vec<Vec<usize>> = Vec::new();

        for index in order {
            let earliest = predecessors[index]
                .iter()
                .map(|&pred| stage_of[pred] + 1)
                .max()
                .unwrap_or(0);

            let fits = |stage: &Vec<usize>| {
                stage.iter().all(|&other| match (descriptor(index), descriptor(other)) {
                    (Some(a), Some(b)) => !a.conflicts_with(b),
                    _ => false,
                })
            };
            let stage = (earliest..members.len())
                .find(|&stage| fits(&members[stage]))
                .unwrap_or_else(|| {
                    members.resize_with(members.len().max(earliest) + 1, Vec::new);
                    members.len() - 1
                });
            stage_of[index] = stage;
            members[stage].push(index);
        }

        let stages = members
            .into_iter()
            .filter(|stage| !stage.is_empty())
            .map(|mut stage| {
                // Index order is (priority, registration) order.
                stage.sort_unstable();
                Stage {
                    systems: stage.iter().map(|&i| graph.nodes[i].handle).collect(),
                    names: stage.iter().map(|&i| graph.nodes[i].name.clone()).collect(),
                }
            })
            .collect();
        Ok(Self { stages })
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Stage index of the named system.
    pub fn stage_of(&self, name: &str) -> Option<usize> {
        self.stages
            .iter()
            .position(|stage| stage.names.iter().any(|member| member == name))
    }
}

impl fmt::Display for ExecutionPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, stage) in self.stages.iter().enumerate() {
            writeln!(f, "Stage {}: [{}]", index, stage.names.join(", "))?;
        }
        Ok(())
    }
}

enum PlanState {
    Unbuilt,
    Built(ExecutionPlan),
    Failed,
}

/// Counters for one [`Scheduler::execute_tick`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub stages: usize,
    pub systems_run: usize,
    pub systems_failed: usize,
    pub commands_applied: usize,
    pub commands_failed: usize,
    pub invalidations: usize,
}

struct SystemOutcome {
    result: Result<(), String>,
    elapsed: Duration,
}

/// Dependency-ordered parallel system runner.
pub struct Scheduler {
    config: SchedulerConfig,
    registry: SystemRegistry,
    plan: PlanState,
    graph: DependencyGraph,
    workers: Option<rayon::ThreadPool>,
    buffers: CommandBufferPool,
    failures: HashMap<String, u64>,
    profiler: SystemProfiler,
    ticks: u64,
}

impl Scheduler {
    /// Scheduler running stages on the global rayon pool.
    pub fn new() -> Self {
        let config = SchedulerConfig::default();
        Self {
            buffers: CommandBufferPool::new(config.command_buffer_pool_capacity),
            config,
            registry: SystemRegistry::new(),
            plan: PlanState::Unbuilt,
            graph: DependencyGraph::default(),
            workers: None,
            failures: HashMap::new(),
            profiler: SystemProfiler::new(),
            ticks: 0,
        }
    }

    /// Scheduler with a dedicated worker pool when `worker_threads` is set.
    pub fn with_config(config: SchedulerConfig) -> Result<Self, SchedulerError> {
        let workers = match config.worker_threads {
            Some(threads) => Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .thread_name(|index| format!("cadence-worker-{index}"))
                    .build()?,
            ),
            None => None,
        };
        Ok(Self {
            buffers: CommandBufferPool::new(config.command_buffer_pool_capacity),
            config,
            workers,
            ..Self::new()
        })
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------

    /// Add a system. The plan must be rebuilt before the next tick.
    pub fn register<S: System + 'static>(
        &mut self,
        descriptor: SystemDescriptor,
        system: S,
    ) -> Result<SystemHandle, SystemRegistrationError> {
        self.register_boxed(descriptor, Box::new(system))
    }

    pub fn register_boxed(
        &mut self,
        descriptor: SystemDescriptor,
        system: Box<dyn System>,
    ) -> Result<SystemHandle, SystemRegistrationError> {
        let name = descriptor.name().to_string();
        let handle = self.registry.register(descriptor, system)?;
        self.plan = PlanState::Unbuilt;
        tracing::debug!(system = %name, %handle, "registered system");
        Ok(handle)
    }

    /// Register a closure as a system.
    pub fn register_fn<F>(
        &mut self,
        descriptor: SystemDescriptor,
        f: F,
    ) -> Result<SystemHandle, SystemRegistrationError>
    where
        F: FnMut(&mut SystemContext<'_>) -> SystemResult + Send + 'static,
    {
        self.register(descriptor, FnSystem::new(f))
    }

    /// Register a read-only presentation system. Any write set on
    /// `descriptor` is dropped.
    pub fn register_render<R: RenderSystem + 'static>(
        &mut self,
        descriptor: SystemDescriptor,
        system: R,
    ) -> Result<SystemHandle, SystemRegistrationError> {
        let descriptor = descriptor.writes(std::iter::empty());
        self.register(descriptor, RenderAdapter(system))
    }

    pub fn unregister(&mut self, name: &str) -> Result<SystemHandle, SystemRegistrationError> {
        let handle = self.registry.unregister(name)?;
        self.plan = PlanState::Unbuilt;
        self.profiler.remove(name);
        self.failures.remove(name);
        tracing::debug!(system = name, %handle, "unregistered system");
        Ok(handle)
    }

    /// Skip or resume a system without touching the plan.
    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> Result<(), SystemRegistrationError> {
        self.registry.set_enabled(name, enabled)
    }

    pub fn is_enabled(&self, name: &str) -> Option<bool> {
        let handle = self.registry.handle_of(name).ok()?;
        self.registry
            .descriptor(handle)
            .map(SystemDescriptor::is_enabled)
    }

    /// Registered system names in registration order.
    pub fn system_names(&self) -> Vec<String> {
        self.registry
            .iter()
            .map(|system| system.descriptor.name().to_string())
            .collect()
    }

    pub fn system_count(&self) -> usize {
        self.registry.len()
    }

    // ------------------------------------------------------------------
    // Planning
    // ------------------------------------------------------------------

    /// Recompute the dependency graph and stage assignment.
    ///
    /// On a cycle the scheduler refuses to tick until a later rebuild
    /// succeeds.
    pub fn rebuild_execution_plan(&mut self) -> Result<&ExecutionPlan, SchedulerError> {
        self.graph = DependencyGraph::build(&self.registry);
        match ExecutionPlan::build(&self.graph, &self.registry) {
            Ok(plan) => {
                tracing::info!(
                    systems = self.registry.len(),
                    stages = plan.stage_count(),
                    "rebuilt execution plan"
                );
                tracing::debug!("execution plan:\n{plan}");
                self.plan = PlanState::Built(plan);
                match &self.plan {
                    PlanState::Built(plan) => Ok(plan),
                    _ => Err(SchedulerError::PlanInvalid),
                }
            }
            Err(err) => {
                tracing::error!(error = %err, "execution plan rebuild failed");
                self.plan = PlanState::Failed;
                Err(err)
            }
        }
    }

    /// The current plan, if built.
    pub fn plan(&self) -> Option<&ExecutionPlan> {
        match &self.plan {
            PlanState::Built(plan) => Some(plan),
            _ => None,
        }
    }

    pub fn is_built(&self) -> bool {
        matches!(self.plan, PlanState::Built(_))
    }

    pub fn stage_count(&self) -> usize {
        self.plan().map_or(0, ExecutionPlan::stage_count)
    }

    /// Human-readable "A must precede B" dump of the registered systems.
    pub fn dependency_graph(&self) -> String {
        DependencyGraph::build(&self.registry).to_string()
    }

    /// Human-readable stage listing.
    pub fn execution_plan(&self) -> String {
        match &self.plan {
            PlanState::Built(plan) => plan.to_string(),
            PlanState::Unbuilt => "<not built>\n".to_string(),
            PlanState::Failed => "<invalid: last rebuild failed>\n".to_string(),
        }
    }

    // ------------------------------------------------------------------
    // Execution
    // ------------------------------------------------------------------

    /// Run every stage of the current plan once.
    pub fn execute_tick(
        &mut self,
        world: &mut World,
        delta_time: f32,
    ) -> Result<TickReport, SchedulerError> {
        let plan = match &self.plan {
            PlanState::Built(plan) => plan,
            PlanState::Unbuilt => return Err(SchedulerError::PlanNotBuilt),
            PlanState::Failed => return Err(SchedulerError::PlanInvalid),
        };

        self.ticks += 1;
        let mut report = TickReport::default();

        for (stage_index, stage) in plan.stages.iter().enumerate() {
            let members: Vec<&RegisteredSystem> = stage
                .systems
                .iter()
                .filter_map(|&handle| self.registry.get(handle))
                .filter(|system| system.descriptor.is_enabled())
                .collect();
            if members.is_empty() {
                continue;
            }
            report.stages += 1;

            let buffers: Vec<CommandBuffer> =
                members.iter().map(|_| self.buffers.rent(world)).collect();

            let shared: &World = world;
            let run = || {
                members
                    .par_iter()
                    .zip(buffers.par_iter())
                    .map(|(system, commands)| run_system(system, shared, commands, delta_time))
                    .collect::<Vec<SystemOutcome>>()
            };
            let outcomes = match &self.workers {
                Some(pool) => pool.install(run),
                None => run(),
            };

            let mut stage_report = PlaybackReport::default();
            for ((system, commands), outcome) in members.iter().zip(buffers).zip(outcomes) {
                let name = system.descriptor.name();
                self.profiler.record(name, outcome.elapsed);
                report.systems_run += 1;

                match outcome.result {
                    Ok(()) => match commands.apply_deferred(world) {
                        Ok(playback) => stage_report.absorb(playback),
                        Err(err) => {
                            tracing::error!(system = name, stage = stage_index, error = %err, "command playback rejected");
                        }
                    },
                    Err(message) => {
                        report.systems_failed += 1;
                        *self.failures.entry(name.to_string()).or_insert(0) += 1;
                        tracing::error!(
                            system = name,
                            stage = stage_index,
                            tick = self.ticks,
                            error = %message,
                            "system failed; discarding its commands"
                        );
                    }
                }
                self.buffers.recycle(commands);
            }

            report.commands_applied += stage_report.applied;
            report.commands_failed += stage_report.failed;
            if stage_report.changed_structure() {
                world.query_cache().invalidate();
                report.invalidations += 1;
            }
            tracing::trace!(stage = stage_index, applied = stage_report.applied, "stage complete");
        }

        Ok(report)
    }

    /// Ticks executed since construction.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Times `name` failed or panicked.
    pub fn failure_count(&self, name: &str) -> u64 {
        self.failures.get(name).copied().unwrap_or(0)
    }

    /// Accumulated update time of `name`.
    pub fn system_timing(&self, name: &str) -> Option<SystemTiming> {
        self.profiler.timing(name)
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

fn run_system(
    system: &RegisteredSystem,
    world: &World,
    commands: &CommandBuffer,
    delta_time: f32,
) -> SystemOutcome {
    let started = Instant::now();
    let name = system.descriptor.name();
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        let mut system = system.system.lock().unwrap_or_else(PoisonError::into_inner);
        let mut ctx = SystemContext::new(world, commands, delta_time, name);
        system.update(&mut ctx)
    }));
    let result = match result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(err.to_string()),
        Err(payload) => Err(format!("panicked: {}", panic_message(&*payload))),
    };
    SystemOutcome {
        result,
        elapsed: started.elapsed(),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "<non-string panic payload>"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::{Component, Entity, QuerySignature};
    use crate::{define_component, spawn};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Clone, Copy, Debug, PartialEq)]
    struct Position(f32);
    define_component!(Position, 9_700, "Position");

    #[derive(Clone, Copy, Debug, PartialEq)]
    struct Velocity(f32);
    define_component!(Velocity, 9_701, "Velocity");

    #[derive(Clone, Copy, Debug, PartialEq)]
    struct Health(i32);
    define_component!(Health, 9_702, "Health");

    #[derive(Clone, Copy, Debug, PartialEq)]
    struct Sprite;
    define_component!(Sprite, 9_703, "Sprite");

    fn ok(_ctx: &mut SystemContext<'_>) -> SystemResult {
        Ok(())
    }

    struct Mover;

    impl System for Mover {
        fn update(&mut self, ctx: &mut SystemContext<'_>) -> SystemResult {
            let dt = ctx.delta_time();
            for (_, (position, velocity)) in ctx.world().query::<(&mut Position, &Velocity)>().iter() {
                position.0 += velocity.0 * dt;
            }
            Ok(())
        }
    }

    struct Renderer {
        seen: Arc<AtomicUsize>,
    }

    impl RenderSystem for Renderer {
        fn render(&mut self, world: &World) -> SystemResult {
            let visible = world.query::<&Position>().iter().count();
            self.seen.store(visible, Ordering::SeqCst);
            Ok(())
        }
    }

    fn mover_renderer() -> (Scheduler, Arc<AtomicUsize>) {
        let seen = Arc::new(AtomicUsize::new(0));
        let mut scheduler = Scheduler::new();
        scheduler
            .register(
                SystemDescriptor::new("Mover")
                    .read::<Velocity>()
                    .write::<Position>()
                    .priority(10),
                Mover,
            )
            .unwrap();
        scheduler
            .register_render(
                SystemDescriptor::new("Renderer").read::<Position>().priority(20),
                Renderer {
                    seen: Arc::clone(&seen),
                },
            )
            .unwrap();
        (scheduler, seen)
    }

    #[test]
    fn writer_and_reader_land_in_consecutive_stages() {
        let (mut scheduler, _) = mover_renderer();
        let plan = scheduler.rebuild_execution_plan().unwrap().clone();

        assert_eq!(plan.stage_count(), 2);
        assert_eq!(plan.stages[0].names, vec!["Mover"]);
        assert_eq!(plan.stages[1].names, vec!["Renderer"]);
        assert_eq!(scheduler.execution_plan(), "Stage 0: [Mover]\nStage 1: [Renderer]\n");

        let graph = scheduler.dependency_graph();
        assert!(graph.contains("Mover"));
        assert!(graph.contains("Renderer"));
        assert!(graph.contains("  -> Renderer"));
        assert!(graph.contains("writes [Position]"));
    }

    #[test]
    fn writer_runs_first_even_with_higher_priority_value() {
        let mut scheduler = Scheduler::new();
        scheduler
            .register_fn(SystemDescriptor::new("reader").reads([1]).priority(-100), ok)
            .unwrap();
        scheduler
            .register_fn(SystemDescriptor::new("writer").writes([1]).priority(100), ok)
            .unwrap();
        let plan = scheduler.rebuild_execution_plan().unwrap();
        assert_eq!(plan.stage_of("writer"), Some(0));
        assert_eq!(plan.stage_of("reader"), Some(1));
    }

    #[test]
    fn mutual_read_after_write_is_a_cycle() {
        let mut scheduler = Scheduler::new();
        scheduler
            .register_fn(SystemDescriptor::new("A").writes([1]).reads([2]), ok)
            .unwrap();
        scheduler
            .register_fn(SystemDescriptor::new("B").writes([2]).reads([1]), ok)
            .unwrap();

        match scheduler.rebuild_execution_plan() {
            Err(SchedulerError::DependencyCycle { systems }) => {
                assert_eq!(systems, vec!["A".to_string(), "B".to_string()]);
            }
            other => panic!("expected a cycle, got {other:?}"),
        }
        assert!(!scheduler.is_built());

        let mut world = World::new();
        assert!(matches!(
            scheduler.execute_tick(&mut world, 0.016),
            Err(SchedulerError::PlanInvalid)
        ));
        assert!(scheduler.execution_plan().contains("invalid"));

        scheduler.unregister("B").unwrap();
        assert!(matches!(
            scheduler.execute_tick(&mut world, 0.016),
            Err(SchedulerError::PlanNotBuilt)
        ));
        scheduler.rebuild_execution_plan().unwrap();
        assert!(scheduler.execute_tick(&mut world, 0.016).is_ok());
    }

    #[test]
    fn registration_invalidates_the_plan() {
        let (mut scheduler, _) = mover_renderer();
        scheduler.rebuild_execution_plan().unwrap();
        assert!(scheduler.is_built());

        scheduler
            .register_fn(SystemDescriptor::new("Audio").reads([42]), ok)
            .unwrap();
        assert!(!scheduler.is_built());
        let mut world = World::new();
        assert!(matches!(
            scheduler.execute_tick(&mut world, 0.0),
            Err(SchedulerError::PlanNotBuilt)
        ));
    }

    #[test]
    fn stages_never_hold_conflicting_systems() {
        let mut scheduler = Scheduler::new();
        // Deterministic pseudo-random access sets over 6 components
        let mut seed = 0x2545_f491_u32;
        let mut next = || {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            seed
        };
        // Writers only feed higher levels, so the graph is acyclic
        for index in 0..24u32 {
            let level = next() % 6;
            let reads: Vec<ComponentId> = (0..level).filter(|_| next() % 2 == 0).collect();
            let mut writes = vec![100 + index];
            if next() % 2 == 0 {
                writes.push(level);
            }
            let descriptor = SystemDescriptor::new(format!("s{index}"))
                .reads(reads)
                .writes(writes)
                .priority((next() % 4) as i32);
            scheduler.register_fn(descriptor, ok).unwrap();
        }

        let plan = scheduler.rebuild_execution_plan().unwrap().clone();

        let descriptors: Vec<SystemDescriptor> = scheduler
            .registry
            .iter()
            .map(|system| system.descriptor.clone())
            .collect();
        let find = |name: &str| descriptors.iter().find(|d| d.name() == name).unwrap();
        for stage in &plan.stages {
            for (i, a) in stage.names.iter().enumerate() {
                for b in &stage.names[i + 1..] {
                    assert!(!find(a).conflicts_with(find(b)), "{a} and {b} share a stage");
                }
            }
        }
        for a in &descriptors {
            for b in &descriptors {
                if a.feeds(b) && !a.shares_writes_with(b) {
                    assert!(plan.stage_of(a.name()) < plan.stage_of(b.name()));
                }
            }
        }
        let placed: usize = plan.stages.iter().map(|stage| stage.names.len()).sum();
        assert_eq!(placed, 24);
    }

    #[test]
    fn independent_systems_share_a_stage_in_priority_order() {
        let mut scheduler = Scheduler::new();
        scheduler
            .register_fn(SystemDescriptor::new("late").reads([1]).priority(5), ok)
            .unwrap();
        scheduler
            .register_fn(SystemDescriptor::new("early").reads([1]).priority(1), ok)
            .unwrap();
        scheduler
            .register_fn(SystemDescriptor::new("solo").writes([2]).priority(3), ok)
            .unwrap();
        let plan = scheduler.rebuild_execution_plan().unwrap();
        assert_eq!(plan.stage_count(), 1);
        assert_eq!(plan.stages[0].names, vec!["early", "solo", "late"]);
    }

    #[test]
    fn write_only_collisions_follow_priority() {
        let mut scheduler = Scheduler::new();
        scheduler
            .register_fn(SystemDescriptor::new("second").writes([1]).priority(2), ok)
            .unwrap();
        scheduler
            .register_fn(SystemDescriptor::new("first").writes([1]).priority(1), ok)
            .unwrap();
        let plan = scheduler.rebuild_execution_plan().unwrap();
        assert_eq!(plan.stage_of("first"), Some(0));
        assert_eq!(plan.stage_of("second"), Some(1));
    }

    #[test]
    fn read_modify_write_pairs_follow_priority() {
        let mut scheduler = Scheduler::new();
        scheduler
            .register_fn(
                SystemDescriptor::new("Regen").reads([Health::ID]).writes([Health::ID]).priority(2),
                |ctx| {
                    for (_, health) in ctx.world().query::<&mut Health>().iter() {
                        health.0 += 1;
                    }
                    Ok(())
                },
            )
            .unwrap();
        scheduler
            .register_fn(
                SystemDescriptor::new("Damage").reads([Health::ID]).writes([Health::ID]).priority(1),
                |ctx| {
                    for (_, health) in ctx.world().query::<&mut Health>().iter() {
                        health.0 = (health.0 - 5).max(0);
                    }
                    Ok(())
                },
            )
            .unwrap();

        scheduler.rebuild_execution_plan().unwrap();
        assert_eq!(scheduler.execution_plan(), "Stage 0: [Damage]\nStage 1: [Regen]\n");

        let mut world = World::new();
        let entity = spawn!(world, Health(3));
        scheduler.execute_tick(&mut world, 0.0).unwrap();
        // Damage clamps to zero before Regen adds one
        assert_eq!(*world.get::<Health>(entity).unwrap(), Health(1));
    }

    #[test]
    fn tick_moves_then_renders() {
        let (mut scheduler, seen) = mover_renderer();
        scheduler.rebuild_execution_plan().unwrap();
        let mut world = World::new();
        let entity = spawn!(world, Position(0.0), Velocity(2.0), Sprite);
        spawn!(world, Position(5.0));

        let report = scheduler.execute_tick(&mut world, 0.5).unwrap();
        assert_eq!(report.stages, 2);
        assert_eq!(report.systems_run, 2);
        assert_eq!(report.systems_failed, 0);
        assert_eq!(report.invalidations, 0);
        assert_eq!(*world.get::<Position>(entity).unwrap(), Position(1.0));
        assert_eq!(seen.load(Ordering::SeqCst), 2);
        assert_eq!(scheduler.ticks(), 1);
    }

    #[test]
    fn failing_and_panicking_systems_are_isolated() {
        let mut scheduler = Scheduler::new();
        let survivors = Arc::new(AtomicUsize::new(0));

        scheduler
            .register_fn(SystemDescriptor::new("panics").writes([Health::ID]), |ctx| {
                ctx.commands().record_create();
                panic!("boom");
            })
            .unwrap();
        scheduler
            .register_fn(SystemDescriptor::new("errors").reads([Velocity::ID]), |ctx| {
                ctx.commands().record_create();
                Err("not today".into())
            })
            .unwrap();
        let counter = Arc::clone(&survivors);
        scheduler
            .register_fn(SystemDescriptor::new("sibling").reads([Sprite::ID]), move |ctx| {
                counter.fetch_add(1, Ordering::SeqCst);
                let id = ctx.commands().record_create();
                ctx.commands().record_add(id, Sprite);
                Ok(())
            })
            .unwrap();
        let counter = Arc::clone(&survivors);
        scheduler
            .register_fn(
                SystemDescriptor::new("later").reads([Health::ID]),
                move |_ctx| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                },
            )
            .unwrap();
        scheduler.rebuild_execution_plan().unwrap();
        assert_eq!(scheduler.stage_count(), 2);

        let mut world = World::new();
        for _ in 0..3 {
            let report = scheduler.execute_tick(&mut world, 0.016).unwrap();
            assert_eq!(report.systems_run, 4);
            assert_eq!(report.systems_failed, 2);
            assert_eq!(report.commands_applied, 2);
        }

        assert_eq!(survivors.load(Ordering::SeqCst), 6);
        // Only the healthy sibling's spawns reached the world
        assert_eq!(world.len(), 3);
        assert_eq!(world.matching(&QuerySignature::new().with::<Sprite>()).len(), 3);
        assert_eq!(scheduler.failure_count("panics"), 3);
        assert_eq!(scheduler.failure_count("errors"), 3);
        assert_eq!(scheduler.failure_count("sibling"), 0);
        #[cfg(feature = "metrics")]
        assert_eq!(scheduler.system_timing("sibling").map(|t| t.samples), Some(3));

        scheduler.unregister("panics").unwrap();
        assert_eq!(scheduler.failure_count("panics"), 0);
    }

    #[test]
    fn stage_commands_apply_before_next_stage_and_invalidate_once() {
        let mut scheduler = Scheduler::new();
        let observed = Arc::new(AtomicUsize::new(usize::MAX));

        for name in ["spawn-a", "spawn-b"] {
            scheduler
                .register_fn(SystemDescriptor::new(name).writes([Health::ID]).reads([Sprite::ID]), |ctx| {
                    let id = ctx.commands().record_create();
                    ctx.commands().record_add(id, Health(10));
                    Ok(())
                })
                .unwrap();
        }
        let seen = Arc::clone(&observed);
        scheduler
            .register_fn(SystemDescriptor::new("count").reads([Health::ID]), move |ctx| {
                let healthy = ctx.query(&QuerySignature::new().with::<Health>());
                seen.store(healthy.entities.len(), Ordering::SeqCst);
                Ok(())
            })
            .unwrap();
        scheduler.rebuild_execution_plan().unwrap();
        assert_eq!(scheduler.stage_count(), 3);

        let mut world = World::new();
        let before = world.query_cache().version();
        let report = scheduler.execute_tick(&mut world, 0.0).unwrap();

        assert_eq!(observed.load(Ordering::SeqCst), 2);
        assert_eq!(report.commands_applied, 4);
        assert_eq!(report.invalidations, 2);
        assert_eq!(world.query_cache().version(), before + 2);
    }

    #[test]
    fn playback_follows_stage_order() {
        let mut scheduler = Scheduler::new();
        let tagger = |value: i32| {
            move |ctx: &mut SystemContext<'_>| -> SystemResult {
                let id = ctx.commands().record_create();
                ctx.commands().record_add(id, Health(value));
                Ok(())
            }
        };
        scheduler
            .register_fn(SystemDescriptor::new("b").reads([Velocity::ID]).priority(2), tagger(2))
            .unwrap();
        scheduler
            .register_fn(SystemDescriptor::new("a").reads([Sprite::ID]).priority(1), tagger(1))
            .unwrap();
        scheduler
            .register_fn(SystemDescriptor::new("c").reads([Position::ID]).priority(3), tagger(3))
            .unwrap();
        scheduler.rebuild_execution_plan().unwrap();
        assert_eq!(scheduler.stage_count(), 1);

        let mut world = World::new();
        scheduler.execute_tick(&mut world, 0.0).unwrap();
        let entities: Vec<Entity> = world.matching(&QuerySignature::new().with::<Health>());
        let values: Vec<i32> = entities
            .iter()
            .map(|&entity| world.get::<Health>(entity).unwrap().0)
            .collect();
        assert_eq!(values, vec![1, 2, 3]);
    }

    #[test]
    fn disabled_systems_are_skipped_without_rebuild() {
        let (mut scheduler, seen) = mover_renderer();
        scheduler.rebuild_execution_plan().unwrap();
        scheduler.set_enabled("Renderer", false).unwrap();
        assert!(scheduler.is_built());
        assert_eq!(scheduler.is_enabled("Renderer"), Some(false));

        let mut world = World::new();
        spawn!(world, Position(0.0));
        let report = scheduler.execute_tick(&mut world, 0.1).unwrap();
        assert_eq!(report.systems_run, 1);
        assert_eq!(seen.load(Ordering::SeqCst), 0);

        scheduler.set_enabled("Renderer", true).unwrap();
        scheduler.execute_tick(&mut world, 0.1).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dedicated_worker_pool_runs_ticks() {
        let config = SchedulerConfig {
            worker_threads: Some(2),
            command_buffer_pool_capacity: 4,
        };
        let mut scheduler = Scheduler::with_config(config).unwrap();
        let threads = Arc::new(std::sync::Mutex::new(Vec::new()));
        for index in 0..4u32 {
            let threads = Arc::clone(&threads);
            scheduler
                .register_fn(SystemDescriptor::new(format!("w{index}")).reads([index]), move |_ctx| {
                    let name = std::thread::current().name().map(str::to_string);
                    threads.lock().unwrap().push(name);
                    Ok(())
                })
                .unwrap();
        }
        scheduler.rebuild_execution_plan().unwrap();
        let mut world = World::new();
        scheduler.execute_tick(&mut world, 0.0).unwrap();

        let threads = threads.lock().unwrap();
        assert_eq!(threads.len(), 4);
        assert!(threads
            .iter()
            .all(|name| name.as_deref().is_some_and(|n| n.starts_with("cadence-worker-"))));
    }
}
