use super::{Command, CommandBufferPool, CommandError, ComponentInsert};
use crate::ecs::{meta_of, Component, ComponentId, Entity, LogicalId, Target, World, WorldId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;

fn next_batch_token() -> u64 {
    static NEXT: AtomicU64 = AtomicU64::new(1);
    NEXT.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandBufferError {
    #[error("buffer is bound to world {bound:?} but was played back against {actual:?}")]
    WorldMismatch { bound: WorldId, actual: WorldId },
}

/// A command that failed during playback, with its position in the batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFailure {
    pub index: usize,
    pub error: CommandError,
}

/// Outcome of one playback.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaybackReport {
    pub applied: usize,
    pub failed: usize,
    pub errors: Vec<CommandFailure>,
}

impl PlaybackReport {
    /// Every command kind is structural, so any applied command changes the
    /// world's shape.
    pub fn changed_structure(&self) -> bool {
        self.applied > 0
    }

    pub(crate) fn absorb(&mut self, other: PlaybackReport) {
        self.applied += other.applied;
        self.failed += other.failed;
        self.errors.extend(other.errors);
    }
}

struct BufferState {
    commands: Vec<Command>,
    token: u64,
    next_logical: u32,
    world: Option<WorldId>,
}

impl BufferState {
    /// Start a new batch: logical ids from the old one stop resolving.
    fn reset(&mut self) -> Vec<Command> {
        self.token = next_batch_token();
        self.next_logical = 0;
        std::mem::take(&mut self.commands)
    }
}

/// Ordered, thread-safe recording of structural mutations.
///
/// Recording takes `&self` and may happen from any number of threads at
/// once; each call appends under a short internal lock. Playback runs on
/// one thread with `&mut World` and always leaves the buffer empty.
pub struct CommandBuffer {
    state: Mutex<BufferState>,
}

impl CommandBuffer {
    /// An unbound buffer; it can be played back against any world.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(BufferState {
                commands: Vec::new(),
                token: next_batch_token(),
                next_logical: 0,
                world: None,
            }),
        }
    }

    /// A buffer that refuses playback against any world but `world`.
    pub fn bound_to(world: &World) -> Self {
        let buffer = Self::new();
        buffer.bind(Some(world.id()));
        buffer
    }

    /// Rent a cleared buffer bound to `world` from the shared pool.
    pub fn rent(world: &World) -> Self {
        CommandBufferPool::shared().rent(world)
    }

    /// Clear `buffer` and hand it back to the shared pool.
    pub fn recycle(buffer: CommandBuffer) {
        CommandBufferPool::shared().recycle(buffer);
    }

    fn lock(&self) -> MutexGuard<'_, BufferState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn bind(&self, world: Option<WorldId>) {
        self.lock().world = world;
    }

    /// World this buffer is bound to, if any.
    pub fn world(&self) -> Option<WorldId> {
        self.lock().world
    }

    pub fn len(&self) -> usize {
        self.lock().commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().commands.is_empty()
    }

    /// Drop every recorded command and start a new batch.
    pub fn clear(&self) {
        let dropped = self.lock().reset();
        drop(dropped);
    }

    /// Debug rendering of the recorded commands, in order.
    pub fn describe(&self) -> Vec<String> {
        self.lock()
            .commands
            .iter()
            .map(|command| format!("{command:?}"))
            .collect()
    }

    // ------------------------------------------------------------------
    // Recording
    // ------------------------------------------------------------------

    fn push(&self, command: Command) {
        self.lock().commands.push(command);
    }

    /// Record the creation of an entity. The returned id can be used as a
    /// target by later commands in this buffer.
    pub fn record_create(&self) -> LogicalId {
        let mut state = self.lock();
        let id = LogicalId::new(state.token, state.next_logical);
        state.next_logical += 1;
        state.commands.push(Command::CreateEntity(id));
        id
    }

    pub fn record_destroy(&self, target: impl Into<Target>) {
        self.push(Command::DestroyEntity(target.into()));
    }

    pub fn record_add<T: Component>(&self, target: impl Into<Target>, value: T) {
        T::ensure_registered();
        self.push(Command::AddComponent {
            target: target.into(),
            component: T::ID,
            value: ComponentInsert::new(value),
        });
    }

    pub fn record_remove<T: Component>(&self, target: impl Into<Target>) {
        T::ensure_registered();
        self.record_remove_id(target, T::ID);
    }

    /// Record a removal by component ID.
    pub fn record_remove_id(&self, target: impl Into<Target>, component: ComponentId) {
        self.push(Command::RemoveComponent {
            target: target.into(),
            component,
        });
    }

    // ------------------------------------------------------------------
    // Playback
    // ------------------------------------------------------------------

    /// Apply every recorded command to `world` in order, then clear.
    ///
    /// Failed commands are logged and reported, never fatal. The world's
    /// query cache is invalidated once if anything was applied.
    pub fn playback(&self, world: &mut World) -> Result<PlaybackReport, CommandBufferError> {
        let report = self.apply_deferred(world)?;
        if report.changed_structure() {
            world.query_cache().invalidate();
        }
        Ok(report)
    }

    /// Playback without touching the query cache; the caller invalidates.
    pub(crate) fn apply_deferred(
        &self,
        world: &mut World,
    ) -> Result<PlaybackReport, CommandBufferError> {
        let commands = {
            let mut state = self.lock();
            if let Some(bound) = state.world {
                if bound != world.id() {
                    return Err(CommandBufferError::WorldMismatch {
                        bound,
                        actual: world.id(),
                    });
                }
            }
            state.reset()
        };

        let mut report = PlaybackReport::default();
        if commands.is_empty() {
            return Ok(report);
        }

        let store = world.store_mut();
        let mut resolved: HashMap<LogicalId, Entity> = HashMap::new();
        for (index, command) in commands.into_iter().enumerate() {
            match apply_command(store, &mut resolved, command) {
                Ok(()) => report.applied += 1,
                Err(error) => {
                    tracing::error!(index, error = %error, "command playback failed; skipping");
                    report.failed += 1;
                    report.errors.push(CommandFailure { index, error });
                }
            }
        }

        tracing::debug!(
            applied = report.applied,
            failed = report.failed,
            "played back command buffer"
        );
        Ok(report)
    }
}

impl Default for CommandBuffer {
    fn default() -> Self {
        Self::new()
    }
}

fn resolve(resolved: &HashMap<LogicalId, Entity>, target: Target) -> Result<Entity, CommandError> {
    match target {
        Target::Entity(entity) => Ok(entity),
        Target::Logical(id) => resolved
            .get(&id)
            .copied()
            .ok_or(CommandError::UnresolvedLogical(id)),
    }
}

fn apply_command(
    store: &mut hecs::World,
    resolved: &mut HashMap<LogicalId, Entity>,
    command: Command,
) -> Result<(), CommandError> {
    match command {
        Command::CreateEntity(id) => {
            let entity = store.spawn(());
            resolved.insert(id, entity);
            Ok(())
        }
        Command::DestroyEntity(target) => {
            let entity = resolve(resolved, target)?;
            store
                .despawn(entity)
                .map_err(|_| CommandError::NoSuchEntity(entity))
        }
        Command::AddComponent { target, value, .. } => {
            let entity = resolve(resolved, target)?;
            value
                .apply(store, entity)
                .map_err(|_| CommandError::NoSuchEntity(entity))
        }
        Command::RemoveComponent { target, component } => {
            let entity = resolve(resolved, target)?;
            let meta = meta_of(component).ok_or(CommandError::UnregisteredComponent(component))?;
            meta.remove_from(store, entity).map_err(|err| match err {
                hecs::ComponentError::NoSuchEntity => CommandError::NoSuchEntity(entity),
                hecs::ComponentError::MissingComponent(_) => CommandError::MissingComponent {
                    entity,
                    component: meta.name.to_string(),
                },
            })
        }
    }
}
