use super::CommandBuffer;
use crate::ecs::World;
use once_cell::sync::Lazy;
use std::sync::{Mutex, PoisonError};

/// Idle buffers kept by the process-wide pool.
const SHARED_CAPACITY: usize = 64;

static SHARED: Lazy<CommandBufferPool> = Lazy::new(|| CommandBufferPool::new(SHARED_CAPACITY));

/// Recycles command buffers so their allocations survive between ticks.
///
/// Buffers coming out of the pool are always empty; buffers returned past
/// `capacity` are dropped.
pub struct CommandBufferPool {
    capacity: usize,
    idle: Mutex<Vec<CommandBuffer>>,
}

impl CommandBufferPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            idle: Mutex::new(Vec::with_capacity(capacity)),
        }
    }

    /// The pool behind [`CommandBuffer::rent`] and [`CommandBuffer::recycle`].
    pub fn shared() -> &'static CommandBufferPool {
        &SHARED
    }

    /// Take an idle buffer, or allocate one, bound to `world`.
    pub fn rent(&self, world: &World) -> CommandBuffer {
        let buffer = self
            .idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop()
            .unwrap_or_default();
        buffer.bind(Some(world.id()));
        buffer
    }

    /// Clear `buffer` and keep it for the next rent.
    pub fn recycle(&self, buffer: CommandBuffer) {
        buffer.clear();
        buffer.bind(None);
        let mut idle = self.idle.lock().unwrap_or_else(PoisonError::into_inner);
        if idle.len() < self.capacity {
            idle.push(buffer);
        }
    }

    /// Buffers currently waiting to be rented.
    pub fn available(&self) -> usize {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recycled_buffers_come_back_empty_and_rebound() {
        let pool = CommandBufferPool::new(2);
        let first = World::new();
        let second = World::new();

        let buffer = pool.rent(&first);
        assert_eq!(buffer.world(), Some(first.id()));
        buffer.record_create();
        pool.recycle(buffer);
        assert_eq!(pool.available(), 1);

        let again = pool.rent(&second);
        assert!(again.is_empty());
        assert_eq!(again.world(), Some(second.id()));
        assert_eq!(pool.available(), 0);
    }

    #[test]
    fn recycling_past_capacity_drops_buffers() {
        let pool = CommandBufferPool::new(1);
        let world = World::new();
        let a = pool.rent(&world);
        let b = pool.rent(&world);
        pool.recycle(a);
        pool.recycle(b);
        assert_eq!(pool.available(), 1);
        assert_eq!(pool.capacity(), 1);
    }

    #[test]
    fn shared_pool_backs_rent_and_recycle() {
        let world = World::new();
        let buffer = CommandBuffer::rent(&world);
        assert_eq!(buffer.world(), Some(world.id()));
        CommandBuffer::recycle(buffer);
        assert!(CommandBufferPool::shared().available() >= 1);
    }
}
