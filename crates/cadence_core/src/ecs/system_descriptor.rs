use crate::ecs::{Component, ComponentId};

/// Metadata describing how a system interacts with the world.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SystemDescriptor {
    name: String,
    reads: Vec<ComponentId>,
    writes: Vec<ComponentId>,
    components: Vec<ComponentId>,
    priority: i32,
    enabled: bool,
}

impl SystemDescriptor {
    /// Create a new enabled descriptor with priority 0.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reads: Vec::new(),
            writes: Vec::new(),
            components: Vec::new(),
            priority: 0,
            enabled: true,
        }
    }

    /// Replace the read-only component set for this system.
    pub fn reads<I>(mut self, components: I) -> Self
    where
        I: IntoIterator<Item = ComponentId>,
    {
        self.reads = Self::sanitize(components);
        self.rebuild_components();
        self
    }

    /// Replace the write component set for this system.
    pub fn writes<I>(mut self, components: I) -> Self
    where
        I: IntoIterator<Item = ComponentId>,
    {
        self.writes = Self::sanitize(components);
        self.rebuild_components();
        self
    }

    /// Add `T` to the read set.
    pub fn read<T: Component>(mut self) -> Self {
        T::ensure_registered();
        self.add_read(T::ID);
        self
    }

    /// Add `T` to the write set.
    pub fn write<T: Component>(mut self) -> Self {
        T::ensure_registered();
        self.add_write(T::ID);
        self
    }

    /// Lower runs first among conflicting systems.
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Append a single read component.
    pub fn add_read(&mut self, component: ComponentId) {
        self.reads.push(component);
        self.rebuild_components();
    }

    /// Append a single write component.
    pub fn add_write(&mut self, component: ComponentId) {
        self.writes.push(component);
        self.rebuild_components();
    }

    /// Unique system name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Read-only component set.
    pub fn read_components(&self) -> &[ComponentId] {
        &self.reads
    }

    /// Writable component set.
    pub fn write_components(&self) -> &[ComponentId] {
        &self.writes
    }

    /// Union of read and write component ids.
    pub fn all_components(&self) -> &[ComponentId] {
        &self.components
    }

    pub fn priority_value(&self) -> i32 {
        self.priority
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub(crate) fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Whether the descriptor touches any components at all.
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Whether this system writes something `other` reads.
    pub fn feeds(&self, other: &SystemDescriptor) -> bool {
        intersects(&self.writes, &other.reads)
    }

    /// Whether both systems write a common component.
    pub fn shares_writes_with(&self, other: &SystemDescriptor) -> bool {
        intersects(&self.writes, &other.writes)
    }

    /// Whether the two systems may not run at the same time.
    pub fn conflicts_with(&self, other: &SystemDescriptor) -> bool {
        intersects(&self.writes, &other.components) || intersects(&other.writes, &self.components)
    }

    fn rebuild_components(&mut self) {
        self.reads = Self::sanitize(std::mem::take(&mut self.reads));
        self.writes = Self::sanitize(std::mem::take(&mut self.writes));
        self.components.clear();
        self.components.extend(&self.reads);
        self.components.extend(&self.writes);
        self.components.sort_unstable();
        self.components.dedup();
    }

    fn sanitize<I>(components: I) -> Vec<ComponentId>
    where
        I: IntoIterator<Item = ComponentId>,
    {
        let mut list: Vec<ComponentId> = components.into_iter().collect();
        list.sort_unstable();
        list.dedup();
        list
    }
}

/// Both slices are sorted.
fn intersects(a: &[ComponentId], b: &[ComponentId]) -> bool {
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => return true,
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sets_are_sorted_and_deduplicated() {
        let descriptor = SystemDescriptor::new("physics")
            .reads([3, 1, 3])
            .writes([2, 2])
            .priority(-5);
        assert_eq!(descriptor.read_components(), &[1, 3]);
        assert_eq!(descriptor.write_components(), &[2]);
        assert_eq!(descriptor.all_components(), &[1, 2, 3]);
        assert_eq!(descriptor.priority_value(), -5);
        assert!(descriptor.is_enabled());
    }

    #[test]
    fn conflict_rules() {
        let mover = SystemDescriptor::new("mover").reads([1]).writes([2]);
        let renderer = SystemDescriptor::new("renderer").reads([2]);
        let audio = SystemDescriptor::new("audio").reads([1, 7]);
        let other_writer = SystemDescriptor::new("other").writes([2]);

        assert!(mover.feeds(&renderer));
        assert!(!renderer.feeds(&mover));
        assert!(mover.conflicts_with(&renderer));
        assert!(renderer.conflicts_with(&mover));
        // Shared reads never conflict
        assert!(!mover.conflicts_with(&audio));
        assert!(mover.shares_writes_with(&other_writer));
        assert!(mover.conflicts_with(&other_writer));
        assert!(!mover.feeds(&other_writer));
    }
}
