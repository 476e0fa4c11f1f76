use crate::ecs::{Component, ComponentId};

/// Builder for constructing an entity's initial component set prior to
/// spawning.
///
/// Every component added through the builder is registered with the
/// component registry, which keeps erased operations (query evaluation,
/// pool stripping) aware of it.
pub struct EntityBuilder {
    inner: hecs::EntityBuilder,
    components: Vec<ComponentId>,
}

impl EntityBuilder {
    /// Create a new empty builder.
    pub fn new() -> Self {
        Self {
            inner: hecs::EntityBuilder::new(),
            components: Vec::new(),
        }
    }

    /// Add a component by value. Adding the same type twice keeps the last
    /// value.
    pub fn with<T: Component>(mut self, value: T) -> Self {
        T::ensure_registered();
        self.inner.add(value);
        if let Err(slot) = self.components.binary_search(&T::ID) {
            self.components.insert(slot, T::ID);
        }
        self
    }

    /// Sorted IDs of the components added so far.
    pub fn component_ids(&self) -> &[ComponentId] {
        &self.components
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub(crate) fn build(&mut self) -> hecs::BuiltEntity<'_> {
        self.inner.build()
    }
}

impl Default for EntityBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Convenience macro for spawning entities.
///
/// # Example
/// ```ignore
/// let entity = spawn!(world,
///     Position { x: 1.0, y: 2.0 },
///     Velocity { x: 0.5, y: 0.0 }
/// );
/// ```
#[macro_export]
macro_rules! spawn {
    ($world:expr $(, $component:expr)+ $(,)?) => {{
        let builder = $crate::ecs::EntityBuilder::new()
            $(.with($component))+;
        $world.spawn(builder)
    }};
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::define_component;

    struct Mass(#[allow(dead_code)] f32);
    define_component!(Mass, 9_101, "Mass");

    struct Charge(#[allow(dead_code)] f32);
    define_component!(Charge, 9_100, "Charge");

    #[test]
    fn builder_tracks_sorted_unique_ids() {
        let builder = EntityBuilder::new()
            .with(Mass(1.0))
            .with(Charge(-1.0))
            .with(Mass(2.0));

        assert_eq!(builder.component_ids(), &[Charge::ID, Mass::ID]);
        assert!(!builder.is_empty());
        assert!(crate::ecs::meta_of(Mass::ID).is_some());
    }
}
