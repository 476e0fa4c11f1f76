use crate::ecs::{meta_of, name_of, Component, ComponentId, ComponentMeta};
use hecs::EntityRef;
use std::fmt;

/// Canonical "all of these, none of those" component filter.
///
/// Both ID lists are kept sorted and deduplicated, so two signatures built
/// from the same sets in any order compare and hash equal.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QuerySignature {
    all: Vec<ComponentId>,
    none: Vec<ComponentId>,
}

impl QuerySignature {
    /// Signature matching every entity.
    pub fn new() -> Self {
        Self::default()
    }

    /// Require component `T`.
    pub fn with<T: Component>(self) -> Self {
        T::ensure_registered();
        self.with_id(T::ID)
    }

    /// Exclude entities carrying component `T`.
    pub fn without<T: Component>(self) -> Self {
        T::ensure_registered();
        self.without_id(T::ID)
    }

    pub fn with_id(mut self, id: ComponentId) -> Self {
        insert_sorted(&mut self.all, id);
        self
    }

    pub fn without_id(mut self, id: ComponentId) -> Self {
        insert_sorted(&mut self.none, id);
        self
    }

    /// Required component IDs, sorted.
    pub fn all(&self) -> &[ComponentId] {
        &self.all
    }

    /// Excluded component IDs, sorted.
    pub fn none(&self) -> &[ComponentId] {
        &self.none
    }

    /// A component both required and excluded can never match.
    pub fn is_contradictory(&self) -> bool {
        self.all
            .iter()
            .any(|id| self.none.binary_search(id).is_ok())
    }

    /// Look up registry metadata for every ID once, ahead of a scan.
    ///
    /// Returns `None` when the signature cannot match anything: it is
    /// contradictory, or it requires a component nobody registered (and so
    /// no entity can carry).
    pub fn resolve(&self) -> Option<ResolvedSignature> {
        if self.is_contradictory() {
            return None;
        }
        let all = self
            .all
            .iter()
            .map(|&id| meta_of(id))
            .collect::<Option<Vec<_>>>()?;
        // Unregistered exclusions cannot be present on any entity.
        let none = self.none.iter().filter_map(|&id| meta_of(id)).collect();
        Some(ResolvedSignature { all, none })
    }

    /// Test a single entity. Prefer [`resolve`](Self::resolve) for scans.
    pub fn matches(&self, entity: &EntityRef<'_>) -> bool {
        self.resolve()
            .is_some_and(|resolved| resolved.matches(entity))
    }
}

fn insert_sorted(ids: &mut Vec<ComponentId>, id: ComponentId) {
    if let Err(slot) = ids.binary_search(&id) {
        ids.insert(slot, id);
    }
}

impl fmt::Display for QuerySignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.all.is_empty() && self.none.is_empty() {
            return f.write_str("*");
        }
        for &id in &self.all {
            write!(f, "+{}", name_of(id))?;
        }
        for &id in &self.none {
            write!(f, "-{}", name_of(id))?;
        }
        Ok(())
    }
}

/// Signature with registry metadata looked up.
#[derive(Debug, Clone)]
pub struct ResolvedSignature {
    all: Vec<ComponentMeta>,
    none: Vec<ComponentMeta>,
}

impl ResolvedSignature {
    #[inline]
    pub fn matches(&self, entity: &EntityRef<'_>) -> bool {
        self.all.iter().all(|meta| meta.is_present(entity))
            && !self.none.iter().any(|meta| meta.is_present(entity))
    }
}
