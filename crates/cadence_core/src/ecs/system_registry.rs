use crate::ecs::{System, SystemDescriptor, SystemHandle, SystemRegistrationError};
use std::collections::HashMap;
use std::sync::Mutex;

pub(crate) struct SystemRegistry {
    /// Kept in registration (handle) order.
    systems: Vec<RegisteredSystem>,
    name_lookup: HashMap<String, SystemHandle>,
    next_handle: u32,
}

impl SystemRegistry {
    pub fn new() -> Self {
        Self {
            systems: Vec::new(),
            name_lookup: HashMap::new(),
            next_handle: 0,
        }
    }

    pub fn register(
        &mut self,
        descriptor: SystemDescriptor,
        system: Box<dyn System>,
    ) -> Result<SystemHandle, SystemRegistrationError> {
        if descriptor.is_empty() {
            return Err(SystemRegistrationError::EmptyAccess {
                name: descriptor.name().to_string(),
            });
        }

        let name_key = descriptor.name().to_string();
        if self.name_lookup.contains_key(&name_key) {
            return Err(SystemRegistrationError::DuplicateName { name: name_key });
        }

        let handle = SystemHandle::new(self.next_handle);
        self.next_handle += 1;
        self.name_lookup.insert(name_key, handle);
        self.systems.push(RegisteredSystem {
            handle,
            descriptor,
            system: Mutex::new(system),
        });

        Ok(handle)
    }

    pub fn unregister(&mut self, name: &str) -> Result<SystemHandle, SystemRegistrationError> {
        let handle = self.handle_of(name)?;
        self.name_lookup.remove(name);
        if let Ok(position) = self.position(handle) {
            self.systems.remove(position);
        }
        Ok(handle)
    }

    pub fn handle_of(&self, name: &str) -> Result<SystemHandle, SystemRegistrationError> {
        self.name_lookup
            .get(name)
            .copied()
            .ok_or_else(|| SystemRegistrationError::UnknownSystem {
                name: name.to_string(),
            })
    }

    fn position(&self, handle: SystemHandle) -> Result<usize, usize> {
        self.systems
            .binary_search_by_key(&handle, |system| system.handle)
    }

    pub fn get(&self, handle: SystemHandle) -> Option<&RegisteredSystem> {
        self.position(handle)
            .ok()
            .map(|position| &self.systems[position])
    }

    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> Result<(), SystemRegistrationError> {
        let handle = self.handle_of(name)?;
        if let Ok(position) = self.position(handle) {
            self.systems[position].descriptor.set_enabled(enabled);
        }
        Ok(())
    }

    pub fn descriptor(&self, handle: SystemHandle) -> Option<&SystemDescriptor> {
        self.get(handle).map(|system| &system.descriptor)
    }

    pub fn len(&self) -> usize {
        self.systems.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisteredSystem> {
        self.systems.iter()
    }
}

pub(crate) struct RegisteredSystem {
    pub handle: SystemHandle,
    pub descriptor: SystemDescriptor,
    pub system: Mutex<Box<dyn System>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::{FnSystem, SystemResult};

    fn noop() -> Box<dyn System> {
        Box::new(FnSystem::new(|_ctx| -> SystemResult { Ok(()) }))
    }

    #[test]
    fn handles_follow_registration_order_and_are_not_reused() {
        let mut registry = SystemRegistry::new();
        let a = registry
            .register(SystemDescriptor::new("a").reads([1]), noop())
            .unwrap();
        let b = registry
            .register(SystemDescriptor::new("b").writes([1]), noop())
            .unwrap();
        assert!(a < b);

        assert_eq!(registry.unregister("a"), Ok(a));
        let c = registry
            .register(SystemDescriptor::new("a").reads([1]), noop())
            .unwrap();
        assert!(c > b);
        assert_eq!(registry.len(), 2);
        assert!(registry.get(a).is_none());
        assert_eq!(registry.descriptor(c).map(|d| d.name()), Some("a"));
    }

    #[test]
    fn invalid_registrations_are_rejected() {
        let mut registry = SystemRegistry::new();
        assert_eq!(
            registry
                .register(SystemDescriptor::new("idle"), noop())
                .err(),
            Some(SystemRegistrationError::EmptyAccess {
                name: "idle".to_string()
            })
        );
        registry
            .register(SystemDescriptor::new("dup").reads([1]), noop())
            .unwrap();
        assert_eq!(
            registry
                .register(SystemDescriptor::new("dup").reads([2]), noop())
                .err(),
            Some(SystemRegistrationError::DuplicateName {
                name: "dup".to_string()
            })
        );
        assert!(matches!(
            registry.set_enabled("ghost", false),
            Err(SystemRegistrationError::UnknownSystem { .. })
        ));
    }
}
