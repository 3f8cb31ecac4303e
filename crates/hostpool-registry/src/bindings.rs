//! Binding table
//!
//! Per-key factory/closer registrations. Kept apart from the entry map: writes
//! are rare, reads happen once per pool construction.

use std::collections::HashMap;

use hostpool_core::{Closer, DestinationKey, Factory, PoolError, ResourceBinding};
use parking_lot::RwLock;

struct Slot<C> {
    factory: Option<Factory<C>>,
    closer: Option<Closer<C>>,
}

impl<C> Default for Slot<C> {
    fn default() -> Self {
        Self {
            factory: None,
            closer: None,
        }
    }
}

/// Registered factory/closer functions, by destination
pub struct BindingTable<C> {
    slots: RwLock<HashMap<DestinationKey, Slot<C>>>,
}

impl<C> BindingTable<C> {
    pub fn new() -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
        }
    }

    /// Install both halves, replacing any previous binding
    pub fn set(&self, key: DestinationKey, binding: ResourceBinding<C>) {
        self.set_func(key, binding.factory().clone(), binding.closer().clone());
    }

    pub fn set_func(&self, key: DestinationKey, factory: Factory<C>, closer: Closer<C>) {
        self.slots.write().insert(
            key,
            Slot {
                factory: Some(factory),
                closer: Some(closer),
            },
        );
    }

    pub fn set_factory(&self, key: DestinationKey, factory: Factory<C>) {
        self.slots.write().entry(key).or_default().factory = Some(factory);
    }

    pub fn set_closer(&self, key: DestinationKey, closer: Closer<C>) {
        self.slots.write().entry(key).or_default().closer = Some(closer);
    }

    /// Drop the binding for `key`. Returns whether one existed.
    pub fn remove(&self, key: &DestinationKey) -> bool {
        self.slots.write().remove(key).is_some()
    }

    /// Whether `key` has at least one half registered
    pub fn contains(&self, key: &DestinationKey) -> bool {
        self.slots.read().contains_key(key)
    }

    /// Snapshot the complete binding for `key`
    pub fn resolve(&self, key: &DestinationKey) -> Result<ResourceBinding<C>, PoolError> {
        let slots = self.slots.read();
        let slot = slots
            .get(key)
            .ok_or_else(|| PoolError::FactoryMissing(key.clone()))?;
        let factory = slot
            .factory
            .clone()
            .ok_or_else(|| PoolError::FactoryMissing(key.clone()))?;
        let closer = slot
            .closer
            .clone()
            .ok_or_else(|| PoolError::CloserMissing(key.clone()))?;
        Ok(ResourceBinding::new(factory, closer))
    }

    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.read().is_empty()
    }
}

impl<C> Default for BindingTable<C> {
    fn default() -> Self {
        Self::new()
    }
}
