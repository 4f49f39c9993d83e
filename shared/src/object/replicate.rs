use std::any::Any;

use crate::{EntityId, ObjectBase, ObjectSchema, PropertyError, PropertyValue, SyncContext};

/// Downcasting support for replicated objects stored behind `dyn Replicate`
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A replicated object: an identified, typed node whose tracked properties
/// are mirrored across peers.
///
/// Concrete kinds embed an [`ObjectBase`] and may override `apply` to
/// invalidate derived state, or the registry lifecycle hooks.
pub trait Replicate: AsAny {
    fn base(&self) -> &ObjectBase;

    fn base_mut(&mut self) -> &mut ObjectBase;

    /// Merges an incoming context into this object
    fn apply(&mut self, context: &SyncContext) {
        self.base_mut().apply(context);
    }

    /// Called once the object is reachable through the registry
    fn on_added(&mut self) {}

    /// Called once the object is no longer reachable through the registry
    fn on_removed(&mut self) {}

    fn identifier(&self) -> &EntityId {
        self.base().identifier()
    }

    fn alias_name(&self) -> &'static str {
        self.base().alias_name()
    }

    fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.base().get(name)
    }

    /// # Panics
    ///
    /// Panics if `name` is not declared on this kind.
    fn set(&mut self, name: &str, value: PropertyValue) -> bool {
        self.base_mut().set(name, value)
    }

    fn try_set(&mut self, name: &str, value: PropertyValue) -> Result<bool, PropertyError> {
        self.base_mut().try_set(name, value)
    }

    fn to_context(&self) -> SyncContext {
        self.base().to_context()
    }
}

/// A kind that can be materialized from nothing but an identifier, which is
/// what an inbound context for an unknown identifier requires
pub trait ReplicateBuilder: Replicate + Sized {
    const SCHEMA: &'static ObjectSchema;

    fn build(identifier: EntityId) -> Self;
}
