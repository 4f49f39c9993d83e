use log::trace;

use crate::{
    EntityId, ObjectSchema, Property, PropertyError, PropertyMutator, PropertyValue, SyncContext,
};

/// State every replicated object embeds: its identifier, its schema and the
/// tracked property values in schema order.
#[derive(Clone)]
pub struct ObjectBase {
    identifier: EntityId,
    schema: &'static ObjectSchema,
    properties: Vec<Property>,
}

impl ObjectBase {
    pub fn new(identifier: EntityId, schema: &'static ObjectSchema) -> Self {
        debug_assert!(
            schema.fits_diff_mask(),
            "kind '{}' declares more than {} properties",
            schema.alias_name,
            ObjectSchema::MAX_PROPERTIES
        );
        let properties = schema
            .properties
            .iter()
            .zip(0..=u8::MAX)
            .map(|(decl, index)| Property::new(decl.default.to_value(), index))
            .collect();
        Self {
            identifier,
            schema,
            properties,
        }
    }

    pub fn identifier(&self) -> &EntityId {
        &self.identifier
    }

    pub fn schema(&self) -> &'static ObjectSchema {
        self.schema
    }

    pub fn alias_name(&self) -> &'static str {
        self.schema.alias_name
    }

    pub fn property_count(&self) -> u8 {
        self.schema.property_count()
    }

    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        let index = self.schema.index_of(name)?;
        self.properties.get(index as usize).map(Property::get)
    }

    /// Version stamp of a tracked property, bumped on every real change
    pub fn version(&self, name: &str) -> Option<u32> {
        let index = self.schema.index_of(name)?;
        self.properties.get(index as usize).map(Property::version)
    }

    pub fn text(&self, name: &str) -> String {
        self.get(name).map(PropertyValue::to_text).unwrap_or_default()
    }

    pub fn number(&self, name: &str) -> f64 {
        self.get(name).map(PropertyValue::to_f64).unwrap_or(0.0)
    }

    pub fn boolean(&self, name: &str) -> bool {
        self.get(name).map_or(false, PropertyValue::is_truthy)
    }

    /// Writes a tracked property, queueing the object for synchronization
    /// if the value changed.
    ///
    /// # Panics
    ///
    /// Panics if `name` is not declared on this kind.
    /// Consider using `try_set` for non-panicking error handling.
    pub fn set(&mut self, name: &str, value: impl Into<PropertyValue>) -> bool {
        match self.try_set(name, value) {
            Ok(changed) => changed,
            Err(error) => panic!("{}", error),
        }
    }

    /// Try to write a tracked property
    ///
    /// Returns an error if `name` is not declared on this kind.
    pub fn try_set(
        &mut self,
        name: &str,
        value: impl Into<PropertyValue>,
    ) -> Result<bool, PropertyError> {
        let index = self
            .schema
            .index_of(name)
            .ok_or_else(|| PropertyError::UnknownProperty {
                alias_name: self.schema.alias_name,
                property: name.to_string(),
            })?;
        Ok(self.properties[index as usize].set(value.into()))
    }

    pub fn set_mutator(&mut self, mutator: &PropertyMutator) {
        for property in self.properties.iter_mut() {
            property.set_mutator(mutator);
        }
    }

    /// Merges a context: every declared property present in `sync_data`
    /// takes the incoming value, absent ones keep theirs, unknown keys are
    /// ignored. Never queues the object for synchronization. Returns whether
    /// any value changed.
    pub fn apply(&mut self, context: &SyncContext) -> bool {
        let mut changed = false;
        for (name, value) in context.sync_data.iter() {
            let Some(index) = self.schema.index_of(name) else {
                trace!(
                    "Ignoring undeclared property '{}' for {} '{}'",
                    name,
                    self.schema.alias_name,
                    self.identifier
                );
                continue;
            };
            changed |= self.properties[index as usize].mirror(value.clone());
        }
        changed
    }

    /// Snapshot of every tracked property. Tree position is filled in by the
    /// registry, which owns the tree.
    pub fn to_context(&self) -> SyncContext {
        let mut context = SyncContext::new(self.identifier.clone(), self.schema.alias_name);
        for (decl, property) in self.schema.properties.iter().zip(self.properties.iter()) {
            context
                .sync_data
                .insert(decl.name.to_string(), property.get().clone());
        }
        context
    }
}
