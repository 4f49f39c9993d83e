use std::{collections::HashMap, rc::Rc};

use crate::{EntityId, KindError, ObjectSchema, Replicate, ReplicateBuilder};

pub type ObjectFactory = Rc<dyn Fn(EntityId) -> Box<dyn Replicate>>;

/// Maps type tags to constructors, populated once at startup
#[derive(Default)]
pub struct ObjectKinds {
    factories: HashMap<&'static str, ObjectFactory>,
}

impl ObjectKinds {
    pub fn new() -> Self {
        Self::default()
    }

    /// # Panics
    ///
    /// Panics if the kind's type tag is already registered.
    pub fn add_kind<T: ReplicateBuilder>(&mut self) {
        if let Err(error) = self.try_add_kind::<T>() {
            panic!("{}", error);
        }
    }

    pub fn try_add_kind<T: ReplicateBuilder>(&mut self) -> Result<(), KindError> {
        check_schema(T::SCHEMA)?;
        self.try_add_factory(T::SCHEMA.alias_name, |identifier| {
            Box::new(T::build(identifier)) as Box<dyn Replicate>
        })
    }

    /// Registers a constructor that needs captured state (shared indexes,
    /// services) rather than just an identifier
    pub fn try_add_factory<F>(&mut self, alias_name: &'static str, factory: F) -> Result<(), KindError>
    where
        F: Fn(EntityId) -> Box<dyn Replicate> + 'static,
    {
        if self.factories.contains_key(alias_name) {
            return Err(KindError::KindAlreadyRegistered { alias_name });
        }
        self.factories.insert(alias_name, Rc::new(factory));
        Ok(())
    }

    pub fn contains(&self, alias_name: &str) -> bool {
        self.factories.contains_key(alias_name)
    }

    pub fn factory(&self, alias_name: &str) -> Result<ObjectFactory, KindError> {
        self.factories
            .get(alias_name)
            .cloned()
            .ok_or_else(|| KindError::KindNotRegistered {
                alias_name: alias_name.to_string(),
            })
    }

    pub fn create(&self, alias_name: &str, identifier: EntityId) -> Result<Box<dyn Replicate>, KindError> {
        build_checked(&self.factory(alias_name)?, alias_name, identifier)
    }

    pub fn alias_names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.factories.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

/// Runs a factory and verifies the produced object carries the requested tag
pub fn build_checked(
    factory: &ObjectFactory,
    alias_name: &str,
    identifier: EntityId,
) -> Result<Box<dyn Replicate>, KindError> {
    let object = factory(identifier);
    if object.alias_name() != alias_name {
        return Err(KindError::FactoryMismatch {
            expected: alias_name.to_string(),
            actual: object.alias_name(),
        });
    }
    check_schema(object.base().schema())?;
    Ok(object)
}

fn check_schema(schema: &ObjectSchema) -> Result<(), KindError> {
    if schema.fits_diff_mask() {
        return Ok(());
    }
    Err(KindError::TooManyProperties {
        alias_name: schema.alias_name,
        count: schema.properties.len(),
        max: ObjectSchema::MAX_PROPERTIES,
    })
}
