use std::{
    cell::{Ref, RefCell, RefMut},
    marker::PhantomData,
    rc::Rc,
};

use crate::{EntityId, RegistryError, Replicate};

/// Shared handle to a registered object
#[derive(Clone)]
pub struct EntityRef {
    identifier: EntityId,
    alias_name: &'static str,
    property_count: u8,
    cell: Rc<RefCell<Box<dyn Replicate>>>,
}

impl EntityRef {
    pub(crate) fn new(object: Box<dyn Replicate>) -> Self {
        Self {
            identifier: object.identifier().clone(),
            alias_name: object.alias_name(),
            property_count: object.base().property_count(),
            cell: Rc::new(RefCell::new(object)),
        }
    }

    pub fn identifier(&self) -> &EntityId {
        &self.identifier
    }

    pub fn alias_name(&self) -> &'static str {
        self.alias_name
    }

    pub fn property_count(&self) -> u8 {
        self.property_count
    }

    /// # Panics
    ///
    /// Panics if the object is mutably borrowed.
    pub fn borrow(&self) -> Ref<'_, dyn Replicate + 'static> {
        Ref::map(self.cell.borrow(), |object| &**object)
    }

    /// # Panics
    ///
    /// Panics if the object is already borrowed.
    pub fn borrow_mut(&self) -> RefMut<'_, dyn Replicate + 'static> {
        RefMut::map(self.cell.borrow_mut(), |object| &mut **object)
    }

    pub fn try_borrow(&self) -> Result<Ref<'_, dyn Replicate + 'static>, RegistryError> {
        self.cell
            .try_borrow()
            .map(|object| Ref::map(object, |object| &**object))
            .map_err(|_| self.busy())
    }

    pub fn try_borrow_mut(&self) -> Result<RefMut<'_, dyn Replicate + 'static>, RegistryError> {
        self.cell
            .try_borrow_mut()
            .map(|object| RefMut::map(object, |object| &mut **object))
            .map_err(|_| self.busy())
    }

    pub fn is<T: Replicate>(&self) -> bool {
        let object = self.cell.borrow();
        (**object).as_any().is::<T>()
    }

    /// Typed view, `None` if the object is not a `T`
    pub fn downcast<T: Replicate>(&self) -> Option<TypedRef<T>> {
        if !self.is::<T>() {
            return None;
        }
        Some(TypedRef {
            entity: self.clone(),
            phantom: PhantomData,
        })
    }

    pub fn ptr_eq(&self, other: &EntityRef) -> bool {
        Rc::ptr_eq(&self.cell, &other.cell)
    }

    fn busy(&self) -> RegistryError {
        RegistryError::ObjectBusy {
            identifier: self.identifier.to_string(),
        }
    }
}

/// Shared handle to a registered object of known concrete type
pub struct TypedRef<T: Replicate> {
    entity: EntityRef,
    phantom: PhantomData<T>,
}

impl<T: Replicate> Clone for TypedRef<T> {
    fn clone(&self) -> Self {
        Self {
            entity: self.entity.clone(),
            phantom: PhantomData,
        }
    }
}

impl<T: Replicate> TypedRef<T> {
    pub fn identifier(&self) -> &EntityId {
        self.entity.identifier()
    }

    pub fn entity(&self) -> &EntityRef {
        &self.entity
    }

    /// # Panics
    ///
    /// Panics if the object is mutably borrowed.
    pub fn borrow(&self) -> Ref<'_, T> {
        Ref::map(self.entity.cell.borrow(), |object| {
            match (**object).as_any().downcast_ref::<T>() {
                Some(typed) => typed,
                None => panic!("TypedRef kind is verified on construction"),
            }
        })
    }

    /// # Panics
    ///
    /// Panics if the object is already borrowed.
    pub fn borrow_mut(&self) -> RefMut<'_, T> {
        RefMut::map(self.entity.cell.borrow_mut(), |object| {
            match (**object).as_any_mut().downcast_mut::<T>() {
                Some(typed) => typed,
                None => panic!("TypedRef kind is verified on construction"),
            }
        })
    }
}

impl<T: Replicate> From<TypedRef<T>> for EntityRef {
    fn from(typed: TypedRef<T>) -> Self {
        typed.entity
    }
}
