use std::{cell::RefCell, rc::Rc};

use log::warn;

/// Receives notice that the tracked property at `property_index` changed
pub trait PropertyMutate: 'static {
    /// Returns false if the mutation could not be recorded
    fn mutate(&mut self, property_index: u8) -> bool;
}

/// Shared handle every tracked property of one object reports its changes to
#[derive(Clone)]
pub struct PropertyMutator {
    inner: Rc<RefCell<dyn PropertyMutate>>,
}

impl PropertyMutator {
    pub fn new<M: PropertyMutate>(mutator: M) -> Self {
        Self {
            inner: Rc::new(RefCell::new(mutator)),
        }
    }

    pub fn mutate(&self, property_index: u8) -> bool {
        let Ok(mut inner) = self.inner.try_borrow_mut() else {
            warn!("PropertyMutator reentered while recording property {}", property_index);
            return false;
        };
        inner.mutate(property_index)
    }
}
