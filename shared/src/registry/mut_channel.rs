use std::{cell::RefCell, collections::HashMap, rc::Rc};

use log::warn;

use crate::{DiffMask, EntityId, PropertyMutate};

#[derive(Default)]
struct DirtySet {
    order: Vec<EntityId>,
    masks: HashMap<EntityId, DiffMask>,
}

/// Collects which objects (and which of their properties) changed since the
/// last flush. Writes coalesce: an object appears once per flush however
/// many times it was set.
#[derive(Clone, Default)]
pub struct MutChannel {
    data: Rc<RefCell<DirtySet>>,
}

impl MutChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_sender(&self, identifier: EntityId, diff_mask_length: u8) -> MutSender {
        MutSender {
            channel: self.clone(),
            identifier,
            diff_mask_length,
        }
    }

    pub fn send(&self, identifier: &EntityId, diff: u8, diff_mask_length: u8) -> bool {
        let Ok(mut data) = self.data.try_borrow_mut() else {
            warn!("MutChannel held on current thread, change to {} lost", identifier);
            return false;
        };
        data.mask_mut(identifier, diff_mask_length).set_bit(diff, true);
        true
    }

    /// Marks every property of the object, used when it must be sent whole
    pub fn send_all(&self, identifier: &EntityId, diff_mask_length: u8) -> bool {
        let Ok(mut data) = self.data.try_borrow_mut() else {
            warn!("MutChannel held on current thread, change to {} lost", identifier);
            return false;
        };
        data.mask_mut(identifier, diff_mask_length)
            .set_all(diff_mask_length);
        true
    }

    pub fn forget(&self, identifier: &EntityId) {
        let mut data = self.data.borrow_mut();
        if data.masks.remove(identifier).is_some() {
            data.order.retain(|dirty| dirty != identifier);
        }
    }

    pub fn diff_mask(&self, identifier: &EntityId) -> Option<DiffMask> {
        self.data.borrow().masks.get(identifier).cloned()
    }

    pub fn is_clear(&self) -> bool {
        self.data.borrow().order.is_empty()
    }

    /// Takes every pending change, in first-changed order
    pub fn drain(&self) -> Vec<(EntityId, DiffMask)> {
        let mut data = self.data.borrow_mut();
        let order = std::mem::take(&mut data.order);
        let mut output = Vec::with_capacity(order.len());
        for identifier in order {
            if let Some(mask) = data.masks.remove(&identifier) {
                output.push((identifier, mask));
            }
        }
        output
    }
}

impl DirtySet {
    fn mask_mut(&mut self, identifier: &EntityId, diff_mask_length: u8) -> &mut DiffMask {
        if !self.masks.contains_key(identifier) {
            self.order.push(identifier.clone());
        }
        self.masks
            .entry(identifier.clone())
            .or_insert_with(|| DiffMask::new(diff_mask_length))
    }
}

/// The mutator handed to every property of one registered object
pub struct MutSender {
    channel: MutChannel,
    identifier: EntityId,
    diff_mask_length: u8,
}

impl PropertyMutate for MutSender {
    fn mutate(&mut self, property_index: u8) -> bool {
        self.channel
            .send(&self.identifier, property_index, self.diff_mask_length)
    }
}
