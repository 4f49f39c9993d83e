use std::collections::HashMap;

use log::debug;

use crate::EntityId;

/// Objects whose context named a parent this peer does not know yet. They
/// stay roots until that parent is added, then get attached.
#[derive(Default)]
pub struct OrphanWaitlist {
    waiting_parent_to_children: HashMap<EntityId, Vec<(EntityId, Option<u32>)>>,
    child_to_waiting_parent: HashMap<EntityId, EntityId>,
}

impl OrphanWaitlist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `child` wants `parent`, replacing any earlier wish
    pub fn queue(&mut self, child: &EntityId, parent: &EntityId, order: Option<u32>) {
        self.remove_child(child);
        debug!("Object {} waiting for parent {}", child, parent);
        self.waiting_parent_to_children
            .entry(parent.clone())
            .or_default()
            .push((child.clone(), order));
        self.child_to_waiting_parent
            .insert(child.clone(), parent.clone());
    }

    pub fn remove_child(&mut self, child: &EntityId) {
        let Some(parent) = self.child_to_waiting_parent.remove(child) else {
            return;
        };
        let mut remove = false;
        if let Some(children) = self.waiting_parent_to_children.get_mut(&parent) {
            children.retain(|(waiting, _)| waiting != child);
            remove = children.is_empty();
        }
        if remove {
            self.waiting_parent_to_children.remove(&parent);
        }
    }

    /// Takes the children waiting for `parent`, sorted by requested position
    pub fn take_children(&mut self, parent: &EntityId) -> Vec<(EntityId, Option<u32>)> {
        let Some(mut children) = self.waiting_parent_to_children.remove(parent) else {
            return Vec::new();
        };
        for (child, _) in children.iter() {
            self.child_to_waiting_parent.remove(child);
        }
        children.sort_by_key(|(_, order)| order.unwrap_or(u32::MAX));
        children
    }

    pub fn waiting_parent(&self, child: &EntityId) -> Option<&EntityId> {
        self.child_to_waiting_parent.get(child)
    }

    pub fn len(&self) -> usize {
        self.child_to_waiting_parent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.child_to_waiting_parent.is_empty()
    }
}
