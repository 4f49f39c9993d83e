use std::{cell::RefCell, collections::HashMap, rc::Rc};

use log::trace;

use crate::{EntityId, ObjectRegistry, PeerCursor, PeerId, TypedRef, UserId};

#[derive(Default)]
struct IndexInner {
    by_user: HashMap<UserId, EntityId>,
    by_peer: HashMap<PeerId, EntityId>,
}

/// Lookup caches from user id and peer id to the cursor that carries them.
///
/// The cache is only a shortcut: every hit is checked against the live
/// cursor, and a miss falls back to scanning the registry.
#[derive(Clone, Default)]
pub struct IdentityIndex {
    inner: Rc<RefCell<IndexInner>>,
}

impl IdentityIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Points both keys at `identifier`, dropping whatever it was indexed
    /// under before. Empty keys are not indexed.
    pub fn index(&self, identifier: &EntityId, user_id: &UserId, peer_id: &PeerId) {
        self.unindex(identifier);
        let mut inner = self.inner.borrow_mut();
        if !user_id.is_empty() {
            inner.by_user.insert(user_id.clone(), identifier.clone());
        }
        if !peer_id.is_empty() {
            inner.by_peer.insert(peer_id.clone(), identifier.clone());
        }
    }

    pub fn unindex(&self, identifier: &EntityId) {
        let mut inner = self.inner.borrow_mut();
        inner.by_user.retain(|_, indexed| indexed != identifier);
        inner.by_peer.retain(|_, indexed| indexed != identifier);
    }

    pub fn forget_user(&self, user_id: &UserId) {
        self.inner.borrow_mut().by_user.remove(user_id);
    }

    pub fn forget_peer(&self, peer_id: &PeerId) {
        self.inner.borrow_mut().by_peer.remove(peer_id);
    }

    pub fn cached_user(&self, user_id: &UserId) -> Option<EntityId> {
        self.inner.borrow().by_user.get(user_id).cloned()
    }

    pub fn cached_peer(&self, peer_id: &PeerId) -> Option<EntityId> {
        self.inner.borrow().by_peer.get(peer_id).cloned()
    }

    pub fn find_by_user_id(
        &self,
        registry: &ObjectRegistry,
        user_id: &UserId,
    ) -> Option<TypedRef<PeerCursor>> {
        if user_id.is_empty() {
            return None;
        }
        if let Some(identifier) = self.cached_user(user_id) {
            if let Some(cursor) = registry.get_typed::<PeerCursor>(&identifier) {
                if cursor.borrow().user_id() == *user_id {
                    return Some(cursor);
                }
            }
            trace!("Stale user index entry for {}", user_id);
            self.forget_user(user_id);
        }

        let cursor = registry
            .get_objects_of::<PeerCursor>()
            .into_iter()
            .find(|cursor| cursor.borrow().user_id() == *user_id)?;
        self.inner
            .borrow_mut()
            .by_user
            .insert(user_id.clone(), cursor.identifier().clone());
        Some(cursor)
    }

    pub fn find_by_peer_id(
        &self,
        registry: &ObjectRegistry,
        peer_id: &PeerId,
    ) -> Option<TypedRef<PeerCursor>> {
        if peer_id.is_empty() {
            return None;
        }
        if let Some(identifier) = self.cached_peer(peer_id) {
            if let Some(cursor) = registry.get_typed::<PeerCursor>(&identifier) {
                if cursor.borrow().peer_id() == *peer_id {
                    return Some(cursor);
                }
            }
            trace!("Stale peer index entry for {}", peer_id);
            self.forget_peer(peer_id);
        }

        let cursor = registry
            .get_objects_of::<PeerCursor>()
            .into_iter()
            .find(|cursor| cursor.borrow().peer_id() == *peer_id)?;
        self.inner
            .borrow_mut()
            .by_peer
            .insert(peer_id.clone(), cursor.identifier().clone());
        Some(cursor)
    }
}
