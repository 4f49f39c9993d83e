use std::{cell::RefCell, collections::HashMap, rc::Rc, time::Duration};

use log::{debug, info};

use crate::{
    events::topics::{
        ObjectEventPayload, PeerEventPayload, DELETE_GAME_OBJECT, DISCONNECT_PEER, PEER_CONNECTED,
    },
    EntityId, EventBus, IdentityIndex, ObjectRegistry, PeerCursor, PeerId, PresenceConfig,
    ReplicateBuilder, ResettableTimeout, Roster, Scheduler, SubscriberKey, TypedRef, UserId,
};

struct PendingRemoval {
    peer_id: PeerId,
    // dropping the entry cancels the removal
    _timeout: ResettableTimeout,
}

type PendingRemovals = Rc<RefCell<HashMap<EntityId, PendingRemoval>>>;

/// Tracks which participants are on the table.
///
/// A cursor whose peer disconnects is not removed at once: a grace timeout
/// starts, and only if the peer is still missing from the roster when it
/// fires is the cursor taken out of the registry. A reconnect with the same
/// peer id before then cancels the timeout.
pub struct PresenceManager {
    registry: ObjectRegistry,
    index: IdentityIndex,
    user_id: UserId,
    my_cursor: Option<TypedRef<PeerCursor>>,
    pending: PendingRemovals,
    subscriber: SubscriberKey,
}

impl PresenceManager {
    /// Registers the `PeerCursor` kind on `registry` and subscribes to the
    /// connection topics on its bus.
    pub fn new(
        config: &PresenceConfig,
        registry: &ObjectRegistry,
        scheduler: &Scheduler,
        roster: &Roster,
        user_id: &UserId,
    ) -> Self {
        let index = IdentityIndex::new();
        let factory_index = index.clone();
        registry.register_factory(PeerCursor::SCHEMA.alias_name, move |identifier| {
            Box::new(PeerCursor::new(identifier, &factory_index))
        });

        let pending: PendingRemovals = Rc::new(RefCell::new(HashMap::new()));
        let bus = registry.bus().clone();
        let subscriber = bus.subscriber();

        let disconnect = GraceStarter {
            registry: registry.clone(),
            index: index.clone(),
            scheduler: scheduler.clone(),
            roster: roster.clone(),
            pending: pending.clone(),
            grace_period: config.grace_period,
        };
        let reconnect_pending = pending.clone();
        let delete_pending = pending.clone();

        bus.register(&subscriber)
            .on(DISCONNECT_PEER, move |event| {
                if let Some(payload) = event.data_as::<PeerEventPayload>() {
                    disconnect.start(&payload.peer_id);
                }
            })
            .on(PEER_CONNECTED, move |event| {
                let Some(payload) = event.data_as::<PeerEventPayload>() else {
                    return;
                };
                let mut pending = reconnect_pending.borrow_mut();
                let before = pending.len();
                pending.retain(|_, removal| removal.peer_id != payload.peer_id);
                if pending.len() != before {
                    info!("Peer {} reconnected within grace period", payload.peer_id);
                }
            })
            .on(DELETE_GAME_OBJECT, move |event| {
                if let Some(payload) = event.data_as::<ObjectEventPayload>() {
                    delete_pending.borrow_mut().remove(&payload.identifier);
                }
            });

        Self {
            registry: registry.clone(),
            index,
            user_id: user_id.clone(),
            my_cursor: None,
            pending,
            subscriber,
        }
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn index(&self) -> &IdentityIndex {
        &self.index
    }

    /// Creates (or renames) the local participant's cursor
    pub fn create_my_cursor(&mut self, name: &str) -> TypedRef<PeerCursor> {
        if let Some(cursor) = &self.my_cursor {
            if self.registry.contains(cursor.identifier()) {
                cursor.borrow_mut().set_name(name);
                return cursor.clone();
            }
        }

        let mut cursor = PeerCursor::new(EntityId::generate(), &self.index);
        cursor.set_user_id(&self.user_id);
        cursor.set_peer_id(&self.registry.bus().local_peer_id());
        cursor.set_name(name);
        let cursor = self.registry.add(cursor);
        debug!("Created cursor {} for user {}", cursor.identifier(), self.user_id);
        self.my_cursor = Some(cursor.clone());
        cursor
    }

    pub fn my_cursor(&self) -> Option<TypedRef<PeerCursor>> {
        self.my_cursor
            .as_ref()
            .filter(|cursor| self.registry.contains(cursor.identifier()))
            .cloned()
    }

    pub fn is_mine(&self, identifier: &EntityId) -> bool {
        self.my_cursor
            .as_ref()
            .map_or(false, |cursor| cursor.identifier() == identifier)
    }

    pub fn find_by_user_id(&self, user_id: &UserId) -> Option<TypedRef<PeerCursor>> {
        self.index.find_by_user_id(&self.registry, user_id)
    }

    pub fn find_by_peer_id(&self, peer_id: &PeerId) -> Option<TypedRef<PeerCursor>> {
        self.index.find_by_peer_id(&self.registry, peer_id)
    }

    /// Cursors waiting out their grace period
    pub fn pending_removals(&self) -> Vec<EntityId> {
        let mut identifiers: Vec<EntityId> = self.pending.borrow().keys().cloned().collect();
        identifiers.sort();
        identifiers
    }
}

impl Drop for PresenceManager {
    fn drop(&mut self) {
        self.registry.bus().unregister(&self.subscriber);
        self.pending.borrow_mut().clear();
    }
}

struct GraceStarter {
    registry: ObjectRegistry,
    index: IdentityIndex,
    scheduler: Scheduler,
    roster: Roster,
    pending: PendingRemovals,
    grace_period: Duration,
}

impl GraceStarter {
    fn start(&self, peer_id: &PeerId) {
        let local_peer_id = self.registry.bus().local_peer_id();
        if *peer_id == local_peer_id {
            return;
        }
        for cursor in self.registry.get_objects_of::<PeerCursor>() {
            let (cursor_peer_id, user_id) = {
                let cursor = cursor.borrow();
                (cursor.peer_id(), cursor.user_id())
            };
            if cursor_peer_id != *peer_id {
                continue;
            }
            let identifier = cursor.identifier().clone();
            debug!(
                "Peer {} disconnected, removing cursor {} in {:?}",
                peer_id, identifier, self.grace_period
            );
            let timeout = self.scheduler.start_timeout(
                self.grace_period,
                self.expiry(identifier.clone(), peer_id.clone(), user_id),
            );
            self.pending.borrow_mut().insert(
                identifier,
                PendingRemoval {
                    peer_id: peer_id.clone(),
                    _timeout: timeout,
                },
            );
        }
    }

    fn expiry(&self, identifier: EntityId, peer_id: PeerId, user_id: UserId) -> impl Fn() + 'static {
        let pending = Rc::downgrade(&self.pending);
        let registry = self.registry.clone();
        let index = self.index.clone();
        let roster = self.roster.clone();
        move || {
            let Some(pending) = pending.upgrade() else {
                return;
            };
            let removal = pending.borrow_mut().remove(&identifier);
            if removal.is_none() {
                return;
            }
            if roster.contains(&peer_id) {
                debug!("Peer {} is back, keeping cursor {}", peer_id, identifier);
                return;
            }
            info!("Grace period over for peer {}, removing cursor {}", peer_id, identifier);
            index.forget_peer(&peer_id);
            index.forget_user(&user_id);
            registry.remove(&identifier);
        }
    }
}
