use std::{
    cell::RefCell,
    collections::HashMap,
    rc::{Rc, Weak},
    time::{Duration, Instant},
};

use log::trace;
use serde::Serialize;

use tabletop_shared::{
    topics::{
        MessageAddedPayload, PeerEventPayload, DISCONNECT_PEER, MESSAGE_ADDED, WRITING_A_MESSAGE,
    },
    EntityId, EventBus, IdentityIndex, ObjectRegistry, PeerCursor, PeerId, PresenceManager,
    ResettableTimeout, Scheduler, SubscriberKey,
};

use crate::{objects::ChatMessage, ChatConfig};

type WriterKey = (EntityId, PeerId);
type Writers = Rc<RefCell<HashMap<WriterKey, ResettableTimeout>>>;

/// A remote participant currently typing in a tab
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Writer {
    pub peer_id: PeerId,
    pub name: String,
    pub color: String,
}

#[derive(Default)]
struct InputState {
    last_sent: Option<Instant>,
    previous_length: usize,
}

/// Shows who is composing a message in each tab, and tells other peers
/// when the local user is.
///
/// An indicator disappears when its peer posts to that tab, disconnects, or
/// goes quiet for the writing timeout.
pub struct WritingIndicator {
    registry: ObjectRegistry,
    bus: EventBus,
    index: IdentityIndex,
    scheduler: Scheduler,
    throttle: Duration,
    writers: Writers,
    inputs: RefCell<HashMap<EntityId, InputState>>,
    subscriber: SubscriberKey,
}

impl WritingIndicator {
    pub fn new(
        config: &ChatConfig,
        registry: &ObjectRegistry,
        presence: &PresenceManager,
        scheduler: &Scheduler,
    ) -> Self {
        let bus = registry.bus().clone();
        let subscriber = bus.subscriber();
        let writers: Writers = Rc::new(RefCell::new(HashMap::new()));

        let writing_writers = writers.clone();
        let writing_scheduler = scheduler.clone();
        let writing_timeout = config.writing_timeout;

        let added_writers = writers.clone();
        let added_registry = registry.clone();
        let added_index = presence.index().clone();

        let disconnect_writers = writers.clone();

        bus.register(&subscriber)
            .on(WRITING_A_MESSAGE, move |event| {
                if event.is_send_from_self {
                    return;
                }
                let Some(tab) = event.data_as::<EntityId>() else {
                    return;
                };
                let key = (tab, event.send_from.clone());
                let mut writers = writing_writers.borrow_mut();
                let timeout = writers.entry(key.clone()).or_insert_with(|| {
                    trace!("{} is writing in {}", key.1, key.0);
                    writing_scheduler.start_timeout(
                        writing_timeout,
                        expiry(Rc::downgrade(&writing_writers), key.clone()),
                    )
                });
                timeout.reset();
            })
            .on(MESSAGE_ADDED, move |event| {
                let Some(payload) = event.data_as::<MessageAddedPayload>() else {
                    return;
                };
                let Some(message) =
                    added_registry.get_typed::<ChatMessage>(&payload.message_identifier)
                else {
                    return;
                };
                let user_id = message.borrow().from_user();
                let Some(cursor) = added_index.find_by_user_id(&added_registry, &user_id) else {
                    return;
                };
                let peer_id = cursor.borrow().peer_id();
                added_writers
                    .borrow_mut()
                    .remove(&(payload.tab_identifier, peer_id));
            })
            .on(DISCONNECT_PEER, move |event| {
                if let Some(payload) = event.data_as::<PeerEventPayload>() {
                    disconnect_writers
                        .borrow_mut()
                        .retain(|(_, peer_id), _| *peer_id != payload.peer_id);
                }
            });

        Self {
            registry: registry.clone(),
            bus,
            index: presence.index().clone(),
            scheduler: scheduler.clone(),
            throttle: config.writing_throttle,
            writers,
            inputs: RefCell::new(HashMap::new()),
            subscriber,
        }
    }

    /// Peers currently writing in `tab`, sorted
    pub fn writing_peers(&self, tab: &EntityId) -> Vec<PeerId> {
        let mut peer_ids: Vec<PeerId> = self
            .writers
            .borrow()
            .keys()
            .filter(|(writer_tab, _)| writer_tab == tab)
            .map(|(_, peer_id)| peer_id.clone())
            .collect();
        peer_ids.sort();
        peer_ids
    }

    /// Peers currently writing in `tab`, with the name and color of their
    /// cursor
    pub fn writers(&self, tab: &EntityId) -> Vec<Writer> {
        self.writing_peers(tab)
            .into_iter()
            .map(|peer_id| match self.index.find_by_peer_id(&self.registry, &peer_id) {
                Some(cursor) => {
                    let cursor = cursor.borrow();
                    Writer {
                        name: cursor.name(),
                        color: cursor.color(),
                        peer_id,
                    }
                }
                None => Writer {
                    peer_id,
                    name: String::new(),
                    color: PeerCursor::TRANSPARENT_COLOR.to_string(),
                },
            })
            .collect()
    }

    /// Called as the local user edits their draft in `tab`. Announces
    /// `WRITING_A_MESSAGE` when the draft did not shrink and the throttle
    /// window has passed. `target` limits the announcement to one peer, for
    /// direct messages. Returns whether an announcement was queued.
    pub fn notify_input(&self, tab: &EntityId, text_length: usize, target: Option<&PeerId>) -> bool {
        let now = self.scheduler.now();
        {
            let mut inputs = self.inputs.borrow_mut();
            let state = inputs.entry(tab.clone()).or_default();
            let ready = state
                .last_sent
                .map_or(true, |last_sent| now.duration_since(last_sent) >= self.throttle);
            let growing = state.previous_length <= text_length;
            state.previous_length = text_length;
            if !(ready && growing) {
                return false;
            }
            state.last_sent = Some(now);
        }
        self.bus.call(WRITING_A_MESSAGE, tab, target);
        true
    }

    /// Forgets the draft length for `tab`, after sending or clearing it
    pub fn clear_input(&self, tab: &EntityId) {
        if let Some(state) = self.inputs.borrow_mut().get_mut(tab) {
            state.previous_length = 0;
        }
    }
}

impl Drop for WritingIndicator {
    fn drop(&mut self) {
        self.bus.unregister(&self.subscriber);
        self.writers.borrow_mut().clear();
    }
}

fn expiry(writers: Weak<RefCell<HashMap<WriterKey, ResettableTimeout>>>, key: WriterKey) -> impl Fn() {
    move || {
        let Some(writers) = writers.upgrade() else {
            return;
        };
        if writers.borrow_mut().remove(&key).is_some() {
            trace!("{} stopped writing in {}", key.1, key.0);
        }
    }
}
