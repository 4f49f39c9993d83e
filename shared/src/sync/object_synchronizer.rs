use log::{debug, warn};

use crate::{
    events::topics::{
        DestroyPayload, PeerEventPayload, DESTROY_GAME_OBJECT, PEER_CONNECTED, UPDATE_GAME_OBJECT,
    },
    EventBus, ObjectRegistry, SubscriberKey, SyncContext,
};

/// Moves registry state across the bus: local changes out as
/// `UPDATE_GAME_OBJECT` / `DESTROY_GAME_OBJECT`, remote ones into the
/// registry.
///
/// Create it before any other subscriber so that later handlers of the same
/// event see the object already updated. A context the registry refuses is
/// not passed on to them.
pub struct ObjectSynchronizer {
    registry: ObjectRegistry,
    bus: EventBus,
    subscriber: SubscriberKey,
}

impl ObjectSynchronizer {
    pub fn new(registry: &ObjectRegistry) -> Self {
        let bus = registry.bus().clone();
        let subscriber = bus.subscriber();

        let update_registry = registry.clone();
        let destroy_registry = registry.clone();
        let snapshot_registry = registry.clone();
        let snapshot_bus = bus.clone();

        bus.register(&subscriber)
            .on(UPDATE_GAME_OBJECT, move |event| {
                if event.is_send_from_self {
                    return;
                }
                let Some(context) = event.data_as::<SyncContext>() else {
                    warn!("Malformed {} from {}", UPDATE_GAME_OBJECT, event.send_from);
                    return;
                };
                if let Err(error) = update_registry.receive_context(&context) {
                    debug!("Context from {} not applied: {}", event.send_from, error);
                    event.stop_propagation();
                }
            })
            .on(DESTROY_GAME_OBJECT, move |event| {
                if event.is_send_from_self {
                    return;
                }
                let Some(payload) = event.data_as::<DestroyPayload>() else {
                    warn!("Malformed {} from {}", DESTROY_GAME_OBJECT, event.send_from);
                    return;
                };
                destroy_registry.receive_destroy(&payload.identifiers);
            })
            .on(PEER_CONNECTED, move |event| {
                let Some(payload) = event.data_as::<PeerEventPayload>() else {
                    return;
                };
                let contexts = snapshot_registry.contexts();
                debug!("Sending {} object(s) to {}", contexts.len(), payload.peer_id);
                for context in contexts.iter() {
                    snapshot_bus.send(UPDATE_GAME_OBJECT, context, Some(&payload.peer_id));
                }
            });

        Self {
            registry: registry.clone(),
            bus,
            subscriber,
        }
    }

    /// Queues every pending local change for broadcast. Returns the number
    /// of events queued.
    pub fn flush(&self) -> usize {
        let contexts = self.registry.take_outgoing();
        let mut queued = contexts.len();
        for context in contexts.iter() {
            self.bus.call(UPDATE_GAME_OBJECT, context, None);
        }

        let identifiers = self.registry.take_removals();
        if !identifiers.is_empty() {
            self.bus
                .call(DESTROY_GAME_OBJECT, &DestroyPayload { identifiers }, None);
            queued += 1;
        }
        queued
    }
}

impl Drop for ObjectSynchronizer {
    fn drop(&mut self) {
        self.bus.unregister(&self.subscriber);
    }
}
