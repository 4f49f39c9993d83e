use std::{
    cell::RefCell,
    collections::{HashMap, HashSet, VecDeque},
    rc::Rc,
};

use log::{trace, warn};
use serde::Serialize;
use serde_json::Value;

use crate::{
    events::topics::validate_topic, Event, EventError, KeyGenerator, NetworkEvent, OutgoingEvent,
    PeerId, SubscriberKey,
};

pub type EventHandler = Rc<dyn Fn(&Event)>;

struct Listener {
    listener_id: u64,
    subscriber: SubscriberKey,
    handler: EventHandler,
}

struct BusInner {
    local_peer_id: PeerId,
    subscriber_keys: KeyGenerator<SubscriberKey>,
    next_listener_id: u64,
    listeners: HashMap<String, Vec<Listener>>,
    live_listeners: HashSet<u64>,
    outbox: VecDeque<OutgoingEvent>,
}

/// Named-topic publish/subscribe for one peer.
///
/// Handlers run synchronously in registration order. Local events stay on
/// this peer; network events are delivered locally and queued in the outbox
/// for the peer loop to hand to the transport.
#[derive(Clone)]
pub struct EventBus {
    inner: Rc<RefCell<BusInner>>,
}

impl EventBus {
    pub fn new(local_peer_id: PeerId) -> Self {
        Self {
            inner: Rc::new(RefCell::new(BusInner {
                local_peer_id,
                subscriber_keys: KeyGenerator::new(),
                next_listener_id: 0,
                listeners: HashMap::new(),
                live_listeners: HashSet::new(),
                outbox: VecDeque::new(),
            })),
        }
    }

    pub fn local_peer_id(&self) -> PeerId {
        self.inner.borrow().local_peer_id.clone()
    }

    /// Issues a key that groups handlers for bulk unregistration
    pub fn subscriber(&self) -> SubscriberKey {
        self.inner.borrow_mut().subscriber_keys.generate()
    }

    pub fn register(&self, subscriber: &SubscriberKey) -> Registration<'_> {
        Registration {
            bus: self,
            subscriber: *subscriber,
        }
    }

    /// Removes every handler of `subscriber`, including ones still pending
    /// in a dispatch that is under way. Returns how many were removed.
    pub fn unregister(&self, subscriber: &SubscriberKey) -> usize {
        let mut inner = self.inner.borrow_mut();
        let mut removed_ids = Vec::new();
        for listeners in inner.listeners.values_mut() {
            listeners.retain(|listener| {
                if listener.subscriber == *subscriber {
                    removed_ids.push(listener.listener_id);
                    false
                } else {
                    true
                }
            });
        }
        inner.listeners.retain(|_, listeners| !listeners.is_empty());
        for listener_id in removed_ids.iter() {
            inner.live_listeners.remove(listener_id);
        }
        removed_ids.len()
    }

    pub fn listener_count(&self, topic: &str) -> usize {
        self.inner
            .borrow()
            .listeners
            .get(topic)
            .map_or(0, Vec::len)
    }

    /// Local-only emission
    ///
    /// # Panics
    ///
    /// Panics on a malformed topic or an unencodable payload.
    /// Consider using `try_trigger` for non-panicking error handling.
    pub fn trigger<T: Serialize + ?Sized>(&self, topic: &str, data: &T) {
        if let Err(error) = self.try_trigger(topic, data) {
            panic!("{}", error);
        }
    }

    pub fn try_trigger<T: Serialize + ?Sized>(&self, topic: &str, data: &T) -> Result<(), EventError> {
        validate_topic(topic)?;
        let data = encode(topic, data)?;
        self.dispatch(&Event::new(topic.to_string(), data, self.local_peer_id(), true));
        Ok(())
    }

    /// Network emission: delivered locally, then to `target` or to every
    /// connected peer when `target` is `None`
    ///
    /// # Panics
    ///
    /// Panics on a malformed topic or an unencodable payload.
    /// Consider using `try_call` for non-panicking error handling.
    pub fn call<T: Serialize + ?Sized>(&self, topic: &str, data: &T, target: Option<&PeerId>) {
        if let Err(error) = self.try_call(topic, data, target) {
            panic!("{}", error);
        }
    }

    pub fn try_call<T: Serialize + ?Sized>(
        &self,
        topic: &str,
        data: &T,
        target: Option<&PeerId>,
    ) -> Result<(), EventError> {
        validate_topic(topic)?;
        let data = encode(topic, data)?;
        let local_peer_id = self.local_peer_id();

        // queued before local delivery so anything handlers emit goes out after it
        if target != Some(&local_peer_id) {
            self.enqueue(topic, data.clone(), target);
        }
        self.dispatch(&Event::new(topic.to_string(), data, local_peer_id, true));
        Ok(())
    }

    /// Network emission that skips local delivery
    ///
    /// # Panics
    ///
    /// Panics on a malformed topic or an unencodable payload.
    /// Consider using `try_send` for non-panicking error handling.
    pub fn send<T: Serialize + ?Sized>(&self, topic: &str, data: &T, target: Option<&PeerId>) {
        if let Err(error) = self.try_send(topic, data, target) {
            panic!("{}", error);
        }
    }

    pub fn try_send<T: Serialize + ?Sized>(
        &self,
        topic: &str,
        data: &T,
        target: Option<&PeerId>,
    ) -> Result<(), EventError> {
        validate_topic(topic)?;
        let data = encode(topic, data)?;
        self.enqueue(topic, data, target);
        Ok(())
    }

    /// Re-emits an inbound network event locally. Malformed topics from the
    /// network are dropped, never fatal.
    pub fn dispatch_remote(&self, event: NetworkEvent) {
        if let Err(error) = validate_topic(&event.event_name) {
            warn!("Dropping inbound event from {}: {}", event.send_from, error);
            return;
        }
        let is_send_from_self = event.send_from == self.local_peer_id();
        self.dispatch(&Event::new(
            event.event_name,
            event.data,
            event.send_from,
            is_send_from_self,
        ));
    }

    /// Drains queued network events in emission order
    pub fn take_outbox(&self) -> Vec<OutgoingEvent> {
        self.inner.borrow_mut().outbox.drain(..).collect()
    }

    pub fn has_outgoing(&self) -> bool {
        !self.inner.borrow().outbox.is_empty()
    }

    fn add_listener(
        &self,
        subscriber: SubscriberKey,
        topic: &str,
        handler: EventHandler,
    ) -> Result<(), EventError> {
        validate_topic(topic)?;
        let mut inner = self.inner.borrow_mut();
        let listener_id = inner.next_listener_id;
        inner.next_listener_id += 1;
        inner.live_listeners.insert(listener_id);
        inner
            .listeners
            .entry(topic.to_string())
            .or_default()
            .push(Listener {
                listener_id,
                subscriber,
                handler,
            });
        Ok(())
    }

    fn enqueue(&self, topic: &str, data: Value, target: Option<&PeerId>) {
        let mut inner = self.inner.borrow_mut();
        let event = NetworkEvent {
            event_name: topic.to_string(),
            data,
            send_from: inner.local_peer_id.clone(),
        };
        inner.outbox.push_back(OutgoingEvent {
            target: target.cloned(),
            event,
        });
    }

    fn dispatch(&self, event: &Event) {
        // snapshot, so handlers may register, unregister and emit freely
        let listeners: Vec<(u64, EventHandler)> = {
            let inner = self.inner.borrow();
            let Some(listeners) = inner.listeners.get(&event.event_name) else {
                trace!("No listeners for {}", event.event_name);
                return;
            };
            listeners
                .iter()
                .map(|listener| (listener.listener_id, listener.handler.clone()))
                .collect()
        };

        for (listener_id, handler) in listeners {
            if event.is_propagation_stopped() {
                trace!("Propagation of {} stopped", event.event_name);
                break;
            }
            let is_live = self.inner.borrow().live_listeners.contains(&listener_id);
            if is_live {
                handler(event);
            }
        }
    }
}

fn encode<T: Serialize + ?Sized>(topic: &str, data: &T) -> Result<Value, EventError> {
    serde_json::to_value(data).map_err(|error| EventError::PayloadEncoding {
        topic: topic.to_string(),
        reason: error.to_string(),
    })
}

/// Chained handler registration for one subscriber
pub struct Registration<'a> {
    bus: &'a EventBus,
    subscriber: SubscriberKey,
}

impl<'a> Registration<'a> {
    /// # Panics
    ///
    /// Panics on a malformed topic.
    /// Consider using `try_on` for non-panicking error handling.
    pub fn on<F: Fn(&Event) + 'static>(self, topic: &str, handler: F) -> Self {
        match self.try_on(topic, handler) {
            Ok(registration) => registration,
            Err(error) => panic!("{}", error),
        }
    }

    pub fn try_on<F: Fn(&Event) + 'static>(self, topic: &str, handler: F) -> Result<Self, EventError> {
        self.bus
            .add_listener(self.subscriber, topic, Rc::new(handler))?;
        Ok(self)
    }

    pub fn subscriber(&self) -> SubscriberKey {
        self.subscriber
    }
}
