use std::rc::Rc;

use log::{info, trace, warn};

use tabletop_shared::{
    topics::{PeerEventPayload, DISCONNECT_PEER, PEER_CONNECTED},
    Clock, EntityId, EventBus, NetworkEvent, ObjectRegistry, ObjectSynchronizer, PeerCursor,
    PeerId, PresenceManager, Roster, Scheduler, Transport, TransportEvent, TypedRef, UserId,
};

use crate::{
    objects::{register_kinds, ChatMessage},
    ChatService, MessageOptions, PeerConfig, PeerError, WritingIndicator,
};

/// One participant of a table: its copy of the shared objects, the
/// services built on top, and the transport linking it to the others.
///
/// Nothing happens in the background. The owner calls [`Peer::update`]
/// regularly to receive, fire timeouts and send.
pub struct Peer<T: Transport> {
    config: PeerConfig,
    transport: T,
    bus: EventBus,
    registry: ObjectRegistry,
    scheduler: Scheduler,
    // first subscriber, so later handlers see applied state
    synchronizer: ObjectSynchronizer,
    presence: PresenceManager,
    chat: ChatService,
    writing: WritingIndicator,
}

impl<T: Transport> Peer<T> {
    pub fn new(config: PeerConfig, transport: T, clock: Rc<dyn Clock>) -> Self {
        let bus = EventBus::new(transport.local_peer_id().clone());
        let registry = ObjectRegistry::new(&bus);
        let scheduler = Scheduler::new(clock);
        let synchronizer = ObjectSynchronizer::new(&registry);
        register_kinds(&registry);

        let presence = PresenceManager::new(
            &config.presence,
            &registry,
            &scheduler,
            &transport.roster(),
            &config.user_id,
        );
        let chat = ChatService::new(&registry, scheduler.clock());
        let writing = WritingIndicator::new(&config.chat, &registry, &presence, &scheduler);

        info!(
            "Peer {} started for user {}",
            transport.local_peer_id(),
            config.user_id
        );

        Self {
            config,
            transport,
            bus,
            registry,
            scheduler,
            synchronizer,
            presence,
            chat,
            writing,
        }
    }

    pub fn config(&self) -> &PeerConfig {
        &self.config
    }

    pub fn local_peer_id(&self) -> &PeerId {
        self.transport.local_peer_id()
    }

    pub fn user_id(&self) -> &UserId {
        &self.config.user_id
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn roster(&self) -> Roster {
        self.transport.roster()
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn registry(&self) -> &ObjectRegistry {
        &self.registry
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn presence(&self) -> &PresenceManager {
        &self.presence
    }

    pub fn presence_mut(&mut self) -> &mut PresenceManager {
        &mut self.presence
    }

    pub fn chat(&self) -> &ChatService {
        &self.chat
    }

    pub fn writing(&self) -> &WritingIndicator {
        &self.writing
    }

    /// Opens a link to `target`. The link is usable once `update` has seen
    /// it come up.
    pub fn connect(&mut self, target: &PeerId) -> Result<(), PeerError> {
        self.transport.connect(target)?;
        Ok(())
    }

    pub fn disconnect(&mut self, peer_id: &PeerId) {
        self.transport.disconnect(peer_id);
    }

    pub fn create_my_cursor(&mut self, name: &str) -> TypedRef<PeerCursor> {
        self.presence.create_my_cursor(name)
    }

    /// Posts a message and clears the local writing state of the tab
    pub fn send_message(
        &self,
        tab: &EntityId,
        text: &str,
        send_from: &EntityId,
        send_to: Option<&EntityId>,
        options: &MessageOptions,
    ) -> Result<TypedRef<ChatMessage>, PeerError> {
        let message = self
            .chat
            .send_message(&self.presence, tab, text, send_from, send_to, options)?;
        self.writing.clear_input(tab);
        Ok(message)
    }

    /// See [`ChatService::send_operation_log`]
    pub fn send_operation_log(&self, text: &str, level: u32) -> Vec<TypedRef<ChatMessage>> {
        self.chat.send_operation_log(&self.presence, text, level)
    }

    /// See [`WritingIndicator::notify_input`]
    pub fn notify_input(&self, tab: &EntityId, text_length: usize, target: Option<&PeerId>) -> bool {
        self.writing.notify_input(tab, text_length, target)
    }

    /// Runs one turn of the loop: drains the transport, fires due
    /// timeouts, broadcasts local changes and delivers queued events.
    pub fn update(&mut self) {
        self.receive();
        self.scheduler.poll();
        self.synchronizer.flush();
        self.deliver();
    }

    fn receive(&mut self) {
        while let Some(event) = self.transport.receive() {
            match event {
                TransportEvent::Connected(peer_id) => {
                    info!("Peer {} connected", peer_id);
                    self.bus
                        .trigger(PEER_CONNECTED, &PeerEventPayload { peer_id });
                }
                TransportEvent::Disconnected(peer_id) => {
                    info!("Peer {} disconnected", peer_id);
                    self.bus
                        .trigger(DISCONNECT_PEER, &PeerEventPayload { peer_id });
                }
                TransportEvent::Message(peer_id, event) => {
                    trace!("{} from {}", event.event_name, peer_id);
                    self.bus.dispatch_remote(event);
                }
            }
        }
    }

    fn deliver(&mut self) {
        for outgoing in self.bus.take_outbox() {
            match &outgoing.target {
                Some(target) => self.send_to(target, &outgoing.event),
                None => {
                    for peer_id in self.transport.roster().peer_ids() {
                        self.send_to(&peer_id, &outgoing.event);
                    }
                }
            }
        }
    }

    fn send_to(&mut self, peer_id: &PeerId, event: &NetworkEvent) {
        if let Err(error) = self.transport.send(peer_id, event) {
            warn!("Dropped {} for {}: {}", event.event_name, peer_id, error);
        }
    }
}
