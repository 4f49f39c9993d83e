use std::rc::Rc;

use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};

use tabletop_shared::{
    topics::{MessageAddedPayload, ObjectEventPayload, ADD_GAME_OBJECT, MESSAGE_ADDED},
    Clock, EntityId, EventBus, ObjectRegistry, PeerCursor, PresenceManager, ReplicateBuilder,
    SubscriberKey, TypedRef,
};

use crate::{
    objects::{ChatMessage, ChatTab, GameCharacter},
    PeerError,
};

/// Per-message choices that do not come from the sender object
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MessageOptions {
    /// Dice system tag, becomes the message tag
    pub game_type: String,
    pub color: String,
    /// Character the message speaks for, when sent from a palette
    pub character_identifier: Option<EntityId>,
}

/// Creates chat tabs and messages, and raises `MESSAGE_ADDED` whenever a
/// message (local or replicated) lands in a tab.
pub struct ChatService {
    registry: ObjectRegistry,
    bus: EventBus,
    clock: Rc<dyn Clock>,
    subscriber: SubscriberKey,
}

impl ChatService {
    pub const UNNAMED_CHARACTER: &'static str = "(unnamed character)";
    pub const UNNAMED_PLAYER: &'static str = "(unnamed player)";

    pub fn new(registry: &ObjectRegistry, clock: &Rc<dyn Clock>) -> Self {
        let bus = registry.bus().clone();
        let subscriber = bus.subscriber();

        let added_registry = registry.clone();
        let added_bus = bus.clone();
        bus.register(&subscriber).on(ADD_GAME_OBJECT, move |event| {
            let Some(payload) = event.data_as::<ObjectEventPayload>() else {
                return;
            };
            if payload.alias_name != ChatMessage::SCHEMA.alias_name {
                return;
            }
            let Some(tab_identifier) = added_registry.parent_of(&payload.identifier) else {
                trace!("Message {} has no tab yet", payload.identifier);
                return;
            };
            let is_tab = added_registry
                .get(&tab_identifier)
                .map_or(false, |tab| tab.alias_name() == ChatTab::SCHEMA.alias_name);
            if !is_tab {
                return;
            }
            added_bus.trigger(
                MESSAGE_ADDED,
                &MessageAddedPayload {
                    tab_identifier,
                    message_identifier: payload.identifier,
                },
            );
        });

        Self {
            registry: registry.clone(),
            bus,
            clock: clock.clone(),
            subscriber,
        }
    }

    pub fn create_tab(&self, name: &str) -> TypedRef<ChatTab> {
        self.registry.add(ChatTab::create(name))
    }

    pub fn tabs(&self) -> Vec<TypedRef<ChatTab>> {
        self.registry.get_objects_of::<ChatTab>()
    }

    /// Posts `text` to `tab` as spoken by `send_from` (a character or a
    /// cursor). `send_to` makes it a direct message.
    pub fn send_message(
        &self,
        presence: &PresenceManager,
        tab: &EntityId,
        text: &str,
        send_from: &EntityId,
        send_to: Option<&EntityId>,
        options: &MessageOptions,
    ) -> Result<TypedRef<ChatMessage>, PeerError> {
        let tab_ref = self
            .registry
            .get_typed::<ChatTab>(tab)
            .ok_or_else(|| PeerError::TabNotFound {
                identifier: tab.to_string(),
            })?;

        let mut message = ChatMessage::build(EntityId::generate());
        message.set_from(presence.user_id());
        message.set_name(&self.find_object_name(send_from));
        message.set_image_identifier(&self.find_image_identifier(send_from));
        message.set_tag(&options.game_type);
        message.set_text(&normalize_newlines(text));
        message.set_color(&options.color);
        message.set_timestamp(self.next_timestamp(&tab_ref));
        if let Some(character) = &options.character_identifier {
            message.set_character_identifier(character.as_str());
        }
        if let Some(send_to) = send_to {
            message.set_to(&self.find_id(send_to).unwrap_or_default());
            message.set_to_name(&self.find_object_name(send_to));
            message.set_to_image_identifier(&self.find_image_identifier(send_to));
            message.set_to_color(&self.find_object_color(presence, send_to));
        }

        let message = self.registry.try_add_child(tab, message)?;
        debug!("Posted message {} to tab {}", message.identifier(), tab);
        Ok(message)
    }

    /// Posts `text` as an `opelog` message from the local cursor to every
    /// tab whose receive level admits `level`. Returns the posted messages.
    pub fn send_operation_log(
        &self,
        presence: &PresenceManager,
        text: &str,
        level: u32,
    ) -> Vec<TypedRef<ChatMessage>> {
        let cursor = presence.my_cursor();
        let mut posted = Vec::new();
        for tab in self.tabs() {
            if !tab.borrow().receives_operation_log(level) {
                continue;
            }
            let mut message = ChatMessage::build(EntityId::generate());
            message.set_from(presence.user_id());
            if let Some(cursor) = &cursor {
                let cursor = cursor.borrow();
                message.set_name(&cursor.name());
                message.set_image_identifier(&cursor.image_identifier());
                message.set_color(&cursor.color());
            }
            message.set_tag(OPERATION_LOG_TAG);
            message.set_text(&normalize_newlines(text));
            message.set_timestamp(self.next_timestamp(&tab));

            match self.registry.try_add_child(tab.identifier(), message) {
                Ok(message) => posted.push(message),
                Err(error) => warn!("Operation log not posted to {}: {}", tab.identifier(), error),
            }
        }
        debug!("Operation log reached {} tab(s)", posted.len());
        posted
    }

    /// Replaces the text of a message and stamps it as edited
    pub fn edit_message(&self, message: &TypedRef<ChatMessage>, text: &str) {
        message
            .borrow_mut()
            .edit(&normalize_newlines(text), self.clock.unix_millis());
    }

    /// Now, unless the tab already holds a message at or after now
    fn next_timestamp(&self, tab: &TypedRef<ChatTab>) -> u64 {
        let now = self.clock.unix_millis();
        let latest = tab.borrow().latest_timestamp(&self.registry);
        if now <= latest {
            latest + 1
        } else {
            now
        }
    }

    fn find_id(&self, identifier: &EntityId) -> Option<String> {
        let object = self.registry.get(identifier)?;
        if object.is::<GameCharacter>() {
            return Some(identifier.to_string());
        }
        let cursor = object.downcast::<PeerCursor>()?;
        let user_id = cursor.borrow().user_id();
        Some(user_id.to_string())
    }

    fn find_object_name(&self, identifier: &EntityId) -> String {
        if let Some(character) = self.registry.get_typed::<GameCharacter>(identifier) {
            let name = character.borrow().name();
            return non_empty_or(name, Self::UNNAMED_CHARACTER);
        }
        if let Some(cursor) = self.registry.get_typed::<PeerCursor>(identifier) {
            let name = cursor.borrow().name();
            return non_empty_or(name, Self::UNNAMED_PLAYER);
        }
        identifier.to_string()
    }

    fn find_image_identifier(&self, identifier: &EntityId) -> String {
        if let Some(character) = self.registry.get_typed::<GameCharacter>(identifier) {
            return character.borrow().image_identifier();
        }
        if let Some(cursor) = self.registry.get_typed::<PeerCursor>(identifier) {
            return cursor.borrow().image_identifier();
        }
        identifier.to_string()
    }

    fn find_object_color(&self, presence: &PresenceManager, identifier: &EntityId) -> String {
        if let Some(character) = self.registry.get_typed::<GameCharacter>(identifier) {
            let palette = character.borrow().chat_palette(&self.registry);
            return palette.map_or_else(
                || PeerCursor::DEFAULT_COLOR.to_string(),
                |palette| palette.borrow().color(presence),
            );
        }
        if let Some(cursor) = self.registry.get_typed::<PeerCursor>(identifier) {
            return cursor.borrow().color();
        }
        String::new()
    }
}

impl Drop for ChatService {
    fn drop(&mut self) {
        self.bus.unregister(&self.subscriber);
    }
}

const OPERATION_LOG_TAG: &str = "opelog";

fn non_empty_or(name: String, fallback: &str) -> String {
    if name.is_empty() {
        fallback.to_string()
    } else {
        name
    }
}

fn normalize_newlines(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}
