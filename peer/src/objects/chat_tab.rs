use tabletop_shared::{
    EntityId, ObjectBase, ObjectRegistry, ObjectSchema, PropertyDecl, Replicate,
    ReplicateBuilder, TypedRef,
};

use crate::objects::ChatMessage;

static CHAT_TAB_SCHEMA: ObjectSchema = ObjectSchema {
    alias_name: "chat-tab",
    properties: &[
        PropertyDecl::text("name", ""),
        PropertyDecl::number("recieveOperationLogLevel", 0.0),
    ],
};

/// A chat channel. Its messages are its children.
///
/// A tab takes operation logs up to its receive level; level 0 takes none.
pub struct ChatTab {
    base: ObjectBase,
}

impl ChatTab {
    pub fn create(name: &str) -> Self {
        let mut tab = Self::build(EntityId::generate());
        tab.set_name(name);
        tab
    }

    pub fn name(&self) -> String {
        self.base.text("name")
    }

    pub fn set_name(&mut self, name: &str) {
        self.base.set("name", name);
    }

    pub fn receive_operation_log_level(&self) -> u32 {
        let level = self.base.number("recieveOperationLogLevel");
        if level.is_nan() || level < 0.0 {
            0
        } else {
            level as u32
        }
    }

    pub fn set_receive_operation_log_level(&mut self, level: u32) {
        self.base.set("recieveOperationLogLevel", f64::from(level));
    }

    pub fn receives_operation_log(&self, level: u32) -> bool {
        level <= self.receive_operation_log_level()
    }

    /// Messages of this tab, oldest first
    pub fn messages(&self, registry: &ObjectRegistry) -> Vec<TypedRef<ChatMessage>> {
        let mut messages = registry.children_of_type::<ChatMessage>(self.base.identifier());
        messages.sort_by_cached_key(|message| message.borrow().timestamp());
        messages
    }

    /// Timestamp of the newest message, 0 for an empty tab
    pub fn latest_timestamp(&self, registry: &ObjectRegistry) -> u64 {
        registry
            .children_of_type::<ChatMessage>(self.base.identifier())
            .iter()
            .map(|message| message.borrow().timestamp())
            .max()
            .unwrap_or(0)
    }
}

impl Replicate for ChatTab {
    fn base(&self) -> &ObjectBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ObjectBase {
        &mut self.base
    }
}

impl ReplicateBuilder for ChatTab {
    const SCHEMA: &'static ObjectSchema = &CHAT_TAB_SCHEMA;

    fn build(identifier: EntityId) -> Self {
        Self {
            base: ObjectBase::new(identifier, Self::SCHEMA),
        }
    }
}
