use std::cell::RefCell;

use log::trace;

use tabletop_shared::{
    EntityId, ObjectBase, ObjectRegistry, ObjectSchema, PropertyDecl, Replicate,
    ReplicateBuilder, SyncContext, UserId,
};

static CHAT_MESSAGE_SCHEMA: ObjectSchema = ObjectSchema {
    alias_name: "chat",
    properties: &[
        PropertyDecl::text("from", ""),
        PropertyDecl::text("to", ""),
        PropertyDecl::text("originFrom", ""),
        PropertyDecl::text("name", ""),
        PropertyDecl::text("toName", ""),
        PropertyDecl::text("tag", ""),
        PropertyDecl::text("dicebot", ""),
        PropertyDecl::text("imageIdentifier", ""),
        PropertyDecl::text("toImageIdentifier", ""),
        PropertyDecl::text("color", ""),
        PropertyDecl::text("toColor", ""),
        PropertyDecl::text("text", ""),
        PropertyDecl::number("timestamp", 0.0),
        PropertyDecl::number("lastUpdate", 0.0),
        PropertyDecl::text("characterIdentifier", ""),
    ],
};

// whitespace separated words of one text property, keyed on its version
#[derive(Default)]
struct SplitCache {
    version: Option<u32>,
    words: Vec<String>,
}

impl SplitCache {
    fn words(&mut self, base: &ObjectBase, name: &str) -> Vec<String> {
        let version = base.version(name);
        if self.version != version {
            self.version = version;
            self.words = base
                .text(name)
                .split_whitespace()
                .map(str::to_string)
                .collect();
        }
        self.words.clone()
    }
}

/// One chat line, a child of the [`ChatTab`](crate::objects::ChatTab) it
/// was posted in
pub struct ChatMessage {
    base: ObjectBase,
    tags: RefCell<SplitCache>,
    send_to: RefCell<SplitCache>,
}

impl ChatMessage {
    pub fn from_user(&self) -> UserId {
        UserId::new(self.base.text("from"))
    }

    pub fn to(&self) -> String {
        self.base.text("to")
    }

    pub fn origin_from(&self) -> String {
        self.base.text("originFrom")
    }

    pub fn name(&self) -> String {
        self.base.text("name")
    }

    pub fn to_name(&self) -> String {
        self.base.text("toName")
    }

    pub fn tag(&self) -> String {
        self.base.text("tag")
    }

    pub fn dicebot(&self) -> String {
        self.base.text("dicebot")
    }

    pub fn image_identifier(&self) -> String {
        self.base.text("imageIdentifier")
    }

    pub fn to_image_identifier(&self) -> String {
        self.base.text("toImageIdentifier")
    }

    pub fn color(&self) -> String {
        self.base.text("color")
    }

    pub fn to_color(&self) -> String {
        self.base.text("toColor")
    }

    pub fn text(&self) -> String {
        self.base.text("text")
    }

    pub fn character_identifier(&self) -> String {
        self.base.text("characterIdentifier")
    }

    /// Milliseconds since the unix epoch. A non-numeric stamp reads as 1.
    pub fn timestamp(&self) -> u64 {
        let timestamp = self.base.number("timestamp");
        if timestamp.is_nan() {
            1
        } else {
            timestamp as u64
        }
    }

    pub fn last_update(&self) -> u64 {
        let last_update = self.base.number("lastUpdate");
        if last_update.is_nan() {
            0
        } else {
            last_update as u64
        }
    }

    pub fn tags(&self) -> Vec<String> {
        self.tags.borrow_mut().words(&self.base, "tag")
    }

    /// Recipients named by `to`
    pub fn send_to(&self) -> Vec<String> {
        self.send_to.borrow_mut().words(&self.base, "to")
    }

    pub fn tab_identifier(&self, registry: &ObjectRegistry) -> Option<EntityId> {
        registry.parent_of(self.base.identifier())
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags().iter().any(|candidate| candidate == tag)
    }

    pub fn is_direct(&self) -> bool {
        !self.send_to().is_empty() || self.has_tag("direct")
    }

    pub fn is_secret(&self) -> bool {
        self.has_tag("secret")
    }

    pub fn is_system(&self) -> bool {
        self.has_tag("system")
    }

    pub fn is_operation_log(&self) -> bool {
        self.has_tag("opelog")
    }

    pub fn is_edited(&self) -> bool {
        self.last_update() > 0
    }

    pub fn is_send_from(&self, user_id: &UserId) -> bool {
        self.base.text("from") == user_id.as_str()
            || self.origin_from() == user_id.as_str()
            || self.has_tag("mine")
    }

    /// Direct messages show only to their sender, their recipients and the GM
    pub fn is_displayable_to(&self, user_id: &UserId, is_gm_mode: bool) -> bool {
        if !self.is_direct() {
            return true;
        }
        is_gm_mode
            || self
                .send_to()
                .iter()
                .any(|recipient| recipient == user_id.as_str())
            || self.is_send_from(user_id)
    }

    pub fn set_from(&mut self, user_id: &UserId) {
        self.base.set("from", user_id.as_str());
    }

    pub fn set_to(&mut self, to: &str) {
        self.base.set("to", to);
    }

    pub fn set_origin_from(&mut self, origin_from: &str) {
        self.base.set("originFrom", origin_from);
    }

    pub fn set_name(&mut self, name: &str) {
        self.base.set("name", name);
    }

    pub fn set_to_name(&mut self, to_name: &str) {
        self.base.set("toName", to_name);
    }

    pub fn set_tag(&mut self, tag: &str) {
        self.base.set("tag", tag);
    }

    pub fn set_dicebot(&mut self, dicebot: &str) {
        self.base.set("dicebot", dicebot);
    }

    pub fn set_image_identifier(&mut self, image_identifier: &str) {
        self.base.set("imageIdentifier", image_identifier);
    }

    pub fn set_to_image_identifier(&mut self, to_image_identifier: &str) {
        self.base.set("toImageIdentifier", to_image_identifier);
    }

    pub fn set_color(&mut self, color: &str) {
        self.base.set("color", color);
    }

    pub fn set_to_color(&mut self, to_color: &str) {
        self.base.set("toColor", to_color);
    }

    pub fn set_text(&mut self, text: &str) {
        self.base.set("text", text);
    }

    pub fn set_timestamp(&mut self, timestamp: u64) {
        self.base.set("timestamp", timestamp as f64);
    }

    pub fn set_character_identifier(&mut self, character_identifier: &str) {
        self.base.set("characterIdentifier", character_identifier);
    }

    /// Replaces the text and stamps the edit time
    pub fn edit(&mut self, text: &str, now: u64) {
        self.base.set("text", text);
        self.base.set("lastUpdate", now as f64);
    }
}

impl Replicate for ChatMessage {
    fn base(&self) -> &ObjectBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ObjectBase {
        &mut self.base
    }

    fn apply(&mut self, context: &SyncContext) {
        if let Some(incoming) = context.get("lastUpdate").and_then(|value| value.as_f64()) {
            let local = self.base.number("lastUpdate");
            if incoming < local {
                trace!(
                    "Ignoring stale edit of message {} ({} < {})",
                    self.base.identifier(),
                    incoming,
                    local
                );
                return;
            }
        }
        self.base.apply(context);
    }
}

impl ReplicateBuilder for ChatMessage {
    const SCHEMA: &'static ObjectSchema = &CHAT_MESSAGE_SCHEMA;

    fn build(identifier: EntityId) -> Self {
        Self {
            base: ObjectBase::new(identifier, Self::SCHEMA),
            tags: RefCell::new(SplitCache::default()),
            send_to: RefCell::new(SplitCache::default()),
        }
    }
}
