use tabletop_shared::{
    EntityId, ObjectBase, ObjectRegistry, ObjectSchema, PeerCursor, PresenceManager,
    PropertyDecl, Replicate, ReplicateBuilder, TypedRef, UserId,
};

use crate::objects::ChatPalette;

static GAME_CHARACTER_SCHEMA: ObjectSchema = ObjectSchema {
    alias_name: "character",
    properties: &[
        PropertyDecl::text("name", ""),
        PropertyDecl::number("size", 1.0),
        PropertyDecl::text("imageIdentifier", ""),
        PropertyDecl::number("rotate", 0.0),
        PropertyDecl::number("roll", 0.0),
        PropertyDecl::boolean("isDropShadow", true),
        PropertyDecl::boolean("isShowChatBubble", true),
        PropertyDecl::text("owner", ""),
        PropertyDecl::text("location", GameCharacter::TABLE_LOCATION),
        PropertyDecl::number("posX", 0.0),
        PropertyDecl::number("posY", 0.0),
        PropertyDecl::number("posZ", 0.0),
    ],
};

/// A piece on the table. Its chat palette, if any, is a child object.
pub struct GameCharacter {
    base: ObjectBase,
}

impl GameCharacter {
    pub const TABLE_LOCATION: &'static str = "table";

    pub fn create(name: &str, size: f64, image_identifier: &str) -> Self {
        let mut character = Self::build(EntityId::generate());
        character.set_name(name);
        character.set_size(size);
        character.set_image_identifier(image_identifier);
        character
    }

    pub fn name(&self) -> String {
        self.base.text("name")
    }

    pub fn size(&self) -> f64 {
        self.base.number("size")
    }

    pub fn image_identifier(&self) -> String {
        self.base.text("imageIdentifier")
    }

    pub fn rotate(&self) -> f64 {
        self.base.number("rotate")
    }

    pub fn roll(&self) -> f64 {
        self.base.number("roll")
    }

    pub fn is_drop_shadow(&self) -> bool {
        self.base.boolean("isDropShadow")
    }

    pub fn is_show_chat_bubble(&self) -> bool {
        self.base.boolean("isShowChatBubble")
    }

    /// The user hiding this character from everyone else, if any
    pub fn owner(&self) -> Option<UserId> {
        let owner = self.base.text("owner");
        if owner.is_empty() {
            None
        } else {
            Some(UserId::new(owner))
        }
    }

    pub fn location(&self) -> String {
        self.base.text("location")
    }

    pub fn position(&self) -> (f64, f64, f64) {
        (
            self.base.number("posX"),
            self.base.number("posY"),
            self.base.number("posZ"),
        )
    }

    pub fn set_name(&mut self, name: &str) {
        self.base.set("name", name);
    }

    pub fn set_size(&mut self, size: f64) {
        self.base.set("size", size);
    }

    pub fn set_image_identifier(&mut self, image_identifier: &str) {
        self.base.set("imageIdentifier", image_identifier);
    }

    pub fn set_rotate(&mut self, rotate: f64) {
        self.base.set("rotate", rotate);
    }

    pub fn set_roll(&mut self, roll: f64) {
        self.base.set("roll", roll);
    }

    pub fn set_drop_shadow(&mut self, is_drop_shadow: bool) {
        self.base.set("isDropShadow", is_drop_shadow);
    }

    pub fn set_show_chat_bubble(&mut self, is_show_chat_bubble: bool) {
        self.base.set("isShowChatBubble", is_show_chat_bubble);
    }

    /// `None` makes the character visible to everyone again
    pub fn set_owner(&mut self, owner: Option<&UserId>) {
        self.base
            .set("owner", owner.map(UserId::as_str).unwrap_or_default());
    }

    pub fn set_location(&mut self, location: &str) {
        self.base.set("location", location);
    }

    pub fn set_position(&mut self, x: f64, y: f64, z: f64) {
        self.base.set("posX", x);
        self.base.set("posY", y);
        self.base.set("posZ", z);
    }

    /// First chat palette among the character's children
    pub fn chat_palette(&self, registry: &ObjectRegistry) -> Option<TypedRef<ChatPalette>> {
        registry
            .children_of_type::<ChatPalette>(self.base.identifier())
            .into_iter()
            .next()
    }

    pub fn is_hidden_in(&self) -> bool {
        self.owner().is_some()
    }

    pub fn is_visible_to(&self, user_id: &UserId) -> bool {
        match self.owner() {
            None => true,
            Some(owner) => owner == *user_id,
        }
    }

    pub fn owner_name(&self, presence: &PresenceManager) -> Option<String> {
        let owner = self.owner()?;
        let cursor = presence.find_by_user_id(&owner)?;
        let name = cursor.borrow().name();
        Some(name)
    }

    pub fn owner_color(&self, presence: &PresenceManager) -> String {
        self.owner()
            .and_then(|owner| presence.find_by_user_id(&owner))
            .map(|cursor| cursor.borrow().color())
            .unwrap_or_else(|| PeerCursor::DEFAULT_COLOR.to_string())
    }

    /// True while `user_id` has a hidden character of their own on the table
    pub fn is_stealth_mode(registry: &ObjectRegistry, user_id: &UserId) -> bool {
        registry
            .get_objects_of::<GameCharacter>()
            .iter()
            .any(|character| {
                let character = character.borrow();
                character.is_hidden_in()
                    && character.is_visible_to(user_id)
                    && character.location() == Self::TABLE_LOCATION
            })
    }
}

impl Replicate for GameCharacter {
    fn base(&self) -> &ObjectBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ObjectBase {
        &mut self.base
    }
}

impl ReplicateBuilder for GameCharacter {
    const SCHEMA: &'static ObjectSchema = &GAME_CHARACTER_SCHEMA;

    fn build(identifier: EntityId) -> Self {
        Self {
            base: ObjectBase::new(identifier, Self::SCHEMA),
        }
    }
}
