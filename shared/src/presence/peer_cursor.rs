use crate::{
    EntityId, IdentityIndex, ObjectBase, ObjectSchema, PeerId, PropertyDecl, Replicate,
    ReplicateBuilder, SyncContext, UserId,
};

static PEER_CURSOR_SCHEMA: ObjectSchema = ObjectSchema {
    alias_name: "PeerCursor",
    properties: &[
        PropertyDecl::text("userId", ""),
        PropertyDecl::text("peerId", ""),
        PropertyDecl::text("name", ""),
        PropertyDecl::text("imageIdentifier", ""),
        PropertyDecl::text("color", PeerCursor::DEFAULT_COLOR),
        PropertyDecl::boolean("isGMMode", false),
    ],
};

/// One per connected participant: who they are (user id, display name,
/// color) and which network peer currently speaks for them.
pub struct PeerCursor {
    base: ObjectBase,
    index: Option<IdentityIndex>,
}

impl PeerCursor {
    pub const DEFAULT_COLOR: &'static str = "#444444";
    /// Color meaning "no color chosen", callers fall back past it
    pub const TRANSPARENT_COLOR: &'static str = "#ffffff";

    /// A cursor that keeps `index` current as it is added, updated and
    /// removed
    pub fn new(identifier: EntityId, index: &IdentityIndex) -> Self {
        Self {
            base: ObjectBase::new(identifier, Self::SCHEMA),
            index: Some(index.clone()),
        }
    }

    pub fn user_id(&self) -> UserId {
        UserId::new(self.base.text("userId"))
    }

    pub fn peer_id(&self) -> PeerId {
        PeerId::new(self.base.text("peerId"))
    }

    pub fn name(&self) -> String {
        self.base.text("name")
    }

    pub fn image_identifier(&self) -> String {
        self.base.text("imageIdentifier")
    }

    pub fn color(&self) -> String {
        self.base.text("color")
    }

    pub fn is_gm_mode(&self) -> bool {
        self.base.boolean("isGMMode")
    }

    pub fn set_user_id(&mut self, user_id: &UserId) {
        self.base.set("userId", user_id.as_str());
        self.reindex();
    }

    pub fn set_peer_id(&mut self, peer_id: &PeerId) {
        self.base.set("peerId", peer_id.as_str());
        self.reindex();
    }

    pub fn set_name(&mut self, name: &str) {
        self.base.set("name", name);
    }

    pub fn set_image_identifier(&mut self, image_identifier: &str) {
        self.base.set("imageIdentifier", image_identifier);
    }

    pub fn set_color(&mut self, color: &str) {
        self.base.set("color", color);
    }

    pub fn set_gm_mode(&mut self, is_gm_mode: bool) {
        self.base.set("isGMMode", is_gm_mode);
    }

    fn reindex(&self) {
        if let Some(index) = &self.index {
            index.index(self.base.identifier(), &self.user_id(), &self.peer_id());
        }
    }
}

impl Replicate for PeerCursor {
    fn base(&self) -> &ObjectBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ObjectBase {
        &mut self.base
    }

    fn apply(&mut self, context: &SyncContext) {
        if let Some(index) = &self.index {
            index.unindex(self.base.identifier());
        }
        self.base.apply(context);
        self.reindex();
    }

    fn on_added(&mut self) {
        self.reindex();
    }

    fn on_removed(&mut self) {
        if let Some(index) = &self.index {
            index.unindex(self.base.identifier());
        }
    }
}

impl ReplicateBuilder for PeerCursor {
    const SCHEMA: &'static ObjectSchema = &PEER_CURSOR_SCHEMA;

    /// A cursor outside any index, for tests and tooling
    fn build(identifier: EntityId) -> Self {
        Self {
            base: ObjectBase::new(identifier, Self::SCHEMA),
            index: None,
        }
    }
}
