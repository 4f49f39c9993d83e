mod chat_message;
mod chat_palette;
mod chat_tab;
mod game_character;

pub use chat_message::ChatMessage;
pub use chat_palette::{ChatPalette, PaletteVariable};
pub use chat_tab::ChatTab;
pub use game_character::GameCharacter;

use tabletop_shared::ObjectRegistry;

/// Registers every tabletop kind on `registry`
pub fn register_kinds(registry: &ObjectRegistry) {
    registry.register_kind::<GameCharacter>();
    registry.register_kind::<ChatPalette>();
    registry.register_kind::<ChatTab>();
    registry.register_kind::<ChatMessage>();
}
