pub mod identity_index;
pub mod peer_cursor;
pub mod presence_config;
pub mod presence_manager;
