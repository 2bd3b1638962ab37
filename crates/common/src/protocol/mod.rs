// Wire formats shared with the chat platform and the document server.

pub mod callback;
pub mod lock_tag;
