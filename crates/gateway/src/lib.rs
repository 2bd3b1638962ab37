// charta-gateway: the Slack <-> ONLYOFFICE co-editing gateway.
//
// A session token minted at the message shortcut rides through the editor
// page and comes back with the document-server callback; the lock state
// itself lives inside the Slack message as an attachment. The gateway holds
// no session database.

pub mod callback;
pub mod config;
pub mod credentials;
pub mod docserver;
pub mod editor;
pub mod error;
pub mod lock;
pub mod routes;
pub mod shortcut;
pub mod slack;
pub mod token;
