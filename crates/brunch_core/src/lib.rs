//! Multi-chat registry driving brunch conversations for front-ends.
//!
//! [`Core`] owns configured providers, persisted chats, command sessions and
//! knowledge contexts. Front-ends parse user statements into [`Command`]s and
//! run them with [`Core::execute`].

mod commands;
mod error;
mod registry;
mod session;

pub use commands::{parse_child_index, Command, LoadChat, NewChat, NewProvider, PropertyValue};
pub use error::CoreError;
pub use registry::{Core, SharedConversation};
pub use session::{normalize_session_id, Session};
