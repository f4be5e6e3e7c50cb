//! Branching conversation trees.
//!
//! Every exchange with a chat provider is a node in a tree. Nodes are
//! addressed by content hash, so a client can rewind to any earlier exchange
//! and fork a new branch from it.
//!
//! # Public API Overview
//! - Build and navigate a conversation with [`Conversation`].
//! - Inspect the underlying arena through [`ConversationTree`] and [`NodeRef`].
//! - Persist and restore conversations with [`Snapshot`].
//! - Pull fenced code out of replies with [`parse_artifacts`].

pub mod artifacts;
pub mod codec;
pub mod config;
pub mod conversation;
pub mod display;
pub mod error;
pub mod logging;
pub mod message;
pub mod node;
pub mod snapshot;
pub mod tree;

pub use crate::artifacts::{
    parse_artifacts, parse_artifacts_from, Artifact, ArtifactType, FileArtifact, NonFileArtifact,
};
pub use crate::config::EnvConfig;
pub use crate::conversation::{Conversation, PendingTurn};
pub use crate::error::{BrunchError, ErrorKind};
pub use crate::message::Message;
pub use crate::node::{MessagePair, NodeKind, NodeRef, RootNode};
pub use crate::snapshot::Snapshot;
pub use crate::tree::{ConversationTree, HashIndex, NodeId};

/// Provider contract re-exported for callers that only depend on this crate.
pub use chat_provider;
