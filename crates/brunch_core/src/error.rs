use std::path::PathBuf;

use brunch::{BrunchError, ErrorKind};
use chat_provider::ProviderInitError;
use chat_store::ChatStoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Conversation(#[from] BrunchError),

    #[error(transparent)]
    Store(#[from] ChatStoreError),

    #[error("brunch is not installed at {path}")]
    NotInstalled { path: PathBuf },

    #[error("session id is required")]
    SessionIdRequired,

    #[error("session '{id}' does not exist")]
    SessionNotFound { id: String },

    #[error("provider '{name}' already exists")]
    ProviderExists { name: String },

    #[error("provider '{name}' not found")]
    ProviderNotFound { name: String },

    #[error("host provider (base provider) '{host}' does not exist")]
    HostNotFound { host: String },

    #[error("failed to configure provider '{name}': {source}")]
    ProviderInit {
        name: String,
        #[source]
        source: ProviderInitError,
    },

    #[error("chat '{name}' already exists")]
    ChatExists { name: String },

    #[error("chat '{name}' not found")]
    ChatNotFound { name: String },

    #[error("session '{session}' has no active chat")]
    NoActiveChat { session: String },

    #[error("chat '{name}' is not active")]
    ChatNotActive { name: String },

    #[error("knowledge context '{name}' already exists")]
    ContextExists { name: String },

    #[error("knowledge context '{name}' not found")]
    ContextNotFound { name: String },

    #[error("unknown command '{keyword}'")]
    UnknownCommand { keyword: String },

    #[error("{command}: name must be specified")]
    MissingName { command: &'static str },

    #[error("{command}: {key} must be specified")]
    MissingProperty {
        command: &'static str,
        key: &'static str,
    },

    #[error("{command}: invalid, unknown property: {key}")]
    UnknownProperty { command: &'static str, key: String },

    #[error("{key} must be {expected}")]
    InvalidProperty {
        key: String,
        expected: &'static str,
    },

    #[error("invalid child index '{input}': expected a non-negative integer")]
    InvalidIndex { input: String },

    #[error("failed to decode provider settings '{key}': {source}")]
    SettingsDecode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode provider settings '{name}': {source}")]
    SettingsEncode {
        name: String,
        #[source]
        source: serde_json::Error,
    },
}

impl CoreError {
    #[must_use]
    pub fn invalid_property(key: impl Into<String>, expected: &'static str) -> Self {
        Self::InvalidProperty {
            key: key.into(),
            expected,
        }
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Conversation(error) => error.kind(),
            Self::Store(ChatStoreError::AlreadyInstalled { .. }) => ErrorKind::AlreadyExists,
            Self::Store(ChatStoreError::InvalidKey { .. }) => ErrorKind::InvalidState,
            Self::Store(_) => ErrorKind::Io,
            Self::SessionNotFound { .. }
            | Self::ProviderNotFound { .. }
            | Self::HostNotFound { .. }
            | Self::ChatNotFound { .. }
            | Self::ChatNotActive { .. }
            | Self::ContextNotFound { .. } => ErrorKind::NotFound,
            Self::ProviderExists { .. } | Self::ChatExists { .. } | Self::ContextExists { .. } => {
                ErrorKind::AlreadyExists
            }
            Self::ProviderInit { .. } => ErrorKind::ProviderFailure,
            Self::SettingsDecode { .. } => ErrorKind::DecodeFailure,
            Self::NotInstalled { .. }
            | Self::SessionIdRequired
            | Self::NoActiveChat { .. }
            | Self::UnknownCommand { .. }
            | Self::MissingName { .. }
            | Self::MissingProperty { .. }
            | Self::UnknownProperty { .. }
            | Self::InvalidProperty { .. }
            | Self::InvalidIndex { .. }
            | Self::SettingsEncode { .. } => ErrorKind::InvalidState,
        }
    }
}
