use std::fmt;
use std::path::PathBuf;

use chat_provider::ProviderError;
use thiserror::Error;

/// Coarse classification callers branch on without matching every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    InvalidState,
    DecodeFailure,
    ProviderFailure,
    AlreadyExists,
    Artifact,
    Io,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::NotFound => "not found",
            Self::InvalidState => "invalid state",
            Self::DecodeFailure => "decode failure",
            Self::ProviderFailure => "provider failure",
            Self::AlreadyExists => "already exists",
            Self::Artifact => "artifact",
            Self::Io => "io",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Error)]
pub enum BrunchError {
    #[error("no node matches hash '{query}'")]
    NodeNotFound { query: String },

    #[error("node id {id} does not belong to this tree")]
    UnknownNode { id: usize },

    #[error("child index {index} is out of bounds for a node with {len} children")]
    ChildIndexOutOfBounds { index: usize, len: usize },

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("knowledge context '{name}' is not registered")]
    ContextNotFound { name: String },

    #[error("active branch '{hash}' could not be found in snapshot")]
    ActiveBranchNotFound { hash: String },

    #[error("failed to decode {what}: {source}")]
    Json {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("node document is missing its 'type' discriminant")]
    MissingNodeType,

    #[error("unknown node type '{found}'")]
    UnknownNodeType { found: String },

    #[error("expected a root node document, found '{found}'")]
    NotARootDocument { found: String },

    #[error("a root node cannot appear below another node")]
    NestedRoot,

    #[error("invalid base64 message content: {0}")]
    InvalidBase64(#[from] base64::DecodeError),

    #[error("failed to encode {what}: {source}")]
    Encode {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("provider request failed: {0}")]
    Provider(#[source] ProviderError),

    #[error("unterminated code fence starting at byte {offset}")]
    UnterminatedFence { offset: usize },

    #[error("invalid artifact name '{name}': {reason}")]
    InvalidArtifactName { name: String, reason: &'static str },

    #[error("I/O error while {operation} at {path}: {source}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl BrunchError {
    #[must_use]
    pub fn io(operation: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    #[must_use]
    pub fn json(what: &'static str, source: serde_json::Error) -> Self {
        Self::Json { what, source }
    }

    #[must_use]
    pub fn node_not_found(query: impl Into<String>) -> Self {
        Self::NodeNotFound {
            query: query.into(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NodeNotFound { .. }
            | Self::UnknownNode { .. }
            | Self::ChildIndexOutOfBounds { .. }
            | Self::ContextNotFound { .. }
            | Self::ActiveBranchNotFound { .. } => ErrorKind::NotFound,
            Self::InvalidState(_) | Self::Encode { .. } => ErrorKind::InvalidState,
            Self::Json { .. }
            | Self::MissingNodeType
            | Self::UnknownNodeType { .. }
            | Self::NotARootDocument { .. }
            | Self::NestedRoot
            | Self::InvalidBase64(_) => ErrorKind::DecodeFailure,
            Self::Provider(_) => ErrorKind::ProviderFailure,
            Self::UnterminatedFence { .. } | Self::InvalidArtifactName { .. } => {
                ErrorKind::Artifact
            }
            Self::Io { .. } => ErrorKind::Io,
        }
    }
}

impl From<ProviderError> for BrunchError {
    fn from(error: ProviderError) -> Self {
        Self::Provider(error)
    }
}
