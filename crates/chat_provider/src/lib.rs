//! Minimal provider-agnostic contract for producing one chat completion.
//!
//! This crate defines only the shared request/response types and the settings
//! document a provider is configured from. It excludes transport details and
//! knows nothing about conversation trees: callers flatten the branch they are
//! extending into an ordered history before handing it over.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Temperature used when a provider is configured without one.
pub const DEFAULT_TEMPERATURE: f64 = 0.7;

/// Completion token limit used when a provider is configured without one.
pub const DEFAULT_MAX_TOKENS: u32 = 4000;

/// Error returned while constructing/configuring a provider before any request is sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderInitError {
    message: String,
}

impl ProviderInitError {
    /// Creates a new provider initialization error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Returns the underlying error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ProviderInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ProviderInitError {}

impl From<String> for ProviderInitError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for ProviderInitError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Error reported by a provider while producing a completion.
///
/// Callers propagate it verbatim; providers decide whether a failure is worth
/// retrying before they return it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderError {
    message: String,
}

impl ProviderError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ProviderError {}

impl From<String> for ProviderError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for ProviderError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatRole {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl fmt::Display for ChatRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provider-neutral model-facing history item with decoded text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Input required to produce one completion.
///
/// `history` is ordered oldest first. `images` are file paths attached to the
/// new question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    pub question: String,
    pub history: Vec<ChatMessage>,
    pub images: Vec<String>,
}

/// Persistable configuration a provider instance is built from.
///
/// `name` is the registry name of the configured provider; `host` names the
/// base provider implementation it was cloned from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSettings {
    pub name: String,
    pub host: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f64,
    #[serde(default)]
    pub system_prompt: String,
}

impl ProviderSettings {
    /// Settings for a base provider with default sampling parameters.
    #[must_use]
    pub fn base(name: impl Into<String>, model: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            host: name.clone(),
            name,
            base_url: String::new(),
            model: model.into(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            system_prompt: String::new(),
        }
    }
}

/// Named knowledge resource a provider may consult during a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextSettings {
    pub name: String,
    #[serde(default)]
    pub sources: Vec<String>,
}

impl ContextSettings {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sources: Vec::new(),
        }
    }
}

/// Provider interface for producing chat completions.
pub trait ChatProvider: Send + Sync + 'static {
    /// Returns the settings this provider instance was built from.
    fn settings(&self) -> ProviderSettings;

    /// Builds a sibling provider of the same implementation with new settings.
    fn clone_with_settings(
        &self,
        settings: ProviderSettings,
    ) -> Result<Arc<dyn ChatProvider>, ProviderInitError>;

    /// Makes a knowledge context available to future completions.
    ///
    /// Providers may return an error when contexts are unsupported.
    fn attach_context(&self, context: &ContextSettings) -> Result<(), ProviderError> {
        Err(ProviderError::new(format!(
            "Knowledge context '{}' is not supported by this provider",
            context.name
        )))
    }

    /// Produces the assistant reply for `request`.
    ///
    /// Blocks until the reply is complete. A failed call must have no side
    /// effects the caller can observe.
    fn complete(&self, request: CompletionRequest) -> Result<String, ProviderError>;
}
