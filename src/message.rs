//! Role-tagged message payloads stored in transport-safe form.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chat_provider::ChatRole;
use serde::{Deserialize, Serialize};

use crate::error::BrunchError;

/// One side of an exchange.
///
/// The payload is kept base64 encoded so arbitrary bytes survive JSON round
/// trips unchanged; the encoded form is also what node hashes are computed
/// over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    role: ChatRole,
    #[serde(rename = "b64_encoded_content")]
    encoded_content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    images: Vec<String>,
}

impl Message {
    #[must_use]
    pub fn new(role: ChatRole, content: impl AsRef<[u8]>) -> Self {
        Self {
            role,
            encoded_content: STANDARD.encode(content),
            images: Vec::new(),
        }
    }

    #[must_use]
    pub fn user(content: impl AsRef<[u8]>) -> Self {
        Self::new(ChatRole::User, content)
    }

    #[must_use]
    pub fn assistant(content: impl AsRef<[u8]>) -> Self {
        Self::new(ChatRole::Assistant, content)
    }

    /// Builds a message from an already encoded payload without validating it.
    #[must_use]
    pub fn from_encoded(role: ChatRole, encoded_content: impl Into<String>) -> Self {
        Self {
            role,
            encoded_content: encoded_content.into(),
            images: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_images(mut self, images: Vec<String>) -> Self {
        self.images = images;
        self
    }

    #[must_use]
    pub fn role(&self) -> ChatRole {
        self.role
    }

    #[must_use]
    pub fn encoded_content(&self) -> &str {
        &self.encoded_content
    }

    #[must_use]
    pub fn images(&self) -> &[String] {
        &self.images
    }

    pub fn set_content(&mut self, content: impl AsRef<[u8]>) {
        self.encoded_content = STANDARD.encode(content);
    }

    /// Raw decoded payload bytes.
    pub fn decoded_bytes(&self) -> Result<Vec<u8>, BrunchError> {
        Ok(STANDARD.decode(&self.encoded_content)?)
    }

    /// Decoded payload as text. Invalid UTF-8 sequences are replaced.
    pub fn content(&self) -> Result<String, BrunchError> {
        let bytes = self.decoded_bytes()?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Decoded text for display; an undecodable payload renders as empty.
    #[must_use]
    pub fn content_lossy(&self) -> String {
        self.content().unwrap_or_default()
    }

    /// Transcript line: `role: content`, plus the image list when present.
    #[must_use]
    pub fn transcript_line(&self) -> String {
        if self.images.is_empty() {
            format!("{}: {}", self.role, self.content_lossy())
        } else {
            format!(
                "{}: {} [{} images]: {}",
                self.role,
                self.content_lossy(),
                self.images.len(),
                self.images.join(", ")
            )
        }
    }
}
