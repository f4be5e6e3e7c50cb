//! Node payloads and their content-derived hashes.

use std::fmt;

use chat_provider::ProviderSettings;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;

use crate::message::Message;

/// Discriminant of a node, as written in serialized trees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Root,
    MessagePair,
}

impl NodeKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Root => "root",
            Self::MessagePair => "message_pair",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Conversation parameters carried by the tree's single root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RootNode {
    pub provider: String,
    pub model: String,
    pub prompt: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

impl RootNode {
    #[must_use]
    pub fn from_settings(settings: &ProviderSettings) -> Self {
        Self {
            provider: settings.name.clone(),
            model: settings.model.clone(),
            prompt: settings.system_prompt.clone(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
        }
    }

    /// SHA-256 over the fields concatenated without separators.
    ///
    /// `f64`'s `Display` yields the shortest decimal that round-trips and never
    /// switches to exponent notation, so `0.7` hashes as `0.7` and `1.0` as `1`.
    #[must_use]
    pub fn hash(&self) -> String {
        let material = format!(
            "{}{}{}{}{}",
            self.provider, self.model, self.prompt, self.temperature, self.max_tokens
        );
        sha256_hex(material.as_bytes())
    }
}

/// One user message and the reply it produced.
///
/// A pair is only addressable once both sides are set.
#[derive(Debug, Clone, PartialEq)]
pub struct MessagePair {
    pub user: Option<Message>,
    pub assistant: Option<Message>,
    pub time: OffsetDateTime,
}

impl MessagePair {
    /// Empty pair stamped with the current UTC time.
    #[must_use]
    pub fn new() -> Self {
        Self::at(OffsetDateTime::now_utc())
    }

    #[must_use]
    pub fn at(time: OffsetDateTime) -> Self {
        Self {
            user: None,
            assistant: None,
            time,
        }
    }

    #[must_use]
    pub fn complete(user: Message, assistant: Message, time: OffsetDateTime) -> Self {
        Self {
            user: Some(user),
            assistant: Some(assistant),
            time,
        }
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.user.is_some() && self.assistant.is_some()
    }

    /// SHA-256 over `assistant + user + time`, or `""` while incomplete.
    ///
    /// The timestamp is truncated to whole seconds, so two pairs with equal
    /// content created within the same second share a hash.
    #[must_use]
    pub fn hash(&self) -> String {
        let (Some(user), Some(assistant)) = (&self.user, &self.assistant) else {
            return String::new();
        };

        let material = format!(
            "{}{}{}",
            assistant.encoded_content(),
            user.encoded_content(),
            rfc3339_seconds(self.time)
        );
        sha256_hex(material.as_bytes())
    }
}

impl Default for MessagePair {
    fn default() -> Self {
        Self::new()
    }
}

/// Borrowed view of a tree node, tagged by variant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NodeRef<'a> {
    Root(&'a RootNode),
    MessagePair(&'a MessagePair),
}

impl<'a> NodeRef<'a> {
    #[must_use]
    pub fn kind(self) -> NodeKind {
        match self {
            Self::Root(_) => NodeKind::Root,
            Self::MessagePair(_) => NodeKind::MessagePair,
        }
    }

    #[must_use]
    pub fn hash(self) -> String {
        match self {
            Self::Root(root) => root.hash(),
            Self::MessagePair(pair) => pair.hash(),
        }
    }

    #[must_use]
    pub fn as_root(self) -> Option<&'a RootNode> {
        match self {
            Self::Root(root) => Some(root),
            Self::MessagePair(_) => None,
        }
    }

    #[must_use]
    pub fn as_message_pair(self) -> Option<&'a MessagePair> {
        match self {
            Self::MessagePair(pair) => Some(pair),
            Self::Root(_) => None,
        }
    }

    /// One-line summary: the root's prompt or the pair's exchange.
    #[must_use]
    pub fn describe(self) -> String {
        match self {
            Self::Root(root) => format!("Root: {}", root.prompt),
            Self::MessagePair(pair) => format!(
                "User: {}\nAssistant: {}",
                pair.user.as_ref().map(Message::content_lossy).unwrap_or_default(),
                pair.assistant
                    .as_ref()
                    .map(Message::content_lossy)
                    .unwrap_or_default()
            ),
        }
    }
}

#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// RFC 3339 with whole seconds: `2024-05-01T10:00:00Z`, or a `+hh:mm` offset.
#[must_use]
pub fn rfc3339_seconds(time: OffsetDateTime) -> String {
    let offset = time.offset();
    let zone = if offset.is_utc() {
        "Z".to_string()
    } else {
        let sign = if offset.is_negative() { '-' } else { '+' };
        format!(
            "{sign}{:02}:{:02}",
            offset.whole_hours().unsigned_abs(),
            offset.minutes_past_hour().unsigned_abs()
        )
    };

    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}{zone}",
        time.year(),
        u8::from(time.month()),
        time.day(),
        time.hour(),
        time.minute(),
        time.second()
    )
}
