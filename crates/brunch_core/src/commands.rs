//! Typed session commands and the property-bag bridge front-ends parse into.

use std::fmt;

use crate::error::CoreError;

const NEW_PROVIDER: &str = "new-provider";
const NEW_CHAT: &str = "new-chat";
const CHAT: &str = "chat";

/// Typed value of one `key=value` property.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Text(String),
    Integer(i64),
    Real(f64),
}

impl PropertyValue {
    fn type_name(&self) -> &'static str {
        match self {
            Self::Text(_) => "a string",
            Self::Integer(_) => "an integer",
            Self::Real(_) => "a real number",
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(value) => f.write_str(value),
            Self::Integer(value) => write!(f, "{value}"),
            Self::Real(value) => write!(f, "{value}"),
        }
    }
}

/// Clones the base provider `host` under a new name with overrides.
///
/// Zero `max_tokens`/`temperature` mean "use the base provider's value".
#[derive(Debug, Clone, PartialEq)]
pub struct NewProvider {
    pub name: String,
    pub host: String,
    pub base_url: String,
    pub max_tokens: u32,
    pub temperature: f64,
    pub system_prompt: String,
}

/// Creates and persists an empty conversation.
///
/// Without a provider the registry's default provider is used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewChat {
    pub name: String,
    pub provider: Option<String>,
}

/// Loads a conversation and makes it the session's active chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadChat {
    pub name: String,
    pub hash: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    NewProvider(NewProvider),
    NewChat(NewChat),
    Chat(LoadChat),
}

impl Command {
    #[must_use]
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::NewProvider(_) => NEW_PROVIDER,
            Self::NewChat(_) => NEW_CHAT,
            Self::Chat(_) => CHAT,
        }
    }

    /// Builds a command from a parsed statement.
    ///
    /// Each keyword accepts a fixed set of properties; unknown keys, values of
    /// the wrong type and empty strings are rejected.
    pub fn from_properties(
        keyword: &str,
        name: &str,
        properties: &[(String, PropertyValue)],
    ) -> Result<Self, CoreError> {
        match keyword {
            NEW_PROVIDER => new_provider(name, properties).map(Self::NewProvider),
            NEW_CHAT => new_chat(name, properties).map(Self::NewChat),
            CHAT => load_chat(name, properties).map(Self::Chat),
            other => Err(CoreError::UnknownCommand {
                keyword: other.to_string(),
            }),
        }
    }
}

fn new_provider(
    name: &str,
    properties: &[(String, PropertyValue)],
) -> Result<NewProvider, CoreError> {
    let mut command = NewProvider {
        name: String::new(),
        host: String::new(),
        base_url: String::new(),
        max_tokens: 0,
        temperature: 0.0,
        system_prompt: String::new(),
    };

    for (key, value) in properties {
        match key.as_str() {
            "host" => command.host = text(key, value)?,
            "base-url" => command.base_url = text(key, value)?,
            "system-prompt" => command.system_prompt = text(key, value)?,
            "max-tokens" => {
                let PropertyValue::Integer(max_tokens) = value else {
                    return Err(CoreError::invalid_property(key, "an integer"));
                };
                command.max_tokens = u32::try_from(*max_tokens)
                    .map_err(|_| CoreError::invalid_property(key, "a non-negative integer"))?;
            }
            "temperature" => {
                let PropertyValue::Real(temperature) = value else {
                    return Err(CoreError::invalid_property(key, "a real number"));
                };
                if !temperature.is_finite() || *temperature < 0.0 {
                    return Err(CoreError::invalid_property(key, "a non-negative real number"));
                }
                command.temperature = *temperature;
            }
            _ => {
                return Err(CoreError::UnknownProperty {
                    command: NEW_PROVIDER,
                    key: key.clone(),
                })
            }
        }
    }

    command.name = required_name(NEW_PROVIDER, name)?;
    if command.host.is_empty() {
        return Err(CoreError::MissingProperty {
            command: NEW_PROVIDER,
            key: "host",
        });
    }
    Ok(command)
}

fn new_chat(name: &str, properties: &[(String, PropertyValue)]) -> Result<NewChat, CoreError> {
    let mut provider = None;
    for (key, value) in properties {
        match key.as_str() {
            "provider" => provider = Some(text(key, value)?),
            _ => {
                return Err(CoreError::UnknownProperty {
                    command: NEW_CHAT,
                    key: key.clone(),
                })
            }
        }
    }

    Ok(NewChat {
        name: required_name(NEW_CHAT, name)?,
        provider,
    })
}

fn load_chat(name: &str, properties: &[(String, PropertyValue)]) -> Result<LoadChat, CoreError> {
    let mut hash = None;
    for (key, value) in properties {
        match key.as_str() {
            "hash" => hash = Some(text(key, value)?),
            _ => {
                return Err(CoreError::UnknownProperty {
                    command: CHAT,
                    key: key.clone(),
                })
            }
        }
    }

    Ok(LoadChat {
        name: required_name(CHAT, name)?,
        hash,
    })
}

fn text(key: &str, value: &PropertyValue) -> Result<String, CoreError> {
    match value {
        PropertyValue::Text(text) if !text.is_empty() => Ok(text.clone()),
        PropertyValue::Text(_) => Err(CoreError::invalid_property(key, "a non-empty string")),
        other => {
            tracing::debug!(key, found = other.type_name(), "property has wrong type");
            Err(CoreError::invalid_property(key, "a string"))
        }
    }
}

fn required_name(command: &'static str, name: &str) -> Result<String, CoreError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(CoreError::MissingName { command });
    }
    Ok(name.to_string())
}

/// Parses a user-supplied child index; negative and non-numeric input is rejected.
pub fn parse_child_index(input: &str) -> Result<usize, CoreError> {
    input
        .trim()
        .parse::<usize>()
        .map_err(|_| CoreError::InvalidIndex {
            input: input.to_string(),
        })
}
