use std::path::{Path, PathBuf};

/// Command-execution session: the workspace a front-end runs commands in.
///
/// It is not a chat. It remembers which chat its last `chat` command loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    id: String,
    directory: Option<PathBuf>,
    active_chat: Option<String>,
}

impl Session {
    pub(crate) fn new(id: impl Into<String>, directory: Option<PathBuf>) -> Self {
        Self {
            id: id.into(),
            directory,
            active_chat: None,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Scratch directory created for explicitly started sessions.
    #[must_use]
    pub fn directory(&self) -> Option<&Path> {
        self.directory.as_deref()
    }

    #[must_use]
    pub fn active_chat(&self) -> Option<&str> {
        self.active_chat.as_deref()
    }

    pub(crate) fn set_active_chat(&mut self, name: impl Into<String>) {
        self.active_chat = Some(name.into());
    }
}

/// Trims a caller-supplied session id; blank ids yield `None`.
#[must_use]
pub fn normalize_session_id(id: &str) -> Option<&str> {
    let trimmed = id.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}
