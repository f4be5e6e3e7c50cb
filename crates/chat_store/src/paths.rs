use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ChatStoreError;

pub const DATA_STORE_DIR: &str = "data-store";
pub const CHAT_STORE_DIR: &str = "chat-store";
pub const PROVIDER_STORE_DIR: &str = "provider-store";

/// Directory layout of a brunch installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallLayout {
    root: PathBuf,
}

impl InstallLayout {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn data_store(&self) -> PathBuf {
        self.root.join(DATA_STORE_DIR)
    }

    #[must_use]
    pub fn chat_store(&self) -> PathBuf {
        self.root.join(CHAT_STORE_DIR)
    }

    #[must_use]
    pub fn provider_store(&self) -> PathBuf {
        self.root.join(PROVIDER_STORE_DIR)
    }

    /// Session scratch directory for `bucket`, nested under its own chat store.
    #[must_use]
    pub fn session_dir(&self, bucket: &str, session_id: &str) -> PathBuf {
        self.root.join(bucket).join(CHAT_STORE_DIR).join(session_id)
    }

    #[must_use]
    pub fn is_installed(&self) -> bool {
        !self.root.as_os_str().is_empty() && self.root.exists()
    }

    /// Creates the install directory and its stores.
    ///
    /// Refuses to touch an existing directory.
    pub fn install(&self) -> Result<(), ChatStoreError> {
        if self.root.as_os_str().is_empty() {
            return Err(ChatStoreError::MissingInstallDirectory);
        }
        if self.is_installed() {
            return Err(ChatStoreError::AlreadyInstalled {
                path: self.root.clone(),
            });
        }

        for dir in [self.data_store(), self.chat_store(), self.provider_store()] {
            fs::create_dir_all(&dir)
                .map_err(|source| ChatStoreError::io("creating store directory", &dir, source))?;
        }

        tracing::info!(root = %self.root.display(), "installed brunch store layout");
        Ok(())
    }
}

/// Replaces spaces so user-facing names map onto stable file names.
#[must_use]
pub fn sanitize_name(name: &str) -> String {
    name.replace(' ', "_")
}

/// Store key for a JSON document named `name`.
#[must_use]
pub fn json_key(name: &str) -> String {
    let sanitized = sanitize_name(name);
    if sanitized.ends_with(".json") {
        sanitized
    } else {
        format!("{sanitized}.json")
    }
}

/// Keys form a flat namespace: one plain file name, nothing that escapes it.
pub fn validate_key(key: &str) -> Result<(), ChatStoreError> {
    if key.trim().is_empty() {
        return Err(ChatStoreError::invalid_key(key, "key must not be empty"));
    }
    if key.contains('/') || key.contains('\\') {
        return Err(ChatStoreError::invalid_key(
            key,
            "key must not contain path separators",
        ));
    }
    if key.starts_with('.') {
        return Err(ChatStoreError::invalid_key(key, "key must not start with '.'"));
    }
    Ok(())
}
