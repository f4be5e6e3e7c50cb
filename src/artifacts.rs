//! Extraction of fenced code blocks from assistant replies.
//!
//! A reply is split into the bodies of its triple-backtick fences and the
//! trimmed prose between them. Fenced bodies are kept verbatim.

use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::error::BrunchError;
use crate::message::Message;

const FENCE: &str = "```";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactType {
    File,
    NonFile,
}

/// Body of one fenced block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileArtifact {
    /// Byte offset of the body within the parsed text.
    pub id: String,
    pub data: String,
    pub name: String,
    pub file_type: Option<String>,
}

/// Prose found outside of any fence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NonFileArtifact {
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Artifact {
    File(FileArtifact),
    NonFile(NonFileArtifact),
}

impl Artifact {
    #[must_use]
    pub fn artifact_type(&self) -> ArtifactType {
        match self {
            Self::File(_) => ArtifactType::File,
            Self::NonFile(_) => ArtifactType::NonFile,
        }
    }

    #[must_use]
    pub fn data(&self) -> &str {
        match self {
            Self::File(file) => &file.data,
            Self::NonFile(text) => &text.data,
        }
    }

    /// Writes the artifact into `dir` and returns the path written.
    pub fn write(&self, dir: &Path, name: &str) -> Result<PathBuf, BrunchError> {
        match self {
            Self::File(file) => file.write(dir, name),
            Self::NonFile(text) => text.write(dir, name),
        }
    }
}

impl FileArtifact {
    /// File name used on export: the fence's name, else `fallback`, else
    /// `file_<id>`, with the fence type appended as an extension if missing.
    #[must_use]
    pub fn export_name(&self, fallback: &str) -> String {
        let mut file_name = if !self.name.is_empty() {
            self.name.clone()
        } else if !fallback.is_empty() {
            fallback.to_string()
        } else {
            format!("file_{}", self.id)
        };

        if let Some(file_type) = self
            .file_type
            .as_deref()
            .map(|file_type| file_type.trim_start_matches('.'))
            .filter(|file_type| !file_type.is_empty())
        {
            let extension = format!(".{file_type}");
            if !file_name.ends_with(&extension) {
                file_name.push_str(&extension);
            }
        }

        file_name
    }

    pub fn write(&self, dir: &Path, name: &str) -> Result<PathBuf, BrunchError> {
        write_into(dir, &self.export_name(name), &self.data)
    }
}

impl NonFileArtifact {
    pub fn write(&self, dir: &Path, name: &str) -> Result<PathBuf, BrunchError> {
        if name.is_empty() {
            return Err(BrunchError::InvalidArtifactName {
                name: String::new(),
                reason: "a name is required to export text",
            });
        }

        let file_name = if name.contains('.') {
            name.to_string()
        } else {
            format!("{name}.txt")
        };
        write_into(dir, &file_name, &self.data)
    }
}

fn write_into(dir: &Path, file_name: &str, data: &str) -> Result<PathBuf, BrunchError> {
    validate_file_name(file_name)?;

    fs::create_dir_all(dir)
        .map_err(|source| BrunchError::io("creating artifact directory", dir, source))?;

    let path = dir.join(file_name);
    fs::write(&path, data).map_err(|source| BrunchError::io("writing artifact", &path, source))?;

    tracing::debug!(path = %path.display(), bytes = data.len(), "artifact exported");
    Ok(path)
}

fn validate_file_name(name: &str) -> Result<(), BrunchError> {
    let invalid = |reason| BrunchError::InvalidArtifactName {
        name: name.to_string(),
        reason,
    };

    if name.contains('/') || name.contains('\\') {
        return Err(invalid("name must not contain path separators"));
    }

    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(invalid("name must be a single plain file name")),
    }
}

/// Splits `content` into fenced blocks and surrounding prose.
///
/// Fails without partial results when a fence is left open.
pub fn parse_artifacts(content: &str) -> Result<Vec<Artifact>, BrunchError> {
    let mut artifacts = Vec::new();
    let mut cursor = 0;

    while let Some(found) = content[cursor..].find(FENCE) {
        let fence_start = cursor + found;
        push_text(&mut artifacts, &content[cursor..fence_start]);

        let info_start = fence_start + FENCE.len();
        let body_start = match content[info_start..].find('\n') {
            Some(newline) => info_start + newline + 1,
            None => {
                return Err(BrunchError::UnterminatedFence {
                    offset: fence_start,
                })
            }
        };
        let body_end = content[body_start..]
            .find(FENCE)
            .map(|close| body_start + close)
            .ok_or(BrunchError::UnterminatedFence {
                offset: fence_start,
            })?;

        let info = content[info_start..body_start - 1].trim();
        let (file_type, name) = split_info(info);
        artifacts.push(Artifact::File(FileArtifact {
            id: body_start.to_string(),
            data: content[body_start..body_end].to_string(),
            name: name.to_string(),
            file_type: (!file_type.is_empty()).then(|| file_type.to_string()),
        }));

        cursor = body_end + FENCE.len();
    }

    push_text(&mut artifacts, &content[cursor..]);
    Ok(artifacts)
}

/// Decodes `message` and parses its artifacts; no message yields none.
pub fn parse_artifacts_from(message: Option<&Message>) -> Result<Vec<Artifact>, BrunchError> {
    match message {
        Some(message) => parse_artifacts(&message.content()?),
        None => Ok(Vec::new()),
    }
}

/// `type:name` splits only on exactly one colon; anything else is all type.
fn split_info(info: &str) -> (&str, &str) {
    let mut parts = info.split(':');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(file_type), Some(name), None) => (file_type, name),
        _ => (info, ""),
    }
}

fn push_text(artifacts: &mut Vec<Artifact>, text: &str) {
    let text = text.trim();
    if !text.is_empty() {
        artifacts.push(Artifact::NonFile(NonFileArtifact {
            data: text.to_string(),
        }));
    }
}
