//! Whole-conversation snapshots for persistence.

use std::collections::HashMap;
use std::sync::Arc;

use chat_provider::{ChatProvider, ContextSettings};
use serde::{Deserialize, Serialize};

use crate::codec;
use crate::conversation::Conversation;
use crate::error::BrunchError;

/// Persisted state of one conversation.
///
/// `contents` holds the encoded tree and is written as base64 inside the
/// snapshot document. Context names must resolve again when the snapshot is
/// restored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub provider_name: String,
    pub active_branch: String,
    #[serde(with = "base64_bytes")]
    pub contents: Vec<u8>,
    #[serde(default)]
    pub contexts: Vec<String>,
}

impl Snapshot {
    pub fn to_json(&self) -> Result<Vec<u8>, BrunchError> {
        serde_json::to_vec(self).map_err(|source| BrunchError::Encode {
            what: "snapshot",
            source,
        })
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, BrunchError> {
        serde_json::from_slice(bytes).map_err(|source| BrunchError::json("snapshot", source))
    }
}

impl Conversation {
    /// Captures the full tree, the cursor hash and attached context names.
    pub fn snapshot(&self) -> Result<Snapshot, BrunchError> {
        let snapshot = Snapshot {
            provider_name: self.provider().settings().name,
            active_branch: self.current_hash(),
            contents: codec::encode(self.tree())?,
            contexts: self.context_names(),
        };
        tracing::debug!(
            provider = %snapshot.provider_name,
            active_branch = %snapshot.active_branch,
            contexts = snapshot.contexts.len(),
            bytes = snapshot.contents.len(),
            "snapshot taken"
        );
        Ok(snapshot)
    }

    /// Rebuilds a conversation from `snapshot`.
    ///
    /// A non-empty active branch is resolved as a full hash or prefix; failing
    /// to resolve it is an error. An empty one leaves the cursor at the root.
    /// Every recorded context must be present in `available`. Contexts are
    /// attached through `provider` only once the branch and every context
    /// have resolved.
    pub fn restore(
        provider: Arc<dyn ChatProvider>,
        snapshot: &Snapshot,
        available: &HashMap<String, ContextSettings>,
    ) -> Result<Self, BrunchError> {
        let tree = codec::decode(&snapshot.contents)?;

        let cursor = if snapshot.active_branch.is_empty() {
            tree.root_id()
        } else {
            tree.resolve(&snapshot.active_branch)
                .map_err(|_| BrunchError::ActiveBranchNotFound {
                    hash: snapshot.active_branch.clone(),
                })?
        };
        let contexts = snapshot
            .contexts
            .iter()
            .map(|name| {
                available
                    .get(name)
                    .cloned()
                    .ok_or_else(|| BrunchError::ContextNotFound { name: name.clone() })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut conversation = Conversation::from_parts(provider, tree);
        for context in contexts {
            conversation.attach_context(context)?;
        }
        conversation.set_cursor(cursor);

        tracing::debug!(
            nodes = conversation.tree().node_count(),
            contexts = conversation.context_names().len(),
            "snapshot restored"
        );
        Ok(conversation)
    }
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chat_provider_mock::MockProvider;
    use pretty_assertions::assert_eq;
    use serde_json::Value;

    use super::*;

    fn chatted(replies: &[&str]) -> (MockProvider, Conversation) {
        let provider = MockProvider::with_replies(replies.iter().copied());
        let mut chat = Conversation::new(Arc::new(provider.clone()));
        for (turn, _) in replies.iter().enumerate() {
            chat.submit_message(&format!("question {turn}")).unwrap();
        }
        (provider, chat)
    }

    #[test]
    fn snapshot_document_has_expected_fields() {
        let (_, chat) = chatted(&["a"]);
        let snapshot = chat.snapshot().unwrap();
        let document: Value = serde_json::from_slice(&snapshot.to_json().unwrap()).unwrap();

        assert_eq!(document["provider_name"], "mock");
        assert_eq!(document["active_branch"], chat.current_hash());
        assert_eq!(document["contexts"], serde_json::json!([]));

        let contents = document["contents"].as_str().expect("contents is a string");
        let decoded = base64::Engine::decode(
            &base64::engine::general_purpose::STANDARD,
            contents,
        )
        .unwrap();
        assert_eq!(decoded, snapshot.contents);
    }

    #[test]
    fn restore_reseats_cursor_and_keeps_tree() {
        let (provider, chat) = chatted(&["a", "b"]);
        let snapshot = Snapshot::from_json(&chat.snapshot().unwrap().to_json().unwrap()).unwrap();

        let restored =
            Conversation::restore(Arc::new(provider), &snapshot, &HashMap::new()).unwrap();

        assert_eq!(restored.current_hash(), chat.current_hash());
        assert_eq!(restored.print_tree(), chat.print_tree());
        assert_eq!(restored.print_history(), chat.print_history());
    }

    #[test]
    fn restore_accepts_prefix_and_empty_branch() {
        let (provider, chat) = chatted(&["a"]);
        let mut snapshot = chat.snapshot().unwrap();
        let full = snapshot.active_branch.clone();

        snapshot.active_branch = full[..8].to_string();
        let restored =
            Conversation::restore(Arc::new(provider.clone()), &snapshot, &HashMap::new()).unwrap();
        assert_eq!(restored.current_hash(), full);

        snapshot.active_branch.clear();
        let at_root =
            Conversation::restore(Arc::new(provider), &snapshot, &HashMap::new()).unwrap();
        assert_eq!(at_root.cursor(), at_root.tree().root_id());
    }

    #[test]
    fn restore_rejects_unknown_branch() {
        let (provider, chat) = chatted(&["a"]);
        let mut snapshot = chat.snapshot().unwrap();
        snapshot.active_branch = "not-a-hash".to_string();

        assert_matches!(
            Conversation::restore(Arc::new(provider), &snapshot, &HashMap::new()),
            Err(BrunchError::ActiveBranchNotFound { hash }) if hash == "not-a-hash"
        );
    }

    #[test]
    fn restore_reattaches_contexts_by_name() {
        let provider = MockProvider::new();
        let mut chat = Conversation::new(Arc::new(provider.clone()));
        chat.attach_context(ContextSettings::new("docs")).unwrap();
        let snapshot = chat.snapshot().unwrap();
        assert_eq!(snapshot.contexts, vec!["docs".to_string()]);

        let missing = Conversation::restore(Arc::new(provider.clone()), &snapshot, &HashMap::new());
        assert_matches!(missing, Err(BrunchError::ContextNotFound { name }) if name == "docs");

        let available = HashMap::from([("docs".to_string(), ContextSettings::new("docs"))]);
        let restored = Conversation::restore(Arc::new(provider.clone()), &snapshot, &available)
            .unwrap();
        assert_eq!(restored.context_names(), vec!["docs".to_string()]);
        assert_eq!(provider.attached_contexts().len(), 2);
    }

    #[test]
    fn failed_restore_attaches_no_contexts() {
        let provider = MockProvider::new();
        let mut chat = Conversation::new(Arc::new(provider.clone()));
        chat.attach_context(ContextSettings::new("docs")).unwrap();
        chat.attach_context(ContextSettings::new("faq")).unwrap();
        let mut snapshot = chat.snapshot().unwrap();
        let restorer = MockProvider::new();

        let only_docs = HashMap::from([("docs".to_string(), ContextSettings::new("docs"))]);
        assert_matches!(
            Conversation::restore(Arc::new(restorer.clone()), &snapshot, &only_docs),
            Err(BrunchError::ContextNotFound { name }) if name == "faq"
        );

        snapshot.active_branch = "ffffffff".to_string();
        let both = HashMap::from([
            ("docs".to_string(), ContextSettings::new("docs")),
            ("faq".to_string(), ContextSettings::new("faq")),
        ]);
        assert_matches!(
            Conversation::restore(Arc::new(restorer.clone()), &snapshot, &both),
            Err(BrunchError::ActiveBranchNotFound { .. })
        );
        assert!(restorer.attached_contexts().is_empty());
    }

    #[test]
    fn full_precision_temperature_survives_restore() {
        let mut settings = MockProvider::new().settings();
        settings.temperature = 0.994_141_423_413_993_5;
        let provider = MockProvider::with_settings(settings);
        let chat = Conversation::new(Arc::new(provider.clone()));
        let root_hash = chat.current_hash();

        let snapshot = Snapshot::from_json(&chat.snapshot().unwrap().to_json().unwrap()).unwrap();
        let restored =
            Conversation::restore(Arc::new(provider), &snapshot, &HashMap::new()).unwrap();

        assert_eq!(restored.tree().root().temperature, 0.994_141_423_413_993_5);
        assert_eq!(restored.current_hash(), root_hash);
    }

    #[test]
    fn corrupt_contents_fail_to_restore() {
        let (provider, chat) = chatted(&["a"]);
        let mut snapshot = chat.snapshot().unwrap();
        snapshot.contents = b"{\"node_data\": {}}".to_vec();

        let error = Conversation::restore(Arc::new(provider), &snapshot, &HashMap::new())
            .expect_err("corrupt tree");
        assert_eq!(error.kind(), crate::error::ErrorKind::DecodeFailure);

        assert_matches!(
            Snapshot::from_json(br#"{"provider_name":"p","active_branch":"","contents":"%%"}"#),
            Err(BrunchError::Json { .. })
        );
    }
}
