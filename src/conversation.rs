//! A conversation: one tree, a cursor over it and the provider that extends it.

use std::collections::BTreeMap;
use std::sync::Arc;

use chat_provider::{ChatProvider, CompletionRequest, ContextSettings};
use time::OffsetDateTime;

use crate::artifacts::{parse_artifacts_from, Artifact};
use crate::display;
use crate::error::BrunchError;
use crate::message::Message;
use crate::node::{MessagePair, NodeRef, RootNode};
use crate::tree::{ConversationTree, NodeId};

/// Turn collected from the cursor, ready to be sent to a provider.
///
/// Holding a `PendingTurn` does not borrow the conversation, so the provider
/// call can run without any lock on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTurn {
    parent: NodeId,
    started_at: OffsetDateTime,
    request: CompletionRequest,
}

impl PendingTurn {
    #[must_use]
    pub fn parent(&self) -> NodeId {
        self.parent
    }

    #[must_use]
    pub fn request(&self) -> &CompletionRequest {
        &self.request
    }
}

pub struct Conversation {
    provider: Arc<dyn ChatProvider>,
    tree: ConversationTree,
    cursor: NodeId,
    chat_enabled: bool,
    queued_images: Vec<String>,
    contexts: BTreeMap<String, ContextSettings>,
}

impl std::fmt::Debug for Conversation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Conversation")
            .field("provider", &self.provider.settings().name)
            .field("nodes", &self.tree.node_count())
            .field("cursor", &self.cursor)
            .field("chat_enabled", &self.chat_enabled)
            .field("queued_images", &self.queued_images)
            .field("contexts", &self.contexts.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Conversation {
    /// Starts an empty conversation rooted in the provider's settings.
    #[must_use]
    pub fn new(provider: Arc<dyn ChatProvider>) -> Self {
        let root = RootNode::from_settings(&provider.settings());
        Self::from_parts(provider, ConversationTree::new(root))
    }

    /// Wraps an existing tree; the cursor starts at the root.
    #[must_use]
    pub fn from_parts(provider: Arc<dyn ChatProvider>, tree: ConversationTree) -> Self {
        let cursor = tree.root_id();
        Self {
            provider,
            tree,
            cursor,
            chat_enabled: true,
            queued_images: Vec::new(),
            contexts: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn provider(&self) -> &Arc<dyn ChatProvider> {
        &self.provider
    }

    #[must_use]
    pub fn tree(&self) -> &ConversationTree {
        &self.tree
    }

    #[must_use]
    pub fn cursor(&self) -> NodeId {
        self.cursor
    }

    pub fn current_node(&self) -> Result<NodeRef<'_>, BrunchError> {
        self.tree.node(self.cursor)
    }

    /// Hash of the cursor node; empty while the cursor sits on an incomplete pair.
    #[must_use]
    pub fn current_hash(&self) -> String {
        self.tree.hash(self.cursor).unwrap_or_default()
    }

    /// Moves the cursor to the node matching a full hash or hash prefix.
    pub fn goto(&mut self, hash: &str) -> Result<(), BrunchError> {
        self.cursor = self.tree.resolve(hash)?;
        Ok(())
    }

    /// Moves to the parent; a no-op at the root.
    pub fn parent(&mut self) -> Result<(), BrunchError> {
        if self.cursor == self.tree.root_id() {
            return Ok(());
        }
        match self.tree.parent(self.cursor) {
            Some(parent) => {
                self.cursor = parent;
                Ok(())
            }
            None => Err(BrunchError::InvalidState(format!(
                "node {} has no parent",
                self.cursor.index()
            ))),
        }
    }

    /// Moves to the `index`-th child in creation order.
    pub fn child(&mut self, index: usize) -> Result<(), BrunchError> {
        let children = self.tree.children(self.cursor);
        let child = children
            .get(index)
            .copied()
            .ok_or(BrunchError::ChildIndexOutOfBounds {
                index,
                len: children.len(),
            })?;
        self.cursor = child;
        Ok(())
    }

    pub fn root(&mut self) {
        self.cursor = self.tree.root_id();
    }

    /// Hashes of the cursor's children in creation order.
    #[must_use]
    pub fn list_children(&self) -> Vec<String> {
        self.tree
            .children(self.cursor)
            .iter()
            .filter_map(|child| self.tree.hash(*child).ok())
            .collect()
    }

    #[must_use]
    pub fn has_parent(&self) -> bool {
        self.tree.parent(self.cursor).is_some()
    }

    /// Soft switch: while disabled, submitted messages are ignored.
    pub fn toggle_chat(&mut self, enabled: bool) {
        self.chat_enabled = enabled;
    }

    #[must_use]
    pub fn chat_enabled(&self) -> bool {
        self.chat_enabled
    }

    /// Queues image paths for the next submitted message.
    pub fn queue_images<I, S>(&mut self, paths: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.queued_images.extend(paths.into_iter().map(Into::into));
    }

    #[must_use]
    pub fn queued_images(&self) -> &[String] {
        &self.queued_images
    }

    /// Collects the branch history and queued images for `question`.
    pub fn prepare_turn(&self, question: &str) -> Result<PendingTurn, BrunchError> {
        Ok(PendingTurn {
            parent: self.cursor,
            started_at: OffsetDateTime::now_utc(),
            request: CompletionRequest {
                question: question.to_string(),
                history: self.tree.provider_history(self.cursor)?,
                images: self.queued_images.clone(),
            },
        })
    }

    /// Attaches the completed exchange under the turn's parent and moves
    /// the cursor onto it. Images sent with the turn leave the queue.
    pub fn apply_turn(&mut self, turn: PendingTurn, reply: &str) -> Result<NodeId, BrunchError> {
        let PendingTurn {
            parent,
            started_at,
            request,
        } = turn;

        let sent_images = request.images.len().min(self.queued_images.len());
        let pair = MessagePair::complete(
            Message::user(&request.question).with_images(request.images),
            Message::assistant(reply),
            started_at,
        );

        let id = self.tree.add_child(parent, pair)?;
        self.queued_images.drain(..sent_images);
        self.cursor = id;

        tracing::debug!(
            node = id.index(),
            hash = %self.current_hash(),
            "conversation extended"
        );
        Ok(id)
    }

    /// Sends `question` on the cursor's branch and appends the exchange.
    ///
    /// Returns `Ok(None)` without side effects while chat is disabled. A
    /// provider failure leaves the tree, the cursor and the image queue
    /// untouched.
    pub fn submit_message(&mut self, question: &str) -> Result<Option<String>, BrunchError> {
        if !self.chat_enabled {
            tracing::debug!("chat disabled; message ignored");
            return Ok(None);
        }

        let turn = self.prepare_turn(question)?;
        tracing::debug!(
            history = turn.request.history.len(),
            images = turn.request.images.len(),
            "provider call started"
        );
        let reply = self
            .provider
            .complete(turn.request.clone())
            .map_err(|error| {
                tracing::warn!(%error, "provider call failed");
                BrunchError::from(error)
            })?;

        self.apply_turn(turn, &reply)?;
        Ok(Some(reply))
    }

    /// Diagram of the whole tree.
    #[must_use]
    pub fn print_tree(&self) -> String {
        display::print_tree(&self.tree, self.tree.root_id())
    }

    /// Transcript from the root to the cursor.
    #[must_use]
    pub fn print_history(&self) -> String {
        display::print_history(&self.tree, self.cursor)
    }

    #[must_use]
    pub fn info(&self) -> String {
        format!("current node: {}", self.current_hash())
    }

    /// Artifacts in the cursor's assistant reply; none at the root.
    pub fn artifacts(&self) -> Result<Vec<Artifact>, BrunchError> {
        match self.current_node()? {
            NodeRef::Root(_) => Ok(Vec::new()),
            NodeRef::MessagePair(pair) => parse_artifacts_from(pair.assistant.as_ref()),
        }
    }

    /// Makes `context` available through the provider and records it.
    pub fn attach_context(&mut self, context: ContextSettings) -> Result<(), BrunchError> {
        self.provider.attach_context(&context)?;
        tracing::debug!(context = %context.name, "knowledge context attached");
        self.contexts.insert(context.name.clone(), context);
        Ok(())
    }

    /// Names of attached contexts, sorted.
    #[must_use]
    pub fn context_names(&self) -> Vec<String> {
        self.contexts.keys().cloned().collect()
    }

    pub(crate) fn set_cursor(&mut self, cursor: NodeId) {
        self.cursor = cursor;
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chat_provider::{ChatMessage, ProviderSettings};
    use chat_provider_mock::MockProvider;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::error::ErrorKind;

    fn conversation(provider: &MockProvider) -> Conversation {
        Conversation::new(Arc::new(provider.clone()))
    }

    #[test]
    fn new_conversation_starts_at_root_from_settings() {
        let mut settings = ProviderSettings::base("mock", "mock-model");
        settings.system_prompt = "be brief".to_string();
        let provider = MockProvider::with_settings(settings);
        let chat = conversation(&provider);

        assert_eq!(chat.cursor(), chat.tree().root_id());
        assert_eq!(chat.tree().root().prompt, "be brief");
        assert!(!chat.has_parent());
        assert!(chat.list_children().is_empty());
        assert_eq!(chat.info(), format!("current node: {}", chat.tree().root().hash()));
    }

    #[test]
    fn submit_appends_and_moves_cursor() {
        let provider = MockProvider::with_replies(["first answer"]);
        let mut chat = conversation(&provider);

        let reply = chat.submit_message("first question").unwrap();

        assert_eq!(reply.as_deref(), Some("first answer"));
        assert!(chat.has_parent());
        assert_eq!(chat.tree().children(chat.tree().root_id()), &[chat.cursor()]);
        assert_eq!(
            chat.print_history(),
            "user: first question\nassistant: first answer"
        );
    }

    #[test]
    fn history_sent_to_provider_is_root_to_leaf() {
        let provider = MockProvider::with_replies(["a1", "a2", "a3"]);
        let mut chat = conversation(&provider);

        chat.submit_message("q1").unwrap();
        chat.submit_message("q2").unwrap();
        chat.submit_message("q3").unwrap();

        let requests = provider.requests();
        assert_eq!(requests.len(), 3);
        assert!(requests[0].history.is_empty());
        assert_eq!(
            requests[2].history,
            vec![
                ChatMessage::user("q1"),
                ChatMessage::assistant("a1"),
                ChatMessage::user("q2"),
                ChatMessage::assistant("a2"),
            ]
        );
        assert_eq!(requests[2].question, "q3");
    }

    #[test]
    fn provider_failure_leaves_everything_unchanged() {
        let provider = MockProvider::new();
        provider.push_failure("quota exceeded");
        let mut chat = conversation(&provider);
        chat.queue_images(["cat.png"]);
        let before = chat.cursor();

        let error = chat.submit_message("hello").expect_err("failure must surface");

        assert_eq!(error.kind(), ErrorKind::ProviderFailure);
        assert_eq!(error.to_string(), "provider request failed: quota exceeded");
        assert_eq!(chat.cursor(), before);
        assert_eq!(chat.tree().node_count(), 1);
        assert_eq!(chat.queued_images(), &["cat.png".to_string()]);
    }

    #[test]
    fn queued_images_ride_on_the_next_user_message_only() {
        let provider = MockProvider::with_replies(["seen", "ok"]);
        let mut chat = conversation(&provider);
        chat.queue_images(["a.png", "b.png"]);

        chat.submit_message("look").unwrap();
        chat.submit_message("and now?").unwrap();

        let requests = provider.requests();
        assert_eq!(requests[0].images, vec!["a.png", "b.png"]);
        assert!(requests[1].images.is_empty());
        assert!(chat.queued_images().is_empty());

        chat.parent().unwrap();
        assert_eq!(
            chat.print_history(),
            "user: look [2 images]: a.png, b.png\nassistant: seen"
        );
    }

    #[test]
    fn disabled_chat_ignores_messages() {
        let provider = MockProvider::new();
        let mut chat = conversation(&provider);
        chat.queue_images(["x.png"]);
        chat.toggle_chat(false);

        assert_eq!(chat.submit_message("ignored").unwrap(), None);
        assert!(provider.requests().is_empty());
        assert_eq!(chat.tree().node_count(), 1);
        assert_eq!(chat.queued_images().len(), 1);

        chat.toggle_chat(true);
        assert!(chat.submit_message("heard").unwrap().is_some());
    }

    #[test]
    fn navigation_forks_branches() {
        let provider = MockProvider::with_replies(["a", "b", "c"]);
        let mut chat = conversation(&provider);

        chat.submit_message("one").unwrap();
        let first = chat.current_hash();
        chat.submit_message("two").unwrap();

        chat.goto(&first[..10]).unwrap();
        chat.submit_message("two, differently").unwrap();

        chat.goto(&first).unwrap();
        let children = chat.list_children();
        assert_eq!(children.len(), 2);

        chat.child(1).unwrap();
        assert_eq!(chat.current_hash(), children[1]);
        assert_eq!(
            provider.requests()[2].history,
            vec![ChatMessage::user("one"), ChatMessage::assistant("a")]
        );
    }

    #[test]
    fn child_index_is_bounds_checked() {
        let provider = MockProvider::with_replies(["a"]);
        let mut chat = conversation(&provider);
        chat.submit_message("q").unwrap();
        chat.root();

        assert_matches!(
            chat.child(1),
            Err(BrunchError::ChildIndexOutOfBounds { index: 1, len: 1 })
        );
        chat.child(0).unwrap();
        assert!(chat.has_parent());
    }

    #[test]
    fn root_and_parent_are_idempotent_at_the_top() {
        let provider = MockProvider::with_replies(["a", "b"]);
        let mut chat = conversation(&provider);
        chat.submit_message("q1").unwrap();
        chat.submit_message("q2").unwrap();
        let root = chat.tree().root_id();

        for _ in 0..3 {
            chat.root();
            assert_eq!(chat.cursor(), root);
        }
        chat.parent().unwrap();
        assert_eq!(chat.cursor(), root);
    }

    #[test]
    fn goto_unknown_hash_keeps_cursor() {
        let provider = MockProvider::new();
        let mut chat = conversation(&provider);

        let error = chat.goto("ffffffff").expect_err("nothing should match");
        assert_eq!(error.kind(), ErrorKind::NotFound);
        assert_eq!(chat.cursor(), chat.tree().root_id());
    }

    #[test]
    fn artifacts_come_from_cursor_reply() {
        let provider = MockProvider::with_replies(["Sure:\n```rs:main.rs\nfn main() {}\n```"]);
        let mut chat = conversation(&provider);
        assert!(chat.artifacts().unwrap().is_empty());

        chat.submit_message("write main").unwrap();
        let artifacts = chat.artifacts().unwrap();
        assert_eq!(artifacts.len(), 2);
        assert_eq!(artifacts[1].data(), "fn main() {}\n");
    }

    #[test]
    fn contexts_attach_through_provider() {
        let provider = MockProvider::new();
        let mut chat = conversation(&provider);

        chat.attach_context(ContextSettings::new("docs")).unwrap();
        assert_eq!(chat.context_names(), vec!["docs".to_string()]);
        assert_eq!(provider.attached_contexts(), vec!["docs".to_string()]);

        provider.reject_contexts();
        let error = chat
            .attach_context(ContextSettings::new("wiki"))
            .expect_err("rejected context");
        assert_eq!(error.kind(), ErrorKind::ProviderFailure);
        assert_eq!(chat.context_names(), vec!["docs".to_string()]);
    }

    #[test]
    fn split_turn_applies_under_original_parent() {
        let provider = MockProvider::new();
        let mut chat = conversation(&provider);
        let turn = chat.prepare_turn("async question").unwrap();
        assert_eq!(turn.parent(), chat.tree().root_id());
        assert_eq!(turn.request().question, "async question");

        let id = chat.apply_turn(turn, "async answer").unwrap();
        assert_eq!(chat.cursor(), id);
        assert!(provider.requests().is_empty());
    }
}
