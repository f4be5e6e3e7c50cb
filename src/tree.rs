//! Append-only arena holding one conversation tree.
//!
//! The root lives in its own field; message pairs live in a `Vec` and are
//! addressed by [`NodeId`]. Children are owned as ordered id lists and the
//! parent link is a plain id, so the parent/child cycle never involves shared
//! ownership. Nodes are never removed, which keeps every issued id valid for
//! the lifetime of the tree.

use std::collections::HashMap;

use chat_provider::ChatMessage;

use crate::error::BrunchError;
use crate::message::Message;
use crate::node::{MessagePair, NodeRef, RootNode};

/// Handle to a node inside one [`ConversationTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    /// Position of the node in creation order; the root is `0`.
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone)]
struct PairSlot {
    pair: MessagePair,
    parent: NodeId,
    children: Vec<NodeId>,
}

#[derive(Debug, Clone)]
pub struct ConversationTree {
    root: RootNode,
    root_children: Vec<NodeId>,
    pairs: Vec<PairSlot>,
}

impl ConversationTree {
    #[must_use]
    pub fn new(root: RootNode) -> Self {
        Self {
            root,
            root_children: Vec::new(),
            pairs: Vec::new(),
        }
    }

    #[must_use]
    pub fn root_id(&self) -> NodeId {
        NodeId(0)
    }

    #[must_use]
    pub fn root(&self) -> &RootNode {
        &self.root
    }

    /// Total number of nodes, root included.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.pairs.len() + 1
    }

    #[must_use]
    pub fn contains(&self, id: NodeId) -> bool {
        id.0 <= self.pairs.len()
    }

    fn slot(&self, id: NodeId) -> Option<&PairSlot> {
        id.0.checked_sub(1).and_then(|index| self.pairs.get(index))
    }

    pub fn node(&self, id: NodeId) -> Result<NodeRef<'_>, BrunchError> {
        if id.0 == 0 {
            return Ok(NodeRef::Root(&self.root));
        }
        self.slot(id)
            .map(|slot| NodeRef::MessagePair(&slot.pair))
            .ok_or(BrunchError::UnknownNode { id: id.0 })
    }

    pub fn hash(&self, id: NodeId) -> Result<String, BrunchError> {
        Ok(self.node(id)?.hash())
    }

    /// Parent of `id`; `None` for the root and for ids outside the tree.
    #[must_use]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.slot(id).map(|slot| slot.parent)
    }

    /// Children of `id` in creation order; empty for ids outside the tree.
    #[must_use]
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        if id.0 == 0 {
            return &self.root_children;
        }
        self.slot(id).map_or(&[], |slot| slot.children.as_slice())
    }

    /// Appends `pair` as the last child of `parent` and returns its id.
    pub fn add_child(&mut self, parent: NodeId, pair: MessagePair) -> Result<NodeId, BrunchError> {
        if !self.contains(parent) {
            return Err(BrunchError::UnknownNode { id: parent.0 });
        }

        let id = NodeId(self.pairs.len() + 1);
        self.pairs.push(PairSlot {
            pair,
            parent,
            children: Vec::new(),
        });

        if parent.0 == 0 {
            self.root_children.push(id);
        } else if let Some(slot) = self.pairs.get_mut(parent.0 - 1) {
            slot.children.push(id);
        }

        Ok(id)
    }

    /// Every node reachable from `start`, parents before children, siblings in
    /// creation order.
    #[must_use]
    pub fn pre_order(&self, start: NodeId) -> Vec<NodeId> {
        if !self.contains(start) {
            return Vec::new();
        }

        let mut order = Vec::with_capacity(self.node_count());
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.children(id).iter().rev().copied());
        }
        order
    }

    /// Ids from the root down to `id`, both included.
    #[must_use]
    pub fn path_from_root(&self, id: NodeId) -> Vec<NodeId> {
        if !self.contains(id) {
            return Vec::new();
        }

        let mut path = vec![id];
        let mut current = id;
        while let Some(parent) = self.parent(current) {
            path.push(parent);
            current = parent;
        }
        path.reverse();
        path
    }

    /// Hash index over the whole tree, built by one traversal.
    #[must_use]
    pub fn hash_index(&self) -> HashIndex {
        HashIndex::from_entries(
            self.pre_order(self.root_id())
                .into_iter()
                .filter_map(|id| {
                    let hash = self.node(id).ok()?.hash();
                    (!hash.is_empty()).then_some((hash, id))
                })
                .collect(),
        )
    }

    /// Resolves a full hash or a hash prefix to a node.
    pub fn resolve(&self, query: &str) -> Result<NodeId, BrunchError> {
        self.hash_index().resolve(query)
    }

    /// Transcript lines from the root down to `id`.
    ///
    /// Ancestors contribute only complete pairs; `id` itself contributes
    /// whichever sides are set.
    #[must_use]
    pub fn history(&self, id: NodeId) -> Vec<String> {
        let path = self.path_from_root(id);
        let Some((last, ancestors)) = path.split_last() else {
            return Vec::new();
        };

        let mut lines = Vec::new();
        for ancestor in ancestors {
            if let Some(pair) = self.slot(*ancestor).map(|slot| &slot.pair) {
                if let (Some(user), Some(assistant)) = (&pair.user, &pair.assistant) {
                    lines.push(user.transcript_line());
                    lines.push(assistant.transcript_line());
                }
            }
        }

        if let Some(pair) = self.slot(*last).map(|slot| &slot.pair) {
            lines.extend(pair.user.iter().map(Message::transcript_line));
            lines.extend(pair.assistant.iter().map(Message::transcript_line));
        }

        lines
    }

    /// Model-facing history of the branch ending at `id`, oldest first.
    ///
    /// The walk runs leaf to root and is reversed before returning.
    pub fn provider_history(&self, id: NodeId) -> Result<Vec<ChatMessage>, BrunchError> {
        if !self.contains(id) {
            return Err(BrunchError::UnknownNode { id: id.0 });
        }

        let mut history = Vec::new();
        let mut current = Some(id);
        while let Some(slot) = current.and_then(|id| self.slot(id)) {
            if let (Some(user), Some(assistant)) = (&slot.pair.user, &slot.pair.assistant) {
                history.push(ChatMessage {
                    role: assistant.role(),
                    content: assistant.content()?,
                });
                history.push(ChatMessage {
                    role: user.role(),
                    content: user.content()?,
                });
            }
            current = Some(slot.parent);
        }

        history.reverse();
        Ok(history)
    }
}

/// Hash → node lookup supporting exact and prefix queries.
#[derive(Debug, Clone, Default)]
pub struct HashIndex {
    ordered: Vec<(String, NodeId)>,
    exact: HashMap<String, NodeId>,
}

impl HashIndex {
    /// Builds an index from `(hash, id)` entries in traversal order.
    ///
    /// When two nodes share a hash the first entry keeps the exact slot.
    #[must_use]
    pub fn from_entries(ordered: Vec<(String, NodeId)>) -> Self {
        let mut exact = HashMap::with_capacity(ordered.len());
        for (hash, id) in &ordered {
            exact.entry(hash.clone()).or_insert(*id);
        }
        Self { ordered, exact }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    /// Exact match first, then the first entry whose hash starts with `query`.
    ///
    /// An ambiguous prefix resolves to whichever match comes first in
    /// traversal order; use [`HashIndex::matches`] to detect ambiguity.
    pub fn resolve(&self, query: &str) -> Result<NodeId, BrunchError> {
        if query.is_empty() {
            return Err(BrunchError::node_not_found(query));
        }
        if let Some(id) = self.exact.get(query) {
            return Ok(*id);
        }
        self.ordered
            .iter()
            .find(|(hash, _)| hash.starts_with(query))
            .map(|(_, id)| *id)
            .ok_or_else(|| BrunchError::node_not_found(query))
    }

    /// Every node whose hash starts with `prefix`, in traversal order.
    #[must_use]
    pub fn matches(&self, prefix: &str) -> Vec<NodeId> {
        self.ordered
            .iter()
            .filter(|(hash, _)| hash.starts_with(prefix))
            .map(|(_, id)| *id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use chat_provider::ChatRole;
    use time::macros::datetime;
    use time::Duration;

    use super::*;
    use crate::error::ErrorKind;

    fn root() -> RootNode {
        RootNode {
            provider: "mock".to_string(),
            model: "mock-model".to_string(),
            prompt: "system".to_string(),
            temperature: 0.7,
            max_tokens: 4000,
        }
    }

    fn pair(question: &str, answer: &str, seconds: i64) -> MessagePair {
        MessagePair::complete(
            Message::user(question),
            Message::assistant(answer),
            datetime!(2024-05-01 10:00:00 UTC) + Duration::seconds(seconds),
        )
    }

    /// root ─┬─ a ─┬─ b
    ///       │     └─ c
    ///       └─ d
    fn forked_tree() -> (ConversationTree, [NodeId; 4]) {
        let mut tree = ConversationTree::new(root());
        let a = tree.add_child(tree.root_id(), pair("qa", "aa", 0)).unwrap();
        let b = tree.add_child(a, pair("qb", "ab", 1)).unwrap();
        let c = tree.add_child(a, pair("qc", "ac", 2)).unwrap();
        let d = tree.add_child(tree.root_id(), pair("qd", "ad", 3)).unwrap();
        (tree, [a, b, c, d])
    }

    #[test]
    fn add_child_links_parent_and_preserves_order() {
        let (tree, [a, b, c, d]) = forked_tree();

        assert_eq!(tree.children(tree.root_id()), &[a, d]);
        assert_eq!(tree.children(a), &[b, c]);
        assert_eq!(tree.parent(b), Some(a));
        assert_eq!(tree.parent(a), Some(tree.root_id()));
        assert_eq!(tree.parent(tree.root_id()), None);
        assert_eq!(tree.node_count(), 5);
    }

    #[test]
    fn add_child_rejects_unknown_parent() {
        let mut tree = ConversationTree::new(root());
        let error = tree
            .add_child(NodeId(9), pair("q", "a", 0))
            .expect_err("unknown parent must fail");
        assert_eq!(error.kind(), ErrorKind::NotFound);
        assert_eq!(tree.node_count(), 1);
    }

    #[test]
    fn pre_order_visits_parents_first_in_creation_order() {
        let (tree, [a, b, c, d]) = forked_tree();
        assert_eq!(tree.pre_order(tree.root_id()), vec![tree.root_id(), a, b, c, d]);
        assert_eq!(tree.pre_order(a), vec![a, b, c]);
    }

    #[test]
    fn path_from_root_includes_both_ends() {
        let (tree, [a, _, c, _]) = forked_tree();
        assert_eq!(tree.path_from_root(c), vec![tree.root_id(), a, c]);
        assert_eq!(tree.path_from_root(tree.root_id()), vec![tree.root_id()]);
    }

    #[test]
    fn resolve_finds_exact_and_prefix_hashes() {
        let (tree, [_, b, _, _]) = forked_tree();
        let hash = tree.hash(b).unwrap();

        assert_eq!(tree.resolve(&hash).unwrap(), b);
        assert_eq!(tree.resolve(&hash[..12]).unwrap(), b);
        assert_eq!(tree.resolve(&tree.root().hash()).unwrap(), tree.root_id());
    }

    #[test]
    fn resolve_reports_missing_and_empty_queries() {
        let (tree, _) = forked_tree();

        for query in ["zzzz", ""] {
            let error = tree.resolve(query).expect_err("should not resolve");
            assert_eq!(error.kind(), ErrorKind::NotFound);
        }
    }

    #[test]
    fn hash_index_prefix_resolution_with_shared_leading_digits() {
        let h1 = format!("94df98aa{}", "0".repeat(56));
        let h2 = format!("94df99bb{}", "0".repeat(56));
        let index = HashIndex::from_entries(vec![(h1.clone(), NodeId(1)), (h2, NodeId(2))]);

        assert_eq!(index.resolve("94df98").unwrap(), NodeId(1));
        assert_eq!(index.resolve(&h1).unwrap(), NodeId(1));

        // "94df9" is ambiguous: first match in traversal order wins.
        let ambiguous = index.resolve("94df9").unwrap();
        assert!([NodeId(1), NodeId(2)].contains(&ambiguous));
        assert_eq!(index.matches("94df9"), vec![NodeId(1), NodeId(2)]);
    }

    #[test]
    fn colliding_hashes_keep_first_exact_match() {
        let hash = "ab".repeat(32);
        let index = HashIndex::from_entries(vec![(hash.clone(), NodeId(3)), (hash.clone(), NodeId(4))]);

        assert_eq!(index.resolve(&hash).unwrap(), NodeId(3));
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn history_lists_ancestors_then_self() {
        let (tree, [_, b, _, _]) = forked_tree();

        assert_eq!(
            tree.history(b),
            vec!["user: qa", "assistant: aa", "user: qb", "assistant: ab"]
        );
        assert!(tree.history(tree.root_id()).is_empty());
    }

    #[test]
    fn history_includes_partial_self_pair() {
        let mut tree = ConversationTree::new(root());
        let mut partial = MessagePair::at(datetime!(2024-05-01 10:00:00 UTC));
        partial.user = Some(Message::user("pending"));
        let id = tree.add_child(tree.root_id(), partial).unwrap();

        assert_eq!(tree.history(id), vec!["user: pending"]);
        assert_eq!(tree.hash(id).unwrap(), "");
    }

    #[test]
    fn provider_history_is_root_to_leaf() {
        let (tree, [_, _, c, _]) = forked_tree();
        let history = tree.provider_history(c).unwrap();

        let rendered: Vec<(ChatRole, &str)> = history
            .iter()
            .map(|message| (message.role, message.content.as_str()))
            .collect();
        assert_eq!(
            rendered,
            vec![
                (ChatRole::User, "qa"),
                (ChatRole::Assistant, "aa"),
                (ChatRole::User, "qc"),
                (ChatRole::Assistant, "ac"),
            ]
        );
        assert!(tree.provider_history(tree.root_id()).unwrap().is_empty());
    }

    #[test]
    fn provider_history_surfaces_undecodable_content() {
        let mut tree = ConversationTree::new(root());
        let broken = MessagePair::complete(
            Message::user("ok"),
            Message::from_encoded(ChatRole::Assistant, "%%%"),
            datetime!(2024-05-01 10:00:00 UTC),
        );
        let id = tree.add_child(tree.root_id(), broken).unwrap();

        let error = tree.provider_history(id).expect_err("bad base64 must fail");
        assert_eq!(error.kind(), ErrorKind::DecodeFailure);
    }

    #[test]
    fn unknown_ids_read_as_empty() {
        let (tree, _) = forked_tree();
        let missing = NodeId(42);

        assert!(tree.children(missing).is_empty());
        assert_eq!(tree.parent(missing), None);
        assert!(tree.pre_order(missing).is_empty());
        assert!(tree.node(missing).is_err());
    }
}
