//! Plain-text views of a tree for terminal front-ends.

use std::fmt::Write as _;

use crate::message::Message;
use crate::node::{MessagePair, NodeRef, RootNode};
use crate::tree::{ConversationTree, NodeId};

const PREVIEW_CHARS: usize = 25;

/// Number of hash characters front-ends show by default.
pub const SHORT_HASH_LEN: usize = 8;

/// Leading characters of `hash`, for display only.
#[must_use]
pub fn short_hash(hash: &str) -> &str {
    hash.get(..SHORT_HASH_LEN).unwrap_or(hash)
}

/// First 25 characters of `content`, with `...` when truncated.
#[must_use]
pub fn preview(content: &str) -> String {
    match content.char_indices().nth(PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &content[..cut]),
        None => content.to_string(),
    }
}

/// Indented diagram of the tree below `start`.
#[must_use]
pub fn print_tree(tree: &ConversationTree, start: NodeId) -> String {
    let mut out = String::new();
    let mut stack = vec![(start, String::new(), true)];

    while let Some((id, indent, is_last)) = stack.pop() {
        let Ok(node) = tree.node(id) else {
            continue;
        };

        let node_indent = if is_last {
            indent
        } else {
            format!("{indent}│")
        };

        match node {
            NodeRef::Root(root) => write_root(&mut out, &node_indent, root),
            NodeRef::MessagePair(pair) => write_pair(&mut out, &node_indent, pair, is_last),
        }

        let children = tree.children(id);
        let child_indent = format!("{node_indent}    ");
        for (index, child) in children.iter().enumerate().rev() {
            stack.push((*child, child_indent.clone(), index + 1 == children.len()));
        }
    }

    out
}

fn write_root(out: &mut String, indent: &str, root: &RootNode) {
    let _ = writeln!(
        out,
        "{indent}[ROOT] Provider: {}, Model: {}",
        root.provider, root.model
    );
    let _ = writeln!(out, "{indent}├── Temperature: {:.2}", root.temperature);
    let _ = writeln!(out, "{indent}├── MaxTokens: {}", root.max_tokens);
    let _ = writeln!(out, "{indent}└── Hash: {}", root.hash());
}

fn write_pair(out: &mut String, indent: &str, pair: &MessagePair, is_last: bool) {
    let branch = if is_last { "└──" } else { "├──" };
    let _ = writeln!(
        out,
        "{indent}{branch} [MESSAGE_PAIR] Time: {}",
        display_time(pair)
    );

    for (label, message) in [("User", &pair.user), ("Assistant", &pair.assistant)] {
        let Some(message) = message else {
            continue;
        };
        write_message(out, indent, label, message);
    }

    let _ = writeln!(out, "{indent}    └── Hash: {}", pair.hash());
}

fn write_message(out: &mut String, indent: &str, label: &str, message: &Message) {
    let _ = writeln!(
        out,
        "{indent}    ├── {label} ({}): {}",
        message.role(),
        preview(&message.content_lossy())
    );
    if !message.images().is_empty() {
        let _ = writeln!(
            out,
            "{indent}    ├── {label} Images: {}",
            message.images().join(", ")
        );
    }
}

fn display_time(pair: &MessagePair) -> String {
    let time = pair.time;
    format!(
        "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
        time.year(),
        u8::from(time.month()),
        time.day(),
        time.hour(),
        time.minute(),
        time.second()
    )
}

/// Transcript of the branch ending at `id`, one message per line.
#[must_use]
pub fn print_history(tree: &ConversationTree, id: NodeId) -> String {
    tree.history(id).join("\n")
}
