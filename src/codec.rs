//! Nested JSON documents for whole trees.
//!
//! Every node is written as
//! `{"node_data": {"type": "root" | "message_pair", ...}, "children": {hash: node}}`
//! with children embedded in creation order. Decoding rebuilds parent links
//! from the nesting.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;

use crate::error::BrunchError;
use crate::message::Message;
use crate::node::{MessagePair, NodeKind, NodeRef, RootNode};
use crate::tree::{ConversationTree, NodeId};

const NODE_DATA: &str = "node_data";
const CHILDREN: &str = "children";
const TYPE: &str = "type";

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum NodeDataRef<'a> {
    Root(&'a RootNode),
    MessagePair(PairFieldsRef<'a>),
}

#[derive(Serialize)]
struct PairFieldsRef<'a> {
    assistant: &'a Option<Message>,
    user: &'a Option<Message>,
    #[serde(with = "time::serde::rfc3339")]
    time: OffsetDateTime,
}

#[derive(Deserialize)]
struct PairFields {
    #[serde(default)]
    assistant: Option<Message>,
    #[serde(default)]
    user: Option<Message>,
    #[serde(with = "time::serde::rfc3339")]
    time: OffsetDateTime,
}

impl From<PairFields> for MessagePair {
    fn from(fields: PairFields) -> Self {
        Self {
            user: fields.user,
            assistant: fields.assistant,
            time: fields.time,
        }
    }
}

/// Serializes the whole tree to JSON bytes.
pub fn encode(tree: &ConversationTree) -> Result<Vec<u8>, BrunchError> {
    encode_subtree(tree, tree.root_id())
}

/// Writes the document for `start` and everything below it.
///
/// The document is streamed from an explicit stack of open nodes, so depth is
/// bounded by the heap rather than the call stack.
pub fn encode_subtree(tree: &ConversationTree, start: NodeId) -> Result<Vec<u8>, BrunchError> {
    let mut out = Vec::new();
    write_node_open(&mut out, tree, start)?;

    // (node, index of the next child to write)
    let mut open: Vec<(NodeId, usize)> = vec![(start, 0)];
    while let Some((id, next)) = open.last_mut() {
        let Some(&child) = tree.children(*id).get(*next) else {
            out.extend_from_slice(b"}}");
            open.pop();
            continue;
        };
        let first = *next == 0;
        *next += 1;

        if !first {
            out.push(b',');
        }
        write_json(&mut out, &tree.hash(child)?, "child hash")?;
        out.push(b':');
        write_node_open(&mut out, tree, child)?;
        open.push((child, 0));
    }

    Ok(out)
}

/// Writes `{"node_data":{...},"children":{` for `id`.
fn write_node_open(
    out: &mut Vec<u8>,
    tree: &ConversationTree,
    id: NodeId,
) -> Result<(), BrunchError> {
    out.push(b'{');
    write_json(out, NODE_DATA, "node data")?;
    out.push(b':');
    write_json(out, &node_data_ref(tree.node(id)?), "node data")?;
    out.push(b',');
    write_json(out, CHILDREN, "node children")?;
    out.extend_from_slice(b":{");
    Ok(())
}

fn write_json<T: Serialize + ?Sized>(
    out: &mut Vec<u8>,
    value: &T,
    what: &'static str,
) -> Result<(), BrunchError> {
    serde_json::to_writer(out, value).map_err(|source| BrunchError::Encode { what, source })
}

fn node_data_ref(node: NodeRef<'_>) -> NodeDataRef<'_> {
    match node {
        NodeRef::Root(root) => NodeDataRef::Root(root),
        NodeRef::MessagePair(pair) => NodeDataRef::MessagePair(PairFieldsRef {
            assistant: &pair.assistant,
            user: &pair.user,
            time: pair.time,
        }),
    }
}

/// Parses a tree from JSON bytes. Any malformed node fails the whole decode.
pub fn decode(bytes: &[u8]) -> Result<ConversationTree, BrunchError> {
    let mut json = serde_json::Deserializer::from_slice(bytes);
    json.disable_recursion_limit();
    let document = Value::deserialize(serde_stacker::Deserializer::new(&mut json))
        .map_err(|source| BrunchError::json("conversation tree", source))?;
    if let Err(source) = json.end() {
        release(document);
        return Err(BrunchError::json("conversation tree", source));
    }
    decode_value(document)
}

/// Rebuilds a tree from an already parsed document.
pub fn decode_value(document: Value) -> Result<ConversationTree, BrunchError> {
    let (kind, node_data, children) = split_document(document)?;
    let root = if kind == NodeKind::Root {
        serde_json::from_value::<RootNode>(Value::Object(node_data))
            .map_err(|source| BrunchError::json("root node", source))
    } else {
        Err(BrunchError::NotARootDocument {
            found: kind.to_string(),
        })
    };
    let root = match root {
        Ok(root) => root,
        Err(error) => {
            release(Value::Object(children));
            return Err(error);
        }
    };

    let mut tree = ConversationTree::new(root);
    let mut pending = Pending(
        children
            .into_iter()
            .rev()
            .map(|(_, child)| (tree.root_id(), child))
            .collect(),
    );

    while let Some((parent, document)) = pending.0.pop() {
        let (kind, node_data, children) = split_document(document)?;
        let id = if kind == NodeKind::Root {
            Err(BrunchError::NestedRoot)
        } else {
            serde_json::from_value::<PairFields>(Value::Object(node_data))
                .map_err(|source| BrunchError::json("message pair", source))
                .and_then(|fields| tree.add_child(parent, fields.into()))
        };
        let id = match id {
            Ok(id) => id,
            Err(error) => {
                release(Value::Object(children));
                return Err(error);
            }
        };

        pending
            .0
            .extend(children.into_iter().rev().map(|(_, child)| (id, child)));
    }

    Ok(tree)
}

/// Child documents not yet attached, torn down iteratively if decoding stops early.
struct Pending(Vec<(NodeId, Value)>);

impl Drop for Pending {
    fn drop(&mut self) {
        for (_, document) in self.0.drain(..) {
            release(document);
        }
    }
}

/// Drops a parsed document without recursing once per nesting level.
fn release(value: Value) {
    let mut stack = vec![value];
    while let Some(value) = stack.pop() {
        match value {
            Value::Object(map) => stack.extend(map.into_iter().map(|(_, value)| value)),
            Value::Array(items) => stack.extend(items),
            _ => {}
        }
    }
}

fn split_document(
    document: Value,
) -> Result<(NodeKind, Map<String, Value>, Map<String, Value>), BrunchError> {
    let Value::Object(mut document) = document else {
        release(document);
        return Err(BrunchError::MissingNodeType);
    };

    let children = match document.remove(CHILDREN) {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(children)) => children,
        Some(other) => {
            release(other);
            release(Value::Object(document));
            return Err(BrunchError::json(
                "node children",
                serde::de::Error::custom("expected an object of child documents"),
            ));
        }
    };

    let node_data = match document.remove(NODE_DATA) {
        Some(Value::Object(node_data)) => Ok(node_data),
        _ => Err(BrunchError::MissingNodeType),
    };
    release(Value::Object(document));

    match node_data.and_then(|node_data| Ok((node_kind(&node_data)?, node_data))) {
        Ok((kind, node_data)) => Ok((kind, node_data, children)),
        Err(error) => {
            release(Value::Object(children));
            Err(error)
        }
    }
}

fn node_kind(node_data: &Map<String, Value>) -> Result<NodeKind, BrunchError> {
    match node_data.get(TYPE) {
        None | Some(Value::Null) => Err(BrunchError::MissingNodeType),
        Some(Value::String(found)) if found == NodeKind::Root.as_str() => Ok(NodeKind::Root),
        Some(Value::String(found)) if found == NodeKind::MessagePair.as_str() => {
            Ok(NodeKind::MessagePair)
        }
        Some(Value::String(found)) => Err(BrunchError::UnknownNodeType {
            found: found.clone(),
        }),
        Some(other) => Err(BrunchError::UnknownNodeType {
            found: other.to_string(),
        }),
    }
}
