//! JSON tree dump (`json` feature), mirroring the teacher's `export-json`
//! adapter: a `#[derive(Serialize)]` mirror of the decoded structure for
//! tooling that wants to inspect a document without linking against the
//! rest of the crate's node/id types.

use alloc::string::String;
use alloc::vec::Vec;

use serde::Serialize;

use crate::hash::HashType;
use crate::record::LeafValue;
use crate::tree::{NodeData, NodeId, Tree};

/// A JSON-serializable mirror of one [`Tree`] node, built recursively by
/// [`tree_to_json`].
#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JsonNode {
    Leaf { id: u64, value: JsonLeafValue },
    Container { id: u64, validated: Option<bool>, hash_function: Option<HashType>, children: Vec<JsonNode> },
}

/// A JSON-serializable mirror of [`LeafValue`]. Numeric and boolean leaves
/// serialize as their native JSON types; strings and blobs as a UTF-8 string
/// (blobs lossily, for readability — round-tripping the dump back into bytes
/// isn't a goal).
#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JsonLeafValue {
    UInt32(u32),
    Int32(i32),
    UInt64(u64),
    Int64(i64),
    Bool(bool),
    Float32(f32),
    Float64(f64),
    VarUInt(u64),
    VarInt(i64),
    Utf8String(String),
    Blob(String),
    Raw128(String),
    App { tag: u64, len: usize },
}

impl From<&LeafValue> for JsonLeafValue {
    fn from(value: &LeafValue) -> Self {
        match value {
            LeafValue::UInt32(v) => JsonLeafValue::UInt32(*v),
            LeafValue::Int32(v) => JsonLeafValue::Int32(*v),
            LeafValue::UInt64(v) => JsonLeafValue::UInt64(*v),
            LeafValue::Int64(v) => JsonLeafValue::Int64(*v),
            LeafValue::Bool(v) => JsonLeafValue::Bool(*v),
            LeafValue::Float32(v) => JsonLeafValue::Float32(*v),
            LeafValue::Float64(v) => JsonLeafValue::Float64(*v),
            LeafValue::VarUInt(v) => JsonLeafValue::VarUInt(*v),
            LeafValue::VarInt(v) => JsonLeafValue::VarInt(*v),
            LeafValue::Utf8String(bytes) => JsonLeafValue::Utf8String(String::from_utf8_lossy(bytes).into_owned()),
            LeafValue::Blob(bytes) => JsonLeafValue::Blob(hex_encode(bytes)),
            LeafValue::Raw128(bytes) => JsonLeafValue::Raw128(hex_encode(bytes)),
            LeafValue::App { tag, payload } => JsonLeafValue::App { tag: *tag, len: payload.len() },
        }
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        s.push_str(&alloc::format!("{b:02x}"));
    }
    s
}

/// Dumps every child of `node` (recursively) into a [`JsonNode`] list, in
/// document order.
pub fn children_to_json(tree: &Tree, node: NodeId) -> Vec<JsonNode> {
    tree.get(node)
        .map(|n| n.children().iter().map(|&child| node_to_json(tree, child)).collect())
        .unwrap_or_default()
}

fn node_to_json(tree: &Tree, node: NodeId) -> JsonNode {
    let n = tree.get(node).expect("walked from a valid parent");
    match &n.data {
        NodeData::Leaf(value) => JsonNode::Leaf { id: n.id, value: value.into() },
        NodeData::Container { children, validated, hash_function, .. } => JsonNode::Container {
            id: n.id,
            validated: *validated,
            hash_function: *hash_function,
            children: children.iter().map(|&child| node_to_json(tree, child)).collect(),
        },
    }
}

/// Dumps an entire [`Tree`] (every top-level child of its root) to JSON text.
pub fn tree_to_json(tree: &Tree) -> Result<String, serde_json::Error> {
    serde_json::to_string(&children_to_json(tree, tree.root()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::ContainerFlags;

    #[test]
    fn dumps_a_leaf_and_a_container() {
        let mut tree = Tree::new(ContainerFlags::default());
        let root = tree.root();
        tree.insert_leaf(root, 1, LeafValue::UInt32(42));
        let container = tree.insert_container(root, 2, ContainerFlags::default());
        tree.insert_leaf(container, 3, LeafValue::Utf8String(alloc::vec![b'h', b'i']));

        let json = tree_to_json(&tree).unwrap();
        assert!(json.contains("\"id\":1"));
        assert!(json.contains("\"value\":\"hi\"") || json.contains("\"hi\""));
        assert!(json.contains("\"kind\":\"container\""));
    }
}
