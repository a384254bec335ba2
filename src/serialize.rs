//! Higher-level (de)serialization combinators (supplements the streaming
//! core per SPEC_FULL.md §4.3a). `spec.md` excludes the original's
//! template-metaprogrammed struct/iterator (de)serializers and points at "an
//! ordinary derive-macro/attribute-driven layer over the event protocol" as
//! the target-language replacement. This module is the hand-implementable
//! half of that layer: `ToRecords`/`FromRecords` map a single Rust value to
//! and from one node of a [`Tree`], and `decode_field`/`decode_optional_field`/
//! `decode_repeated_field` handle the field-level presence/repetition
//! concerns a derive macro would otherwise generate per struct field.
//!
//! A derive macro is not attempted here — a subtly wrong one would be worse
//! than none without the ability to compile and expand it — so callers write
//! the `impl` blocks below by hand, the same shape a derive would produce.

use alloc::string::String;
use alloc::vec::Vec;

use crate::error::{Error, Result};
use crate::record::LeafValue;
use crate::tree::{NodeData, NodeId, Tree};

/// Encodes `self` as one node under `parent`, tagged with `id`.
///
/// # Example
///
/// The manual shape a derive macro would generate for a two-field struct:
///
/// ```ignore
/// struct Point { x: i32, y: i32 }
///
/// impl ToRecords for Point {
///     fn to_records(&self, id: u64, tree: &mut Tree, parent: NodeId) {
///         let node = tree.insert_container(parent, id, ContainerFlags(CF_ARMORED));
///         self.x.to_records(1, tree, node);
///         self.y.to_records(2, tree, node);
///     }
/// }
/// ```
pub trait ToRecords {
    fn to_records(&self, id: u64, tree: &mut Tree, parent: NodeId);
}

/// Decodes `self` from a single already-located node.
pub trait FromRecords: Sized {
    fn from_node(tree: &Tree, node: NodeId) -> Result<Self>;
}

/// Decodes a required field: exactly one child of `parent` with the given
/// `id` is expected.
pub fn decode_field<T: FromRecords>(tree: &Tree, parent: NodeId, id: u64) -> Result<T> {
    let node = tree.find_by_id(parent, id).next().ok_or(Error::UnsupportedRecordType)?;
    T::from_node(tree, node)
}

/// Decodes an optional field: absence is `Ok(None)`, never an error.
pub fn decode_optional_field<T: FromRecords>(tree: &Tree, parent: NodeId, id: u64) -> Result<Option<T>> {
    match tree.find_by_id(parent, id).next() {
        Some(node) => Ok(Some(T::from_node(tree, node)?)),
        None => Ok(None),
    }
}

/// Decodes every child of `parent` with the given `id`, in document order
/// (spec §3 invariant 5: duplicate ids are preserved, not merged).
pub fn decode_repeated_field<T: FromRecords>(tree: &Tree, parent: NodeId, id: u64) -> Result<Vec<T>> {
    tree.find_by_id(parent, id).map(|node| T::from_node(tree, node)).collect()
}

fn leaf_node<'a>(tree: &'a Tree, node: NodeId) -> Result<&'a LeafValue> {
    match &tree.get(node).ok_or(Error::UnsupportedRecordType)?.data {
        NodeData::Leaf(v) => Ok(v),
        NodeData::Container { .. } => Err(Error::UnsupportedRecordType),
    }
}

macro_rules! impl_leaf_records {
    ($ty:ty, $variant:ident) => {
        impl ToRecords for $ty {
            fn to_records(&self, id: u64, tree: &mut Tree, parent: NodeId) {
                tree.insert_leaf(parent, id, LeafValue::$variant(*self));
            }
        }

        impl FromRecords for $ty {
            fn from_node(tree: &Tree, node: NodeId) -> Result<Self> {
                match leaf_node(tree, node)? {
                    LeafValue::$variant(v) => Ok(*v),
                    _ => Err(Error::UnsupportedRecordType),
                }
            }
        }
    };
}

impl_leaf_records!(u32, UInt32);
impl_leaf_records!(i32, Int32);
impl_leaf_records!(u64, UInt64);
impl_leaf_records!(i64, Int64);
impl_leaf_records!(bool, Bool);
impl_leaf_records!(f32, Float32);
impl_leaf_records!(f64, Float64);

impl ToRecords for String {
    fn to_records(&self, id: u64, tree: &mut Tree, parent: NodeId) {
        tree.insert_leaf(parent, id, LeafValue::Utf8String(self.as_bytes().to_vec()));
    }
}

impl FromRecords for String {
    fn from_node(tree: &Tree, node: NodeId) -> Result<Self> {
        match leaf_node(tree, node)? {
            LeafValue::Utf8String(bytes) => {
                String::from_utf8(bytes.clone()).map_err(|_| Error::UnsupportedRecordType)
            }
            _ => Err(Error::UnsupportedRecordType),
        }
    }
}

/// Opaque bytes (spec §3 `RT_BLOB`). Plain `Vec<u8>` instead uses the
/// generic repeated-leaf encoding below, one `UInt32`-sized leaf per byte —
/// correct but wasteful, so reach for `Blob` whenever the field really is a
/// byte string.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Blob(pub Vec<u8>);

impl ToRecords for Blob {
    fn to_records(&self, id: u64, tree: &mut Tree, parent: NodeId) {
        tree.insert_leaf(parent, id, LeafValue::Blob(self.0.clone()));
    }
}

impl FromRecords for Blob {
    fn from_node(tree: &Tree, node: NodeId) -> Result<Self> {
        match leaf_node(tree, node)? {
            LeafValue::Blob(bytes) => Ok(Blob(bytes.clone())),
            _ => Err(Error::UnsupportedRecordType),
        }
    }
}

/// `None` is encoded as the field's complete absence; `Some` is encoded
/// exactly like the bare value. Decoding an `Option<T>` field always goes
/// through [`decode_optional_field`], never through [`FromRecords::from_node`]
/// directly — there is no node to inspect when the value is absent.
impl<T: ToRecords> ToRecords for Option<T> {
    fn to_records(&self, id: u64, tree: &mut Tree, parent: NodeId) {
        if let Some(value) = self {
            value.to_records(id, tree, parent);
        }
    }
}

/// Each element is written as its own node under `parent`, all sharing `id`
/// (spec §3 invariant 5 already makes the tree a duplicate-id multimap, so no
/// wrapping sub-container is needed). Decode with [`decode_repeated_field`].
impl<T: ToRecords> ToRecords for Vec<T> {
    fn to_records(&self, id: u64, tree: &mut Tree, parent: NodeId) {
        for item in self {
            item.to_records(id, tree, parent);
        }
    }
}
