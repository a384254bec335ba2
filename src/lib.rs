#![no_std]

#[cfg(any(feature = "std", test))]
extern crate std;

// Needed for Vec, String, Box, BTreeMap and friends under no_std.
extern crate alloc;

pub mod decoder;
pub mod encoder;
pub mod error;
pub mod hash;
pub mod io;
#[cfg(feature = "json")]
pub mod json;
pub mod record;
pub mod registry;
pub mod serialize;
pub mod sink;
pub mod tree;
pub mod varint;

pub use decoder::Decoder;
pub use encoder::{Encoder, HashingEncoder};
pub use error::{Error, Result};
pub use hash::{HashRegistry, HashType, IncrementalHash, HT_APP0, HT_CRC32, HT_INVALID, HT_MD5, HT_NONE, HT_SHA1, HT_SHA256, HT_SHA512};
pub use io::{ByteSink, ByteSource, MemoryIo};
pub use record::{LeafValue, RecordType};
pub use registry::Registry;
pub use sink::{ContainerFlags, ContainerFooter, ContainerMeta, StreamSink};
pub use tree::{Node, NodeData, NodeId, Tree, TreeSink};

/// Decodes a complete byte stream straight into a [`Tree`] (spec §6.5
/// convenience surface), the way a caller who doesn't need streaming and
/// just wants the document would use `bytes_to_tree` in the original.
/// `registry` defaults to an empty [`Registry`] (no application record types)
/// when `None`.
pub fn bytes_to_tree<S: ByteSource>(src: S, registry: Option<Registry>) -> Result<Tree> {
    let registry = registry.unwrap_or_default();
    let mut decoder = Decoder::new(src, registry, TreeSink::new());
    decoder.read_all()?;
    Ok(decoder.into_sink().into_tree())
}

/// Encodes every top-level child of `tree`'s root into `sink` and returns it
/// (spec §6.5 convenience surface). `armor` sets the encoder's default
/// armoring for any container that doesn't otherwise need one.
pub fn tree_to_bytes<S: ByteSink>(tree: &Tree, sink: S, armor: bool) -> Result<S> {
    let mut enc = Encoder::new(sink);
    for &child in tree.get(tree.root()).expect("tree always has a root").children() {
        encode_subtree(&mut enc, tree, child, armor)?;
    }
    enc.end_of_stream()?;
    Ok(enc.into_sink())
}

/// `armor` is the caller's blanket default (as with `Encoder::set_default_armor`);
/// a container's own stored `CF_ARMORED` bit is preserved on top of it rather
/// than being replaced by it, so a container that was both sized and armored
/// round-trips as both even when `armor` is `false`.
fn encode_subtree<S: ByteSink>(enc: &mut Encoder<S>, tree: &Tree, node: NodeId, armor: bool) -> Result<()> {
    let n = tree.get(node).expect("walked from a valid parent");
    match &n.data {
        NodeData::Leaf(value) => enc.push_node(n.id, value),
        NodeData::Container { flags, children, .. } => {
            let declared_count = flags.with_size().then(|| children.len() as i64);
            let armored = flags.armored() || declared_count.is_none() || armor;
            enc.start_container_with_armor(n.id, declared_count, armored)?;
            for &child in children {
                encode_subtree(enc, tree, child, armor)?;
            }
            enc.end_container()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_to_tree_then_tree_to_bytes_round_trips() {
        let bytes = alloc::vec![0x82, 0x81, 0x12, 0x34, 0x56, 0x78, 0x8c];
        let tree = bytes_to_tree(MemoryIo::new(bytes.clone()), None).unwrap();
        let out = tree_to_bytes(&tree, MemoryIo::empty(), false).unwrap();
        assert_eq!(out.into_inner(), bytes);
    }
}
