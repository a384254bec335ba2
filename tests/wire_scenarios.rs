//! Byte-exact wire scenarios (spec §8) driven through the public API rather
//! than the internal module tests, plus the quantified round-trip
//! properties §8 calls out.

use structstream::{
    bytes_to_tree, tree_to_bytes, Decoder, Error, LeafValue, MemoryIo, NodeData, Registry, TreeSink,
};

fn decode(bytes: Vec<u8>) -> structstream::Tree {
    bytes_to_tree(MemoryIo::new(bytes), None).unwrap()
}

#[test]
fn scenario_1_top_level_uint32_via_public_api() {
    let tree = decode(vec![0x82, 0x81, 0x12, 0x34, 0x56, 0x78, 0x8c]);
    let root = tree.root();
    let child = tree.get(root).unwrap().children()[0];
    match &tree.get(child).unwrap().data {
        NodeData::Leaf(LeafValue::UInt32(v)) => assert_eq!(*v, 0x78563412),
        other => panic!("unexpected node {other:?}"),
    }
}

#[test]
fn decode_then_reencode_is_byte_stable_for_unarmored_streams() {
    let original = vec![0x82, 0x81, 0x12, 0x34, 0x56, 0x78, 0x8c];
    let tree = decode(original.clone());
    let reencoded = tree_to_bytes(&tree, MemoryIo::empty(), false).unwrap().into_inner();
    assert_eq!(reencoded, original);
}

#[test]
fn armored_container_round_trips_through_tree() {
    let original = vec![0x81, 0x81, 0x84, 0x8c, 0x8c];
    let tree = decode(original.clone());
    let reencoded = tree_to_bytes(&tree, MemoryIo::empty(), false).unwrap().into_inner();
    assert_eq!(reencoded, original);
}

#[test]
fn sized_container_round_trips_through_tree() {
    let original = vec![0x81, 0x81, 0x81, 0x80, 0x8c];
    let tree = decode(original.clone());
    let reencoded = tree_to_bytes(&tree, MemoryIo::empty(), false).unwrap().into_inner();
    assert_eq!(reencoded, original);
}

#[test]
fn sized_and_armored_container_keeps_both_bits_on_reencode() {
    // flags = CF_WITH_SIZE | CF_ARMORED (0x05): a declared count *and* a
    // trailing END_OF_CHILDREN, both of which must survive a re-encode even
    // when the caller asks for `armor: false`.
    let original = vec![0x81, 0x81, 0x85, 0x80, 0x8c, 0x8c];
    let tree = decode(original.clone());
    let reencoded = tree_to_bytes(&tree, MemoryIo::empty(), false).unwrap().into_inner();
    assert_eq!(reencoded, original);
}

#[test]
fn truncated_stream_is_end_of_stream_not_silently_accepted() {
    let mut decoder = Decoder::new(MemoryIo::new(vec![0x82, 0x81, 0x12, 0x34]), Registry::new(), TreeSink::new());
    assert_eq!(decoder.read_all().unwrap_err(), Error::EndOfStream);
}

#[test]
fn duplicate_ids_are_preserved_in_document_order() {
    // container(id=1, armored) holding two UINT32(id=2) leaves.
    let bytes = vec![
        0x81, 0x81, 0x84, // container id=1, CF_ARMORED
        0x82, 0x82, 0x01, 0x00, 0x00, 0x00, // UINT32 id=2, value=1
        0x82, 0x82, 0x02, 0x00, 0x00, 0x00, // UINT32 id=2, value=2
        0x8c, // end container
        0x8c, // end of stream
    ];
    let tree = decode(bytes);
    let root = tree.root();
    let container = tree.get(root).unwrap().children()[0];
    let dups: Vec<_> = tree.find_by_id(container, 2).collect();
    assert_eq!(dups.len(), 2);
    match &tree.get(dups[0]).unwrap().data {
        NodeData::Leaf(LeafValue::UInt32(v)) => assert_eq!(*v, 1),
        other => panic!("unexpected node {other:?}"),
    }
    match &tree.get(dups[1]).unwrap().data {
        NodeData::Leaf(LeafValue::UInt32(v)) => assert_eq!(*v, 2),
        other => panic!("unexpected node {other:?}"),
    }
}
