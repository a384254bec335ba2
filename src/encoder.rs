//! Streaming encoder (spec §4.5), grounded on `streaming_bitstream.cpp`'s
//! `ToBitstream`/`ToBitstreamHashing`. A push-based mirror of
//! [`crate::decoder::Decoder`]: callers drive `start_container`/`push_node`/
//! `end_container`/`end_of_stream` directly rather than being driven by one.

use alloc::boxed::Box;
use alloc::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::hash::{HashPipeSink, HashRegistry, HashType, IncrementalHash};
use crate::io::ByteSink;
use crate::record::{self, LeafValue};
use crate::sink::{CF_ARMORED, CF_HASHED, CF_WITH_SIZE};
use crate::varint;

struct EncFrame {
    armored: bool,
    hashed: Option<HashType>,
}

/// A push-based encoder. Never installs a hash pipe on its own — use
/// [`HashingEncoder`] for that.
pub struct Encoder<S> {
    sink: Option<HashPipeSink<S>>,
    frames: alloc::vec::Vec<EncFrame>,
    default_armor: bool,
    closed: bool,
}

impl<S: ByteSink> Encoder<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink: Some(HashPipeSink::new(sink)),
            frames: alloc::vec::Vec::new(),
            default_armor: false,
            closed: false,
        }
    }

    /// Forces every container without an explicit `declared_count` to be
    /// armored regardless (it always is) and, when set, armors sized
    /// containers too — useful for streaming producers that want every
    /// container self-delimited on the wire.
    pub fn set_default_armor(&mut self, armor: bool) {
        self.default_armor = armor;
    }

    fn check_open(&self) -> Result<()> {
        if self.closed {
            Err(Error::AlreadyClosed)
        } else {
            Ok(())
        }
    }

    fn sink_mut(&mut self) -> &mut HashPipeSink<S> {
        self.sink.as_mut().expect("sink is always present between steps")
    }

    pub fn start_container(&mut self, id: u64, declared_count: Option<i64>) -> Result<()> {
        self.start_container_internal(id, declared_count, None, None)
    }

    /// Like [`Encoder::start_container`], but lets the caller force the
    /// `CF_ARMORED` bit independent of `declared_count`/`set_default_armor` —
    /// needed to preserve a container's original armored bit across a
    /// decode/re-encode round trip even when it also carries `CF_WITH_SIZE`.
    pub fn start_container_with_armor(&mut self, id: u64, declared_count: Option<i64>, armored: bool) -> Result<()> {
        self.start_container_internal(id, declared_count, None, Some(armored))
    }

    pub(crate) fn start_container_hashed(
        &mut self,
        id: u64,
        declared_count: Option<i64>,
        hash_type: HashType,
        hasher: Box<dyn IncrementalHash>,
    ) -> Result<()> {
        self.start_container_internal(id, declared_count, Some((hash_type, hasher)), None)
    }

    fn start_container_internal(
        &mut self,
        id: u64,
        declared_count: Option<i64>,
        hash: Option<(HashType, Box<dyn IncrementalHash>)>,
        armor_override: Option<bool>,
    ) -> Result<()> {
        self.check_open()?;

        let armored = armor_override.unwrap_or(self.default_armor || declared_count.is_none());
        let mut flags = 0u64;
        if declared_count.is_some() {
            flags |= CF_WITH_SIZE;
        }
        if armored {
            flags |= CF_ARMORED;
        }
        if hash.is_some() {
            flags |= CF_HASHED;
        }

        varint::write_varuint(self.sink_mut(), record::RT_CONTAINER)?;
        varint::write_varuint(self.sink_mut(), id)?;
        varint::write_varuint(self.sink_mut(), flags)?;
        if let Some(dc) = declared_count {
            varint::write_varint(self.sink_mut(), dc)?;
        }
        let hash_type = hash.as_ref().map(|(ht, _)| *ht);
        if let Some(ht) = hash_type {
            varint::write_varint(self.sink_mut(), ht as i64)?;
        }

        if let Some((_, hasher)) = hash {
            let sink = self.sink.take().expect("sink present");
            self.sink = Some(sink.install(hasher));
        }

        self.frames.push(EncFrame { armored, hashed: hash_type });
        Ok(())
    }

    pub fn push_node(&mut self, id: u64, value: &LeafValue) -> Result<()> {
        self.check_open()?;
        varint::write_varuint(self.sink_mut(), value.record_type())?;
        varint::write_varuint(self.sink_mut(), id)?;
        value.write(self.sink_mut())
    }

    pub fn end_container(&mut self) -> Result<()> {
        self.check_open()?;
        let frame = self.frames.pop().ok_or(Error::NestMisuse)?;

        if frame.armored {
            varint::write_varuint(self.sink_mut(), record::RT_END_OF_CHILDREN)?;
        }

        if frame.hashed.is_some() {
            let sink = self.sink.take().expect("sink present");
            let (restored, hasher) = sink.uninstall();
            self.sink = Some(restored);
            let digest = hasher.finalize();
            varint::write_varuint(self.sink_mut(), digest.len() as u64)?;
            self.sink_mut().write_all(&digest)?;
        }

        Ok(())
    }

    /// Writes the final top-level `END_OF_CHILDREN` and marks the encoder
    /// closed. Fails if any container is still open.
    pub fn end_of_stream(&mut self) -> Result<()> {
        self.check_open()?;
        if !self.frames.is_empty() {
            return Err(Error::NestMisuse);
        }
        varint::write_varuint(self.sink_mut(), record::RT_END_OF_CHILDREN)?;
        self.closed = true;
        Ok(())
    }

    /// Alias for [`Encoder::end_of_stream`].
    pub fn close(&mut self) -> Result<()> {
        self.end_of_stream()
    }

    /// Unwraps every hash pipe and returns the underlying sink. Panics if
    /// called while a hash pipe is still installed (an unclosed container).
    pub fn into_sink(self) -> S {
        let mut pipe = self.sink.expect("sink present");
        loop {
            match pipe {
                HashPipeSink::Plain(s) => return s,
                HashPipeSink::Hashing { inner, .. } => pipe = *inner,
            }
        }
    }
}

/// An [`Encoder`] wrapper that installs a hash pipe on containers selected by
/// id, the way `ToBitstreamHashing` looks up a hash function per container
/// instead of hard-coding one. `(tag, id)` in the spec is simplified to just
/// `id` here: only `CONTAINER` records can carry `CF_HASHED`, so the tag half
/// of the key is always the same constant.
pub struct HashingEncoder<S> {
    inner: Encoder<S>,
    hash_registry: HashRegistry,
    selection: BTreeMap<u64, HashType>,
}

impl<S: ByteSink> HashingEncoder<S> {
    pub fn new(sink: S, hash_registry: HashRegistry) -> Self {
        Self {
            inner: Encoder::new(sink),
            hash_registry,
            selection: BTreeMap::new(),
        }
    }

    /// Selects a hash function for the next `start_container` call with this
    /// id. The selection is consumed on use; callers that re-use ids across
    /// sibling containers must call this again for each one.
    pub fn select_hash(&mut self, id: u64, hash_type: HashType) {
        self.selection.insert(id, hash_type);
    }

    pub fn set_default_armor(&mut self, armor: bool) {
        self.inner.set_default_armor(armor);
    }

    pub fn start_container(&mut self, id: u64, declared_count: Option<i64>) -> Result<()> {
        match self.selection.remove(&id) {
            Some(ht) => {
                let hasher = self.hash_registry.get(ht).ok_or(Error::UnsupportedHashFunction)?;
                self.inner.start_container_hashed(id, declared_count, ht, hasher)
            }
            None => self.inner.start_container(id, declared_count),
        }
    }

    pub fn start_container_with_armor(&mut self, id: u64, declared_count: Option<i64>, armored: bool) -> Result<()> {
        self.inner.start_container_with_armor(id, declared_count, armored)
    }

    pub fn push_node(&mut self, id: u64, value: &LeafValue) -> Result<()> {
        self.inner.push_node(id, value)
    }

    pub fn end_container(&mut self) -> Result<()> {
        self.inner.end_container()
    }

    pub fn end_of_stream(&mut self) -> Result<()> {
        self.inner.end_of_stream()
    }

    pub fn close(&mut self) -> Result<()> {
        self.inner.close()
    }

    pub fn into_inner(self) -> Encoder<S> {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::Decoder;
    use crate::hash::HT_CRC32;
    use crate::io::MemoryIo;
    use crate::registry::Registry;
    use crate::tree::{NodeData, TreeSink};

    #[test]
    fn top_level_uint32_round_trips_scenario_1() {
        let mut enc = Encoder::new(MemoryIo::empty());
        enc.push_node(1, &LeafValue::UInt32(0x78563412)).unwrap();
        enc.end_of_stream().unwrap();
        let bytes = enc.into_sink().into_inner();
        assert_eq!(bytes, alloc::vec![0x82, 0x81, 0x12, 0x34, 0x56, 0x78, 0x8c]);
    }

    #[test]
    fn sized_container_has_no_end_of_children() {
        let mut enc = Encoder::new(MemoryIo::empty());
        enc.start_container(1, Some(0)).unwrap();
        enc.end_container().unwrap();
        enc.end_of_stream().unwrap();
        let bytes = enc.into_sink().into_inner();
        // tag,id,flags(WITH_SIZE),count(0) then only the top-level EOC.
        assert_eq!(bytes, alloc::vec![0x81, 0x81, 0x81, 0x80, 0x8c]);
    }

    #[test]
    fn armored_container_writes_end_of_children() {
        let mut enc = Encoder::new(MemoryIo::empty());
        enc.set_default_armor(true);
        enc.start_container(1, None).unwrap();
        enc.end_container().unwrap();
        enc.end_of_stream().unwrap();
        let bytes = enc.into_sink().into_inner();
        assert_eq!(bytes, alloc::vec![0x81, 0x81, 0x84, 0x8c, 0x8c]);
    }

    #[test]
    fn end_container_without_start_is_nest_misuse() {
        let mut enc = Encoder::new(MemoryIo::empty());
        assert_eq!(enc.end_container().unwrap_err(), Error::NestMisuse);
    }

    #[test]
    fn end_of_stream_with_open_container_is_nest_misuse() {
        let mut enc = Encoder::new(MemoryIo::empty());
        enc.start_container(1, None).unwrap();
        assert_eq!(enc.end_of_stream().unwrap_err(), Error::NestMisuse);
    }

    #[test]
    fn operations_after_close_fail() {
        let mut enc = Encoder::new(MemoryIo::empty());
        enc.end_of_stream().unwrap();
        assert_eq!(enc.push_node(1, &LeafValue::Bool(true)).unwrap_err(), Error::AlreadyClosed);
    }

    #[test]
    fn hashed_container_round_trips_validated() {
        let mut enc = HashingEncoder::new(MemoryIo::empty(), HashRegistry::with_defaults());
        enc.select_hash(1, HT_CRC32);
        enc.start_container(1, None).unwrap();
        enc.push_node(2, &LeafValue::UInt32(7)).unwrap();
        enc.end_container().unwrap();
        enc.end_of_stream().unwrap();
        let bytes = enc.into_inner().into_sink().into_inner();

        let io = MemoryIo::new(bytes);
        let mut decoder = Decoder::new(io, Registry::new(), TreeSink::new());
        decoder.read_all().unwrap();
        let tree = decoder.into_sink().into_tree();
        let root = tree.root();
        let container = tree.get(root).unwrap().children()[0];
        let leaf = tree.get(container).unwrap().children()[0];
        match &tree.get(leaf).unwrap().data {
            NodeData::Leaf(LeafValue::UInt32(v)) => assert_eq!(*v, 7),
            other => panic!("unexpected node {other:?}"),
        }
    }

    #[test]
    fn hashed_container_fails_closed_on_tamper() {
        let mut enc = HashingEncoder::new(MemoryIo::empty(), HashRegistry::with_defaults());
        enc.select_hash(1, HT_CRC32);
        enc.start_container(1, None).unwrap();
        enc.push_node(2, &LeafValue::UInt32(7)).unwrap();
        enc.end_container().unwrap();
        enc.end_of_stream().unwrap();
        let mut bytes = enc.into_inner().into_sink().into_inner();
        let last = bytes.len() - 2;
        bytes[last] ^= 0xff;

        let io = MemoryIo::new(bytes);
        let mut decoder = Decoder::new(io, Registry::new(), TreeSink::new());
        assert_eq!(decoder.read_all().unwrap_err(), Error::HashCheckError);
    }
}
