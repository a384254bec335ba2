//! Record-type registry (spec §4.2, §6.2): maps application-defined tags to
//! decoders, the way `registry.hpp`/`node_factory.hpp` map a tag to a
//! `Node` constructor. The sixteen reserved tags never go through this
//! table — [`crate::record::LeafValue::read`] handles them directly — so the
//! registry only ever holds entries for the APPBLOB (`0x40..=0x5F`) and
//! APP_NOSIZE (`0x60..=0x7F`) ranges. A miss is always "unknown" here; it is
//! the decoder's job, not the registry's, to decide whether an unknown
//! APPBLOB tag gets skipped under forgiveness (spec §4.4, §7).

use alloc::boxed::Box;
use alloc::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::io::ByteSource;
use crate::record::{self, LeafValue, RecordType};

type DecodeFn = Box<dyn Fn(RecordType, &mut dyn ByteSource) -> Result<LeafValue>>;

/// A table of application-defined record decoders.
pub struct Registry {
    decoders: BTreeMap<RecordType, DecodeFn>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self {
            decoders: BTreeMap::new(),
        }
    }

    /// Registers a decoder for `tag`.
    ///
    /// # Panics
    ///
    /// Panics if `tag` falls in the reserved range (`0x00..=0x0F`): those
    /// tags are built into the wire format itself and are never
    /// user-extensible. This is a programmer error, not a data error.
    pub fn register(&mut self, tag: RecordType, decoder: impl Fn(RecordType, &mut dyn ByteSource) -> Result<LeafValue> + 'static) {
        assert!(
            !record::is_reserved(tag),
            "tag {tag:#x} is in the reserved range and cannot be registered"
        );
        self.decoders.insert(tag, Box::new(decoder));
    }

    pub fn unregister(&mut self, tag: RecordType) {
        self.decoders.remove(&tag);
    }

    pub fn contains(&self, tag: RecordType) -> bool {
        self.decoders.contains_key(&tag)
    }

    /// Looks up and runs the decoder for `tag`, assuming the tag and id
    /// varuints have already been consumed from `src`.
    ///
    /// Returns [`Error::UnsupportedRecordType`] for any tag with no
    /// registered decoder, APPBLOB range included — callers that want the
    /// generic "skip an unknown APPBLOB" forgiveness behavior implement it
    /// themselves using [`crate::record::skip_appblob`] when this fails.
    pub fn decode<S: ByteSource>(&self, tag: RecordType, src: &mut S) -> Result<LeafValue> {
        if record::is_reserved(tag) {
            return LeafValue::read(tag, src);
        }
        match self.decoders.get(&tag) {
            Some(decoder) => decoder(tag, src),
            None => Err(Error::UnsupportedRecordType),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemoryIo;

    #[test]
    #[should_panic(expected = "reserved range")]
    fn registering_a_reserved_tag_panics() {
        let mut reg = Registry::new();
        reg.register(record::RT_UINT32, |_, src: &mut dyn ByteSource| LeafValue::read(record::RT_UINT32, src));
    }

    #[test]
    fn unregistered_app_nosize_tag_fails() {
        let reg = Registry::new();
        let mut io = MemoryIo::new(alloc::vec![1, 2, 3]);
        assert_eq!(reg.decode(0x60, &mut io).unwrap_err(), Error::UnsupportedRecordType);
    }

    #[test]
    fn unregistered_appblob_tag_also_fails_the_registry_directly() {
        let reg = Registry::new();
        let mut io = MemoryIo::new(alloc::vec![0x81, 9]);
        assert_eq!(reg.decode(0x41, &mut io).unwrap_err(), Error::UnsupportedRecordType);
    }

    #[test]
    fn registered_app_nosize_tag_succeeds() {
        let mut reg = Registry::new();
        reg.register(0x61, |tag, src: &mut dyn ByteSource| {
            let mut buf = [0u8; 2];
            src.read_exact(&mut buf)?;
            Ok(LeafValue::App { tag, payload: buf.to_vec() })
        });
        let mut io = MemoryIo::new(alloc::vec![5, 6]);
        let value = reg.decode(0x61, &mut io).unwrap();
        assert_eq!(value, LeafValue::App { tag: 0x61, payload: alloc::vec![5, 6] });
    }

    #[test]
    fn registered_appblob_tag_can_use_the_generic_reader() {
        let mut reg = Registry::new();
        reg.register(0x41, |tag, src: &mut dyn ByteSource| record::read_appblob(tag, src));
        let mut io = MemoryIo::empty();
        record::write_appblob(&[9, 9], &mut io).unwrap();
        io.rewind();
        let value = reg.decode(0x41, &mut io).unwrap();
        assert_eq!(value, LeafValue::App { tag: 0x41, payload: alloc::vec![9, 9] });
    }
}
