//! Streaming sink protocol (spec §4.4, §4.7): the push interface a decoder
//! drives and an encoder's higher-level callers can also implement against,
//! mirroring `streaming_base.hpp`'s `StreamSinkIntf` and the composable
//! sinks in `streaming_sinks.hpp`/`streaming_sinks.cpp`.

use alloc::boxed::Box;
use alloc::vec::Vec;

use crate::error::{Error, Result};
use crate::hash::HashType;
use crate::record::{LeafValue, RecordType};

/// Container flags as seen by a sink (spec §4.2): which bits were set on the
/// wire, already validated against `UnknownContainerFlags` forgiveness by
/// the decoder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContainerFlags(pub u64);

pub const CF_WITH_SIZE: u64 = 0x01;
pub const CF_HASHED: u64 = 0x02;
pub const CF_ARMORED: u64 = 0x04;
/// Reserved; any stream that sets this without `UnknownContainerFlags`
/// forgiveness is rejected.
pub const CF_RESERVED: u64 = 0x08;
/// Application-defined bits, unknown to the decoder by default but never an
/// error on their own (spec §6.3).
pub const CF_APP_MASK: u64 = 0x30;

pub const CF_KNOWN_MASK: u64 = CF_WITH_SIZE | CF_HASHED | CF_ARMORED | CF_APP_MASK;

impl ContainerFlags {
    pub fn with_size(self) -> bool {
        self.0 & CF_WITH_SIZE != 0
    }
    pub fn armored(self) -> bool {
        self.0 & CF_ARMORED != 0
    }
    pub fn hashed(self) -> bool {
        self.0 & CF_HASHED != 0
    }

    /// Bits set outside the known/app-defined mask — an unsupported
    /// combination unless `UnknownContainerFlags` forgiveness is active.
    pub fn unknown_bits(self) -> u64 {
        self.0 & !CF_KNOWN_MASK
    }
}

/// Metadata announced at the start of a container (spec §4.4 step 1-5).
#[derive(Debug, Clone)]
pub struct ContainerMeta {
    pub id: u64,
    pub flags: ContainerFlags,
    /// Declared child count, present iff `CF_WITH_SIZE`.
    pub declared_count: Option<i64>,
    /// Hash function tag, present iff `CF_HASHED`.
    pub hash_function: Option<HashType>,
}

/// The hash attestation delivered alongside `end_container` (spec §4.4: "a
/// container may carry a hash attestation: after decoding, consumers learn
/// (validated, hash_function)"). `None` when the container wasn't hashed at
/// all.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContainerFooter {
    pub validated: Option<bool>,
    pub hash_function: Option<HashType>,
}

/// Event sink driven by a [`crate::decoder::Decoder`] (or fed manually by a
/// test). Every method returns `Ok(true)`/`Ok(false)` where noted to let a
/// sink opt out of a subtree without treating that as an error — the same
/// signal `ToTree`'s `StartContainer` override gives when asked to recurse
/// into a branch it isn't interested in.
pub trait StreamSink {
    /// Announces a container. Returning `Ok(false)` tells the driver this
    /// sink does not want the container's children delivered to it (the
    /// driver is still responsible for walking past them on the wire).
    fn start_container(&mut self, meta: &ContainerMeta) -> Result<bool>;

    /// Delivers a decoded leaf value. Returning `Ok(false)`, like
    /// `start_container`, tells the driver this sink is done — it stops
    /// forwarding further events at this nesting level to the sink (spec
    /// §4.4: "may return false from any event to indicate it is done").
    fn push_node(&mut self, id: u64, value: LeafValue) -> Result<bool>;

    /// Closes the most recently opened container this sink accepted,
    /// carrying the hash attestation if the container was hashed. `Ok(false)`
    /// carries the same "stop forwarding" meaning as `push_node`, applied to
    /// the container this one is nested in.
    fn end_container(&mut self, footer: &ContainerFooter) -> Result<bool>;

    /// Signals that no more events follow. Default no-op.
    fn end_of_stream(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<S: StreamSink + ?Sized> StreamSink for &mut S {
    fn start_container(&mut self, meta: &ContainerMeta) -> Result<bool> {
        (**self).start_container(meta)
    }
    fn push_node(&mut self, id: u64, value: LeafValue) -> Result<bool> {
        (**self).push_node(id, value)
    }
    fn end_container(&mut self, footer: &ContainerFooter) -> Result<bool> {
        (**self).end_container(footer)
    }
    fn end_of_stream(&mut self) -> Result<()> {
        (**self).end_of_stream()
    }
}

/// Accepts and discards every event. Useful for validating a stream's
/// framing (and, transitively, its container digests) without building
/// anything from it.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl StreamSink for NullSink {
    fn start_container(&mut self, _meta: &ContainerMeta) -> Result<bool> {
        Ok(true)
    }
    fn push_node(&mut self, _id: u64, _value: LeafValue) -> Result<bool> {
        Ok(true)
    }
    fn end_container(&mut self, _footer: &ContainerFooter) -> Result<bool> {
        Ok(true)
    }
}

/// Rejects everything. Useful as the last link in a [`SinkChain`] to turn
/// "no sink claimed this container" into a hard error instead of silent
/// drop, mirroring the original's `ThrowOnAll`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DenyAllSink;

impl StreamSink for DenyAllSink {
    fn start_container(&mut self, _meta: &ContainerMeta) -> Result<bool> {
        Err(Error::UnsupportedRecordType)
    }
    fn push_node(&mut self, _id: u64, _value: LeafValue) -> Result<bool> {
        Err(Error::UnsupportedRecordType)
    }
    fn end_container(&mut self, _footer: &ContainerFooter) -> Result<bool> {
        Err(Error::UnsupportedRecordType)
    }
}

/// Logs every event at `trace` level via the `log` crate, then forwards to
/// an inner sink unchanged. Only meaningful with the `std` feature, which is
/// what wires up a `log` backend at all.
pub struct DebugSink<T> {
    inner: T,
}

impl<T> DebugSink<T> {
    pub fn new(inner: T) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T: StreamSink> StreamSink for DebugSink<T> {
    fn start_container(&mut self, meta: &ContainerMeta) -> Result<bool> {
        #[cfg(feature = "std")]
        log::trace!("start_container id={} flags={:?}", meta.id, meta.flags);
        self.inner.start_container(meta)
    }

    fn push_node(&mut self, id: u64, value: LeafValue) -> Result<bool> {
        #[cfg(feature = "std")]
        log::trace!("push_node id={id} type={:#x}", value.record_type());
        self.inner.push_node(id, value)
    }

    fn end_container(&mut self, footer: &ContainerFooter) -> Result<bool> {
        #[cfg(feature = "std")]
        log::trace!("end_container validated={:?}", footer.validated);
        self.inner.end_container(footer)
    }

    fn end_of_stream(&mut self) -> Result<()> {
        #[cfg(feature = "std")]
        log::trace!("end_of_stream");
        self.inner.end_of_stream()
    }
}

/// Tries each sink in order for the *next* unclaimed container, then routes
/// every event inside that container's subtree to whichever sink accepted
/// it, the way `streaming_sinks.cpp`'s `SinkChain::select_next_sink` picks a
/// delegate once per top-level decision point rather than re-asking at
/// every nesting level.
pub struct SinkChain<'a> {
    sinks: Vec<Box<dyn StreamSink + 'a>>,
    active: Option<usize>,
    depth: u32,
}

impl<'a> SinkChain<'a> {
    pub fn new(sinks: Vec<Box<dyn StreamSink + 'a>>) -> Self {
        Self {
            sinks,
            active: None,
            depth: 0,
        }
    }
}

impl<'a> StreamSink for SinkChain<'a> {
    fn start_container(&mut self, meta: &ContainerMeta) -> Result<bool> {
        if let Some(idx) = self.active {
            let accepted = self.sinks[idx].start_container(meta)?;
            if accepted {
                self.depth += 1;
            }
            return Ok(accepted);
        }
        for (i, sink) in self.sinks.iter_mut().enumerate() {
            if sink.start_container(meta)? {
                self.active = Some(i);
                self.depth = 1;
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn push_node(&mut self, id: u64, value: LeafValue) -> Result<bool> {
        match self.active {
            Some(idx) => {
                let keep_going = self.sinks[idx].push_node(id, value)?;
                if !keep_going {
                    // The sink is done with this subtree early (spec §4.4):
                    // stop routing it any further events, the same way a
                    // `start_container` refusal keeps it out of the running.
                    self.active = None;
                    self.depth = 0;
                }
                Ok(keep_going)
            }
            None => Ok(true),
        }
    }

    fn end_container(&mut self, footer: &ContainerFooter) -> Result<bool> {
        if let Some(idx) = self.active {
            let keep_going = self.sinks[idx].end_container(footer)?;
            self.depth -= 1;
            if self.depth == 0 || !keep_going {
                self.active = None;
                self.depth = 0;
            }
            return Ok(keep_going);
        }
        Ok(true)
    }

    fn end_of_stream(&mut self) -> Result<()> {
        for sink in &mut self.sinks {
            sink.end_of_stream()?;
        }
        Ok(())
    }
}

enum NestState {
    Plain,
    Nested(u32),
}

/// Lets a [`StreamSink`] wrapper hand an entire container subtree to its
/// inner sink verbatim, without intercepting each nested event, by calling
/// [`NestingSink::nest`] once from inside its own `start_container` override
/// (spec §4.7). Mirrors the "descend transparently from here on" escape
/// hatch the original's recursive sinks use to avoid re-implementing
/// structural bookkeeping they don't care about.
pub struct NestingSink<T> {
    inner: T,
    state: NestState,
}

impl<T: StreamSink> NestingSink<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            state: NestState::Plain,
        }
    }

    /// Switches into transparent-forwarding mode for the container whose
    /// `start_container` call is currently being handled.
    ///
    /// # Panics
    ///
    /// Panics if called while already nested — `nest()` is only meaningful
    /// once per `Plain`-state `start_container` invocation.
    pub fn nest(&mut self) {
        match self.state {
            NestState::Plain => self.state = NestState::Nested(1),
            NestState::Nested(_) => panic!("NestingSink::nest() called while already nested"),
        }
    }

    pub fn is_nested(&self) -> bool {
        matches!(self.state, NestState::Nested(_))
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T: StreamSink> StreamSink for NestingSink<T> {
    fn start_container(&mut self, meta: &ContainerMeta) -> Result<bool> {
        if let NestState::Nested(depth) = self.state {
            self.state = NestState::Nested(depth + 1);
            return self.inner.start_container(meta);
        }
        self.inner.start_container(meta)
    }

    fn push_node(&mut self, id: u64, value: LeafValue) -> Result<bool> {
        self.inner.push_node(id, value)
    }

    fn end_container(&mut self, footer: &ContainerFooter) -> Result<bool> {
        let result = self.inner.end_container(footer);
        if let NestState::Nested(depth) = self.state {
            self.state = if depth <= 1 {
                NestState::Plain
            } else {
                NestState::Nested(depth - 1)
            };
        }
        result
    }
}

/// The record type constant for a container itself, re-exported here for
/// sinks that need to distinguish "this id names a container" from "this id
/// names a leaf" without importing from [`crate::record`] directly.
pub const CONTAINER_RECORD_TYPE: RecordType = crate::record::RT_CONTAINER;

#[cfg(test)]
mod tests {
    use super::*;

    struct RecordingSink {
        events: Vec<alloc::string::String>,
        accept: bool,
    }

    impl StreamSink for RecordingSink {
        fn start_container(&mut self, meta: &ContainerMeta) -> Result<bool> {
            self.events.push(alloc::format!("start({})", meta.id));
            Ok(self.accept)
        }
        fn push_node(&mut self, id: u64, _value: LeafValue) -> Result<bool> {
            self.events.push(alloc::format!("push({id})"));
            Ok(true)
        }
        fn end_container(&mut self, _footer: &ContainerFooter) -> Result<bool> {
            self.events.push("end".into());
            Ok(true)
        }
    }

    fn meta(id: u64) -> ContainerMeta {
        ContainerMeta {
            id,
            flags: ContainerFlags(CF_WITH_SIZE),
            declared_count: Some(0),
            hash_function: None,
        }
    }

    fn no_footer() -> ContainerFooter {
        ContainerFooter::default()
    }

    #[test]
    fn chain_advances_past_a_rejecting_sink() {
        let rejecting = RecordingSink { events: Vec::new(), accept: false };
        let accepting = RecordingSink { events: Vec::new(), accept: true };
        let mut chain = SinkChain::new(alloc::vec![
            Box::new(rejecting) as Box<dyn StreamSink>,
            Box::new(accepting) as Box<dyn StreamSink>,
        ]);
        assert!(chain.start_container(&meta(1)).unwrap());
        chain.push_node(2, LeafValue::Bool(true)).unwrap();
        chain.end_container(&no_footer()).unwrap();
    }

    /// A sink that accepts the container but gives up after `stop_after`
    /// leaves, returning `Ok(false)` from `push_node` instead of waiting for
    /// `end_container`.
    struct BailsAfterNLeaves {
        remaining: u32,
    }

    impl StreamSink for BailsAfterNLeaves {
        fn start_container(&mut self, _meta: &ContainerMeta) -> Result<bool> {
            Ok(true)
        }
        fn push_node(&mut self, _id: u64, _value: LeafValue) -> Result<bool> {
            if self.remaining == 0 {
                return Ok(false);
            }
            self.remaining -= 1;
            Ok(true)
        }
        fn end_container(&mut self, _footer: &ContainerFooter) -> Result<bool> {
            Ok(true)
        }
    }

    #[test]
    fn chain_stops_routing_to_a_sink_that_bails_mid_container() {
        let bailer = BailsAfterNLeaves { remaining: 1 };
        let mut chain = SinkChain::new(alloc::vec![Box::new(bailer) as Box<dyn StreamSink>]);
        assert!(chain.start_container(&meta(1)).unwrap());
        assert!(chain.push_node(10, LeafValue::Bool(true)).unwrap());
        assert!(!chain.push_node(11, LeafValue::Bool(true)).unwrap());
        // The chain stopped routing to the bailing sink; further events in
        // this subtree are silently absorbed rather than erroring.
        assert!(chain.push_node(12, LeafValue::Bool(true)).unwrap());
        assert!(chain.end_container(&no_footer()).unwrap());
    }

    #[test]
    fn chain_returns_false_when_nobody_accepts() {
        let a = RecordingSink { events: Vec::new(), accept: false };
        let b = RecordingSink { events: Vec::new(), accept: false };
        let mut chain = SinkChain::new(alloc::vec![Box::new(a) as Box<dyn StreamSink>, Box::new(b) as Box<dyn StreamSink>]);
        assert!(!chain.start_container(&meta(1)).unwrap());
    }

    #[test]
    fn nesting_sink_forwards_while_nested() {
        let inner = RecordingSink { events: Vec::new(), accept: true };
        let mut sink = NestingSink::new(inner);
        assert!(!sink.is_nested());
        sink.start_container(&meta(1)).unwrap();
        sink.nest();
        assert!(sink.is_nested());
        sink.start_container(&meta(2)).unwrap();
        sink.end_container(&no_footer()).unwrap();
        assert!(sink.is_nested());
        sink.end_container(&no_footer()).unwrap();
        assert!(!sink.is_nested());
    }

    #[test]
    #[should_panic(expected = "already nested")]
    fn nesting_sink_double_nest_panics() {
        let inner = RecordingSink { events: Vec::new(), accept: true };
        let mut sink = NestingSink::new(inner);
        sink.nest();
        sink.nest();
    }

    #[test]
    fn deny_all_rejects_everything() {
        let mut sink = DenyAllSink;
        assert!(sink.start_container(&meta(1)).is_err());
    }
}
