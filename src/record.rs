//! Record types and leaf payload codecs (spec §3, §4.3, §6.2).
//!
//! Tags `0x00`-`0x0F` are reserved and built into every decoder/encoder
//! (`node_primitive.hpp`/`node_varint.hpp`/`node_blob.hpp` in the original);
//! `0x40`-`0x5F` is the APPBLOB range (opaque, length-prefixed, generically
//! skippable under forgiveness); `0x60`-`0x7F` is APP_NOSIZE (opaque,
//! framing-unknown, must be registered to be read at all).

use alloc::vec;
use alloc::vec::Vec;

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{Error, Result};
use crate::io::{ByteSink, ByteSource};
use crate::varint::{self, MAX_VARUINT};

/// Wire tag identifying a record's type.
pub type RecordType = u64;

pub const RT_RESERVED: RecordType = 0x00;
pub const RT_CONTAINER: RecordType = 0x01;
pub const RT_UINT32: RecordType = 0x02;
pub const RT_INT32: RecordType = 0x03;
pub const RT_UINT64: RecordType = 0x04;
pub const RT_INT64: RecordType = 0x05;
pub const RT_BOOL_TRUE: RecordType = 0x06;
pub const RT_BOOL_FALSE: RecordType = 0x07;
pub const RT_FLOAT32: RecordType = 0x08;
pub const RT_FLOAT64: RecordType = 0x09;
pub const RT_UTF8STRING: RecordType = 0x0a;
pub const RT_BLOB: RecordType = 0x0b;
pub const RT_END_OF_CHILDREN: RecordType = 0x0c;
pub const RT_VARUINT: RecordType = 0x0d;
pub const RT_VARINT: RecordType = 0x0e;
pub const RT_RAW128: RecordType = 0x0f;

pub const RESERVED_RANGE_END: RecordType = 0x0f;
pub const APPBLOB_RANGE_START: RecordType = 0x40;
pub const APPBLOB_RANGE_END: RecordType = 0x5f;
pub const APP_NOSIZE_RANGE_START: RecordType = 0x60;
pub const APP_NOSIZE_RANGE_END: RecordType = 0x7f;

pub fn is_reserved(rt: RecordType) -> bool {
    rt <= RESERVED_RANGE_END
}

pub fn is_appblob(rt: RecordType) -> bool {
    (APPBLOB_RANGE_START..=APPBLOB_RANGE_END).contains(&rt)
}

pub fn is_app_nosize(rt: RecordType) -> bool {
    (APP_NOSIZE_RANGE_START..=APP_NOSIZE_RANGE_END).contains(&rt)
}

/// Sentinel rejected when read back as an object id (spec §3): the largest
/// value the varuint encoding can represent.
pub const ID_INVALID: u64 = MAX_VARUINT;

/// A decoded leaf value (spec §4.3). `App` covers a registered application
/// record's raw bytes; generic APPBLOB payloads that nobody registered a
/// parser for are never turned into a value at all — the decoder either
/// fails or discards them outright per forgiveness (spec §7).
#[derive(Debug, Clone, PartialEq)]
pub enum LeafValue {
    UInt32(u32),
    Int32(i32),
    UInt64(u64),
    Int64(i64),
    Bool(bool),
    Float32(f32),
    Float64(f64),
    /// Raw UTF-8 bytes, stored without validation at decode time (spec §9
    /// open question: the on-wire length is the exact byte count, nothing
    /// more). Use [`LeafValue::as_str`] for validated typed access.
    Utf8String(Vec<u8>),
    Blob(Vec<u8>),
    VarUInt(u64),
    VarInt(i64),
    Raw128([u8; 16]),
    App { tag: RecordType, payload: Vec<u8> },
}

impl LeafValue {
    pub fn record_type(&self) -> RecordType {
        match self {
            Self::UInt32(_) => RT_UINT32,
            Self::Int32(_) => RT_INT32,
            Self::UInt64(_) => RT_UINT64,
            Self::Int64(_) => RT_INT64,
            Self::Bool(true) => RT_BOOL_TRUE,
            Self::Bool(false) => RT_BOOL_FALSE,
            Self::Float32(_) => RT_FLOAT32,
            Self::Float64(_) => RT_FLOAT64,
            Self::Utf8String(_) => RT_UTF8STRING,
            Self::Blob(_) => RT_BLOB,
            Self::VarUInt(_) => RT_VARUINT,
            Self::VarInt(_) => RT_VARINT,
            Self::Raw128(_) => RT_RAW128,
            Self::App { tag, .. } => *tag,
        }
    }

    /// Validates and borrows the string payload, or `None` if this isn't a
    /// `Utf8String` or its bytes aren't valid UTF-8. Validation is lazy
    /// rather than performed at decode time, matching spec §9's observation
    /// that the format never mandates it up front.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Utf8String(bytes) => core::str::from_utf8(bytes).ok(),
            _ => None,
        }
    }

    /// Reads the payload for a known reserved-range leaf tag. Callers must
    /// have already consumed the tag and id varuints; `BOOL_TRUE`/
    /// `BOOL_FALSE` and `END_OF_CHILDREN` carry no id at all and are never
    /// passed here (the decoder special-cases them before this point).
    pub fn read<S: ByteSource + ?Sized>(tag: RecordType, src: &mut S) -> Result<Self> {
        match tag {
            RT_UINT32 => {
                let mut buf = [0u8; 4];
                src.read_exact(&mut buf)?;
                Ok(Self::UInt32(LittleEndian::read_u32(&buf)))
            }
            RT_INT32 => {
                let mut buf = [0u8; 4];
                src.read_exact(&mut buf)?;
                Ok(Self::Int32(LittleEndian::read_i32(&buf)))
            }
            RT_UINT64 => {
                let mut buf = [0u8; 8];
                src.read_exact(&mut buf)?;
                Ok(Self::UInt64(LittleEndian::read_u64(&buf)))
            }
            RT_INT64 => {
                let mut buf = [0u8; 8];
                src.read_exact(&mut buf)?;
                Ok(Self::Int64(LittleEndian::read_i64(&buf)))
            }
            RT_BOOL_TRUE => Ok(Self::Bool(true)),
            RT_BOOL_FALSE => Ok(Self::Bool(false)),
            RT_FLOAT32 => {
                let mut buf = [0u8; 4];
                src.read_exact(&mut buf)?;
                Ok(Self::Float32(LittleEndian::read_f32(&buf)))
            }
            RT_FLOAT64 => {
                let mut buf = [0u8; 8];
                src.read_exact(&mut buf)?;
                Ok(Self::Float64(LittleEndian::read_f64(&buf)))
            }
            RT_UTF8STRING => {
                let len = varint::read_varuint(src)? as usize;
                let mut bytes = vec![0u8; len];
                src.read_exact(&mut bytes)?;
                Ok(Self::Utf8String(bytes))
            }
            RT_BLOB => {
                let len = varint::read_varuint(src)? as usize;
                let mut bytes = vec![0u8; len];
                src.read_exact(&mut bytes)?;
                Ok(Self::Blob(bytes))
            }
            RT_VARUINT => Ok(Self::VarUInt(varint::read_varuint(src)?)),
            RT_VARINT => Ok(Self::VarInt(varint::read_varint(src)?)),
            RT_RAW128 => {
                let mut buf = [0u8; 16];
                src.read_exact(&mut buf)?;
                Ok(Self::Raw128(buf))
            }
            _ => Err(Error::UnsupportedRecordType),
        }
    }

    /// Writes tag-specific payload bytes. The caller has already written the
    /// tag (via [`LeafValue::record_type`]) and, for anything other than a
    /// bool, the id varuint.
    pub fn write<S: ByteSink + ?Sized>(&self, dst: &mut S) -> Result<()> {
        match self {
            Self::UInt32(v) => {
                let mut buf = [0u8; 4];
                LittleEndian::write_u32(&mut buf, *v);
                dst.write_all(&buf)
            }
            Self::Int32(v) => {
                let mut buf = [0u8; 4];
                LittleEndian::write_i32(&mut buf, *v);
                dst.write_all(&buf)
            }
            Self::UInt64(v) => {
                let mut buf = [0u8; 8];
                LittleEndian::write_u64(&mut buf, *v);
                dst.write_all(&buf)
            }
            Self::Int64(v) => {
                let mut buf = [0u8; 8];
                LittleEndian::write_i64(&mut buf, *v);
                dst.write_all(&buf)
            }
            Self::Bool(_) => Ok(()),
            Self::Float32(v) => {
                let mut buf = [0u8; 4];
                LittleEndian::write_f32(&mut buf, *v);
                dst.write_all(&buf)
            }
            Self::Float64(v) => {
                let mut buf = [0u8; 8];
                LittleEndian::write_f64(&mut buf, *v);
                dst.write_all(&buf)
            }
            Self::Utf8String(bytes) => {
                varint::write_varuint(dst, bytes.len() as u64)?;
                dst.write_all(bytes)
            }
            Self::Blob(bytes) => {
                varint::write_varuint(dst, bytes.len() as u64)?;
                dst.write_all(bytes)
            }
            Self::VarUInt(v) => varint::write_varuint(dst, *v),
            Self::VarInt(v) => varint::write_varint(dst, *v),
            Self::Raw128(buf) => dst.write_all(buf),
            Self::App { payload, .. } => dst.write_all(payload),
        }
    }
}

/// Reads (and discards) an APPBLOB-range record's payload without
/// understanding its contents — the framing (varuint length prefix) is the
/// same for every tag in the range, so this never needs a registry lookup.
/// This is what the decoder calls under `UnknownAppblobs` forgiveness.
pub fn skip_appblob<S: ByteSource + ?Sized>(src: &mut S) -> Result<()> {
    let len = varint::read_varuint(src)?;
    src.skip(len)
}

/// Reads an APPBLOB-range record's payload into an opaque buffer. Intended
/// for a registered decoder that wants the raw bytes rather than a parsed
/// structure.
pub fn read_appblob<S: ByteSource + ?Sized>(tag: RecordType, src: &mut S) -> Result<LeafValue> {
    let len = varint::read_varuint(src)? as usize;
    let mut payload = vec![0u8; len];
    src.read_exact(&mut payload)?;
    Ok(LeafValue::App { tag, payload })
}

pub fn write_appblob<S: ByteSink + ?Sized>(payload: &[u8], dst: &mut S) -> Result<()> {
    varint::write_varuint(dst, payload.len() as u64)?;
    dst.write_all(payload)
}
