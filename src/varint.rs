//! Variable-length integer codec (spec §4.1).
//!
//! Big-endian, length-prefixed encoding in the EBML tradition: the leading
//! byte's run of leading zero bits determines the total width `w` in bytes
//! (1..=8), and the high set bit at position `8-w` is the length marker.
//! `0x80` is the canonical encoding of zero; a leading `0x00` byte is always
//! invalid. Writers always choose the minimal `w` — there is no
//! canonicalization flag to opt out of this.

use crate::error::{Error, Result};
use crate::io::{ByteSink, ByteSource};

/// Largest magnitude representable by the signed varint encoding (8-byte width, 56 payload bits).
pub const MAX_VARINT: i64 = 0x7f_ffff_ffff_ffff;
/// Smallest (most negative) value representable by the signed varint encoding.
pub const MIN_VARINT: i64 = -0x7f_ffff_ffff_ffff;
/// Largest value representable by the unsigned varint encoding.
pub const MAX_VARUINT: u64 = 0x00ff_ffff_ffff_ffff;

/// Reads an unsigned varint from `src`.
pub fn read_varuint<S: ByteSource + ?Sized>(src: &mut S) -> Result<u64> {
    let mut leading = [0u8; 1];
    src.read_exact(&mut leading)?;
    let leading = leading[0];

    if leading == 0x80 {
        return Ok(0);
    }
    if leading == 0x00 {
        return Err(Error::InvalidVarInt);
    }

    let width = leading.leading_zeros() as u8 + 1;
    if width > 8 {
        return Err(Error::InvalidVarInt);
    }

    // Widen before shifting: at width 8 the marker consumes the whole byte
    // (`0xffu8 >> 8` would overflow), leaving a zero mask.
    let marker_mask = (0xffu16 >> width) as u8;
    let mut value: u64 = (leading & marker_mask) as u64;

    let mut rest = [0u8; 7];
    let tail = &mut rest[..(width - 1) as usize];
    src.read_exact(tail)?;
    for &byte in tail.iter() {
        value = (value << 8) | byte as u64;
    }

    Ok(value)
}

/// Reads an unsigned varint and also returns the number of bytes it occupied
/// on the wire, for callers that need to reconstruct digest boundaries.
pub fn read_varuint_sized<S: ByteSource + ?Sized>(src: &mut S) -> Result<(u64, u8)> {
    let mut leading = [0u8; 1];
    src.read_exact(&mut leading)?;
    let leading = leading[0];

    if leading == 0x80 {
        return Ok((0, 1));
    }
    if leading == 0x00 {
        return Err(Error::InvalidVarInt);
    }

    let width = leading.leading_zeros() as u8 + 1;
    if width > 8 {
        return Err(Error::InvalidVarInt);
    }

    // Widen before shifting: at width 8 the marker consumes the whole byte
    // (`0xffu8 >> 8` would overflow), leaving a zero mask.
    let marker_mask = (0xffu16 >> width) as u8;
    let mut value: u64 = (leading & marker_mask) as u64;

    let mut rest = [0u8; 7];
    let tail = &mut rest[..(width - 1) as usize];
    src.read_exact(tail)?;
    for &byte in tail.iter() {
        value = (value << 8) | byte as u64;
    }

    Ok((value, width))
}

/// Reads a signed varint from `src`. The sign bit is the high bit of the
/// payload (bit `7*w - 1`); when set, the magnitude is the remaining bits,
/// negated.
pub fn read_varint<S: ByteSource + ?Sized>(src: &mut S) -> Result<i64> {
    let (raw, width) = read_varuint_sized(src)?;
    if width == 0 {
        // only possible for the `0x80` => zero case, handled below
        return Ok(0);
    }
    let sign_mask = 1u64 << (7 * width as u64 - 1);
    if raw & sign_mask != 0 {
        Ok(-((raw ^ sign_mask) as i64))
    } else {
        Ok(raw as i64)
    }
}

fn bytecount_for_varuint(value: u64) -> u8 {
    if value == 0 {
        return 1;
    }
    let bitcount = 64 - value.leading_zeros() as u8;
    (bitcount + 6) / 7
}

fn write_varbuf<S: ByteSink + ?Sized>(dst: &mut S, value: u64, width: u8) -> Result<()> {
    if value == 0 {
        return dst.write_all(&[0x80]);
    }

    let leading_marker = 0x80u8 >> (width - 1);
    let leading_premask: u64 = 0xffu64 << ((width - 1) as u64 * 8);
    let leading_mask = (leading_premask >> width as u64) & leading_premask;
    let leading = leading_marker | ((value & leading_mask) >> ((width - 1) as u64 * 8)) as u8;

    let mut buf = [0u8; 8];
    buf[0] = leading;
    for i in (0..width - 1).rev() {
        let mask = 0xffu64 << (i as u64 * 8);
        buf[(width - 1 - i) as usize] = ((value & mask) >> (i as u64 * 8)) as u8;
    }

    dst.write_all(&buf[..width as usize])
}

/// Writes an unsigned varint, always choosing the minimal encoding width.
pub fn write_varuint<S: ByteSink + ?Sized>(dst: &mut S, value: u64) -> Result<()> {
    if value > MAX_VARUINT {
        return Err(Error::InvalidVarInt);
    }
    write_varbuf(dst, value, bytecount_for_varuint(value))
}

/// Writes a signed varint. Reserves one extra payload bit beyond the
/// magnitude's natural width so the sign bit never collides with value bits.
pub fn write_varint<S: ByteSink + ?Sized>(dst: &mut S, value: i64) -> Result<()> {
    if !(MIN_VARINT..=MAX_VARINT).contains(&value) {
        return Err(Error::InvalidVarInt);
    }
    if value < 0 {
        let magnitude = (-value) as u64;
        let bitcount = if magnitude == 0 { 0 } else { 64 - magnitude.leading_zeros() as u8 };
        let width = (bitcount + 7) / 7;
        let width = width.max(1);
        let sign_mask = 1u64 << (7 * width as u64 - 1);
        write_varbuf(dst, magnitude | sign_mask, width)
    } else {
        let magnitude = value as u64;
        let bitcount = if magnitude == 0 { 0 } else { 64 - magnitude.leading_zeros() as u8 };
        let width = ((bitcount + 7) / 7).max(1);
        write_varbuf(dst, magnitude, width)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemoryIo;
    use alloc::vec::Vec;

    fn roundtrip_u(v: u64) -> u64 {
        let mut buf = MemoryIo::new(Vec::new());
        write_varuint(&mut buf, v).unwrap();
        let mut reader = MemoryIo::new(buf.into_inner());
        read_varuint(&mut reader).unwrap()
    }

    fn roundtrip_i(v: i64) -> i64 {
        let mut buf = MemoryIo::new(Vec::new());
        write_varint(&mut buf, v).unwrap();
        let mut reader = MemoryIo::new(buf.into_inner());
        read_varint(&mut reader).unwrap()
    }

    #[test]
    fn zero_is_0x80() {
        let mut buf = MemoryIo::new(Vec::new());
        write_varuint(&mut buf, 0).unwrap();
        assert_eq!(buf.into_inner(), alloc::vec![0x80]);
    }

    #[test]
    fn leading_zero_byte_is_invalid() {
        let mut reader = MemoryIo::new(alloc::vec![0x00, 0x01]);
        assert_eq!(read_varuint(&mut reader).unwrap_err(), Error::InvalidVarInt);
    }

    #[test]
    fn negative_127_matches_spec_scenario_6() {
        // §8 scenario 6: -127 encodes as 0x60 0x7F (marker bit ORed in already).
        let mut buf = MemoryIo::new(Vec::new());
        write_varint(&mut buf, -127).unwrap();
        assert_eq!(buf.into_inner(), alloc::vec![0x60, 0x7f]);
    }

    #[test]
    fn varuint_roundtrip_small_values() {
        for v in [0u64, 1, 63, 64, 127, 128, 16383, 16384, 1 << 20, MAX_VARUINT] {
            assert_eq!(roundtrip_u(v), v);
        }
    }

    #[test]
    fn varint_roundtrip_small_values() {
        for v in [0i64, 1, -1, 63, -63, 64, -64, 16384, -16384, MAX_VARINT, MIN_VARINT] {
            assert_eq!(roundtrip_i(v), v);
        }
    }

    #[test]
    fn varuint_out_of_range_rejected() {
        let mut buf = MemoryIo::new(Vec::new());
        assert_eq!(write_varuint(&mut buf, MAX_VARUINT + 1).unwrap_err(), Error::InvalidVarInt);
    }

    proptest::proptest! {
        #[test]
        fn prop_varuint_roundtrip(v in 0u64..=MAX_VARUINT) {
            proptest::prop_assert_eq!(roundtrip_u(v), v);
        }

        #[test]
        fn prop_varint_roundtrip(v in MIN_VARINT..=MAX_VARINT) {
            proptest::prop_assert_eq!(roundtrip_i(v), v);
        }
    }
}
