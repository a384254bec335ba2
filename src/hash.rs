//! Container hashing pipeline (spec §4.6, §6.4): a pluggable incremental
//! digest, a registry mapping wire hash-function tags to digest
//! constructors, and the "hash pipe" I/O adapter that tees every byte
//! flowing through a container's body into the active digest.
//!
//! The original C++ `HashPipe<dir>` swaps the reader/writer's active `IOIntf`
//! pointer in place; Rust's ownership rules make that awkward for a
//! polymorphic source, so the pipe here is instead a small recursive enum
//! that *owns* whatever it wraps. Installing a pipe moves the current source
//! into `Hashing::inner`; uninstalling moves it back out. Nesting composes
//! for free: an inner pipe's reads flow through any outer pipe first, so a
//! hashed container nested inside another hashed container feeds both
//! digests from the same bytes, exactly as spec invariant 4 requires.

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use crate::error::{Error, Result};
use crate::io::{ByteSink, ByteSource};

/// Wire tag for a hash function (spec §6.4).
pub type HashType = u64;

pub const HT_NONE: HashType = 0x00;
pub const HT_SHA1: HashType = 0x01;
pub const HT_SHA256: HashType = 0x02;
pub const HT_SHA512: HashType = 0x03;
pub const HT_CRC32: HashType = 0x04;
pub const HT_MD5: HashType = 0x05;
pub const HT_APP0: HashType = 0x40;
pub const HT_INVALID: HashType = 0x7f;

/// A digest that can be fed bytes incrementally and finalized once.
///
/// Object-safe by construction (`finalize` takes `Box<Self>`) so the
/// registry can hand out `Box<dyn IncrementalHash>` without knowing the
/// concrete algorithm.
pub trait IncrementalHash {
    /// Feeds more input bytes into the digest.
    fn update(&mut self, data: &[u8]);

    /// The digest's fixed output length in bytes. Known before
    /// `finalize` is called; used to size the trailing digest field and to
    /// validate `digest_length` on read (spec §4.4, MalformedHash).
    fn output_len(&self) -> usize;

    /// Consumes the digest, producing its final output (`output_len()` bytes).
    fn finalize(self: Box<Self>) -> Vec<u8>;
}

type HashConstructor = Box<dyn Fn() -> Box<dyn IncrementalHash>>;

/// Maps [`HashType`] tags to digest constructors.
///
/// `HashRegistry::new()` is empty; [`HashRegistry::with_defaults`] wires in
/// whichever of crc32/sha1/sha2/md5 the crate was built with (spec §6.4a —
/// the base spec deliberately only names the plug-in surface).
pub struct HashRegistry {
    constructors: BTreeMap<HashType, HashConstructor>,
}

impl Default for HashRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HashRegistry {
    pub fn new() -> Self {
        Self {
            constructors: BTreeMap::new(),
        }
    }

    /// A registry pre-populated with every hash algorithm compiled into this
    /// build (gated by the `crc32`/`sha1`/`sha2`/`md5` Cargo features).
    pub fn with_defaults() -> Self {
        let mut reg = Self::new();
        reg.register_defaults();
        reg
    }

    pub fn register(&mut self, ht: HashType, constructor: impl Fn() -> Box<dyn IncrementalHash> + 'static) {
        self.constructors.insert(ht, Box::new(constructor));
    }

    pub fn unregister(&mut self, ht: HashType) {
        self.constructors.remove(&ht);
    }

    pub fn get(&self, ht: HashType) -> Option<Box<dyn IncrementalHash>> {
        self.constructors.get(&ht).map(|ctor| ctor())
    }

    pub fn contains(&self, ht: HashType) -> bool {
        self.constructors.contains_key(&ht)
    }

    #[allow(unused_mut, unused_variables)]
    fn register_defaults(&mut self) {
        #[cfg(feature = "crc32")]
        self.register(HT_CRC32, || Box::new(Crc32Hash::new()));
        #[cfg(feature = "sha1")]
        self.register(HT_SHA1, || Box::new(Sha1Hash::new()));
        #[cfg(feature = "sha2")]
        {
            self.register(HT_SHA256, || Box::new(Sha256Hash::new()));
            self.register(HT_SHA512, || Box::new(Sha512Hash::new()));
        }
        #[cfg(feature = "md5")]
        self.register(HT_MD5, || Box::new(Md5Hash::new()));
    }
}

#[cfg(feature = "crc32")]
struct Crc32Hash(crc32fast::Hasher);

#[cfg(feature = "crc32")]
impl Crc32Hash {
    fn new() -> Self {
        Self(crc32fast::Hasher::new())
    }
}

#[cfg(feature = "crc32")]
impl IncrementalHash for Crc32Hash {
    fn update(&mut self, data: &[u8]) {
        self.0.update(data);
    }

    fn output_len(&self) -> usize {
        4
    }

    fn finalize(self: Box<Self>) -> Vec<u8> {
        self.0.finalize().to_le_bytes().to_vec()
    }
}

#[cfg(feature = "sha1")]
struct Sha1Hash(sha1::Sha1);

#[cfg(feature = "sha1")]
impl Sha1Hash {
    fn new() -> Self {
        use sha1::Digest;
        Self(sha1::Sha1::new())
    }
}

#[cfg(feature = "sha1")]
impl IncrementalHash for Sha1Hash {
    fn update(&mut self, data: &[u8]) {
        use sha1::Digest;
        self.0.update(data);
    }

    fn output_len(&self) -> usize {
        20
    }

    fn finalize(self: Box<Self>) -> Vec<u8> {
        use sha1::Digest;
        self.0.finalize().to_vec()
    }
}

#[cfg(feature = "sha2")]
struct Sha256Hash(sha2::Sha256);

#[cfg(feature = "sha2")]
impl Sha256Hash {
    fn new() -> Self {
        use sha2::Digest;
        Self(sha2::Sha256::new())
    }
}

#[cfg(feature = "sha2")]
impl IncrementalHash for Sha256Hash {
    fn update(&mut self, data: &[u8]) {
        use sha2::Digest;
        self.0.update(data);
    }

    fn output_len(&self) -> usize {
        32
    }

    fn finalize(self: Box<Self>) -> Vec<u8> {
        use sha2::Digest;
        self.0.finalize().to_vec()
    }
}

#[cfg(feature = "sha2")]
struct Sha512Hash(sha2::Sha512);

#[cfg(feature = "sha2")]
impl Sha512Hash {
    fn new() -> Self {
        use sha2::Digest;
        Self(sha2::Sha512::new())
    }
}

#[cfg(feature = "sha2")]
impl IncrementalHash for Sha512Hash {
    fn update(&mut self, data: &[u8]) {
        use sha2::Digest;
        self.0.update(data);
    }

    fn output_len(&self) -> usize {
        64
    }

    fn finalize(self: Box<Self>) -> Vec<u8> {
        use sha2::Digest;
        self.0.finalize().to_vec()
    }
}

#[cfg(feature = "md5")]
struct Md5Hash(md5::Md5);

#[cfg(feature = "md5")]
impl Md5Hash {
    fn new() -> Self {
        use md5::Digest;
        Self(md5::Md5::new())
    }
}

#[cfg(feature = "md5")]
impl IncrementalHash for Md5Hash {
    fn update(&mut self, data: &[u8]) {
        use md5::Digest;
        self.0.update(data);
    }

    fn output_len(&self) -> usize {
        16
    }

    fn finalize(self: Box<Self>) -> Vec<u8> {
        use md5::Digest;
        self.0.finalize().to_vec()
    }
}

/// Maximum accepted digest length on the wire (spec §4.4 / §9): a safety cap
/// against allocator abuse from a maliciously huge `digest_length` field,
/// independent of which hash function is actually in use.
pub const MAX_DIGEST_LEN: usize = 1024;

/// A read-side hash pipe (spec §4.6), recursively wrapping the source it
/// tees bytes from. See the module docs for why this is an owning enum
/// rather than a pointer swap.
pub enum HashPipeSource<S> {
    Plain(S),
    Hashing {
        inner: Box<HashPipeSource<S>>,
        hasher: Box<dyn IncrementalHash>,
    },
}

impl<S: ByteSource> HashPipeSource<S> {
    pub fn new(base: S) -> Self {
        Self::Plain(base)
    }

    /// Installs a hash pipe on top of the current source. `self` becomes the
    /// new `Hashing` frame; the prior contents (whatever they were) become
    /// `inner`.
    pub fn install(self, hasher: Box<dyn IncrementalHash>) -> Self {
        Self::Hashing {
            inner: Box::new(self),
            hasher,
        }
    }

    /// Removes the outermost hash pipe, returning the restored inner source
    /// and the detached hasher for finalization. Panics if called on a
    /// `Plain` source — this is a decoder-internal invariant, never user
    /// triggerable.
    pub fn uninstall(self) -> (Self, Box<dyn IncrementalHash>) {
        match self {
            Self::Hashing { inner, hasher } => (*inner, hasher),
            Self::Plain(_) => panic!("uninstall() called on a HashPipeSource with no active pipe"),
        }
    }

    pub fn is_hashing(&self) -> bool {
        matches!(self, Self::Hashing { .. })
    }
}

impl<S: ByteSource> ByteSource for HashPipeSource<S> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self {
            Self::Plain(s) => s.read(buf),
            Self::Hashing { inner, hasher } => {
                let n = inner.read(buf)?;
                hasher.update(&buf[..n]);
                Ok(n)
            }
        }
    }

    fn skip(&mut self, n: u64) -> Result<()> {
        // Hashing requires every byte to actually pass through the digest,
        // so skip must not take the seek shortcut here.
        match self {
            Self::Plain(s) => s.skip(n),
            Self::Hashing { .. } => {
                let mut scratch = [0u8; 256];
                let mut remaining = n;
                while remaining > 0 {
                    let chunk = core::cmp::min(remaining, scratch.len() as u64) as usize;
                    self.read_exact(&mut scratch[..chunk])?;
                    remaining -= chunk as u64;
                }
                Ok(())
            }
        }
    }
}

/// A write-side hash pipe, symmetric to [`HashPipeSource`].
pub enum HashPipeSink<S> {
    Plain(S),
    Hashing {
        inner: Box<HashPipeSink<S>>,
        hasher: Box<dyn IncrementalHash>,
    },
}

impl<S: ByteSink> HashPipeSink<S> {
    pub fn new(base: S) -> Self {
        Self::Plain(base)
    }

    pub fn install(self, hasher: Box<dyn IncrementalHash>) -> Self {
        Self::Hashing {
            inner: Box::new(self),
            hasher,
        }
    }

    pub fn uninstall(self) -> (Self, Box<dyn IncrementalHash>) {
        match self {
            Self::Hashing { inner, hasher } => (*inner, hasher),
            Self::Plain(_) => panic!("uninstall() called on a HashPipeSink with no active pipe"),
        }
    }

    pub fn is_hashing(&self) -> bool {
        matches!(self, Self::Hashing { .. })
    }
}

impl<S: ByteSink> ByteSink for HashPipeSink<S> {
    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        match self {
            Self::Plain(s) => s.write(buf),
            Self::Hashing { inner, hasher } => {
                let n = inner.write(buf)?;
                hasher.update(&buf[..n]);
                Ok(n)
            }
        }
    }
}

/// Compares two digests in constant time (spec §4.4: "compare in constant time").
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

pub(crate) fn check_digest_len(len: u64) -> Result<usize> {
    if len as usize > MAX_DIGEST_LEN {
        return Err(Error::MalformedHash);
    }
    Ok(len as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemoryIo;
    use alloc::vec;

    #[test]
    #[cfg(feature = "crc32")]
    fn hash_pipe_read_feeds_digest() {
        let reg = HashRegistry::with_defaults();
        let hasher = reg.get(HT_CRC32).expect("crc32 registered by default");
        let io = MemoryIo::new(vec![1, 2, 3, 4]);
        let mut pipe = HashPipeSource::new(io).install(hasher);
        let mut buf = [0u8; 4];
        pipe.read_exact(&mut buf).unwrap();
        let (_, hasher) = pipe.uninstall();
        let digest = hasher.finalize();
        assert_eq!(digest.len(), 4);

        let mut expected = crc32fast::Hasher::new();
        expected.update(&[1, 2, 3, 4]);
        assert_eq!(digest, expected.finalize().to_le_bytes());
    }

    #[test]
    #[cfg(all(feature = "crc32", feature = "md5"))]
    fn nested_pipes_both_see_the_bytes() {
        let reg = HashRegistry::with_defaults();
        let outer_hasher = reg.get(HT_CRC32).unwrap();
        let inner_hasher = reg.get(HT_MD5).unwrap();

        let io = MemoryIo::new(vec![9, 9, 9]);
        let pipe = HashPipeSource::new(io).install(outer_hasher);
        let mut pipe = pipe.install(inner_hasher);
        let mut buf = [0u8; 3];
        pipe.read_exact(&mut buf).unwrap();

        let (outer, inner_digest) = pipe.uninstall();
        assert_eq!(inner_digest.finalize().len(), 16);
        let (_, outer_digest) = outer.uninstall();
        assert_eq!(outer_digest.finalize().len(), 4);
    }

    #[test]
    fn constant_time_eq_matches_equality() {
        assert!(constant_time_eq(&[1, 2, 3], &[1, 2, 3]));
        assert!(!constant_time_eq(&[1, 2, 3], &[1, 2, 4]));
        assert!(!constant_time_eq(&[1, 2], &[1, 2, 3]));
    }
}
