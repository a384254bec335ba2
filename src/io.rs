//! Byte I/O abstraction (spec §2, component B): a bidirectional byte
//! source/sink with blocking `read`/`write`/`skip`. Every higher layer
//! consumes only these two traits, never a concrete type, mirroring the
//! original C++ `IOIntf` split between `io_memory.cpp`/`io_std.cpp` and the
//! streaming core that only ever saw the abstract interface.

use alloc::vec::Vec;

use crate::error::{Error, Result};

/// A blocking, readable byte source.
///
/// `read` mirrors `std::io::Read::read`: it may return fewer bytes than
/// requested without that being an error. `read_exact` is the primitive the
/// rest of the crate actually uses — it loops until `buf` is full or the
/// source is exhausted, at which point it fails with [`Error::EndOfStream`].
pub trait ByteSource {
    /// Reads into `buf`, returning the number of bytes actually read (`0`
    /// means the source is exhausted).
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Reads exactly `buf.len()` bytes, or fails with [`Error::EndOfStream`].
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.read(&mut buf[filled..])?;
            if n == 0 {
                return Err(Error::EndOfStream);
            }
            filled += n;
        }
        Ok(())
    }

    /// Discards `n` bytes. The default implementation reads and drops them
    /// in bounded chunks; sources with native seek support should override
    /// this.
    fn skip(&mut self, mut n: u64) -> Result<()> {
        let mut scratch = [0u8; 256];
        while n > 0 {
            let chunk = core::cmp::min(n, scratch.len() as u64) as usize;
            self.read_exact(&mut scratch[..chunk])?;
            n -= chunk as u64;
        }
        Ok(())
    }
}

/// A blocking, writable byte sink.
pub trait ByteSink {
    /// Writes `buf`, returning the number of bytes actually written.
    fn write(&mut self, buf: &[u8]) -> Result<usize>;

    /// Writes all of `buf`, retrying short writes.
    fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        let mut written = 0;
        while written < buf.len() {
            let n = self.write(&buf[written..])?;
            if n == 0 {
                return Err(Error::Io);
            }
            written += n;
        }
        Ok(())
    }
}

impl<T: ByteSource + ?Sized> ByteSource for &mut T {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        (**self).read(buf)
    }

    fn skip(&mut self, n: u64) -> Result<()> {
        (**self).skip(n)
    }
}

impl<T: ByteSink + ?Sized> ByteSink for &mut T {
    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        (**self).write(buf)
    }
}

/// An in-memory byte source and sink, the way `io_memory.cpp` backs the
/// original library's tests and the `MemoryIo` fixtures used throughout this
/// crate's own test suite.
#[derive(Debug, Default, Clone)]
pub struct MemoryIo {
    buf: Vec<u8>,
    pos: usize,
}

impl MemoryIo {
    /// Wraps an existing buffer for reading (or appends for writing, picking
    /// up at the end of the initial contents).
    pub fn new(buf: Vec<u8>) -> Self {
        Self { buf, pos: 0 }
    }

    /// An empty buffer, ready to be written to and then rewound for reading.
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Rewinds the read cursor to the start without discarding written data.
    pub fn rewind(&mut self) {
        self.pos = 0;
    }

    /// Consumes `self`, returning the underlying buffer.
    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }

    /// Borrows the underlying buffer.
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }
}

impl ByteSource for MemoryIo {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let available = self.buf.len() - self.pos;
        let n = core::cmp::min(available, buf.len());
        buf[..n].copy_from_slice(&self.buf[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }

    fn skip(&mut self, n: u64) -> Result<()> {
        let available = (self.buf.len() - self.pos) as u64;
        if n > available {
            return Err(Error::EndOfStream);
        }
        self.pos += n as usize;
        Ok(())
    }
}

impl ByteSink for MemoryIo {
    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.buf.extend_from_slice(buf);
        Ok(buf.len())
    }
}

/// A read-only source over a borrowed byte slice, for callers who already
/// hold the whole wire payload and don't want an owning copy.
#[derive(Debug, Clone, Copy)]
pub struct SliceIo<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> SliceIo<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }
}

impl ByteSource for SliceIo<'_> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = core::cmp::min(self.remaining(), buf.len());
        buf[..n].copy_from_slice(&self.buf[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }

    fn skip(&mut self, n: u64) -> Result<()> {
        if n as usize > self.remaining() {
            return Err(Error::EndOfStream);
        }
        self.pos += n as usize;
        Ok(())
    }
}

#[cfg(feature = "std")]
mod std_io {
    use super::*;

    /// Adapts any `std::io::Read` into a [`ByteSource`], the way the teacher
    /// crate's wasm shim adapts `bitcoin_hashes` types to a common interface
    /// without pulling in the rest of that ecosystem.
    pub struct StdReader<R>(pub R);

    impl<R: std::io::Read> ByteSource for StdReader<R> {
        fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
            self.0.read(buf).map_err(|_| Error::Io)
        }
    }

    /// Adapts any `std::io::Write` into a [`ByteSink`].
    pub struct StdWriter<W>(pub W);

    impl<W: std::io::Write> ByteSink for StdWriter<W> {
        fn write(&mut self, buf: &[u8]) -> Result<usize> {
            self.0.write(buf).map_err(|_| Error::Io)
        }
    }
}

#[cfg(feature = "std")]
pub use std_io::{StdReader, StdWriter};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_io_roundtrip() {
        let mut io = MemoryIo::empty();
        io.write_all(&[1, 2, 3, 4]).unwrap();
        io.rewind();
        let mut buf = [0u8; 4];
        io.read_exact(&mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3, 4]);
    }

    #[test]
    fn read_exact_past_end_is_end_of_stream() {
        let mut io = MemoryIo::new(alloc::vec![1, 2]);
        let mut buf = [0u8; 4];
        assert_eq!(io.read_exact(&mut buf).unwrap_err(), Error::EndOfStream);
    }

    #[test]
    fn skip_advances_cursor() {
        let mut io = MemoryIo::new(alloc::vec![1, 2, 3, 4]);
        io.skip(2).unwrap();
        let mut buf = [0u8; 2];
        io.read_exact(&mut buf).unwrap();
        assert_eq!(buf, [3, 4]);
    }

    #[test]
    fn skip_past_end_fails() {
        let mut io = MemoryIo::new(alloc::vec![1, 2]);
        assert_eq!(io.skip(5).unwrap_err(), Error::EndOfStream);
    }
}
