//! Virtual storage: an in-memory byte buffer behaving like a file.
//!
//! Envelopes leave the logger as plain byte buffers; transfer drivers expect
//! something they can read, seek and write like a file. [`VirtualFile`]
//! bridges the two without copying, so a transport never needs to know
//! whether its source lives in memory or on a filesystem.

use std::io;

/// Object-safe bound for anything a transfer can read from or write into.
pub trait FileIo: io::Read + io::Write + io::Seek + Send {}

impl<T: io::Read + io::Write + io::Seek + Send + ?Sized> FileIo for T {}

/// A fixed-capacity in-memory buffer presented through the file traits.
///
/// The capacity is fixed at construction: writes past it are truncated
/// (ending in a zero-length write at the boundary), and seeking beyond it
/// fails. Reads observe only the written region.
#[derive(Debug)]
pub struct VirtualFile {
    buf: Vec<u8>,
    /// Current read/write position.
    pos: usize,
    /// One past the last written byte, `<= buf.len()`.
    end: usize,
}

impl VirtualFile {
    /// Wrap an already-filled buffer; reads start at position zero and see
    /// the whole buffer.
    pub fn with_data(buf: Vec<u8>) -> Self {
        let end = buf.len();
        Self { buf, pos: 0, end }
    }

    /// An empty file with room for `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: vec![0; capacity],
            pos: 0,
            end: 0,
        }
    }

    /// Length of the written region.
    pub fn len(&self) -> usize {
        self.end
    }

    pub fn is_empty(&self) -> bool {
        self.end == 0
    }

    /// Discard the file wrapper and return the written region.
    pub fn into_inner(mut self) -> Vec<u8> {
        self.buf.truncate(self.end);
        self.buf
    }

    fn check_invariants(&self) {
        debug_assert!(self.pos <= self.end);
        debug_assert!(self.end <= self.buf.len());
    }
}

impl io::Read for VirtualFile {
    fn read(&mut self, dst: &mut [u8]) -> io::Result<usize> {
        self.check_invariants();
        let n = dst.len().min(self.end - self.pos);
        dst[..n].copy_from_slice(&self.buf[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

impl io::Write for VirtualFile {
    fn write(&mut self, src: &[u8]) -> io::Result<usize> {
        self.check_invariants();
        let n = src.len().min(self.buf.len() - self.pos);
        self.buf[self.pos..self.pos + n].copy_from_slice(&src[..n]);
        self.pos += n;
        self.end = self.end.max(self.pos);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl io::Seek for VirtualFile {
    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        self.check_invariants();
        let out_of_range = || {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                "invalid seek to a negative or overflowing position",
            )
        };
        let new = match pos {
            io::SeekFrom::Start(n) => n,
            io::SeekFrom::End(n) => (self.end as u64).checked_add_signed(n).ok_or_else(out_of_range)?,
            io::SeekFrom::Current(n) => (self.pos as u64).checked_add_signed(n).ok_or_else(out_of_range)?,
        };
        if new > self.buf.len() as u64 {
            return Err(io::Error::new(
                io::ErrorKind::StorageFull,
                "seek beyond buffer capacity",
            ));
        }
        self.pos = new as usize;
        Ok(new)
    }
}
