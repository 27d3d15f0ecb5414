//! The data pool: ordered storage for encoded envelopes.
//!
//! A pool holds opaque envelope files named by a monotonically increasing
//! id, so that "oldest" and "newest" fall out of the name alone. This is
//! mainly abstracted to allow testing the long-term buffer against an
//! in-memory representation.

use std::fmt;
use std::io;

use crate::vstorage::FileIo;

pub(crate) mod fs;
#[cfg(test)]
pub mod mem;

pub use fs::FsPool;
#[cfg(test)]
pub use mem::MemPool;

/// Identity of a pool file: an 8-digit lowercase hex integer.
///
/// Directory entries whose names do not conform to that shape are invisible
/// to every pool operation, ignored but never removed.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct FileId(pub u32);

impl FileId {
    /// Number of hex digits in a conforming file name.
    pub const WIDTH: usize = 8;

    /// The id following this one. Wraps at `u32::MAX`; "newer files sort
    /// higher" holds only within the range a pool actually occupies.
    pub fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }

    /// Parse a conforming file name, `None` for anything else.
    pub fn from_file_name(name: &str) -> Option<Self> {
        if name.len() != Self::WIDTH
            || !name.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
        {
            return None;
        }
        u32::from_str_radix(name, 16).ok().map(Self)
    }

    /// The conforming file name for this id.
    pub fn file_name(self) -> String {
        format!("{self}")
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

/// A pool of envelope files.
///
/// Writing goes through a staging area: bytes are streamed into the staging
/// file first and promoted into the pool in one step, so a conforming name
/// only ever appears with complete contents behind it.
pub trait Pool: Send + Sync + 'static {
    /// The type of files handed out by this pool.
    type File: FileIo;

    /// Create the staging file, truncating any leftover from an earlier
    /// failed attempt.
    fn create_staging(&self) -> io::Result<Self::File>;

    /// Promote the staging file into the pool under the next free id
    /// (the current maximum plus one, or id zero for an empty pool).
    fn commit_staging(&self) -> io::Result<FileId>;

    /// The smallest id present, or `None` for an empty pool.
    fn oldest(&self) -> io::Result<Option<FileId>>;

    /// Open the file with the given id for reading.
    fn open(&self, id: FileId) -> io::Result<Self::File>;

    /// Remove the file with the given id.
    fn remove(&self, id: FileId) -> io::Result<()>;

    /// Number of conforming entries.
    fn size(&self) -> io::Result<usize>;

    /// Remove every conforming entry, stopping on the first failure.
    fn drain(&self) -> io::Result<()>;
}
