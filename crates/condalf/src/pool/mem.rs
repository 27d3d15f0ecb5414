use std::collections::BTreeMap;
use std::io;
use std::sync::{Arc, RwLock};

use super::{FileId, Pool};

type SharedLock<T> = Arc<RwLock<T>>;
type SharedBytes = SharedLock<Vec<u8>>;

/// A pool file backed by a shared `Vec<u8>`.
///
/// Positions work like a regular file: reads and writes advance the position
/// and writing extends the buffer as needed. Unlike a real file, safe Rust
/// requires the buffer behind a lock, so pathological concurrent read/write
/// interleavings of the same entry cannot occur here.
#[derive(Clone, Debug, Default)]
pub struct Entry {
    pos: u64,
    buf: SharedBytes,
}

impl Entry {
    pub fn len(&self) -> usize {
        self.buf.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<SharedBytes> for Entry {
    fn from(buf: SharedBytes) -> Self {
        Self { pos: 0, buf }
    }
}

impl io::Read for Entry {
    fn read(&mut self, dst: &mut [u8]) -> io::Result<usize> {
        let inner = self.buf.read().unwrap();
        let pos = (self.pos as usize).min(inner.len());
        let n = io::Read::read(&mut &inner[pos..], dst)?;
        self.pos += n as u64;
        Ok(n)
    }
}

impl io::Write for Entry {
    fn write(&mut self, src: &[u8]) -> io::Result<usize> {
        let mut inner = self.buf.write().unwrap();
        let pos = self.pos as usize;
        if inner.len() < pos + src.len() {
            inner.resize(pos + src.len(), 0);
        }
        inner[pos..pos + src.len()].copy_from_slice(src);
        self.pos += src.len() as u64;
        Ok(src.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl io::Seek for Entry {
    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        let (base, offset) = match pos {
            io::SeekFrom::Start(n) => {
                self.pos = n;
                return Ok(n);
            }
            io::SeekFrom::End(n) => (self.len() as u64, n),
            io::SeekFrom::Current(n) => (self.pos, n),
        };
        match base.checked_add_signed(offset) {
            Some(n) => {
                self.pos = n;
                Ok(n)
            }
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "invalid seek to a negative or overflowing position",
            )),
        }
    }
}

/// In-memory implementation of [`Pool`].
#[derive(Clone, Debug, Default)]
pub struct MemPool(SharedLock<Inner>);

#[derive(Debug, Default)]
struct Inner {
    files: BTreeMap<u32, SharedBytes>,
    staging: Option<SharedBytes>,
}

impl MemPool {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Pool for MemPool {
    type File = Entry;

    fn create_staging(&self) -> io::Result<Self::File> {
        let mut inner = self.0.write().unwrap();
        let buf = SharedBytes::default();
        inner.staging = Some(Arc::clone(&buf));
        Ok(Entry::from(buf))
    }

    fn commit_staging(&self) -> io::Result<FileId> {
        let mut inner = self.0.write().unwrap();
        let staged = inner.staging.take().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, "no staging entry to commit")
        })?;
        let id = inner
            .files
            .keys()
            .next_back()
            .map(|&max| FileId(max).next())
            .unwrap_or(FileId(0));
        inner.files.insert(id.0, staged);
        Ok(id)
    }

    fn oldest(&self) -> io::Result<Option<FileId>> {
        let inner = self.0.read().unwrap();
        Ok(inner.files.keys().next().copied().map(FileId))
    }

    fn open(&self, id: FileId) -> io::Result<Self::File> {
        let inner = self.0.read().unwrap();
        let Some(buf) = inner.files.get(&id.0) else {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("pool entry {id} does not exist"),
            ));
        };
        Ok(Entry::from(Arc::clone(buf)))
    }

    fn remove(&self, id: FileId) -> io::Result<()> {
        let mut inner = self.0.write().unwrap();
        if inner.files.remove(&id.0).is_none() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("pool entry {id} does not exist"),
            ));
        }
        Ok(())
    }

    fn size(&self) -> io::Result<usize> {
        Ok(self.0.read().unwrap().files.len())
    }

    fn drain(&self) -> io::Result<()> {
        self.0.write().unwrap().files.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Seek, SeekFrom, Write};

    use super::*;

    #[test]
    fn stage_commit_read_back() {
        let pool = MemPool::new();
        let mut staging = pool.create_staging().unwrap();
        staging.write_all(b"envelope").unwrap();
        drop(staging);

        let id = pool.commit_staging().unwrap();
        assert_eq!(FileId(0), id);

        let mut out = Vec::new();
        pool.open(id).unwrap().read_to_end(&mut out).unwrap();
        assert_eq!(b"envelope", out.as_slice());
    }

    #[test]
    fn commit_without_staging_fails() {
        let pool = MemPool::new();
        assert!(pool.commit_staging().is_err());
    }

    #[test]
    fn oldest_tracks_removal() {
        let pool = MemPool::new();
        for _ in 0..3 {
            pool.create_staging().unwrap();
            pool.commit_staging().unwrap();
        }
        assert_eq!(Some(FileId(0)), pool.oldest().unwrap());
        pool.remove(FileId(0)).unwrap();
        assert_eq!(Some(FileId(1)), pool.oldest().unwrap());
        assert_eq!(2, pool.size().unwrap());
    }

    #[test]
    fn entry_seek_and_overwrite() {
        let pool = MemPool::new();
        let mut staging = pool.create_staging().unwrap();
        staging.write_all(b"abcdef").unwrap();
        staging.seek(SeekFrom::Start(2)).unwrap();
        staging.write_all(b"XY").unwrap();

        staging.seek(SeekFrom::Start(0)).unwrap();
        let mut out = Vec::new();
        staging.read_to_end(&mut out).unwrap();
        assert_eq!(b"abXYef", out.as_slice());
    }
}
