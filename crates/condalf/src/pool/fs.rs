use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, warn};

use super::{FileId, Pool};

/// A [`Pool`] stored as ordinary files in a directory.
///
/// The directory must exist and should not contain user data; anything whose
/// name is not an 8-digit lowercase hex integer is left alone. The staging
/// file lives inside the pool directory as `.<name>`, which never conforms,
/// so a half-written envelope is invisible until the rename promotes it.
#[derive(Clone, Debug)]
pub struct FsPool {
    root: PathBuf,
    staging: PathBuf,
}

impl FsPool {
    /// A pool over the directory `root`, staging through `.<staging_name>`.
    pub fn new(root: impl Into<PathBuf>, staging_name: &str) -> Self {
        let root = root.into();
        let staging = root.join(format!(".{staging_name}"));
        Self { root, staging }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entry_path(&self, id: FileId) -> PathBuf {
        self.root.join(id.file_name())
    }

    /// All conforming ids in this pool, in no particular order.
    fn existing_ids(&self) -> io::Result<Vec<FileId>> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(id) = name.to_str().and_then(FileId::from_file_name) else {
                continue;
            };
            ids.push(id);
        }
        Ok(ids)
    }
}

impl Pool for FsPool {
    type File = File;

    fn create_staging(&self) -> io::Result<Self::File> {
        debug!("staging into {}", self.staging.display());
        File::options()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.staging)
    }

    fn commit_staging(&self) -> io::Result<FileId> {
        let id = self
            .existing_ids()?
            .into_iter()
            .max()
            .map(FileId::next)
            .unwrap_or(FileId(0));
        fs::rename(&self.staging, self.entry_path(id))?;
        debug!("committed {} as {id}", self.staging.display());
        Ok(id)
    }

    fn oldest(&self) -> io::Result<Option<FileId>> {
        Ok(self.existing_ids()?.into_iter().min())
    }

    fn open(&self, id: FileId) -> io::Result<Self::File> {
        File::open(self.entry_path(id))
    }

    fn remove(&self, id: FileId) -> io::Result<()> {
        fs::remove_file(self.entry_path(id))
    }

    fn size(&self) -> io::Result<usize> {
        Ok(self.existing_ids()?.len())
    }

    fn drain(&self) -> io::Result<()> {
        for id in self.existing_ids()? {
            if let Err(e) = self.remove(id) {
                warn!("drain of {} stopped at {id}: {e}", self.root.display());
                return Err(e);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};

    use super::*;

    fn pool(dir: &Path) -> FsPool {
        FsPool::new(dir, "test")
    }

    fn add_file(pool: &FsPool, contents: &[u8]) -> FileId {
        let mut staging = pool.create_staging().unwrap();
        staging.write_all(contents).unwrap();
        drop(staging);
        pool.commit_staging().unwrap()
    }

    #[test]
    fn first_commit_into_empty_pool_gets_id_zero() {
        let tmp = tempfile::tempdir().unwrap();
        let pool = pool(tmp.path());

        let id = add_file(&pool, b"first");
        assert_eq!(FileId(0), id);
        assert_eq!(Some(id), pool.oldest().unwrap());

        let mut contents = Vec::new();
        pool.open(id).unwrap().read_to_end(&mut contents).unwrap();
        assert_eq!(b"first", contents.as_slice());
    }

    #[test]
    fn ids_increase_and_oldest_is_first_committed() {
        let tmp = tempfile::tempdir().unwrap();
        let pool = pool(tmp.path());

        let first = add_file(&pool, b"a");
        for i in 1..5u8 {
            let id = add_file(&pool, &[i]);
            assert_eq!(FileId(u32::from(i)), id);
        }

        assert_eq!(5, pool.size().unwrap());
        assert_eq!(Some(first), pool.oldest().unwrap());
    }

    #[test]
    fn commit_continues_after_existing_ids() {
        let tmp = tempfile::tempdir().unwrap();
        let pool = pool(tmp.path());

        fs::write(tmp.path().join("000000ff"), b"x").unwrap();
        let id = add_file(&pool, b"y");
        assert_eq!(FileId(0x100), id);
    }

    #[test]
    fn non_conforming_entries_are_invisible() {
        let tmp = tempfile::tempdir().unwrap();
        let pool = pool(tmp.path());

        fs::write(tmp.path().join("notes.txt"), b"keep me").unwrap();
        fs::write(tmp.path().join("0000002A"), b"uppercase").unwrap();
        add_file(&pool, b"data");

        assert_eq!(1, pool.size().unwrap());
        assert_eq!(Some(FileId(0)), pool.oldest().unwrap());
    }

    #[test]
    fn staging_file_is_invisible() {
        let tmp = tempfile::tempdir().unwrap();
        let pool = pool(tmp.path());

        let mut staging = pool.create_staging().unwrap();
        staging.write_all(b"half-written").unwrap();

        assert_eq!(0, pool.size().unwrap());
        assert_eq!(None, pool.oldest().unwrap());
    }

    #[test]
    fn drain_leaves_non_conforming_entries() {
        let tmp = tempfile::tempdir().unwrap();
        let pool = pool(tmp.path());

        for i in 0..3u8 {
            add_file(&pool, &[i]);
        }
        fs::write(tmp.path().join("keep"), b"user data").unwrap();
        fs::write(tmp.path().join("also.keep"), b"more").unwrap();

        pool.drain().unwrap();

        assert_eq!(0, pool.size().unwrap());
        let left: Vec<_> = fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(2, left.len());
        assert!(left.contains(&"keep".to_owned()));
        assert!(left.contains(&"also.keep".to_owned()));
    }
}
