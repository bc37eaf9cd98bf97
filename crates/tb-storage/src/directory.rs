//! One storage directory holding batch files.

use std::fs::{self, OpenOptions};
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use tracing::{debug, trace};

use crate::error::{Result, StorageError};
use crate::file::{file_name_for, BatchFile};

/// How many successive names are tried when the preferred one is taken.
const MAX_NAME_ATTEMPTS: u64 = 1000;

/// A directory of batch files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directory {
    path: PathBuf,
}

impl Directory {
    /// Open the directory, creating it and its parents if needed.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if path.exists() && !path.is_dir() {
            return Err(StorageError::NotADirectory(path));
        }
        fs::create_dir_all(&path)?;
        Ok(Directory { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Batch files in creation order, oldest first.
    ///
    /// Entries whose name is not a timestamp, and subdirectories, are ignored.
    pub fn files(&self) -> Result<Vec<BatchFile>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.path)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(file) = BatchFile::from_path(entry.path()) {
                files.push(file);
            }
        }
        files.sort_by(|a, b| {
            a.created_ms()
                .cmp(&b.created_ms())
                .then_with(|| a.name().cmp(b.name()))
        });
        Ok(files)
    }

    /// Sum of the sizes of all batch files.
    pub fn size(&self) -> Result<u64> {
        let mut total = 0u64;
        for file in self.files()? {
            total += match file.size() {
                Ok(size) => size,
                // removed between listing and stat
                Err(StorageError::Io(e)) if e.kind() == ErrorKind::NotFound => 0,
                Err(e) => return Err(e),
            };
        }
        Ok(total)
    }

    /// Create an empty batch file named after `created_ms`.
    ///
    /// Creation is exclusive: if the name is taken the timestamp is bumped by
    /// one millisecond until a free name is found, so two creators never
    /// share a file.
    pub fn create_file(&self, created_ms: u64) -> Result<BatchFile> {
        for offset in 0..MAX_NAME_ATTEMPTS {
            let candidate = created_ms.saturating_add(offset);
            let path = self.path.join(file_name_for(candidate));
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(_) => {
                    trace!(target: "tb_storage", path = %path.display(), "created batch file");
                    return BatchFile::from_path(path)
                        .ok_or_else(|| StorageError::NameExhausted(file_name_for(created_ms)));
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(StorageError::NameExhausted(file_name_for(created_ms)))
    }

    /// Move `file` into `destination`, keeping its name when free.
    ///
    /// Never overwrites: a clashing name in the destination is bumped like in
    /// [`Directory::create_file`]. The source is removed only once the
    /// destination holds the data.
    pub fn move_file(&self, file: &BatchFile, destination: &Directory) -> Result<BatchFile> {
        for offset in 0..MAX_NAME_ATTEMPTS {
            let candidate = file.created_ms().saturating_add(offset);
            let target = destination.path.join(file_name_for(candidate));
            match link_or_copy(file.path(), &target) {
                Ok(()) => {
                    fs::remove_file(file.path())?;
                    debug!(
                        target: "tb_storage",
                        from = %file.path().display(),
                        to = %target.display(),
                        "moved batch file"
                    );
                    return BatchFile::from_path(target)
                        .ok_or_else(|| StorageError::NameExhausted(file.name().to_string()));
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(StorageError::NameExhausted(file.name().to_string()))
    }
}

/// Hard-link `from` to `to`, falling back to an exclusive copy where links
/// are not supported (different file systems).
fn link_or_copy(from: &Path, to: &Path) -> io::Result<()> {
    match fs::hard_link(from, to) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::AlreadyExists || e.kind() == ErrorKind::NotFound => {
            Err(e)
        }
        Err(_) => {
            let mut source = fs::File::open(from)?;
            let mut target = OpenOptions::new().write(true).create_new(true).open(to)?;
            if let Err(e) = io::copy(&mut source, &mut target) {
                drop(target);
                let _ = fs::remove_file(to);
                return Err(e);
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_create_rejects_regular_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("not-a-dir");
        fs::write(&path, b"x").unwrap();
        assert!(matches!(
            Directory::create(&path),
            Err(StorageError::NotADirectory(_))
        ));
    }

    #[test]
    fn test_files_sorted_and_filtered() {
        let dir = tempdir().unwrap();
        let directory = Directory::create(dir.path().join("d")).unwrap();
        fs::write(directory.path().join("300"), b"").unwrap();
        fs::write(directory.path().join("1000"), b"").unwrap();
        fs::write(directory.path().join("20"), b"").unwrap();
        fs::write(directory.path().join("notes.txt"), b"").unwrap();
        fs::create_dir(directory.path().join("5")).unwrap();

        let names: Vec<_> = directory
            .files()
            .unwrap()
            .iter()
            .map(|f| f.name().to_string())
            .collect();
        assert_eq!(names, vec!["20", "300", "1000"]);
    }

    #[test]
    fn test_create_file_bumps_on_collision() {
        let dir = tempdir().unwrap();
        let directory = Directory::create(dir.path()).unwrap();
        let a = directory.create_file(500).unwrap();
        let b = directory.create_file(500).unwrap();
        let c = directory.create_file(500).unwrap();
        assert_eq!(a.name(), "500");
        assert_eq!(b.name(), "501");
        assert_eq!(c.name(), "502");
    }

    #[test]
    fn test_size_sums_files() {
        let dir = tempdir().unwrap();
        let directory = Directory::create(dir.path()).unwrap();
        fs::write(directory.path().join("1"), vec![0u8; 10]).unwrap();
        fs::write(directory.path().join("2"), vec![0u8; 5]).unwrap();
        fs::write(directory.path().join("ignored"), vec![0u8; 100]).unwrap();
        assert_eq!(directory.size().unwrap(), 15);
    }

    #[test]
    fn test_move_file_never_overwrites() {
        let dir = tempdir().unwrap();
        let src = Directory::create(dir.path().join("src")).unwrap();
        let dst = Directory::create(dir.path().join("dst")).unwrap();
        fs::write(src.path().join("100"), b"new").unwrap();
        fs::write(dst.path().join("100"), b"old").unwrap();

        let file = BatchFile::from_path(src.path().join("100")).unwrap();
        let moved = src.move_file(&file, &dst).unwrap();

        assert_eq!(moved.name(), "101");
        assert_eq!(fs::read(moved.path()).unwrap(), b"new");
        assert_eq!(fs::read(dst.path().join("100")).unwrap(), b"old");
        assert!(src.files().unwrap().is_empty());
    }

    #[test]
    fn test_move_missing_file_fails() {
        let dir = tempdir().unwrap();
        let src = Directory::create(dir.path().join("src")).unwrap();
        let dst = Directory::create(dir.path().join("dst")).unwrap();
        let ghost = BatchFile::from_path(src.path().join("9")).unwrap();
        assert!(src.move_file(&ghost, &dst).is_err());
        assert!(dst.files().unwrap().is_empty());
    }
}
