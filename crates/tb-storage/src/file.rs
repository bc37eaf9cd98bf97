//! A single batch file on disk.
//!
//! Files are named by their creation time in milliseconds since the Unix
//! epoch, so lexicographic order on equal-length names and numeric order on
//! the parsed name both give creation order.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tb_common::date::date_from_millis;

use crate::error::Result;

/// Handle to a batch file. Cheap to clone; holds no open descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BatchFile {
    path: PathBuf,
    created_ms: u64,
}

impl BatchFile {
    /// Wrap a path whose file name is a millisecond timestamp.
    ///
    /// Returns `None` for anything else (temp files, foreign files).
    pub fn from_path(path: PathBuf) -> Option<Self> {
        let created_ms = parse_file_name(path.file_name()?.to_str()?)?;
        Some(BatchFile { path, created_ms })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name, the decimal creation timestamp.
    pub fn name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
    }

    pub fn created_ms(&self) -> u64 {
        self.created_ms
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        date_from_millis(self.created_ms)
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Current size on disk.
    pub fn size(&self) -> Result<u64> {
        Ok(fs::metadata(&self.path)?.len())
    }

    /// Append `data` with a single write call in append mode.
    ///
    /// The file is never created here; a batch file that vanished (evicted,
    /// consumed, migrated) fails with `NotFound` instead of being resurrected.
    pub fn append(&self, data: &[u8]) -> Result<()> {
        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        file.write_all(data)?;
        Ok(())
    }

    pub fn read(&self) -> Result<Vec<u8>> {
        Ok(fs::read(&self.path)?)
    }

    /// Delete the file. Deleting a file that is already gone is not an error.
    pub fn delete(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Parse a batch file name into its creation timestamp.
pub fn parse_file_name(name: &str) -> Option<u64> {
    if name.is_empty() || !name.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    name.parse().ok()
}

/// Batch file name for a creation timestamp.
pub fn file_name_for(created_ms: u64) -> String {
    created_ms.to_string()
}
