//! File-backed substrate.

use super::{MutationGuard, Substrate};
use crate::error::Result;
use crate::types::StorageKey;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// Name of the advisory lock file guarding read-modify-write sequences.
const LOCK_FILE: &str = ".satchel.lock";

/// Substrate storing one file per key under a root directory.
///
/// Values are replaced by writing a temporary file and renaming it into
/// place, so readers never observe a partial value. `lock_exclusive` takes
/// an exclusive advisory lock shared by every process using the same root,
/// which serializes read-modify-write sequences across processes.
pub struct FileSubstrate {
    root: PathBuf,
    lock_path: PathBuf,
    /// Distinguishes concurrent temp files from this handle.
    temp_counter: AtomicU64,
}

impl FileSubstrate {
    /// Open a substrate rooted at `root`, creating the directory if needed.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;

        let lock_path = root.join(LOCK_FILE);

        Ok(Self {
            root,
            lock_path,
            temp_counter: AtomicU64::new(0),
        })
    }

    /// Root directory of this substrate.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn slot_path(&self, key: &StorageKey) -> PathBuf {
        self.root.join(format!("{}.json", sanitize(key.as_str())))
    }

    fn temp_path(&self, key: &StorageKey) -> PathBuf {
        let counter = self.temp_counter.fetch_add(1, Ordering::Relaxed);
        self.root.join(format!(
            ".{}.{}.{}.tmp",
            sanitize(key.as_str()),
            std::process::id(),
            counter
        ))
    }
}

/// Map a storage key to a safe file name.
fn sanitize(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

impl Substrate for FileSubstrate {
    fn get(&self, key: &StorageKey) -> Result<Option<String>> {
        match fs::read_to_string(self.slot_path(key)) {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn set(&self, key: &StorageKey, value: &str) -> Result<()> {
        let temp = self.temp_path(key);

        let mut file = File::create(&temp)?;
        file.write_all(value.as_bytes())?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp, self.slot_path(key))?;
        Ok(())
    }

    fn remove(&self, key: &StorageKey) -> Result<()> {
        match fs::remove_file(self.slot_path(key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn lock_exclusive(&self) -> Result<MutationGuard<'_>> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&self.lock_path)?;
        file.lock_exclusive()?;
        Ok(MutationGuard::file(file))
    }
}
