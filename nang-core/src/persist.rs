//! Directory persistence for a [`BinarySet`].
//!
//! # Layout
//!
//! ```text
//! dir/
//!   .lock        advisory lock file
//!   MANIFEST     JSON list of blob names and lengths, in order
//!   <name>.bin   one file per blob
//! ```
//!
//! Writers hold an exclusive lock on `.lock`, readers a shared one, so a
//! reader never sees a half-written set from a cooperating process. The
//! manifest is written last; a directory without one is not a binary set.

use crate::binary_set::BinarySet;
use crate::error::{NangError, Result};
use fs2::FileExt;
use memmap2::Mmap;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use tracing::debug;

const MANIFEST: &str = "MANIFEST";
const LOCK_FILE: &str = ".lock";
const MANIFEST_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct Manifest {
    version: u32,
    blobs: Vec<ManifestEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ManifestEntry {
    name: String,
    len: u64,
}

impl BinarySet {
    /// Write every blob to `dir`, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if a blob name cannot be used as a file
    /// name, and [`NangError::Io`] if the directory cannot be locked or
    /// written.
    pub fn write_to_dir(&self, dir: impl AsRef<Path>) -> Result<()> {
        let dir = dir.as_ref();
        for blob in self {
            check_name(blob.name())?;
        }
        fs::create_dir_all(dir)?;
        let lock = open_lock(dir)?;
        FileExt::lock_exclusive(&lock)?;

        let mut entries = Vec::with_capacity(self.len());
        for blob in self {
            let mut file = File::create(dir.join(blob_file(blob.name())))?;
            file.write_all(blob.data())?;
            file.sync_all()?;
            entries.push(ManifestEntry { name: blob.name().to_owned(), len: blob.len() as u64 });
        }

        let manifest = Manifest { version: MANIFEST_VERSION, blobs: entries };
        let json = serde_json::to_vec_pretty(&manifest)
            .map_err(|e| NangError::Io(io::Error::other(e)))?;
        let staging = dir.join(format!("{MANIFEST}.tmp"));
        fs::write(&staging, json)?;
        fs::rename(&staging, dir.join(MANIFEST))?;

        debug!(dir = %dir.display(), blobs = self.len(), bytes = self.total_size(), "binary set written");
        FileExt::unlock(&lock)?;
        Ok(())
    }

    /// Read a set previously written by [`Self::write_to_dir`].
    ///
    /// # Errors
    ///
    /// Returns [`NangError::Deserialization`] if the manifest or a blob file
    /// is missing, malformed or of the wrong length, and [`NangError::Io`]
    /// for other filesystem failures.
    pub fn read_from_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(NangError::corrupt(format!("{} is not a directory", dir.display())));
        }
        let lock = open_lock(dir)?;
        FileExt::lock_shared(&lock)?;

        let raw = fs::read(dir.join(MANIFEST)).map_err(|e| missing_as_corrupt(e, MANIFEST))?;
        let manifest: Manifest = serde_json::from_slice(&raw)
            .map_err(|e| NangError::corrupt(format!("malformed manifest: {e}")))?;
        if manifest.version != MANIFEST_VERSION {
            return Err(NangError::corrupt(format!(
                "unsupported manifest version {}",
                manifest.version
            )));
        }

        let mut set = Self::new();
        for entry in &manifest.blobs {
            check_name(&entry.name).map_err(|_| {
                NangError::corrupt(format!("manifest names invalid blob `{}`", entry.name))
            })?;
            let file_name = blob_file(&entry.name);
            let file = File::open(dir.join(&file_name))
                .map_err(|e| missing_as_corrupt(e, &file_name))?;
            let data = read_mapped(&file)?;
            if data.len() as u64 != entry.len {
                return Err(NangError::corrupt(format!(
                    "{file_name} holds {} bytes, manifest says {}",
                    data.len(),
                    entry.len
                )));
            }
            set.append(entry.name.clone(), data);
        }

        debug!(dir = %dir.display(), blobs = set.len(), "binary set read");
        FileExt::unlock(&lock)?;
        Ok(set)
    }
}

fn open_lock(dir: &Path) -> Result<File> {
    Ok(OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(dir.join(LOCK_FILE))?)
}

/// Copy a whole file out through a read-only mapping
fn read_mapped(file: &File) -> Result<Vec<u8>> {
    // Zero-length files cannot be mapped on every platform
    if file.metadata()?.len() == 0 {
        return Ok(Vec::new());
    }
    // SAFETY: the shared lock keeps cooperating writers out while mapped,
    // and the mapping is dropped before this function returns.
    let mmap = unsafe { Mmap::map(file)? };
    Ok(mmap.to_vec())
}

fn blob_file(name: &str) -> String {
    format!("{name}.bin")
}

fn check_name(name: &str) -> Result<()> {
    let invalid = name.is_empty()
        || name.starts_with('.')
        || name.contains(['/', '\\', '\0'])
        || name == MANIFEST;
    if invalid {
        return Err(NangError::config(format!("blob name `{name}` cannot be stored as a file")));
    }
    Ok(())
}

fn missing_as_corrupt(err: io::Error, what: &str) -> NangError {
    if err.kind() == io::ErrorKind::NotFound {
        NangError::corrupt(format!("{what} is missing"))
    } else {
        NangError::Io(err)
    }
}
