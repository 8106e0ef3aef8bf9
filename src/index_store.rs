//! On-disk index blobs, one per owner.
//!
//! Layout: `<index_dir>/index-<owner>/index.json`. Writes go to a temporary
//! file in the same directory and are renamed into place, so a concurrent
//! reader sees either the previous index or the new one, never a partial
//! file. Last writer wins.

use std::io::{ErrorKind, Write};
use std::path::PathBuf;

use tempfile::NamedTempFile;
use tracing::debug;

use drivechat_core::index::Index;

use crate::error::{Error, Result};

const INDEX_FILE: &str = "index.json";

pub struct IndexStore {
    root: PathBuf,
}

impl IndexStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Write `index` as the owner's index, replacing any previous one.
    pub fn persist(&self, index: &Index, owner_id: &str) -> Result<()> {
        let dir = self.owner_dir(owner_id)?;
        std::fs::create_dir_all(&dir)?;

        let bytes = index.to_json()?;
        let mut tmp = NamedTempFile::new_in(&dir)?;
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(dir.join(INDEX_FILE)).map_err(|e| e.error)?;

        debug!(owner_id, bytes = bytes.len(), "index persisted");
        Ok(())
    }

    /// Load the owner's index; [`Error::NotIndexed`] when there is none.
    pub fn load(&self, owner_id: &str) -> Result<Index> {
        let path = self.owner_dir(owner_id)?.join(INDEX_FILE);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(Error::NotIndexed(owner_id.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        Ok(Index::from_json(&bytes)?)
    }

    pub fn exists(&self, owner_id: &str) -> bool {
        self.owner_dir(owner_id)
            .map(|dir| dir.join(INDEX_FILE).is_file())
            .unwrap_or(false)
    }

    /// Delete the owner's index. Returns whether one existed.
    pub fn remove(&self, owner_id: &str) -> Result<bool> {
        let dir = self.owner_dir(owner_id)?;
        match std::fs::remove_dir_all(&dir) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn owner_dir(&self, owner_id: &str) -> Result<PathBuf> {
        validate_owner(owner_id)?;
        Ok(self.root.join(format!("index-{}", owner_id)))
    }
}

/// Owner ids become directory names: ASCII letters, digits, `_` and `-` only.
pub fn validate_owner(owner_id: &str) -> Result<()> {
    let ok = !owner_id.is_empty()
        && owner_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if ok {
        Ok(())
    } else {
        Err(Error::InvalidOwner(owner_id.to_string()))
    }
}
