use std::fs;
use std::io::{self, Write};

use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;
use tempfile::Builder;

use crate::error::ShelfError;

/// Client-local key/value storage: one file per namespaced key under a root
/// directory.
#[derive(Debug, Clone)]
pub struct Store {
    root: Utf8PathBuf,
}

impl Store {
    pub fn new() -> Result<Self, ShelfError> {
        let root = BaseDirs::new()
            .and_then(|dirs| {
                Utf8PathBuf::from_path_buf(dirs.home_dir().join(".cache").join("shelf-shuffler"))
                    .ok()
            })
            .ok_or_else(|| {
                ShelfError::Filesystem("unable to resolve cache directory".to_string())
            })?;
        Ok(Self { root })
    }

    pub fn new_with_root(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn key_path(&self, key: &str) -> Utf8PathBuf {
        self.root.join(format!("{key}.json"))
    }

    pub fn ensure_root(&self) -> Result<(), ShelfError> {
        fs::create_dir_all(self.root.as_std_path())
            .map_err(|err| ShelfError::Filesystem(err.to_string()))
    }

    /// Contents stored under `key`, `None` when nothing was ever written.
    pub fn read(&self, key: &str) -> Result<Option<Vec<u8>>, ShelfError> {
        match fs::read(self.key_path(key).as_std_path()) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(ShelfError::Filesystem(format!("read {key}: {err}"))),
        }
    }

    /// Replaces the value of `key`. Readers see either the old or the new
    /// contents, never a partial file.
    pub fn write_atomic(&self, key: &str, content: &[u8]) -> Result<(), ShelfError> {
        self.ensure_root()?;
        let mut temp = Builder::new()
            .prefix(&format!(".{key}"))
            .suffix(".tmp")
            .tempfile_in(self.root.as_std_path())
            .map_err(|err| ShelfError::Filesystem(err.to_string()))?;
        temp.write_all(content)
            .map_err(|err| ShelfError::Filesystem(err.to_string()))?;
        temp.as_file()
            .sync_all()
            .map_err(|err| ShelfError::Filesystem(err.to_string()))?;
        temp.persist(self.key_path(key).as_std_path())
            .map_err(|err| ShelfError::Filesystem(err.to_string()))?;
        Ok(())
    }

    pub fn remove(&self, key: &str) -> Result<(), ShelfError> {
        match fs::remove_file(self.key_path(key).as_std_path()) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(ShelfError::Filesystem(format!("remove {key}: {err}"))),
        }
    }
}
