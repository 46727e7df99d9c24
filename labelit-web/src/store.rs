//! Image store: a local directory of compressed image files
//!
//! Files are named `<uuid>.jpg`; the database references them by that name
//! only, so the store can be relocated by moving the directory and updating
//! the config. File writes are not transactional with the database insert
//! (a crash in between can orphan a file).

use labelit_common::{Error, Result};
use std::path::{Path, PathBuf};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct ImageStore {
    dir: PathBuf,
}

impl ImageStore {
    /// Open the store, creating the directory if needed
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .map_err(|e| Error::Storage(format!("cannot create {}: {}", dir.display(), e)))?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    /// Generate a unique file name for a new image
    pub fn generate_name(&self) -> String {
        format!("{}.jpg", Uuid::new_v4())
    }

    /// Absolute path of a stored file name
    pub fn path_of(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Write image bytes under `name`
    pub fn write(&self, name: &str, bytes: &[u8]) -> Result<()> {
        std::fs::write(self.path_of(name), bytes)
            .map_err(|e| Error::Storage(format!("cannot write {}: {}", name, e)))
    }

    /// Read a stored file back
    pub fn read(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.path_of(name);
        if !path.exists() {
            return Err(Error::NotFound(format!("image file {}", name)));
        }
        std::fs::read(&path).map_err(|e| Error::Storage(format!("cannot read {}: {}", name, e)))
    }

    pub fn exists(&self, name: &str) -> bool {
        self.path_of(name).exists()
    }

    /// Remove a file, ignoring a missing one
    ///
    /// Used to undo the file write when the following row insert fails.
    pub fn remove(&self, name: &str) -> Result<()> {
        match std::fs::remove_file(self.path_of(name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Storage(format!("cannot remove {}: {}", name, e))),
        }
    }
}
