//! On-disk file store backing the `/api/load` and `/api/save` endpoints.
//!
//! No caching, locking or versioning: concurrent saves race freely and the
//! last writer wins. A save that fails half way is not rolled back.

use std::path::{Path, PathBuf};

use futures::future::join_all;
use tokio::fs;
use tracing::{debug, info};

use crate::error::StoreError;
use crate::files::{is_plain_name, FileSet, FILE_NAMES};

#[derive(Clone, Debug)]
pub struct DirStore {
  load_dir: PathBuf,
  save_dir: PathBuf,
}

impl DirStore {
  /// Loads from and saves to the same directory.
  pub fn new(dir: impl Into<PathBuf>) -> Self {
    let dir = dir.into();
    Self {
      load_dir: dir.clone(),
      save_dir: dir,
    }
  }

  /// Sends saves to a different directory than loads are read from.
  pub fn with_save_dir(mut self, dir: impl Into<PathBuf>) -> Self {
    self.save_dir = dir.into();
    self
  }

  pub fn load_dir(&self) -> &Path {
    &self.load_dir
  }

  pub fn save_dir(&self) -> &Path {
    &self.save_dir
  }

  pub async fn load(&self) -> Result<FileSet, StoreError> {
    if !fs::try_exists(&self.load_dir).await.unwrap_or(false) {
      return Err(StoreError::MissingDir(self.load_dir.clone()));
    }

    let mut files = FileSet::new();
    for name in FILE_NAMES {
      let content = fs::read_to_string(self.load_dir.join(name))
        .await
        .map_err(|source| StoreError::Read {
          name: name.to_string(),
          source,
        })?;
      files.insert(name, content);
    }

    debug!(dir = %self.load_dir.display(), "loaded file set");
    Ok(files)
  }

  /// Writes every entry concurrently. Names are validated up front; after
  /// that each write stands alone and the first failure is reported.
  pub async fn save(&self, files: &FileSet) -> Result<(), StoreError> {
    if let Some(bad) = files.names().find(|name| !is_plain_name(name)) {
      return Err(StoreError::InvalidName(bad.to_string()));
    }

    let writes = files.iter().map(|(name, content)| async move {
      fs::write(self.save_dir.join(name), content)
        .await
        .map_err(|source| StoreError::Write {
          name: name.to_string(),
          source,
        })
    });

    join_all(writes).await.into_iter().collect::<Result<Vec<_>, _>>()?;

    info!(
      dir = %self.save_dir.display(),
      files = files.len(),
      "saved file set"
    );
    Ok(())
  }

  /// Writes the starter project into the load directory unless it already
  /// holds an `index.html`. Returns whether anything was written.
  pub async fn seed(&self) -> Result<bool, StoreError> {
    let index = self.load_dir.join(crate::files::INDEX_HTML);
    if fs::try_exists(&index).await.unwrap_or(false) {
      return Ok(false);
    }

    fs::create_dir_all(&self.load_dir)
      .await
      .map_err(|source| StoreError::Write {
        name: self.load_dir.display().to_string(),
        source,
      })?;
    DirStore::new(&self.load_dir)
      .save(&FileSet::starter())
      .await?;
    info!(dir = %self.load_dir.display(), "seeded starter project");
    Ok(true)
  }
}
