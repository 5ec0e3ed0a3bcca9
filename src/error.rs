use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failures of the on-disk file store behind `/api/load` and `/api/save`.
#[derive(Debug, Error)]
pub enum StoreError {
  #[error("project directory {} does not exist", .0.display())]
  MissingDir(PathBuf),

  #[error("failed to read {name}: {source}")]
  Read {
    name: String,
    #[source]
    source: io::Error,
  },

  #[error("failed to write {name}: {source}")]
  Write {
    name: String,
    #[source]
    source: io::Error,
  },

  #[error("refusing to write {0:?}: not a plain file name")]
  InvalidName(String),
}

/// Failures of a [`crate::bridge::FileBridge`] seen from the client side.
#[derive(Debug, Error)]
pub enum BridgeError {
  #[error(transparent)]
  Store(#[from] StoreError),

  #[error("request failed: {0}")]
  Http(#[from] reqwest::Error),

  #[error("server responded with {status}: {message}")]
  Status { status: u16, message: String },
}

#[derive(Debug, Error)]
pub enum PreviewError {
  #[error("index.html is missing from the file set")]
  MissingIndex,

  #[error("failed to write preview to {}: {source}", path.display())]
  Write {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

#[derive(Debug, Error)]
pub enum ChatError {
  #[error("prompt is empty")]
  EmptyPrompt,
}
