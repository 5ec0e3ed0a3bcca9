//! The client side of the file store: anything that can load and save a
//! [`FileSet`]. The poll loop and the autosave coordinator are generic over
//! this seam so they run the same against the HTTP endpoints or a directory.

use std::future::Future;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::BridgeError;
use crate::files::FileSet;
use crate::store::DirStore;

/// Body of a failed `/api/load` (and of any other `{error}` reply).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
  pub error: String,
}

/// Body of every `/api/save` reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveResponse {
  pub success: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
}

pub trait FileBridge: Send + Sync {
  fn load(&self) -> impl Future<Output = Result<FileSet, BridgeError>> + Send;

  fn save(
    &self,
    files: &FileSet,
  ) -> impl Future<Output = Result<(), BridgeError>> + Send;
}

impl FileBridge for DirStore {
  async fn load(&self) -> Result<FileSet, BridgeError> {
    Ok(DirStore::load(self).await?)
  }

  async fn save(&self, files: &FileSet) -> Result<(), BridgeError> {
    Ok(DirStore::save(self, files).await?)
  }
}

/// Talks to a running `prototyp3d serve` (or anything with the same API).
#[derive(Clone, Debug)]
pub struct HttpBridge {
  http: reqwest::Client,
  load_url: String,
  save_url: String,
}

impl HttpBridge {
  pub fn new(base_url: &str) -> Self {
    Self::with_client(reqwest::Client::new(), base_url)
  }

  pub fn with_client(http: reqwest::Client, base_url: &str) -> Self {
    let base = base_url.trim_end_matches('/');
    Self {
      http,
      load_url: format!("{base}/api/load"),
      save_url: format!("{base}/api/save"),
    }
  }
}

impl FileBridge for HttpBridge {
  async fn load(&self) -> Result<FileSet, BridgeError> {
    let response = self.http.get(&self.load_url).send().await?;
    let status = response.status();
    if !status.is_success() {
      let message = response
        .json::<ErrorBody>()
        .await
        .map(|body| body.error)
        .unwrap_or_else(|_| "no error detail".to_string());
      return Err(BridgeError::Status {
        status: status.as_u16(),
        message,
      });
    }

    let files = response.json::<FileSet>().await?;
    debug!(files = files.len(), "fetched file set");
    Ok(files)
  }

  async fn save(&self, files: &FileSet) -> Result<(), BridgeError> {
    let response = self.http.post(&self.save_url).json(files).send().await?;
    let status = response.status();
    let body = response.json::<SaveResponse>().await;

    match body {
      Ok(SaveResponse { success: true, .. }) if status.is_success() => Ok(()),
      Ok(SaveResponse { error, .. }) => Err(BridgeError::Status {
        status: status.as_u16(),
        message: error.unwrap_or_else(|| "save was not acknowledged".to_string()),
      }),
      Err(_) if !status.is_success() => Err(BridgeError::Status {
        status: status.as_u16(),
        message: "no error detail".to_string(),
      }),
      Err(e) => Err(e.into()),
    }
  }
}
