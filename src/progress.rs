//! Server-sent progress events from the prototype backend.

use futures::StreamExt;
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// One progress update. Only `message` is shown; the rest is kept as-is.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ProgressEvent {
  pub message: String,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

/// Incremental `text/event-stream` decoder. Feed it raw chunks; it yields the
/// `data` payload of every completed event.
#[derive(Debug, Default)]
pub struct SseDecoder {
  buffer: Vec<u8>,
  data: Vec<String>,
}

impl SseDecoder {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
    self.buffer.extend_from_slice(chunk);
    let mut events = Vec::new();

    while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
      let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
      let line = String::from_utf8_lossy(&raw);
      let line = line.trim_end_matches(['\n', '\r']);

      if line.is_empty() {
        if !self.data.is_empty() {
          events.push(self.data.join("\n"));
          self.data.clear();
        }
        continue;
      }
      if line.starts_with(':') {
        continue;
      }

      let (field, value) = line.split_once(':').unwrap_or((line, ""));
      if field == "data" {
        let value = value.strip_prefix(' ').unwrap_or(value);
        self.data.push(value.to_string());
      }
    }

    events
  }
}

/// Parses one event payload, logging and dropping anything unusable.
pub fn parse_event(data: &str) -> Option<ProgressEvent> {
  match serde_json::from_str::<ProgressEvent>(data) {
    Ok(event) => Some(event),
    Err(e) => {
      warn!("ignoring malformed progress event {data:?}: {e}");
      None
    }
  }
}

/// The one-way connection to the progress endpoint.
#[derive(Debug, Default)]
pub struct ProgressStream {
  task: Option<JoinHandle<()>>,
}

impl ProgressStream {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn is_open(&self) -> bool {
    self.task.as_ref().is_some_and(|task| !task.is_finished())
  }

  /// Connects to `url` and forwards every event on `events`. Does nothing
  /// and returns `false` while a connection is already open.
  pub fn open(
    &mut self,
    http: &reqwest::Client,
    url: &str,
    events: mpsc::UnboundedSender<ProgressEvent>,
  ) -> bool {
    if self.is_open() {
      return false;
    }

    let request = http
      .get(url)
      .header(reqwest::header::ACCEPT, "text/event-stream");
    let url = url.to_string();

    self.task = Some(tokio::spawn(async move {
      let response = match request.send().await {
        Ok(response) if response.status().is_success() => response,
        Ok(response) => {
          warn!(%url, status = %response.status(), "progress stream refused");
          return;
        }
        Err(e) => {
          warn!(%url, "progress stream unavailable: {e}");
          return;
        }
      };
      debug!(%url, "progress stream connected");

      let mut decoder = SseDecoder::new();
      let mut body = response.bytes_stream();
      while let Some(chunk) = body.next().await {
        let chunk = match chunk {
          Ok(chunk) => chunk,
          Err(e) => {
            warn!(%url, "progress stream interrupted: {e}");
            break;
          }
        };
        for data in decoder.push(&chunk) {
          if let Some(event) = parse_event(&data) {
            if events.send(event).is_err() {
              return;
            }
          }
        }
      }
      debug!(%url, "progress stream ended");
    }));
    true
  }

  pub fn close(&mut self) {
    if let Some(task) = self.task.take() {
      task.abort();
    }
  }
}

impl Drop for ProgressStream {
  fn drop(&mut self) {
    self.close();
  }
}
