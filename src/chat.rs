//! Chat turns against the prototype backend.
//!
//! A turn appends the user's prompt, opens the progress stream, posts the
//! prompt to `create` (first prototype of the session) or `iterate`, appends
//! progress updates as they arrive and finally appends what the POST
//! returned. Turns cannot be cancelled and nothing is retried.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::error::ChatError;
use crate::progress::{ProgressEvent, ProgressStream};

pub const DEFAULT_BACKEND: &str = "http://127.0.0.1:5001";
pub const GREETING: &str = "Hello! How can I help you with your 3D model?";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
  User,
  Assistant,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TicketData {
  pub initial: Option<Value>,
  #[serde(rename = "final")]
  pub final_data: Option<Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
  pub role: Role,
  pub content: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub ticket_data: Option<TicketData>,
}

impl ChatMessage {
  pub fn user(content: impl Into<String>) -> Self {
    Self {
      role: Role::User,
      content: content.into(),
      ticket_data: None,
    }
  }

  pub fn assistant(content: impl Into<String>) -> Self {
    Self {
      role: Role::Assistant,
      content: content.into(),
      ticket_data: None,
    }
  }
}

/// One conversation: its history plus the state that decides where the
/// next prompt goes.
#[derive(Debug)]
pub struct ChatSession {
  messages: Vec<ChatMessage>,
  prototype_created: bool,
  project_name: Option<String>,
  observers: Vec<mpsc::UnboundedSender<ChatMessage>>,
}

impl Default for ChatSession {
  fn default() -> Self {
    Self {
      messages: vec![ChatMessage::assistant(GREETING)],
      prototype_created: false,
      project_name: None,
      observers: Vec::new(),
    }
  }
}

impl ChatSession {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn messages(&self) -> &[ChatMessage] {
    &self.messages
  }

  pub fn prototype_created(&self) -> bool {
    self.prototype_created
  }

  pub fn project_name(&self) -> Option<&str> {
    self.project_name.as_deref()
  }

  /// Blank names clear the project name.
  pub fn set_project_name(&mut self, name: &str) {
    let name = name.trim();
    self.project_name = (!name.is_empty()).then(|| name.to_string());
  }

  /// Receives every message appended from now on.
  pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<ChatMessage> {
    let (tx, rx) = mpsc::unbounded_channel();
    self.observers.push(tx);
    rx
  }

  pub fn push(&mut self, message: ChatMessage) {
    self
      .observers
      .retain(|observer| observer.send(message.clone()).is_ok());
    self.messages.push(message);
  }

  /// The endpoint the next prompt is posted to.
  pub fn next_endpoint(&self) -> Endpoint {
    if self.prototype_created {
      Endpoint::Iterate
    } else {
      Endpoint::Create
    }
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Endpoint {
  Create,
  Iterate,
}

impl Endpoint {
  pub fn path(self) -> &'static str {
    match self {
      Endpoint::Create => "prototype/create",
      Endpoint::Iterate => "prototype/iterate",
    }
  }
}

#[derive(Debug, Serialize)]
struct PromptRequest<'a> {
  user_prompt: &'a str,
  project_name: Option<&'a str>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TicketResponse {
  #[serde(default)]
  pub message: String,
  #[serde(default)]
  pub initial_data: Option<Value>,
  #[serde(default)]
  pub final_data: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PrototypeResponse {
  #[serde(default)]
  pub message: Option<String>,
  #[serde(default)]
  pub success: Option<String>,
  #[serde(default)]
  pub error: Option<String>,
  #[serde(default)]
  pub ticket_responses: Vec<TicketResponse>,
}

/// How a turn ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TurnOutcome {
  Completed,
  /// The backend answered with an error.
  Rejected(String),
  /// The backend could not be reached or its reply could not be read.
  Unreachable,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TurnReport {
  pub endpoint: Endpoint,
  pub progress_events: usize,
  pub outcome: TurnOutcome,
}

/// What the POST produced, before it is turned into chat messages.
enum Reply {
  Body(PrototypeResponse, reqwest::StatusCode),
  Unreadable(reqwest::StatusCode),
  Network,
}

pub struct ChatClient {
  http: reqwest::Client,
  backend: String,
  progress: ProgressStream,
}

impl ChatClient {
  pub fn new(backend: &str) -> Self {
    Self::with_client(reqwest::Client::new(), backend)
  }

  pub fn with_client(http: reqwest::Client, backend: &str) -> Self {
    Self {
      http,
      backend: backend.trim_end_matches('/').to_string(),
      progress: ProgressStream::new(),
    }
  }

  pub fn backend(&self) -> &str {
    &self.backend
  }

  fn url(&self, path: &str) -> String {
    format!("{}/{path}", self.backend)
  }

  /// Runs one turn. Backend and network failures end up in the history as
  /// `Error:` messages; only an empty prompt is refused outright.
  pub async fn send(
    &mut self,
    session: &mut ChatSession,
    prompt: &str,
  ) -> Result<TurnReport, ChatError> {
    if prompt.trim().is_empty() {
      return Err(ChatError::EmptyPrompt);
    }

    let endpoint = session.next_endpoint();
    session.push(ChatMessage::user(prompt));

    let (tx, mut rx) = mpsc::unbounded_channel::<ProgressEvent>();
    let progress_url = self.url("prototype/progress");
    self.progress.open(&self.http, &progress_url, tx);

    let url = self.url(endpoint.path());
    info!(?endpoint, %url, "sending prompt");
    let body = PromptRequest {
      user_prompt: prompt,
      project_name: session.project_name(),
    };
    let request = self.http.post(&url).json(&body);
    let post = post_prompt(request);
    tokio::pin!(post);

    let mut progress_events = 0;
    let reply = loop {
      tokio::select! {
        biased;
        Some(event) = rx.recv() => {
          progress_events += 1;
          session.push(ChatMessage::assistant(event.message));
        }
        reply = &mut post => break reply,
      }
    };

    self.progress.close();
    while let Ok(event) = rx.try_recv() {
      progress_events += 1;
      session.push(ChatMessage::assistant(event.message));
    }

    let outcome = self.finish(session, endpoint, reply);
    Ok(TurnReport {
      endpoint,
      progress_events,
      outcome,
    })
  }

  fn finish(
    &self,
    session: &mut ChatSession,
    endpoint: Endpoint,
    reply: Reply,
  ) -> TurnOutcome {
    match reply {
      Reply::Body(PrototypeResponse { error: Some(error), .. }, status) => {
        warn!(%status, "backend rejected prompt: {error}");
        session.push(ChatMessage::assistant(format!("Error: {error}")));
        TurnOutcome::Rejected(error)
      }
      Reply::Body(_, status) | Reply::Unreadable(status) if !status.is_success() => {
        let error = format!("backend responded with {status}");
        warn!("{error}");
        session.push(ChatMessage::assistant(format!("Error: {error}")));
        TurnOutcome::Rejected(error)
      }
      Reply::Body(response, _) => {
        for message in response_messages(response) {
          session.push(message);
        }
        if endpoint == Endpoint::Create {
          session.prototype_created = true;
        }
        TurnOutcome::Completed
      }
      Reply::Unreadable(_) | Reply::Network => {
        session.push(ChatMessage::assistant(unreachable_message(&self.backend)));
        TurnOutcome::Unreachable
      }
    }
  }
}

async fn post_prompt(request: reqwest::RequestBuilder) -> Reply {
  let response = match request.send().await {
    Ok(response) => response,
    Err(e) => {
      warn!("prompt request failed: {e}");
      return Reply::Network;
    }
  };

  let status = response.status();
  match response.json::<PrototypeResponse>().await {
    Ok(body) => Reply::Body(body, status),
    Err(e) => {
      warn!(%status, "unreadable backend reply: {e}");
      Reply::Unreadable(status)
    }
  }
}

/// The assistant messages a successful reply turns into: the summary first,
/// then one message per completed ticket.
pub fn response_messages(response: PrototypeResponse) -> Vec<ChatMessage> {
  let summary = response
    .message
    .or(response.success)
    .unwrap_or_else(|| "Prototype updated.".to_string());

  let mut messages = vec![ChatMessage::assistant(summary)];
  messages.extend(response.ticket_responses.into_iter().map(|ticket| ChatMessage {
    role: Role::Assistant,
    content: ticket.message,
    ticket_data: Some(TicketData {
      initial: ticket.initial_data,
      final_data: ticket.final_data,
    }),
  }));
  messages
}

/// Shown when the backend cannot be reached at all.
pub fn unreachable_message(backend: &str) -> String {
  let port = reqwest::Url::parse(backend)
    .ok()
    .and_then(|url| url.port_or_known_default());
  match port {
    Some(port) => format!(
      "Error: could not reach the prototype backend at {backend}. Is it running on port {port}?"
    ),
    None => format!("Error: could not reach the prototype backend at {backend}."),
  }
}
