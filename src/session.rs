//! Interactive terminal session: an editor-less front end that keeps a
//! local copy of the project in sync, autosaves it, renders previews and
//! chats with the prototype backend.

use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, Notify};
use tracing::{error, warn};

use crate::autosave::{Autosave, AutosaveHandle, SaveNotice};
use crate::bridge::HttpBridge;
use crate::chat::{ChatClient, ChatMessage, ChatSession, Role, TurnOutcome};
use crate::files::is_plain_name;
use crate::keys::{self, PreviewPane, Shortcut};
use crate::preview::{AssetMode, PreviewFrame};
use crate::sync::{self, Merge, PollLoop, Workspace};
use crate::typing::Typewriter;

#[derive(Clone, Debug)]
pub struct SessionConfig {
  pub server: String,
  pub backend: String,
  pub project_name: Option<String>,
  pub poll_interval: Duration,
  pub autosave_interval: Duration,
  pub autosave: bool,
  pub preview_path: PathBuf,
}

/// A parsed line of input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
  Shortcut(Shortcut, Option<String>),
  Files,
  Show(String),
  Load { file: String, path: PathBuf },
  Indent { file: String, line: usize },
  Fullscreen,
  Name(String),
  Autosave(bool),
  Help,
  Quit,
  Prompt(String),
  Invalid(String),
}

impl Command {
  pub fn parse(line: &str) -> Option<Self> {
    let line = line.trim();
    if line.is_empty() {
      return None;
    }
    if !line.starts_with('/') {
      return Some(Command::Prompt(line.to_string()));
    }

    let (head, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let rest = rest.trim();
    let arg = (!rest.is_empty()).then(|| rest.to_string());

    if head == "/key" {
      let (combo, rest) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
      return Some(match Shortcut::from_combo(combo) {
        Some(shortcut) => Command::for_shortcut(shortcut, rest.trim()),
        None => Command::Invalid(format!("unknown key combination {combo:?}")),
      });
    }
    if let Some(shortcut) = Shortcut::from_command(head) {
      return Some(Command::for_shortcut(shortcut, rest));
    }

    Some(match (head, arg) {
      ("/files", _) => Command::Files,
      ("/show", Some(file)) => Command::Show(file),
      ("/load", Some(args)) => match args.split_once(char::is_whitespace) {
        Some((file, _)) if !is_plain_name(file) => {
          Command::Invalid(format!("not a project file name: {file}"))
        }
        Some((file, path)) => Command::Load {
          file: file.to_string(),
          path: PathBuf::from(path.trim()),
        },
        None => Command::Invalid("usage: /load <file> <path>".to_string()),
      },
      ("/fullscreen", _) => Command::Fullscreen,
      ("/name", name) => Command::Name(name.unwrap_or_default()),
      ("/autosave", Some(flag)) if flag == "on" => Command::Autosave(true),
      ("/autosave", Some(flag)) if flag == "off" => Command::Autosave(false),
      ("/autosave", _) => Command::Invalid("usage: /autosave on|off".to_string()),
      ("/help", _) => Command::Help,
      ("/quit" | "/exit", _) => Command::Quit,
      (other, _) => Command::Invalid(format!("unknown command {other}; try /help")),
    })
  }

  fn for_shortcut(shortcut: Shortcut, rest: &str) -> Self {
    if shortcut != Shortcut::Indent {
      let arg = (!rest.is_empty()).then(|| rest.to_string());
      return Command::Shortcut(shortcut, arg);
    }
    let mut args = rest.split_whitespace();
    match (args.next(), args.next().map(str::parse::<usize>), args.next()) {
      (Some(file), Some(Ok(line)), None) if line > 0 => Command::Indent {
        file: file.to_string(),
        line,
      },
      _ => Command::Invalid("usage: /indent <file> <line>".to_string()),
    }
  }
}

pub fn print_help() {
  println!("Commands:");
  println!("  <text>                 Send a prompt to the prototype backend");
  println!("  /save                  Save files now (Ctrl/Cmd+S)");
  println!("  /run [path]            Render the preview to a file (Ctrl/Cmd+Enter)");
  println!("  /files                 List files and their sizes");
  println!("  /show <file>           Print a file");
  println!("  /load <file> <path>    Replace a file with the contents of a local file");
  println!("  /indent <file> <line>  Indent a line by two spaces (Tab)");
  println!("  /fullscreen            Toggle opening each preview in the browser");
  println!("  /esc                   Leave full screen (Escape)");
  println!("  /key <combo> [args]    Run a key combination, e.g. ctrl+s, cmd+enter, esc");
  println!("  /name <project>        Set the project name sent to the backend");
  println!("  /autosave on|off       Toggle the autosave timer");
  println!("  /quit                  Leave the session");
  println!();
}

/// Prints assistant messages with the typed animation, one after another.
/// A signal on `skip` prints the rest of the current message at once.
fn spawn_printer(mut messages: mpsc::UnboundedReceiver<ChatMessage>, skip: Arc<Notify>) {
  tokio::spawn(async move {
    let typewriter = Typewriter::default();
    while let Some(message) = messages.recv().await {
      if message.role != Role::Assistant {
        continue;
      }
      let (tx, mut pieces) = mpsc::unbounded_channel();
      let typing = typewriter.spawn(message.content.clone(), tx);
      let mut shown = 0;
      loop {
        tokio::select! {
          piece = pieces.recv() => match piece {
            Some(piece) => {
              shown += piece.len();
              print!("{piece}");
              let _ = std::io::stdout().flush();
            }
            None => break,
          },
          _ = skip.notified() => {
            typing.cancel();
            while let Ok(piece) = pieces.try_recv() {
              shown += piece.len();
              print!("{piece}");
            }
            print!("{}", &message.content[shown..]);
            break;
          }
        }
      }
      println!();
    }
  });
}

fn spawn_notice_reporter(mut notices: mpsc::UnboundedReceiver<SaveNotice>) {
  tokio::spawn(async move {
    while let Some(notice) = notices.recv().await {
      println!("[save] {notice}");
    }
  });
}

fn spawn_merge_reporter(mut merges: mpsc::UnboundedReceiver<Merge>) {
  tokio::spawn(async move {
    while let Some(merge) = merges.recv().await {
      if let Merge::Replaced { changed } = merge {
        println!("[sync] remote changes: {}", changed.join(", "));
      }
    }
  });
}

struct Session {
  config: SessionConfig,
  bridge: Arc<HttpBridge>,
  workspace: Workspace,
  autosave: AutosaveHandle,
  chat: ChatClient,
  history: ChatSession,
  frame: PreviewFrame,
  pane: PreviewPane,
}

impl Session {
  /// Returns `false` once the user asked to leave.
  async fn handle(&mut self, command: Command) -> bool {
    match command {
      Command::Shortcut(Shortcut::Save, _) => self.autosave.request_save(),
      Command::Shortcut(Shortcut::RenderPreview, path) => self.render(path),
      Command::Shortcut(Shortcut::ExitFullscreen, _) => {
        if self.pane.handle(Shortcut::ExitFullscreen) {
          println!("full screen off");
        }
      }
      // Indent always parses into `Command::Indent`.
      Command::Shortcut(Shortcut::Indent, _) => {}
      Command::Indent { file, line } => self.indent(&file, line),
      Command::Fullscreen => {
        self.pane.toggle_fullscreen();
        println!(
          "full screen {}",
          if self.pane.is_fullscreen() { "on" } else { "off" }
        );
      }
      Command::Files => {
        for (name, content) in self.workspace.snapshot().iter() {
          println!("  {name:<12} {} bytes", content.len());
        }
      }
      Command::Show(file) => match self.workspace.snapshot().get(&file) {
        Some(content) => println!("{content}"),
        None => println!("no such file: {file}"),
      },
      Command::Load { file, path } => match tokio::fs::read_to_string(&path).await {
        Ok(content) => {
          self.workspace.edit(&file, content);
          println!("{file} updated from {}", path.display());
        }
        Err(e) => println!("cannot read {}: {e}", path.display()),
      },
      Command::Name(name) => {
        self.history.set_project_name(&name);
        match self.history.project_name() {
          Some(name) => println!("project name: {name}"),
          None => println!("project name cleared"),
        }
      }
      Command::Autosave(enabled) => {
        self.autosave.set_enabled(enabled);
        println!("autosave {}", if enabled { "on" } else { "off" });
      }
      Command::Help => print_help(),
      Command::Quit => return false,
      Command::Invalid(reason) => println!("{reason}"),
      Command::Prompt(prompt) => {
        if let Ok(report) = self.chat.send(&mut self.history, &prompt).await {
          if report.outcome == TurnOutcome::Completed {
            // Pick up regenerated files without waiting for the next poll.
            if let Err(e) = sync::poll_once(self.bridge.as_ref(), &self.workspace).await {
              error!("Error checking for file changes: {e}");
            }
          }
        }
      }
    }
    true
  }

  fn render(&mut self, path: Option<String>) {
    let path = path.map_or_else(|| self.config.preview_path.clone(), PathBuf::from);
    let files = self.workspace.snapshot();
    let rendered = self.frame.render(&files, &AssetMode::Inline).map(|_| ());
    if let Err(e) = rendered.and_then(|()| self.frame.write_to(&path)) {
      println!("preview failed: {e}");
      return;
    }
    println!("preview #{} written to {}", self.frame.generation(), path.display());

    if self.pane.is_fullscreen() {
      if let Err(e) = open::that(&path) {
        warn!("could not open preview: {e}");
      }
    }
  }

  fn indent(&self, file: &str, line: usize) {
    let files = self.workspace.snapshot();
    let Some(content) = files.get(file) else {
      println!("no such file: {file}");
      return;
    };
    match indent_line(content, line) {
      Some(indented) => {
        self.workspace.edit(file, indented);
        println!("{file}:{line} indented");
      }
      None => println!("{file} has no line {line}"),
    }
  }
}

/// Tab at the start of `line`.
fn indent_line(content: &str, line: usize) -> Option<String> {
  let start = keys::line_start(content, line)?;
  Some(keys::insert_indent(content, start, start).0)
}

pub async fn run(config: SessionConfig) -> Result<(), Box<dyn std::error::Error>> {
  let bridge = Arc::new(HttpBridge::new(&config.server));
  let workspace = Workspace::default();

  if let Err(e) = sync::poll_once(bridge.as_ref(), &workspace).await {
    error!("Error loading files: {e}");
  }

  let (merge_tx, merge_rx) = mpsc::unbounded_channel();
  spawn_merge_reporter(merge_rx);
  let _poll = PollLoop::spawn(
    bridge.clone(),
    workspace.clone(),
    config.poll_interval,
    Some(merge_tx),
  );

  let (notice_tx, notice_rx) = mpsc::unbounded_channel();
  spawn_notice_reporter(notice_rx);
  let autosave = Autosave::new(bridge.clone(), workspace.clone())
    .with_notices(notice_tx)
    .spawn(config.autosave_interval);
  autosave.set_enabled(config.autosave);

  let mut history = ChatSession::new();
  if let Some(name) = &config.project_name {
    history.set_project_name(name);
  }
  let skip = Arc::new(Notify::new());
  spawn_printer(history.subscribe(), skip.clone());
  for message in history.messages() {
    println!("{}", message.content);
  }

  let mut session = Session {
    chat: ChatClient::new(&config.backend),
    config,
    bridge,
    workspace,
    autosave,
    history,
    frame: PreviewFrame::new(),
    pane: PreviewPane::default(),
  };

  let mut lines = BufReader::new(tokio::io::stdin()).lines();
  while let Some(line) = lines.next_line().await? {
    skip.notify_waiters();
    let Some(command) = Command::parse(&line) else {
      continue;
    };
    if !session.handle(command).await {
      break;
    }
  }

  Ok(())
}
