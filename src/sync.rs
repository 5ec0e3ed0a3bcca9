//! Shared in-memory file set and the loop that keeps it in step with the
//! file store.
//!
//! Merging is last-fetch-wins: a poll that sees remote content differing from
//! local content replaces the whole local set, unsaved edits included.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::bridge::FileBridge;
use crate::error::BridgeError;
use crate::files::FileSet;

pub const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Outcome of applying a fetched file set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Merge {
  /// Nothing differed; the local set kept its identity.
  Unchanged,
  /// The local set was replaced. Lists the files whose content changed.
  Replaced { changed: Vec<String> },
}

/// The editor's current files, shared between the user, autosave and the
/// poll loop. Cloning shares the same state.
#[derive(Clone, Debug, Default)]
pub struct Workspace {
  files: Arc<RwLock<Arc<FileSet>>>,
}

impl Workspace {
  pub fn new(files: FileSet) -> Self {
    Self {
      files: Arc::new(RwLock::new(Arc::new(files))),
    }
  }

  pub fn snapshot(&self) -> Arc<FileSet> {
    self
      .files
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .clone()
  }

  /// A local edit of one file.
  pub fn edit(&self, name: &str, content: impl Into<String>) {
    let mut guard = self.files.write().unwrap_or_else(PoisonError::into_inner);
    Arc::make_mut(&mut guard).insert(name, content);
  }

  /// Replaces everything, e.g. after the initial load.
  pub fn replace(&self, files: FileSet) {
    *self.files.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(files);
  }

  pub fn apply_remote(&self, fetched: FileSet) -> Merge {
    let mut guard = self.files.write().unwrap_or_else(PoisonError::into_inner);
    let changed: Vec<String> = fetched
      .iter()
      .filter(|(name, content)| guard.get(name) != Some(*content))
      .map(|(name, _)| name.to_string())
      .collect();

    if changed.is_empty() {
      return Merge::Unchanged;
    }
    *guard = Arc::new(fetched);
    Merge::Replaced { changed }
  }
}

/// One fetch-and-merge round.
pub async fn poll_once<B: FileBridge>(
  bridge: &B,
  workspace: &Workspace,
) -> Result<Merge, BridgeError> {
  let fetched = bridge.load().await?;
  fetched.warn_missing("poll");
  Ok(workspace.apply_remote(fetched))
}

/// Periodic [`poll_once`]. The timer stops when this is dropped.
pub struct PollLoop {
  task: JoinHandle<()>,
}

impl PollLoop {
  /// Starts polling one `period` from now. Merge outcomes that replaced the
  /// local set are sent on `events` when given.
  pub fn spawn<B: FileBridge + 'static>(
    bridge: Arc<B>,
    workspace: Workspace,
    period: Duration,
    events: Option<mpsc::UnboundedSender<Merge>>,
  ) -> Self {
    let task = tokio::spawn(async move {
      let mut ticker = time::interval_at(Instant::now() + period, period);
      ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
      info!(?period, "poll loop started");

      loop {
        ticker.tick().await;
        match poll_once(bridge.as_ref(), &workspace).await {
          Ok(Merge::Unchanged) => debug!("poll: no remote changes"),
          Ok(merge) => {
            debug!(?merge, "poll: remote changes merged");
            if let Some(tx) = &events {
              let _ = tx.send(merge);
            }
          }
          Err(e) => error!("Error checking for file changes: {e}"),
        }
      }
    });
    Self { task }
  }

  pub fn stop(&self) {
    self.task.abort();
  }
}

impl Drop for PollLoop {
  fn drop(&mut self) {
    self.task.abort();
  }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::Ordering;

  use super::*;
  use crate::bridge::memory::MemoryBridge;
  use crate::files::{INDEX_HTML, SCRIPT_JS, STYLES_CSS};

  fn set(html: &str, css: &str, js: &str) -> FileSet {
    [(INDEX_HTML, html), (STYLES_CSS, css), (SCRIPT_JS, js)]
      .into_iter()
      .collect()
  }

  #[test]
  fn unchanged_poll_keeps_identity() {
    let workspace = Workspace::new(set("a", "b", "c"));
    let before = workspace.snapshot();

    assert_eq!(workspace.apply_remote(set("a", "b", "c")), Merge::Unchanged);
    assert!(Arc::ptr_eq(&before, &workspace.snapshot()));
  }

  #[test]
  fn changed_poll_replaces_wholesale() {
    let workspace = Workspace::new(set("a", "b", "c"));
    let before = workspace.snapshot();

    let merge = workspace.apply_remote(set("a", "B", "c"));
    assert_eq!(
      merge,
      Merge::Replaced {
        changed: vec![STYLES_CSS.to_string()]
      }
    );
    assert!(!Arc::ptr_eq(&before, &workspace.snapshot()));
    assert_eq!(*workspace.snapshot(), set("a", "B", "c"));
  }

  #[test]
  fn remote_wins_over_unsaved_local_edit() {
    let workspace = Workspace::new(set("a", "b", "c"));
    workspace.edit(SCRIPT_JS, "local edit");

    workspace.apply_remote(set("a2", "b", "c"));
    assert_eq!(workspace.snapshot().get(SCRIPT_JS), Some("c"));
  }

  #[test]
  fn subset_matching_local_is_unchanged() {
    let workspace = Workspace::new(set("a", "b", "c"));
    let fetched: FileSet = [(INDEX_HTML, "a")].into_iter().collect();
    assert_eq!(workspace.apply_remote(fetched), Merge::Unchanged);
    assert_eq!(workspace.snapshot().len(), 3);
  }

  #[test]
  fn edit_does_not_disturb_earlier_snapshots() {
    let workspace = Workspace::new(set("a", "b", "c"));
    let before = workspace.snapshot();
    workspace.edit(INDEX_HTML, "z");
    assert_eq!(before.get(INDEX_HTML), Some("a"));
    assert_eq!(workspace.snapshot().get(INDEX_HTML), Some("z"));
  }

  #[tokio::test(start_paused = true)]
  async fn loop_picks_up_remote_changes() {
    let bridge = Arc::new(MemoryBridge::with_files(set("a", "b", "c")));
    let workspace = Workspace::new(set("a", "b", "c"));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let _poll = PollLoop::spawn(bridge.clone(), workspace.clone(), POLL_INTERVAL, Some(tx));

    time::sleep(Duration::from_secs(6)).await;
    assert_eq!(bridge.loads.load(Ordering::SeqCst), 1);
    assert!(rx.try_recv().is_err());

    bridge.set_remote(set("a", "b", "regenerated"));
    let merge = rx.recv().await.unwrap();
    assert_eq!(
      merge,
      Merge::Replaced {
        changed: vec![SCRIPT_JS.to_string()]
      }
    );
    assert_eq!(workspace.snapshot().get(SCRIPT_JS), Some("regenerated"));
  }

  #[tokio::test(start_paused = true)]
  async fn loop_survives_failed_polls() {
    let bridge = Arc::new(MemoryBridge::with_files(set("a", "b", "c")));
    bridge.fail.store(true, Ordering::SeqCst);
    let workspace = Workspace::new(set("x", "y", "z"));
    let _poll = PollLoop::spawn(bridge.clone(), workspace.clone(), POLL_INTERVAL, None);

    time::sleep(Duration::from_secs(11)).await;
    assert_eq!(bridge.loads.load(Ordering::SeqCst), 2);
    assert_eq!(workspace.snapshot().get(INDEX_HTML), Some("x"));

    bridge.fail.store(false, Ordering::SeqCst);
    time::sleep(Duration::from_secs(5)).await;
    assert_eq!(workspace.snapshot().get(INDEX_HTML), Some("a"));
  }

  #[tokio::test(start_paused = true)]
  async fn dropping_the_loop_stops_polling() {
    let bridge = Arc::new(MemoryBridge::with_files(set("a", "b", "c")));
    let poll = PollLoop::spawn(bridge.clone(), Workspace::default(), POLL_INTERVAL, None);
    drop(poll);

    time::sleep(Duration::from_secs(20)).await;
    assert_eq!(bridge.loads.load(Ordering::SeqCst), 0);
  }
}
