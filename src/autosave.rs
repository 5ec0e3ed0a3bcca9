use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{error, info};

use crate::bridge::FileBridge;
use crate::error::BridgeError;
use crate::sync::Workspace;

pub const AUTOSAVE_INTERVAL: Duration = Duration::from_secs(30);
/// How long the "saved" notice stays up after a successful save.
pub const NOTICE_DURATION: Duration = Duration::from_secs(2);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SaveTrigger {
  /// The save shortcut.
  Manual,
  /// The interval timer.
  Auto,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SaveNotice {
  Saved,
  AutoSaved,
}

impl From<SaveTrigger> for SaveNotice {
  fn from(trigger: SaveTrigger) -> Self {
    match trigger {
      SaveTrigger::Manual => SaveNotice::Saved,
      SaveTrigger::Auto => SaveNotice::AutoSaved,
    }
  }
}

impl fmt::Display for SaveNotice {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      SaveNotice::Saved => write!(f, "Saved to remote instance"),
      SaveNotice::AutoSaved => write!(f, "Auto-saved to remote instance"),
    }
  }
}

#[derive(Clone, Debug)]
pub struct AutosaveStatus {
  pub last_saved: Option<Instant>,
  pub last_trigger: Option<SaveTrigger>,
  pub saving: bool,
  pub enabled: bool,
}

impl Default for AutosaveStatus {
  fn default() -> Self {
    Self {
      last_saved: None,
      last_trigger: None,
      saving: false,
      enabled: true,
    }
  }
}

impl AutosaveStatus {
  /// The notice to display at `now`, if the last successful save is recent.
  pub fn notice(&self, now: Instant) -> Option<SaveNotice> {
    let saved_at = self.last_saved?;
    if now.saturating_duration_since(saved_at) >= NOTICE_DURATION {
      return None;
    }
    self.last_trigger.map(SaveNotice::from)
  }
}

/// Serializes the workspace to the file store, on demand and on a timer.
pub struct Autosave<B> {
  bridge: Arc<B>,
  workspace: Workspace,
  status: Arc<Mutex<AutosaveStatus>>,
  notices: Option<mpsc::UnboundedSender<SaveNotice>>,
}

impl<B> Clone for Autosave<B> {
  fn clone(&self) -> Self {
    Self {
      bridge: self.bridge.clone(),
      workspace: self.workspace.clone(),
      status: self.status.clone(),
      notices: self.notices.clone(),
    }
  }
}

impl<B: FileBridge + 'static> Autosave<B> {
  pub fn new(bridge: Arc<B>, workspace: Workspace) -> Self {
    Self {
      bridge,
      workspace,
      status: Arc::default(),
      notices: None,
    }
  }

  /// Publishes a [`SaveNotice`] after every successful save.
  pub fn with_notices(mut self, notices: mpsc::UnboundedSender<SaveNotice>) -> Self {
    self.notices = Some(notices);
    self
  }

  pub fn status(&self) -> AutosaveStatus {
    self.lock().clone()
  }

  pub fn set_enabled(&self, enabled: bool) {
    self.lock().enabled = enabled;
    info!(enabled, "autosave toggled");
  }

  fn lock(&self) -> std::sync::MutexGuard<'_, AutosaveStatus> {
    self.status.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Saves the current snapshot once. Failures are logged and returned;
  /// nothing is retried.
  pub async fn save_now(&self, trigger: SaveTrigger) -> Result<(), BridgeError> {
    let files = self.workspace.snapshot();
    self.lock().saving = true;

    let result = self.bridge.save(&files).await;

    {
      let mut status = self.lock();
      status.saving = false;
      match &result {
        Ok(()) => {
          status.last_saved = Some(Instant::now());
          status.last_trigger = Some(trigger);
          info!(?trigger, files = files.len(), "files saved");
        }
        Err(e) => error!(?trigger, "Error saving files: {e}"),
      }
    }

    if let (Ok(()), Some(notices)) = (&result, &self.notices) {
      let _ = notices.send(SaveNotice::from(trigger));
    }
    result
  }

  /// Starts the interval timer and the listener for manual save requests.
  pub fn spawn(self, period: Duration) -> AutosaveHandle {
    let (tx, mut rx) = mpsc::channel::<()>(8);
    let status = self.status.clone();

    let task = tokio::spawn(async move {
      let mut ticker = time::interval_at(Instant::now() + period, period);
      ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

      loop {
        tokio::select! {
          _ = ticker.tick() => {
            let enabled = self.lock().enabled;
            if enabled {
              let _ = self.save_now(SaveTrigger::Auto).await;
            }
          }
          request = rx.recv() => match request {
            Some(()) => {
              let _ = self.save_now(SaveTrigger::Manual).await;
            }
            None => break,
          },
        }
      }
    });

    AutosaveHandle { requests: tx, status, task }
  }
}

/// Owner of a running autosave loop. Dropping it stops the timer.
pub struct AutosaveHandle {
  requests: mpsc::Sender<()>,
  status: Arc<Mutex<AutosaveStatus>>,
  task: JoinHandle<()>,
}

impl AutosaveHandle {
  /// Queues a manual save. Requests beyond the queue depth are dropped.
  pub fn request_save(&self) {
    let _ = self.requests.try_send(());
  }

  pub fn status(&self) -> AutosaveStatus {
    self
      .status
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .clone()
  }

  pub fn set_enabled(&self, enabled: bool) {
    self
      .status
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .enabled = enabled;
    info!(enabled, "autosave toggled");
  }
}

impl Drop for AutosaveHandle {
  fn drop(&mut self) {
    self.task.abort();
  }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::Ordering;

  use super::*;
  use crate::bridge::memory::MemoryBridge;
  use crate::files::{FileSet, INDEX_HTML};

  fn workspace(html: &str) -> Workspace {
    Workspace::new([(INDEX_HTML, html)].into_iter().collect::<FileSet>())
  }

  #[tokio::test(start_paused = true)]
  async fn manual_save_persists_and_shows_notice() {
    let bridge = Arc::new(MemoryBridge::default());
    let autosave = Autosave::new(bridge.clone(), workspace("<h1>hi</h1>"));

    autosave.save_now(SaveTrigger::Manual).await.unwrap();
    assert_eq!(bridge.remote().get(INDEX_HTML), Some("<h1>hi</h1>"));

    let status = autosave.status();
    assert!(!status.saving);
    assert_eq!(status.notice(Instant::now()), Some(SaveNotice::Saved));

    time::advance(NOTICE_DURATION).await;
    assert_eq!(autosave.status().notice(Instant::now()), None);
  }

  #[tokio::test(start_paused = true)]
  async fn failed_save_leaves_status_untouched() {
    let bridge = Arc::new(MemoryBridge::default());
    bridge.fail.store(true, Ordering::SeqCst);
    let autosave = Autosave::new(bridge.clone(), workspace("x"));

    assert!(autosave.save_now(SaveTrigger::Manual).await.is_err());
    let status = autosave.status();
    assert!(status.last_saved.is_none());
    assert!(!status.saving);
    assert_eq!(bridge.saves.load(Ordering::SeqCst), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn timer_saves_every_interval() {
    let bridge = Arc::new(MemoryBridge::default());
    let ws = workspace("v1");
    let handle = Autosave::new(bridge.clone(), ws.clone()).spawn(AUTOSAVE_INTERVAL);

    time::sleep(Duration::from_secs(29)).await;
    assert_eq!(bridge.saves.load(Ordering::SeqCst), 0);

    time::sleep(Duration::from_secs(2)).await;
    assert_eq!(bridge.saves.load(Ordering::SeqCst), 1);
    assert_eq!(handle.status().notice(Instant::now()), Some(SaveNotice::AutoSaved));

    ws.edit(INDEX_HTML, "v2");
    time::sleep(Duration::from_secs(30)).await;
    assert_eq!(bridge.saves.load(Ordering::SeqCst), 2);
    assert_eq!(bridge.remote().get(INDEX_HTML), Some("v2"));
  }

  #[tokio::test(start_paused = true)]
  async fn disabled_timer_still_honours_manual_saves() {
    let bridge = Arc::new(MemoryBridge::default());
    let handle = Autosave::new(bridge.clone(), workspace("x")).spawn(AUTOSAVE_INTERVAL);
    handle.set_enabled(false);

    time::sleep(Duration::from_secs(61)).await;
    assert_eq!(bridge.saves.load(Ordering::SeqCst), 0);

    handle.request_save();
    time::sleep(Duration::from_millis(10)).await;
    assert_eq!(bridge.saves.load(Ordering::SeqCst), 1);
    assert_eq!(handle.status().last_trigger, Some(SaveTrigger::Manual));
  }

  #[tokio::test(start_paused = true)]
  async fn successful_saves_publish_notices() {
    let bridge = Arc::new(MemoryBridge::default());
    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle = Autosave::new(bridge.clone(), workspace("x"))
      .with_notices(tx)
      .spawn(AUTOSAVE_INTERVAL);

    handle.request_save();
    time::sleep(Duration::from_millis(10)).await;
    assert_eq!(rx.try_recv(), Ok(SaveNotice::Saved));

    time::sleep(AUTOSAVE_INTERVAL).await;
    assert_eq!(rx.try_recv(), Ok(SaveNotice::AutoSaved));

    bridge.fail.store(true, Ordering::SeqCst);
    handle.request_save();
    time::sleep(Duration::from_millis(10)).await;
    assert!(rx.try_recv().is_err());
  }

  #[test]
  fn notice_text() {
    assert_eq!(SaveNotice::Saved.to_string(), "Saved to remote instance");
    assert_eq!(SaveNotice::AutoSaved.to_string(), "Auto-saved to remote instance");
  }
}
