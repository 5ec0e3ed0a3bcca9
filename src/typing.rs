//! Typed-text animation: reveals a finished message a chunk at a time.
//!
//! The animation only drives what is displayed. The message it reveals is
//! already complete in the chat history.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Characters revealed per step.
pub const CHUNK_SIZE: usize = 50;
/// Delay per character of the chunk just revealed.
pub const PER_CHAR_DELAY: Duration = Duration::from_millis(1);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Frame<'a> {
  pub text: &'a str,
  pub done: bool,
}

/// What is on screen after `chunks` steps of `chunk_size` characters each.
pub fn reveal(full: &str, chunks: usize, chunk_size: usize) -> Frame<'_> {
  let wanted = chunks.saturating_mul(chunk_size.max(1));
  let end = full
    .char_indices()
    .nth(wanted)
    .map_or(full.len(), |(idx, _)| idx);
  Frame {
    text: &full[..end],
    done: end == full.len(),
  }
}

/// Pause after showing `chunk`.
pub fn chunk_delay(chunk: &str, per_char: Duration) -> Duration {
  per_char.saturating_mul(chunk.chars().count() as u32)
}

#[derive(Clone, Copy, Debug)]
pub struct Typewriter {
  pub chunk_size: usize,
  pub per_char: Duration,
}

impl Default for Typewriter {
  fn default() -> Self {
    Self {
      chunk_size: CHUNK_SIZE,
      per_char: PER_CHAR_DELAY,
    }
  }
}

impl Typewriter {
  /// Feeds each newly revealed piece of `full` to `on_chunk`, sleeping
  /// between pieces. Returns the number of steps taken.
  pub async fn play<F: FnMut(&str)>(&self, full: &str, mut on_chunk: F) -> usize {
    let mut shown = 0;
    let mut step = 0;
    loop {
      let frame = reveal(full, step, self.chunk_size);
      let piece = &frame.text[shown..];
      if !piece.is_empty() {
        on_chunk(piece);
        tokio::time::sleep(chunk_delay(piece, self.per_char)).await;
      }
      shown = frame.text.len();
      if frame.done {
        return step;
      }
      step += 1;
    }
  }

  /// Runs [`Typewriter::play`] as a task, sending each piece on `out`.
  pub fn spawn(self, full: String, out: mpsc::UnboundedSender<String>) -> TypingHandle {
    let task = tokio::spawn(async move {
      self
        .play(&full, |piece| {
          let _ = out.send(piece.to_string());
        })
        .await;
    });
    TypingHandle { task }
  }
}

pub struct TypingHandle {
  task: JoinHandle<()>,
}

impl TypingHandle {
  /// Stops revealing. Text already sent stays sent.
  pub fn cancel(&self) {
    self.task.abort();
  }
}
