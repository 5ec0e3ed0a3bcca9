//! Editor keyboard handling.

/// Spaces inserted by Tab.
pub const INDENT: &str = "  ";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Shortcut {
  /// Tab inside the editor.
  Indent,
  /// Ctrl/Cmd+S.
  Save,
  /// Ctrl/Cmd+Enter.
  RenderPreview,
  /// Escape while the preview is full screen.
  ExitFullscreen,
}

impl Shortcut {
  pub fn from_key(key: &str, ctrl: bool, meta: bool) -> Option<Self> {
    let command = ctrl || meta;
    match key {
      "Tab" if !command => Some(Shortcut::Indent),
      "s" | "S" if command => Some(Shortcut::Save),
      "Enter" if command => Some(Shortcut::RenderPreview),
      "Escape" => Some(Shortcut::ExitFullscreen),
      _ => None,
    }
  }

  /// Parses a spelled-out combination such as `ctrl+s`, `cmd+enter` or `esc`.
  pub fn from_combo(combo: &str) -> Option<Self> {
    let (mut ctrl, mut meta) = (false, false);
    let mut key = None;
    for part in combo.split('+') {
      match part.trim().to_ascii_lowercase().as_str() {
        "ctrl" | "control" => ctrl = true,
        "cmd" | "meta" | "super" => meta = true,
        "tab" => key = Some("Tab"),
        "enter" | "return" => key = Some("Enter"),
        "esc" | "escape" => key = Some("Escape"),
        "s" => key = Some("s"),
        _ => return None,
      }
    }
    Self::from_key(key?, ctrl, meta)
  }

  /// Terminal spelling of the same actions.
  pub fn from_command(command: &str) -> Option<Self> {
    match command {
      "/save" => Some(Shortcut::Save),
      "/run" | "/preview" => Some(Shortcut::RenderPreview),
      "/indent" => Some(Shortcut::Indent),
      "/esc" => Some(Shortcut::ExitFullscreen),
      _ => None,
    }
  }
}

/// Replaces the selection `start..end` (byte offsets, in either order) with
/// [`INDENT`]. Returns the new content and the caret position after it.
/// Offsets are clamped to the content and moved back to char boundaries.
pub fn insert_indent(content: &str, start: usize, end: usize) -> (String, usize) {
  let (start, end) = (start.min(end), start.max(end));
  let start = floor_char_boundary(content, start);
  let end = floor_char_boundary(content, end);

  let mut out = String::with_capacity(content.len() + INDENT.len());
  out.push_str(&content[..start]);
  out.push_str(INDENT);
  out.push_str(&content[end..]);
  (out, start + INDENT.len())
}

/// Byte offset where 1-based `line` starts, if the content has that many lines.
pub fn line_start(content: &str, line: usize) -> Option<usize> {
  if line == 0 {
    return None;
  }
  if line == 1 {
    return Some(0);
  }
  content
    .match_indices('\n')
    .nth(line - 2)
    .map(|(idx, _)| idx + 1)
}

fn floor_char_boundary(s: &str, idx: usize) -> usize {
  let mut idx = idx.min(s.len());
  while !s.is_char_boundary(idx) {
    idx -= 1;
  }
  idx
}

/// Full-screen state of the preview pane.
#[derive(Debug, Default)]
pub struct PreviewPane {
  fullscreen: bool,
}

impl PreviewPane {
  pub fn is_fullscreen(&self) -> bool {
    self.fullscreen
  }

  pub fn toggle_fullscreen(&mut self) {
    self.fullscreen = !self.fullscreen;
  }

  /// Returns whether the shortcut was consumed.
  pub fn handle(&mut self, shortcut: Shortcut) -> bool {
    if shortcut == Shortcut::ExitFullscreen && self.fullscreen {
      self.fullscreen = false;
      return true;
    }
    false
  }
}
