//! Turns a [`FileSet`] into one renderable HTML document.
//!
//! Only the first literal `href="styles.css"` and the first literal
//! `src="script.js"` are rewritten. Other quoting styles and repeated tags
//! are left as they are.

use std::path::Path;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use tracing::error;

use crate::error::PreviewError;
use crate::files::{FileSet, INDEX_HTML, SCRIPT_JS, STYLES_CSS};

pub const STYLES_REF: &str = r#"href="styles.css""#;
pub const SCRIPT_REF: &str = r#"src="script.js""#;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AssetMode {
  /// Embed the assets as `data:` URLs; the result needs no server.
  Inline,
  /// Point at files served under this base, e.g. `/static/product/`.
  StaticBase(String),
}

impl AssetMode {
  fn urls(&self, files: &FileSet) -> (String, String) {
    match self {
      AssetMode::Inline => (
        data_url("text/css", files.get(STYLES_CSS).unwrap_or_default()),
        data_url("text/javascript", files.get(SCRIPT_JS).unwrap_or_default()),
      ),
      AssetMode::StaticBase(base) => {
        (format!("{base}{STYLES_CSS}"), format!("{base}{SCRIPT_JS}"))
      }
    }
  }
}

fn data_url(mime: &str, content: &str) -> String {
  format!("data:{mime};base64,{}", STANDARD.encode(content))
}

pub fn compile(files: &FileSet, mode: &AssetMode) -> Result<String, PreviewError> {
  let Some(html) = files.get(INDEX_HTML) else {
    error!("cannot compile preview: {INDEX_HTML} is missing");
    return Err(PreviewError::MissingIndex);
  };

  let (css_url, js_url) = mode.urls(files);
  Ok(
    html
      .replacen(STYLES_REF, &format!(r#"href="{css_url}""#), 1)
      .replacen(SCRIPT_REF, &format!(r#"src="{js_url}""#), 1),
  )
}

/// The isolated rendering context. Each render throws away whatever the
/// previous one produced.
#[derive(Debug, Default)]
pub struct PreviewFrame {
  document: Option<String>,
  generation: u64,
}

impl PreviewFrame {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn render(
    &mut self,
    files: &FileSet,
    mode: &AssetMode,
  ) -> Result<&str, PreviewError> {
    self.document = None;
    self.generation += 1;
    let html = compile(files, mode)?;
    Ok(self.document.insert(html).as_str())
  }

  pub fn document(&self) -> Option<&str> {
    self.document.as_deref()
  }

  /// How many frames have been created so far.
  pub fn generation(&self) -> u64 {
    self.generation
  }

  pub fn write_to(&self, path: &Path) -> Result<(), PreviewError> {
    std::fs::write(path, self.document().unwrap_or_default()).map_err(|source| {
      PreviewError::Write {
        path: path.to_path_buf(),
        source,
      }
    })
  }
}
