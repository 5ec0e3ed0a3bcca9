//! The file set: the three text assets that make up an edited project.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

pub const INDEX_HTML: &str = "index.html";
pub const STYLES_CSS: &str = "styles.css";
pub const SCRIPT_JS: &str = "script.js";

/// Every file a complete project is expected to carry.
pub const FILE_NAMES: [&str; 3] = [INDEX_HTML, STYLES_CSS, SCRIPT_JS];

/// Filename -> content. Serializes as a flat JSON object.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileSet(BTreeMap<String, String>);

impl FileSet {
  pub fn new() -> Self {
    Self::default()
  }

  /// The default spinning-cube project used to seed an empty directory.
  pub fn starter() -> Self {
    [
      (INDEX_HTML, STARTER_HTML),
      (STYLES_CSS, STARTER_CSS),
      (SCRIPT_JS, STARTER_JS),
    ]
    .into_iter()
    .collect()
  }

  pub fn get(&self, name: &str) -> Option<&str> {
    self.0.get(name).map(String::as_str)
  }

  pub fn contains(&self, name: &str) -> bool {
    self.0.contains_key(name)
  }

  /// Inserts or replaces a file, returning the previous content.
  pub fn insert(
    &mut self,
    name: impl Into<String>,
    content: impl Into<String>,
  ) -> Option<String> {
    self.0.insert(name.into(), content.into())
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
    self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
  }

  pub fn names(&self) -> impl Iterator<Item = &str> {
    self.0.keys().map(String::as_str)
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  /// Well-known files absent from this set.
  pub fn missing(&self) -> Vec<&'static str> {
    FILE_NAMES
      .iter()
      .copied()
      .filter(|name| !self.contains(name))
      .collect()
  }

  /// Logs a warning for every missing well-known file. Never fails.
  pub fn warn_missing(&self, context: &str) {
    for name in self.missing() {
      warn!(file = name, "{context}: {name} is missing from the file set");
    }
  }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FileSet {
  fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
    Self(
      iter
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect(),
    )
  }
}

/// True for a bare file name that cannot escape its directory.
pub fn is_plain_name(name: &str) -> bool {
  !name.is_empty()
    && name != "."
    && name != ".."
    && !name.contains(['/', '\\', '\0'])
}

const STARTER_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
  <title>3D Model Preview</title>
  <style>
    #cube {
      width: 100px;
      height: 100px;
      background: #61dafb;
      margin: 50px auto;
      transform-style: preserve-3d;
      animation: rotate 5s infinite linear;
    }

    @keyframes rotate {
      from { transform: rotateX(0) rotateY(0); }
      to { transform: rotateX(360deg) rotateY(360deg); }
    }
  </style>
  <link rel="stylesheet" href="styles.css">
</head>
<body>
  <div class="container">
    <h2>3D Model Preview</h2>
    <div id="cube"></div>
  </div>
  <script src="script.js"></script>
</body>
</html>
"#;

const STARTER_CSS: &str = r#".container {
  text-align: center;
  padding: 20px;
}

h2 {
  color: #61dafb;
  font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, sans-serif;
}
"#;

const STARTER_JS: &str = r#"console.log("3D model loaded");

document.addEventListener('DOMContentLoaded', () => {
  const cube = document.getElementById('cube');
  if (cube) {
    console.log('Cube initialized');
  }
});
"#;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn starter_has_every_well_known_file() {
    let files = FileSet::starter();
    assert!(files.missing().is_empty());
    assert!(files.get(INDEX_HTML).unwrap().contains(r#"href="styles.css""#));
    assert!(files.get(INDEX_HTML).unwrap().contains(r#"src="script.js""#));
  }

  #[test]
  fn missing_lists_absent_files_in_order() {
    let files: FileSet = [(STYLES_CSS, "h1{}")].into_iter().collect();
    assert_eq!(files.missing(), vec![INDEX_HTML, SCRIPT_JS]);
  }

  #[test]
  fn serializes_as_flat_object() {
    let files: FileSet = [(INDEX_HTML, "<h1>hi</h1>")].into_iter().collect();
    let json = serde_json::to_value(&files).unwrap();
    assert_eq!(json, serde_json::json!({ "index.html": "<h1>hi</h1>" }));

    let back: FileSet = serde_json::from_value(json).unwrap();
    assert_eq!(back, files);
  }

  #[test]
  fn insert_returns_previous_content() {
    let mut files = FileSet::new();
    assert_eq!(files.insert(SCRIPT_JS, "a"), None);
    assert_eq!(files.insert(SCRIPT_JS, "b"), Some("a".to_string()));
    assert_eq!(files.len(), 1);
  }

  #[test]
  fn plain_names() {
    assert!(is_plain_name("index.html"));
    assert!(is_plain_name(".hidden"));
    assert!(!is_plain_name(""));
    assert!(!is_plain_name(".."));
    assert!(!is_plain_name("../etc/passwd"));
    assert!(!is_plain_name("dir\\file.js"));
  }
}
