//! prototyp3d: edit, preview and AI-iterate small HTML/CSS/JS projects.
//!
//! The server half stores the project files behind `/api/load` and
//! `/api/save`; the client half keeps an in-memory copy in sync, autosaves
//! it, compiles previews and talks to the prototype backend.

pub mod autosave;
pub mod bridge;
pub mod chat;
pub mod error;
pub mod files;
pub mod keys;
pub mod preview;
pub mod progress;
pub mod server;
pub mod session;
pub mod store;
pub mod sync;
pub mod typing;

pub use bridge::{FileBridge, HttpBridge};
pub use chat::{ChatClient, ChatMessage, ChatSession};
pub use error::{BridgeError, ChatError, PreviewError, StoreError};
pub use files::FileSet;
pub use store::DirStore;
pub use sync::Workspace;
