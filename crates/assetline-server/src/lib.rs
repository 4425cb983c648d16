//! Development server with live reload for assetline projects.
//!
//! Serves the build output, watches the sources and pushes reload, CSS
//! injection and error messages to connected browsers over a WebSocket.

pub mod server;
pub mod watcher;
pub mod websocket;

pub use server::{DevServer, DevServerConfig, ServerError};
pub use watcher::{watch_sources, ChangeRouter, FileWatcher};
pub use websocket::{ReloadHub, ReloadMessage, ReloadNotifier};
