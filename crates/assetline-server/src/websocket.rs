//! WebSocket-based live reload.

use std::path::{Path, PathBuf};

use assetline_pipeline::{AssetKind, OutputListener, TaskError, TaskReport};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Messages sent to connected browsers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReloadMessage {
    /// Connection established
    Connected,

    /// Full page reload
    Reload,

    /// Swap stylesheets without reloading
    InjectCss {
        /// URL paths of the rebuilt stylesheets
        paths: Vec<String>,
    },

    /// A task failed; shown as an overlay until the next update
    Error { task: String, message: String },
}

/// Hub for broadcasting reload messages to all connected clients.
#[derive(Debug, Clone)]
pub struct ReloadHub {
    sender: broadcast::Sender<ReloadMessage>,
}

impl ReloadHub {
    /// Create a new hub.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(100);
        Self { sender }
    }

    /// Send a message to all connected clients.
    pub fn send(&self, msg: ReloadMessage) {
        // Ignore send errors (no receivers)
        let _ = self.sender.send(msg);
    }

    /// Subscribe to reload messages.
    pub fn subscribe(&self) -> broadcast::Receiver<ReloadMessage> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ReloadHub {
    fn default() -> Self {
        Self::new()
    }
}

/// Turns task outcomes into reload messages.
///
/// Runs that only rewrote stylesheets are injected in place; anything else
/// reloads the page.
#[derive(Debug, Clone)]
pub struct ReloadNotifier {
    hub: ReloadHub,
    output_root: PathBuf,
}

impl ReloadNotifier {
    pub fn new(hub: ReloadHub, output_root: impl Into<PathBuf>) -> Self {
        Self {
            hub,
            output_root: output_root.into(),
        }
    }

    /// The message for a successful run, if it wrote anything.
    pub fn message_for(&self, report: &TaskReport) -> Option<ReloadMessage> {
        if report.artifacts.is_empty() {
            return None;
        }

        let only_css = report.artifacts.iter().all(|a| a.kind == AssetKind::Css);
        if !only_css {
            return Some(ReloadMessage::Reload);
        }

        let paths = report
            .artifacts
            .iter()
            .filter(|a| a.path.extension().is_some_and(|e| e == "css"))
            .filter_map(|a| url_path(&self.output_root, &a.path))
            .collect();
        Some(ReloadMessage::InjectCss { paths })
    }
}

impl OutputListener for ReloadNotifier {
    fn task_succeeded(&self, report: &TaskReport) {
        if let Some(msg) = self.message_for(report) {
            tracing::debug!("Notifying {} clients: {:?}", self.hub.subscriber_count(), msg);
            self.hub.send(msg);
        }
    }

    fn task_failed(&self, task: &'static str, error: &TaskError) {
        self.hub.send(ReloadMessage::Error {
            task: task.to_string(),
            message: error.to_string(),
        });
    }
}

/// `/css/style.css` for `<root>/css/style.css`.
fn url_path(root: &Path, file: &Path) -> Option<String> {
    let relative = file.strip_prefix(root).ok()?;
    let segments: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Some(format!("/{}", segments.join("/")))
}

/// Client-side live reload script.
///
/// Connects back to the host that served the page, so it works for any
/// bind address.
pub fn reload_client_script(ws_path: &str) -> String {
    format!(
        r#"
(function() {{
  'use strict';

  const protocol = location.protocol === 'https:' ? 'wss:' : 'ws:';
  const ws = new WebSocket(protocol + '//' + location.host + '{}');
  let reconnectAttempts = 0;
  const maxReconnectAttempts = 10;
  const overlayId = '__assetline-error';

  function clearOverlay() {{
    const overlay = document.getElementById(overlayId);
    if (overlay) {{
      overlay.remove();
    }}
  }}

  function showOverlay(task, message) {{
    clearOverlay();
    const overlay = document.createElement('pre');
    overlay.id = overlayId;
    overlay.style.cssText = 'position:fixed;inset:0;margin:0;padding:2rem;z-index:2147483647;' +
      'background:rgba(20,0,0,.92);color:#ffb4b4;font:14px/1.5 monospace;white-space:pre-wrap;overflow:auto';
    overlay.textContent = '[' + task + '] ' + message;
    overlay.addEventListener('click', clearOverlay);
    document.body.appendChild(overlay);
  }}

  function injectCss(paths) {{
    const links = document.querySelectorAll('link[rel="stylesheet"]');
    let swapped = 0;
    links.forEach(function(link) {{
      const url = new URL(link.href, location.href);
      if (url.host === location.host && paths.indexOf(url.pathname) !== -1) {{
        url.searchParams.set('v', Date.now());
        link.href = url.toString();
        swapped++;
      }}
    }});
    if (swapped === 0) {{
      location.reload();
    }}
  }}

  ws.onopen = function() {{
    console.log('[livereload] Connected');
    reconnectAttempts = 0;
  }};

  ws.onmessage = function(event) {{
    const msg = JSON.parse(event.data);

    switch (msg.type) {{
      case 'reload':
        location.reload();
        break;

      case 'inject_css':
        clearOverlay();
        injectCss(msg.paths);
        break;

      case 'error':
        showOverlay(msg.task, msg.message);
        break;

      case 'connected':
        console.log('[livereload] Server acknowledged connection');
        break;
    }}
  }};

  ws.onclose = function() {{
    console.log('[livereload] Disconnected');
    if (reconnectAttempts < maxReconnectAttempts) {{
      reconnectAttempts++;
      setTimeout(function() {{
        console.log('[livereload] Reconnecting...');
        location.reload();
      }}, 1000 * reconnectAttempts);
    }}
  }};

  ws.onerror = function(e) {{
    console.error('[livereload] WebSocket error:', e);
  }};
}})();
"#,
        ws_path
    )
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use assetline_pipeline::Artifact;

    use super::*;

    fn report(task: &'static str, artifacts: Vec<Artifact>) -> TaskReport {
        TaskReport {
            task,
            artifacts,
            duration_ms: 1,
        }
    }

    #[test]
    fn hub_broadcasts_messages() {
        let hub = ReloadHub::new();
        let mut rx = hub.subscribe();

        hub.send(ReloadMessage::Reload);

        match rx.try_recv() {
            Ok(ReloadMessage::Reload) => {}
            _ => panic!("Expected Reload message"),
        }
    }

    #[test]
    fn serializes_messages() {
        let msg = ReloadMessage::InjectCss {
            paths: vec!["/css/style.css".to_string()],
        };
        assert_eq!(
            serde_json::to_string(&msg).unwrap(),
            r#"{"type":"inject_css","paths":["/css/style.css"]}"#
        );

        let msg = ReloadMessage::Error {
            task: "css".to_string(),
            message: "boom".to_string(),
        };
        assert!(serde_json::to_string(&msg).unwrap().contains(r#""type":"error""#));
    }

    #[test]
    fn stylesheet_runs_inject_css() {
        let notifier = ReloadNotifier::new(ReloadHub::new(), "dist");
        let report = report(
            "css",
            vec![
                Artifact::new(AssetKind::Css, "dist/css/style.css"),
                Artifact::minified(AssetKind::Css, "dist/css/style.min.css"),
            ],
        );

        assert_eq!(
            notifier.message_for(&report),
            Some(ReloadMessage::InjectCss {
                paths: vec!["/css/style.css".to_string(), "/css/style.min.css".to_string()],
            })
        );
    }

    #[test]
    fn other_runs_reload() {
        let notifier = ReloadNotifier::new(ReloadHub::new(), Path::new("dist"));
        let report = report("html", vec![Artifact::new(AssetKind::Html, "dist/index.html")]);

        assert_eq!(notifier.message_for(&report), Some(ReloadMessage::Reload));
    }

    #[test]
    fn empty_runs_are_silent() {
        let notifier = ReloadNotifier::new(ReloadHub::new(), "dist");
        assert_eq!(notifier.message_for(&report("clean", Vec::new())), None);
    }

    #[test]
    fn failures_become_error_messages() {
        let hub = ReloadHub::new();
        let mut rx = hub.subscribe();
        let notifier = ReloadNotifier::new(hub, "dist");

        notifier.task_failed("js", &TaskError::JoinError("panicked".to_string()));

        match rx.try_recv() {
            Ok(ReloadMessage::Error { task, message }) => {
                assert_eq!(task, "js");
                assert!(message.contains("panicked"));
            }
            other => panic!("Expected Error message, got {:?}", other),
        }
    }

    #[test]
    fn client_script_targets_given_path() {
        let script = reload_client_script("/__livereload");
        assert!(script.contains("location.host + '/__livereload'"));
        assert!(script.contains("inject_css"));
    }
}
