//! Development server: static output, live reload socket and script
//! injection.

use std::net::SocketAddr;
use std::path::PathBuf;

use axum::{
    body::Body,
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Request, State,
    },
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tower_http::services::ServeDir;

use crate::websocket::{reload_client_script, ReloadHub, ReloadMessage};

/// WebSocket endpoint browsers connect to.
pub const RELOAD_SOCKET_PATH: &str = "/__livereload";

/// Client script injected into every HTML page.
pub const RELOAD_SCRIPT_PATH: &str = "/__livereload.js";

/// Configuration for the development server.
#[derive(Debug, Clone)]
pub struct DevServerConfig {
    /// Directory to serve
    pub root: PathBuf,

    /// Port to listen on
    pub port: u16,

    /// Host to bind to
    pub host: String,

    /// Open browser on start
    pub open: bool,
}

impl Default for DevServerConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("dist"),
            port: 3000,
            host: "127.0.0.1".to_string(),
            open: false,
        }
    }
}

/// Errors that can occur with the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Invalid listen address {0}")]
    InvalidAddress(String),

    #[error("Failed to bind to {0}: {1}")]
    BindError(SocketAddr, String),

    #[error("Server error on {0}: {1}")]
    ServeError(SocketAddr, String),

    #[error("File watch error: {0}")]
    WatchError(String),
}

/// Development server.
pub struct DevServer {
    config: DevServerConfig,
    hub: ReloadHub,
}

impl DevServer {
    /// Create a server that forwards `hub` messages to browsers.
    pub fn new(config: DevServerConfig, hub: ReloadHub) -> Self {
        Self { config, hub }
    }

    pub fn config(&self) -> &DevServerConfig {
        &self.config
    }

    /// Start the development server. Runs until the listener fails.
    pub async fn start(self) -> Result<(), ServerError> {
        let address = format!("{}:{}", self.config.host, self.config.port);
        let addr: SocketAddr = address
            .parse()
            .map_err(|_| ServerError::InvalidAddress(address.clone()))?;

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::BindError(addr, e.to_string()))?;

        tracing::info!(
            "Serving {} at http://{}",
            self.config.root.display(),
            addr
        );

        if self.config.open {
            let url = format!("http://{}", addr);
            if let Err(e) = open::that(&url) {
                tracing::warn!("Failed to open browser: {}", e);
            }
        }

        axum::serve(listener, router(self.config.root, self.hub))
            .await
            .map_err(|e| ServerError::ServeError(addr, e.to_string()))
    }
}

/// Routes: the reload socket and script, everything else from `root`.
pub fn router(root: PathBuf, hub: ReloadHub) -> Router {
    Router::new()
        .route(RELOAD_SOCKET_PATH, get(ws_handler))
        .route(RELOAD_SCRIPT_PATH, get(reload_script_handler))
        .fallback_service(ServeDir::new(root))
        .layer(middleware::from_fn(inject_reload_script))
        .with_state(hub)
}

/// Handler for the reload WebSocket endpoint.
async fn ws_handler(ws: WebSocketUpgrade, State(hub): State<ReloadHub>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, hub))
}

/// Forward hub messages to one client until it disconnects.
async fn handle_ws(mut socket: WebSocket, hub: ReloadHub) {
    let mut rx = hub.subscribe();

    if !send_message(&mut socket, &ReloadMessage::Connected).await {
        return;
    }

    while let Ok(msg) = rx.recv().await {
        if !send_message(&mut socket, &msg).await {
            break;
        }
    }
}

async fn send_message(socket: &mut WebSocket, msg: &ReloadMessage) -> bool {
    let json = match serde_json::to_string(msg) {
        Ok(json) => json,
        Err(e) => {
            tracing::warn!("Failed to encode reload message: {}", e);
            return true;
        }
    };
    socket.send(Message::Text(json.into())).await.is_ok()
}

/// Handler for the live reload client script.
async fn reload_script_handler() -> impl IntoResponse {
    let script = reload_client_script(RELOAD_SOCKET_PATH);
    ([(header::CONTENT_TYPE, "application/javascript")], script)
}

/// Add the reload script to successful HTML responses.
async fn inject_reload_script(request: Request, next: Next) -> Response {
    let response = next.run(request).await;

    let is_html = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("text/html"));
    if response.status() != StatusCode::OK || !is_html {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!("Failed to read HTML response: {}", e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let html = inject_script_tag(&String::from_utf8_lossy(&bytes));
    parts.headers.remove(header::CONTENT_LENGTH);
    Response::from_parts(parts, Body::from(html))
}

/// Insert the reload `<script>` before the last `</body>`, or append it.
pub fn inject_script_tag(html: &str) -> String {
    let tag = format!("<script src=\"{}\"></script>", RELOAD_SCRIPT_PATH);

    match html.to_ascii_lowercase().rfind("</body>") {
        Some(at) => format!("{}{}{}", &html[..at], tag, &html[at..]),
        None => format!("{}{}", html, tag),
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;

    #[test]
    fn creates_server_with_default_config() {
        let server = DevServer::new(DevServerConfig::default(), ReloadHub::new());
        assert_eq!(server.config().port, 3000);
        assert_eq!(server.config().host, "127.0.0.1");
        assert!(!server.config().open);
    }

    #[test]
    fn injects_before_closing_body() {
        assert_eq!(
            inject_script_tag("<html><BODY><p>x</p></BODY></html>"),
            "<html><BODY><p>x</p><script src=\"/__livereload.js\"></script></BODY></html>"
        );
        assert_eq!(
            inject_script_tag("<p>fragment</p>"),
            "<p>fragment</p><script src=\"/__livereload.js\"></script>"
        );
    }

    async fn http_get(addr: SocketAddr, path: &str) -> String {
        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        let request = format!(
            "GET {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n",
            path, addr
        );
        stream.write_all(request.as_bytes()).await.unwrap();

        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    async fn serve(root: PathBuf) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(root, ReloadHub::new())).await.unwrap();
        });
        addr
    }

    #[tokio::test]
    async fn serves_output_with_reload_script() {
        let temp = tempdir().unwrap();
        fs::write(
            temp.path().join("index.html"),
            "<html><body><h1>Hi</h1></body></html>",
        )
        .unwrap();
        fs::create_dir_all(temp.path().join("css")).unwrap();
        fs::write(temp.path().join("css/style.css"), "body{margin:0}").unwrap();

        let addr = serve(temp.path().to_path_buf()).await;

        let page = http_get(addr, "/").await;
        assert!(page.starts_with("HTTP/1.1 200"));
        assert!(page.contains("<h1>Hi</h1><script src=\"/__livereload.js\"></script></body>"));

        let css = http_get(addr, "/css/style.css").await;
        assert!(css.contains("body{margin:0}"));
        assert!(!css.contains("__livereload"));

        let script = http_get(addr, RELOAD_SCRIPT_PATH).await;
        assert!(script.contains("application/javascript"));
        assert!(script.contains("WebSocket"));

        let missing = http_get(addr, "/nope.html").await;
        assert!(missing.starts_with("HTTP/1.1 404"));
    }
}
