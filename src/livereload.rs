//! LiveReload protocol server.
//!
//! Browsers (through the LiveReload extension or `livereload.js`) open a
//! WebSocket to `ws://<host>:35729/livereload` and exchange `hello`
//! handshakes. When a watched output changes, every connected client is
//! told to reload that path; style sheets are swapped in place.
//!
//! ```text
//! ┌──────────────┐  accept   ┌────────────────┐  mpsc   ┌─────────────┐
//! │ TcpListener  │──────────▶│ client thread  │◀────────│ Hub         │
//! │ (accept loop)│  per peer │ (ws read/send) │ payload │ (broadcast) │
//! └──────────────┘           └────────────────┘         └─────────────┘
//! ```

use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::Path;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use serde::Serialize;
use tungstenite::{Message, WebSocket};

use crate::error::TaskError;

/// Protocol identifier announced in the handshake
pub const PROTOCOL: &str = "http://livereload.com/protocols/official-7";

/// How often a client thread checks for outgoing messages
const CLIENT_POLL: Duration = Duration::from_millis(100);

/// Server to client commands
#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(tag = "command", rename_all = "lowercase")]
pub enum ServerCommand {
    Hello {
        protocols: Vec<String>,
        #[serde(rename = "serverName")]
        server_name: String,
    },
    Reload {
        path: String,
        #[serde(rename = "liveCSS")]
        live_css: bool,
        #[serde(rename = "liveImg")]
        live_img: bool,
    },
}

impl ServerCommand {
    pub fn hello() -> Self {
        ServerCommand::Hello {
            protocols: vec![PROTOCOL.to_string()],
            server_name: env!("CARGO_PKG_NAME").to_string(),
        }
    }

    pub fn reload(path: &Path) -> Self {
        ServerCommand::Reload {
            path: path.to_string_lossy().to_string(),
            live_css: true,
            live_img: true,
        }
    }

    pub fn to_json(&self) -> String {
        // Serializing a plain tagged enum of strings and bools cannot fail
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Whether a client frame is a protocol `hello`
pub fn is_hello(text: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(text)
        .ok()
        .and_then(|v| v.get("command").and_then(|c| c.as_str()).map(|c| c == "hello"))
        .unwrap_or(false)
}

/// Fan-out of reload notifications to connected clients
#[derive(Debug, Clone, Default)]
pub struct Hub {
    clients: Arc<Mutex<Vec<Sender<String>>>>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client, returns its outgoing message queue
    pub fn register(&self) -> Receiver<String> {
        let (tx, rx) = mpsc::channel();
        if let Ok(mut clients) = self.clients.lock() {
            clients.push(tx);
        }
        rx
    }

    /// Connected client count
    pub fn client_count(&self) -> usize {
        self.clients.lock().map(|c| c.len()).unwrap_or(0)
    }

    /// Send `command` to every client, dropping disconnected ones.
    /// Returns how many clients were notified.
    pub fn broadcast(&self, command: &ServerCommand) -> usize {
        let payload = command.to_json();
        let Ok(mut clients) = self.clients.lock() else {
            return 0;
        };
        clients.retain(|tx| tx.send(payload.clone()).is_ok());
        clients.len()
    }

    /// Tell clients that `path` changed
    pub fn reload(&self, path: &Path) -> usize {
        let notified = self.broadcast(&ServerCommand::reload(path));
        tracing::debug!("reload {} ({notified} client(s))", path.display());
        notified
    }
}

/// Bind the server and start accepting clients in the background
pub fn start(port: u16, hub: Hub) -> Result<SocketAddr, TaskError> {
    let listener =
        TcpListener::bind(("0.0.0.0", port)).map_err(|source| TaskError::Bind { port, source })?;
    let addr = listener
        .local_addr()
        .map_err(|source| TaskError::Bind { port, source })?;

    thread::spawn(move || accept_loop(listener, hub));
    tracing::info!("live-reload listening on port {}", addr.port());
    Ok(addr)
}

fn accept_loop(listener: TcpListener, hub: Hub) {
    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                let hub = hub.clone();
                thread::spawn(move || serve_client(stream, hub));
            }
            Err(e) => tracing::debug!("live-reload accept failed: {e}"),
        }
    }
}

fn serve_client(stream: TcpStream, hub: Hub) {
    let peer = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    let mut ws = match tungstenite::accept(stream) {
        Ok(ws) => ws,
        Err(e) => {
            tracing::debug!("live-reload handshake with {peer} failed: {e}");
            return;
        }
    };

    let outgoing = hub.register();
    tracing::info!(
        "live-reload client connected: {peer} ({} total)",
        hub.client_count()
    );

    match client_loop(&mut ws, &outgoing) {
        Ok(()) => tracing::info!("live-reload client disconnected: {peer}"),
        Err(e) => tracing::debug!("live-reload client {peer} dropped: {e}"),
    }
}

fn client_loop(
    ws: &mut WebSocket<TcpStream>,
    outgoing: &Receiver<String>,
) -> Result<(), tungstenite::Error> {
    ws.get_ref().set_read_timeout(Some(CLIENT_POLL))?;

    loop {
        match ws.read() {
            Ok(Message::Text(text)) => {
                if is_hello(&text) {
                    ws.send(Message::text(ServerCommand::hello().to_json()))?;
                }
            }
            Ok(_) => {}
            Err(tungstenite::Error::Io(e))
                if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {}
            Err(tungstenite::Error::ConnectionClosed) | Err(tungstenite::Error::AlreadyClosed) => {
                return Ok(());
            }
            Err(e) => return Err(e),
        }

        loop {
            match outgoing.try_recv() {
                Ok(payload) => ws.send(Message::text(payload))?,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => return Ok(()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tungstenite::stream::MaybeTlsStream;

    // ==================== protocol tests ====================

    #[test]
    fn test_hello_json() {
        let json: serde_json::Value =
            serde_json::from_str(&ServerCommand::hello().to_json()).unwrap();
        assert_eq!(json["command"], "hello");
        assert_eq!(json["protocols"][0], PROTOCOL);
        assert_eq!(json["serverName"], "drupal-theme-build");
    }

    #[test]
    fn test_reload_json() {
        let json: serde_json::Value = serde_json::from_str(
            &ServerCommand::reload(Path::new("/t/css/style.css")).to_json(),
        )
        .unwrap();
        assert_eq!(json["command"], "reload");
        assert_eq!(json["path"], "/t/css/style.css");
        assert_eq!(json["liveCSS"], true);
        assert_eq!(json["liveImg"], true);
    }

    #[test]
    fn test_is_hello() {
        assert!(is_hello(r#"{"command":"hello","protocols":["x"]}"#));
        assert!(!is_hello(r#"{"command":"info","url":"http://x"}"#));
        assert!(!is_hello("not json"));
        assert!(!is_hello(r#"{"protocols":[]}"#));
    }

    // ==================== hub tests ====================

    #[test]
    fn test_hub_broadcast_reaches_all_clients() {
        let hub = Hub::new();
        let a = hub.register();
        let b = hub.register();

        let notified = hub.reload(Path::new("/t/css/style.css"));

        assert_eq!(notified, 2);
        assert!(a.try_recv().unwrap().contains("style.css"));
        assert!(b.try_recv().unwrap().contains("style.css"));
    }

    #[test]
    fn test_hub_drops_disconnected_clients() {
        let hub = Hub::new();
        let kept = hub.register();
        drop(hub.register());
        assert_eq!(hub.client_count(), 2);

        let notified = hub.reload(Path::new("/x.css"));

        assert_eq!(notified, 1);
        assert_eq!(hub.client_count(), 1);
        assert!(kept.try_recv().is_ok());
    }

    #[test]
    fn test_hub_broadcast_without_clients() {
        assert_eq!(Hub::new().reload(Path::new("/x.css")), 0);
    }

    // ==================== server tests ====================

    #[test]
    fn test_server_handshake_and_reload() {
        let hub = Hub::new();
        let addr = start(0, hub.clone()).unwrap();
        let url = format!("ws://127.0.0.1:{}/livereload", addr.port());

        let (mut client, _) = tungstenite::connect(url).unwrap();
        if let MaybeTlsStream::Plain(s) = client.get_ref() {
            s.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        }

        client
            .send(Message::text(format!(
                r#"{{"command":"hello","protocols":["{PROTOCOL}"]}}"#
            )))
            .unwrap();
        let reply = client.read().unwrap();
        assert!(is_hello(reply.to_text().unwrap()));

        hub.reload(&PathBuf::from("/t/css/style.css"));
        let reload = client.read().unwrap();
        let json: serde_json::Value = serde_json::from_str(reload.to_text().unwrap()).unwrap();
        assert_eq!(json["command"], "reload");
        assert_eq!(json["path"], "/t/css/style.css");
    }

    #[test]
    fn test_start_port_in_use_fails() {
        let taken = TcpListener::bind(("0.0.0.0", 0)).unwrap();
        let port = taken.local_addr().unwrap().port();

        let err = start(port, Hub::new()).unwrap_err();

        assert!(matches!(err, TaskError::Bind { port: p, .. } if p == port));
    }
}
