//! WebSocket client transport and event loop.
//!
//! Each started [`WebSocketTransport`] owns one tokio task that dials the
//! endpoint and then multiplexes socket I/O with commands from the
//! synchronous API.
//!
//! # Event Loop
//!
//! The spawned task handles:
//!
//! - Incoming text and binary frames, handed to the inbound handler
//! - Outgoing payloads queued by [`Transport::send`]
//! - Shutdown requests from [`Transport::stop`]
//!
//! The loop ends on remote close, socket error, or shutdown. The transport
//! then reports itself closed, and a later `start` dials a fresh socket.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, trace, warn};
use url::Url;

use crate::error::{Error, Result};

use super::{InboundHandler, Payload, Transport, TransportFactory};

// ============================================================================
// Constants
// ============================================================================

/// Default timeout for the opening handshake.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// WsCommand
// ============================================================================

/// Internal commands for the event loop.
enum WsCommand {
    /// Write a payload to the socket.
    Send(Payload),
    /// Close the socket and end the loop.
    Shutdown,
}

// ============================================================================
// Session
// ============================================================================

/// Handle to one running event loop.
struct Session {
    command_tx: mpsc::UnboundedSender<WsCommand>,
    /// Set once the opening handshake succeeded, cleared when the loop ends.
    connected: Arc<AtomicBool>,
}

impl Session {
    /// The receiver is dropped when the loop ends.
    #[inline]
    fn is_alive(&self) -> bool {
        !self.command_tx.is_closed()
    }
}

// ============================================================================
// WebSocketTransport
// ============================================================================

/// Outbound WebSocket client bound to one `ws://` or `wss://` URL.
///
/// # Thread Safety
///
/// `WebSocketTransport` is `Send + Sync`. `send` only enqueues; socket
/// writes happen on the event loop task.
pub struct WebSocketTransport {
    url: String,
    runtime: Handle,
    connect_timeout: Duration,
    session: Mutex<Option<Session>>,
}

impl fmt::Debug for WebSocketTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebSocketTransport")
            .field("url", &self.url)
            .field("open", &self.is_open())
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

impl WebSocketTransport {
    /// Creates an unopened transport whose event loop runs on `runtime`.
    #[must_use]
    pub fn new(url: impl Into<String>, runtime: Handle) -> Self {
        Self {
            url: url.into(),
            runtime,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            session: Mutex::new(None),
        }
    }

    /// Sets the opening handshake timeout.
    #[must_use]
    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    /// Returns `true` once the opening handshake has completed and the
    /// socket is still up.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.session
            .lock()
            .as_ref()
            .is_some_and(|s| s.is_alive() && s.connected.load(Ordering::Acquire))
    }

    /// Event loop that dials the endpoint and handles socket I/O.
    async fn run_event_loop(
        url: String,
        connect_timeout: Duration,
        mut command_rx: mpsc::UnboundedReceiver<WsCommand>,
        inbound: InboundHandler,
        connected: Arc<AtomicBool>,
    ) {
        let ws_stream = match timeout(connect_timeout, connect_async(url.as_str())).await {
            Ok(Ok((stream, _response))) => stream,
            Ok(Err(e)) => {
                error!(url = %url, error = %e, "Failed to connect");
                return;
            }
            Err(_) => {
                error!(
                    url = %url,
                    timeout_ms = connect_timeout.as_millis() as u64,
                    "Connection timed out"
                );
                return;
            }
        };

        connected.store(true, Ordering::Release);
        info!(url = %url, "WebSocket connected");

        let (mut ws_write, mut ws_read) = ws_stream.split();

        loop {
            tokio::select! {
                // Incoming frames from the endpoint
                message = ws_read.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            trace!(url = %url, size = text.len(), "Text frame received");
                            inbound(Payload::Text(text.as_str().to_owned()));
                        }

                        Some(Ok(Message::Binary(bytes))) => {
                            trace!(url = %url, size = bytes.len(), "Binary frame received");
                            inbound(Payload::Binary(bytes.to_vec()));
                        }

                        Some(Ok(Message::Close(_))) => {
                            debug!(url = %url, "WebSocket closed by remote");
                            break;
                        }

                        Some(Err(e)) => {
                            error!(url = %url, error = %e, "WebSocket error");
                            break;
                        }

                        None => {
                            debug!(url = %url, "WebSocket stream ended");
                            break;
                        }

                        // Ping, Pong, raw frames
                        _ => {}
                    }
                }

                // Commands from the transport API
                command = command_rx.recv() => {
                    match command {
                        Some(WsCommand::Send(payload)) => {
                            let message = match payload {
                                Payload::Text(text) => Message::Text(text.into()),
                                Payload::Binary(bytes) => Message::Binary(bytes.into()),
                            };

                            if let Err(e) = ws_write.send(message).await {
                                warn!(url = %url, error = %e, "Failed to send message");
                                break;
                            }
                        }

                        Some(WsCommand::Shutdown) => {
                            debug!(url = %url, "Shutdown command received");
                            let _ = ws_write.close().await;
                            break;
                        }

                        None => {
                            debug!(url = %url, "Command channel closed");
                            break;
                        }
                    }
                }
            }
        }

        connected.store(false, Ordering::Release);
        debug!(url = %url, "Event loop terminated");
    }
}

impl Transport for WebSocketTransport {
    fn endpoint(&self) -> &str {
        &self.url
    }

    fn start(&self, inbound: InboundHandler) -> Result<()> {
        let mut session = self.session.lock();
        if session.as_ref().is_some_and(Session::is_alive) {
            return Ok(());
        }

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let connected = Arc::new(AtomicBool::new(false));

        self.runtime.spawn(Self::run_event_loop(
            self.url.clone(),
            self.connect_timeout,
            command_rx,
            inbound,
            Arc::clone(&connected),
        ));

        *session = Some(Session {
            command_tx,
            connected,
        });

        debug!(url = %self.url, "WebSocket transport started");
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        if let Some(session) = self.session.lock().take() {
            let _ = session.command_tx.send(WsCommand::Shutdown);
            debug!(url = %self.url, "WebSocket transport stopped");
        }
        Ok(())
    }

    fn send(&self, payload: Payload) -> Result<()> {
        let session = self.session.lock();
        let session = session
            .as_ref()
            .filter(|s| s.is_alive())
            .ok_or(Error::ConnectionClosed)?;

        session
            .command_tx
            .send(WsCommand::Send(payload))
            .map_err(|_| Error::ConnectionClosed)
    }

    fn is_open(&self) -> bool {
        self.session.lock().as_ref().is_some_and(Session::is_alive)
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        if let Some(session) = self.session.get_mut().take() {
            let _ = session.command_tx.send(WsCommand::Shutdown);
        }
    }
}

// ============================================================================
// WebSocketFactory
// ============================================================================

/// Creates WebSocket transports that run on a tokio runtime.
#[derive(Debug, Clone)]
pub struct WebSocketFactory {
    runtime: Handle,
    connect_timeout: Duration,
}

impl WebSocketFactory {
    /// Creates a factory bound to the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when called outside a tokio runtime.
    pub fn new() -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| Error::config(format!("WebSocket transport requires a Tokio runtime: {e}")))?;
        Ok(Self::with_handle(runtime))
    }

    /// Creates a factory that spawns event loops on `runtime`.
    #[inline]
    #[must_use]
    pub fn with_handle(runtime: Handle) -> Self {
        Self {
            runtime,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Sets the opening handshake timeout for created transports.
    #[must_use]
    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    /// Checks that `endpoint` is a usable WebSocket URL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidEndpoint`] for malformed URLs, non-WebSocket
    /// schemes, and `wss` without the `tls` feature.
    pub fn validate(endpoint: &str) -> Result<Url> {
        let url = Url::parse(endpoint)
            .map_err(|e| Error::invalid_endpoint(endpoint, e.to_string()))?;

        match url.scheme() {
            "ws" => Ok(url),
            "wss" if cfg!(feature = "tls") => Ok(url),
            "wss" => Err(Error::invalid_endpoint(
                endpoint,
                "wss endpoints require the `tls` feature",
            )),
            other => Err(Error::invalid_endpoint(
                endpoint,
                format!("unsupported scheme '{other}'"),
            )),
        }
    }
}

impl TransportFactory for WebSocketFactory {
    type Transport = WebSocketTransport;

    fn create(&self, endpoint: &str) -> Result<WebSocketTransport> {
        Self::validate(endpoint)?;
        Ok(WebSocketTransport::new(endpoint, self.runtime.clone())
            .with_connect_timeout(self.connect_timeout))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_constants() {
        assert_eq!(DEFAULT_CONNECT_TIMEOUT.as_secs(), 30);
    }

    #[test]
    fn test_validate_accepts_ws() {
        assert_ok!(WebSocketFactory::validate("ws://localhost:8080/feed"));
    }

    #[test]
    fn test_validate_rejects_other_schemes() {
        let err = WebSocketFactory::validate("http://localhost/").unwrap_err();
        assert!(matches!(err, Error::InvalidEndpoint { .. }));
        assert_err!(WebSocketFactory::validate("not a url"));
    }

    #[test]
    fn test_factory_requires_runtime() {
        assert_err!(WebSocketFactory::new());
    }

    #[tokio::test]
    async fn test_send_before_start_fails() {
        let factory = WebSocketFactory::new().unwrap();
        let transport = factory.create("ws://127.0.0.1:9/").unwrap();
        assert!(!transport.is_open());
        assert!(matches!(
            transport.send(Payload::text("x")),
            Err(Error::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_refused_connection_closes_transport() {
        let factory = WebSocketFactory::new()
            .unwrap()
            .with_connect_timeout(Duration::from_secs(2));
        let transport = factory.create("ws://127.0.0.1:9/").unwrap();
        transport.start(Arc::new(|_| {})).unwrap();

        let closed = timeout(Duration::from_secs(5), async {
            while transport.is_open() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;

        assert!(closed.is_ok());
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let factory = WebSocketFactory::new().unwrap();
        let transport = factory.create("ws://127.0.0.1:9/").unwrap();
        assert_ok!(transport.stop());
        assert_ok!(transport.start(Arc::new(|_| {})));
        assert_ok!(transport.stop());
        assert_ok!(transport.stop());
        assert!(!transport.is_open());
    }
}
