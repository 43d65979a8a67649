//! Transport layer.
//!
//! A transport owns the physical handle for exactly one endpoint. The
//! connection manager only sees the [`Transport`] capability set and builds
//! transports through a [`TransportFactory`], so the same lifecycle code
//! drives every transport kind.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐   start(inbound) / stop / send   ┌──────────────┐
//! │ Connection           │─────────────────────────────────►│ Transport    │
//! │ (one per endpoint)   │◄─────────────────────────────────│ (exchange /  │
//! │                      │        inbound(Payload)          │  websocket)  │
//! └──────────────────────┘                                  └──────────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `exchange` | In-process channel exchange (consumer / dispatcher roles) |
//! | `websocket` | Outbound WebSocket client and its event loop |

// ============================================================================
// Submodules
// ============================================================================

/// In-process message exchange.
pub mod exchange;

/// WebSocket client transport.
pub mod websocket;

// ============================================================================
// Imports
// ============================================================================

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use crate::error::Result;

// ============================================================================
// Re-exports
// ============================================================================

pub use exchange::{Exchange, ExchangeFactory, ExchangeRole, ExchangeTransport, Processor};
pub use websocket::{WebSocketFactory, WebSocketTransport};

// ============================================================================
// Payload
// ============================================================================

/// A message carried by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// UTF-8 text.
    Text(String),
    /// Raw bytes.
    Binary(Vec<u8>),
}

impl Payload {
    /// Creates a text payload.
    #[inline]
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// Returns the payload as text, decoding bytes lossily.
    #[must_use]
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            Self::Text(text) => Cow::Borrowed(text),
            Self::Binary(bytes) => String::from_utf8_lossy(bytes),
        }
    }

    /// Returns the payload size in bytes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            Self::Binary(bytes) => bytes.len(),
        }
    }

    /// Returns `true` if the payload is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_text())
    }
}

impl From<String> for Payload {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for Payload {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<Vec<u8>> for Payload {
    fn from(value: Vec<u8>) -> Self {
        Self::Binary(value)
    }
}

// ============================================================================
// Transport Traits
// ============================================================================

/// Callback a transport invokes for every received message.
pub type InboundHandler = Arc<dyn Fn(Payload) + Send + Sync>;

/// Capability set of one transport handle.
///
/// Implementations use interior synchronization; every method takes `&self`
/// and may be called from any thread.
pub trait Transport: Send + Sync + 'static {
    /// Endpoint this transport is bound to.
    fn endpoint(&self) -> &str;

    /// Opens the transport. Calling it on an open transport is a no-op.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the handle cannot be opened.
    fn start(&self, inbound: InboundHandler) -> Result<()>;

    /// Closes the transport. Calling it on a closed transport is a no-op.
    ///
    /// # Errors
    ///
    /// Returns a transport error if closing fails.
    fn stop(&self) -> Result<()>;

    /// Sends a payload to the endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`](crate::Error::ConnectionClosed) if
    /// the transport is not open, or a transport-specific error.
    fn send(&self, payload: Payload) -> Result<()>;

    /// Returns `true` while the transport handle is usable.
    fn is_open(&self) -> bool;
}

/// Creates transports for endpoint names.
pub trait TransportFactory: Send + Sync + 'static {
    /// Transport type produced by this factory.
    type Transport: Transport;

    /// Creates an unopened transport for `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidEndpoint`](crate::Error::InvalidEndpoint) if
    /// the endpoint is not valid for this transport kind.
    fn create(&self, endpoint: &str) -> Result<Self::Transport>;
}

// ============================================================================
// Tests
// ============================================================================
