//! Connection management.
//!
//! The [`ConnectionManager`] keeps one [`Connection`] per endpoint and
//! reference-counts it by the items bound to it.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │ ConnectionManager                                │
//! │  endpoints: "//sensors" → Connection (conn-1)    │
//! │             "//lights"  → Connection (conn-2)    │
//! │  items:     "temp"      → [conn-1]               │
//! │             "humidity"  → [conn-1]               │
//! │             "lamp"      → [conn-1, conn-2]       │
//! └──────────────────────────────────────────────────┘
//!            │ inbound message on conn-1
//!            ▼
//!   Dispatcher::dispatch(item, payload, provider)  ×  every listening item
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connection` | Per-endpoint transport and listener table |
//! | `registry` | Reference-counted endpoint and item tables |

// ============================================================================
// Submodules
// ============================================================================

/// Per-endpoint connection.
pub mod connection;

/// Reference-counted manager.
pub mod registry;

#[cfg(test)]
pub(crate) mod testing;

// ============================================================================
// Imports
// ============================================================================

use crate::config::ProviderHandle;
use crate::error::Result;
use crate::transport::Payload;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::Connection;
pub use registry::ConnectionManager;

// ============================================================================
// Dispatcher
// ============================================================================

/// Receives inbound messages for one item at a time.
pub trait Dispatcher: Send + Sync {
    /// Handles `payload` received on an endpoint `item` listens on.
    ///
    /// # Errors
    ///
    /// Errors are logged by the caller; delivery to other items continues.
    fn dispatch(&self, item: &str, payload: &Payload, provider: &ProviderHandle) -> Result<()>;
}
