//! Event-bus side of a binding.
//!
//! | Module | Description |
//! |--------|-------------|
//! | `adapter` | [`Binding`]: provider registry, outbound routing, keep-alive |
//! | `publisher` | Inbound transform / type / publish path |

// ============================================================================
// Submodules
// ============================================================================

/// Binding adapter.
pub mod adapter;

/// Inbound publish path.
pub mod publisher;

// ============================================================================
// Re-exports
// ============================================================================

pub use adapter::Binding;
pub use publisher::{EventPublisher, Publisher};
