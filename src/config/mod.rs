//! Binding configuration.
//!
//! | Module | Description |
//! |--------|-------------|
//! | `directive` | `direction[command:endpoint:transformation]` parser |
//! | `provider` | [`BindingProvider`] trait and the directive-backed provider |
//! | `options` | Runtime options (keep-alive period, removal policy) |

// ============================================================================
// Submodules
// ============================================================================

/// Directive parser.
pub mod directive;

/// Runtime options.
pub mod options;

/// Binding providers.
pub mod provider;

// ============================================================================
// Re-exports
// ============================================================================

pub use directive::{Directive, EndpointKind, parse_directives};
pub use options::{BindingOptions, BindingOptionsBuilder};
pub use provider::{BindingProvider, GenericBindingProvider, ItemDefinition, ProviderHandle};
