//! Item vocabulary shared by providers, transports and the binding.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`ItemType`] | Declared value type of an item |
//! | [`State`] | Typed state published to the event bus |
//! | [`CommandKey`] | Key selecting a directive for a command or update |
//! | [`Direction`] | Inbound (`<`) or outbound (`>`) directive |

// ============================================================================
// Submodules
// ============================================================================

/// Command keys and directive directions.
pub mod command;

/// Typed item states and text coercion.
pub mod state;

/// Declared item value types.
pub mod types;

// ============================================================================
// Re-exports
// ============================================================================

pub use command::{CommandKey, Direction};
pub use state::{OnOff, OpenClosed, State};
pub use types::ItemType;
