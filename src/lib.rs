//! Endpoint binding - shared-connection bridges between items and message
//! endpoints.
//!
//! This library binds named items to message endpoints (in-process exchange
//! channels or WebSocket URLs). Every endpoint is served by exactly one
//! connection, shared by all items bound to it and torn down when the last
//! item goes away.
//!
//! # Architecture
//!
//! ```text
//!  event bus                                              endpoints
//! ───────────                                            ───────────
//! receive_command ─┐                                 ┌─► //sensors
//! receive_update  ─┼─► Binding ─► ConnectionManager ─┤
//!                  │     ▲          (1 per endpoint)  └─► ws://host/feed
//! post_update  ◄───┴─ Publisher ◄── fan-out ◄──────────── inbound message
//! ```
//!
//! Key design principles:
//!
//! - One [`Connection`] per endpoint, reference-counted by bound items
//! - Items are configured through directive strings such as
//!   `<[//sensors:JSONPATH($.temp)]`
//! - Transport errors are logged at the connection boundary, never raised
//!   to the event bus
//! - Transformation and typing failures fall back to the raw text
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//!
//! use endpoint_binding::{
//!     Binding, EndpointKind, Exchange, ExchangeFactory, GenericBindingProvider, ItemType,
//!     Payload, State, TransformationRegistry,
//! };
//!
//! # fn main() -> endpoint_binding::Result<()> {
//! let exchange = Exchange::new();
//!
//! let provider = Arc::new(GenericBindingProvider::new("exchange", EndpointKind::Exchange));
//! provider.process_binding_configuration(
//!     "temp",
//!     ItemType::Number,
//!     "<[//sensors:JSONPATH($.temp)]",
//! )?;
//!
//! let binding = Binding::new(
//!     "exchange",
//!     ExchangeFactory::consumer(Arc::clone(&exchange)),
//!     Arc::new(TransformationRegistry::new()),
//!     Arc::new(|item: &str, state: State| println!("{item} -> {state}")),
//! );
//! binding.add_provider(provider);
//! binding.activate();
//!
//! // Prints "temp -> 21.5"
//! exchange.request("sensors", Payload::text(r#"{"temp": 21.5}"#))?;
//!
//! binding.deactivate();
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`binding`] | [`Binding`] adapter and inbound [`Publisher`] |
//! | [`config`] | Directive parser, providers, [`BindingOptions`] |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`item`] | Item types, states, command keys |
//! | [`manager`] | Reference-counted [`ConnectionManager`] |
//! | [`transform`] | Transformation services and registry |
//! | [`transport`] | Exchange and WebSocket transports |
//!
//! # Features
//!
//! - `tls`: enables `wss://` endpoints

// ============================================================================
// Modules
// ============================================================================

/// Event-bus side of a binding.
///
/// - [`Binding`] - routes commands and updates, owns the manager
/// - [`Publisher`] - turns inbound messages into item states
pub mod binding;

/// Binding configuration: directives, providers and options.
pub mod config;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers.
pub mod identifiers;

/// Item vocabulary: value types, states and command keys.
pub mod item;

/// Connection management.
///
/// One [`Connection`] per endpoint, shared by every item bound to it.
pub mod manager;

/// Transformation gateway.
pub mod transform;

/// Transport layer.
///
/// In-process exchange and WebSocket client transports behind one
/// [`Transport`] trait.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Binding types
pub use binding::{Binding, EventPublisher, Publisher};

// Configuration types
pub use config::{
    BindingOptions, BindingOptionsBuilder, BindingProvider, Directive, EndpointKind,
    GenericBindingProvider, ItemDefinition, ProviderHandle,
};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::ConnectionId;

// Item types
pub use item::{CommandKey, Direction, ItemType, OnOff, OpenClosed, State};

// Manager types
pub use manager::{Connection, ConnectionManager, Dispatcher};

// Transformation types
pub use transform::{TransformationRegistry, TransformationService};

// Transport types
pub use transport::{
    Exchange, ExchangeFactory, ExchangeRole, ExchangeTransport, InboundHandler, Payload,
    Transport, TransportFactory, WebSocketFactory, WebSocketTransport,
};
