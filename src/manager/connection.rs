//! Per-endpoint connection.
//!
//! A [`Connection`] wraps one transport and the table of items listening on
//! its endpoint. The table's size is the connection's reference count.
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │ Connection (endpoint "//sensors")       │
//! │  transport: ExchangeTransport           │
//! │  ┌───────────────────────────────────┐  │
//! │  │ "temp"     → Some(provider A)     │  │
//! │  │ "humidity" → Some(provider A)     │  │
//! │  │ "fan"      → None (outbound only) │  │
//! │  └───────────────────────────────────┘  │
//! └─────────────────────────────────────────┘
//! ```
//!
//! Lifecycle and listener changes are driven by the
//! [`ConnectionManager`](super::ConnectionManager) under its lock. Sends and
//! inbound delivery run on the caller's thread or the transport's task.
//!
//! [`stop`](Connection::stop) retires a connection for good. A handle kept
//! past teardown can no longer reopen the transport: sends are dropped and
//! keep-alive checks do nothing.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use tracing::{debug, error, info, trace, warn};

use crate::config::ProviderHandle;
use crate::identifiers::ConnectionId;
use crate::transport::{InboundHandler, Payload, Transport};

use super::Dispatcher;

// ============================================================================
// Types
// ============================================================================

/// Registered items and their optional providers.
type ListenerTable = FxHashMap<String, Option<ProviderHandle>>;

// ============================================================================
// Connection
// ============================================================================

/// One transport handle shared by every item bound to an endpoint.
pub struct Connection<T: Transport> {
    id: ConnectionId,
    endpoint: String,
    transport: T,
    listeners: Arc<RwLock<ListenerTable>>,
    dispatcher: Arc<dyn Dispatcher>,
    /// Set once by `stop`. Guards every transport open.
    retired: Mutex<bool>,
}

impl<T: Transport> fmt::Debug for Connection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("endpoint", &self.endpoint)
            .field("reference_count", &self.reference_count())
            .field("open", &self.transport.is_open())
            .field("retired", &self.is_retired())
            .finish()
    }
}

// ============================================================================
// Connection - Accessors
// ============================================================================

impl<T: Transport> Connection<T> {
    /// Creates an unstarted connection with no listeners.
    pub(crate) fn new(transport: T, dispatcher: Arc<dyn Dispatcher>) -> Self {
        Self {
            id: ConnectionId::next(),
            endpoint: transport.endpoint().to_string(),
            transport,
            listeners: Arc::new(RwLock::new(ListenerTable::default())),
            dispatcher,
            retired: Mutex::new(false),
        }
    }

    /// Returns the connection id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Returns the endpoint name.
    #[inline]
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Returns the underlying transport.
    #[inline]
    #[must_use]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Number of registered items.
    #[inline]
    #[must_use]
    pub fn reference_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Returns `true` if `item` is registered.
    #[must_use]
    pub fn is_registered(&self, item: &str) -> bool {
        self.listeners.read().contains_key(item)
    }

    /// Returns `true` if `item` is registered with a provider.
    #[must_use]
    pub fn has_provider(&self, item: &str) -> bool {
        self.listeners
            .read()
            .get(item)
            .is_some_and(Option::is_some)
    }

    /// Names of the registered items.
    #[must_use]
    pub fn items(&self) -> Vec<String> {
        self.listeners.read().keys().cloned().collect()
    }

    /// Returns `true` while the transport is open.
    #[inline]
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.transport.is_open()
    }

    /// Returns `true` once the connection has been stopped.
    #[inline]
    #[must_use]
    pub fn is_retired(&self) -> bool {
        *self.retired.lock()
    }
}

// ============================================================================
// Connection - Lifecycle
// ============================================================================

impl<T: Transport> Connection<T> {
    /// Opens the transport. Failures are logged.
    ///
    /// A no-op on a retired connection.
    pub(crate) fn start(&self) {
        let retired = self.retired.lock();
        if *retired {
            debug!(id = %self.id, endpoint = %self.endpoint, "Connection retired, not starting");
            return;
        }
        self.open_transport();
    }

    /// Starts the transport. Callers hold the `retired` lock.
    fn open_transport(&self) {
        match self.transport.start(self.inbound_handler()) {
            Ok(()) => info!(id = %self.id, endpoint = %self.endpoint, "Connection started"),
            Err(e) => error!(
                id = %self.id,
                endpoint = %self.endpoint,
                error = %e,
                "Failed to start connection"
            ),
        }
    }

    /// Retires the connection, closes the transport and clears the listener
    /// table. Failures are logged.
    pub(crate) fn stop(&self) {
        let mut retired = self.retired.lock();
        *retired = true;

        if let Err(e) = self.transport.stop() {
            warn!(
                id = %self.id,
                endpoint = %self.endpoint,
                error = %e,
                "Failed to stop connection"
            );
        }
        self.listeners.write().clear();
        info!(id = %self.id, endpoint = %self.endpoint, "Connection stopped");
    }

    /// Cycles the transport while keeping the listeners.
    pub(crate) fn restart(&self) {
        let retired = self.retired.lock();
        if *retired {
            return;
        }
        if let Err(e) = self.transport.stop() {
            warn!(endpoint = %self.endpoint, error = %e, "Failed to stop connection for restart");
        }
        self.open_transport();
    }

    /// Re-opens the transport if it reports itself closed.
    ///
    /// A no-op on a retired connection.
    pub(crate) fn ensure_connected(&self) {
        let retired = self.retired.lock();
        if *retired {
            trace!(endpoint = %self.endpoint, "Connection retired, skipping keep-alive");
            return;
        }
        if !self.transport.is_open() {
            debug!(endpoint = %self.endpoint, "Connection closed, reconnecting");
            self.open_transport();
        }
    }
}

// ============================================================================
// Connection - Listeners
// ============================================================================

impl<T: Transport> Connection<T> {
    /// Registers `item`, returning the new reference count.
    ///
    /// Registering an item twice keeps the count; a provider given later
    /// replaces an absent one.
    pub(crate) fn register(&self, item: &str, provider: Option<ProviderHandle>) -> usize {
        let mut listeners = self.listeners.write();
        match listeners.get_mut(item) {
            Some(existing) => {
                if provider.is_some() && existing.is_none() {
                    *existing = provider;
                }
            }
            None => {
                listeners.insert(item.to_string(), provider);
            }
        }

        trace!(endpoint = %self.endpoint, item, count = listeners.len(), "Listener registered");
        listeners.len()
    }

    /// Unregisters `item`, returning the new reference count.
    pub(crate) fn unregister(&self, item: &str) -> usize {
        let mut listeners = self.listeners.write();
        listeners.remove(item);

        trace!(endpoint = %self.endpoint, item, count = listeners.len(), "Listener unregistered");
        listeners.len()
    }
}

// ============================================================================
// Connection - Messaging
// ============================================================================

impl<T: Transport> Connection<T> {
    /// Sends `payload`, attempting one start if the transport is closed.
    /// Failures are logged.
    ///
    /// The payload is dropped if the connection is retired.
    pub fn send(&self, payload: Payload) {
        {
            let retired = self.retired.lock();
            if *retired {
                warn!(endpoint = %self.endpoint, "Connection retired, dropping message");
                return;
            }
            if !self.transport.is_open() {
                debug!(endpoint = %self.endpoint, "Transport closed, starting before send");
                self.open_transport();
            }
        }

        match self.transport.send(payload) {
            Ok(()) => trace!(endpoint = %self.endpoint, "Message sent"),
            Err(e) => error!(endpoint = %self.endpoint, error = %e, "Failed to send message"),
        }
    }

    /// Delivers `payload` to every registered item that has a provider.
    pub fn deliver(&self, payload: &Payload) {
        fan_out(&self.endpoint, &self.listeners, self.dispatcher.as_ref(), payload);
    }

    /// Handler passed to the transport on start.
    fn inbound_handler(&self) -> InboundHandler {
        let endpoint = self.endpoint.clone();
        let listeners = Arc::clone(&self.listeners);
        let dispatcher = Arc::clone(&self.dispatcher);

        Arc::new(move |payload: Payload| {
            fan_out(&endpoint, &listeners, dispatcher.as_ref(), &payload);
        })
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Dispatches `payload` to a snapshot of the listener table.
fn fan_out(
    endpoint: &str,
    listeners: &RwLock<ListenerTable>,
    dispatcher: &dyn Dispatcher,
    payload: &Payload,
) {
    let targets: Vec<(String, ProviderHandle)> = listeners
        .read()
        .iter()
        .filter_map(|(item, provider)| {
            provider
                .as_ref()
                .map(|provider| (item.clone(), Arc::clone(provider)))
        })
        .collect();

    trace!(endpoint, listeners = targets.len(), size = payload.len(), "Inbound message");

    for (item, provider) in targets {
        if let Err(e) = dispatcher.dispatch(&item, payload, &provider) {
            warn!(endpoint, item = %item, error = %e, "Failed to dispatch message");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::testing::{MockTransport, RecordingDispatcher, provider};

    fn connection() -> (Connection<MockTransport>, Arc<RecordingDispatcher>) {
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let conn = Connection::new(MockTransport::new("//a"), dispatcher.clone());
        (conn, dispatcher)
    }

    #[test]
    fn test_register_set_semantics() {
        let (conn, _) = connection();
        assert_eq!(conn.register("x", None), 1);
        assert_eq!(conn.register("x", None), 1);
        assert_eq!(conn.register("y", None), 2);
        assert_eq!(conn.unregister("x"), 1);
        assert_eq!(conn.unregister("x"), 1);
    }

    #[test]
    fn test_register_upgrades_absent_provider() {
        let (conn, _) = connection();
        conn.register("x", None);
        assert!(!conn.has_provider("x"));
        conn.register("x", Some(provider()));
        assert!(conn.has_provider("x"));
        conn.register("x", None);
        assert!(conn.has_provider("x"));
    }

    #[test]
    fn test_fan_out_skips_items_without_provider() {
        let (conn, dispatcher) = connection();
        conn.register("in1", Some(provider()));
        conn.register("in2", Some(provider()));
        conn.register("out", None);

        conn.deliver(&Payload::text("21"));

        let mut items: Vec<String> = dispatcher.calls().into_iter().map(|(i, _)| i).collect();
        items.sort();
        assert_eq!(items, vec!["in1".to_string(), "in2".to_string()]);
    }

    #[test]
    fn test_fan_out_continues_after_failure() {
        let (conn, dispatcher) = connection();
        dispatcher.fail_for("bad");
        conn.register("bad", Some(provider()));
        conn.register("good", Some(provider()));

        conn.deliver(&Payload::text("x"));

        let items: Vec<String> = dispatcher.calls().into_iter().map(|(i, _)| i).collect();
        assert!(items.contains(&"good".to_string()));
    }

    #[test]
    fn test_transport_inbound_reaches_listeners() {
        let (conn, dispatcher) = connection();
        conn.register("x", Some(provider()));
        conn.start();

        conn.transport().emit(Payload::text("hello"));

        assert_eq!(dispatcher.calls(), vec![("x".to_string(), Payload::text("hello"))]);
    }

    #[test]
    fn test_send_starts_closed_transport() {
        let (conn, _) = connection();
        assert!(!conn.is_open());
        conn.send(Payload::text("ON"));
        assert!(conn.is_open());
        assert_eq!(conn.transport().sent(), vec![Payload::text("ON")]);
    }

    #[test]
    fn test_send_failure_is_swallowed() {
        let (conn, _) = connection();
        conn.transport().fail_start(true);
        conn.send(Payload::text("ON"));
        assert!(conn.transport().sent().is_empty());
    }

    #[test]
    fn test_stop_clears_listeners() {
        let (conn, _) = connection();
        conn.start();
        conn.register("x", None);
        conn.stop();
        assert_eq!(conn.reference_count(), 0);
        assert!(!conn.is_open());
    }

    #[test]
    fn test_stopped_connection_stays_closed() {
        let (conn, _) = connection();
        conn.start();
        conn.stop();
        assert!(conn.is_retired());

        conn.send(Payload::text("late"));
        conn.ensure_connected();
        conn.restart();
        conn.start();

        assert!(!conn.is_open());
        assert_eq!(conn.transport().start_count(), 1);
        assert!(conn.transport().sent().is_empty());
    }

    #[test]
    fn test_ensure_connected_restarts() {
        let (conn, _) = connection();
        conn.start();
        conn.transport().drop_connection();
        assert!(!conn.is_open());
        conn.ensure_connected();
        assert!(conn.is_open());
        assert_eq!(conn.transport().start_count(), 2);
    }
}
