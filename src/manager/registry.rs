//! Reference-counted connection manager.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::{debug, info, trace};

use crate::config::ProviderHandle;
use crate::error::{Error, Result};
use crate::transport::{Payload, TransportFactory};

use super::{Connection, Dispatcher};

// ============================================================================
// Types
// ============================================================================

/// Both lookup tables, present between `init` and `release`.
struct Tables<F: TransportFactory> {
    /// Single source of truth for which endpoints exist.
    endpoints: FxHashMap<String, Arc<Connection<F::Transport>>>,
    /// Connections each item is bound to, in binding order.
    items: FxHashMap<String, Vec<Arc<Connection<F::Transport>>>>,
}

impl<F: TransportFactory> Default for Tables<F> {
    fn default() -> Self {
        Self {
            endpoints: FxHashMap::default(),
            items: FxHashMap::default(),
        }
    }
}

// ============================================================================
// ConnectionManager
// ============================================================================

/// Shares one [`Connection`] per endpoint among every item bound to it.
///
/// A connection is created and started when the first item binds to its
/// endpoint, and stopped and dropped when the last one is removed. A later
/// binding to the same endpoint builds a fresh connection with a new id.
///
/// All table access runs under one lock. Sends and inbound delivery run
/// outside it.
///
/// # Example
///
/// ```ignore
/// let manager = ConnectionManager::new(factory, dispatcher);
/// manager.init();
///
/// manager.add("temp", "//sensors", Some(provider.clone()))?;
/// manager.add("humidity", "//sensors", Some(provider))?;
/// assert_eq!(manager.connection_count(), 1);
///
/// manager.remove("temp");
/// manager.remove("humidity");
/// assert_eq!(manager.connection_count(), 0);
/// ```
pub struct ConnectionManager<F: TransportFactory> {
    factory: F,
    dispatcher: Arc<dyn Dispatcher>,
    tables: Mutex<Option<Tables<F>>>,
    restart_on_remove: AtomicBool,
}

impl<F: TransportFactory> fmt::Debug for ConnectionManager<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tables = self.tables.lock();
        f.debug_struct("ConnectionManager")
            .field("initialized", &tables.is_some())
            .field("connections", &tables.as_ref().map_or(0, |t| t.endpoints.len()))
            .field("restart_on_remove", &self.restart_on_remove())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// ConnectionManager - Constructor
// ============================================================================

impl<F: TransportFactory> ConnectionManager<F> {
    /// Creates a released manager. Call [`init`](Self::init) before use.
    pub fn new(factory: F, dispatcher: Arc<dyn Dispatcher>) -> Self {
        Self {
            factory,
            dispatcher,
            tables: Mutex::new(None),
            restart_on_remove: AtomicBool::new(false),
        }
    }

    /// Returns the transport factory.
    #[inline]
    #[must_use]
    pub fn factory(&self) -> &F {
        &self.factory
    }

    /// Returns whether shared connections are cycled on item removal.
    #[inline]
    #[must_use]
    pub fn restart_on_remove(&self) -> bool {
        self.restart_on_remove.load(Ordering::Relaxed)
    }

    /// Enables the stop/restart cycle on connections that stay in use
    /// after an item is removed.
    pub fn set_restart_on_remove(&self, enabled: bool) {
        self.restart_on_remove.store(enabled, Ordering::Relaxed);
    }
}

// ============================================================================
// ConnectionManager - Lifecycle
// ============================================================================

impl<F: TransportFactory> ConnectionManager<F> {
    /// Allocates empty tables. A no-op if already initialized.
    pub fn init(&self) {
        let mut tables = self.tables.lock();
        if tables.is_some() {
            debug!("Connection manager already initialized");
            return;
        }
        *tables = Some(Tables::default());
        debug!("Connection manager initialized");
    }

    /// Stops every connection and drops both tables.
    ///
    /// Connections are stopped before the lock is released, so a following
    /// `init` and `add` never sees an old transport still open.
    pub fn release(&self) {
        let mut guard = self.tables.lock();
        let Some(tables) = guard.take() else {
            return;
        };

        let count = tables.endpoints.len();
        for connection in tables.endpoints.values() {
            connection.stop();
        }

        info!(count, "Connection manager released");
    }

    /// Returns `true` between [`init`](Self::init) and
    /// [`release`](Self::release).
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.tables.lock().is_some()
    }
}

// ============================================================================
// ConnectionManager - Binding
// ============================================================================

impl<F: TransportFactory> ConnectionManager<F> {
    /// Binds `item` to `endpoint`.
    ///
    /// Reuses the endpoint's connection if one exists, otherwise creates and
    /// starts it. Binding the same item to the same endpoint again leaves the
    /// reference count unchanged. `provider` is `None` for items that only
    /// send to the endpoint; such items do not receive its messages.
    ///
    /// # Errors
    ///
    /// - [`Error::NotInitialized`] if the manager is released
    /// - [`Error::InvalidEndpoint`] if the factory rejects `endpoint`
    pub fn add(
        &self,
        item: &str,
        endpoint: &str,
        provider: Option<ProviderHandle>,
    ) -> Result<Arc<Connection<F::Transport>>> {
        let mut guard = self.tables.lock();
        let tables = guard.as_mut().ok_or(Error::NotInitialized)?;

        let existing = tables
            .items
            .get(item)
            .and_then(|list| list.iter().find(|c| c.endpoint() == endpoint))
            .cloned();

        if let Some(connection) = existing {
            connection.register(item, provider);
            debug!(item, endpoint, id = %connection.id(), "Item already bound, reusing connection");
            return Ok(connection);
        }

        let connection = match tables.endpoints.get(endpoint).cloned() {
            Some(connection) => connection,
            None => {
                let transport = self.factory.create(endpoint)?;
                let connection = Arc::new(Connection::new(transport, Arc::clone(&self.dispatcher)));
                connection.start();
                tables
                    .endpoints
                    .insert(endpoint.to_string(), Arc::clone(&connection));
                info!(endpoint, id = %connection.id(), "Connection created");
                connection
            }
        };

        tables
            .items
            .entry(item.to_string())
            .or_default()
            .push(Arc::clone(&connection));
        let count = connection.register(item, provider);

        debug!(item, endpoint, count, "Item bound");
        Ok(connection)
    }

    /// Unbinds `item` from every endpoint.
    ///
    /// Connections whose reference count drops to zero are stopped and
    /// removed. A no-op for unknown items or a released manager.
    pub fn remove(&self, item: &str) {
        let mut guard = self.tables.lock();
        let Some(tables) = guard.as_mut() else {
            debug!(item, "Connection manager not initialized, ignoring remove");
            return;
        };

        let Some(connections) = tables.items.remove(item) else {
            trace!(item, "Item not bound");
            return;
        };

        for connection in connections {
            let count = connection.unregister(item);
            debug!(item, endpoint = %connection.endpoint(), count, "Item unbound");

            if count == 0 {
                connection.stop();
                let current = tables.endpoints.get(connection.endpoint());
                if current.is_some_and(|c| Arc::ptr_eq(c, &connection)) {
                    tables.endpoints.remove(connection.endpoint());
                }
            } else if self.restart_on_remove() {
                connection.restart();
            }
        }
    }
}

// ============================================================================
// ConnectionManager - Messaging
// ============================================================================

impl<F: TransportFactory> ConnectionManager<F> {
    /// Sends `payload` to `endpoint`.
    ///
    /// Transport failures are logged by the connection.
    ///
    /// # Errors
    ///
    /// - [`Error::NotInitialized`] if the manager is released
    /// - [`Error::UnknownEndpoint`] if no item is bound to `endpoint`
    pub fn send(&self, endpoint: &str, payload: Payload) -> Result<()> {
        let connection = {
            let guard = self.tables.lock();
            let tables = guard.as_ref().ok_or(Error::NotInitialized)?;
            tables
                .endpoints
                .get(endpoint)
                .cloned()
                .ok_or_else(|| Error::unknown_endpoint(endpoint))?
        };

        connection.send(payload);
        Ok(())
    }

    /// Forwards an inbound message to the dispatcher.
    ///
    /// # Errors
    ///
    /// Returns whatever the dispatcher returns.
    pub fn dispatch(&self, item: &str, payload: &Payload, provider: &ProviderHandle) -> Result<()> {
        self.dispatcher.dispatch(item, payload, provider)
    }

    /// Re-opens the connection of `endpoint` if its transport closed.
    ///
    /// Returns `false` if no connection exists for `endpoint`.
    pub fn ensure_connected(&self, endpoint: &str) -> bool {
        let connection = match self.tables.lock().as_ref() {
            Some(tables) => tables.endpoints.get(endpoint).cloned(),
            None => {
                debug!(endpoint, "Connection manager not initialized, skipping keep-alive");
                return false;
            }
        };

        match connection {
            Some(connection) => {
                connection.ensure_connected();
                true
            }
            None => false,
        }
    }
}

// ============================================================================
// ConnectionManager - Introspection
// ============================================================================

impl<F: TransportFactory> ConnectionManager<F> {
    /// Returns the connection of `endpoint`.
    #[must_use]
    pub fn connection(&self, endpoint: &str) -> Option<Arc<Connection<F::Transport>>> {
        self.tables
            .lock()
            .as_ref()
            .and_then(|t| t.endpoints.get(endpoint).cloned())
    }

    /// Number of live connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.tables.lock().as_ref().map_or(0, |t| t.endpoints.len())
    }

    /// Endpoints `item` is bound to, in binding order.
    #[must_use]
    pub fn item_endpoints(&self, item: &str) -> Vec<String> {
        self.tables
            .lock()
            .as_ref()
            .and_then(|t| t.items.get(item))
            .map(|list| list.iter().map(|c| c.endpoint().to_string()).collect())
            .unwrap_or_default()
    }

    /// Endpoints with a live connection.
    #[must_use]
    pub fn endpoints(&self) -> Vec<String> {
        self.tables
            .lock()
            .as_ref()
            .map(|t| t.endpoints.keys().cloned().collect())
            .unwrap_or_default()
    }
}

impl<F: TransportFactory> Drop for ConnectionManager<F> {
    fn drop(&mut self) {
        if let Some(tables) = self.tables.get_mut().take() {
            for connection in tables.endpoints.values() {
                connection.stop();
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
