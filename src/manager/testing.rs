//! Test doubles for the manager.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use rustc_hash::FxHashSet;

use crate::config::{EndpointKind, GenericBindingProvider, ProviderHandle};
use crate::error::{Error, Result};
use crate::transport::{InboundHandler, Payload, Transport, TransportFactory};

use super::Dispatcher;

// ============================================================================
// MockTransport
// ============================================================================

#[derive(Default)]
struct MockState {
    inbound: Option<InboundHandler>,
    open: bool,
    fail_start: bool,
    starts: usize,
    stops: usize,
    sent: Vec<Payload>,
}

/// In-memory transport recording every call.
pub(crate) struct MockTransport {
    endpoint: String,
    state: Mutex<MockState>,
}

impl MockTransport {
    pub(crate) fn new(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            state: Mutex::new(MockState::default()),
        }
    }

    /// Simulates a message arriving from the endpoint.
    pub(crate) fn emit(&self, payload: Payload) {
        let inbound = self.state.lock().inbound.clone();
        if let Some(inbound) = inbound {
            inbound(payload);
        }
    }

    /// Simulates the remote side dropping the connection.
    pub(crate) fn drop_connection(&self) {
        self.state.lock().open = false;
    }

    pub(crate) fn fail_start(&self, fail: bool) {
        self.state.lock().fail_start = fail;
    }

    pub(crate) fn start_count(&self) -> usize {
        self.state.lock().starts
    }

    pub(crate) fn stop_count(&self) -> usize {
        self.state.lock().stops
    }

    pub(crate) fn sent(&self) -> Vec<Payload> {
        self.state.lock().sent.clone()
    }
}

impl Transport for MockTransport {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn start(&self, inbound: InboundHandler) -> Result<()> {
        let mut state = self.state.lock();
        if state.fail_start {
            return Err(Error::connection("refused"));
        }
        if !state.open {
            state.open = true;
            state.starts += 1;
        }
        state.inbound = Some(inbound);
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.open {
            state.stops += 1;
        }
        state.open = false;
        state.inbound = None;
        Ok(())
    }

    fn send(&self, payload: Payload) -> Result<()> {
        let mut state = self.state.lock();
        if !state.open {
            return Err(Error::ConnectionClosed);
        }
        state.sent.push(payload);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.state.lock().open
    }
}

// ============================================================================
// MockFactory
// ============================================================================

/// Factory producing [`MockTransport`]s; rejects endpoints starting with `!`.
#[derive(Default)]
pub(crate) struct MockFactory {
    created: AtomicUsize,
}

impl MockFactory {
    pub(crate) fn created(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }
}

impl TransportFactory for MockFactory {
    type Transport = MockTransport;

    fn create(&self, endpoint: &str) -> Result<MockTransport> {
        if endpoint.starts_with('!') {
            return Err(Error::invalid_endpoint(endpoint, "rejected by mock"));
        }
        self.created.fetch_add(1, Ordering::Relaxed);
        Ok(MockTransport::new(endpoint))
    }
}

// ============================================================================
// RecordingDispatcher
// ============================================================================

/// Dispatcher recording `(item, payload)` pairs and the provider each
/// dispatch carried.
#[derive(Default)]
pub(crate) struct RecordingDispatcher {
    calls: Mutex<Vec<(String, Payload)>>,
    providers: Mutex<Vec<(String, ProviderHandle)>>,
    failing: Mutex<FxHashSet<String>>,
}

impl RecordingDispatcher {
    pub(crate) fn calls(&self) -> Vec<(String, Payload)> {
        self.calls.lock().clone()
    }

    /// Providers passed along with dispatches to `item`, oldest first.
    pub(crate) fn providers_for(&self, item: &str) -> Vec<ProviderHandle> {
        self.providers
            .lock()
            .iter()
            .filter(|(name, _)| name == item)
            .map(|(_, provider)| Arc::clone(provider))
            .collect()
    }

    pub(crate) fn fail_for(&self, item: &str) {
        self.failing.lock().insert(item.to_string());
    }
}

impl Dispatcher for RecordingDispatcher {
    fn dispatch(&self, item: &str, payload: &Payload, provider: &ProviderHandle) -> Result<()> {
        self.calls.lock().push((item.to_string(), payload.clone()));
        self.providers
            .lock()
            .push((item.to_string(), Arc::clone(provider)));
        if self.failing.lock().contains(item) {
            return Err(Error::transformation("dispatch failed"));
        }
        Ok(())
    }
}

/// A provider handle for listener registrations.
pub(crate) fn provider() -> ProviderHandle {
    Arc::new(GenericBindingProvider::new("test", EndpointKind::Exchange))
}
