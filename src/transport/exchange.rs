//! In-process message exchange.
//!
//! An [`Exchange`] routes messages between components of the same process
//! by channel name. Each channel has at most one consumer, a [`Processor`]
//! that receives every message sent to the channel and may answer with a
//! reply.
//!
//! [`ExchangeTransport`] plugs a channel into the connection manager in one
//! of two roles:
//!
//! | Role | `start` | `send` | Inbound |
//! |------|---------|--------|---------|
//! | [`ExchangeRole::Consumer`] | binds a consumer | unsupported | every message sent to the channel |
//! | [`ExchangeRole::Dispatcher`] | marks open | delivers to the consumer | the consumer's reply, if any |
//!
//! Endpoint names use the `//channel` form; the leading slashes are not part
//! of the channel name.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::error::{Error, Result};

use super::{InboundHandler, Payload, Transport, TransportFactory};

// ============================================================================
// Constants
// ============================================================================

/// Prefix of exchange endpoint names.
pub const CHANNEL_PREFIX: &str = "//";

// ============================================================================
// Types
// ============================================================================

/// Consumer bound to a channel. Returns an optional reply.
pub type Processor = Arc<dyn Fn(Payload) -> Option<Payload> + Send + Sync>;

// ============================================================================
// Exchange
// ============================================================================

/// Channel registry shared by every exchange transport of a process.
#[derive(Default)]
pub struct Exchange {
    consumers: RwLock<FxHashMap<String, Processor>>,
}

impl fmt::Debug for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Exchange")
            .field("channels", &self.consumers.read().len())
            .finish()
    }
}

impl Exchange {
    /// Creates an empty exchange.
    #[inline]
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Strips the endpoint prefix, returning the channel name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidEndpoint`] if no channel name remains.
    pub fn channel_name(endpoint: &str) -> Result<&str> {
        let channel = endpoint.strip_prefix(CHANNEL_PREFIX).unwrap_or(endpoint);
        if channel.trim().is_empty() {
            return Err(Error::invalid_endpoint(endpoint, "channel name is empty"));
        }
        Ok(channel)
    }

    /// Binds `processor` as the consumer of `channel`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if the channel already has a consumer.
    pub fn bind(&self, channel: &str, processor: Processor) -> Result<()> {
        let mut consumers = self.consumers.write();
        if consumers.contains_key(channel) {
            return Err(Error::connection(format!(
                "channel '{channel}' already has a consumer"
            )));
        }
        consumers.insert(channel.to_string(), processor);
        debug!(channel, "Consumer bound");
        Ok(())
    }

    /// Removes the consumer of `channel`.
    pub fn unbind(&self, channel: &str) -> bool {
        let removed = self.consumers.write().remove(channel).is_some();
        if removed {
            debug!(channel, "Consumer unbound");
        }
        removed
    }

    /// Returns `true` if `channel` has a consumer.
    #[must_use]
    pub fn has_consumer(&self, channel: &str) -> bool {
        self.consumers.read().contains_key(channel)
    }

    /// Delivers `payload` to the consumer of `channel` and returns its reply.
    ///
    /// The consumer runs on the calling thread without any exchange lock
    /// held.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoConsumer`] if nothing is bound to `channel`.
    pub fn request(&self, channel: &str, payload: Payload) -> Result<Option<Payload>> {
        let processor = self
            .consumers
            .read()
            .get(channel)
            .cloned()
            .ok_or_else(|| Error::no_consumer(channel))?;

        trace!(channel, size = payload.len(), "Delivering to consumer");
        Ok(processor(payload))
    }
}

// ============================================================================
// ExchangeRole
// ============================================================================

/// Role of an exchange transport on its channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExchangeRole {
    /// Consumes every message sent to the channel.
    Consumer,
    /// Sends to the channel's consumer and receives its replies.
    Dispatcher,
}

// ============================================================================
// ExchangeTransport
// ============================================================================

/// Transport bound to one exchange channel.
pub struct ExchangeTransport {
    endpoint: String,
    channel: String,
    role: ExchangeRole,
    exchange: Arc<Exchange>,
    /// Inbound handler while started.
    inbound: Mutex<Option<InboundHandler>>,
}

impl fmt::Debug for ExchangeTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExchangeTransport")
            .field("endpoint", &self.endpoint)
            .field("role", &self.role)
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}

impl ExchangeTransport {
    /// Creates an unopened transport for `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidEndpoint`] if the endpoint has no channel name.
    pub fn new(exchange: Arc<Exchange>, endpoint: &str, role: ExchangeRole) -> Result<Self> {
        let channel = Exchange::channel_name(endpoint)?.to_string();
        Ok(Self {
            endpoint: endpoint.to_string(),
            channel,
            role,
            exchange,
            inbound: Mutex::new(None),
        })
    }

    /// Returns the channel name.
    #[inline]
    #[must_use]
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Returns the transport role.
    #[inline]
    #[must_use]
    pub fn role(&self) -> ExchangeRole {
        self.role
    }
}

impl Transport for ExchangeTransport {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn start(&self, inbound: InboundHandler) -> Result<()> {
        let mut guard = self.inbound.lock();
        if guard.is_some() {
            return Ok(());
        }

        if self.role == ExchangeRole::Consumer {
            let handler = Arc::clone(&inbound);
            let processor: Processor = Arc::new(move |payload| {
                handler(payload);
                None
            });
            self.exchange.bind(&self.channel, processor)?;
        }

        *guard = Some(inbound);
        debug!(channel = %self.channel, role = ?self.role, "Exchange transport started");
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        let mut guard = self.inbound.lock();
        if guard.take().is_some() && self.role == ExchangeRole::Consumer {
            self.exchange.unbind(&self.channel);
        }
        Ok(())
    }

    fn send(&self, payload: Payload) -> Result<()> {
        if self.role == ExchangeRole::Consumer {
            return Err(Error::unsupported(format!(
                "consumer on '{}' cannot send",
                self.channel
            )));
        }

        let inbound = self.inbound.lock().clone().ok_or(Error::ConnectionClosed)?;

        if let Some(reply) = self.exchange.request(&self.channel, payload)?
            && !reply.is_empty()
        {
            inbound(reply);
        }

        Ok(())
    }

    fn is_open(&self) -> bool {
        self.inbound.lock().is_some()
    }
}

impl Drop for ExchangeTransport {
    fn drop(&mut self) {
        if self.role == ExchangeRole::Consumer && self.inbound.get_mut().take().is_some() {
            self.exchange.unbind(&self.channel);
        }
    }
}

// ============================================================================
// ExchangeFactory
// ============================================================================

/// Creates exchange transports of one role.
#[derive(Debug, Clone)]
pub struct ExchangeFactory {
    exchange: Arc<Exchange>,
    role: ExchangeRole,
}

impl ExchangeFactory {
    /// Creates a factory producing `role` transports on `exchange`.
    #[inline]
    #[must_use]
    pub fn new(exchange: Arc<Exchange>, role: ExchangeRole) -> Self {
        Self { exchange, role }
    }

    /// Factory for consumer transports.
    #[inline]
    #[must_use]
    pub fn consumer(exchange: Arc<Exchange>) -> Self {
        Self::new(exchange, ExchangeRole::Consumer)
    }

    /// Factory for dispatcher transports.
    #[inline]
    #[must_use]
    pub fn dispatcher(exchange: Arc<Exchange>) -> Self {
        Self::new(exchange, ExchangeRole::Dispatcher)
    }

    /// Returns the shared exchange.
    #[inline]
    #[must_use]
    pub fn exchange(&self) -> &Arc<Exchange> {
        &self.exchange
    }
}

impl TransportFactory for ExchangeFactory {
    type Transport = ExchangeTransport;

    fn create(&self, endpoint: &str) -> Result<ExchangeTransport> {
        ExchangeTransport::new(Arc::clone(&self.exchange), endpoint, self.role)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn collecting_handler() -> (InboundHandler, Arc<Mutex<Vec<Payload>>>) {
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        let handler: InboundHandler = Arc::new(move |payload| sink.lock().push(payload));
        (handler, received)
    }

    #[test]
    fn test_channel_name() {
        assert_eq!(Exchange::channel_name("//lights").unwrap(), "lights");
        assert_eq!(Exchange::channel_name("lights").unwrap(), "lights");
        assert!(Exchange::channel_name("//").is_err());
    }

    #[test]
    fn test_single_consumer_per_channel() {
        let exchange = Exchange::new();
        let noop: Processor = Arc::new(|_| None);
        exchange.bind("a", Arc::clone(&noop)).unwrap();
        assert!(exchange.bind("a", noop).is_err());
        assert!(exchange.unbind("a"));
        assert!(!exchange.has_consumer("a"));
    }

    #[test]
    fn test_request_without_consumer() {
        let exchange = Exchange::new();
        let err = exchange.request("nobody", Payload::text("x")).unwrap_err();
        assert!(matches!(err, Error::NoConsumer { .. }));
    }

    #[test]
    fn test_consumer_receives_dispatched_message() {
        let exchange = Exchange::new();
        let consumer = ExchangeTransport::new(
            Arc::clone(&exchange),
            "//lights",
            ExchangeRole::Consumer,
        )
        .unwrap();
        let dispatcher = ExchangeTransport::new(
            Arc::clone(&exchange),
            "//lights",
            ExchangeRole::Dispatcher,
        )
        .unwrap();

        let (handler, received) = collecting_handler();
        consumer.start(handler).unwrap();
        dispatcher.start(Arc::new(|_| {})).unwrap();

        dispatcher.send(Payload::text("ON")).unwrap();
        assert_eq!(received.lock().as_slice(), &[Payload::text("ON")]);
    }

    #[test]
    fn test_dispatcher_receives_reply() {
        let exchange = Exchange::new();
        exchange
            .bind(
                "echo",
                Arc::new(|p: Payload| Some(Payload::text(format!("ack:{p}")))),
            )
            .unwrap();

        let dispatcher =
            ExchangeTransport::new(Arc::clone(&exchange), "//echo", ExchangeRole::Dispatcher)
                .unwrap();
        let (handler, received) = collecting_handler();
        dispatcher.start(handler).unwrap();
        dispatcher.send(Payload::text("ping")).unwrap();

        assert_eq!(received.lock().as_slice(), &[Payload::text("ack:ping")]);
    }

    #[test]
    fn test_dispatcher_send_before_start_fails() {
        let exchange = Exchange::new();
        let dispatcher =
            ExchangeTransport::new(exchange, "//x", ExchangeRole::Dispatcher).unwrap();
        assert!(matches!(
            dispatcher.send(Payload::text("x")),
            Err(Error::ConnectionClosed)
        ));
    }

    #[test]
    fn test_consumer_start_stop_idempotent() {
        let exchange = Exchange::new();
        let consumer =
            ExchangeTransport::new(Arc::clone(&exchange), "//c", ExchangeRole::Consumer).unwrap();

        consumer.start(Arc::new(|_| {})).unwrap();
        consumer.start(Arc::new(|_| {})).unwrap();
        assert!(consumer.is_open());
        assert!(exchange.has_consumer("c"));

        consumer.stop().unwrap();
        consumer.stop().unwrap();
        assert!(!consumer.is_open());
        assert!(!exchange.has_consumer("c"));
    }

    #[test]
    fn test_dropped_consumer_frees_channel() {
        let exchange = Exchange::new();
        let consumer =
            ExchangeTransport::new(Arc::clone(&exchange), "//c", ExchangeRole::Consumer).unwrap();
        consumer.start(Arc::new(|_| {})).unwrap();
        assert!(exchange.has_consumer("c"));

        drop(consumer);
        assert!(!exchange.has_consumer("c"));
    }

    #[test]
    fn test_dropping_unstarted_consumer_keeps_other_binding() {
        let exchange = Exchange::new();
        let first =
            ExchangeTransport::new(Arc::clone(&exchange), "//c", ExchangeRole::Consumer).unwrap();
        let second =
            ExchangeTransport::new(Arc::clone(&exchange), "//c", ExchangeRole::Consumer).unwrap();
        first.start(Arc::new(|_| {})).unwrap();
        assert!(second.start(Arc::new(|_| {})).is_err());

        drop(second);
        assert!(exchange.has_consumer("c"));
        assert!(first.is_open());
    }

    #[test]
    fn test_consumer_cannot_send() {
        let exchange = Exchange::new();
        let consumer = ExchangeTransport::new(exchange, "//c", ExchangeRole::Consumer).unwrap();
        assert!(consumer.send(Payload::text("x")).unwrap_err().is_transport_error());
    }

    #[test]
    fn test_factory_validates_endpoint() {
        let factory = ExchangeFactory::dispatcher(Exchange::new());
        assert!(factory.create("//ok").is_ok());
        assert!(factory.create("//").is_err());
    }
}
