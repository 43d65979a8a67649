//! Binding adapter.
//!
//! Connects the event bus to the connection manager. Outbound commands and
//! state updates are routed to the endpoint of the first provider that
//! configures them; inbound messages flow back through the [`Publisher`].

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, trace, warn};

use crate::config::{BindingOptions, Directive, ProviderHandle};
use crate::item::{CommandKey, State};
use crate::manager::ConnectionManager;
use crate::transform::TransformationRegistry;
use crate::transport::{Payload, TransportFactory};

use super::{EventPublisher, Publisher};

// ============================================================================
// Binding
// ============================================================================

/// Event-bus facing side of a transport binding.
///
/// # Example
///
/// ```ignore
/// let exchange = Exchange::new();
/// let binding = Arc::new(Binding::new(
///     "exchange",
///     ExchangeFactory::consumer(exchange),
///     Arc::new(TransformationRegistry::new()),
///     events,
/// ));
///
/// binding.add_provider(provider);
/// binding.activate();
/// let keep_alive = binding.spawn_keep_alive();
///
/// binding.receive_command("lamp", "ON");
/// ```
pub struct Binding<F: TransportFactory> {
    name: String,
    providers: RwLock<Vec<ProviderHandle>>,
    manager: ConnectionManager<F>,
    publisher: Arc<Publisher>,
    options: RwLock<BindingOptions>,
}

impl<F: TransportFactory> fmt::Debug for Binding<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("name", &self.name)
            .field("providers", &self.providers.read().len())
            .field("manager", &self.manager)
            .field("options", &*self.options.read())
            .finish()
    }
}

// ============================================================================
// Binding - Constructor
// ============================================================================

impl<F: TransportFactory> Binding<F> {
    /// Creates a binding with default options.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        factory: F,
        transformations: Arc<TransformationRegistry>,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        Self::with_options(name, factory, transformations, events, BindingOptions::default())
    }

    /// Creates a binding with explicit options.
    #[must_use]
    pub fn with_options(
        name: impl Into<String>,
        factory: F,
        transformations: Arc<TransformationRegistry>,
        events: Arc<dyn EventPublisher>,
        options: BindingOptions,
    ) -> Self {
        let publisher = Arc::new(Publisher::new(transformations, events));
        let manager = ConnectionManager::new(factory, publisher.clone());
        manager.set_restart_on_remove(options.restart_on_remove());

        Self {
            name: name.into(),
            providers: RwLock::new(Vec::new()),
            manager,
            publisher,
            options: RwLock::new(options),
        }
    }

    /// Returns the binding name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the connection manager.
    #[inline]
    #[must_use]
    pub fn manager(&self) -> &ConnectionManager<F> {
        &self.manager
    }

    /// Returns the current options.
    #[must_use]
    pub fn options(&self) -> BindingOptions {
        self.options.read().clone()
    }
}

// ============================================================================
// Binding - Lifecycle
// ============================================================================

impl<F: TransportFactory> Binding<F> {
    /// Initializes the manager and binds every configured item.
    pub fn activate(&self) {
        self.manager.init();
        self.initialize_all();
        info!(binding = %self.name, "Binding activated");
    }

    /// Stops every connection and releases the manager.
    pub fn deactivate(&self) {
        self.manager.release();
        info!(binding = %self.name, "Binding deactivated");
    }

    /// Applies `options`, if given, and re-binds every configured item.
    pub fn updated(&self, options: Option<BindingOptions>) {
        if let Some(options) = options {
            self.manager.set_restart_on_remove(options.restart_on_remove());
            *self.options.write() = options;
            debug!(binding = %self.name, "Options updated");
        }
        self.initialize_all();
    }

    /// Registers a provider. Providers are consulted in registration order.
    pub fn add_provider(&self, provider: ProviderHandle) {
        self.providers.write().push(provider);
    }

    /// Unregisters a provider and unbinds its items.
    pub fn remove_provider(&self, provider: &ProviderHandle) {
        let removed = {
            let mut providers = self.providers.write();
            let before = providers.len();
            providers.retain(|p| !Arc::ptr_eq(p, provider));
            before != providers.len()
        };

        if removed {
            for item in provider.item_names() {
                self.release_item(&item);
            }
        }
    }

    /// Re-binds `item` if `provider` still configures it, unbinds it
    /// otherwise.
    pub fn binding_changed(&self, provider: &ProviderHandle, item: &str) {
        if provider.provides_binding_for(item) {
            self.initialize_item(item, provider);
        } else {
            self.release_item(item);
        }
    }

    /// Re-binds every item of `provider`.
    pub fn all_bindings_changed(&self, provider: &ProviderHandle) {
        for item in provider.item_names() {
            self.initialize_item(&item, provider);
        }
    }

    fn initialize_all(&self) {
        let providers = self.providers.read().clone();
        for provider in &providers {
            self.all_bindings_changed(provider);
        }
    }

    /// Binds `item` to the endpoint of each of its directives.
    ///
    /// Inbound directives register the item as a listener; outbound ones
    /// only hold a reference on the endpoint.
    fn initialize_item(&self, item: &str, provider: &ProviderHandle) {
        for directive in provider.directives(item) {
            let listener = directive.is_inbound().then(|| Arc::clone(provider));
            if let Err(e) = self.manager.add(item, &directive.endpoint, listener) {
                error!(
                    item,
                    endpoint = %directive.endpoint,
                    error = %e,
                    "Failed to bind item"
                );
            }
        }
    }

    fn release_item(&self, item: &str) {
        self.manager.remove(item);
    }
}

// ============================================================================
// Binding - Event Bus
// ============================================================================

impl<F: TransportFactory> Binding<F> {
    /// Sends `command` for `item` to its configured endpoint.
    pub fn receive_command(&self, item: &str, command: &str) {
        self.send_outbound(item, &CommandKey::new(command), command);
    }

    /// Sends the text of `state` to the endpoint `item` configures for
    /// `CHANGED`.
    pub fn receive_update(&self, item: &str, state: &State) {
        self.send_outbound(item, &CommandKey::changed(), &state.to_string());
    }

    fn send_outbound(&self, item: &str, key: &CommandKey, message: &str) {
        let Some(directive) = self.find_first_matching(item, key) else {
            trace!(item, command = %key, "No outbound binding");
            return;
        };

        let transformed = self
            .publisher
            .transformations()
            .transform_message(directive.transformation.as_deref(), message);

        debug!(
            item,
            command = %key,
            endpoint = %directive.endpoint,
            message = %transformed,
            "Sending message"
        );

        if let Err(e) = self.manager.send(&directive.endpoint, Payload::Text(transformed)) {
            error!(item, endpoint = %directive.endpoint, error = %e, "Failed to send message");
        }
    }

    /// First provider, in registration order, with an outbound directive
    /// for `key` or the wildcard.
    fn find_first_matching(&self, item: &str, key: &CommandKey) -> Option<Directive> {
        self.providers
            .read()
            .iter()
            .find_map(|provider| provider.resolve_outbound(item, key))
    }
}

// ============================================================================
// Binding - Keep-alive
// ============================================================================

impl<F: TransportFactory> Binding<F> {
    /// Re-opens closed connections of every item with an inbound `IN`
    /// directive.
    pub fn check_connections(&self) {
        let providers = self.providers.read().clone();

        for provider in &providers {
            for item in provider.inbound_items() {
                let Some(endpoint) = provider.inbound_endpoint(&item) else {
                    continue;
                };
                if !self.manager.ensure_connected(&endpoint) {
                    warn!(item = %item, endpoint = %endpoint, "Unable to find connection");
                }
            }
        }
    }

    /// Spawns the periodic keep-alive task.
    ///
    /// The task runs [`check_connections`](Self::check_connections) every
    /// refresh interval and ends when the binding is dropped.
    pub fn spawn_keep_alive(self: &Arc<Self>) -> JoinHandle<()> {
        let binding = Arc::downgrade(self);
        let period = self.options.read().refresh_interval();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick completes immediately.
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let Some(binding) = binding.upgrade() else {
                    debug!("Binding dropped, keep-alive stopped");
                    break;
                };
                trace!(binding = %binding.name, "Keep-alive check");
                binding.check_connections();
            }
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EndpointKind, GenericBindingProvider};
    use crate::item::{ItemType, OnOff};
    use crate::manager::testing::MockFactory;
    use crate::transport::{Exchange, ExchangeFactory};
    use parking_lot::Mutex;
    use std::time::Duration;

    type Updates = Arc<Mutex<Vec<(String, State)>>>;

    fn binding_with<F: TransportFactory>(factory: F) -> (Binding<F>, Updates) {
        let updates: Updates = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&updates);
        let events = Arc::new(move |item: &str, state: State| {
            sink.lock().push((item.to_string(), state));
        });
        let binding = Binding::new(
            "test",
            factory,
            Arc::new(TransformationRegistry::new()),
            events,
        );
        (binding, updates)
    }

    fn binding() -> (Binding<MockFactory>, Updates) {
        binding_with(MockFactory::default())
    }

    fn provider(items: &[(&str, ItemType, &str)]) -> Arc<GenericBindingProvider> {
        let provider = GenericBindingProvider::new("test", EndpointKind::Exchange);
        for (item, item_type, config) in items {
            provider
                .process_binding_configuration(item, *item_type, config)
                .unwrap();
        }
        Arc::new(provider)
    }

    #[test]
    fn test_activate_binds_items() {
        let (binding, _) = binding();
        binding.add_provider(provider(&[
            ("temp", ItemType::Number, "<[//sensors]"),
            ("hum", ItemType::Number, "<[//sensors]"),
            ("lamp", ItemType::Switch, "<[//lights]>[ON://lights]"),
        ]));
        binding.activate();

        let manager = binding.manager();
        assert_eq!(manager.connection_count(), 2);
        assert_eq!(manager.connection("//sensors").map(|c| c.reference_count()), Some(2));
        assert_eq!(manager.item_endpoints("lamp"), vec!["//lights".to_string()]);
    }

    #[test]
    fn test_inbound_message_published() {
        let (binding, updates) = binding();
        binding.add_provider(provider(&[("lamp", ItemType::Switch, "<[//lights]")]));
        binding.activate();

        let conn = binding.manager().connection("//lights").unwrap();
        conn.transport().emit(Payload::text("ON"));

        assert_eq!(
            updates.lock().as_slice(),
            &[("lamp".to_string(), State::OnOff(OnOff::On))]
        );
    }

    #[test]
    fn test_outbound_only_item_gets_no_messages() {
        let (binding, updates) = binding();
        binding.add_provider(provider(&[
            ("display", ItemType::String, ">[*://panel]"),
            ("button", ItemType::String, "<[//panel]"),
        ]));
        binding.activate();

        let conn = binding.manager().connection("//panel").unwrap();
        assert_eq!(conn.reference_count(), 2);
        conn.transport().emit(Payload::text("pressed"));

        let items: Vec<String> = updates.lock().iter().map(|(i, _)| i.clone()).collect();
        assert_eq!(items, vec!["button".to_string()]);
    }

    #[test]
    fn test_receive_command_with_transformation() {
        let (binding, _) = binding();
        binding.add_provider(provider(&[(
            "lamp",
            ItemType::Switch,
            ">[ON://lights:REGEX(O(N))]",
        )]));
        binding.activate();

        binding.receive_command("lamp", "ON");

        let conn = binding.manager().connection("//lights").unwrap();
        assert_eq!(conn.transport().sent(), vec![Payload::text("N")]);
    }

    #[test]
    fn test_wildcard_fallback() {
        let (binding, _) = binding();
        binding.add_provider(provider(&[(
            "lamp",
            ItemType::Switch,
            ">[ON://on]>[*://any]",
        )]));
        binding.activate();

        binding.receive_command("lamp", "OFF");
        binding.receive_command("lamp", "ON");

        let any = binding.manager().connection("//any").unwrap();
        let on = binding.manager().connection("//on").unwrap();
        assert_eq!(any.transport().sent(), vec![Payload::text("OFF")]);
        assert_eq!(on.transport().sent(), vec![Payload::text("ON")]);
    }

    #[test]
    fn test_receive_update_sends_state_text() {
        let (binding, _) = binding();
        binding.add_provider(provider(&[("temp", ItemType::Number, ">[CHANGED://out]")]));
        binding.activate();

        binding.receive_update("temp", &State::Decimal(21.5));

        let conn = binding.manager().connection("//out").unwrap();
        assert_eq!(conn.transport().sent(), vec![Payload::text("21.5")]);
    }

    #[test]
    fn test_first_provider_wins() {
        let (binding, _) = binding();
        binding.add_provider(provider(&[("lamp", ItemType::Switch, ">[ON://first]")]));
        binding.add_provider(provider(&[("lamp", ItemType::Switch, ">[ON://second]")]));
        binding.activate();

        binding.receive_command("lamp", "ON");

        let first = binding.manager().connection("//first").unwrap();
        let second = binding.manager().connection("//second").unwrap();
        assert_eq!(first.transport().sent().len(), 1);
        assert!(second.transport().sent().is_empty());
    }

    #[test]
    fn test_unconfigured_command_is_ignored() {
        let (binding, _) = binding();
        binding.add_provider(provider(&[("lamp", ItemType::Switch, ">[ON://lights]")]));
        binding.activate();

        binding.receive_command("lamp", "OFF");
        binding.receive_command("ghost", "ON");

        let conn = binding.manager().connection("//lights").unwrap();
        assert!(conn.transport().sent().is_empty());
    }

    #[test]
    fn test_binding_changed_releases_removed_item() {
        let (binding, _) = binding();
        let p = provider(&[("temp", ItemType::Number, "<[//sensors]")]);
        binding.add_provider(p.clone());
        binding.activate();
        assert_eq!(binding.manager().connection_count(), 1);

        p.remove_item("temp");
        let handle: ProviderHandle = p;
        binding.binding_changed(&handle, "temp");
        assert_eq!(binding.manager().connection_count(), 0);
    }

    #[test]
    fn test_updated_is_idempotent_and_applies_options() {
        let (binding, _) = binding();
        binding.add_provider(provider(&[("temp", ItemType::Number, "<[//sensors]")]));
        binding.activate();

        let options = BindingOptions::builder()
            .restart_on_remove(true)
            .build()
            .unwrap();
        binding.updated(Some(options));
        binding.updated(None);

        assert!(binding.manager().restart_on_remove());
        let conn = binding.manager().connection("//sensors").unwrap();
        assert_eq!(conn.reference_count(), 1);
        assert_eq!(binding.manager().factory().created(), 1);
    }

    #[test]
    fn test_deactivate_stops_everything() {
        let (binding, _) = binding();
        binding.add_provider(provider(&[("temp", ItemType::Number, "<[//sensors]")]));
        binding.activate();
        let conn = binding.manager().connection("//sensors").unwrap();

        binding.deactivate();
        assert!(!conn.is_open());
        binding.receive_command("temp", "x");
        binding.check_connections();
    }

    #[test]
    fn test_check_connections_reconnects() {
        let (binding, _) = binding();
        binding.add_provider(provider(&[("temp", ItemType::Number, "<[//sensors]")]));
        binding.activate();

        let conn = binding.manager().connection("//sensors").unwrap();
        conn.transport().drop_connection();
        binding.check_connections();

        assert!(conn.is_open());
        assert_eq!(conn.transport().start_count(), 2);
    }

    #[test]
    fn test_remove_provider_unbinds_items() {
        let (binding, _) = binding();
        let p = provider(&[("temp", ItemType::Number, "<[//sensors]")]);
        binding.add_provider(p.clone());
        binding.activate();

        let handle: ProviderHandle = p;
        binding.remove_provider(&handle);
        assert_eq!(binding.manager().connection_count(), 0);
    }

    #[test]
    fn test_dispatcher_command_reaches_consumer_binding() {
        let exchange = Exchange::new();

        let (consumer, consumed) = binding_with(ExchangeFactory::consumer(Arc::clone(&exchange)));
        consumer.add_provider(provider(&[("lamp", ItemType::Switch, "<[//lights]")]));
        consumer.activate();

        let (dispatcher, dispatched) =
            binding_with(ExchangeFactory::dispatcher(Arc::clone(&exchange)));
        dispatcher.add_provider(provider(&[(
            "wall_switch",
            ItemType::Switch,
            ">[ON://lights]",
        )]));
        dispatcher.activate();

        dispatcher.receive_command("wall_switch", "ON");

        assert_eq!(
            consumed.lock().as_slice(),
            &[("lamp".to_string(), State::OnOff(OnOff::On))]
        );
        assert!(dispatched.lock().is_empty());
    }

    #[test]
    fn test_dispatcher_reply_published_to_inbound_items() {
        let exchange = Exchange::new();
        exchange
            .bind(
                "thermostat",
                Arc::new(|p: Payload| {
                    (p.as_text() == "READ").then(|| Payload::text(r#"{"temp": 19.5}"#))
                }),
            )
            .unwrap();

        let (dispatcher, updates) =
            binding_with(ExchangeFactory::dispatcher(Arc::clone(&exchange)));
        dispatcher.add_provider(provider(&[
            ("poll", ItemType::String, ">[READ://thermostat]>[IGNORE://thermostat]"),
            ("temp", ItemType::Number, "<[//thermostat:JSONPATH($.temp)]"),
        ]));
        dispatcher.activate();

        dispatcher.receive_command("poll", "READ");
        dispatcher.receive_command("poll", "IGNORE");

        assert_eq!(
            updates.lock().as_slice(),
            &[("temp".to_string(), State::Decimal(19.5))]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_keep_alive_task() {
        let (binding, _) = binding();
        let options = BindingOptions::builder()
            .refresh_interval(Duration::from_secs(1))
            .build()
            .unwrap();
        binding.updated(Some(options));
        binding.add_provider(provider(&[("temp", ItemType::Number, "<[//sensors]")]));
        binding.activate();

        let binding = Arc::new(binding);
        let task = binding.spawn_keep_alive();

        let conn = binding.manager().connection("//sensors").unwrap();
        conn.transport().drop_connection();

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(conn.is_open());

        drop(conn);
        drop(binding);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(task.is_finished());
    }
}
