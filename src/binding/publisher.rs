//! Inbound publish path.
//!
//! Turns a message received for an item into a typed state and posts it to
//! the event bus:
//!
//! ```text
//! payload ──► text ──► IN transformation ──► State::coerce(item type) ──► post_update
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::config::ProviderHandle;
use crate::error::{Error, Result};
use crate::item::{ItemType, State};
use crate::manager::Dispatcher;
use crate::transform::TransformationRegistry;
use crate::transport::Payload;

// ============================================================================
// EventPublisher
// ============================================================================

/// Destination of state updates produced from inbound messages.
pub trait EventPublisher: Send + Sync {
    /// Posts a new state for `item`.
    fn post_update(&self, item: &str, state: State);
}

impl<F> EventPublisher for F
where
    F: Fn(&str, State) + Send + Sync,
{
    fn post_update(&self, item: &str, state: State) {
        self(item, state);
    }
}

/// Forwards updates into a tokio channel.
impl EventPublisher for mpsc::UnboundedSender<(String, State)> {
    fn post_update(&self, item: &str, state: State) {
        if self.send((item.to_string(), state)).is_err() {
            warn!(item, "Event channel closed, dropping update");
        }
    }
}

// ============================================================================
// Publisher
// ============================================================================

/// [`Dispatcher`] that transforms, types and publishes inbound messages.
pub struct Publisher {
    transformations: Arc<TransformationRegistry>,
    events: Arc<dyn EventPublisher>,
}

impl fmt::Debug for Publisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Publisher").finish_non_exhaustive()
    }
}

impl Publisher {
    /// Creates a publisher.
    #[must_use]
    pub fn new(transformations: Arc<TransformationRegistry>, events: Arc<dyn EventPublisher>) -> Self {
        Self {
            transformations,
            events,
        }
    }

    /// Returns the transformation registry.
    #[inline]
    #[must_use]
    pub fn transformations(&self) -> &Arc<TransformationRegistry> {
        &self.transformations
    }

    /// Builds the state `item` takes for `payload`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `provider` does not know `item`.
    pub fn create_state(&self, item: &str, payload: &Payload, provider: &ProviderHandle) -> Result<State> {
        let item_type: ItemType = provider
            .item_type(item)
            .ok_or_else(|| Error::config(format!("item '{item}' is not configured")))?;

        let transformation = provider.inbound_transformation(item);
        let text = payload.as_text();
        let transformed = self
            .transformations
            .transform_message(transformation.as_deref(), &text);

        Ok(State::coerce(item_type, &transformed))
    }
}

impl Dispatcher for Publisher {
    fn dispatch(&self, item: &str, payload: &Payload, provider: &ProviderHandle) -> Result<()> {
        let state = self.create_state(item, payload, provider)?;
        debug!(item, state = %state, "Publishing state update");
        self.events.post_update(item, state);
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
