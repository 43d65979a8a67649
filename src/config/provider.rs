//! Binding providers.
//!
//! A [`BindingProvider`] answers which endpoint and transformation an item
//! uses for a given direction and command. [`GenericBindingProvider`] is the
//! stock implementation, fed with directive strings per item.

// ============================================================================
// Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::item::{CommandKey, Direction, ItemType};

use super::directive::{Directive, EndpointKind, parse_directives};

// ============================================================================
// Types
// ============================================================================

/// Shared provider reference, handed to connections as listener payload.
pub type ProviderHandle = Arc<dyn BindingProvider>;

// ============================================================================
// BindingProvider
// ============================================================================

/// Source of binding configuration for items.
pub trait BindingProvider: Send + Sync {
    /// Name of the binding this provider configures.
    fn binding_type(&self) -> &str;

    /// Declared type of `item`, or `None` if the provider does not know it.
    fn item_type(&self, item: &str) -> Option<ItemType>;

    /// Every directive configured for `item`.
    fn directives(&self, item: &str) -> Vec<Directive>;

    /// Names of all configured items.
    fn item_names(&self) -> Vec<String>;

    /// The directive for an exact `(direction, command)` pair.
    fn directive(&self, item: &str, direction: Direction, command: &CommandKey) -> Option<Directive> {
        self.directives(item)
            .into_iter()
            .rev()
            .find(|d| d.direction == direction && &d.command == command)
    }

    /// Returns `true` if the provider knows `item`.
    fn provides_binding_for(&self, item: &str) -> bool {
        self.item_type(item).is_some()
    }

    /// Endpoint of the inbound `IN` directive of `item`.
    ///
    /// With several `<` directives the last one wins, like
    /// [`inbound_transformation`](Self::inbound_transformation).
    fn inbound_endpoint(&self, item: &str) -> Option<String> {
        self.directive(item, Direction::Inbound, &CommandKey::inbound())
            .map(|d| d.endpoint)
    }

    /// Transformation of the inbound `IN` directive of `item`.
    ///
    /// An item has one inbound transformation. With several `<` directives
    /// the last one applies to messages from every inbound endpoint, so
    /// `<[//a:T1]<[//b:T2]` transforms messages from `//a` with `T2`.
    fn inbound_transformation(&self, item: &str) -> Option<String> {
        self.directive(item, Direction::Inbound, &CommandKey::inbound())
            .and_then(|d| d.transformation)
    }

    /// Outbound directive for `command`, falling back to the `*` wildcard.
    fn resolve_outbound(&self, item: &str, command: &CommandKey) -> Option<Directive> {
        self.directive(item, Direction::Outbound, command)
            .or_else(|| self.directive(item, Direction::Outbound, &CommandKey::wildcard()))
    }

    /// Items that carry an inbound `IN` directive.
    fn inbound_items(&self) -> Vec<String> {
        self.item_names()
            .into_iter()
            .filter(|item| self.inbound_endpoint(item).is_some())
            .collect()
    }
}

// ============================================================================
// ItemDefinition
// ============================================================================

/// Serialized item definition, as loaded from configuration files.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ItemDefinition {
    /// Item name.
    pub name: String,
    /// Declared item type.
    #[serde(rename = "type")]
    pub item_type: ItemType,
    /// Directive string.
    pub binding: String,
}

// ============================================================================
// GenericBindingProvider
// ============================================================================

/// Parsed configuration of one item.
#[derive(Debug, Clone)]
struct ItemBinding {
    item_type: ItemType,
    directives: Vec<Directive>,
}

/// Directive-string backed provider for one endpoint kind.
pub struct GenericBindingProvider {
    binding_type: String,
    kind: EndpointKind,
    items: RwLock<BTreeMap<String, ItemBinding>>,
}

impl fmt::Debug for GenericBindingProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenericBindingProvider")
            .field("binding_type", &self.binding_type)
            .field("kind", &self.kind)
            .field("items", &self.items.read().len())
            .finish()
    }
}

impl GenericBindingProvider {
    /// Creates an empty provider.
    #[must_use]
    pub fn new(binding_type: impl Into<String>, kind: EndpointKind) -> Self {
        Self {
            binding_type: binding_type.into(),
            kind,
            items: RwLock::new(BTreeMap::new()),
        }
    }

    /// Returns the accepted endpoint kind.
    #[inline]
    #[must_use]
    pub fn kind(&self) -> EndpointKind {
        self.kind
    }

    /// Parses and stores the configuration of `item`, replacing any
    /// previous one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] or [`Error::InvalidEndpoint`] if the
    /// configuration is invalid. The previous configuration is kept then.
    pub fn process_binding_configuration(
        &self,
        item: &str,
        item_type: ItemType,
        config: &str,
    ) -> Result<()> {
        let directives = parse_directives(item, config, self.kind)?;

        for directive in &directives {
            debug!(
                item,
                direction = %directive.direction.marker(),
                command = %directive.command,
                endpoint = %directive.endpoint,
                transformation = ?directive.transformation,
                "Adding binding"
            );
        }

        self.items.write().insert(
            item.to_string(),
            ItemBinding {
                item_type,
                directives,
            },
        );
        Ok(())
    }

    /// Removes the configuration of `item`.
    pub fn remove_item(&self, item: &str) -> bool {
        self.items.write().remove(item).is_some()
    }

    /// Loads item definitions. Invalid items are skipped and their errors
    /// returned; the others are stored.
    pub fn load(&self, definitions: &[ItemDefinition]) -> Vec<Error> {
        definitions
            .iter()
            .filter_map(|def| {
                self.process_binding_configuration(&def.name, def.item_type, &def.binding)
                    .inspect_err(|e| warn!(item = %def.name, error = %e, "Skipping item"))
                    .err()
            })
            .collect()
    }

    /// Loads item definitions from a JSON array.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if the document is not an array of item
    /// definitions. Per-item errors are returned in the `Ok` vector.
    pub fn load_json(&self, json: &str) -> Result<Vec<Error>> {
        let definitions: Vec<ItemDefinition> = serde_json::from_str(json)?;
        Ok(self.load(&definitions))
    }

    /// Items with at least one directive for `command`.
    #[must_use]
    pub fn item_names_for(&self, command: &CommandKey) -> Vec<String> {
        self.items
            .read()
            .iter()
            .filter(|(_, binding)| binding.directives.iter().any(|d| &d.command == command))
            .map(|(name, _)| name.clone())
            .collect()
    }
}

impl BindingProvider for GenericBindingProvider {
    fn binding_type(&self) -> &str {
        &self.binding_type
    }

    fn item_type(&self, item: &str) -> Option<ItemType> {
        self.items.read().get(item).map(|b| b.item_type)
    }

    fn directives(&self, item: &str) -> Vec<Directive> {
        self.items
            .read()
            .get(item)
            .map(|b| b.directives.clone())
            .unwrap_or_default()
    }

    fn item_names(&self) -> Vec<String> {
        self.items.read().keys().cloned().collect()
    }
}

// ============================================================================
// Tests
// ============================================================================
