//! Command keys and directive directions.

// ============================================================================
// Imports
// ============================================================================

use std::borrow::Borrow;
use std::fmt;

use crate::error::{Error, Result};

// ============================================================================
// CommandKey
// ============================================================================

/// Key selecting which directive of an item applies.
///
/// Directives without an explicit command use [`CommandKey::IN`]; state
/// updates look up [`CommandKey::CHANGED`]; [`CommandKey::WILDCARD`] matches
/// any command that has no directive of its own.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommandKey(String);

impl CommandKey {
    /// Reserved key for inbound directives.
    pub const IN: &'static str = "IN";

    /// Reserved key fired on state updates rather than commands.
    pub const CHANGED: &'static str = "CHANGED";

    /// Reserved key matching any command.
    pub const WILDCARD: &'static str = "*";

    /// Creates a key from a command string.
    #[inline]
    #[must_use]
    pub fn new(command: impl Into<String>) -> Self {
        Self(command.into())
    }

    /// The inbound key.
    #[inline]
    #[must_use]
    pub fn inbound() -> Self {
        Self::new(Self::IN)
    }

    /// The state-update key.
    #[inline]
    #[must_use]
    pub fn changed() -> Self {
        Self::new(Self::CHANGED)
    }

    /// The wildcard key.
    #[inline]
    #[must_use]
    pub fn wildcard() -> Self {
        Self::new(Self::WILDCARD)
    }

    /// Returns the key text.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` for the `IN` key.
    #[inline]
    #[must_use]
    pub fn is_inbound(&self) -> bool {
        self.0 == Self::IN
    }
}

impl fmt::Display for CommandKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CommandKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for CommandKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl Borrow<str> for CommandKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// Direction
// ============================================================================

/// Direction of a binding directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// `<`: messages flow from the endpoint into the item.
    Inbound,
    /// `>`: commands and updates flow from the item to the endpoint.
    Outbound,
}

impl Direction {
    /// Parses the directive marker character.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for anything other than `<` or `>`.
    pub fn from_marker(marker: &str) -> Result<Self> {
        match marker {
            "<" => Ok(Self::Inbound),
            ">" => Ok(Self::Outbound),
            other => Err(Error::config(format!(
                "unknown direction marker '{other}', expected '<' or '>'"
            ))),
        }
    }

    /// Returns the directive marker character.
    #[inline]
    #[must_use]
    pub const fn marker(&self) -> char {
        match self {
            Self::Inbound => '<',
            Self::Outbound => '>',
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
