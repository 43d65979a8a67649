//! Declared item value types.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ============================================================================
// ItemType
// ============================================================================

/// Value type an item declares in its definition.
///
/// Drives the typed state created for inbound messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemType {
    /// Numeric value.
    Number,
    /// Open/closed contact.
    Contact,
    /// On/off switch.
    Switch,
    /// Dimmable light.
    Dimmer,
    /// Rollershutter position in percent.
    Rollershutter,
    /// Point in time.
    DateTime,
    /// Color value.
    Color,
    /// Free text.
    String,
}

impl ItemType {
    /// All variants, in declaration order.
    pub const ALL: [Self; 8] = [
        Self::Number,
        Self::Contact,
        Self::Switch,
        Self::Dimmer,
        Self::Rollershutter,
        Self::DateTime,
        Self::Color,
        Self::String,
    ];

    /// Returns the canonical type name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Number => "Number",
            Self::Contact => "Contact",
            Self::Switch => "Switch",
            Self::Dimmer => "Dimmer",
            Self::Rollershutter => "Rollershutter",
            Self::DateTime => "DateTime",
            Self::Color => "Color",
            Self::String => "String",
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ItemType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::config(format!("unknown item type '{s}'")))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_names() {
        assert_eq!("Switch".parse::<ItemType>().unwrap(), ItemType::Switch);
        assert_eq!("datetime".parse::<ItemType>().unwrap(), ItemType::DateTime);
        assert!("Location".parse::<ItemType>().is_err());
    }
}
