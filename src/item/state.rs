//! Typed item states.
//!
//! Inbound payloads arrive as text and are coerced into a [`State`] chosen by
//! the item's declared [`ItemType`]. The precedence is fixed:
//!
//! | Item type | State |
//! |-----------|-------|
//! | `Number` | [`State::Decimal`] |
//! | `Contact` | [`State::OpenClosed`] |
//! | `Switch` | [`State::OnOff`] |
//! | `Rollershutter` | [`State::Percent`] |
//! | `DateTime` | [`State::DateTime`] |
//! | anything else | [`State::Text`] |
//!
//! Text that does not parse as the chosen type falls back to
//! [`State::Text`].

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, Local, NaiveDateTime, TimeZone};
use tracing::debug;

use crate::error::{Error, Result};

use super::types::ItemType;

// ============================================================================
// Constants
// ============================================================================

/// Accepted local date-time layouts, tried after RFC 3339.
const DATE_TIME_LAYOUTS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"];

// ============================================================================
// OnOff / OpenClosed
// ============================================================================

/// Switch state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OnOff {
    /// Switched on.
    On,
    /// Switched off.
    Off,
}

impl FromStr for OnOff {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ON" => Ok(Self::On),
            "OFF" => Ok(Self::Off),
            _ => Err(Error::invalid_state(s, "OnOff")),
        }
    }
}

impl fmt::Display for OnOff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::On => "ON",
            Self::Off => "OFF",
        })
    }
}

/// Contact state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpenClosed {
    /// Contact open.
    Open,
    /// Contact closed.
    Closed,
}

impl FromStr for OpenClosed {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "OPEN" => Ok(Self::Open),
            "CLOSED" => Ok(Self::Closed),
            _ => Err(Error::invalid_state(s, "OpenClosed")),
        }
    }
}

impl fmt::Display for OpenClosed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Open => "OPEN",
            Self::Closed => "CLOSED",
        })
    }
}

// ============================================================================
// State
// ============================================================================

/// Typed state published for an item.
#[derive(Debug, Clone, PartialEq)]
pub enum State {
    /// Finite decimal number.
    Decimal(f64),
    /// Contact state.
    OpenClosed(OpenClosed),
    /// Switch state.
    OnOff(OnOff),
    /// Percentage in `0..=100`.
    Percent(f64),
    /// Point in time.
    DateTime(DateTime<FixedOffset>),
    /// Plain text.
    Text(String),
}

impl State {
    /// Creates the typed state for `item_type` from `text`.
    ///
    /// Never fails: text that does not parse as the requested type is
    /// returned as [`State::Text`].
    #[must_use]
    pub fn coerce(item_type: ItemType, text: &str) -> Self {
        match Self::parse_as(item_type, text) {
            Ok(state) => state,
            Err(e) => {
                debug!(%item_type, value = %text, error = %e, "Falling back to text state");
                Self::Text(text.to_string())
            }
        }
    }

    /// Parses `text` strictly as the state for `item_type`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] if `text` is not a valid value.
    pub fn parse_as(item_type: ItemType, text: &str) -> Result<Self> {
        match item_type {
            ItemType::Number => parse_decimal(text).map(Self::Decimal),
            ItemType::Contact => text.parse().map(Self::OpenClosed),
            ItemType::Switch => text.parse().map(Self::OnOff),
            ItemType::Rollershutter => parse_percent(text).map(Self::Percent),
            ItemType::DateTime => parse_date_time(text).map(Self::DateTime),
            _ => Ok(Self::Text(text.to_string())),
        }
    }

    /// Returns `true` for [`State::Text`].
    #[inline]
    #[must_use]
    pub fn is_text(&self) -> bool {
        matches!(self, Self::Text(_))
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decimal(value) | Self::Percent(value) => write!(f, "{value}"),
            Self::OpenClosed(value) => write!(f, "{value}"),
            Self::OnOff(value) => write!(f, "{value}"),
            Self::DateTime(value) => f.write_str(&value.to_rfc3339()),
            Self::Text(value) => f.write_str(value),
        }
    }
}

// ============================================================================
// Parsers
// ============================================================================

fn parse_decimal(text: &str) -> Result<f64> {
    match text.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(Error::invalid_state(text, "Decimal")),
    }
}

fn parse_percent(text: &str) -> Result<f64> {
    let value = parse_decimal(text).map_err(|_| Error::invalid_state(text, "Percent"))?;
    if (0.0..=100.0).contains(&value) {
        Ok(value)
    } else {
        Err(Error::invalid_state(text, "Percent"))
    }
}

fn parse_date_time(text: &str) -> Result<DateTime<FixedOffset>> {
    if let Ok(value) = DateTime::parse_from_rfc3339(text) {
        return Ok(value);
    }

    DATE_TIME_LAYOUTS
        .iter()
        .find_map(|layout| NaiveDateTime::parse_from_str(text, layout).ok())
        .and_then(|naive| Local.from_local_datetime(&naive).earliest())
        .map(|local| local.fixed_offset())
        .ok_or_else(|| Error::invalid_state(text, "DateTime"))
}

// ============================================================================
// Tests
// ============================================================================
