//! Binding runtime options.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Default keep-alive period in milliseconds.
pub const DEFAULT_REFRESH_INTERVAL_MS: u64 = 60_000;

/// Property key overriding the keep-alive period.
pub const REFRESH_KEY: &str = "refresh";

/// Property key enabling restart of shared connections on item removal.
pub const RESTART_ON_REMOVE_KEY: &str = "restartOnRemove";

// ============================================================================
// BindingOptions
// ============================================================================

/// Options applied on activation and on every configuration reload.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use endpoint_binding::BindingOptions;
///
/// let options = BindingOptions::builder()
///     .refresh_interval(Duration::from_secs(10))
///     .build()
///     .unwrap();
/// assert_eq!(options.refresh_interval(), Duration::from_secs(10));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BindingOptions {
    /// Keep-alive period in milliseconds.
    refresh_interval_ms: u64,
    /// Cycle shared connections that stay in use when an item is removed.
    restart_on_remove: bool,
}

impl Default for BindingOptions {
    fn default() -> Self {
        Self {
            refresh_interval_ms: DEFAULT_REFRESH_INTERVAL_MS,
            restart_on_remove: false,
        }
    }
}

impl BindingOptions {
    /// Creates a builder starting from the defaults.
    #[inline]
    #[must_use]
    pub fn builder() -> BindingOptionsBuilder {
        BindingOptionsBuilder::new()
    }

    /// Returns the keep-alive period.
    #[inline]
    #[must_use]
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    /// Returns whether shared connections are cycled on item removal.
    #[inline]
    #[must_use]
    pub fn restart_on_remove(&self) -> bool {
        self.restart_on_remove
    }

    /// Parses options from JSON. Missing fields keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] for malformed JSON and [`Error::Config`] for
    /// invalid values.
    pub fn from_json(json: &str) -> Result<Self> {
        let options: Self = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }

    /// Builds options from `key → value` properties.
    ///
    /// Recognized keys are `refresh` (milliseconds) and `restartOnRemove`.
    /// Unknown keys are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a recognized value does not parse.
    pub fn from_properties<'a, I>(properties: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut builder = Self::builder();

        for (key, value) in properties {
            let value = value.trim();
            match key {
                REFRESH_KEY if !value.is_empty() => {
                    let millis = value.parse::<u64>().map_err(|e| {
                        Error::config(format!("invalid '{REFRESH_KEY}' value '{value}': {e}"))
                    })?;
                    builder = builder.refresh_interval(Duration::from_millis(millis));
                }
                RESTART_ON_REMOVE_KEY if !value.is_empty() => {
                    let enabled = value.parse::<bool>().map_err(|e| {
                        Error::config(format!(
                            "invalid '{RESTART_ON_REMOVE_KEY}' value '{value}': {e}"
                        ))
                    })?;
                    builder = builder.restart_on_remove(enabled);
                }
                _ => {}
            }
        }

        builder.build()
    }

    fn validate(&self) -> Result<()> {
        if self.refresh_interval_ms == 0 {
            return Err(Error::config("refresh interval must be greater than zero"));
        }
        Ok(())
    }
}

// ============================================================================
// BindingOptionsBuilder
// ============================================================================

/// Fluent builder for [`BindingOptions`].
#[derive(Debug, Clone, Default)]
pub struct BindingOptionsBuilder {
    options: BindingOptions,
}

impl BindingOptionsBuilder {
    /// Creates a builder with default values.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the keep-alive period.
    #[must_use]
    pub fn refresh_interval(mut self, interval: Duration) -> Self {
        self.options.refresh_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Enables the stop/restart cycle on shared connections.
    #[must_use]
    pub fn restart_on_remove(mut self, enabled: bool) -> Self {
        self.options.restart_on_remove = enabled;
        self
    }

    /// Builds the options.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the refresh interval is zero.
    pub fn build(self) -> Result<BindingOptions> {
        self.options.validate()?;
        Ok(self.options)
    }
}

// ============================================================================
// Tests
// ============================================================================
