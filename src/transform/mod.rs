//! Transformation gateway.
//!
//! Directives carry a transformation of the form `TYPE(function)`. The
//! [`TransformationRegistry`] looks up the [`TransformationService`]
//! registered for `TYPE` and applies `function` to the message text.
//!
//! Transformation never blocks a message: an unknown type, a malformed
//! transformation string, or a failing service all log and return the
//! original text.
//!
//! # Built-in Services
//!
//! | Type | Service |
//! |------|---------|
//! | `REGEX` | [`RegexTransformation`] |
//! | `JSONPATH` | [`JsonPathTransformation`] |

// ============================================================================
// Submodules
// ============================================================================

/// Built-in transformation services.
pub mod builtin;

// ============================================================================
// Imports
// ============================================================================

use std::sync::{Arc, LazyLock};

use parking_lot::RwLock;
use regex::Regex;
use rustc_hash::FxHashMap;
use tracing::{debug, error, warn};

use crate::error::{Error, Result};

pub use builtin::{JsonPathTransformation, RegexTransformation};

// ============================================================================
// Constants
// ============================================================================

/// Splits `TYPE(function)`.
static FUNCTION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?s)(.*?)\((.*)\)$").expect("valid function pattern"));

// ============================================================================
// TransformationService
// ============================================================================

/// A string-to-string transformation selected by type tag.
pub trait TransformationService: Send + Sync {
    /// Applies `function` to `source`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transformation`] when the function is invalid or
    /// does not apply to `source`.
    fn transform(&self, function: &str, source: &str) -> Result<String>;
}

impl<F> TransformationService for F
where
    F: Fn(&str, &str) -> Result<String> + Send + Sync,
{
    fn transform(&self, function: &str, source: &str) -> Result<String> {
        self(function, source)
    }
}

// ============================================================================
// TransformationRegistry
// ============================================================================

/// Type-tag keyed collection of transformation services.
pub struct TransformationRegistry {
    services: RwLock<FxHashMap<String, Arc<dyn TransformationService>>>,
}

impl Default for TransformationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TransformationRegistry {
    /// Creates a registry with the built-in services.
    #[must_use]
    pub fn new() -> Self {
        let registry = Self::empty();
        registry.register("REGEX", RegexTransformation::new());
        registry.register("JSONPATH", JsonPathTransformation);
        registry
    }

    /// Creates a registry without any service.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            services: RwLock::new(FxHashMap::default()),
        }
    }

    /// Registers `service` under `type_tag`, replacing any previous one.
    pub fn register(&self, type_tag: impl Into<String>, service: impl TransformationService + 'static) {
        self.services.write().insert(type_tag.into(), Arc::new(service));
    }

    /// Removes the service registered under `type_tag`.
    pub fn unregister(&self, type_tag: &str) -> bool {
        self.services.write().remove(type_tag).is_some()
    }

    /// Returns the service registered under `type_tag`.
    #[must_use]
    pub fn service(&self, type_tag: &str) -> Option<Arc<dyn TransformationService>> {
        self.services.read().get(type_tag).cloned()
    }

    /// Transforms `message` with an optional `TYPE(function)` string.
    ///
    /// Missing or empty transformations pass the message through. Any
    /// failure is logged and the message is returned unchanged.
    #[must_use]
    pub fn transform_message(&self, transformation: Option<&str>, message: &str) -> String {
        let Some(transformation) = transformation.filter(|t| !t.is_empty()) else {
            return message.to_string();
        };

        debug!(message, transformation, "Transforming message");

        let transformed = match self.try_transform(transformation, message) {
            Ok(Some(transformed)) => transformed,
            Ok(None) => message.to_string(),
            Err(e) => {
                error!(transformation, message, error = %e, "Transformation failed");
                message.to_string()
            }
        };

        debug!(transformed = %transformed, "Transformed message");
        transformed
    }

    /// Returns `Ok(None)` when no service is registered for the type.
    fn try_transform(&self, transformation: &str, message: &str) -> Result<Option<String>> {
        let (type_tag, function) = split_transformation(transformation)?;

        let Some(service) = self.service(type_tag) else {
            warn!(
                type_tag,
                "Couldn't transform message because the transformation service is unavailable"
            );
            return Ok(None);
        };

        service.transform(function, message).map(Some)
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Splits `TYPE(function)` into its type tag and function.
///
/// # Errors
///
/// Returns [`Error::Transformation`] if the string does not follow the
/// `<type>(<function>)` pattern.
pub fn split_transformation(transformation: &str) -> Result<(&str, &str)> {
    let captures = FUNCTION_PATTERN.captures(transformation).ok_or_else(|| {
        Error::transformation(format!(
            "given transformation function '{transformation}' does not follow the expected pattern '<type>(<function>)'"
        ))
    })?;

    match (captures.get(1), captures.get(2)) {
        (Some(type_tag), Some(function)) => Ok((type_tag.as_str(), function.as_str())),
        _ => Err(Error::transformation(format!(
            "incomplete transformation '{transformation}'"
        ))),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_transformation() {
        assert_eq!(split_transformation("MAP(en.map)").unwrap(), ("MAP", "en.map"));
        assert_eq!(
            split_transformation("REGEX((\\d+)\\s)").unwrap(),
            ("REGEX", "(\\d+)\\s")
        );
        assert!(split_transformation("no-parens").is_err());
    }

    #[test]
    fn test_missing_transformation_passes_through() {
        let registry = TransformationRegistry::new();
        assert_eq!(registry.transform_message(None, "raw"), "raw");
        assert_eq!(registry.transform_message(Some(""), "raw"), "raw");
    }

    #[test]
    fn test_unknown_service_passes_through() {
        let registry = TransformationRegistry::empty();
        assert_eq!(registry.transform_message(Some("MAP(x.map)"), "raw"), "raw");
    }

    #[test]
    fn test_malformed_transformation_passes_through() {
        let registry = TransformationRegistry::new();
        assert_eq!(registry.transform_message(Some("REGEX"), "raw"), "raw");
    }

    #[test]
    fn test_failing_service_passes_through() {
        let registry = TransformationRegistry::empty();
        registry.register("FAIL", |_: &str, _: &str| -> Result<String> {
            Err(Error::transformation("boom"))
        });
        assert_eq!(registry.transform_message(Some("FAIL(x)"), "raw"), "raw");
    }

    #[test]
    fn test_custom_service() {
        let registry = TransformationRegistry::empty();
        registry.register("UPPER", |_: &str, source: &str| -> Result<String> {
            Ok(source.to_uppercase())
        });
        assert_eq!(registry.transform_message(Some("UPPER()"), "on"), "ON");
        assert!(registry.unregister("UPPER"));
        assert!(registry.service("UPPER").is_none());
    }

    #[test]
    fn test_builtin_regex() {
        let registry = TransformationRegistry::new();
        let out = registry.transform_message(Some("REGEX(temp=(\\d+))"), "temp=21;hum=40");
        assert_eq!(out, "21");
    }
}
