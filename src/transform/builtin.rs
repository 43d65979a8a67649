//! Built-in transformation services.

// ============================================================================
// Imports
// ============================================================================

use parking_lot::Mutex;
use regex::Regex;
use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::error::{Error, Result};

use super::TransformationService;

// ============================================================================
// RegexTransformation
// ============================================================================

/// `REGEX(pattern)`: extracts the first capture group of the first match,
/// or the whole match when the pattern has no group.
///
/// Compiled patterns are cached per function string.
#[derive(Default)]
pub struct RegexTransformation {
    cache: Mutex<FxHashMap<String, Regex>>,
}

impl RegexTransformation {
    /// Creates the service with an empty pattern cache.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn compiled(&self, pattern: &str) -> Result<Regex> {
        let mut cache = self.cache.lock();
        if let Some(regex) = cache.get(pattern) {
            return Ok(regex.clone());
        }

        let regex = Regex::new(pattern)?;
        cache.insert(pattern.to_string(), regex.clone());
        Ok(regex)
    }
}

impl TransformationService for RegexTransformation {
    fn transform(&self, function: &str, source: &str) -> Result<String> {
        let regex = self.compiled(function)?;
        let captures = regex
            .captures(source)
            .ok_or_else(|| Error::transformation(format!("'{function}' does not match")))?;

        let matched = captures
            .get(1)
            .or_else(|| captures.get(0))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();

        Ok(matched)
    }
}

// ============================================================================
// JsonPathTransformation
// ============================================================================

/// `JSONPATH(path)`: selects a value from a JSON document.
///
/// Accepts JSON pointers (`/a/b/0`) and dotted paths (`$.a.b[0]`). String
/// values are returned without quotes; other values are serialized.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonPathTransformation;

impl JsonPathTransformation {
    /// Converts a dotted path into a JSON pointer.
    fn to_pointer(path: &str) -> String {
        if path.starts_with('/') {
            return path.to_string();
        }

        let trimmed = path.trim_start_matches('$').trim_start_matches('.');
        let mut pointer = String::new();

        for segment in trimmed.split('.').filter(|s| !s.is_empty()) {
            let mut parts = segment.split('[');
            if let Some(key) = parts.next()
                && !key.is_empty()
            {
                pointer.push('/');
                pointer.push_str(key);
            }
            for index in parts {
                pointer.push('/');
                pointer.push_str(index.trim_end_matches(']'));
            }
        }

        pointer
    }
}

impl TransformationService for JsonPathTransformation {
    fn transform(&self, function: &str, source: &str) -> Result<String> {
        let document: Value = serde_json::from_str(source)?;
        let pointer = Self::to_pointer(function.trim());

        match document.pointer(&pointer) {
            Some(Value::String(text)) => Ok(text.clone()),
            Some(value) => Ok(value.to_string()),
            None => Err(Error::transformation(format!(
                "path '{function}' not found in document"
            ))),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
