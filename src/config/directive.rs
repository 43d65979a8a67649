//! Binding directive parser.
//!
//! An item's binding configuration is a sequence of directives:
//!
//! ```text
//! <[//sensors:JSONPATH($.temp)]>[ON://lights:'REGEX(.*)']
//! ```
//!
//! The first directive listens on `//sensors` (command omitted, so `IN`)
//! and extracts `temp`; the second sends `ON` commands to `//lights`.
//!
//! | Part | Values |
//! |------|--------|
//! | direction | `<` inbound, `>` outbound |
//! | command | any text, `IN` (default), `CHANGED`, `*` |
//! | endpoint | `//name` (exchange) or `ws://` / `wss://` URL |
//! | transformation | `TYPE(function)`, optionally single-quoted |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};
use crate::item::{CommandKey, Direction};

// ============================================================================
// Patterns
// ============================================================================

/// Whole configuration: one or more bracketed parts.
static CONFIG_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:[<>]\[[^\]]*\]\s*)+$").expect("valid config pattern")
});

/// One bracketed part.
static PART_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([<>])\[([^\]]*)\]").expect("valid part pattern"));

/// Part body for exchange endpoints.
static EXCHANGE_BODY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:([^:]*):)?(//[^:]+)(?::'?(.*?)'?)?$").expect("valid exchange pattern")
});

/// Part body for WebSocket endpoints. A colon followed by digits belongs to
/// the URL as its port.
static WEBSOCKET_BODY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:([^:]*):)?(wss?://[^/:]+(?::\d+)?[^:]*)(?::'?(.*?)'?)?$")
        .expect("valid websocket pattern")
});

// ============================================================================
// EndpointKind
// ============================================================================

/// Endpoint syntax accepted by a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointKind {
    /// In-process exchange channel, `//name`.
    Exchange,
    /// WebSocket URL, `ws://...` or `wss://...`.
    WebSocket,
}

impl EndpointKind {
    fn body_pattern(self) -> &'static Regex {
        match self {
            Self::Exchange => &EXCHANGE_BODY,
            Self::WebSocket => &WEBSOCKET_BODY,
        }
    }

    /// Checks that `endpoint` is well-formed for this kind.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidEndpoint`] otherwise.
    pub fn validate(self, endpoint: &str) -> Result<()> {
        match self {
            Self::Exchange => {
                let valid = endpoint
                    .strip_prefix("//")
                    .is_some_and(|name| !name.trim().is_empty());
                if valid {
                    Ok(())
                } else {
                    Err(Error::invalid_endpoint(endpoint, "expected '//name'"))
                }
            }
            Self::WebSocket => {
                let url = Url::parse(endpoint)
                    .map_err(|e| Error::invalid_endpoint(endpoint, e.to_string()))?;
                match url.scheme() {
                    "ws" | "wss" => Ok(()),
                    other => Err(Error::invalid_endpoint(
                        endpoint,
                        format!("unsupported scheme '{other}'"),
                    )),
                }
            }
        }
    }
}

// ============================================================================
// Directive
// ============================================================================

/// One parsed `direction[command:endpoint:transformation]` clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    /// Message direction.
    pub direction: Direction,
    /// Command key the directive answers to.
    pub command: CommandKey,
    /// Endpoint name.
    pub endpoint: String,
    /// `TYPE(function)` transformation, if any.
    pub transformation: Option<String>,
}

impl Directive {
    /// Returns `true` for `<` directives.
    #[inline]
    #[must_use]
    pub fn is_inbound(&self) -> bool {
        self.direction == Direction::Inbound
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}[{}:{}:{}]",
            self.direction.marker(),
            self.command,
            self.endpoint,
            self.transformation.as_deref().unwrap_or_default()
        )
    }
}

// ============================================================================
// Parser
// ============================================================================

/// Parses an item's full binding configuration.
///
/// # Errors
///
/// Returns [`Error::Parse`] if the configuration is not a sequence of
/// directives or any directive is malformed, and
/// [`Error::InvalidEndpoint`] for endpoints that do not fit `kind`.
pub fn parse_directives(item: &str, config: &str, kind: EndpointKind) -> Result<Vec<Directive>> {
    if !CONFIG_PATTERN.is_match(config) {
        return Err(Error::parse(
            item,
            format!("'{config}' doesn't contain a valid binding configuration"),
        ));
    }

    PART_PATTERN
        .captures_iter(config)
        .map(|part| {
            let marker = part.get(1).map_or("", |m| m.as_str());
            let body = part.get(2).map_or("", |m| m.as_str());
            parse_part(item, marker, body, kind)
        })
        .collect()
}

/// Parses the body of one bracketed part.
fn parse_part(item: &str, marker: &str, body: &str, kind: EndpointKind) -> Result<Directive> {
    let direction = Direction::from_marker(marker)?;

    let captures = kind.body_pattern().captures(body).ok_or_else(|| {
        Error::parse(
            item,
            format!("'{body}' must consist of [command:]endpoint[:transformation]"),
        )
    })?;

    let command = captures
        .get(1)
        .map(|m| m.as_str().trim())
        .filter(|c| !c.is_empty())
        .map_or_else(CommandKey::inbound, CommandKey::new);

    let endpoint = captures.get(2).map_or("", |m| m.as_str()).to_string();
    kind.validate(&endpoint)?;

    let transformation = captures
        .get(3)
        .map(|m| m.as_str().trim().to_string())
        .filter(|t| !t.is_empty());

    Ok(Directive {
        direction,
        command,
        endpoint,
        transformation,
    })
}

// ============================================================================
// Tests
// ============================================================================
