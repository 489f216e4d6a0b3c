//! Extraction of provider identifiers from public asset URLs.

use std::sync::LazyLock;

use regex::Regex;

use crate::store::{ResourceKind, StorageError};

/// `.../<kind>/upload/v<version>/<public_id>.<ext>`, optionally with a
/// query string. The kind segment is optional.
static LOCATOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:/(image|video|raw))?/upload/v\d+/(.+)\.[A-Za-z0-9]+(?:\?.*)?$")
        .expect("valid regex")
});

/// Identifier of a stored asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locator {
    pub public_id: String,
    pub kind: ResourceKind,
}

/// Parse a public asset URL into its locator. The resource kind defaults to
/// video when the URL does not name one.
pub fn parse_locator(url: &str) -> Result<Locator, StorageError> {
    let caps = LOCATOR_RE
        .captures(url.trim())
        .ok_or_else(|| StorageError::InvalidLocator(url.to_string()))?;

    let kind = caps
        .get(1)
        .and_then(|m| ResourceKind::from_segment(m.as_str()))
        .unwrap_or_default();

    let public_id = caps
        .get(2)
        .map(|m| m.as_str().to_string())
        .filter(|id| !id.is_empty())
        .ok_or_else(|| StorageError::InvalidLocator(url.to_string()))?;

    Ok(Locator { public_id, kind })
}
