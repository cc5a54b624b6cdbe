//! Exact DNS hostname validation.
//!
//! Pinned hosts are exact names. Wildcards are never accepted, and lookups
//! are case-insensitive with an optional trailing root dot.

use std::borrow::Cow;

use crate::error::ConfigError;

/// Maximum length of a DNS name in presentation format (no trailing dot).
pub const MAX_HOSTNAME_LEN: usize = 253;

/// Maximum length of a single DNS label.
pub const MAX_LABEL_LEN: usize = 63;

/// Validate `raw` and return its canonical (lowercase, no trailing dot) form.
pub fn normalize_hostname(raw: &str) -> Result<String, ConfigError> {
    let invalid = |reason: &'static str| ConfigError::InvalidHostname {
        host: raw.to_string(),
        reason,
    };

    let trimmed = raw.trim();
    if trimmed.contains('*') {
        return Err(ConfigError::WildcardHost(raw.to_string()));
    }
    let name = trimmed.strip_suffix('.').unwrap_or(trimmed);
    if name.is_empty() {
        return Err(invalid("empty hostname"));
    }
    if name.len() > MAX_HOSTNAME_LEN {
        return Err(invalid("hostname longer than 253 bytes"));
    }

    for label in name.split('.') {
        if label.is_empty() {
            return Err(invalid("empty label"));
        }
        if label.len() > MAX_LABEL_LEN {
            return Err(invalid("label longer than 63 bytes"));
        }
        if !label.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-') {
            return Err(invalid("label contains characters outside [a-z0-9-]"));
        }
        if label.starts_with('-') || label.ends_with('-') {
            return Err(invalid("label starts or ends with '-'"));
        }
    }

    Ok(name.to_ascii_lowercase())
}

/// Canonical lookup key for an evaluation-time hostname.
///
/// Does not validate; an unknown or malformed name simply misses the policy
/// map. Borrows when the input is already canonical.
#[must_use]
pub fn lookup_key(hostname: &str) -> Cow<'_, str> {
    let name = hostname.strip_suffix('.').unwrap_or(hostname);
    if name.bytes().any(|b| b.is_ascii_uppercase()) {
        Cow::Owned(name.to_ascii_lowercase())
    } else {
        Cow::Borrowed(name)
    }
}
