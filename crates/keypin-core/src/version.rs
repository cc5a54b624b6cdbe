//! Client version parsing and SemVer precedence for the version gate.

use std::cmp::Ordering;
use std::fmt;

/// Failure to parse a client version string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid version `{0}`")]
pub struct VersionParseError(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum PreRelease {
    Numeric(u64),
    Alpha(String),
}

impl Ord for PreRelease {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Numeric(a), Self::Numeric(b)) => a.cmp(b),
            (Self::Numeric(_), Self::Alpha(_)) => Ordering::Less,
            (Self::Alpha(_), Self::Numeric(_)) => Ordering::Greater,
            (Self::Alpha(a), Self::Alpha(b)) => a.cmp(b),
        }
    }
}

impl PartialOrd for PreRelease {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for PreRelease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric(n) => write!(f, "{n}"),
            Self::Alpha(s) => f.write_str(s),
        }
    }
}

/// A client application version, ordered by SemVer precedence.
///
/// Accepts `MAJOR[.MINOR[.PATCH]][-PRE][+BUILD]` with an optional leading
/// `v`. Build metadata is ignored for ordering and dropped.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientVersion {
    major: u64,
    minor: u64,
    patch: u64,
    pre: Vec<PreRelease>,
}

impl ClientVersion {
    pub const ZERO: Self = Self::new(0, 0, 0);

    #[must_use]
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            pre: Vec::new(),
        }
    }

    pub fn parse(raw: &str) -> Result<Self, VersionParseError> {
        let err = || VersionParseError(raw.to_string());

        let text = raw.trim();
        let text = text
            .strip_prefix('v')
            .or_else(|| text.strip_prefix('V'))
            .unwrap_or(text);
        let text = text.split_once('+').map_or(text, |(core, _build)| core);
        let (core, pre) = match text.split_once('-') {
            Some((core, pre)) => (core, Some(pre)),
            None => (text, None),
        };

        let mut parts = [0u64; 3];
        let mut count = 0;
        for component in core.split('.') {
            if count == parts.len() {
                return Err(err());
            }
            if component.is_empty() || !component.bytes().all(|b| b.is_ascii_digit()) {
                return Err(err());
            }
            parts[count] = component.parse().map_err(|_| err())?;
            count += 1;
        }

        let mut identifiers = Vec::new();
        if let Some(pre) = pre {
            for ident in pre.split('.') {
                if ident.is_empty()
                    || !ident.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
                {
                    return Err(err());
                }
                let parsed = if ident.bytes().all(|b| b.is_ascii_digit()) {
                    PreRelease::Numeric(ident.parse().map_err(|_| err())?)
                } else {
                    PreRelease::Alpha(ident.to_string())
                };
                identifiers.push(parsed);
            }
        }

        Ok(Self {
            major: parts[0],
            minor: parts[1],
            patch: parts[2],
            pre: identifiers,
        })
    }

    #[must_use]
    pub fn is_prerelease(&self) -> bool {
        !self.pre.is_empty()
    }
}

impl Default for ClientVersion {
    fn default() -> Self {
        Self::ZERO
    }
}

impl Ord for ClientVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch)
            .cmp(&(other.major, other.minor, other.patch))
            .then_with(|| match (self.pre.is_empty(), other.pre.is_empty()) {
                (true, true) => Ordering::Equal,
                // A pre-release sorts before its release.
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) => self.pre.cmp(&other.pre),
            })
    }
}

impl PartialOrd for ClientVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ClientVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        for (idx, ident) in self.pre.iter().enumerate() {
            f.write_str(if idx == 0 { "-" } else { "." })?;
            write!(f, "{ident}")?;
        }
        Ok(())
    }
}
