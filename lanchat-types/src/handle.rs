//! Peer handle newtype.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// A non-empty token of printable, non-whitespace characters identifying a peer.
///
/// Equality and hashing are byte-exact; the engine never normalizes case or
/// whitespace in a handle beyond rejecting whitespace at construction time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Handle(String);

impl Handle {
    /// Validate and wrap a token as a `Handle`.
    ///
    /// Rejects the empty string and any token containing whitespace or
    /// non-printable characters.
    pub fn new(raw: impl Into<String>) -> Result<Self, Error> {
        let raw = raw.into();
        if raw.is_empty() || raw.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(Error::InvalidHandle(raw));
        }
        Ok(Handle(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Handle {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Handle::new(s)
    }
}

impl TryFrom<String> for Handle {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Handle::new(value)
    }
}

impl From<Handle> for String {
    fn from(h: Handle) -> Self {
        h.0
    }
}

impl AsRef<str> for Handle {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_and_whitespace() {
        assert!(Handle::new("").is_err());
        assert!(Handle::new("bob smith").is_err());
        assert!(Handle::new("bob\tsmith").is_err());
    }

    #[test]
    fn accepts_plain_token() {
        let h = Handle::new("alice").unwrap();
        assert_eq!(h.as_str(), "alice");
        assert_eq!(h.to_string(), "alice");
    }

    #[test]
    fn roundtrips_through_from_str() {
        let h: Handle = "bob".parse().unwrap();
        assert_eq!(h, Handle::new("bob").unwrap());
    }
}
