//! Identifier types

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Numeric instance identifier, unique within a kind's table
pub type InstId = i64;

/// Object kind identifier (`host`, `module`, or a user-defined kind)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KindId(String);

impl KindId {
    /// Create new kind identifier
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow as string slice
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for KindId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for KindId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for KindId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for KindId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for KindId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Owning-account scope ("supplier account")
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(String);

impl OwnerId {
    /// Create new owner identifier
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow as string slice
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for OwnerId {
    fn default() -> Self {
        Self::new("0")
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OwnerId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn kind_id_lookup_by_str() {
        let mut map = HashMap::new();
        map.insert(KindId::new("rack"), 1);
        assert_eq!(map.get("rack"), Some(&1));
    }

    #[test]
    fn owner_defaults_to_zero() {
        assert_eq!(OwnerId::default().as_str(), "0");
    }
}
