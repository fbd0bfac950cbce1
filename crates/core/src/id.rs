//! Strongly-typed identifiers.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of one blog/site row in the directory (the multi-tenant
/// boundary). Numeric, assigned by the directory itself.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlogId(pub u64);

impl BlogId {
    /// The distinguished root blog of the network.
    pub const ROOT: BlogId = BlogId(1);

    pub fn is_root(&self) -> bool {
        *self == Self::ROOT
    }
}

impl core::fmt::Display for BlogId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl From<u64> for BlogId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Identifier of one run, used for log/trace correlation only.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(Uuid);

impl RunId {
    /// Uses UUIDv7 (time-ordered), so runs sort chronologically in traces.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for RunId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_blog_is_one() {
        assert!(BlogId(1).is_root());
        assert!(!BlogId(2).is_root());
        assert_eq!(BlogId::ROOT, BlogId::from(1));
    }
}
