//! Ownership attributes carried by instructions and resources

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// Default owner applied when an instruction does not name one
pub const DEFAULT_USER: &str = "0:0";

/// Default working directory
pub const DEFAULT_WORKDIR: &str = "/";

/// Owning user (`uid:gid` or a name) of a build step
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct User {
    /// Raw user value, `uid:gid` or a name
    pub value: String,
}

impl User {
    /// Create new user
    #[inline]
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }

    /// Borrow the raw value
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.value
    }
}

impl Default for User {
    fn default() -> Self {
        Self::new(DEFAULT_USER)
    }
}

impl Display for User {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

/// Working directory of a build step
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Workdir {
    /// Absolute directory path
    pub value: String,
}

impl Workdir {
    /// Create new working directory
    #[inline]
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }

    /// Borrow the raw value
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.value
    }
}

impl Default for Workdir {
    fn default() -> Self {
        Self::new(DEFAULT_WORKDIR)
    }
}

impl Display for Workdir {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}
