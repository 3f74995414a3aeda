//! Removal policy and the capabilities aspects dispatch on
//!
//! A resource kind opts into policy handling by implementing
//! [`SupportsRemovalPolicy`] and/or [`SupportsAutoClean`] and exposing them
//! through the accessors on [`Resource`](crate::Resource). Visitors only ever
//! see these traits, never concrete kinds.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What happens to a resource when its stack is torn down
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemovalPolicy {
    Retain,
    Destroy,
}

impl fmt::Display for RemovalPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Retain => f.write_str("retain"),
            Self::Destroy => f.write_str("destroy"),
        }
    }
}

impl FromStr for RemovalPolicy {
    type Err = UnknownRemovalPolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "retain" => Ok(Self::Retain),
            "destroy" => Ok(Self::Destroy),
            _ => Err(UnknownRemovalPolicy(s.to_string())),
        }
    }
}

/// Parse failure for [`RemovalPolicy`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown removal policy {0:?} (expected \"retain\" or \"destroy\")")]
pub struct UnknownRemovalPolicy(pub String);

/// Stack-scoped policy applied to every node during the visitation pass
///
/// Immutable once the pass starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDirective {
    pub removal: RemovalPolicy,
    /// Empty content stores before deletion. Only honoured under `Destroy`.
    #[serde(default = "default_auto_clean")]
    pub auto_clean: bool,
}

fn default_auto_clean() -> bool {
    true
}

impl PolicyDirective {
    /// Retain everything on teardown
    #[inline]
    #[must_use]
    pub const fn retain() -> Self {
        Self {
            removal: RemovalPolicy::Retain,
            auto_clean: true,
        }
    }

    /// Destroy everything on teardown, emptying content stores first
    #[inline]
    #[must_use]
    pub const fn destroy() -> Self {
        Self {
            removal: RemovalPolicy::Destroy,
            auto_clean: true,
        }
    }

    #[inline]
    #[must_use]
    pub const fn with_auto_clean(mut self, auto_clean: bool) -> Self {
        self.auto_clean = auto_clean;
        self
    }

    /// Whether auto-clean should be switched on for capable nodes
    #[inline]
    #[must_use]
    pub const fn cleans_on_destroy(&self) -> bool {
        matches!(self.removal, RemovalPolicy::Destroy) && self.auto_clean
    }
}

impl Default for PolicyDirective {
    fn default() -> Self {
        Self::destroy()
    }
}

/// Capability: the removal policy of this node can be overridden
pub trait SupportsRemovalPolicy {
    fn apply_removal_policy(&mut self, policy: RemovalPolicy);

    /// Currently configured policy, `None` if never set
    fn removal_policy(&self) -> Option<RemovalPolicy>;
}

/// Capability: this node can empty itself before deletion
///
/// Typical implementors hold content (objects, images) that would
/// otherwise block their own deletion.
pub trait SupportsAutoClean {
    fn enable_auto_clean(&mut self);

    fn auto_clean_enabled(&self) -> bool;
}
