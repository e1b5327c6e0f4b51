//! Cached query results and their invalidation.
//!
//! - `QueryCache`: keyed results with a stale flag per entry
//! - `QueryObserver`: a mounted consumer that refetches when its group goes stale
//! - `CacheInvalidationBridge`: routes `data.updated` events to groups

mod bridge;
mod observer;
mod query_cache;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use bridge::{BridgeGuard, CacheInvalidationBridge};
pub use observer::{QueryObserver, QueryState};
pub use query_cache::{QueryCache, QueryKey};

/// A bucket of cached results invalidated together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CacheGroup {
    Debts,
    Charges,
    Stats,
    Dashboard,
}

impl CacheGroup {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Debts => "debts",
            Self::Charges => "charges",
            Self::Stats => "stats",
            Self::Dashboard => "dashboard",
        }
    }

    pub const fn all() -> &'static [CacheGroup] {
        &[
            CacheGroup::Debts,
            CacheGroup::Charges,
            CacheGroup::Stats,
            CacheGroup::Dashboard,
        ]
    }
}

impl fmt::Display for CacheGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The category tag carried by a `data.updated` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataScope {
    Debts,
    Charges,
    Stats,
    All,
}

impl DataScope {
    /// Unrecognized tags widen to `All`.
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "debts" => Self::Debts,
            "charges" => Self::Charges,
            "stats" => Self::Stats,
            "all" => Self::All,
            other => {
                tracing::debug!(tag = other, "unrecognized data scope, invalidating everything");
                Self::All
            }
        }
    }

    /// Groups that must be refetched when data in this scope changes.
    pub const fn targets(&self) -> &'static [CacheGroup] {
        match self {
            Self::Debts => &[CacheGroup::Debts, CacheGroup::Stats, CacheGroup::Dashboard],
            Self::Charges => &[CacheGroup::Charges, CacheGroup::Stats, CacheGroup::Dashboard],
            Self::Stats => &[CacheGroup::Stats, CacheGroup::Dashboard],
            Self::All => CacheGroup::all(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn charges_scope_leaves_debts_alone() {
        let targets = DataScope::from_tag("charges").targets();
        assert!(targets.contains(&CacheGroup::Charges));
        assert!(targets.contains(&CacheGroup::Stats));
        assert!(!targets.contains(&CacheGroup::Debts));
    }

    #[test]
    fn unknown_and_all_cover_every_group() {
        assert_eq!(DataScope::from_tag("unknown-tag"), DataScope::All);
        assert_eq!(DataScope::from_tag(""), DataScope::All);
        assert_eq!(DataScope::from_tag(" ALL ").targets(), CacheGroup::all());
    }
}
