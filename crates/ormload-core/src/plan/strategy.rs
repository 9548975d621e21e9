//! Fetch strategies.

use serde::{Deserialize, Serialize};

/// When an association is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchTiming {
    /// Loaded together with its owner.
    Immediate,
    /// Loaded on first access.
    Delayed,
}

/// How an association is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStyle {
    /// Outer join in the owner's statement.
    Join,
    /// Separate select per owner.
    #[default]
    Select,
    /// Separate select reusing the owner query as a subquery.
    Subselect,
    /// Separate select per batch of owners.
    Batch,
}

/// Timing plus style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FetchStrategy {
    pub timing: FetchTiming,
    pub style: FetchStyle,
}

impl FetchStrategy {
    pub const IMMEDIATE_JOIN: FetchStrategy = FetchStrategy::new(FetchTiming::Immediate, FetchStyle::Join);
    pub const DELAYED_SELECT: FetchStrategy = FetchStrategy::new(FetchTiming::Delayed, FetchStyle::Select);

    pub const fn new(timing: FetchTiming, style: FetchStyle) -> Self {
        Self { timing, style }
    }

    /// Strategy implied by a mapped fetch style and laziness. Join fetching
    /// is always immediate.
    pub fn from_mapping(style: FetchStyle, lazy: bool) -> Self {
        let timing = if style == FetchStyle::Join || !lazy {
            FetchTiming::Immediate
        } else {
            FetchTiming::Delayed
        };
        Self { timing, style }
    }

    /// Whether the fetch is folded into the owner's SQL statement.
    pub fn is_join_fetched(&self) -> bool {
        self.style == FetchStyle::Join && self.timing == FetchTiming::Immediate
    }

    /// Whether the fetch is a deferred subselect fetch.
    pub fn is_subselect(&self) -> bool {
        self.style == FetchStyle::Subselect && self.timing != FetchTiming::Immediate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_mapping() {
        assert!(FetchStrategy::from_mapping(FetchStyle::Join, true).is_join_fetched());
        let select = FetchStrategy::from_mapping(FetchStyle::Select, true);
        assert_eq!(select, FetchStrategy::DELAYED_SELECT);
        assert!(!select.is_join_fetched());
        let eager = FetchStrategy::from_mapping(FetchStyle::Select, false);
        assert_eq!(eager.timing, FetchTiming::Immediate);
    }

    #[test]
    fn test_subselect_detection() {
        assert!(FetchStrategy::from_mapping(FetchStyle::Subselect, true).is_subselect());
        assert!(!FetchStrategy::from_mapping(FetchStyle::Subselect, false).is_subselect());
        assert!(!FetchStrategy::IMMEDIATE_JOIN.is_subselect());
    }
}
