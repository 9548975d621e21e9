//! Loader configuration.

use ormload_dialect::LockTimeout;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Environment variable prefix read by [`LoaderSettings::from_env`].
pub const ENV_PREFIX: &str = "ORMLOAD_";

/// Default number of keys loaded per batched statement.
pub const DEFAULT_BATCH_FETCH_SIZE: usize = 1;

/// Settings shared by every loader built from one mapping registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderSettings {
    /// Skip to the first requested row with absolute positioning instead of
    /// stepping the cursor.
    pub scrollable_result_sets: bool,

    /// Wrap result sets with a column-name-to-index cache.
    pub wrap_result_sets: bool,

    /// Prefix generated statements with a SQL comment.
    pub comments_enabled: bool,

    /// Keys per statement for batch loads.
    pub default_batch_fetch_size: usize,

    /// Maximum depth of join fetches below a root. None means unbounded.
    pub max_fetch_depth: Option<usize>,

    /// Lock timeout applied when lock options do not name one.
    pub default_lock_timeout: LockTimeout,

    /// Entities loaded without an explicit read-only request are read-only.
    pub default_read_only: bool,
}

impl Default for LoaderSettings {
    fn default() -> Self {
        Self {
            scrollable_result_sets: true,
            wrap_result_sets: false,
            comments_enabled: false,
            default_batch_fetch_size: DEFAULT_BATCH_FETCH_SIZE,
            max_fetch_depth: None,
            default_lock_timeout: LockTimeout::WaitForever,
            default_read_only: false,
        }
    }
}

impl LoaderSettings {
    /// Create settings with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read settings from `ORMLOAD_*` environment variables, falling back to
    /// defaults for unset variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(format!("{ENV_PREFIX}{key}")).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut settings = Self::default();
        if let Some(value) = lookup("SCROLLABLE_RESULT_SETS") {
            settings.scrollable_result_sets = parse_bool("SCROLLABLE_RESULT_SETS", &value)?;
        }
        if let Some(value) = lookup("WRAP_RESULT_SETS") {
            settings.wrap_result_sets = parse_bool("WRAP_RESULT_SETS", &value)?;
        }
        if let Some(value) = lookup("COMMENTS_ENABLED") {
            settings.comments_enabled = parse_bool("COMMENTS_ENABLED", &value)?;
        }
        if let Some(value) = lookup("DEFAULT_BATCH_FETCH_SIZE") {
            settings.default_batch_fetch_size = parse_number("DEFAULT_BATCH_FETCH_SIZE", &value)?;
        }
        if let Some(value) = lookup("MAX_FETCH_DEPTH") {
            settings.max_fetch_depth = Some(parse_number("MAX_FETCH_DEPTH", &value)?);
        }
        if let Some(value) = lookup("DEFAULT_LOCK_TIMEOUT") {
            settings.default_lock_timeout = parse_lock_timeout(&value)?;
        }
        if let Some(value) = lookup("DEFAULT_READ_ONLY") {
            settings.default_read_only = parse_bool("DEFAULT_READ_ONLY", &value)?;
        }
        Ok(settings)
    }

    /// Set scrollable result set skipping.
    pub fn with_scrollable_result_sets(mut self, enabled: bool) -> Self {
        self.scrollable_result_sets = enabled;
        self
    }

    /// Set result set wrapping.
    pub fn with_wrap_result_sets(mut self, enabled: bool) -> Self {
        self.wrap_result_sets = enabled;
        self
    }

    /// Set SQL comments.
    pub fn with_comments(mut self, enabled: bool) -> Self {
        self.comments_enabled = enabled;
        self
    }

    /// Set the default batch fetch size.
    pub fn with_default_batch_fetch_size(mut self, size: usize) -> Self {
        self.default_batch_fetch_size = size.max(1);
        self
    }

    /// Bound join fetch depth.
    pub fn with_max_fetch_depth(mut self, depth: usize) -> Self {
        self.max_fetch_depth = Some(depth);
        self
    }

    /// Set the default lock timeout.
    pub fn with_default_lock_timeout(mut self, timeout: LockTimeout) -> Self {
        self.default_lock_timeout = timeout;
        self
    }

    /// Load entities read-only by default.
    pub fn with_default_read_only(mut self, read_only: bool) -> Self {
        self.default_read_only = read_only;
        self
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::mapping(format!("{ENV_PREFIX}{key}: expected a boolean, got {value:?}"))),
    }
}

fn parse_number(key: &str, value: &str) -> Result<usize> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::mapping(format!("{ENV_PREFIX}{key}: expected a number, got {value:?}")))
}

fn parse_lock_timeout(value: &str) -> Result<LockTimeout> {
    match value.trim().to_ascii_lowercase().as_str() {
        "wait_forever" | "forever" | "-1" => Ok(LockTimeout::WaitForever),
        "nowait" | "no_wait" | "0" => Ok(LockTimeout::NoWait),
        "skip_locked" | "-2" => Ok(LockTimeout::SkipLocked),
        other => other
            .parse()
            .map(LockTimeout::Millis)
            .map_err(|_| Error::mapping(format!("{ENV_PREFIX}DEFAULT_LOCK_TIMEOUT: invalid timeout {value:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let settings = LoaderSettings::default();
        assert!(settings.scrollable_result_sets);
        assert!(!settings.wrap_result_sets);
        assert!(!settings.comments_enabled);
        assert_eq!(settings.default_batch_fetch_size, 1);
        assert_eq!(settings.max_fetch_depth, None);
        assert_eq!(settings.default_lock_timeout, LockTimeout::WaitForever);
    }

    #[test]
    fn test_builder() {
        let settings = LoaderSettings::new()
            .with_comments(true)
            .with_default_batch_fetch_size(0)
            .with_max_fetch_depth(3);
        assert!(settings.comments_enabled);
        assert_eq!(settings.default_batch_fetch_size, 1);
        assert_eq!(settings.max_fetch_depth, Some(3));
    }

    #[test]
    fn test_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("WRAP_RESULT_SETS", "true"),
            ("DEFAULT_BATCH_FETCH_SIZE", "16"),
            ("DEFAULT_LOCK_TIMEOUT", "2500"),
        ]
        .into_iter()
        .collect();
        let settings =
            LoaderSettings::from_lookup(|key| vars.get(key).map(|v| v.to_string())).unwrap();
        assert!(settings.wrap_result_sets);
        assert_eq!(settings.default_batch_fetch_size, 16);
        assert_eq!(settings.default_lock_timeout, LockTimeout::Millis(2500));
        assert!(settings.scrollable_result_sets);
    }

    #[test]
    fn test_from_lookup_rejects_garbage() {
        let result = LoaderSettings::from_lookup(|key| {
            (key == "COMMENTS_ENABLED").then(|| "maybe".to_string())
        });
        assert!(matches!(result, Err(Error::Mapping(_))));
    }

    #[test]
    fn test_serde_fills_defaults() {
        let settings: LoaderSettings =
            serde_json::from_str(r#"{"comments_enabled": true}"#).unwrap();
        assert!(settings.comments_enabled);
        assert!(settings.scrollable_result_sets);
    }
}
