//! Lock modes and their SQL rendering.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Row lock requested for a load.
///
/// Variants are declared weakest first; the derived ordering is used to pick
/// the greatest mode among alias-specific requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockMode {
    #[default]
    None,
    Read,
    Optimistic,
    PessimisticRead,
    PessimisticWrite,
    UpgradeNoWait,
    UpgradeSkipLocked,
    PessimisticForceIncrement,
}

impl LockMode {
    /// Parse a lock mode name as used on the command line.
    pub fn parse(name: &str) -> Option<Self> {
        let mode = match name.to_ascii_lowercase().replace('-', "_").as_str() {
            "none" => Self::None,
            "read" => Self::Read,
            "optimistic" => Self::Optimistic,
            "pessimistic_read" => Self::PessimisticRead,
            "pessimistic_write" | "upgrade" => Self::PessimisticWrite,
            "upgrade_nowait" => Self::UpgradeNoWait,
            "upgrade_skiplocked" | "upgrade_skip_locked" => Self::UpgradeSkipLocked,
            "pessimistic_force_increment" => Self::PessimisticForceIncrement,
            _ => return None,
        };
        Some(mode)
    }

    /// Whether this mode takes a database row lock.
    pub fn is_pessimistic(&self) -> bool {
        *self >= Self::PessimisticRead
    }

    /// Whether this mode takes a write lock.
    pub fn is_write(&self) -> bool {
        *self >= Self::PessimisticWrite
    }
}

/// How long to wait for a row lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockTimeout {
    #[default]
    WaitForever,
    NoWait,
    SkipLocked,
    Millis(u32),
}

/// Lock mode plus timeout and per-alias overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockOptions {
    pub lock_mode: LockMode,
    pub timeout: LockTimeout,
    /// Lock modes for specific table aliases, overriding `lock_mode`.
    #[serde(default)]
    pub alias_lock_modes: BTreeMap<String, LockMode>,
}

impl LockOptions {
    /// No locking.
    pub fn none() -> Self {
        Self::default()
    }

    /// Lock with the given mode and no timeout.
    pub fn new(lock_mode: LockMode) -> Self {
        Self {
            lock_mode,
            ..Default::default()
        }
    }

    /// Set the lock timeout.
    pub fn with_timeout(mut self, timeout: LockTimeout) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override the lock mode for one table alias.
    pub fn with_alias_lock_mode(mut self, alias: impl Into<String>, mode: LockMode) -> Self {
        self.alias_lock_modes.insert(alias.into(), mode);
        self
    }

    /// Lock mode applying to the given table alias.
    pub fn effective_lock_mode(&self, alias: &str) -> LockMode {
        self.alias_lock_modes
            .get(alias)
            .copied()
            .unwrap_or(self.lock_mode)
    }

    /// Strongest mode requested anywhere in these options.
    pub fn greatest_lock_mode(&self) -> LockMode {
        self.alias_lock_modes
            .values()
            .copied()
            .fold(self.lock_mode, LockMode::max)
    }

    /// Whether no lock at all is requested.
    pub fn is_none(&self) -> bool {
        self.greatest_lock_mode() == LockMode::None
    }
}

/// How a dialect renders a lock wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitStyle {
    /// Lock timeouts cannot be expressed in SQL.
    Unsupported,
    /// ` wait <seconds>` as a literal.
    Seconds,
    /// ` wait ?` with the timeout bound as a parameter.
    Parameterized,
}

/// Lock rendering for one dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockSyntax {
    pub for_update: &'static str,
    pub for_read: &'static str,
    pub no_wait: Option<&'static str>,
    pub skip_locked: Option<&'static str>,
    pub wait: WaitStyle,
    /// Locks are table hints after the table reference instead of a
    /// trailing clause.
    pub table_hints: bool,
}

impl LockSyntax {
    /// ANSI `for update` with no timeout support.
    pub const fn for_update() -> Self {
        Self {
            for_update: " for update",
            for_read: " for update",
            no_wait: None,
            skip_locked: None,
            wait: WaitStyle::Unsupported,
            table_hints: false,
        }
    }

    /// Dialects with no locking clause at all.
    pub const fn unsupported() -> Self {
        Self {
            for_update: "",
            for_read: "",
            no_wait: None,
            skip_locked: None,
            wait: WaitStyle::Unsupported,
            table_hints: false,
        }
    }

    /// Whether a lock wait can be expressed.
    pub fn supports_lock_timeouts(&self) -> bool {
        self.wait != WaitStyle::Unsupported
    }

    /// Whether the wait is bound as a statement parameter.
    pub fn is_lock_timeout_parameterized(&self) -> bool {
        self.wait == WaitStyle::Parameterized
    }

    /// Trailing lock clause for a SELECT.
    pub fn for_update_string(&self, options: &LockOptions) -> String {
        if self.table_hints {
            return String::new();
        }
        let mode = options.greatest_lock_mode();
        let base = match mode {
            LockMode::PessimisticRead => self.for_read,
            LockMode::PessimisticWrite | LockMode::PessimisticForceIncrement => self.for_update,
            LockMode::UpgradeNoWait => {
                return format!("{}{}", self.for_update, self.no_wait.unwrap_or(""));
            }
            LockMode::UpgradeSkipLocked => {
                return format!("{}{}", self.for_update, self.skip_locked.unwrap_or(""));
            }
            LockMode::None | LockMode::Read | LockMode::Optimistic => return String::new(),
        };
        if base.is_empty() {
            return String::new();
        }
        format!("{base}{}", self.timeout_suffix(options.timeout))
    }

    fn timeout_suffix(&self, timeout: LockTimeout) -> String {
        match timeout {
            LockTimeout::WaitForever => String::new(),
            LockTimeout::NoWait => self.no_wait.unwrap_or("").to_string(),
            LockTimeout::SkipLocked => self.skip_locked.unwrap_or("").to_string(),
            LockTimeout::Millis(millis) => match self.wait {
                WaitStyle::Unsupported => String::new(),
                WaitStyle::Seconds => format!(" wait {}", millis.div_ceil(1000)),
                WaitStyle::Parameterized => " wait ?".to_string(),
            },
        }
    }

    /// Decorate a `table alias` fragment with a lock hint.
    pub fn append_lock_hint(&self, mode: LockMode, timeout: LockTimeout, table_with_alias: &str) -> String {
        if !self.table_hints || !mode.is_pessimistic() {
            return table_with_alias.to_string();
        }
        let lock = if mode.is_write() { "updlock" } else { "holdlock" };
        let wait = match (mode, timeout) {
            (LockMode::UpgradeNoWait, _) | (_, LockTimeout::NoWait) => ", nowait",
            (LockMode::UpgradeSkipLocked, _) | (_, LockTimeout::SkipLocked) => ", readpast",
            _ => "",
        };
        format!("{table_with_alias} with ({lock}, rowlock{wait})")
    }
}
