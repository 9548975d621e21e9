//! Row selection and LIMIT/OFFSET rewriting.
//!
//! A [`LimitHandler`] rewrites a finished SELECT for pagination and reports
//! the values that must be bound for the placeholders it introduced, either
//! before all other parameters or after them.

use serde::{Deserialize, Serialize};

/// Pagination and statement options requested for one execution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowSelection {
    /// Zero-based index of the first row to return.
    pub first_row: Option<u32>,
    /// Maximum number of rows to return.
    pub max_rows: Option<u32>,
    /// Driver fetch size hint.
    pub fetch_size: Option<u32>,
    /// Statement timeout in seconds.
    pub timeout: Option<u32>,
}

impl RowSelection {
    /// Select at most `max_rows` rows.
    pub fn limit(max_rows: u32) -> Self {
        Self {
            max_rows: Some(max_rows),
            ..Default::default()
        }
    }

    /// Select `max_rows` rows starting at `first_row`.
    pub fn page(first_row: u32, max_rows: u32) -> Self {
        Self {
            first_row: Some(first_row),
            max_rows: Some(max_rows),
            ..Default::default()
        }
    }

    /// Set the fetch size hint.
    pub fn with_fetch_size(mut self, fetch_size: u32) -> Self {
        self.fetch_size = Some(fetch_size);
        self
    }

    /// Set the statement timeout in seconds.
    pub fn with_timeout(mut self, seconds: u32) -> Self {
        self.timeout = Some(seconds);
        self
    }
}

/// Whether a positive row limit was requested.
pub fn has_max_rows(selection: Option<&RowSelection>) -> bool {
    selection
        .and_then(|s| s.max_rows)
        .map(|max| max > 0)
        .unwrap_or(false)
}

/// The requested first row, zero when none.
pub fn first_row(selection: Option<&RowSelection>) -> u32 {
    selection.and_then(|s| s.first_row).unwrap_or(0)
}

/// Whether rows must be skipped before the first returned row.
pub fn has_first_row(selection: Option<&RowSelection>) -> bool {
    first_row(selection) > 0
}

/// Whether the handler should rewrite SQL for this selection.
pub fn use_limit(handler: &LimitHandler, selection: Option<&RowSelection>) -> bool {
    handler.supports_limit() && has_max_rows(selection)
}

/// The SQL shape a dialect uses for pagination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitStyle {
    /// No native support; rows are skipped on the cursor.
    None,
    /// `... limit ? offset ?`
    LimitOffset,
    /// `... limit ?, ?` with the offset first.
    LimitCommaOffset,
    /// `... offset ? rows fetch next ? rows only`
    OffsetFetch,
    /// `select first ? skip ? ...`, bound before other parameters.
    FirstSkip,
    /// `select top ? ...`, bound before other parameters, no offset support.
    Top,
    /// Oracle `rownum` wrapping.
    RowNum,
}

/// Pagination strategy for one dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitHandler {
    style: LimitStyle,
}

impl LimitHandler {
    /// Create a handler for the given style.
    pub const fn new(style: LimitStyle) -> Self {
        Self { style }
    }

    /// A handler that never rewrites SQL.
    pub const fn noop() -> Self {
        Self::new(LimitStyle::None)
    }

    /// The pagination style.
    pub fn style(&self) -> LimitStyle {
        self.style
    }

    /// Whether the SQL can be rewritten with a row limit at all.
    pub fn supports_limit(&self) -> bool {
        self.style != LimitStyle::None
    }

    /// Whether the rewritten SQL can skip rows itself.
    pub fn supports_limit_offset(&self) -> bool {
        !matches!(self.style, LimitStyle::None | LimitStyle::Top)
    }

    /// Whether the limit values are bound before every other parameter.
    pub fn bind_limit_parameters_first(&self) -> bool {
        matches!(self.style, LimitStyle::FirstSkip | LimitStyle::Top)
    }

    /// Whether the limit value is bound before the offset value.
    fn bind_in_reverse_order(&self) -> bool {
        matches!(
            self.style,
            LimitStyle::LimitOffset | LimitStyle::FirstSkip | LimitStyle::RowNum
        )
    }

    /// Whether the bound limit is the last row number rather than a count.
    fn use_max_for_limit(&self) -> bool {
        matches!(self.style, LimitStyle::RowNum | LimitStyle::Top)
    }

    /// Rewrite the SQL for the selection.
    ///
    /// Callers only invoke this when [`use_limit`] holds; otherwise the SQL
    /// is returned unchanged.
    pub fn process_sql(&self, sql: &str, selection: Option<&RowSelection>) -> String {
        if !use_limit(self, selection) {
            return sql.to_string();
        }
        let has_offset = self.supports_limit_offset() && has_first_row(selection);
        // Trailing lock clauses must follow the pagination clause.
        let (body, lock) = split_lock_clause(sql);

        match self.style {
            LimitStyle::None => sql.to_string(),
            LimitStyle::LimitOffset => {
                let clause = if has_offset { " limit ? offset ?" } else { " limit ?" };
                format!("{body}{clause}{lock}")
            }
            LimitStyle::LimitCommaOffset => {
                let clause = if has_offset { " limit ?, ?" } else { " limit ?" };
                format!("{body}{clause}{lock}")
            }
            LimitStyle::OffsetFetch => {
                let clause = if has_offset {
                    " offset ? rows fetch next ? rows only"
                } else {
                    " fetch first ? rows only"
                };
                format!("{body}{clause}{lock}")
            }
            LimitStyle::FirstSkip => {
                let clause = if has_offset { " first ? skip ?" } else { " first ?" };
                insert_after_select(sql, clause, false)
            }
            LimitStyle::Top => insert_after_select(sql, " top ?", true),
            LimitStyle::RowNum => {
                let wrapped = if has_offset {
                    format!(
                        "select * from ( select row_.*, rownum rownum_ from ( {body} ) row_ where rownum <= ?) where rownum_ > ?"
                    )
                } else {
                    format!("select * from ( {body} ) where rownum <= ?")
                };
                format!("{wrapped}{lock}")
            }
        }
    }

    /// Limit values in the order their placeholders appear.
    pub fn limit_parameters(&self, selection: Option<&RowSelection>) -> Vec<i64> {
        if !use_limit(self, selection) {
            return Vec::new();
        }
        let first = i64::from(first_row(selection));
        let max = i64::from(selection.and_then(|s| s.max_rows).unwrap_or(0));
        let last = if self.use_max_for_limit() { first + max } else { max };
        let has_offset = self.supports_limit_offset() && first > 0;

        if !has_offset {
            vec![last]
        } else if self.bind_in_reverse_order() {
            vec![last, first]
        } else {
            vec![first, last]
        }
    }

    /// Values to bind before all other parameters.
    pub fn parameters_at_start_of_query(&self, selection: Option<&RowSelection>) -> Vec<i64> {
        if self.bind_limit_parameters_first() {
            self.limit_parameters(selection)
        } else {
            Vec::new()
        }
    }

    /// Values to bind after all other parameters.
    pub fn parameters_at_end_of_query(&self, selection: Option<&RowSelection>) -> Vec<i64> {
        if self.bind_limit_parameters_first() {
            Vec::new()
        } else {
            self.limit_parameters(selection)
        }
    }

    /// Driver-level max rows to set on the statement, if any.
    ///
    /// Only the no-op handler caps rows this way; it has to cover the rows
    /// skipped on the cursor too.
    pub fn statement_max_rows(&self, selection: Option<&RowSelection>) -> Option<u32> {
        if self.supports_limit() || !has_max_rows(selection) {
            return None;
        }
        let max = selection.and_then(|s| s.max_rows).unwrap_or(0);
        Some(max.saturating_add(first_row(selection)))
    }
}

impl Default for LimitHandler {
    fn default() -> Self {
        Self::noop()
    }
}

fn insert_after_select(sql: &str, clause: &str, after_distinct: bool) -> String {
    let lower = sql.to_ascii_lowercase();
    let Some(select_at) = lower.find("select") else {
        return sql.to_string();
    };
    let mut insert_at = select_at + "select".len();
    if after_distinct && lower[insert_at..].trim_start().starts_with("distinct") {
        let skipped = lower[insert_at..].len() - lower[insert_at..].trim_start().len();
        insert_at += skipped + "distinct".len();
    }
    format!("{}{}{}", &sql[..insert_at], clause, &sql[insert_at..])
}

const LOCK_CLAUSES: [&str; 3] = [" for update", " for share", " lock in share mode"];

fn split_lock_clause(sql: &str) -> (&str, &str) {
    let lower = sql.to_ascii_lowercase();
    let at = LOCK_CLAUSES
        .iter()
        .filter_map(|clause| lower.rfind(clause))
        .min();
    match at {
        Some(at) => (&sql[..at], &sql[at..]),
        None => (sql, ""),
    }
}
