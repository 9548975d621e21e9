//! Outer-join fragment builders.
//!
//! A [`JoinFragment`] accumulates joins into two strings: text placed right
//! after the root table in the FROM clause, and conditions placed in the
//! WHERE clause. ANSI dialects put everything in the FROM part; theta-style
//! dialects list tables with commas and mark outer joins with `(+)`.

use serde::{Deserialize, Serialize};

/// SQL join type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinType {
    Inner,
    LeftOuter,
    RightOuter,
    Full,
}

impl JoinType {
    /// INNER when the association is required, LEFT OUTER otherwise.
    pub fn for_required(required: bool) -> Self {
        if required {
            Self::Inner
        } else {
            Self::LeftOuter
        }
    }

    fn ansi_keyword(&self) -> &'static str {
        match self {
            Self::Inner => " inner join ",
            Self::LeftOuter => " left outer join ",
            Self::RightOuter => " right outer join ",
            Self::Full => " full outer join ",
        }
    }
}

/// Join rendering style of a dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinStyle {
    /// `left outer join t a on ...`
    Ansi,
    /// `, t a` plus `lhs=a.rhs(+)` in the WHERE clause.
    OracleTheta,
}

/// Accumulated join text for one SELECT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinFragment {
    style: JoinStyle,
    after_from: String,
    after_where: String,
}

impl JoinFragment {
    /// Create an empty fragment in the given style.
    pub fn new(style: JoinStyle) -> Self {
        Self {
            style,
            after_from: String::new(),
            after_where: String::new(),
        }
    }

    /// The rendering style.
    pub fn style(&self) -> JoinStyle {
        self.style
    }

    /// Add a join of `table alias` whose `rhs_columns` match the already
    /// qualified `lhs_columns`, with an optional extra ON condition.
    pub fn add_join(
        &mut self,
        table: &str,
        alias: &str,
        lhs_columns: &[String],
        rhs_columns: &[String],
        join_type: JoinType,
        on: &str,
    ) {
        match self.style {
            JoinStyle::Ansi => {
                self.after_from.push_str(join_type.ansi_keyword());
                self.after_from.push_str(table);
                self.after_from.push(' ');
                self.after_from.push_str(alias);
                self.after_from.push_str(" on ");
                let correlation = lhs_columns
                    .iter()
                    .zip(rhs_columns)
                    .map(|(lhs, rhs)| format!("{lhs}={alias}.{rhs}"))
                    .collect::<Vec<_>>()
                    .join(" and ");
                self.after_from.push_str(&correlation);
                append_condition(&mut self.after_from, on);
            }
            JoinStyle::OracleTheta => {
                self.add_cross_join(table, alias);
                let outer = if join_type == JoinType::LeftOuter { "(+)" } else { "" };
                for (lhs, rhs) in lhs_columns.iter().zip(rhs_columns) {
                    self.after_where
                        .push_str(&format!(" and {lhs}={alias}.{rhs}{outer}"));
                }
                append_condition(&mut self.after_where, on);
            }
        }
    }

    /// Add a table with no join condition.
    pub fn add_cross_join(&mut self, table: &str, alias: &str) {
        self.after_from.push_str(", ");
        self.after_from.push_str(table);
        self.after_from.push(' ');
        self.after_from.push_str(alias);
    }

    /// Append pre-rendered from/where fragments, e.g. a persister's
    /// subclass joins.
    pub fn add_joins(&mut self, from_fragment: &str, where_fragment: &str) {
        self.after_from.push_str(from_fragment);
        append_condition(&mut self.after_where, where_fragment);
    }

    /// Add a WHERE-clause condition. Returns false for an empty condition.
    pub fn add_condition(&mut self, condition: &str) -> bool {
        if condition.trim().is_empty() {
            return false;
        }
        append_condition(&mut self.after_where, condition);
        true
    }

    /// Merge another fragment's text into this one.
    pub fn add_fragment(&mut self, other: &JoinFragment) {
        self.add_joins(&other.after_from, &other.after_where);
    }

    /// Text to place after the root table reference.
    pub fn to_from_fragment_string(&self) -> &str {
        &self.after_from
    }

    /// Conditions to place in the WHERE clause, each prefixed with ` and `.
    pub fn to_where_fragment_string(&self) -> &str {
        &self.after_where
    }

    /// Whether nothing has been added.
    pub fn is_empty(&self) -> bool {
        self.after_from.is_empty() && self.after_where.is_empty()
    }
}

fn append_condition(buffer: &mut String, condition: &str) {
    let condition = condition.trim_end();
    if condition.trim().is_empty() {
        return;
    }
    if !condition.trim_start().starts_with("and ") {
        buffer.push_str(" and ");
    } else if !condition.starts_with(' ') {
        buffer.push(' ');
    }
    buffer.push_str(condition);
}
