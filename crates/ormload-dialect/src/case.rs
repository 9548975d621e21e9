//! CASE expressions used to discriminate subclass rows.

use serde::{Deserialize, Serialize};

/// Case expression rendering style of a dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStyle {
    /// `case when c is not null then v ... end`
    Ansi,
    /// Nested `nvl2(c, v, ...)` calls.
    Nvl2,
}

/// Maps "column is not null" tests to result values.
///
/// The first non-null column, in insertion order, picks the value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseFragment {
    style: CaseStyle,
    cases: Vec<(String, String)>,
    return_column: Option<String>,
}

impl CaseFragment {
    pub fn new(style: CaseStyle) -> Self {
        Self {
            style,
            cases: Vec::new(),
            return_column: None,
        }
    }

    /// Name the expression with an `as` alias.
    pub fn set_return_column_name(&mut self, column_alias: impl Into<String>) -> &mut Self {
        self.return_column = Some(column_alias.into());
        self
    }

    /// Yield `value` when `alias.column` is not null.
    pub fn add_when_column_not_null(&mut self, alias: &str, column: &str, value: impl Into<String>) -> &mut Self {
        self.cases.push((format!("{alias}.{column}"), value.into()));
        self
    }

    /// Render the expression.
    pub fn to_fragment_string(&self) -> String {
        let mut sql = match self.style {
            CaseStyle::Ansi => {
                let mut sql = String::from("case");
                for (column, value) in &self.cases {
                    sql.push_str(&format!(" when {column} is not null then {value}"));
                }
                sql.push_str(" end");
                sql
            }
            CaseStyle::Nvl2 => {
                let mut sql = String::new();
                for (column, value) in &self.cases {
                    sql.push_str(&format!("nvl2({column}, {value}, "));
                }
                sql.push_str("null");
                sql.push_str(&")".repeat(self.cases.len()));
                sql
            }
        };
        if let Some(alias) = &self.return_column {
            sql.push_str(" as ");
            sql.push_str(alias);
        }
        sql
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ansi_case() {
        let mut case = CaseFragment::new(CaseStyle::Ansi);
        case.add_when_column_not_null("user0_1_", "id", "1")
            .add_when_column_not_null("user0_", "id", "0")
            .set_return_column_name("clazz_0_");
        assert_eq!(
            case.to_fragment_string(),
            "case when user0_1_.id is not null then 1 when user0_.id is not null then 0 end as clazz_0_"
        );
    }

    #[test]
    fn test_nvl2_case() {
        let mut case = CaseFragment::new(CaseStyle::Nvl2);
        case.add_when_column_not_null("a", "id", "1")
            .add_when_column_not_null("b", "id", "0");
        assert_eq!(
            case.to_fragment_string(),
            "nvl2(a.id, 1, nvl2(b.id, 0, null))"
        );
    }
}
