//! SELECT statement assembly.

use ormload_dialect::{Dialect, LockOptions};

/// Accumulates the clauses of one SELECT and renders the statement.
#[derive(Debug, Clone)]
pub struct SelectStatementBuilder<'d> {
    dialect: &'d Dialect,
    select_clause: String,
    from_clause: String,
    outer_joins_after_from: String,
    outer_joins_after_where: String,
    where_clause: String,
    order_by_clause: String,
    lock_options: LockOptions,
    comment: Option<String>,
}

impl<'d> SelectStatementBuilder<'d> {
    pub fn new(dialect: &'d Dialect) -> Self {
        Self {
            dialect,
            select_clause: String::new(),
            from_clause: String::new(),
            outer_joins_after_from: String::new(),
            outer_joins_after_where: String::new(),
            where_clause: String::new(),
            order_by_clause: String::new(),
            lock_options: LockOptions::none(),
            comment: None,
        }
    }

    /// Append a select-clause fragment, comma separated from earlier ones.
    pub fn append_select_clause_fragment(&mut self, fragment: &str) {
        append_list(&mut self.select_clause, fragment);
    }

    /// Append the table reference of the root, possibly decorated with a
    /// lock hint.
    pub fn append_from_clause_fragment(&mut self, fragment: &str) {
        append_list(&mut self.from_clause, fragment);
    }

    /// Add a WHERE restriction. A leading `and` is dropped and restrictions
    /// are joined with `and`.
    pub fn append_restrictions(&mut self, restrictions: &str) {
        let cleaned = restrictions.trim();
        let cleaned = cleaned.strip_prefix("and ").unwrap_or(cleaned).trim();
        if cleaned.is_empty() {
            return;
        }
        if !self.where_clause.is_empty() {
            self.where_clause.push_str(" and ");
        }
        self.where_clause.push_str(cleaned);
    }

    /// Set the FROM and WHERE parts produced by the join fragment builder.
    pub fn set_outer_joins(&mut self, after_from: &str, after_where: &str) {
        self.outer_joins_after_from = after_from.to_string();
        let cleaned = after_where.trim();
        self.outer_joins_after_where = cleaned.strip_prefix("and").unwrap_or(cleaned).trim().to_string();
    }

    /// Append an ORDER BY fragment, comma separated from earlier ones.
    pub fn append_order_by_fragment(&mut self, fragment: &str) {
        append_list(&mut self.order_by_clause, fragment.trim());
    }

    pub fn set_lock_options(&mut self, lock_options: LockOptions) {
        self.lock_options = lock_options;
    }

    pub fn set_comment(&mut self, comment: impl Into<String>) {
        self.comment = Some(comment.into());
    }

    /// Comment to prefix the statement with when comments are enabled.
    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    pub fn to_statement_string(&self) -> String {
        let mut sql = String::with_capacity(
            self.select_clause.len() + self.from_clause.len() + self.outer_joins_after_from.len() + 32,
        );
        sql.push_str("select ");
        sql.push_str(&self.select_clause);
        sql.push_str(" from ");
        sql.push_str(&self.from_clause);
        sql.push_str(&self.outer_joins_after_from);

        if !self.where_clause.is_empty() || !self.outer_joins_after_where.is_empty() {
            sql.push_str(" where ");
            sql.push_str(&self.outer_joins_after_where);
            if !self.where_clause.is_empty() {
                if !self.outer_joins_after_where.is_empty() {
                    sql.push_str(" and ");
                }
                sql.push_str(&self.where_clause);
            }
        }

        if !self.order_by_clause.is_empty() {
            sql.push_str(" order by ");
            sql.push_str(&self.order_by_clause);
        }

        if !self.lock_options.is_none() {
            sql.push_str(&self.dialect.for_update_string(&self.lock_options));
        }
        sql
    }
}

fn append_list(buffer: &mut String, fragment: &str) {
    if fragment.is_empty() {
        return;
    }
    if !buffer.is_empty() {
        buffer.push_str(", ");
    }
    buffer.push_str(fragment);
}
