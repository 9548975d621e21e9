//! Bind values and per-execution options of a load.

use std::collections::BTreeMap;

use ormload_dialect::{LockOptions, RowSelection};

use crate::error::{Error, Result};
use crate::mapping::LoadQueryInfluencers;
use crate::process::ResultTransformer;
use crate::value::{TypedValue, Value};

/// Everything one execution of a [`LoadQueryDetails`](crate::query::LoadQueryDetails)
/// needs besides the statement.
#[derive(Debug, Clone, Default)]
pub struct QueryParameters {
    /// Values for `?` placeholders, in order. A composite value covers as
    /// many placeholders as its type spans.
    pub positional: Vec<TypedValue>,
    /// Values for `:name` placeholders.
    pub named: BTreeMap<String, TypedValue>,
    pub row_selection: Option<RowSelection>,
    pub lock_options: LockOptions,
    /// Filters enabled when the statement was built.
    pub influencers: LoadQueryInfluencers,
    /// Request a scrollable cursor.
    pub scroll: bool,
    /// Execute as a callable statement returning its rows through an out
    /// parameter.
    pub callable: bool,
    pub read_only: Option<bool>,
    /// Overrides the statement's own comment.
    pub comment: Option<String>,
    pub transformer: ResultTransformer,
    /// Owner keys of a collection load.
    pub collection_keys: Vec<Value>,
}

/// SQL with every named placeholder rewritten to `?`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedStatement {
    pub sql: String,
    /// Positional and filter values, in SQL text order, with the zero based
    /// index of the first placeholder each one covers.
    pub positional: Vec<(TypedValue, usize)>,
    /// Named values, one entry per occurrence, with their placeholder index.
    pub named: Vec<(TypedValue, usize)>,
    /// Placeholders in `sql`, plus any positional values left over after
    /// the last one.
    pub placeholders: usize,
}

impl QueryParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_positional(mut self, value: TypedValue) -> Self {
        self.positional.push(value);
        self
    }

    pub fn with_named(mut self, name: impl Into<String>, value: TypedValue) -> Self {
        self.named.insert(name.into(), value);
        self
    }

    pub fn with_row_selection(mut self, selection: RowSelection) -> Self {
        self.row_selection = Some(selection);
        self
    }

    pub fn with_lock_options(mut self, lock_options: LockOptions) -> Self {
        self.lock_options = lock_options;
        self
    }

    pub fn with_influencers(mut self, influencers: LoadQueryInfluencers) -> Self {
        self.influencers = influencers;
        self
    }

    pub fn with_scroll(mut self, scroll: bool) -> Self {
        self.scroll = scroll;
        self
    }

    pub fn with_callable(mut self, callable: bool) -> Self {
        self.callable = callable;
        self
    }

    pub fn with_read_only(mut self, read_only: Option<bool>) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn with_transformer(mut self, transformer: ResultTransformer) -> Self {
        self.transformer = transformer;
        self
    }

    pub fn with_collection_keys(mut self, keys: Vec<Value>) -> Self {
        self.collection_keys = keys;
        self
    }

    /// Replace `:filter.param` placeholders with `?`, one per value, and
    /// merge their values with the positional ones in text order. Other
    /// `:name` placeholders become `?` too and keep the index they occupy
    /// in the rewritten SQL. A `?` with no positional value left is kept
    /// for the caller, such as a parameterized lock wait.
    pub fn process_filters(&self, sql: &str) -> Result<ProcessedStatement> {
        let mut out = String::with_capacity(sql.len());
        let mut positional = Vec::with_capacity(self.positional.len());
        let mut named = Vec::new();
        let mut index = 0usize;
        let mut pending = self.positional.iter();
        let mut remaining_span = 0usize;
        let mut chars = sql.char_indices().peekable();

        while let Some((start, c)) = chars.next() {
            match c {
                '\'' => {
                    out.push(c);
                    for (_, quoted) in chars.by_ref() {
                        out.push(quoted);
                        if quoted == '\'' {
                            break;
                        }
                    }
                }
                '?' => {
                    if remaining_span > 0 {
                        remaining_span -= 1;
                    } else if let Some(value) = pending.next() {
                        positional.push((value.clone(), index));
                        remaining_span = value.column_span().saturating_sub(1);
                    }
                    out.push('?');
                    index += 1;
                }
                ':' if chars.peek().is_some_and(|(_, next)| *next == ':') => {
                    // a cast, not a parameter
                    out.push_str("::");
                    chars.next();
                }
                ':' if chars.peek().is_some_and(|(_, next)| is_name_start(*next)) => {
                    let mut end = start + 1;
                    while let Some((at, next)) = chars.peek().copied() {
                        if !is_name_part(next) {
                            break;
                        }
                        end = at + next.len_utf8();
                        chars.next();
                    }
                    let name = &sql[start + 1..end];
                    if name.contains('.') {
                        let (value, ty) = self.influencers.filter_parameter(name)?;
                        let values = value.values();
                        if values.is_empty() {
                            return Err(Error::illegal_argument(format!(
                                "filter parameter [{name}] has an empty value list"
                            )));
                        }
                        out.push_str(&vec!["?"; values.len()].join(", "));
                        for v in values {
                            positional.push((TypedValue::new(v.clone(), ty.clone()), index));
                            index += 1;
                        }
                    } else {
                        let value = self
                            .named
                            .get(name)
                            .ok_or_else(|| Error::illegal_argument(format!("no value bound for parameter [{name}]")))?;
                        out.push_str(&vec!["?"; value.column_span()].join(", "));
                        named.push((value.clone(), index));
                        index += value.column_span();
                    }
                }
                _ => out.push(c),
            }
        }
        for value in pending {
            positional.push((value.clone(), index));
            index += value.column_span();
        }
        Ok(ProcessedStatement {
            sql: out,
            positional,
            named,
            placeholders: index,
        })
    }
}

fn is_name_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_name_part(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '.'
}
