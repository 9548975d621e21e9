//! Rendering of mapped SQL fragments against a table alias.
//!
//! Mapping documents write `where`, `order-by` and filter conditions with
//! bare column names. Rendering qualifies every column reference with the
//! alias and leaves keywords, literals, named parameters and known SQL
//! functions untouched.

use ormload_dialect::Dialect;

use crate::error::Result;

const KEYWORDS: &[&str] = &[
    "all", "and", "any", "as", "asc", "between", "by", "case", "cast", "collate", "desc",
    "distinct", "else", "end", "escape", "exists", "false", "first", "from", "group", "having",
    "in", "is", "last", "like", "not", "null", "nulls", "on", "or", "order", "select", "some",
    "then", "true", "union", "unknown", "when", "where",
];

#[derive(Debug, Clone, PartialEq)]
enum Token<'a> {
    Identifier(&'a str),
    Quoted(&'a str),
    Parameter(&'a str),
    Literal(&'a str),
    Other(&'a str),
}

fn tokenize(fragment: &str) -> Result<Vec<Token<'_>>> {
    let bytes = fragment.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i] as char;
        let start = i;
        if c == '\'' {
            i += 1;
            loop {
                match bytes.get(i) {
                    None => {
                        return Err(ormload_dialect::Error::InvalidFragment(format!(
                            "unterminated literal in {fragment:?}"
                        ))
                        .into())
                    }
                    Some(b'\'') if bytes.get(i + 1) == Some(&b'\'') => i += 2,
                    Some(b'\'') => {
                        i += 1;
                        break;
                    }
                    Some(_) => i += 1,
                }
            }
            tokens.push(Token::Literal(&fragment[start..i]));
        } else if c == '`' {
            let end = fragment[i + 1..].find('`').ok_or_else(|| {
                ormload_dialect::Error::InvalidFragment(format!(
                    "unterminated quoted identifier in {fragment:?}"
                ))
            })?;
            i += end + 2;
            tokens.push(Token::Quoted(&fragment[start..i]));
        } else if c == ':' && bytes.get(i + 1).is_some_and(|b| is_ident_start(*b as char)) {
            i += 1;
            while i < bytes.len() && (is_ident_part(bytes[i] as char) || bytes[i] == b'.') {
                i += 1;
            }
            tokens.push(Token::Parameter(&fragment[start..i]));
        } else if is_ident_start(c) {
            while i < bytes.len() && (is_ident_part(bytes[i] as char) || bytes[i] == b'.') {
                i += 1;
            }
            tokens.push(Token::Identifier(&fragment[start..i]));
        } else if c.is_ascii_digit() {
            while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'.') {
                i += 1;
            }
            tokens.push(Token::Literal(&fragment[start..i]));
        } else {
            i += 1;
            while !fragment.is_char_boundary(i) {
                i += 1;
            }
            tokens.push(Token::Other(&fragment[start..i]));
        }
    }
    Ok(tokens)
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_part(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

fn is_keyword(word: &str) -> bool {
    KEYWORDS.contains(&word.to_ascii_lowercase().as_str())
}

/// Qualify column references in `fragment` with `alias`.
pub fn render(fragment: &str, alias: &str, dialect: &Dialect) -> Result<String> {
    render_with(fragment, alias, dialect, None)
}

/// Qualify a filter condition and rewrite its `:param` placeholders to
/// `:filter.param`.
pub fn render_filter(condition: &str, filter: &str, alias: &str, dialect: &Dialect) -> Result<String> {
    render_with(condition, alias, dialect, Some(filter))
}

fn render_with(fragment: &str, alias: &str, dialect: &Dialect, filter: Option<&str>) -> Result<String> {
    let tokens = tokenize(fragment)?;
    let mut out = String::with_capacity(fragment.len() + 16);
    let mut previous_word: Option<&str> = None;
    for (index, token) in tokens.iter().enumerate() {
        match token {
            Token::Identifier(word) => {
                let followed_by_paren = tokens[index + 1..]
                    .iter()
                    .find(|t| !matches!(t, Token::Other(s) if s.trim().is_empty()))
                    .is_some_and(|t| *t == Token::Other("("));
                let after_as = previous_word.is_some_and(|w| w.eq_ignore_ascii_case("as"));
                let leave = word.contains('.')
                    || is_keyword(word)
                    || followed_by_paren
                    || after_as
                    || dialect.functions().is_no_parens_function(word);
                if leave {
                    out.push_str(word);
                } else {
                    out.push_str(alias);
                    out.push('.');
                    out.push_str(word);
                }
                previous_word = Some(word);
            }
            Token::Quoted(quoted) => {
                out.push_str(alias);
                out.push('.');
                out.push_str(&dialect.quote_mapped(quoted));
                previous_word = None;
            }
            Token::Parameter(param) => {
                match filter {
                    Some(filter) if !param.contains('.') => {
                        out.push(':');
                        out.push_str(filter);
                        out.push('.');
                        out.push_str(&param[1..]);
                    }
                    _ => out.push_str(param),
                }
                previous_word = None;
            }
            Token::Literal(text) => {
                out.push_str(text);
                previous_word = None;
            }
            Token::Other(text) => {
                out.push_str(text);
                if !text.trim().is_empty() {
                    previous_word = None;
                }
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualifies_columns() {
        let dialect = Dialect::ansi();
        let sql = render("status = 'active' and deleted = 0", "u0_", &dialect).unwrap();
        assert_eq!(sql, "u0_.status = 'active' and u0_.deleted = 0");
    }

    #[test]
    fn test_leaves_functions_and_keywords() {
        let dialect = Dialect::ansi();
        let sql = render(
            "lower(name) like 'a%' and created_at < current_timestamp and x is not null",
            "p1_",
            &dialect,
        )
        .unwrap();
        assert_eq!(
            sql,
            "lower(p1_.name) like 'a%' and p1_.created_at < current_timestamp and p1_.x is not null"
        );
    }

    #[test]
    fn test_order_by_directions() {
        let dialect = Dialect::ansi();
        let sql = render("position asc, title desc", "c2_", &dialect).unwrap();
        assert_eq!(sql, "c2_.position asc, c2_.title desc");
    }

    #[test]
    fn test_quoted_identifier_uses_dialect_quotes() {
        let sql = render("`order` > 1", "o0_", &Dialect::mysql()).unwrap();
        assert_eq!(sql, "o0_.`order` > 1");
        let sql = render("`order` > 1", "o0_", &Dialect::postgres()).unwrap();
        assert_eq!(sql, "o0_.\"order\" > 1");
    }

    #[test]
    fn test_filter_parameters_are_qualified() {
        let sql = render_filter("tenant_id = :tenant", "tenantFilter", "u0_", &Dialect::ansi()).unwrap();
        assert_eq!(sql, "u0_.tenant_id = :tenantFilter.tenant");
    }

    #[test]
    fn test_already_qualified_and_cast() {
        let sql = render("cast(code as integer) = other.code", "t0_", &Dialect::ansi()).unwrap();
        assert_eq!(sql, "cast(t0_.code as integer) = other.code");
    }

    #[test]
    fn test_escaped_quote_in_literal() {
        let sql = render("name <> 'O''Brien'", "t0_", &Dialect::ansi()).unwrap();
        assert_eq!(sql, "t0_.name <> 'O''Brien'");
    }

    #[test]
    fn test_unterminated_literal_is_rejected() {
        assert!(render("name = 'oops", "t0_", &Dialect::ansi()).is_err());
    }
}
