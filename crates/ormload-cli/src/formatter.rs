//! Output formatting for statements and loaded objects.

use clap::ValueEnum;
use comfy_table::{Cell, Table};
use ormload_core::{LoadQueryDetails, PersistenceContext};
use serde_json::json;

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Plain text
    Text,
    /// ASCII tables
    Table,
    /// JSON
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

fn pretty(value: &serde_json::Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

/// SQL, table aliases and plan of a built load.
pub fn format_details(format: OutputFormat, details: &LoadQueryDetails) -> String {
    match format {
        OutputFormat::Json => pretty(&json!({
            "sql": details.sql(),
            "comment": details.comment(),
            "batch_size": details.batch_size(),
            "table_aliases": details
                .table_aliases()
                .iter()
                .map(|(uid, alias)| json!({"uid": uid, "alias": alias}))
                .collect::<Vec<_>>(),
            "plan": details.plan_tree(),
        })),
        OutputFormat::Table => {
            let mut table = Table::new();
            table.set_header(vec!["query space", "table alias"]);
            for (uid, alias) in details.table_aliases() {
                table.add_row(vec![Cell::new(uid), Cell::new(alias)]);
            }
            format!("{}\n\n{table}", details.sql())
        }
        OutputFormat::Text => {
            let mut out = String::new();
            if let Some(comment) = details.comment() {
                out.push_str(&format!("-- {comment}\n"));
            }
            out.push_str(details.sql());
            out.push_str("\n\n");
            for (uid, alias) in details.table_aliases() {
                out.push_str(&format!("{uid} -> {alias}\n"));
            }
            out.push('\n');
            out.push_str(details.plan_tree().trim_end());
            out
        }
    }
}

/// DDL statements.
pub fn format_statements(format: OutputFormat, statements: &[String]) -> String {
    match format {
        OutputFormat::Json => pretty(&json!(statements)),
        OutputFormat::Table | OutputFormat::Text => statements
            .iter()
            .map(|statement| format!("{statement};"))
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

/// Entities and collections a load put into the context.
pub fn format_context(format: OutputFormat, context: &PersistenceContext) -> String {
    match format {
        OutputFormat::Json => pretty(&context.to_json()),
        OutputFormat::Table => {
            let mut entities = Table::new();
            entities.set_header(vec!["entity", "id", "state", "read only"]);
            for entry in context.entities() {
                let state = entry
                    .state
                    .iter()
                    .map(|(path, value)| format!("{path}={value}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                entities.add_row(vec![
                    Cell::new(&entry.concrete),
                    Cell::new(entry.key.id.to_string()),
                    Cell::new(state),
                    Cell::new(entry.read_only),
                ]);
            }
            let mut collections = Table::new();
            collections.set_header(vec!["role", "owner", "elements", "initialized"]);
            for collection in context.collections() {
                let elements = collection
                    .entries
                    .iter()
                    .map(|entry| match &entry.index {
                        Some(index) => format!("{index}: {}", entry.element),
                        None => entry.element.to_string(),
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                collections.add_row(vec![
                    Cell::new(&collection.key.role),
                    Cell::new(collection.key.owner.to_string()),
                    Cell::new(elements),
                    Cell::new(collection.initialized),
                ]);
            }
            format!("{entities}\n\n{collections}")
        }
        OutputFormat::Text => {
            let mut out = String::new();
            for entry in context.entities() {
                out.push_str(&format!("{}#{}", entry.concrete, entry.key.id));
                if entry.read_only {
                    out.push_str(" (read only)");
                }
                out.push('\n');
                for (path, value) in &entry.state {
                    out.push_str(&format!("  {path} = {value}\n"));
                }
            }
            for collection in context.collections() {
                out.push_str(&format!(
                    "{}#{} [{} elements]\n",
                    collection.key.role,
                    collection.key.owner,
                    collection.len()
                ));
                for entry in &collection.entries {
                    match &entry.index {
                        Some(index) => out.push_str(&format!("  {index}: {}\n", entry.element)),
                        None => out.push_str(&format!("  {}\n", entry.element)),
                    }
                }
            }
            if out.is_empty() {
                "Nothing loaded".to_string()
            } else {
                out.trim_end().to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statements() {
        let statements = vec!["create table a (id bigint)".to_string()];
        assert_eq!(format_statements(OutputFormat::Text, &statements), "create table a (id bigint);");
        assert!(format_statements(OutputFormat::Json, &statements).contains("\"create table a (id bigint)\""));
    }

    #[test]
    fn test_empty_context() {
        let context = PersistenceContext::new();
        assert_eq!(format_context(OutputFormat::Text, &context), "Nothing loaded");
    }
}
