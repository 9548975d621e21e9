//! Mapping metadata consumed by the load layer.
//!
//! Entity and collection persisters describe tables, columns and
//! associations, and render the SQL fragments the query builder splices
//! together. A [`MappingRegistry`] holds them by name.

mod collection;
mod entity;
mod filter;
mod registry;
mod schema;
pub mod template;

pub use collection::{
    CollectionAliases, CollectionPersister, CollectionSemantics, ElementColumn, ElementDef,
    IndexDef,
};
pub use entity::{
    AssociationDef, EntityAliases, EntityPersister, HydratedKind, HydratedProperty,
    IdentifierDef, KeyAssociationDef, PropertyDef, PropertyKind, SubclassDef,
};
pub use filter::{EnabledFilter, FilterDef, FilterMapping, FilterValue, LoadQueryInfluencers};
pub use registry::{MappingDocument, MappingRegistry, MappingRegistryBuilder};
pub use schema::SchemaExporter;

/// Column alias `{name}{position}_`, trimmed so it fits `max_length`.
pub(crate) fn column_alias(column: &str, position: usize, max_length: usize) -> String {
    let suffix = format!("{position}_");
    let name = column.trim_matches('`');
    let alias = match name.rfind(|c: char| c.is_ascii_alphabetic()) {
        None => "column",
        Some(last_letter) => &name[..=last_letter],
    };
    let room = max_length.saturating_sub(suffix.len()).max(1);
    let alias: String = alias.chars().take(room).collect();
    format!("{alias}{suffix}")
}

/// Qualify each column with `alias`.
pub(crate) fn qualify(alias: &str, columns: &[String]) -> Vec<String> {
    columns.iter().map(|c| format!("{alias}.{c}")).collect()
}
