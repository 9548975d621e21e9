//! DDL export for mapped tables.

use ormload_dialect::SqlTypeCode;

use super::collection::{ElementDef, IndexDef};
use super::entity::{PropertyDef, PropertyKind};
use super::registry::MappingRegistry;
use crate::error::Result;
use crate::value::ValueType;

#[derive(Debug, Default)]
struct TableDef {
    name: String,
    columns: Vec<(String, SqlTypeCode, bool)>,
    primary_key: Vec<String>,
}

impl TableDef {
    fn add(&mut self, column: &str, code: SqlTypeCode, not_null: bool) {
        if !self.columns.iter().any(|(c, _, _)| c == column) {
            self.columns.push((column.to_string(), code, not_null));
        }
    }

    fn add_typed(&mut self, columns: &[String], ty: &ValueType, not_null: bool) {
        let codes = ty.sql_types();
        for (index, column) in columns.iter().enumerate() {
            let code = codes.get(index).copied().unwrap_or(SqlTypeCode::BigInt);
            self.add(column, code, not_null);
        }
    }
}

/// Renders CREATE TABLE statements for every mapped table.
pub struct SchemaExporter<'a> {
    registry: &'a MappingRegistry,
}

impl<'a> SchemaExporter<'a> {
    pub fn new(registry: &'a MappingRegistry) -> Self {
        Self { registry }
    }

    /// CREATE TABLE statements in mapping order.
    pub fn create_statements(&self) -> Result<Vec<String>> {
        let mut tables: Vec<TableDef> = Vec::new();
        let mut table = |name: &str| -> usize {
            match tables.iter().position(|t| t.name == name) {
                Some(index) => index,
                None => {
                    tables.push(TableDef {
                        name: name.to_string(),
                        ..Default::default()
                    });
                    tables.len() - 1
                }
            }
        };
        let mut layout: Vec<(usize, Vec<(Vec<String>, ValueType, bool)>, Vec<String>)> = Vec::new();

        for entity in self.registry.entities() {
            let index = table(&entity.table);
            let mut columns = vec![(entity.identifier.columns.clone(), entity.identifier.value_type.clone(), true)];
            self.property_columns(&entity.properties, &mut columns)?;
            layout.push((index, columns, entity.identifier.columns.clone()));
            for subclass in &entity.subclasses {
                let index = table(&subclass.table);
                let mut columns = vec![(subclass.key_columns.clone(), entity.identifier.value_type.clone(), true)];
                self.property_columns(&subclass.properties, &mut columns)?;
                layout.push((index, columns, subclass.key_columns.clone()));
            }
        }

        for collection in self.registry.collections() {
            let owner = self.registry.entity(&collection.owner)?;
            let index = table(collection.table_name());
            let mut columns = vec![(
                collection.key_columns.clone(),
                owner.identifier.value_type.clone(),
                !collection.is_one_to_many(),
            )];
            match &collection.index {
                Some(IndexDef::Basic { column, value_type }) => {
                    columns.push((vec![column.clone()], value_type.clone(), false))
                }
                Some(IndexDef::Entity { entity, columns: index_columns }) => {
                    let target = self.registry.entity(entity)?;
                    columns.push((index_columns.clone(), target.identifier.value_type.clone(), false));
                }
                None => {}
            }
            if let Some(column) = &collection.identifier_column {
                columns.push((vec![column.clone()], ValueType::Long, true));
            }
            match &collection.element {
                ElementDef::Basic { column, value_type } => {
                    columns.push((vec![column.clone()], value_type.clone(), false))
                }
                ElementDef::ManyToMany { entity, columns: element_columns } => {
                    let target = self.registry.entity(entity)?;
                    columns.push((element_columns.clone(), target.identifier.value_type.clone(), true));
                }
                ElementDef::Composite { properties } => {
                    for property in properties {
                        columns.push((vec![property.column.clone()], property.value_type.clone(), false));
                    }
                }
                ElementDef::OneToMany { .. } => {}
            }
            let primary_key = match (&collection.identifier_column, collection.is_one_to_many()) {
                (_, true) => Vec::new(),
                (Some(id), false) => vec![id.clone()],
                (None, false) => Vec::new(),
            };
            layout.push((index, columns, primary_key));
        }

        for (index, columns, primary_key) in layout {
            let def = &mut tables[index];
            for (names, ty, not_null) in &columns {
                def.add_typed(names, ty, *not_null);
            }
            if def.primary_key.is_empty() {
                def.primary_key = primary_key;
            }
        }

        let dialect = self.registry.dialect();
        tables
            .iter()
            .map(|def| {
                let mut parts = Vec::new();
                for (column, code, not_null) in &def.columns {
                    let mut part = format!("{column} {}", dialect.type_name(*code)?);
                    if *not_null {
                        part.push_str(" not null");
                    }
                    parts.push(part);
                }
                if !def.primary_key.is_empty() {
                    parts.push(format!("primary key ({})", def.primary_key.join(", ")));
                }
                Ok(format!("create table {} ({})", def.name, parts.join(", ")))
            })
            .collect()
    }

    fn property_columns(
        &self,
        properties: &[PropertyDef],
        out: &mut Vec<(Vec<String>, ValueType, bool)>,
    ) -> Result<()> {
        for property in properties {
            match &property.kind {
                PropertyKind::Basic { columns, value_type } => {
                    out.push((columns.clone(), value_type.clone(), false))
                }
                PropertyKind::ManyToOne(a) | PropertyKind::OneToOne(a) if !a.columns.is_empty() => {
                    let target = self.registry.entity(&a.target)?;
                    out.push((a.columns.clone(), target.identifier.value_type.clone(), a.required));
                }
                PropertyKind::Any { type_column, id_column, .. } => {
                    out.push((vec![type_column.clone()], ValueType::String, false));
                    out.push((vec![id_column.clone()], ValueType::Long, false));
                }
                PropertyKind::Component { properties } => self.property_columns(properties, out)?,
                PropertyKind::ManyToOne(_) | PropertyKind::OneToOne(_) | PropertyKind::Collection { .. } => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::{
        AssociationDef, CollectionPersister, EntityPersister, IdentifierDef, PropertyDef,
    };
    use ormload_dialect::Dialect;

    #[test]
    fn test_create_statements() {
        let registry = MappingRegistry::builder(Dialect::sqlite())
            .with_entity(
                EntityPersister::new("User", "users", IdentifierDef::new("id", "id", ValueType::Long))
                    .with_property(PropertyDef::basic("name", "name", ValueType::String))
                    .with_property(PropertyDef::collection("tags", "User.tags")),
            )
            .with_entity(
                EntityPersister::new("Post", "posts", IdentifierDef::new("id", "id", ValueType::Long))
                    .with_property(PropertyDef::many_to_one(
                        "author",
                        AssociationDef::new("User", vec!["author_id".into()]).with_required(true),
                    )),
            )
            .with_collection(
                CollectionPersister::new(
                    "User.tags",
                    "User",
                    vec!["user_id".into()],
                    ElementDef::Basic {
                        column: "tag".into(),
                        value_type: ValueType::String,
                    },
                )
                .with_table("user_tags"),
            )
            .build()
            .unwrap();
        let statements = SchemaExporter::new(&registry).create_statements().unwrap();
        assert_eq!(
            statements,
            vec![
                "create table posts (id bigint not null, author_id bigint not null, primary key (id))",
                "create table users (id bigint not null, name varchar, primary key (id))",
                "create table user_tags (user_id bigint not null, tag varchar)",
            ]
        );
    }
}
