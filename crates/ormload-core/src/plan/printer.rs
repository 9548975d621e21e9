//! Text rendering of load plans for logs and the CLI.

use std::fmt::Write;

use super::fetch::{CollectionReference, EntityReference, Fetch, Return};
use super::space::{JoinKind, QuerySpace, SpaceKind};
use super::LoadPlan;
use crate::query::AliasResolutionContext;

const INDENT: usize = 3;

/// Renders a [`LoadPlan`] as an indented tree, with resolved aliases when
/// an alias context is given.
pub struct LoadPlanTreePrinter<'p> {
    plan: &'p LoadPlan,
    aliases: Option<&'p AliasResolutionContext<'p>>,
}

impl<'p> LoadPlanTreePrinter<'p> {
    pub fn new(plan: &'p LoadPlan) -> Self {
        Self { plan, aliases: None }
    }

    pub fn with_aliases(mut self, aliases: &'p AliasResolutionContext<'p>) -> Self {
        self.aliases = Some(aliases);
        self
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "LoadPlan({:?})", self.plan.disposition);
        line(&mut out, 1, "Returns");
        for root in &self.plan.returns {
            match root {
                Return::Entity(entity) => {
                    line(
                        &mut out,
                        2,
                        &format!("EntityReturn(entity={}, uid={})", entity.entity, entity.space_uid),
                    );
                    self.render_entity_fetches(&mut out, entity, 3);
                }
                Return::Collection(collection) => {
                    line(
                        &mut out,
                        2,
                        &format!("CollectionReturn(role={}, uid={})", collection.role, collection.space_uid),
                    );
                    self.render_collection(&mut out, collection, 3);
                }
            }
        }
        line(&mut out, 1, "QuerySpaces");
        for root in self.plan.query_spaces.roots() {
            self.render_space(&mut out, root, 2);
        }
        out
    }

    fn render_entity_fetches(&self, out: &mut String, entity: &EntityReference, depth: usize) {
        if let Some(uid) = &entity.identifier_space_uid {
            line(out, depth, &format!("(identifier uid={uid})"));
        }
        for fetch in entity.identifier_fetches.iter().chain(&entity.fetches) {
            self.render_fetch(out, fetch, depth);
        }
    }

    fn render_collection(&self, out: &mut String, collection: &CollectionReference, depth: usize) {
        if let Some(element) = &collection.element {
            line(
                out,
                depth,
                &format!("(collection element) entity={}, uid={}", element.entity, element.space_uid),
            );
            self.render_entity_fetches(out, element, depth + 1);
        }
        if let Some(index) = &collection.index {
            line(
                out,
                depth,
                &format!("(collection index) entity={}, uid={}", index.entity, index.space_uid),
            );
        }
    }

    fn render_fetch(&self, out: &mut String, fetch: &Fetch, depth: usize) {
        let strategy = fetch.strategy();
        match fetch {
            Fetch::Entity(f) => {
                line(
                    out,
                    depth,
                    &format!(
                        "EntityFetch(path={}, entity={}, uid={}, {:?}/{:?})",
                        f.property, f.reference.entity, f.reference.space_uid, strategy.timing, strategy.style
                    ),
                );
                self.render_entity_fetches(out, &f.reference, depth + 1);
            }
            Fetch::BidirectionalEntity(f) => line(
                out,
                depth,
                &format!(
                    "BidirectionalEntityFetch(path={}, entity={}, target={})",
                    f.property, f.entity, f.target_space_uid
                ),
            ),
            Fetch::Collection(f) => {
                line(
                    out,
                    depth,
                    &format!(
                        "CollectionFetch(path={}, role={}, uid={}, {:?}/{:?})",
                        f.property, f.reference.role, f.reference.space_uid, strategy.timing, strategy.style
                    ),
                );
                self.render_collection(out, &f.reference, depth + 1);
            }
            Fetch::Composite(f) => {
                line(out, depth, &format!("CompositeFetch(path={}, uid={})", f.property, f.space_uid));
                for nested in &f.fetches {
                    self.render_fetch(out, nested, depth + 1);
                }
            }
            Fetch::Any(f) => line(out, depth, &format!("AnyFetch(path={})", f.property)),
            Fetch::Deferred(f) => line(
                out,
                depth,
                &format!("DeferredFetch(path={}, {:?}/{:?})", f.property, strategy.timing, strategy.style),
            ),
        }
    }

    fn render_space(&self, out: &mut String, space: &QuerySpace, depth: usize) {
        let description = match &space.kind {
            SpaceKind::Entity { entity } => format!("EntityQuerySpace(uid={}, entity={entity})", space.uid),
            SpaceKind::Collection { role } => format!("CollectionQuerySpace(uid={}, role={role})", space.uid),
            SpaceKind::Composite { property } => {
                format!("CompositeQuerySpace(uid={}, property={property})", space.uid)
            }
        };
        line(out, depth, &description);
        if let Some(aliases) = self.aliases {
            if let Some(alias) = aliases.resolve_sql_table_alias(&space.uid) {
                line(out, depth + 1, &format!("SQL table alias - {alias}"));
            }
            if let Some(entity) = aliases.resolve_entity_reference_aliases(&space.uid) {
                line(out, depth + 1, &format!("alias suffix - {}", entity.columns.suffix));
                line(
                    out,
                    depth + 1,
                    &format!("suffixed key columns - {{{}}}", entity.columns.identifier.join(", ")),
                );
            }
            if let Some(collection) = aliases.resolve_collection_reference_aliases(&space.uid) {
                line(
                    out,
                    depth + 1,
                    &format!("alias suffix - {}", collection.collection_columns.suffix),
                );
                line(
                    out,
                    depth + 1,
                    &format!("suffixed key columns - {{{}}}", collection.collection_columns.key.join(", ")),
                );
            }
        }
        for join in &space.joins {
            let kind = match join.kind {
                JoinKind::Composite => "composite",
                JoinKind::Entity => "entity",
                JoinKind::Collection => "collection",
                JoinKind::CollectionElement => "collection element",
                JoinKind::CollectionIndex => "collection index",
            };
            let join_type = if join.required { "inner" } else { "left outer" };
            line(
                out,
                depth + 1,
                &format!("JOIN ({kind}, {join_type}) : {} -> {}", join.lhs, join.rhs),
            );
            if let Ok(rhs) = self.plan.query_spaces.get(&join.rhs) {
                self.render_space(out, rhs, depth + 2);
            }
        }
    }
}

fn line(out: &mut String, depth: usize, text: &str) {
    let _ = writeln!(out, "{:width$}- {text}", "", width = depth * INDENT);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{FetchStrategy, Join, QuerySpaces};

    fn plan() -> LoadPlan {
        let mut spaces = QuerySpaces::new();
        spaces
            .add_root(QuerySpace::new("<gen:0>", SpaceKind::Entity { entity: "Post".into() }))
            .unwrap();
        spaces
            .add(QuerySpace::new("<gen:1>", SpaceKind::Entity { entity: "User".into() }))
            .unwrap();
        spaces
            .add_join(Join {
                lhs: "<gen:0>".into(),
                rhs: "<gen:1>".into(),
                kind: JoinKind::Entity,
                required: true,
                lhs_columns: vec!["author_id".into()],
                rhs_columns: vec!["id".into()],
                with_condition: None,
            })
            .unwrap();
        let mut root = EntityReference::new("<gen:0>", "Post");
        root.fetches.push(Fetch::Entity(crate::plan::EntityFetch {
            property: "author".into(),
            strategy: FetchStrategy::IMMEDIATE_JOIN,
            one_to_one: false,
            reference: EntityReference::new("<gen:1>", "User"),
        }));
        LoadPlan {
            disposition: crate::plan::PlanDisposition::EntityLoader,
            returns: vec![Return::Entity(root)],
            query_spaces: spaces,
        }
    }

    #[test]
    fn test_render_without_aliases() {
        let rendered = LoadPlanTreePrinter::new(&plan()).render();
        let expected = "\
LoadPlan(EntityLoader)
   - Returns
      - EntityReturn(entity=Post, uid=<gen:0>)
         - EntityFetch(path=author, entity=User, uid=<gen:1>, Immediate/Join)
   - QuerySpaces
      - EntityQuerySpace(uid=<gen:0>, entity=Post)
         - JOIN (entity, inner) : <gen:0> -> <gen:1>
            - EntityQuerySpace(uid=<gen:1>, entity=User)
";
        assert_eq!(rendered, expected);
    }
}
