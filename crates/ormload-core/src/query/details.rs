//! Load query details: one SQL statement plus the readers of its rows.
//!
//! Every root kind runs the same pipeline. The root's table goes into the
//! FROM clause first. Then come the root restrictions and key restriction,
//! the where-join conditions, and the root order-by and select fragments.
//! Last, the join graph and the fetch graph are walked. Entity roots apply
//! filters after the key restriction and collection roots apply them before.

use std::sync::Arc;

use ormload_dialect::LockOptions;
use tracing::{debug, instrument};

use crate::error::{Error, Result};
use crate::jdbc::ColumnNameCache;
use crate::mapping::{
    qualify, CollectionPersister, CollectionSemantics, EntityPersister, LoadQueryInfluencers, MappingRegistry,
};
use crate::plan::{
    CollectionReference, EntityReference, JoinKind, LoadPlan, LoadPlanTreePrinter, QuerySpaces, Return,
};
use crate::process::{
    CollectionReader, EntityReader, EntityReaderKind, ReaderCollector, ResultSetProcessor, ReturnReader, RowReader,
};

use super::alias::{AliasResolutionContext, CollectionReferenceAliases, EntityReferenceAliases};
use super::select::SelectStatementBuilder;
use super::walker::{FetchSource, FetchStats, LoadQueryJoinAndFetchProcessor};

/// Per-build inputs that shape the statement but not the plan.
#[derive(Debug, Clone)]
pub struct QueryBuildingParameters {
    pub influencers: LoadQueryInfluencers,
    /// Number of keys bound per execution.
    pub batch_size: usize,
    pub lock_options: LockOptions,
}

impl Default for QueryBuildingParameters {
    fn default() -> Self {
        Self {
            influencers: LoadQueryInfluencers::new(),
            batch_size: 1,
            lock_options: LockOptions::none(),
        }
    }
}

impl QueryBuildingParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_influencers(mut self, influencers: LoadQueryInfluencers) -> Self {
        self.influencers = influencers;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_lock_options(mut self, lock_options: LockOptions) -> Self {
        self.lock_options = lock_options;
        self
    }
}

/// Key restriction over already-qualified `columns` for `batch_size` keys.
pub fn key_restriction(columns: &[String], batch_size: usize) -> Result<String> {
    let batch_size = batch_size.max(1);
    match columns {
        [] => Err(Error::illegal_argument("key restriction needs at least one column")),
        [column] if batch_size == 1 => Ok(format!("{column} = ?")),
        [column] => {
            let placeholders = vec!["?"; batch_size].join(", ");
            Ok(format!("{column} in ({placeholders})"))
        }
        columns => {
            let group = columns
                .iter()
                .map(|c| format!("{c}=?"))
                .collect::<Vec<_>>()
                .join(" and ");
            if batch_size == 1 {
                return Ok(group);
            }
            let groups = vec![format!("({group})"); batch_size].join(" or ");
            Ok(format!("( {groups} )"))
        }
    }
}

/// A built statement and the processor for its rows. Immutable and reused
/// across executions with different bind values.
#[derive(Debug, Clone)]
pub struct LoadQueryDetails {
    sql: String,
    comment: Option<String>,
    processor: ResultSetProcessor,
    column_cache: Arc<ColumnNameCache>,
    table_aliases: Vec<(String, String)>,
    plan_tree: String,
    batch_size: usize,
    key_column_span: usize,
}

impl LoadQueryDetails {
    /// Details for an entity loader plan keyed on the identifier.
    pub fn for_entity(
        plan: &LoadPlan,
        params: &QueryBuildingParameters,
        registry: &MappingRegistry,
    ) -> Result<Self> {
        Self::for_entity_keyed_on(plan, None, params, registry)
    }

    /// Details for an entity loader plan keyed on `key_columns` of the root
    /// table, or on the identifier when `None`.
    #[instrument(level = "debug", skip_all)]
    pub fn for_entity_keyed_on(
        plan: &LoadPlan,
        key_columns: Option<&[String]>,
        params: &QueryBuildingParameters,
        registry: &MappingRegistry,
    ) -> Result<Self> {
        let Return::Entity(reference) = plan.single_return()? else {
            return Err(Error::illegal_state("entity load query details need an entity return"));
        };
        let persister = registry.entity(&reference.entity)?;
        let key_columns = key_columns
            .map(<[String]>::to_vec)
            .unwrap_or_else(|| persister.identifier_columns().to_vec());
        let root = EntityLoadQueryDetails {
            reference,
            persister,
            key_columns,
        };
        build(&root, plan, params, registry)
    }

    /// Details for a collection initializer plan. One-to-many collections
    /// read from the element table; others read their own table.
    #[instrument(level = "debug", skip_all)]
    pub fn for_collection(
        plan: &LoadPlan,
        params: &QueryBuildingParameters,
        registry: &MappingRegistry,
    ) -> Result<Self> {
        let Return::Collection(reference) = plan.single_return()? else {
            return Err(Error::illegal_state("collection load query details need a collection return"));
        };
        let persister = registry.collection(&reference.role)?;
        let element_uid = element_space_uid(&plan.query_spaces, reference)?;
        if persister.is_one_to_many() {
            let element = persister.element_entity().ok_or_else(|| {
                Error::illegal_state(format!("one-to-many collection [{}] has no element entity", persister.role))
            })?;
            let element = registry.entity(element)?;
            let root = OneToManyLoadQueryDetails {
                collection: CollectionRoot {
                    reference,
                    persister,
                    element_uid,
                },
                element,
            };
            build(&root, plan, params, registry)
        } else {
            let root = BasicCollectionLoadQueryDetails {
                collection: CollectionRoot {
                    reference,
                    persister,
                    element_uid,
                },
            };
            build(&root, plan, params, registry)
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Comment prefixed to the SQL when comments are enabled.
    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    pub fn result_set_processor(&self) -> &ResultSetProcessor {
        &self.processor
    }

    pub fn row_reader(&self) -> &RowReader {
        self.processor.row_reader()
    }

    /// Cache shared by every wrapped result set of this statement.
    pub fn column_name_cache(&self) -> &Arc<ColumnNameCache> {
        &self.column_cache
    }

    /// Query space uid and table alias pairs, in allocation order.
    pub fn table_aliases(&self) -> &[(String, String)] {
        &self.table_aliases
    }

    /// The load plan rendered with its resolved aliases.
    pub fn plan_tree(&self) -> &str {
        &self.plan_tree
    }

    /// Number of keys the key restriction binds.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Placeholders one key consumes.
    pub fn key_column_span(&self) -> usize {
        self.key_column_span
    }
}

/// Root-specific steps of the build pipeline.
trait RootReturn {
    fn root_space_uid(&self) -> &str;

    fn comment(&self) -> String;

    /// Bag role of the root itself, counted by the multiple-bag check.
    fn root_bag_role(&self) -> Option<&str> {
        None
    }

    fn generate_root_aliases(&self, aliases: &mut AliasResolutionContext<'_>) -> Result<()>;

    fn apply_root_table_fragments(
        &self,
        aliases: &AliasResolutionContext<'_>,
        select: &mut SelectStatementBuilder<'_>,
        lock_options: &LockOptions,
    ) -> Result<()>;

    /// Root key columns, qualified with the root alias.
    fn key_columns(&self, aliases: &AliasResolutionContext<'_>) -> Result<Vec<String>>;

    fn apply_root_restrictions(
        &self,
        aliases: &AliasResolutionContext<'_>,
        select: &mut SelectStatementBuilder<'_>,
        influencers: &LoadQueryInfluencers,
        key_restriction: &str,
    ) -> Result<()>;

    fn apply_root_where_join(
        &self,
        aliases: &AliasResolutionContext<'_>,
        select: &mut SelectStatementBuilder<'_>,
    ) -> Result<()>;

    fn apply_root_order_by(
        &self,
        aliases: &AliasResolutionContext<'_>,
        select: &mut SelectStatementBuilder<'_>,
    ) -> Result<()>;

    fn apply_root_select_fragments(
        &self,
        aliases: &AliasResolutionContext<'_>,
        select: &mut SelectStatementBuilder<'_>,
        readers: &mut ReaderCollector,
    ) -> Result<ReturnReader>;

    fn process_root_fetches(
        &self,
        walker: &mut LoadQueryJoinAndFetchProcessor<'_, '_>,
        select: &mut SelectStatementBuilder<'_>,
        readers: &mut ReaderCollector,
        stats: &mut FetchStats,
    ) -> Result<()>;
}

fn build<R: RootReturn>(
    root: &R,
    plan: &LoadPlan,
    params: &QueryBuildingParameters,
    registry: &MappingRegistry,
) -> Result<LoadQueryDetails> {
    let dialect = registry.dialect();
    let mut aliases = AliasResolutionContext::new(registry);
    root.generate_root_aliases(&mut aliases)?;

    let mut select = SelectStatementBuilder::new(dialect);
    root.apply_root_table_fragments(&aliases, &mut select, &params.lock_options)?;
    let key_columns = root.key_columns(&aliases)?;
    let restriction = key_restriction(&key_columns, params.batch_size)?;
    root.apply_root_restrictions(&aliases, &mut select, &params.influencers, &restriction)?;
    root.apply_root_where_join(&aliases, &mut select)?;
    root.apply_root_order_by(&aliases, &mut select)?;

    let mut readers = ReaderCollector::new();
    let return_reader = root.apply_root_select_fragments(&aliases, &mut select, &mut readers)?;

    let mut joins = dialect.create_outer_join_fragment();
    let mut stats = FetchStats::default();
    {
        let mut walker = LoadQueryJoinAndFetchProcessor::new(&mut aliases, &params.influencers, &plan.query_spaces);
        walker.process_query_space_joins(root.root_space_uid(), &mut joins)?;
        root.process_root_fetches(&mut walker, &mut select, &mut readers, &mut stats)?;
    }
    select.set_outer_joins(joins.to_from_fragment_string(), joins.to_where_fragment_string());

    let bags: Vec<String> = root
        .root_bag_role()
        .map(String::from)
        .into_iter()
        .chain(stats.joined_bag_roles().iter().cloned())
        .collect();
    if bags.len() > 1 {
        return Err(Error::MultipleBagFetch { roles: bags });
    }

    let plan_tree = LoadPlanTreePrinter::new(plan).with_aliases(&aliases).render();
    debug!(root = root.root_space_uid(), "load plan\n{plan_tree}");

    select.set_lock_options(params.lock_options.clone());
    select.set_comment(root.comment());
    let sql = select.to_statement_string();
    debug!(sql = %sql, "load query details built");

    let row_reader = readers.build_row_reader(return_reader);
    let column_cache = Arc::new(ColumnNameCache::new(expected_columns(&row_reader)));
    Ok(LoadQueryDetails {
        sql,
        comment: select.comment().map(String::from),
        processor: ResultSetProcessor::new(row_reader, stats.has_subselect_fetches()),
        column_cache,
        table_aliases: aliases
            .table_aliases()
            .map(|(uid, alias)| (uid.to_string(), alias.to_string()))
            .collect(),
        plan_tree,
        batch_size: params.batch_size.max(1),
        key_column_span: key_columns.len(),
    })
}

fn expected_columns(reader: &RowReader) -> usize {
    let entities: usize = reader
        .entity_readers()
        .iter()
        .map(|r| {
            let columns = &r.aliases.columns;
            columns.identifier.len()
                + columns.properties.iter().map(Vec::len).sum::<usize>()
                + usize::from(columns.discriminator.is_some())
        })
        .sum();
    let collections: usize = reader
        .collection_readers()
        .iter()
        .map(|r| {
            let columns = &r.aliases.collection_columns;
            columns.key.len() + columns.index.len() + usize::from(columns.identifier.is_some()) + columns.element.len()
        })
        .sum();
    entities + collections
}

/// Uid of the element entity space joined to a collection root.
fn element_space_uid(spaces: &QuerySpaces, reference: &CollectionReference) -> Result<Option<String>> {
    let space = spaces.get(&reference.space_uid)?;
    Ok(space
        .joins
        .iter()
        .find(|join| join.kind == JoinKind::CollectionElement)
        .map(|join| join.rhs.clone()))
}

fn entity_root_aliases<'c>(
    aliases: &'c AliasResolutionContext<'_>,
    uid: &str,
) -> Result<&'c EntityReferenceAliases> {
    aliases
        .resolve_entity_reference_aliases(uid)
        .ok_or_else(|| Error::illegal_state(format!("could not locate entity aliases for root query space [{uid}]")))
}

fn collection_root_aliases<'c>(
    aliases: &'c AliasResolutionContext<'_>,
    uid: &str,
) -> Result<&'c CollectionReferenceAliases> {
    aliases.resolve_collection_reference_aliases(uid).ok_or_else(|| {
        Error::illegal_state(format!("could not locate collection aliases for root query space [{uid}]"))
    })
}

fn walk_entity_graph(
    reference: &EntityReference,
    walker: &mut LoadQueryJoinAndFetchProcessor<'_, '_>,
    select: &mut SelectStatementBuilder<'_>,
    readers: &mut ReaderCollector,
    stats: &mut FetchStats,
) -> Result<()> {
    walker.process_identifier_fetches(reference, "", select, readers, stats)?;
    walker.process_fetches(&reference.fetches, FetchSource::entity(reference, ""), select, readers, stats)
}

struct EntityLoadQueryDetails<'p> {
    reference: &'p EntityReference,
    persister: &'p EntityPersister,
    key_columns: Vec<String>,
}

impl RootReturn for EntityLoadQueryDetails<'_> {
    fn root_space_uid(&self) -> &str {
        &self.reference.space_uid
    }

    fn comment(&self) -> String {
        format!("load {}", self.persister.name)
    }

    fn generate_root_aliases(&self, aliases: &mut AliasResolutionContext<'_>) -> Result<()> {
        aliases.generate_entity_reference_aliases(&self.reference.space_uid, self.persister)?;
        Ok(())
    }

    fn apply_root_table_fragments(
        &self,
        aliases: &AliasResolutionContext<'_>,
        select: &mut SelectStatementBuilder<'_>,
        lock_options: &LockOptions,
    ) -> Result<()> {
        let dialect = aliases.registry().dialect();
        let alias = &entity_root_aliases(aliases, &self.reference.space_uid)?.table_alias;
        let table = dialect.append_lock_hint(lock_options, alias, &self.persister.from_table_fragment(alias));
        let fragment = format!("{table}{}", self.persister.from_join_fragment(alias, dialect));
        select.append_from_clause_fragment(&fragment);
        Ok(())
    }

    fn key_columns(&self, aliases: &AliasResolutionContext<'_>) -> Result<Vec<String>> {
        let alias = &entity_root_aliases(aliases, &self.reference.space_uid)?.table_alias;
        Ok(qualify(alias, &self.key_columns))
    }

    fn apply_root_restrictions(
        &self,
        aliases: &AliasResolutionContext<'_>,
        select: &mut SelectStatementBuilder<'_>,
        influencers: &LoadQueryInfluencers,
        key_restriction: &str,
    ) -> Result<()> {
        let dialect = aliases.registry().dialect();
        let alias = &entity_root_aliases(aliases, &self.reference.space_uid)?.table_alias;
        select.append_restrictions(key_restriction);
        select.append_restrictions(&self.persister.filter_fragment(alias, influencers, dialect)?);
        Ok(())
    }

    fn apply_root_where_join(
        &self,
        aliases: &AliasResolutionContext<'_>,
        select: &mut SelectStatementBuilder<'_>,
    ) -> Result<()> {
        let alias = &entity_root_aliases(aliases, &self.reference.space_uid)?.table_alias;
        select.append_restrictions(&self.persister.where_join_fragment(alias, aliases.registry().dialect()));
        Ok(())
    }

    fn apply_root_order_by(&self, _: &AliasResolutionContext<'_>, _: &mut SelectStatementBuilder<'_>) -> Result<()> {
        Ok(())
    }

    fn apply_root_select_fragments(
        &self,
        aliases: &AliasResolutionContext<'_>,
        select: &mut SelectStatementBuilder<'_>,
        readers: &mut ReaderCollector,
    ) -> Result<ReturnReader> {
        let root = entity_root_aliases(aliases, &self.reference.space_uid)?.clone();
        select.append_select_clause_fragment(&self.persister.select_fragment(
            &root.table_alias,
            &root.columns,
            aliases.registry().dialect(),
        ));
        readers.add_entity_reader(EntityReader {
            uid: self.reference.space_uid.clone(),
            entity: self.persister.name.clone(),
            aliases: root,
            kind: EntityReaderKind::Generic,
        });
        Ok(ReturnReader::Entity {
            uid: self.reference.space_uid.clone(),
        })
    }

    fn process_root_fetches(
        &self,
        walker: &mut LoadQueryJoinAndFetchProcessor<'_, '_>,
        select: &mut SelectStatementBuilder<'_>,
        readers: &mut ReaderCollector,
        stats: &mut FetchStats,
    ) -> Result<()> {
        walk_entity_graph(self.reference, walker, select, readers, stats)
    }
}

/// State shared by both collection roots.
struct CollectionRoot<'p> {
    reference: &'p CollectionReference,
    persister: &'p CollectionPersister,
    element_uid: Option<String>,
}

impl CollectionRoot<'_> {
    fn generate_aliases(&self, aliases: &mut AliasResolutionContext<'_>) -> Result<()> {
        aliases.generate_collection_reference_aliases(
            &self.reference.space_uid,
            self.persister,
            self.element_uid.as_deref(),
        )?;
        Ok(())
    }

    fn comment(&self) -> String {
        format!("load collection {}", self.persister.role)
    }

    fn bag_role(&self) -> Option<&str> {
        (self.persister.semantics == CollectionSemantics::Bag).then_some(self.persister.role.as_str())
    }

    fn key_columns(&self, aliases: &AliasResolutionContext<'_>) -> Result<Vec<String>> {
        let root = collection_root_aliases(aliases, &self.reference.space_uid)?;
        Ok(qualify(&root.collection_table_alias, &self.persister.key_columns))
    }

    fn apply_order_by(&self, aliases: &AliasResolutionContext<'_>, select: &mut SelectStatementBuilder<'_>) -> Result<()> {
        let dialect = aliases.registry().dialect();
        let root = collection_root_aliases(aliases, &self.reference.space_uid)?;
        select.append_order_by_fragment(&self.persister.many_to_many_order_by(&root.element_table_alias, dialect)?);
        select.append_order_by_fragment(&self.persister.sql_order_by(&root.collection_table_alias, dialect)?);
        Ok(())
    }

    /// Collection columns, then element columns with an element reader.
    fn apply_select_fragments(
        &self,
        aliases: &AliasResolutionContext<'_>,
        select: &mut SelectStatementBuilder<'_>,
        readers: &mut ReaderCollector,
    ) -> Result<ReturnReader> {
        let registry = aliases.registry();
        let root = collection_root_aliases(aliases, &self.reference.space_uid)?.clone();
        select.append_select_clause_fragment(
            &self.persister.select_fragment(&root.collection_table_alias, &root.collection_columns),
        );
        if let (Some(element), Some(element_aliases)) = (&self.reference.element, &root.element) {
            let element_persister = registry.entity(&element.entity)?;
            select.append_select_clause_fragment(&element_persister.select_fragment(
                &element_aliases.table_alias,
                &element_aliases.columns,
                registry.dialect(),
            ));
            readers.add_entity_reader(EntityReader {
                uid: element.space_uid.clone(),
                entity: element.entity.clone(),
                aliases: element_aliases.clone(),
                kind: EntityReaderKind::Generic,
            });
        }
        readers.add_collection_reader(CollectionReader {
            uid: self.reference.space_uid.clone(),
            role: self.persister.role.clone(),
            aliases: root,
            owner_uid: None,
            element_uid: self.reference.element.as_ref().map(|e| e.space_uid.clone()),
        });
        Ok(ReturnReader::Collection {
            uid: self.reference.space_uid.clone(),
        })
    }

    fn process_fetches(
        &self,
        walker: &mut LoadQueryJoinAndFetchProcessor<'_, '_>,
        select: &mut SelectStatementBuilder<'_>,
        readers: &mut ReaderCollector,
        stats: &mut FetchStats,
    ) -> Result<()> {
        walker.process_collection_index(self.reference, select, readers)?;
        match &self.reference.element {
            Some(element) => walk_entity_graph(element, walker, select, readers, stats),
            None => Ok(()),
        }
    }
}

/// Collections of values and many-to-many collections, read from the
/// collection table.
struct BasicCollectionLoadQueryDetails<'p> {
    collection: CollectionRoot<'p>,
}

impl RootReturn for BasicCollectionLoadQueryDetails<'_> {
    fn root_space_uid(&self) -> &str {
        &self.collection.reference.space_uid
    }

    fn comment(&self) -> String {
        self.collection.comment()
    }

    fn root_bag_role(&self) -> Option<&str> {
        self.collection.bag_role()
    }

    fn generate_root_aliases(&self, aliases: &mut AliasResolutionContext<'_>) -> Result<()> {
        self.collection.generate_aliases(aliases)
    }

    fn apply_root_table_fragments(
        &self,
        aliases: &AliasResolutionContext<'_>,
        select: &mut SelectStatementBuilder<'_>,
        _: &LockOptions,
    ) -> Result<()> {
        let root = collection_root_aliases(aliases, self.root_space_uid())?;
        select.append_from_clause_fragment(&format!(
            "{} {}",
            self.collection.persister.table_name(),
            root.collection_table_alias
        ));
        Ok(())
    }

    fn key_columns(&self, aliases: &AliasResolutionContext<'_>) -> Result<Vec<String>> {
        self.collection.key_columns(aliases)
    }

    fn apply_root_restrictions(
        &self,
        aliases: &AliasResolutionContext<'_>,
        select: &mut SelectStatementBuilder<'_>,
        influencers: &LoadQueryInfluencers,
        key_restriction: &str,
    ) -> Result<()> {
        let root = collection_root_aliases(aliases, self.root_space_uid())?;
        select.append_restrictions(&self.collection.persister.filter_fragment(
            &root.collection_table_alias,
            influencers,
            aliases.registry().dialect(),
        )?);
        select.append_restrictions(key_restriction);
        Ok(())
    }

    fn apply_root_where_join(&self, _: &AliasResolutionContext<'_>, _: &mut SelectStatementBuilder<'_>) -> Result<()> {
        Ok(())
    }

    fn apply_root_order_by(
        &self,
        aliases: &AliasResolutionContext<'_>,
        select: &mut SelectStatementBuilder<'_>,
    ) -> Result<()> {
        self.collection.apply_order_by(aliases, select)
    }

    fn apply_root_select_fragments(
        &self,
        aliases: &AliasResolutionContext<'_>,
        select: &mut SelectStatementBuilder<'_>,
        readers: &mut ReaderCollector,
    ) -> Result<ReturnReader> {
        self.collection.apply_select_fragments(aliases, select, readers)
    }

    fn process_root_fetches(
        &self,
        walker: &mut LoadQueryJoinAndFetchProcessor<'_, '_>,
        select: &mut SelectStatementBuilder<'_>,
        readers: &mut ReaderCollector,
        stats: &mut FetchStats,
    ) -> Result<()> {
        self.collection.process_fetches(walker, select, readers, stats)
    }
}

/// One-to-many collections, read straight from the element table.
struct OneToManyLoadQueryDetails<'p> {
    collection: CollectionRoot<'p>,
    element: &'p EntityPersister,
}

impl RootReturn for OneToManyLoadQueryDetails<'_> {
    fn root_space_uid(&self) -> &str {
        &self.collection.reference.space_uid
    }

    fn comment(&self) -> String {
        self.collection.comment()
    }

    fn root_bag_role(&self) -> Option<&str> {
        self.collection.bag_role()
    }

    fn generate_root_aliases(&self, aliases: &mut AliasResolutionContext<'_>) -> Result<()> {
        self.collection.generate_aliases(aliases)
    }

    fn apply_root_table_fragments(
        &self,
        aliases: &AliasResolutionContext<'_>,
        select: &mut SelectStatementBuilder<'_>,
        _: &LockOptions,
    ) -> Result<()> {
        let alias = &collection_root_aliases(aliases, self.root_space_uid())?.element_table_alias;
        select.append_from_clause_fragment(&format!(
            "{}{}",
            self.element.from_table_fragment(alias),
            self.element.from_join_fragment(alias, aliases.registry().dialect())
        ));
        Ok(())
    }

    fn key_columns(&self, aliases: &AliasResolutionContext<'_>) -> Result<Vec<String>> {
        self.collection.key_columns(aliases)
    }

    fn apply_root_restrictions(
        &self,
        aliases: &AliasResolutionContext<'_>,
        select: &mut SelectStatementBuilder<'_>,
        influencers: &LoadQueryInfluencers,
        key_restriction: &str,
    ) -> Result<()> {
        let dialect = aliases.registry().dialect();
        let root = collection_root_aliases(aliases, self.root_space_uid())?;
        select.append_restrictions(&self.collection.persister.filter_fragment(
            &root.collection_table_alias,
            influencers,
            dialect,
        )?);
        select.append_restrictions(&self.element.filter_fragment(&root.element_table_alias, influencers, dialect)?);
        select.append_restrictions(key_restriction);
        Ok(())
    }

    fn apply_root_where_join(
        &self,
        aliases: &AliasResolutionContext<'_>,
        select: &mut SelectStatementBuilder<'_>,
    ) -> Result<()> {
        let alias = &collection_root_aliases(aliases, self.root_space_uid())?.element_table_alias;
        select.append_restrictions(&self.element.where_join_fragment(alias, aliases.registry().dialect()));
        Ok(())
    }

    fn apply_root_order_by(
        &self,
        aliases: &AliasResolutionContext<'_>,
        select: &mut SelectStatementBuilder<'_>,
    ) -> Result<()> {
        self.collection.apply_order_by(aliases, select)
    }

    fn apply_root_select_fragments(
        &self,
        aliases: &AliasResolutionContext<'_>,
        select: &mut SelectStatementBuilder<'_>,
        readers: &mut ReaderCollector,
    ) -> Result<ReturnReader> {
        self.collection.apply_select_fragments(aliases, select, readers)
    }

    fn process_root_fetches(
        &self,
        walker: &mut LoadQueryJoinAndFetchProcessor<'_, '_>,
        select: &mut SelectStatementBuilder<'_>,
        readers: &mut ReaderCollector,
        stats: &mut FetchStats,
    ) -> Result<()> {
        self.collection.process_fetches(walker, select, readers, stats)
    }
}
