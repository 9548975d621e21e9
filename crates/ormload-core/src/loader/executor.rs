//! Executes a built load query against a [`JdbcCoordinator`].

use ormload_dialect::limit::{has_first_row, has_max_rows, use_limit};
use ormload_dialect::{LimitHandler, LockTimeout, RowSelection};
use tracing::{debug, instrument, trace, warn};

use crate::error::{Error, Result};
use crate::jdbc::{JdbcCoordinator, PreparedStatement, ResultSet, ResultSetWrapper, ScrollMode, StatementKind};
use crate::mapping::MappingRegistry;
use crate::process::{LoadedObject, PersistenceContext, ProcessingOptions};
use crate::query::LoadQueryDetails;
use crate::value::{TypedValue, Value};

use super::parameters::{ProcessedStatement, QueryParameters};

/// Runs [`LoadQueryDetails`] with per-call parameters.
#[derive(Debug, Clone, Copy)]
pub struct LoadExecutor<'r> {
    registry: &'r MappingRegistry,
}

/// A statement ready to run: final SQL plus how to prepare it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedLoad {
    pub sql: String,
    pub kind: StatementKind,
    pub scroll: ScrollMode,
    processed: ProcessedStatement,
    limit: LimitHandler,
    selection: Option<RowSelection>,
}

impl PreparedLoad {
    /// Whether the SQL skips to the first row itself.
    fn uses_limit_offset(&self) -> bool {
        let selection = self.selection.as_ref();
        use_limit(&self.limit, selection) && self.limit.supports_limit_offset() && has_first_row(selection)
    }
}

impl<'r> LoadExecutor<'r> {
    pub fn new(registry: &'r MappingRegistry) -> Self {
        Self { registry }
    }

    /// Rewrite the SQL for filters, pagination and comments, and decide the
    /// statement kind and cursor type.
    pub fn prepare(&self, details: &LoadQueryDetails, params: &QueryParameters) -> Result<PreparedLoad> {
        let settings = self.registry.settings();
        let processed = params.process_filters(details.sql())?;
        let selection = params.row_selection.as_ref();
        let limit = self.registry.dialect().build_limit_handler(selection);
        let mut sql = limit.process_sql(&processed.sql, selection);

        if settings.comments_enabled {
            if let Some(comment) = params.comment.as_deref().or(details.comment()) {
                sql = format!("/* {comment} */ {sql}");
            }
        }

        let mut prepared = PreparedLoad {
            sql,
            kind: if params.callable {
                StatementKind::Callable
            } else {
                StatementKind::Prepared
            },
            scroll: ScrollMode::ForwardOnly,
            processed,
            limit,
            selection: params.row_selection.clone(),
        };
        let skip_with_scroll =
            has_first_row(selection) && !prepared.uses_limit_offset() && settings.scrollable_result_sets;
        if params.scroll || skip_with_scroll {
            prepared.scroll = ScrollMode::ScrollInsensitive;
        }
        Ok(prepared)
    }

    /// Execute the load and return the transformed results. The statement
    /// is released on every path.
    #[instrument(level = "debug", skip_all, fields(sql = %details.sql()))]
    pub fn execute<C: JdbcCoordinator>(
        &self,
        coordinator: &mut C,
        details: &LoadQueryDetails,
        params: &QueryParameters,
        context: &mut PersistenceContext,
    ) -> Result<Vec<LoadedObject>> {
        let prepared = self.prepare(details, params)?;
        debug!(sql = %prepared.sql, scroll = ?prepared.scroll, "executing load");
        let mut statement = coordinator.prepare_statement(&prepared.sql, prepared.kind, prepared.scroll)?;

        let outcome = self
            .bind_and_configure(&mut statement, &prepared, params)
            .and_then(|()| self.run(coordinator, &mut statement, &prepared, details, params, context));
        coordinator.release(statement);
        if outcome.is_err() {
            coordinator.after_statement_execution();
        }
        outcome
    }

    fn bind_and_configure<S: PreparedStatement>(
        &self,
        statement: &mut S,
        prepared: &PreparedLoad,
        params: &QueryParameters,
    ) -> Result<()> {
        let dialect = self.registry.dialect();
        let selection = prepared.selection.as_ref();
        let mut position = 1;

        for value in prepared.limit.parameters_at_start_of_query(selection) {
            statement.bind(position, &Value::Int(value))?;
            position += 1;
        }
        if prepared.kind == StatementKind::Callable {
            statement.register_out_parameter(position, dialect.result_set_out_parameter_type()?)?;
            position += 1;
        }
        let body_start = position;
        for (value, index) in &prepared.processed.positional {
            bind_typed(statement, body_start + index, value)?;
        }
        for (value, index) in &prepared.processed.named {
            bind_typed(statement, body_start + index, value)?;
        }
        // The lock wait placeholder trails the pagination clause.
        let lock_timeout = self.lock_timeout_parameter(params);
        let body_end = body_start + prepared.processed.placeholders;
        position = body_end.saturating_sub(usize::from(lock_timeout.is_some()));
        for value in prepared.limit.parameters_at_end_of_query(selection) {
            statement.bind(position, &Value::Int(value))?;
            position += 1;
        }
        if let Some(seconds) = lock_timeout {
            statement.bind(position, &Value::Int(seconds))?;
            position += 1;
        }
        trace!(parameters = position - 1, "bound parameters");

        if let Some(max_rows) = prepared.limit.statement_max_rows(selection) {
            statement.set_max_rows(max_rows)?;
        }
        if let Some(selection) = selection {
            if let Some(timeout) = selection.timeout {
                statement.set_query_timeout(timeout)?;
            }
            if let Some(fetch_size) = selection.fetch_size {
                statement.set_fetch_size(fetch_size)?;
            }
        }
        Ok(())
    }

    /// Lock wait in seconds to bind, when the dialect takes it as a
    /// parameter.
    fn lock_timeout_parameter(&self, params: &QueryParameters) -> Option<i64> {
        let dialect = self.registry.dialect();
        let LockTimeout::Millis(millis) = params.lock_options.timeout else {
            return None;
        };
        if params.lock_options.is_none() {
            return None;
        }
        if !dialect.supports_lock_timeouts() {
            warn!(dialect = dialect.name(), millis, "lock timeout requested but not supported, ignoring");
            return None;
        }
        dialect
            .is_lock_timeout_parameterized()
            .then(|| i64::from(millis.div_ceil(1000)))
    }

    fn run<C: JdbcCoordinator>(
        &self,
        coordinator: &mut C,
        statement: &mut C::Statement,
        prepared: &PreparedLoad,
        details: &LoadQueryDetails,
        params: &QueryParameters,
        context: &mut PersistenceContext,
    ) -> Result<Vec<LoadedObject>> {
        let mut rs = coordinator.extract(statement)?;
        if self.registry.settings().wrap_result_sets {
            trace!("wrapping result set");
            rs = Box::new(ResultSetWrapper::new(rs, details.column_name_cache().clone()));
        }
        let selection = prepared.selection.as_ref();
        if !prepared.uses_limit_offset() {
            advance(rs.as_mut(), prepared)?;
        }

        let options = ProcessingOptions {
            read_only: params.read_only,
            collection_keys: &params.collection_keys,
            sql: details.sql(),
            max_rows: (!use_limit(&prepared.limit, selection) && has_max_rows(selection))
                .then(|| selection.and_then(|s| s.max_rows))
                .flatten(),
        };
        let rows = details
            .result_set_processor()
            .extract_results(rs.as_mut(), self.registry, context, &options)?;
        Ok(params.transformer.transform_list(rows))
    }
}

/// Skip to the first requested row.
fn advance(rs: &mut dyn ResultSet, prepared: &PreparedLoad) -> Result<()> {
    let first_row = ormload_dialect::limit::first_row(prepared.selection.as_ref()) as usize;
    if first_row == 0 {
        return Ok(());
    }
    if prepared.scroll == ScrollMode::ScrollInsensitive {
        trace!(first_row, "skipping rows by absolute positioning");
        rs.absolute(first_row)?;
    } else {
        trace!(first_row, "skipping rows by stepping the cursor");
        for _ in 0..first_row {
            if !rs.next()? {
                break;
            }
        }
    }
    Ok(())
}

/// Bind one typed value, covering its whole column span. Returns the
/// number of placeholders bound.
fn bind_typed<S: PreparedStatement>(statement: &mut S, position: usize, value: &TypedValue) -> Result<usize> {
    let span = value.column_span();
    if value.value.is_null() {
        for offset in 0..span {
            statement.bind(position + offset, &Value::Null)?;
        }
        return Ok(span);
    }
    let parts = value.value.flatten();
    if parts.len() != span {
        return Err(Error::illegal_argument(format!(
            "value {} covers {} columns, its type spans {span}",
            value.value,
            parts.len()
        )));
    }
    for (offset, part) in parts.into_iter().enumerate() {
        statement.bind(position + offset, part)?;
    }
    Ok(span)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LoaderSettings;
    use crate::mapping::{EntityPersister, IdentifierDef, PropertyDef};
    use crate::plan::LoadPlanBuilder;
    use crate::query::QueryBuildingParameters;
    use crate::value::ValueType;
    use ormload_dialect::Dialect;

    fn registry(dialect: Dialect, settings: LoaderSettings) -> MappingRegistry {
        MappingRegistry::builder(dialect)
            .with_settings(settings)
            .with_entity(
                EntityPersister::new("User", "users", IdentifierDef::new("id", "id", ValueType::Long))
                    .with_property(PropertyDef::basic("name", "name", ValueType::String)),
            )
            .build()
            .unwrap()
    }

    fn details(registry: &MappingRegistry) -> LoadQueryDetails {
        let plan = LoadPlanBuilder::new(registry).entity_load_plan("User").unwrap();
        LoadQueryDetails::for_entity(&plan, &QueryBuildingParameters::new(), registry).unwrap()
    }

    fn params() -> QueryParameters {
        QueryParameters::new().with_positional(TypedValue::new(1, ValueType::Long))
    }

    #[test]
    fn test_prepare_with_comment_and_limit() {
        let registry = registry(Dialect::postgres(), LoaderSettings::new().with_comments(true));
        let details = details(&registry);
        let prepared = LoadExecutor::new(&registry)
            .prepare(&details, &params().with_row_selection(RowSelection::page(5, 10)))
            .unwrap();
        assert!(prepared.sql.starts_with("/* load User */ select user0_.id"));
        assert!(prepared.sql.ends_with("where user0_.id = ? limit ? offset ?"));
        assert_eq!(prepared.scroll, ScrollMode::ForwardOnly);
        assert_eq!(prepared.kind, StatementKind::Prepared);
    }

    #[test]
    fn test_prepare_scrolls_when_offset_is_not_supported() {
        let registry = registry(Dialect::sql_server(), LoaderSettings::new());
        let details = details(&registry);
        let executor = LoadExecutor::new(&registry);
        let paged = params().with_row_selection(RowSelection::page(5, 10));
        assert_eq!(executor.prepare(&details, &paged).unwrap().scroll, ScrollMode::ScrollInsensitive);

        let registry = registry_without_scrolling();
        let details = self::details(&registry);
        let prepared = LoadExecutor::new(&registry).prepare(&details, &paged).unwrap();
        assert_eq!(prepared.scroll, ScrollMode::ForwardOnly);
    }

    fn registry_without_scrolling() -> MappingRegistry {
        registry(Dialect::sql_server(), LoaderSettings::new().with_scrollable_result_sets(false))
    }

    #[test]
    fn test_composite_binding_checks_span() {
        struct Binds(Vec<(usize, Value)>);
        impl PreparedStatement for Binds {
            fn bind(&mut self, position: usize, value: &Value) -> crate::jdbc::JdbcResult<()> {
                self.0.push((position, value.clone()));
                Ok(())
            }
            fn register_out_parameter(
                &mut self,
                _: usize,
                _: ormload_dialect::SqlTypeCode,
            ) -> crate::jdbc::JdbcResult<()> {
                Ok(())
            }
            fn set_max_rows(&mut self, _: u32) -> crate::jdbc::JdbcResult<()> {
                Ok(())
            }
            fn set_query_timeout(&mut self, _: u32) -> crate::jdbc::JdbcResult<()> {
                Ok(())
            }
            fn set_fetch_size(&mut self, _: u32) -> crate::jdbc::JdbcResult<()> {
                Ok(())
            }
        }
        let ty = ValueType::Composite(vec![ValueType::Long, ValueType::String]);
        let mut binds = Binds(Vec::new());
        let key = TypedValue::new(Value::Composite(vec![Value::Int(1), Value::from("a")]), ty.clone());
        assert_eq!(bind_typed(&mut binds, 3, &key).unwrap(), 2);
        assert_eq!(binds.0, vec![(3, Value::Int(1)), (4, Value::from("a"))]);
        assert_eq!(bind_typed(&mut binds, 5, &TypedValue::new(Value::Null, ty.clone())).unwrap(), 2);
        assert!(bind_typed(&mut binds, 7, &TypedValue::new(Value::Int(1), ty)).is_err());
    }
}
