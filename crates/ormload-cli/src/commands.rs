//! Subcommand execution.

use std::path::Path;

use ormload_core::mapping::{MappingDocument, SchemaExporter};
use ormload_core::{
    CollectionLoader, EntityLoader, LoadPlanBuilder, LoadQueryDetails, LoadQueryInfluencers, LoaderSettings,
    MappingRegistry, PersistenceContext, QueryBuildingParameters, SqliteCoordinator, Value,
};
use ormload_dialect::{LockMode, LockOptions, LockTimeout};
use thiserror::Error;
use tracing::{debug, info};

use crate::formatter::{format_context, format_details, format_statements};
use crate::{Args, Command, LoadOptions};

/// Errors reported to the user.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("cannot read mapping {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid mapping document: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Load(#[from] ormload_core::Error),

    #[error("database: {0}")]
    Database(#[from] ormload_core::JdbcError),

    #[error("invalid argument: {0}")]
    Argument(String),
}

type Result<T> = std::result::Result<T, CommandError>;

/// Run the parsed command and return what to print.
pub fn run(args: Args) -> Result<String> {
    let registry = load_registry(&args.mapping, args.dialect.as_deref(), args.settings_from_env)?;
    let format = args.format;
    match args.command {
        Command::Explain {
            entity,
            keyed_on,
            options,
        } => {
            let loader = entity_loader(&registry, &entity, keyed_on, &options, None)?;
            let details = loader.batch_details().unwrap_or(loader.details());
            Ok(format_details(format, details))
        }
        Command::Collection { role, options } => {
            let details = collection_details(&registry, &role, &options)?;
            Ok(format_details(format, &details))
        }
        Command::Schema => {
            let statements = SchemaExporter::new(&registry).create_statements()?;
            Ok(format_statements(format, &statements))
        }
        Command::Load {
            database,
            entity,
            ids,
            keyed_on,
            read_only,
            options,
        } => {
            let loader = entity_loader(&registry, &entity, keyed_on, &options, read_only.then_some(true))?;
            let mut coordinator = SqliteCoordinator::open(&database)?;
            let mut context = PersistenceContext::new().with_default_read_only(registry.settings().default_read_only);
            let ids: Vec<Value> = ids.iter().map(String::as_str).map(parse_key).collect();
            let keys = loader.load_batch(&mut coordinator, &mut context, &ids)?;
            info!(entity = %entity, requested = ids.len(), loaded = keys.len(), "load complete");
            Ok(format_context(format, &context))
        }
        Command::Initialize {
            database,
            role,
            owners,
            options,
        } => {
            let mut builder = CollectionLoader::builder(&registry, &role)
                .with_lock_options(lock_options(&options)?)
                .with_influencers(influencers(&registry, &options.filters)?);
            for path in &options.fetches {
                builder = builder.with_fetch(path.clone());
            }
            if let Some(batch_size) = options.batch_size {
                builder = builder.with_batch_size(batch_size);
            }
            let loader = builder.build()?;
            let mut coordinator = SqliteCoordinator::open(&database)?;
            let mut context = PersistenceContext::new().with_default_read_only(registry.settings().default_read_only);
            let owners: Vec<Value> = owners.iter().map(String::as_str).map(parse_key).collect();
            loader.initialize_batch(&mut coordinator, &mut context, &owners)?;
            info!(role = %role, owners = owners.len(), "initialization complete");
            Ok(format_context(format, &context))
        }
    }
}

fn load_registry(path: &Path, dialect: Option<&str>, settings_from_env: bool) -> Result<MappingRegistry> {
    let json = std::fs::read_to_string(path).map_err(|source| CommandError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let mut document: MappingDocument = serde_json::from_str(&json)?;
    if let Some(dialect) = dialect {
        debug!(dialect, "overriding mapping dialect");
        document.dialect = dialect.to_string();
    }
    if settings_from_env {
        document.settings = LoaderSettings::from_env()?;
    }
    Ok(MappingRegistry::from_document(document)?)
}

fn entity_loader<'r>(
    registry: &'r MappingRegistry,
    entity: &str,
    keyed_on: Option<String>,
    options: &LoadOptions,
    read_only: Option<bool>,
) -> Result<EntityLoader<'r>> {
    let mut builder = EntityLoader::builder(registry, entity)
        .with_lock_options(lock_options(options)?)
        .with_influencers(influencers(registry, &options.filters)?);
    for path in &options.fetches {
        builder = builder.with_fetch(path.clone());
    }
    if let Some(batch_size) = options.batch_size {
        builder = builder.with_batch_size(batch_size);
    }
    if let Some(property) = keyed_on {
        builder = builder.keyed_on(property);
    }
    if let Some(read_only) = read_only {
        builder = builder.with_read_only(read_only);
    }
    Ok(builder.build()?)
}

fn collection_details(registry: &MappingRegistry, role: &str, options: &LoadOptions) -> Result<LoadQueryDetails> {
    let plan = options
        .fetches
        .iter()
        .fold(LoadPlanBuilder::new(registry), |builder, path| builder.with_fetch(path.clone()))
        .collection_load_plan(role)?;
    let params = QueryBuildingParameters::new()
        .with_influencers(influencers(registry, &options.filters)?)
        .with_lock_options(lock_options(options)?)
        .with_batch_size(options.batch_size.unwrap_or(1));
    Ok(LoadQueryDetails::for_collection(&plan, &params, registry)?)
}

fn lock_options(options: &LoadOptions) -> Result<LockOptions> {
    let Some(name) = &options.lock else {
        return Ok(LockOptions::none());
    };
    let mode =
        LockMode::parse(name).ok_or_else(|| CommandError::Argument(format!("unknown lock mode [{name}]")))?;
    let lock = LockOptions::new(mode);
    Ok(match options.lock_timeout {
        Some(0) => lock.with_timeout(LockTimeout::NoWait),
        Some(millis) => lock.with_timeout(LockTimeout::Millis(millis)),
        None => lock,
    })
}

/// Enable filters given as `name` or `name:param=value,param=value`.
fn influencers(registry: &MappingRegistry, specs: &[String]) -> Result<LoadQueryInfluencers> {
    let mut influencers = LoadQueryInfluencers::new();
    for spec in specs {
        let (name, assignments) = spec.split_once(':').unwrap_or((spec.as_str(), ""));
        let mut filter = registry.enable_filter(name)?;
        for assignment in assignments.split(',').filter(|a| !a.is_empty()) {
            let (param, raw) = assignment
                .split_once('=')
                .ok_or_else(|| CommandError::Argument(format!("expected param=value, got [{assignment}]")))?;
            let ty = filter.definition().parameters.get(param).cloned().ok_or_else(|| {
                CommandError::Argument(format!("filter [{name}] has no parameter [{param}]"))
            })?;
            let value = ty.coerce(Value::Text(raw.to_string()))?;
            filter = filter.with_parameter(param, value);
        }
        influencers.enable_filter(filter);
    }
    Ok(influencers)
}

/// Key given on the command line. Commas separate the parts of a
/// composite key; the loader converts each part to the mapped type.
fn parse_key(raw: &str) -> Value {
    if raw.contains(',') {
        Value::Composite(raw.split(',').map(|part| Value::Text(part.trim().to_string())).collect())
    } else {
        Value::Text(raw.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ormload_dialect::Dialect;

    fn registry() -> MappingRegistry {
        MappingRegistry::from_json(
            r#"{
                "dialect": "postgres",
                "filters": [{"name": "tenant", "parameters": {"id": "long"}}],
                "entities": [{"name": "User", "table": "users", "identifier": {"name": "id", "columns": ["id"]}}]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_parse_key() {
        assert_eq!(parse_key("7"), Value::Text("7".into()));
        assert_eq!(
            parse_key("7, a"),
            Value::Composite(vec![Value::Text("7".into()), Value::Text("a".into())])
        );
    }

    #[test]
    fn test_filter_spec() {
        let registry = registry();
        let enabled = influencers(&registry, &["tenant:id=42".to_string()]).unwrap();
        let (value, _) = enabled.filter_parameter("tenant.id").unwrap();
        assert_eq!(value.values(), &[Value::Int(42)]);

        assert!(influencers(&registry, &["tenant:bogus=1".to_string()]).is_err());
        assert!(influencers(&registry, &["missing".to_string()]).is_err());
    }

    #[test]
    fn test_lock_options() {
        let options = LoadOptions {
            lock: Some("pessimistic-write".into()),
            lock_timeout: Some(0),
            ..Default::default()
        };
        let lock = lock_options(&options).unwrap();
        assert_eq!(lock.lock_mode, LockMode::PessimisticWrite);
        assert_eq!(lock.timeout, LockTimeout::NoWait);
        assert!(lock_options(&LoadOptions::default()).unwrap().is_none());
    }

    #[test]
    fn test_dialect_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mapping.json");
        std::fs::write(
            &path,
            r#"{"entities": [{"name": "User", "table": "users", "identifier": {"name": "id", "columns": ["id"]}}]}"#,
        )
        .unwrap();
        let registry = load_registry(&path, Some("oracle"), false).unwrap();
        assert_eq!(registry.dialect().name(), Dialect::oracle().name());
    }
}
