//! Benchmark harness helpers.

use ormload_core::dialect::Dialect;
use ormload_core::mapping::SchemaExporter;
use ormload_core::{LoaderSettings, MappingRegistry, SqliteCoordinator};
use tempfile::TempDir;

use crate::fixtures::{blog_registry, populate, Scale};

/// Temporary SQLite database with the blog schema.
pub struct TestContext {
    pub registry: MappingRegistry,
    pub coordinator: SqliteCoordinator,
    _dir: TempDir,
}

impl TestContext {
    /// Create the schema with no rows.
    pub fn new() -> Self {
        Self::with_settings(LoaderSettings::new())
    }

    pub fn with_settings(settings: LoaderSettings) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let registry = blog_registry(Dialect::sqlite(), settings);
        let coordinator = SqliteCoordinator::open(dir.path().join("bench.db")).unwrap();
        for statement in SchemaExporter::new(&registry).create_statements().unwrap() {
            coordinator.execute_batch(&statement).unwrap();
        }
        Self {
            registry,
            coordinator,
            _dir: dir,
        }
    }

    /// Create the schema and populate it.
    pub fn with_scale(scale: Scale) -> Self {
        let ctx = Self::new();
        populate(ctx.coordinator.connection(), scale).unwrap();
        ctx
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tiny_fixture_counts() {
        let ctx = TestContext::with_scale(Scale::Tiny);
        let count = |table: &str| -> i64 {
            ctx.coordinator
                .connection()
                .query_row(&format!("select count(*) from {table}"), [], |row| row.get(0))
                .unwrap()
        };
        assert_eq!(count("users"), 10);
        assert_eq!(count("posts"), 20);
        assert_eq!(count("comments"), 20);
        assert_eq!(count("user_tags"), 20);
    }
}
