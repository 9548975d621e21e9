//! ormload benchmark suite
//!
//! Criterion benchmarks for the two halves of a load:
//!
//! - **Details**: plan building, alias resolution and SQL rendering
//! - **Load**: statement execution and row reading against SQLite

pub mod fixtures;
pub mod harness;

pub use fixtures::{blog_registry, Scale};
pub use harness::TestContext;
