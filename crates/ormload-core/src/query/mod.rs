//! SQL generation for load plans.
//!
//! [`LoadQueryDetails`] turns a [`LoadPlan`](crate::plan::LoadPlan) into one
//! SELECT statement and the readers for its rows. Aliases are allocated by an
//! [`AliasResolutionContext`] that lives for a single build.

mod alias;
mod details;
mod select;
mod walker;

pub use alias::{generate_alias, AliasResolutionContext, CollectionReferenceAliases, EntityReferenceAliases};
pub use details::{key_restriction, LoadQueryDetails, QueryBuildingParameters};
pub use select::SelectStatementBuilder;
pub use walker::{FetchSource, FetchStats, LoadQueryJoinAndFetchProcessor};
