//! Load plans: what a single load fetches.
//!
//! A [`LoadPlan`] holds its returns, the fetch graph hanging off them, and
//! an arena of [`QuerySpace`]s joined by [`Join`] edges. Plans are built by
//! [`LoadPlanBuilder`] from the mapping registry and never change after.

mod builder;
mod fetch;
mod printer;
mod space;
mod strategy;

pub use builder::LoadPlanBuilder;
pub use fetch::{
    AnyFetch, BidirectionalEntityFetch, CollectionFetch, CollectionReference, CompositeFetch,
    DeferredFetch, DeferredTarget, EntityFetch, EntityReference, Fetch, Return,
};
pub use printer::LoadPlanTreePrinter;
pub use space::{Disposition, Join, JoinKind, QuerySpace, QuerySpaces, SpaceKind};
pub use strategy::{FetchStrategy, FetchStyle, FetchTiming};

use crate::error::{Error, Result};

/// What the plan loads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanDisposition {
    /// One or more root entities.
    EntityLoader,
    /// The elements of one collection.
    CollectionInitializer,
}

/// Compiled description of one load operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadPlan {
    pub disposition: PlanDisposition,
    pub returns: Vec<Return>,
    pub query_spaces: QuerySpaces,
}

impl LoadPlan {
    /// The only return of the plan.
    pub fn single_return(&self) -> Result<&Return> {
        match self.returns.as_slice() {
            [only] => Ok(only),
            other => Err(Error::illegal_state(format!(
                "expecting a load plan with exactly one return, found {}",
                other.len()
            ))),
        }
    }
}
