//! Shapes per-row results into what a load returns.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::context::LoadedObject;

/// How row tuples become the returned list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultTransformer {
    /// The return object of every row.
    #[default]
    RootEntity,
    /// The return object of every row, first occurrence only.
    DistinctRootEntity,
    /// Every object of the row as a tuple.
    PassThrough,
}

impl ResultTransformer {
    pub fn transform_list(&self, rows: Vec<Vec<LoadedObject>>) -> Vec<LoadedObject> {
        match self {
            ResultTransformer::RootEntity => rows.into_iter().filter_map(first).collect(),
            ResultTransformer::DistinctRootEntity => {
                let mut seen = HashSet::new();
                rows.into_iter()
                    .filter_map(first)
                    .filter(|object| seen.insert(object.clone()))
                    .collect()
            }
            ResultTransformer::PassThrough => rows.into_iter().map(LoadedObject::Tuple).collect(),
        }
    }
}

fn first(row: Vec<LoadedObject>) -> Option<LoadedObject> {
    row.into_iter().next()
}
