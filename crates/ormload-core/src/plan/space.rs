//! Query spaces and the joins between them.

use std::collections::HashMap;

use crate::error::{Error, Result};

/// Disposition of a query space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Disposition {
    Entity,
    Collection,
    Composite,
}

/// What a query space stands for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpaceKind {
    /// An entity table.
    Entity { entity: String },
    /// A collection table.
    Collection { role: String },
    /// An embedded component or composite key sharing its owner's table.
    Composite { property: String },
}

/// Kind of edge between two query spaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinKind {
    /// Owner to embedded component. Rendered as nothing.
    Composite,
    /// To-one association.
    Entity,
    /// Owner to collection table.
    Collection,
    /// Collection to its element entity.
    CollectionElement,
    /// Collection to the entity keying a map.
    CollectionIndex,
}

/// Directed edge from one query space to another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Join {
    pub lhs: String,
    pub rhs: String,
    pub kind: JoinKind,
    /// Inner join when true, left outer join otherwise.
    pub required: bool,
    /// Unqualified columns on the left-hand side.
    pub lhs_columns: Vec<String>,
    /// Unqualified columns on the right-hand side.
    pub rhs_columns: Vec<String>,
    /// Additional ON condition written against bare right-hand columns.
    pub with_condition: Option<String>,
}

impl Join {
    /// Join rendering nothing, used for composite spaces.
    pub fn composite(lhs: impl Into<String>, rhs: impl Into<String>) -> Self {
        Self {
            lhs: lhs.into(),
            rhs: rhs.into(),
            kind: JoinKind::Composite,
            required: true,
            lhs_columns: Vec::new(),
            rhs_columns: Vec::new(),
            with_condition: None,
        }
    }

    /// Left-hand columns qualified with the left-hand table alias.
    pub fn aliased_lhs_columns(&self, lhs_alias: &str) -> Vec<String> {
        crate::mapping::qualify(lhs_alias, &self.lhs_columns)
    }
}

/// One table reference participating in a load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuerySpace {
    pub uid: String,
    pub kind: SpaceKind,
    pub joins: Vec<Join>,
}

impl QuerySpace {
    pub fn new(uid: impl Into<String>, kind: SpaceKind) -> Self {
        Self {
            uid: uid.into(),
            kind,
            joins: Vec::new(),
        }
    }

    pub fn disposition(&self) -> Disposition {
        match self.kind {
            SpaceKind::Entity { .. } => Disposition::Entity,
            SpaceKind::Collection { .. } => Disposition::Collection,
            SpaceKind::Composite { .. } => Disposition::Composite,
        }
    }
}

/// Arena of query spaces addressed by uid.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuerySpaces {
    spaces: Vec<QuerySpace>,
    index: HashMap<String, usize>,
    roots: Vec<String>,
}

impl QuerySpaces {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a space reached by no join.
    pub fn add_root(&mut self, space: QuerySpace) -> Result<()> {
        let uid = space.uid.clone();
        self.add(space)?;
        self.roots.push(uid);
        Ok(())
    }

    /// Add a space.
    pub fn add(&mut self, space: QuerySpace) -> Result<()> {
        if self.index.contains_key(&space.uid) {
            return Err(Error::illegal_state(format!(
                "query space [{}] registered twice",
                space.uid
            )));
        }
        self.index.insert(space.uid.clone(), self.spaces.len());
        self.spaces.push(space);
        Ok(())
    }

    /// Add a join to its left-hand space.
    pub fn add_join(&mut self, join: Join) -> Result<()> {
        if !self.index.contains_key(&join.rhs) {
            return Err(Error::illegal_state(format!(
                "join target [{}] is not a registered query space",
                join.rhs
            )));
        }
        let lhs = self.index.get(&join.lhs).copied().ok_or_else(|| {
            Error::illegal_state(format!("join source [{}] is not a registered query space", join.lhs))
        })?;
        self.spaces[lhs].joins.push(join);
        Ok(())
    }

    /// Get a space by uid.
    pub fn get(&self, uid: &str) -> Result<&QuerySpace> {
        self.index
            .get(uid)
            .map(|&i| &self.spaces[i])
            .ok_or_else(|| Error::illegal_state(format!("no query space with uid [{uid}]")))
    }

    /// Spaces reached by no join, in registration order.
    pub fn roots(&self) -> impl Iterator<Item = &QuerySpace> {
        self.roots.iter().filter_map(|uid| self.get(uid).ok())
    }

    pub fn iter(&self) -> impl Iterator<Item = &QuerySpace> {
        self.spaces.iter()
    }

    pub fn len(&self) -> usize {
        self.spaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spaces.is_empty()
    }
}
