//! Query descriptors for the local graph.

use crate::node::CachedNode;
use crate::value::AttributeValue;

/// A window over an ordered result set. Zero means "unbounded" for `limit`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryWindow {
    /// Number of leading results to skip.
    pub offset: u64,
    /// Maximum number of results, or 0 for no limit.
    pub limit: u64,
}

impl QueryWindow {
    /// Creates a window.
    pub fn new(offset: u64, limit: u64) -> Self {
        Self { offset, limit }
    }

    /// Applies the window to an iterator.
    pub fn apply<T>(&self, items: impl Iterator<Item = T>) -> Vec<T> {
        let skipped = items.skip(usize::try_from(self.offset).unwrap_or(usize::MAX));
        if self.limit == 0 {
            skipped.collect()
        } else {
            skipped
                .take(usize::try_from(self.limit).unwrap_or(usize::MAX))
                .collect()
        }
    }
}

/// Filter over cached nodes.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Predicate {
    /// Matches every node.
    #[default]
    All,
    /// Attribute equals a value.
    Equals {
        /// Attribute name.
        attribute: String,
        /// Expected value.
        value: AttributeValue,
    },
    /// Node is bound to this resource identifier.
    ResourceId(String),
    /// All sub-predicates match.
    And(Vec<Predicate>),
}

impl Predicate {
    /// Convenience constructor for `Equals`.
    pub fn equals(attribute: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        Self::Equals {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    /// Evaluates the predicate.
    pub fn matches(&self, node: &CachedNode) -> bool {
        match self {
            Self::All => true,
            Self::Equals { attribute, value } => node.attribute(attribute) == Some(value),
            Self::ResourceId(id) => node.resource_id() == Some(id.as_str()),
            Self::And(all) => all.iter().all(|p| p.matches(node)),
        }
    }
}

/// A query against one entity of the local graph.
///
/// The same descriptor drives the remote collection fetch, where only the
/// entity and window matter.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    /// Entity name.
    pub entity: String,
    /// Filter.
    pub predicate: Predicate,
    /// Result window, also used for remote pagination.
    pub window: QueryWindow,
}

impl Query {
    /// Every node of an entity.
    pub fn all(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            predicate: Predicate::All,
            window: QueryWindow::default(),
        }
    }

    /// Sets the filter.
    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicate = predicate;
        self
    }

    /// Sets the window limit.
    pub fn with_limit(mut self, limit: u64) -> Self {
        self.window.limit = limit;
        self
    }

    /// Sets the window offset.
    pub fn with_offset(mut self, offset: u64) -> Self {
        self.window.offset = offset;
        self
    }
}
