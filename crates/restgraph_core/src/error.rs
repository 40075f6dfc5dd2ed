//! Error types for restgraph core.

use crate::id::LocalId;
use std::fmt;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in restgraph core operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoreError {
    /// A local object is already bound to a different resource identifier.
    #[error("identity conflict for {local}: bound to {existing:?}, attempted {attempted:?}")]
    IdentityConflict {
        /// The local object.
        local: LocalId,
        /// The identifier already bound.
        existing: String,
        /// The identifier that was rejected.
        attempted: String,
    },

    /// A wire record (or one of its fields) could not be decoded.
    #[error(transparent)]
    Representation(#[from] RepresentationError),

    /// The entity is not declared in the catalog.
    #[error("unknown entity: {0}")]
    UnknownEntity(String),

    /// The relationship is not declared on the entity.
    #[error("unknown relationship {relationship} on entity {entity}")]
    UnknownRelationship {
        /// Entity name.
        entity: String,
        /// Relationship name.
        relationship: String,
    },

    /// No node with this local identity exists in the graph.
    #[error("node not found: {0}")]
    NodeNotFound(LocalId),
}

/// A decode failure scoped to one field or one collection element.
///
/// Representation errors never invalidate a whole response: the translator
/// reports them alongside whatever it could decode.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct RepresentationError {
    /// Entity the record was decoded as.
    pub entity: String,
    /// Offending field, or `None` when the whole element is unusable.
    pub field: Option<String>,
    /// What went wrong.
    pub message: String,
}

impl RepresentationError {
    /// Creates an error scoped to a single field.
    pub fn field(
        entity: impl Into<String>,
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            entity: entity.into(),
            field: Some(field.into()),
            message: message.into(),
        }
    }

    /// Creates an error scoped to a whole collection element.
    pub fn element(entity: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            field: None,
            message: message.into(),
        }
    }
}

impl fmt::Display for RepresentationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.field {
            Some(field) => write!(
                f,
                "representation error in {}.{}: {}",
                self.entity, field, self.message
            ),
            None => write!(f, "representation error in {}: {}", self.entity, self.message),
        }
    }
}
