//! # restgraph Core
//!
//! Local object graph and wire translation for restgraph.
//!
//! This crate provides:
//! - Local identities and cached nodes
//! - The entity/relationship catalog
//! - Resource identity registry (local identity <-> remote identifier)
//! - Representation translator (JSON records <-> typed attributes)
//! - Pagination strategies for collection requests
//! - An in-memory graph store
//!
//! Nothing here performs I/O. The sync engine drives these pieces against a
//! remote service.
//!
//! ## Key Invariants
//!
//! - The same `(entity, resource id)` always maps to the same local identity
//! - A node's resource identifier never changes once assigned
//! - A node's version moves only when remote attributes overwrite it
//! - To-many relationships never contain duplicates

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod catalog;
mod error;
mod graph;
mod id;
mod inflector;
mod node;
mod pagination;
mod query;
mod registry;
mod translator;
mod value;

pub use catalog::{
    AttributeDescription, AttributeKind, Cardinality, Catalog, EntityDescription,
    RelationshipDescription,
};
pub use error::{CoreError, CoreResult, RepresentationError};
pub use graph::{GraphStore, MemoryGraph};
pub use id::LocalId;
pub use inflector::{EnglishInflector, Inflector};
pub use node::{CachedNode, RelationshipValue};
pub use pagination::{
    FnPaginator, LimitOffsetPaginator, PagePerPagePaginator, Paginator, WireParameters,
    DEFAULT_PER_PAGE,
};
pub use query::{Predicate, Query, QueryWindow};
pub use registry::IdentityRegistry;
pub use translator::{
    identifier_text, DecodedAttributes, Record, RelationshipRepresentation, Translator,
    RESOURCE_ID_KEYS,
};
pub use value::AttributeValue;
