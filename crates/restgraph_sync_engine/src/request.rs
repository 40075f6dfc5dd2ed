//! Remote requests, responses and the request factory.
//!
//! Paths follow the REST convention:
//! - collection: `pluralize(lowercase(entity))`, e.g. `artists`
//! - object: `artists/42`
//! - relationship: `artists/42/songs`
//!
//! Paths are relative; the transport joins them onto its base URL.

use crate::config::SyncConfig;
use crate::error::TransportError;
use restgraph_core::{
    CachedNode, CoreResult, Paginator, Query, RelationshipDescription, Translator, WireParameters,
};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// HTTP method of a remote request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Method {
    /// Read.
    Get,
    /// Insert.
    Post,
    /// Update.
    Put,
    /// Delete.
    Delete,
}

impl Method {
    /// Upper-case method name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request to the remote service.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteRequest {
    /// Method.
    pub method: Method,
    /// Path relative to the base URL.
    pub path: String,
    /// Query parameters.
    pub query: WireParameters,
    /// Extra headers.
    pub headers: BTreeMap<String, String>,
    /// JSON body for writes.
    pub body: Option<Value>,
}

impl RemoteRequest {
    /// Creates a request without body.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: WireParameters::new(),
            headers: BTreeMap::new(),
            body: None,
        }
    }

    /// Creates a GET request.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    /// Sets the query parameters.
    pub fn with_query(mut self, query: WireParameters) -> Self {
        self.query = query;
        self
    }

    /// Adds a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Sets the JSON body.
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// A response from the remote service.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteResponse {
    /// HTTP status code.
    pub status: u16,
    /// Headers, keyed by lower-case name.
    pub headers: BTreeMap<String, String>,
    /// Decoded JSON body; `Null` when the body was empty.
    pub body: Value,
}

impl RemoteResponse {
    /// A 200 response.
    pub fn ok(body: Value) -> Self {
        Self::with_status(200, body)
    }

    /// A response with an arbitrary status.
    pub fn with_status(status: u16, body: Value) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body,
        }
    }

    /// A 304 response.
    pub fn not_modified() -> Self {
        Self::with_status(304, Value::Null)
    }

    /// Adds a header. Names are stored lower-case.
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// The `Last-Modified` header.
    pub fn last_modified(&self) -> Option<&str> {
        self.header("last-modified")
    }

    /// Returns true for 304.
    pub fn is_not_modified(&self) -> bool {
        self.status == 304
    }

    /// Turns any status other than 2xx or 304 into a `TransportError`.
    pub fn check_status(self) -> Result<Self, TransportError> {
        if (200..300).contains(&self.status) || self.is_not_modified() {
            return Ok(self);
        }
        let body = match &self.body {
            Value::Null => String::new(),
            Value::String(text) => text.clone(),
            other => other.to_string(),
        };
        Err(TransportError::Status {
            status: self.status,
            body,
        })
    }
}

/// Builds every remote request and decides the policy questions around them.
///
/// Write builders return `None` to suppress the remote call; the change is
/// then committed locally as if it had succeeded.
pub trait RequestFactory: Send + Sync {
    /// GET request for a collection query.
    fn request_for_collection(&self, query: &Query) -> CoreResult<RemoteRequest>;

    /// GET request for one object.
    fn request_for_object(&self, node: &CachedNode, resource_id: &str) -> RemoteRequest;

    /// GET request for one relationship of an object.
    fn request_for_relationship(
        &self,
        node: &CachedNode,
        resource_id: &str,
        relationship: &RelationshipDescription,
    ) -> RemoteRequest;

    /// POST request for a new object.
    fn request_for_insert(&self, node: &CachedNode) -> CoreResult<Option<RemoteRequest>>;

    /// PUT request carrying the changed attributes of an object.
    fn request_for_update(
        &self,
        node: &CachedNode,
        resource_id: &str,
        changed: &BTreeSet<String>,
    ) -> CoreResult<Option<RemoteRequest>>;

    /// DELETE request for an object.
    fn request_for_delete(&self, node: &CachedNode, resource_id: &str) -> Option<RemoteRequest>;

    /// Whether an object whose attributes are already loaded should be
    /// fetched again on fault.
    fn should_refresh_object(&self, _node: &CachedNode) -> bool {
        false
    }
}

/// The REST convention request factory.
#[derive(Debug, Clone)]
pub struct RestRequestFactory {
    translator: Translator,
    paginator: Option<Arc<dyn Paginator>>,
    send_if_modified_since: bool,
}

impl RestRequestFactory {
    /// Creates a factory.
    pub fn new(translator: Translator, config: &SyncConfig) -> Self {
        Self {
            translator,
            paginator: config.paginator.clone(),
            send_if_modified_since: config.send_if_modified_since,
        }
    }

    /// Path of an entity's collection.
    pub fn collection_path(&self, entity: &str) -> String {
        self.translator.collection_name(entity)
    }

    /// Path of one object.
    pub fn object_path(&self, entity: &str, resource_id: &str) -> String {
        format!("{}/{}", self.collection_path(entity), resource_id)
    }

    /// Path of one relationship of an object.
    pub fn relationship_path(&self, entity: &str, resource_id: &str, relationship: &str) -> String {
        format!("{}/{}", self.object_path(entity, resource_id), relationship)
    }
}

impl RequestFactory for RestRequestFactory {
    fn request_for_collection(&self, query: &Query) -> CoreResult<RemoteRequest> {
        self.translator.catalog().require_entity(&query.entity)?;
        let parameters = self
            .paginator
            .as_ref()
            .map(|paginator| paginator.parameters_for(&query.window))
            .unwrap_or_default();
        Ok(RemoteRequest::get(self.collection_path(&query.entity)).with_query(parameters))
    }

    fn request_for_object(&self, node: &CachedNode, resource_id: &str) -> RemoteRequest {
        let request = RemoteRequest::get(self.object_path(&node.entity, resource_id));
        match (&node.last_modified, self.send_if_modified_since) {
            (Some(last_modified), true) => {
                request.with_header("If-Modified-Since", last_modified.clone())
            }
            _ => request,
        }
    }

    fn request_for_relationship(
        &self,
        node: &CachedNode,
        resource_id: &str,
        relationship: &RelationshipDescription,
    ) -> RemoteRequest {
        RemoteRequest::get(self.relationship_path(&node.entity, resource_id, &relationship.name))
    }

    fn request_for_insert(&self, node: &CachedNode) -> CoreResult<Option<RemoteRequest>> {
        let body = self.translator.to_wire_attributes(node, None)?;
        Ok(Some(
            RemoteRequest::new(Method::Post, self.collection_path(&node.entity))
                .with_body(Value::Object(body)),
        ))
    }

    fn request_for_update(
        &self,
        node: &CachedNode,
        resource_id: &str,
        changed: &BTreeSet<String>,
    ) -> CoreResult<Option<RemoteRequest>> {
        let body = self.translator.to_wire_attributes(node, Some(changed))?;
        Ok(Some(
            RemoteRequest::new(Method::Put, self.object_path(&node.entity, resource_id))
                .with_body(Value::Object(body)),
        ))
    }

    fn request_for_delete(&self, node: &CachedNode, resource_id: &str) -> Option<RemoteRequest> {
        Some(RemoteRequest::new(
            Method::Delete,
            self.object_path(&node.entity, resource_id),
        ))
    }
}
