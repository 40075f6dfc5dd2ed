//! Configuration for the sync engine.

use restgraph_core::{LimitOffsetPaginator, PagePerPagePaginator, Paginator};
use std::sync::Arc;
use std::time::Duration;

/// Configuration for sync operations.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Base URL of the REST service (e.g., "https://api.example.com/v1").
    pub base_url: String,
    /// Pagination strategy for collection fetches. `None` sends no
    /// pagination parameters.
    pub paginator: Option<Arc<dyn Paginator>>,
    /// Whether object faults send `If-Modified-Since`.
    pub send_if_modified_since: bool,
    /// Request timeout.
    pub timeout: Duration,
}

impl SyncConfig {
    /// Creates a new sync configuration.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            paginator: None,
            send_if_modified_since: true,
            timeout: Duration::from_secs(30),
        }
    }

    /// Sets the pagination strategy.
    pub fn with_paginator(mut self, paginator: impl Paginator + 'static) -> Self {
        self.paginator = Some(Arc::new(paginator));
        self
    }

    /// Uses `limit`/`offset` pagination.
    pub fn with_limit_offset(self) -> Self {
        self.with_paginator(LimitOffsetPaginator::default())
    }

    /// Uses `page`/`per_page` pagination.
    pub fn with_page_per_page(self) -> Self {
        self.with_paginator(PagePerPagePaginator::default())
    }

    /// Disables pagination parameters.
    pub fn without_pagination(mut self) -> Self {
        self.paginator = None;
        self
    }

    /// Enables or disables `If-Modified-Since` on object faults.
    pub fn with_if_modified_since(mut self, enabled: bool) -> Self {
        self.send_if_modified_since = enabled;
        self
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new("")
    }
}
