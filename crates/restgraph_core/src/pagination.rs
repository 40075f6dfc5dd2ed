//! Pagination strategies.
//!
//! A paginator turns the window of a collection query into the query
//! parameters of the remote request. Paginators are stateless: the same
//! window always yields the same parameters.

use crate::query::QueryWindow;
use std::collections::BTreeMap;
use std::fmt;

/// Query parameters added to a collection request.
pub type WireParameters = BTreeMap<String, String>;

/// Page size used by [`PagePerPagePaginator`] when the window has no limit.
pub const DEFAULT_PER_PAGE: u64 = 20;

/// Maps a query window to request parameters.
pub trait Paginator: fmt::Debug + Send + Sync {
    /// Parameters for one window.
    fn parameters_for(&self, window: &QueryWindow) -> WireParameters;
}

/// `?limit=N&offset=M` style pagination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimitOffsetPaginator {
    limit_parameter: String,
    offset_parameter: String,
}

impl LimitOffsetPaginator {
    /// Creates a paginator with custom parameter names. Empty names are
    /// rejected.
    pub fn new(limit_parameter: &str, offset_parameter: &str) -> Option<Self> {
        if limit_parameter.is_empty() || offset_parameter.is_empty() {
            return None;
        }
        Some(Self {
            limit_parameter: limit_parameter.to_string(),
            offset_parameter: offset_parameter.to_string(),
        })
    }
}

impl Default for LimitOffsetPaginator {
    fn default() -> Self {
        Self {
            limit_parameter: "limit".to_string(),
            offset_parameter: "offset".to_string(),
        }
    }
}

impl Paginator for LimitOffsetPaginator {
    fn parameters_for(&self, window: &QueryWindow) -> WireParameters {
        let mut parameters = WireParameters::new();
        if window.limit > 0 {
            parameters.insert(self.limit_parameter.clone(), window.limit.to_string());
        }
        if window.offset > 0 {
            parameters.insert(self.offset_parameter.clone(), window.offset.to_string());
        }
        parameters
    }
}

/// `?page=P&per_page=N` style pagination. Pages are 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PagePerPagePaginator {
    page_parameter: String,
    per_page_parameter: String,
}

impl PagePerPagePaginator {
    /// Creates a paginator with custom parameter names. Empty names are
    /// rejected.
    pub fn new(page_parameter: &str, per_page_parameter: &str) -> Option<Self> {
        if page_parameter.is_empty() || per_page_parameter.is_empty() {
            return None;
        }
        Some(Self {
            page_parameter: page_parameter.to_string(),
            per_page_parameter: per_page_parameter.to_string(),
        })
    }
}

impl Default for PagePerPagePaginator {
    fn default() -> Self {
        Self {
            page_parameter: "page".to_string(),
            per_page_parameter: "per_page".to_string(),
        }
    }
}

impl Paginator for PagePerPagePaginator {
    fn parameters_for(&self, window: &QueryWindow) -> WireParameters {
        let per_page = if window.limit > 0 {
            window.limit
        } else {
            DEFAULT_PER_PAGE
        };
        let page = if window.offset == 0 {
            1
        } else {
            window.offset / per_page + 1
        };

        let mut parameters = WireParameters::new();
        parameters.insert(self.page_parameter.clone(), page.to_string());
        parameters.insert(self.per_page_parameter.clone(), per_page.to_string());
        parameters
    }
}

/// Pagination driven by a caller-supplied function.
pub struct FnPaginator<F> {
    f: F,
}

impl<F> FnPaginator<F>
where
    F: Fn(&QueryWindow) -> WireParameters + Send + Sync,
{
    /// Wraps a function.
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> fmt::Debug for FnPaginator<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnPaginator")
    }
}

impl<F> Paginator for FnPaginator<F>
where
    F: Fn(&QueryWindow) -> WireParameters + Send + Sync,
{
    fn parameters_for(&self, window: &QueryWindow) -> WireParameters {
        (self.f)(window)
    }
}
