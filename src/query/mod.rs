//! Query Engine
//!
//! Filter, sort and pagination over the catalog store for table views.
//! Raw field names coming from callers (column filters, sort keys) are
//! validated with [`is_safe_field_name`] before they reach the store.

mod filter;
mod sort;

pub use filter::{Availability, DomainFilter};
pub use sort::{DomainSort, FixedColumn, SortDirection, SortKey};

use crate::extract::DomainRecord;
use crate::storage::{CatalogStore, StorageError};
use serde::Serialize;
use thiserror::Error;

/// Largest page a caller may request
pub const MAX_PAGE_SIZE: u32 = 500;

pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// Errors raised while building a query
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Invalid field name: {0:?} (letters, digits and underscores only)")]
    InvalidField(String),

    #[error("Invalid availability filter: {0:?}")]
    InvalidAvailability(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Returns true for non-empty names made of ASCII letters, digits and underscores
pub fn is_safe_field_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 128
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// A page request against the catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainQuery {
    /// 1-based page number
    pub page: u32,
    pub page_size: u32,
    pub filter: DomainFilter,
    pub sort: DomainSort,
}

impl Default for DomainQuery {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
            filter: DomainFilter::default(),
            sort: DomainSort::default(),
        }
    }
}

impl DomainQuery {
    /// Page number and size after clamping to valid ranges
    pub fn bounds(&self) -> (u32, u32) {
        (self.page.max(1), self.page_size.clamp(1, MAX_PAGE_SIZE))
    }

    /// Row offset of the first record on the requested page
    pub fn offset(&self) -> u64 {
        let (page, page_size) = self.bounds();
        u64::from(page - 1) * u64::from(page_size)
    }
}

/// One page of query results
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryPage {
    pub rows: Vec<DomainRecord>,
    /// Every raw field name present in the store, for dynamic columns
    pub discovered_fields: Vec<String>,
    /// Records matching the filter across all pages
    pub total: u64,
    pub has_more: bool,
    pub page: u32,
    pub page_size: u32,
}

/// Runs a filtered, sorted, paginated read against the store
pub fn query_domains(
    store: &dyn CatalogStore,
    query: &DomainQuery,
) -> Result<QueryPage, QueryError> {
    let filter = query.filter.normalized()?;
    let (page, page_size) = query.bounds();
    let offset = query.offset();

    let total = store.count_matching(&filter)?;
    let rows = store.select_page(&filter, &query.sort, page_size, offset)?;
    let discovered_fields = store.discover_fields()?;

    tracing::debug!(
        "Query page {} (size {}): {} of {} matching rows",
        page,
        page_size,
        rows.len(),
        total
    );

    Ok(QueryPage {
        rows,
        discovered_fields,
        total,
        has_more: offset + u64::from(page_size) < total,
        page,
        page_size,
    })
}
