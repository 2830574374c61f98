//! Page/limit pagination shared by every listing endpoint.
//!
//! Requests carry a 1-based `page` and a `limit`; storage queries use
//! `skip = (page - 1) * limit`. Responses report the total number of records
//! and the number of pages.

use serde::{Deserialize, Serialize};

/// Raw pagination parameters as they arrive in a query string.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageRequest {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

/// Validated pagination window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    page: u32,
    limit: u32,
}

impl Pagination {
    /// Default page size.
    pub const DEFAULT_LIMIT: u32 = 10;
    /// Largest page size a client may request.
    pub const MAX_LIMIT: u32 = 100;

    /// Build a window, clamping `page` to at least 1 and `limit` to
    /// `1..=MAX_LIMIT`.
    #[must_use]
    pub fn new(page: u32, limit: u32) -> Self {
        Self {
            page: page.max(1),
            limit: limit.clamp(1, Self::MAX_LIMIT),
        }
    }

    /// 1-based page number.
    #[must_use]
    pub const fn page(&self) -> u32 {
        self.page
    }

    /// Page size.
    #[must_use]
    pub const fn limit(&self) -> u32 {
        self.limit
    }

    /// Number of records to skip: `(page - 1) * limit`.
    fn skip(self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.limit)
    }

    /// `LIMIT` value for SQL queries.
    #[must_use]
    pub fn sql_limit(&self) -> i64 {
        i64::from(self.limit)
    }

    /// `OFFSET` value for SQL queries.
    #[must_use]
    pub fn sql_offset(&self) -> i64 {
        i64::try_from(self.skip()).unwrap_or(i64::MAX)
    }

    /// Describe the window against a known total.
    #[must_use]
    pub fn info(&self, total: u64) -> PageInfo {
        PageInfo {
            page: self.page,
            limit: self.limit,
            total,
            pages: total.div_ceil(u64::from(self.limit)),
        }
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(1, Self::DEFAULT_LIMIT)
    }
}

impl From<PageRequest> for Pagination {
    fn from(req: PageRequest) -> Self {
        Self::new(
            req.page.unwrap_or(1),
            req.limit.unwrap_or(Self::DEFAULT_LIMIT),
        )
    }
}

/// Pagination metadata returned alongside a page of records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageInfo {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub pages: u64,
}

/// A page of records.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub pagination: PageInfo,
}

impl<T> Page<T> {
    /// Assemble a page from fetched records and the total count.
    #[must_use]
    pub fn new(items: Vec<T>, pagination: Pagination, total: u64) -> Self {
        Self {
            items,
            pagination: pagination.info(total),
        }
    }

    /// Convert every record, keeping the pagination metadata.
    #[must_use]
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            pagination: self.pagination,
        }
    }
}
