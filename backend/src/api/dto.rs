//! Shared Data Transfer Objects (DTOs) for API handlers.

use serde::{Deserialize, Serialize};

use crate::models::{Page, PageRequest};

/// Pagination metadata for list responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Pagination {
    /// Current page number (1-indexed)
    pub page: u32,
    /// Number of items per page
    pub per_page: u32,
    /// Total number of items across all pages
    pub total: i64,
    /// Total number of pages
    pub total_pages: u32,
}

/// Query parameters for paginated list requests.
///
/// Flattened into handler-specific query structs.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaginationQuery {
    /// Requested page number (default: 1)
    pub page: Option<i64>,
    /// Requested items per page (default: 20, max: 100)
    pub per_page: Option<i64>,
}

impl PaginationQuery {
    pub fn to_request(&self) -> PageRequest {
        PageRequest::new(self.page, self.per_page)
    }
}

/// `{items, pagination}` body of every list endpoint.
#[derive(Debug, Serialize)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
    pub pagination: Pagination,
}

impl<T> From<Page<T>> for ListResponse<T> {
    fn from(page: Page<T>) -> Self {
        let pagination = Pagination {
            page: page.page,
            per_page: page.limit,
            total: page.total,
            total_pages: page.total_pages(),
        };
        Self {
            items: page.items,
            pagination,
        }
    }
}
