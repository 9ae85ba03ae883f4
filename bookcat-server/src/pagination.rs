//! Pagination utilities
//!
//! List endpoints take a 1-indexed `page` and a page size (`per`) that is
//! clamped to an endpoint-specific range.

/// Allowed page-size range for one endpoint
#[derive(Debug, Clone, Copy)]
pub struct PageLimits {
    pub min: i64,
    pub max: i64,
    pub default: i64,
}

/// Book list and exports: 1..200, default 25
pub const BOOK_PAGES: PageLimits = PageLimits { min: 1, max: 200, default: 25 };

/// Author list and auth-event log: 10..200, default 50
pub const ADMIN_PAGES: PageLimits = PageLimits { min: 10, max: 200, default: 50 };

/// Pagination metadata for one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    /// Current page number (1-indexed)
    pub page: i64,
    /// Rows per page
    pub per_page: i64,
    /// Offset for SQL LIMIT/OFFSET query
    pub offset: i64,
}

/// Calculate pagination from the requested page and page size
///
/// Pages below 1 become 1; a missing page size takes the default, anything
/// else is clamped into `[min, max]`. Pages past the end are not clamped,
/// they simply return no rows.
///
/// # Examples
/// ```
/// use bookcat_server::pagination::{calculate_pagination, BOOK_PAGES};
///
/// let p = calculate_pagination(Some(3), Some(20), BOOK_PAGES);
/// assert_eq!(p.offset, 40);
///
/// let p = calculate_pagination(Some(0), Some(1000), BOOK_PAGES);
/// assert_eq!(p.page, 1);
/// assert_eq!(p.per_page, 200);
/// ```
pub fn calculate_pagination(
    requested_page: Option<i64>,
    requested_per: Option<i64>,
    limits: PageLimits,
) -> Pagination {
    let page = requested_page.unwrap_or(1).max(1);
    let per_page = requested_per
        .unwrap_or(limits.default)
        .clamp(limits.min, limits.max);
    let offset = (page - 1).saturating_mul(per_page);

    Pagination {
        page,
        per_page,
        offset,
    }
}
