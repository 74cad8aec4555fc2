//! Offset pagination for queue and search listings.

use serde::{Deserialize, Serialize};

/// Default page size for list queries
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// Maximum allowed page size to prevent OOM
pub const MAX_PAGE_SIZE: u32 = 100;

/// Minimum page number (1-indexed)
pub const MIN_PAGE: u32 = 1;

/// Pagination parameters for list queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageParams {
    /// Page number (1-indexed)
    pub page: u32,
    /// Number of items per page
    pub page_size: u32,
}

impl PageParams {
    /// Create pagination parameters with validation.
    ///
    /// `page` defaults to 1, `page_size` to [`DEFAULT_PAGE_SIZE`] and is
    /// capped at [`MAX_PAGE_SIZE`].
    #[must_use]
    pub fn new(page: Option<u32>, page_size: Option<u32>) -> Self {
        let page = page.unwrap_or(MIN_PAGE).max(MIN_PAGE);
        let page_size = page_size.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);

        Self { page, page_size }
    }

    /// Parameters for the last page holding `total` items.
    ///
    /// A queue is usually watched from its tail, so "page 0" requests
    /// resolve here.
    #[must_use]
    pub fn last_page(total: u64, page_size: Option<u32>) -> Self {
        let page_size = page_size.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        let pages = total.div_ceil(u64::from(page_size)).max(1);

        Self {
            page: u32::try_from(pages).unwrap_or(u32::MAX),
            page_size,
        }
    }

    /// OFFSET for the SQL query.
    ///
    /// Widened before multiplying: page numbers are caller-supplied and
    /// the product can exceed `u32`.
    #[must_use]
    pub const fn offset(&self) -> i64 {
        (self.page as i64 - 1) * self.page_size as i64
    }

    /// LIMIT for the SQL query
    #[must_use]
    pub const fn limit(&self) -> i64 {
        self.page_size as i64
    }
}

impl Default for PageParams {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// Paginated response containing items and metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    /// Items in current page
    pub items: Vec<T>,
    /// Total number of items across all pages
    pub total: u64,
    /// Current page number (1-indexed)
    pub page: u32,
    /// Number of items per page
    pub page_size: u32,
    /// Total number of pages
    pub total_pages: u32,
}

impl<T> Page<T> {
    /// Create a paginated response
    #[must_use]
    pub fn new(items: Vec<T>, total: u64, params: PageParams) -> Self {
        let total_pages = u32::try_from(total.div_ceil(u64::from(params.page_size)))
            .unwrap_or(u32::MAX);

        Self {
            items,
            total,
            page: params.page,
            page_size: params.page_size,
            total_pages,
        }
    }

    /// Whether a page follows this one
    #[must_use]
    pub const fn has_next(&self) -> bool {
        self.page < self.total_pages
    }

    /// Whether a page precedes this one
    #[must_use]
    pub const fn has_prev(&self) -> bool {
        self.page > MIN_PAGE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_params_defaults_and_caps() {
        let params = PageParams::new(None, None);
        assert_eq!(params.page, 1);
        assert_eq!(params.page_size, DEFAULT_PAGE_SIZE);

        let params = PageParams::new(Some(0), Some(500));
        assert_eq!(params.page, 1);
        assert_eq!(params.page_size, MAX_PAGE_SIZE);
    }

    #[test]
    fn test_offset_calculation() {
        assert_eq!(PageParams::new(Some(1), Some(10)).offset(), 0);
        assert_eq!(PageParams::new(Some(3), Some(10)).offset(), 20);
    }

    #[test]
    fn test_offset_huge_page_does_not_overflow() {
        let params = PageParams::new(Some(50_000_000), Some(100));
        assert_eq!(params.offset(), 4_999_999_900);

        let params = PageParams::new(Some(u32::MAX), Some(MAX_PAGE_SIZE));
        assert_eq!(
            params.offset(),
            (i64::from(u32::MAX) - 1) * i64::from(MAX_PAGE_SIZE)
        );
    }

    #[test]
    fn test_last_page() {
        assert_eq!(PageParams::last_page(0, Some(10)).page, 1);
        assert_eq!(PageParams::last_page(10, Some(10)).page, 1);
        assert_eq!(PageParams::last_page(11, Some(10)).page, 2);
        assert_eq!(PageParams::last_page(95, Some(10)).page, 10);
    }

    #[test]
    fn test_page_navigation() {
        let page = Page::new(vec![1, 2, 3], 25, PageParams::new(Some(2), Some(10)));
        assert_eq!(page.total_pages, 3);
        assert!(page.has_next());
        assert!(page.has_prev());

        let page = Page::new(vec![1], 1, PageParams::default());
        assert!(!page.has_next());
        assert!(!page.has_prev());
    }
}
