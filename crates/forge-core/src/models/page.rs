use serde::{Deserialize, Serialize};

/// Largest page a caller may request.
pub const MAX_PAGE_SIZE: u32 = 200;
pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// Offset/limit window over a listing ordered newest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub limit: u32,
    pub offset: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self { limit: DEFAULT_PAGE_SIZE, offset: 0 }
    }
}

impl Pagination {
    #[must_use]
    pub fn new(limit: u32, offset: u32) -> Self {
        Self { limit, offset }
    }

    /// Window for a 1-based page number.
    #[must_use]
    pub fn page(page: u32, page_size: u32) -> Self {
        Self { limit: page_size, offset: page.saturating_sub(1).saturating_mul(page_size) }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.limit == 0 || self.limit > MAX_PAGE_SIZE {
            return Err(format!("limit must be between 1 and {MAX_PAGE_SIZE}, got {}", self.limit));
        }
        Ok(())
    }
}

/// One page of a filtered listing plus the filtered total.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub limit: u32,
    pub offset: u32,
}

impl<T> Page<T> {
    #[must_use]
    pub fn new(items: Vec<T>, total: u64, pagination: Pagination) -> Self {
        Self { items, total, limit: pagination.limit, offset: pagination.offset }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_numbers_map_to_offsets() {
        assert_eq!(Pagination::page(1, 50), Pagination::new(50, 0));
        assert_eq!(Pagination::page(3, 20), Pagination::new(20, 40));
        assert_eq!(Pagination::page(0, 20).offset, 0);
    }

    #[test]
    fn test_limit_bounds() {
        assert!(Pagination::new(0, 0).validate().is_err());
        assert!(Pagination::new(201, 0).validate().is_err());
        assert!(Pagination::new(200, 10).validate().is_ok());
    }
}
