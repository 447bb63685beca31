use crate::error::ApiError;
use serde::Serialize;

/// A validated page window (1-based page number).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
}

impl PageRequest {
    /// Resolve optional query values against configured defaults. Values
    /// below 1 or a page size above `max_page_size` are rejected.
    pub fn resolve(
        page: Option<i64>,
        page_size: Option<i64>,
        default_page_size: u32,
        max_page_size: u32,
    ) -> Result<Self, ApiError> {
        let page = page.unwrap_or(1);
        if page < 1 || page > u32::MAX as i64 {
            return Err(ApiError::validation("page must be 1 or greater"));
        }

        let page_size = page_size.unwrap_or(default_page_size as i64);
        if page_size < 1 || page_size > max_page_size as i64 {
            return Err(ApiError::validation(format!(
                "page_size must be between 1 and {}",
                max_page_size
            )));
        }

        Ok(Self {
            page: page as u32,
            page_size: page_size as u32,
        })
    }

    pub fn limit(&self) -> i64 {
        self.page_size as i64
    }

    pub fn offset(&self) -> i64 {
        (self.page as i64 - 1) * self.page_size as i64
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Paged<T> {
    pub items: Vec<T>,
    pub total_count: i64,
    pub page: u32,
    pub page_size: u32,
}

impl<T> Paged<T> {
    pub fn new(items: Vec<T>, total_count: i64, request: PageRequest) -> Self {
        Self {
            items,
            total_count,
            page: request.page,
            page_size: request.page_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_apply() {
        let page = PageRequest::resolve(None, None, 10, 100).unwrap();
        assert_eq!(page, PageRequest { page: 1, page_size: 10 });
        assert_eq!(page.offset(), 0);
    }

    #[test]
    fn test_offset_is_computed_from_page() {
        let page = PageRequest::resolve(Some(3), Some(25), 10, 100).unwrap();
        assert_eq!(page.limit(), 25);
        assert_eq!(page.offset(), 50);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(PageRequest::resolve(Some(0), None, 10, 100).is_err());
        assert!(PageRequest::resolve(None, Some(0), 10, 100).is_err());
        assert!(PageRequest::resolve(None, Some(101), 10, 100).is_err());
    }
}
