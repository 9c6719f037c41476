//! Common types used across the platform

use serde::{Deserialize, Serialize};

/// Largest page size the list endpoints will serve
pub const MAX_PAGE_SIZE: u32 = 100;

/// Pagination parameters
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self { page: 1, limit: 20 }
    }
}

impl Pagination {
    /// Build from optional query values, clamping to `1..` pages and `1..=100` items.
    pub fn from_query(page: Option<u32>, limit: Option<u32>) -> Self {
        let defaults = Self::default();
        Self {
            page: page.unwrap_or(defaults.page).max(1),
            limit: limit.unwrap_or(defaults.limit).clamp(1, MAX_PAGE_SIZE),
        }
    }

    /// Row offset for SQL `OFFSET`
    pub fn offset(&self) -> i64 {
        i64::from(self.page.saturating_sub(1)) * i64::from(self.limit)
    }
}

/// Paginated response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub pagination: PaginationMeta,
}

impl<T> PaginatedResponse<T> {
    pub fn new(data: Vec<T>, pagination: Pagination, total_items: u64) -> Self {
        Self {
            data,
            pagination: PaginationMeta::new(pagination, total_items),
        }
    }
}

/// Pagination metadata
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PaginationMeta {
    pub page: u32,
    pub limit: u32,
    pub total_items: u64,
    pub total_pages: u32,
}

impl PaginationMeta {
    pub fn new(pagination: Pagination, total_items: u64) -> Self {
        let limit = u64::from(pagination.limit.max(1));
        let total_pages = total_items.div_ceil(limit);
        Self {
            page: pagination.page,
            limit: pagination.limit,
            total_items,
            total_pages: u32::try_from(total_pages).unwrap_or(u32::MAX),
        }
    }
}

/// Sort direction for list queries
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Date range for queries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DateRange {
    pub start: chrono::NaiveDate,
    pub end: chrono::NaiveDate,
}

impl DateRange {
    pub fn new(start: chrono::NaiveDate, end: chrono::NaiveDate) -> Result<Self, crate::DomainError> {
        if end < start {
            return Err(crate::DomainError::invalid("to", "must not be before the start date"));
        }
        Ok(Self { start, end })
    }

    /// `days` days starting at `start`, inclusive of both ends
    pub fn starting(start: chrono::NaiveDate, days: u32) -> Self {
        let end = start
            .checked_add_days(chrono::Days::new(u64::from(days)))
            .unwrap_or(chrono::NaiveDate::MAX);
        Self { start, end }
    }

    pub fn contains(&self, date: chrono::NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_clamps_query_values() {
        let p = Pagination::from_query(Some(0), Some(500));
        assert_eq!(p, Pagination { page: 1, limit: 100 });

        let p = Pagination::from_query(None, None);
        assert_eq!(p, Pagination { page: 1, limit: 20 });
    }

    #[test]
    fn test_pagination_offset() {
        assert_eq!(Pagination { page: 1, limit: 20 }.offset(), 0);
        assert_eq!(Pagination { page: 3, limit: 25 }.offset(), 50);
    }

    #[test]
    fn test_date_range_bounds() {
        let d = |day| chrono::NaiveDate::from_ymd_opt(2024, 5, day).unwrap();
        let range = DateRange::new(d(1), d(7)).unwrap();
        assert!(range.contains(d(1)));
        assert!(range.contains(d(7)));
        assert!(!range.contains(d(8)));
        assert!(DateRange::new(d(7), d(1)).is_err());
        assert_eq!(DateRange::starting(d(1), 6).end, d(7));
    }

    #[test]
    fn test_total_pages_rounds_up() {
        let meta = PaginationMeta::new(Pagination { page: 1, limit: 20 }, 41);
        assert_eq!(meta.total_pages, 3);

        let meta = PaginationMeta::new(Pagination { page: 1, limit: 20 }, 0);
        assert_eq!(meta.total_pages, 0);
    }
}
