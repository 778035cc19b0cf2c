use std::sync::Arc;

use super::cache::RowCache;
use super::error::Result;
use super::rows::{Row, project_rows};
use crate::model::ItemPage;

pub const DEFAULT_PAGE_SIZE: usize = 200;

/// Normalized listing request: 1-based page, positive page size and an
/// optional column projection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub page: usize,
    pub page_size: usize,
    pub columns: Vec<String>,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
            columns: Vec::new(),
        }
    }
}

impl PageRequest {
    /// Builds a request from raw query values. Numbers are read from their
    /// leading digits; missing or non-numeric values take their defaults and
    /// anything below 1 becomes 1. `columns` is
    /// comma-separated; empty names are dropped.
    pub fn from_raw(page: Option<&str>, page_size: Option<&str>, columns: Option<&str>) -> Self {
        Self {
            page: parse_at_least_one(page, 1),
            page_size: parse_at_least_one(page_size, DEFAULT_PAGE_SIZE),
            columns: columns
                .unwrap_or_default()
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(ToOwned::to_owned)
                .collect(),
        }
    }

    fn window(&self, total: usize) -> (usize, usize) {
        let start = (self.page - 1).saturating_mul(self.page_size).min(total);
        let end = start.saturating_add(self.page_size).min(total);
        (start, end)
    }
}

/// Leading integer of `raw`, as JavaScript's `parseInt` reads it: `2abc` is 2
/// and `10.5` is 10. No leading digits means `default`; negatives and zero
/// become 1.
fn parse_at_least_one(raw: Option<&str>, default: usize) -> usize {
    let value = raw.unwrap_or_default().trim_start();
    let (negative, unsigned) = match value.as_bytes().first() {
        Some(b'-') => (true, &value[1..]),
        Some(b'+') => (false, &value[1..]),
        _ => (false, value),
    };
    let digits = unsigned
        .find(|ch: char| !ch.is_ascii_digit())
        .map_or(unsigned, |end| &unsigned[..end]);
    if digits.is_empty() {
        return default;
    }
    if negative {
        return 1;
    }
    digits.parse::<usize>().unwrap_or(usize::MAX).max(1)
}

/// Serves dataset rows out of an injected row cache.
#[derive(Debug, Clone)]
pub struct ItemService {
    cache: Arc<RowCache>,
}

impl ItemService {
    pub fn new(cache: Arc<RowCache>) -> Self {
        Self { cache }
    }

    /// One page of rows plus the full dataset size. Pages past the end are
    /// empty, not errors.
    pub fn list_items(&self, request: &PageRequest) -> Result<ItemPage> {
        let all = self.cache.get()?;
        let total = all.len();
        let (start, end) = request.window(total);
        let window = &all[start..end];

        let rows = if request.columns.is_empty() {
            window.to_vec()
        } else {
            project_rows(window, &request.columns)
        };

        Ok(ItemPage {
            total,
            page: request.page,
            page_size: request.page_size,
            rows,
        })
    }

    /// Every row with every column, unpaginated.
    pub fn list_all(&self) -> Result<Arc<Vec<Row>>> {
        self.cache.get()
    }
}
