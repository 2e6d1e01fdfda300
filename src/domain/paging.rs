// Pagination for list endpoints
use serde::Serialize;

pub const DEFAULT_LIMIT: usize = 10;
pub const MAX_LIMIT: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub limit: usize,
    pub skip: usize,
}

impl PageRequest {
    /// A limit outside [1, MAX_LIMIT] falls back to the default, a negative skip to zero
    pub fn new(limit: Option<i64>, skip: Option<i64>) -> Self {
        let limit = match limit {
            Some(l) if l >= 1 && l <= MAX_LIMIT as i64 => l as usize,
            _ => DEFAULT_LIMIT,
        };
        let skip = skip.filter(|s| *s > 0).map(|s| s as usize).unwrap_or(0);
        Self { limit, skip }
    }

    /// Slice one page out of an already ordered sequence
    pub fn apply<T>(&self, items: impl IntoIterator<Item = T>) -> Vec<T> {
        items.into_iter().skip(self.skip).take(self.limit).collect()
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            skip: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub total: usize,
    pub limit: usize,
    pub skip: usize,
    pub data: Vec<T>,
}

impl<T> Page<T> {
    pub fn new(total: usize, request: PageRequest, data: Vec<T>) -> Self {
        Self {
            total,
            limit: request.limit,
            skip: request.skip,
            data,
        }
    }
}
