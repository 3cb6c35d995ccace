//! OFFSET-then-LIMIT windowing over an ordered result
//!
//! A [`Window`] is applied exactly once, to a single ordered sequence:
//! skip `offset` leading items, then keep at most `limit` of the rest.

use serde::Deserialize;

use crate::error::{CollectionError, Result};

/// Raw `limit`/`offset` query parameters, before validation.
#[derive(Debug, Default, Clone, Copy, Deserialize)]
pub struct PageQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    offset: u64,
    limit: Option<u64>,
}

impl Window {
    /// No bounds: every element.
    pub const fn all() -> Self {
        Self {
            offset: 0,
            limit: None,
        }
    }

    /// Build a window from optional client bounds; negatives are rejected.
    pub fn new(offset: Option<i64>, limit: Option<i64>) -> Result<Self> {
        let offset = match offset {
            Some(v) => u64::try_from(v).map_err(|_| {
                CollectionError::InvalidInput(format!("offset must be non-negative, got {v}"))
            })?,
            None => 0,
        };
        let limit = limit
            .map(|v| {
                u64::try_from(v).map_err(|_| {
                    CollectionError::InvalidInput(format!("limit must be non-negative, got {v}"))
                })
            })
            .transpose()?;
        Ok(Self { offset, limit })
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn limit(&self) -> Option<u64> {
        self.limit
    }

    /// Window an already ordered sequence.
    pub fn apply<I>(&self, ordered: I) -> impl Iterator<Item = I::Item>
    where
        I: IntoIterator,
    {
        let skip = usize::try_from(self.offset).unwrap_or(usize::MAX);
        let take = self
            .limit
            .map_or(usize::MAX, |l| usize::try_from(l).unwrap_or(usize::MAX));
        ordered.into_iter().skip(skip).take(take)
    }

    /// `OFFSET` bind value for SQL backends.
    pub fn sql_offset(&self) -> i64 {
        i64::try_from(self.offset).unwrap_or(i64::MAX)
    }

    /// `LIMIT` bind value for SQL backends; `None` binds NULL, i.e. no limit.
    pub fn sql_limit(&self) -> Option<i64> {
        self.limit.map(|l| i64::try_from(l).unwrap_or(i64::MAX))
    }
}

impl TryFrom<PageQuery> for Window {
    type Error = CollectionError;

    fn try_from(query: PageQuery) -> Result<Self> {
        Self::new(query.offset, query.limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_then_limit() {
        let window = Window::new(Some(3), Some(2)).unwrap();
        let page: Vec<_> = window.apply(0..10).collect();
        assert_eq!(page, vec![3, 4]);
    }

    #[test]
    fn test_unbounded_window_keeps_everything() {
        let page: Vec<_> = Window::all().apply(0..5).collect();
        assert_eq!(page, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_offset_past_end_is_empty() {
        let window = Window::new(Some(20), None).unwrap();
        assert_eq!(window.apply(0..10).count(), 0);
    }

    #[test]
    fn test_zero_limit_is_empty() {
        let window = Window::new(None, Some(0)).unwrap();
        assert_eq!(window.apply(0..10).count(), 0);
    }

    #[test]
    fn test_negative_bounds_rejected() {
        assert!(matches!(
            Window::new(Some(-1), None),
            Err(CollectionError::InvalidInput(_))
        ));
        assert!(matches!(
            Window::new(None, Some(-5)),
            Err(CollectionError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_sql_binds() {
        let window = Window::new(Some(4), None).unwrap();
        assert_eq!(window.sql_offset(), 4);
        assert_eq!(window.sql_limit(), None);
    }
}
