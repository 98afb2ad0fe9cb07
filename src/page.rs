use crate::error::Error;
use crate::error::Result;
use crate::sort::Sort;
use crate::types::Record;

/// Default page size when a query doesn't ask for one.
pub const DEFAULT_LIMIT: usize = 10;
/// A zero limit means "everything" for collections no larger than this.
pub const SMALL_COLLECTION: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub offset: usize,
    pub limit:  usize,
}

impl Page {
    pub fn new(offset: usize, limit: usize) -> Result<Self> {
        if limit == 0 {
            return Err(Error::invalid("limit must be at least 1"));
        }
        Ok(Self { offset, limit })
    }

    /// Slice an ordered sequence. Asking for a page starting at or past the end is an error; a short last page isn't.
    pub fn slice(&self, records: &[Record]) -> Result<Vec<Record>> {
        if self.offset >= records.len() {
            return Err(Error::OutOfRange {
                offset: self.offset,
                total:  records.len(),
            });
        }
        let end = self.offset.saturating_add(self.limit).min(records.len());
        Ok(records[self.offset..end].to_vec())
    }
}

/// Raw list options as they arrive in a query string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    pub offset:     Option<i64>,
    pub limit:      Option<i64>,
    pub sort_type:  Option<String>,
    pub sort_order: Option<String>,
}

impl ListQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn offset(mut self, offset: i64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn sort<T: ToString, O: ToString>(mut self, sort_type: T, sort_order: O) -> Self {
        self.sort_type = Some(sort_type.to_string());
        self.sort_order = Some(sort_order.to_string());
        self
    }

    pub fn resolve_sort(&self) -> Sort {
        Sort::parse(self.sort_type.as_deref(), self.sort_order.as_deref())
    }

    /// Turn the raw options into a page, given the collection size.
    pub fn resolve_page(&self, total: usize) -> Result<Page> {
        let offset = match self.offset {
            None => 0,
            Some(o) if o < 0 => return Err(Error::invalid(format!("offset must not be negative, got {o}"))),
            Some(o) => o as usize,
        };
        let limit = match self.limit {
            None => DEFAULT_LIMIT,
            Some(l) if l < 0 => return Err(Error::invalid(format!("limit must not be negative, got {l}"))),
            Some(0) if total > 0 && total <= SMALL_COLLECTION => total,
            Some(0) => DEFAULT_LIMIT,
            Some(l) => l as usize,
        };
        Page::new(offset, limit)
    }
}

/// One page of a view plus the size of the whole view.
#[derive(Debug, Clone, PartialEq)]
pub struct Listing {
    pub records: Vec<Record>,
    pub total:   u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records(n: usize) -> Vec<Record> {
        (0..n).map(|i| Record::item(format!("r{i:02}"), i as f64, "X")).collect()
    }

    #[test]
    fn short_last_page_is_fine() {
        let all = records(5);
        let page = Page::new(3, 10).unwrap().slice(&all).unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].id, all[3].id);
    }

    #[test]
    fn offset_past_end_is_out_of_range() {
        let all = records(25);
        let err = Page::new(30, 10).unwrap().slice(&all).unwrap_err();
        assert_eq!(err, Error::OutOfRange { offset: 30, total: 25 });
        assert!(Page::new(25, 1).unwrap().slice(&all).is_err());
    }

    #[test]
    fn zero_limit_is_rejected() {
        assert!(matches!(Page::new(0, 0), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn query_defaults() {
        let page = ListQuery::new().resolve_page(100).unwrap();
        assert_eq!(page, Page { offset: 0, limit: 10 });
    }

    #[test]
    fn zero_limit_expands_for_small_collections() {
        assert_eq!(ListQuery::new().limit(0).resolve_page(30).unwrap().limit, 30);
        assert_eq!(ListQuery::new().limit(0).resolve_page(31).unwrap().limit, DEFAULT_LIMIT);
        assert_eq!(ListQuery::new().limit(0).resolve_page(0).unwrap().limit, DEFAULT_LIMIT);
    }

    #[test]
    fn negative_values_are_rejected() {
        assert!(ListQuery::new().offset(-1).resolve_page(10).is_err());
        assert!(ListQuery::new().limit(-5).resolve_page(10).is_err());
    }
}
