//! Total ordering of records within a view.

use std::cmp::Ordering;
use std::fmt::Display;

use tracing::warn;

use crate::types::Record;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SortType {
    #[default]
    Name,
    Price,
}

impl SortType {
    pub fn literal(&self) -> &'static str {
        match self {
            SortType::Name => "name",
            SortType::Price => "price",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.eq_ignore_ascii_case("name") {
            Some(SortType::Name)
        }
        else if raw.eq_ignore_ascii_case("price") {
            Some(SortType::Price)
        }
        else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn literal(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.eq_ignore_ascii_case("asc") {
            Some(SortOrder::Asc)
        }
        else if raw.eq_ignore_ascii_case("desc") {
            Some(SortOrder::Desc)
        }
        else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Sort {
    pub sort_type: SortType,
    pub order:     SortOrder,
}

impl Sort {
    pub const NAME_ASC: Sort = Sort::new(SortType::Name, SortOrder::Asc);
    pub const NAME_DESC: Sort = Sort::new(SortType::Name, SortOrder::Desc);
    pub const PRICE_ASC: Sort = Sort::new(SortType::Price, SortOrder::Asc);
    pub const PRICE_DESC: Sort = Sort::new(SortType::Price, SortOrder::Desc);

    /// Every sort a multi-sort view is cached under.
    pub const ALL: [Sort; 4] = [Sort::NAME_ASC, Sort::NAME_DESC, Sort::PRICE_ASC, Sort::PRICE_DESC];

    pub const fn new(sort_type: SortType, order: SortOrder) -> Self {
        Self { sort_type, order }
    }

    /// Parse user supplied sort strings. Missing parts take their defaults; an unrecognised part makes the whole pair
    /// fall back to name/asc.
    pub fn parse(sort_type: Option<&str>, order: Option<&str>) -> Self {
        let parsed_type = sort_type.map_or(Some(SortType::default()), SortType::parse);
        let parsed_order = order.map_or(Some(SortOrder::default()), SortOrder::parse);

        match (parsed_type, parsed_order) {
            (Some(sort_type), Some(order)) => Sort::new(sort_type, order),
            _ => {
                warn!(
                    sort_type = sort_type.unwrap_or_default(),
                    sort_order = order.unwrap_or_default(),
                    "unknown sort parameters, falling back to name/asc"
                );
                Sort::NAME_ASC
            }
        }
    }

    pub fn compare(&self, a: &Record, b: &Record) -> Ordering {
        let ord = match self.sort_type {
            SortType::Name => a.name.cmp(&b.name),
            SortType::Price => a.price.total_cmp(&b.price),
        };
        match self.order {
            SortOrder::Asc => ord,
            SortOrder::Desc => ord.reverse(),
        }
    }

    /// Stable in-place sort; records comparing equal keep their relative order.
    pub fn apply(&self, records: &mut [Record]) {
        records.sort_by(|a, b| self.compare(a, b));
    }

    pub fn is_sorted(&self, records: &[Record]) -> bool {
        records
            .windows(2)
            .all(|pair| self.compare(&pair[0], &pair[1]) != Ordering::Greater)
    }
}

impl Display for Sort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.sort_type.literal(), self.order.literal())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(name: &str, price: f64) -> Record {
        Record::item(name, price, "X")
    }

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!(Sort::parse(Some("PRICE"), Some("Desc")), Sort::PRICE_DESC);
        assert_eq!(Sort::parse(Some(" name "), None), Sort::NAME_ASC);
        assert_eq!(Sort::parse(None, Some("desc")), Sort::NAME_DESC);
    }

    #[test]
    fn unknown_parts_fall_back_to_name_asc() {
        assert_eq!(Sort::parse(Some("rating"), Some("desc")), Sort::NAME_ASC);
        assert_eq!(Sort::parse(Some("price"), Some("sideways")), Sort::NAME_ASC);
    }

    #[test]
    fn equal_keys_keep_insertion_order() {
        let mut records = vec![rec("b", 1.0), rec("a", 2.0), rec("c", 1.0), rec("d", 2.0)];
        let ids = records.iter().map(|r| r.id).collect::<Vec<_>>();

        Sort::PRICE_ASC.apply(&mut records);
        assert_eq!(
            records.iter().map(|r| r.id).collect::<Vec<_>>(),
            vec![ids[0], ids[2], ids[1], ids[3]]
        );

        Sort::PRICE_DESC.apply(&mut records);
        assert_eq!(
            records.iter().map(|r| r.id).collect::<Vec<_>>(),
            vec![ids[1], ids[3], ids[0], ids[2]]
        );
    }

    #[test]
    fn name_order_is_case_sensitive() {
        let mut records = vec![rec("apple", 1.0), rec("Banana", 1.0)];
        Sort::NAME_ASC.apply(&mut records);
        assert_eq!(records[0].name, "Banana");
        assert!(Sort::NAME_ASC.is_sorted(&records));
        assert!(!Sort::NAME_DESC.is_sorted(&records));
    }
}
