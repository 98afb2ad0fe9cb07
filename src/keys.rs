//! Cache key derivation.
//!
//! A blob key is `<prefix><sort type><sort order>`, a count key is `<prefix>Quantity` and a favourites id-set key
//! is `<user id>Fav`. Prefixes:
//!
//! | View | Prefix |
//! | ---- | ------ |
//! | all items | `ItemsList` |
//! | items of a category | `Category:<name>` |
//! | search results | `Search:<generation>:<term>` |
//! | favourites of a user | `<user id>` |
//! | categories | `CategoriesList` |
//!
//! Filtered prefixes carry a tag so that user controlled strings can't produce a key of another view. The suffixes
//! have a fixed shape, so two different `(view, sort)` pairs never render to the same key.
//!
//! Search results can't be patched, so they are cached within a search generation kept under
//! [`search_generation_key`]. The generation is a random number rendered as 16 hex digits; replacing it orphans
//! every search entry of the old one.

use std::fmt::Display;

use uuid::Uuid;

use crate::sort::Sort;
use crate::types::UserId;
use crate::types::View;

const ITEMS_LIST: &str = "ItemsList";
const CATEGORIES_LIST: &str = "CategoriesList";
const CATEGORY_TAG: &str = "Category:";
const SEARCH_TAG: &str = "Search:";
const QUANTITY: &str = "Quantity";
const FAVOURITES: &str = "Fav";
const SEARCH_GENERATION: &str = "SearchGeneration";

/// Generation of cached search results.
pub type SearchGeneration = u64;

/// Generation search views are keyed with when none is known. It is never issued.
pub const NO_GENERATION: SearchGeneration = 0;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Keys of one view: a blob per sort plus the count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewKeys {
    prefix: String,
}

impl ViewKeys {
    /// `generation` only takes part in the keys of search views.
    pub fn new(view: &View, generation: SearchGeneration) -> Self {
        let prefix = match view {
            View::ItemsAll => ITEMS_LIST.to_string(),
            View::ItemsByCategory(name) => format!("{CATEGORY_TAG}{name}"),
            View::ItemsBySearch(term) => format!("{SEARCH_TAG}{generation:016x}:{term}"),
            View::Favourites(user) => user.to_string(),
            View::Categories => CATEGORIES_LIST.to_string(),
        };
        Self { prefix }
    }

    pub fn blob(&self, sort: Sort) -> CacheKey {
        CacheKey(format!(
            "{}{}{}",
            self.prefix,
            sort.sort_type.literal(),
            sort.order.literal()
        ))
    }

    pub fn count(&self) -> CacheKey {
        CacheKey(format!("{}{QUANTITY}", self.prefix))
    }
}

/// Blob key of a view. Search views need their generation, see [`ViewKeys`].
pub fn blob_key(view: &View, sort: Sort) -> CacheKey {
    ViewKeys::new(view, NO_GENERATION).blob(sort)
}

/// Count key of a view. Search views need their generation, see [`ViewKeys`].
pub fn count_key(view: &View) -> CacheKey {
    ViewKeys::new(view, NO_GENERATION).count()
}

pub fn favourites_key(user: &UserId) -> CacheKey {
    CacheKey(format!("{user}{FAVOURITES}"))
}

/// A random generation, so one issued after the current entry got lost can't bring old search entries back.
pub(crate) fn fresh_search_generation() -> SearchGeneration {
    let (high, low) = Uuid::new_v4().as_u64_pair();
    (high ^ low).max(1)
}

pub fn search_generation_key() -> CacheKey {
    CacheKey(SEARCH_GENERATION.to_string())
}

/// Sorts a view is cached under. Categories are only ever listed by name, ascending.
pub fn sorts_of(view: &View) -> &'static [Sort] {
    const NAME_ASC_ONLY: [Sort; 1] = [Sort::NAME_ASC];
    match view {
        View::Categories => &NAME_ASC_ONLY,
        _ => &Sort::ALL,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn literal_layout() {
        let user = Uuid::nil();
        assert_eq!(blob_key(&View::ItemsAll, Sort::PRICE_ASC).as_str(), "ItemsListpriceasc");
        assert_eq!(count_key(&View::ItemsAll).as_str(), "ItemsListQuantity");
        assert_eq!(
            blob_key(&View::category("X").unwrap(), Sort::NAME_DESC).as_str(),
            "Category:Xnamedesc"
        );
        assert_eq!(
            favourites_key(&user).as_str(),
            "00000000-0000-0000-0000-000000000000Fav"
        );
        assert_eq!(
            blob_key(&View::Favourites(user), Sort::NAME_ASC).as_str(),
            "00000000-0000-0000-0000-000000000000nameasc"
        );
    }

    #[test]
    fn same_inputs_same_key() {
        let a = blob_key(&View::search("  lamp ").unwrap(), Sort::PRICE_DESC);
        let b = blob_key(&View::search("lamp").unwrap(), Sort::PRICE_DESC);
        assert_eq!(a, b);
    }

    #[test]
    fn user_strings_do_not_collide_with_other_views() {
        let views = [
            View::ItemsAll,
            View::Categories,
            View::category("ItemsList").unwrap(),
            View::search("ItemsList").unwrap(),
            View::category("lamp").unwrap(),
            View::search("lamp").unwrap(),
            View::category("Search:lamp").unwrap(),
            View::Favourites(Uuid::nil()),
        ];

        let mut seen = HashSet::new();
        for view in &views {
            for sort in Sort::ALL {
                assert!(seen.insert(blob_key(view, sort)), "duplicate key for {view} {sort}");
            }
            assert!(seen.insert(count_key(view)), "duplicate count key for {view}");
        }
        assert!(seen.insert(favourites_key(&Uuid::nil())));
        assert!(seen.insert(search_generation_key()));
    }

    #[test]
    fn search_keys_follow_the_generation() {
        let view = View::search("lamp").unwrap();
        let old = ViewKeys::new(&view, 0x2a);
        let new = ViewKeys::new(&view, 0x2b);
        assert_eq!(old.count().as_str(), "Search:000000000000002a:lampQuantity");
        assert_ne!(old.blob(Sort::NAME_ASC), new.blob(Sort::NAME_ASC));
        assert_ne!(old.count(), new.count());

        // Other views don't care.
        assert_eq!(
            ViewKeys::new(&View::ItemsAll, 0x2a),
            ViewKeys::new(&View::ItemsAll, NO_GENERATION)
        );
    }
}
