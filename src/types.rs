use std::collections::BTreeMap;
use std::fmt::Display;

use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

use crate::error::Error;
use crate::error::Result;

pub type RecordId = Uuid;
pub type UserId = Uuid;

/// Per-user membership index: favourited item id mapped to the owning user id.
pub type FavouriteSet = BTreeMap<RecordId, UserId>;

/// Name of the synthetic category items fall into when they have no category of their own.
pub const NO_CATEGORY: &str = "NoCategory";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Item,
    Category,
}

impl Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordKind::Item => write!(f, "item"),
            RecordKind::Category => write!(f, "category"),
        }
    }
}

/// A catalog record. Items and categories share the shape; categories keep `price` at zero and have no
/// `category`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Record {
    #[serde(rename = "i")]
    pub id:          RecordId,
    #[serde(rename = "n")]
    pub name:        String,
    #[serde(rename = "p")]
    pub price:       f64,
    #[serde(rename = "c")]
    pub category:    Option<String>,
    #[serde(rename = "d")]
    pub description: String,
    #[serde(rename = "v")]
    pub vendor:      String,
    #[serde(rename = "m")]
    pub images:      Vec<String>,
}

impl Record {
    pub fn item<N: ToString, C: ToString>(name: N, price: f64, category: C) -> Self {
        Self {
            id:          Uuid::new_v4(),
            name:        name.to_string(),
            price,
            category:    Some(category.to_string()),
            description: String::new(),
            vendor:      String::new(),
            images:      Vec::new(),
        }
    }

    pub fn category<N: ToString>(name: N) -> Self {
        Self {
            id:          Uuid::new_v4(),
            name:        name.to_string(),
            price:       0.0,
            category:    None,
            description: String::new(),
            vendor:      String::new(),
            images:      Vec::new(),
        }
    }

    pub fn with_id(mut self, id: RecordId) -> Self {
        self.id = id;
        self
    }

    pub fn with_description<S: ToString>(mut self, description: S) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn with_vendor<S: ToString>(mut self, vendor: S) -> Self {
        self.vendor = vendor.to_string();
        self
    }

    /// The category an item is filed under. Items without one belong to [`NO_CATEGORY`].
    pub fn category_name(&self) -> &str {
        self.category.as_deref().unwrap_or(NO_CATEGORY)
    }
}

/// A normalised, non-empty filter string.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Filter(String);

impl Filter {
    pub fn new<S: AsRef<str>>(raw: S) -> Result<Self> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            return Err(Error::invalid("filter must not be empty"));
        }
        Ok(Self(trimmed.to_string()))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Filter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewKind {
    ItemsAll,
    ItemsByCategory,
    ItemsBySearch,
    FavouritesForUser,
    Categories,
}

/// A logical collection. The filter travels inside the variant, so a kind can't be paired with the wrong filter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum View {
    ItemsAll,
    ItemsByCategory(Filter),
    ItemsBySearch(Filter),
    Favourites(UserId),
    Categories,
}

impl View {
    /// Build a view from a loosely typed `(kind, filter)` pair as it comes from the transport layer.
    pub fn from_parts(kind: ViewKind, filter: Option<&str>) -> Result<Self> {
        Ok(match (kind, filter) {
            (ViewKind::ItemsAll, None) => View::ItemsAll,
            (ViewKind::Categories, None) => View::Categories,
            (ViewKind::ItemsByCategory, Some(f)) => View::ItemsByCategory(Filter::new(f)?),
            (ViewKind::ItemsBySearch, Some(f)) => View::ItemsBySearch(Filter::new(f)?),
            (ViewKind::FavouritesForUser, Some(f)) => View::Favourites(
                Uuid::parse_str(f.trim()).map_err(|e| Error::invalid(format!("bad user id '{f}': {e}")))?,
            ),
            (kind, Some(f)) => return Err(Error::invalid(format!("{kind:?} does not take a filter, got '{f}'"))),
            (kind, None) => return Err(Error::invalid(format!("{kind:?} requires a filter"))),
        })
    }

    pub fn category<S: AsRef<str>>(name: S) -> Result<Self> {
        Ok(View::ItemsByCategory(Filter::new(name)?))
    }

    pub fn search<S: AsRef<str>>(term: S) -> Result<Self> {
        Ok(View::ItemsBySearch(Filter::new(term)?))
    }

    pub fn kind(&self) -> ViewKind {
        match self {
            View::ItemsAll => ViewKind::ItemsAll,
            View::ItemsByCategory(_) => ViewKind::ItemsByCategory,
            View::ItemsBySearch(_) => ViewKind::ItemsBySearch,
            View::Favourites(_) => ViewKind::FavouritesForUser,
            View::Categories => ViewKind::Categories,
        }
    }

    /// Kind of records the view holds.
    pub fn record_kind(&self) -> RecordKind {
        match self {
            View::Categories => RecordKind::Category,
            _ => RecordKind::Item,
        }
    }
}

impl Display for View {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            View::ItemsAll => write!(f, "items"),
            View::ItemsByCategory(c) => write!(f, "items in '{c}'"),
            View::ItemsBySearch(t) => write!(f, "items matching '{t}'"),
            View::Favourites(u) => write!(f, "favourites of {u}"),
            View::Categories => write!(f, "categories"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationOp {
    Create,
    Update,
    Delete,
}

/// Snapshot of a committed store mutation, handed to the invalidator.
#[derive(Debug, Clone, PartialEq)]
pub struct Mutation {
    pub kind:    RecordKind,
    pub op:      MutationOp,
    pub old:     Option<Record>,
    pub new:     Option<Record>,
    /// Users that held the record among their favourites right before the mutation.
    pub holders: Vec<UserId>,
}

impl Mutation {
    pub fn created(kind: RecordKind, new: Record) -> Self {
        Self {
            kind,
            op: MutationOp::Create,
            old: None,
            new: Some(new),
            holders: Vec::new(),
        }
    }

    pub fn updated(kind: RecordKind, old: Record, new: Record) -> Self {
        Self {
            kind,
            op: MutationOp::Update,
            old: Some(old),
            new: Some(new),
            holders: Vec::new(),
        }
    }

    pub fn deleted(kind: RecordKind, old: Record) -> Self {
        Self {
            kind,
            op: MutationOp::Delete,
            old: Some(old),
            new: None,
            holders: Vec::new(),
        }
    }

    pub fn with_holders(mut self, holders: Vec<UserId>) -> Self {
        self.holders = holders;
        self
    }

    /// Id of the record the mutation is about.
    pub fn record_id(&self) -> Option<RecordId> {
        self.new.as_ref().or(self.old.as_ref()).map(|r| r.id)
    }
}
