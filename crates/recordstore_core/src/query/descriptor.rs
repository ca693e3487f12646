//! Fetch descriptor value types.
//!
//! # Responsibility
//! - Capture sort order, predicate, property selection, prefetch list and
//!   fetch window for one query.
//!
//! # Invariants
//! - Constructing or cloning a descriptor never touches storage.
//! - A paging window always has `limit > 0`; `offset` is unsigned.
//! - Equality is by field values; predicates compare by shared identity.

use std::fmt::{Debug, Formatter};
use std::num::NonZeroU32;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// One `(field, direction)` ordering key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SortDescriptor {
    pub field: String,
    pub direction: SortDirection,
}

impl SortDescriptor {
    pub fn new(field: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            field: field.into(),
            direction,
        }
    }

    pub fn asc(field: impl Into<String>) -> Self {
        Self::new(field, SortDirection::Ascending)
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self::new(field, SortDirection::Descending)
    }
}

/// Opaque boolean filter over a record value.
pub struct Predicate<M> {
    test: Arc<dyn Fn(&M) -> bool + Send + Sync>,
}

impl<M> Predicate<M> {
    pub fn new<F>(test: F) -> Self
    where
        F: Fn(&M) -> bool + Send + Sync + 'static,
    {
        Self {
            test: Arc::new(test),
        }
    }

    pub fn matches(&self, value: &M) -> bool {
        (self.test)(value)
    }
}

impl<M> Clone for Predicate<M> {
    fn clone(&self) -> Self {
        Self {
            test: Arc::clone(&self.test),
        }
    }
}

impl<M> PartialEq for Predicate<M> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.test, &other.test)
    }
}

impl<M> Debug for Predicate<M> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("Predicate(..)")
    }
}

/// Which properties a fetch should materialize eagerly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PropertySelection {
    #[default]
    All,
    Custom(Vec<String>),
}

/// Slice of the sorted, filtered match list to return.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FetchWindow {
    #[default]
    All,
    Paging { offset: u32, limit: NonZeroU32 },
}

impl FetchWindow {
    /// Returns `None` when `limit` is zero.
    pub fn paging(offset: u32, limit: u32) -> Option<Self> {
        NonZeroU32::new(limit).map(|limit| Self::Paging { offset, limit })
    }

    /// Applies the window to an already sorted and filtered sequence.
    pub(crate) fn apply<T>(&self, items: Vec<T>) -> Vec<T> {
        match *self {
            Self::All => items,
            Self::Paging { offset, limit } => items
                .into_iter()
                .skip(offset as usize)
                .take(limit.get() as usize)
                .collect(),
        }
    }
}

/// Immutable bundle of everything one fetch needs.
pub struct FetchDescriptor<M> {
    pub sort: Vec<SortDescriptor>,
    pub predicate: Option<Predicate<M>>,
    pub properties: PropertySelection,
    pub prefetch: Vec<String>,
    pub window: FetchWindow,
}

impl<M> FetchDescriptor<M> {
    /// Unsorted, unfiltered, unpaged fetch of every record of the type.
    pub fn new() -> Self {
        Self {
            sort: Vec::new(),
            predicate: None,
            properties: PropertySelection::All,
            prefetch: Vec::new(),
            window: FetchWindow::All,
        }
    }

    #[must_use]
    pub fn sorted_by(mut self, sort: SortDescriptor) -> Self {
        self.sort.push(sort);
        self
    }

    #[must_use]
    pub fn filter(mut self, predicate: Predicate<M>) -> Self {
        self.predicate = Some(predicate);
        self
    }

    /// Shorthand for `filter(Predicate::new(test))`.
    #[must_use]
    pub fn filter_by<F>(self, test: F) -> Self
    where
        F: Fn(&M) -> bool + Send + Sync + 'static,
    {
        self.filter(Predicate::new(test))
    }

    #[must_use]
    pub fn properties(mut self, properties: PropertySelection) -> Self {
        self.properties = properties;
        self
    }

    #[must_use]
    pub fn prefetch(mut self, field: impl Into<String>) -> Self {
        self.prefetch.push(field.into());
        self
    }

    #[must_use]
    pub fn window(mut self, window: FetchWindow) -> Self {
        self.window = window;
        self
    }

    /// Field names the descriptor addresses, for schema checks.
    pub(crate) fn referenced_fields(&self) -> impl Iterator<Item = &str> {
        let custom: &[String] = match &self.properties {
            PropertySelection::All => &[],
            PropertySelection::Custom(fields) => fields,
        };
        self.sort
            .iter()
            .map(|sort| sort.field.as_str())
            .chain(custom.iter().map(String::as_str))
            .chain(self.prefetch.iter().map(String::as_str))
    }
}

impl<M> Default for FetchDescriptor<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> Clone for FetchDescriptor<M> {
    fn clone(&self) -> Self {
        Self {
            sort: self.sort.clone(),
            predicate: self.predicate.clone(),
            properties: self.properties.clone(),
            prefetch: self.prefetch.clone(),
            window: self.window,
        }
    }
}

impl<M> PartialEq for FetchDescriptor<M> {
    fn eq(&self, other: &Self) -> bool {
        self.sort == other.sort
            && self.predicate == other.predicate
            && self.properties == other.properties
            && self.prefetch == other.prefetch
            && self.window == other.window
    }
}

impl<M> Debug for FetchDescriptor<M> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchDescriptor")
            .field("sort", &self.sort)
            .field("predicate", &self.predicate)
            .field("properties", &self.properties)
            .field("prefetch", &self.prefetch)
            .field("window", &self.window)
            .finish()
    }
}
