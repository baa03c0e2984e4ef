//! Abstract query descriptor shared by both backend translations.
//!
//! A query is a set of key facets plus [`QueryOptions`]. The key-value
//! translation resolves the index to a named query proxy; the relational
//! translation lowers facets to column filters. Both loop pagination
//! through an opaque cursor.

use serde_json::Value;

///
/// OrderDirection
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum OrderDirection {
    Asc,
    #[default]
    Desc,
}

impl OrderDirection {
    #[must_use]
    pub const fn is_ascending(self) -> bool {
        matches!(self, Self::Asc)
    }
}

///
/// Between
/// Inclusive range condition on one non-key attribute.
///

#[derive(Clone, Debug)]
pub struct Between {
    pub attribute: String,
    pub start: Value,
    pub end: Value,
}

impl Between {
    #[must_use]
    pub fn new(attribute: impl Into<String>, start: impl Into<Value>, end: impl Into<Value>) -> Self {
        Self {
            attribute: attribute.into(),
            start: start.into(),
            end: end.into(),
        }
    }
}

///
/// WhereClause
/// Post-key filter predicate, translated natively by each backend.
///

#[derive(Clone, Debug)]
pub enum WhereClause {
    /// Attribute equals value.
    Eq(String, Value),
    /// List attribute contains value.
    Contains(String, Value),
}

///
/// QueryOptions
///
/// Options accepted by every query operation. `fetch_all_pages` defaults to
/// on when no limit is set and off otherwise; `cursor` resumes a previous
/// paged query.
///

#[derive(Clone, Debug, Default)]
pub struct QueryOptions {
    pub index: Option<String>,
    pub order: OrderDirection,
    pub limit: Option<usize>,
    pub attributes: Option<Vec<String>>,
    pub between: Option<Between>,
    pub filters: Vec<WhereClause>,
    pub fetch_all_pages: Option<bool>,
    pub cursor: Option<String>,
}

impl QueryOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn index(mut self, index: impl Into<String>) -> Self {
        self.index = Some(index.into());
        self
    }

    #[must_use]
    pub const fn order(mut self, order: OrderDirection) -> Self {
        self.order = order;
        self
    }

    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub fn attributes<S: Into<String>>(mut self, attributes: impl IntoIterator<Item = S>) -> Self {
        self.attributes = Some(attributes.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn between(mut self, between: Between) -> Self {
        self.between = Some(between);
        self
    }

    #[must_use]
    pub fn filter(mut self, clause: WhereClause) -> Self {
        self.filters.push(clause);
        self
    }

    #[must_use]
    pub const fn fetch_all_pages(mut self, fetch: bool) -> Self {
        self.fetch_all_pages = Some(fetch);
        self
    }

    #[must_use]
    pub fn cursor(mut self, cursor: impl Into<String>) -> Self {
        self.cursor = Some(cursor.into());
        self
    }

    /// Pagination policy: loop all pages when explicitly requested, or when
    /// no explicit limit was given and looping was not explicitly disabled.
    #[must_use]
    pub const fn should_fetch_all_pages(&self) -> bool {
        match self.fetch_all_pages {
            Some(fetch) => fetch,
            None => self.limit.is_none(),
        }
    }
}

///
/// Paged
/// Result page with the continuation cursor, when one exists.
///

#[derive(Clone, Debug)]
pub struct Paged<T> {
    pub data: Vec<T>,
    pub cursor: Option<String>,
}

impl<T> Paged<T> {
    #[must_use]
    pub const fn new(data: Vec<T>, cursor: Option<String>) -> Self {
        Self { data, cursor }
    }

    /// Consume this page and return `(data, cursor)`.
    #[must_use]
    pub fn into_parts(self) -> (Vec<T>, Option<String>) {
        (self.data, self.cursor)
    }
}
