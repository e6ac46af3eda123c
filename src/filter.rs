//! Feed filter state and the read request derived from it.

use crate::model::{Category, CategoryFilter, Fact, VoteCounter};

/// Hard cap on rows returned by a single feed read.
pub const FEED_LIMIT: usize = 1000;

/// The active category selector and search text.
///
/// Pure data: equality is the change detector.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct FilterState {
    pub category: CategoryFilter,
    /// Case-insensitive substring of the fact text. Empty means no text filter.
    pub search_text: String,
}

impl FilterState {
    pub fn new(category: CategoryFilter, search_text: impl Into<String>) -> Self {
        Self {
            category,
            search_text: search_text.into(),
        }
    }

    pub fn with_category(mut self, category: impl Into<CategoryFilter>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_search(mut self, search_text: impl Into<String>) -> Self {
        self.search_text = search_text.into();
        self
    }

    /// Build the read request for this filter.
    pub fn query(&self) -> FactQuery {
        FactQuery {
            category: self.category.category(),
            text_contains: (!self.search_text.is_empty()).then(|| self.search_text.clone()),
            order_by: VoteCounter::Interesting,
            descending: true,
            limit: FEED_LIMIT,
        }
    }
}

impl From<Category> for FilterState {
    fn from(category: Category) -> Self {
        FilterState::default().with_category(category)
    }
}

/// A filtered, ordered, capped read against the facts table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FactQuery {
    /// Equality filter on `category`; `None` reads every category.
    pub category: Option<Category>,
    /// Literal, case-insensitive substring filter on `text`.
    pub text_contains: Option<String>,
    pub order_by: VoteCounter,
    pub descending: bool,
    pub limit: usize,
}

impl FactQuery {
    /// Whether a fact satisfies this query's filters (ordering and limit aside).
    pub fn matches(&self, fact: &Fact) -> bool {
        if let Some(category) = self.category {
            if fact.category != category {
                return false;
            }
        }
        match &self.text_contains {
            Some(needle) => fact.text.to_lowercase().contains(&needle.to_lowercase()),
            None => true,
        }
    }
}

/// Escape POSIX regex metacharacters so user text matches literally.
///
/// PostgREST's `ilike` turns every `*` into a wildcard, so the REST gateway
/// searches with `imatch` (`~*`) and an escaped needle instead.
pub fn escape_regex(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(
            c,
            '\\' | '.' | '^' | '$' | '*' | '+' | '?' | '(' | ')' | '[' | ']' | '{' | '}' | '|'
        ) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
