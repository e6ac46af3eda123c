use std::collections::HashSet;
use std::sync::Arc;

use crate::error::ErrorKind;
use crate::model::{Fact, FactId};

/// The client-visible fact list and its load status.
///
/// Facts are only ever changed through [`replace_all`](Self::replace_all),
/// [`prepend_one`](Self::prepend_one) and [`replace_by_id`](Self::replace_by_id),
/// each of which keeps ids unique.
#[derive(Debug, Clone, Default)]
pub struct FeedState {
    facts: Arc<Vec<Fact>>,
    loading: bool,
    last_error: Option<ErrorKind>,
}

impl FeedState {
    /// Shared snapshot of the list. Cheap to clone.
    pub fn facts(&self) -> Arc<Vec<Fact>> {
        Arc::clone(&self.facts)
    }

    pub fn as_slice(&self) -> &[Fact] {
        &self.facts
    }

    pub fn get(&self, id: FactId) -> Option<&Fact> {
        self.facts.iter().find(|f| f.id == id)
    }

    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    pub fn loading(&self) -> bool {
        self.loading
    }

    pub fn last_error(&self) -> Option<ErrorKind> {
        self.last_error
    }

    pub(crate) fn set_loading(&mut self, loading: bool) {
        self.loading = loading;
    }

    pub(crate) fn set_error(&mut self, kind: ErrorKind) {
        self.last_error = Some(kind);
    }

    pub(crate) fn clear_error(&mut self) {
        self.last_error = None;
    }

    /// Replace the whole list. Later duplicates of an id are dropped.
    pub(crate) fn replace_all(&mut self, facts: Vec<Fact>) {
        let mut seen = HashSet::with_capacity(facts.len());
        let mut facts = facts;
        facts.retain(|f| seen.insert(f.id));
        self.facts = Arc::new(facts);
    }

    /// Put `fact` at the front, removing any older entry with the same id.
    pub(crate) fn prepend_one(&mut self, fact: Fact) {
        let facts = Arc::make_mut(&mut self.facts);
        facts.retain(|f| f.id != fact.id);
        facts.insert(0, fact);
    }

    /// Swap in the confirmed row for an id already in the list, keeping its
    /// position. Returns `false` (and changes nothing) when the id is absent.
    pub(crate) fn replace_by_id(&mut self, fact: Fact) -> bool {
        let Some(idx) = self.facts.iter().position(|f| f.id == fact.id) else {
            return false;
        };
        Arc::make_mut(&mut self.facts)[idx] = fact;
        true
    }
}
