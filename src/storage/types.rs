use crate::model::{Category, Fact, FactId};
use chrono::{DateTime, Utc};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another process has locked the database
    #[error("The fact database is locked by another process. Please close it and try again.")]
    InstanceLocked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

/// SQLITE_BUSY, SQLITE_LOCKED and SQLITE_CANTOPEN primary result codes.
const LOCK_RESULT_CODES: [i32; 3] = [5, 6, 14];

impl DatabaseError {
    /// Map a sqlx error, recognising another process holding the file.
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        if is_lock_error(&err) {
            return DatabaseError::InstanceLocked;
        }
        DatabaseError::Other(err)
    }
}

/// Extended result codes keep the primary code in the low byte
/// (`SQLITE_BUSY_SNAPSHOT` is 517 = 5 | 2 << 8).
fn is_lock_error(err: &sqlx::Error) -> bool {
    let sqlx::Error::Database(db_err) = err else {
        return false;
    };
    db_err
        .code()
        .and_then(|code| code.parse::<i32>().ok())
        .is_some_and(|code| LOCK_RESULT_CODES.contains(&(code & 0xff)))
}

// ============================================================================
// Row Types
// ============================================================================

/// Internal row type for fact queries (used by sqlx FromRow)
/// Converts to Fact via into_fact()
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct FactRow {
    pub id: i64,
    /// Unix milliseconds
    pub created_at: i64,
    pub text: String,
    pub source: String,
    pub category: String,
    pub image_url: String,
    pub votes_interesting: i64,
    pub votes_mindblowing: i64,
    pub votes_false: i64,
}

impl FactRow {
    /// Convert a stored row, or `None` when its category is outside the
    /// closed set (rows written by something other than this crate).
    pub(crate) fn into_fact(self) -> Option<Fact> {
        let Some(category) = Category::from_str_name(&self.category) else {
            tracing::warn!(id = self.id, category = %self.category, "Skipping fact with unknown category");
            return None;
        };
        Some(Fact {
            id: FactId(self.id),
            created_at: DateTime::<Utc>::from_timestamp_millis(self.created_at),
            text: self.text,
            source: self.source,
            category,
            image_url: self.image_url,
            votes_interesting: counter(self.votes_interesting),
            votes_mindblowing: counter(self.votes_mindblowing),
            votes_false: counter(self.votes_false),
        })
    }
}

fn counter(value: i64) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}

/// A stored blob, as read back by [`super::Database::get_blob`].
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct StoredBlob {
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub cache_control: String,
}
