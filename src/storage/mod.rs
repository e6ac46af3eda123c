mod facts;
mod preferences;
mod schema;
mod types;

pub use schema::{Database, DEFAULT_PUBLIC_URL_BASE};
pub use types::{DatabaseError, StoredBlob};
