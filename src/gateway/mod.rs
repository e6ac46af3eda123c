//! Remote store gateway: the capability surface the feed engine consumes.
//!
//! A gateway exposes filtered read, insert and update against the facts
//! table, plus upload and public-URL resolution against a blob container.
//! Two implementations ship with the crate:
//!
//! - [`RestGateway`]: PostgREST table API and object storage API over HTTP
//! - [`crate::storage::Database`]: a local SQLite store with the same contract

mod rest;
#[cfg(test)]
pub(crate) mod testing;

pub use rest::RestGateway;

use crate::filter::FactQuery;
use crate::model::{Fact, FactId, FactPatch, NewFact};
use crate::util::UrlValidationError;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Default name of the facts table.
pub const FACTS_TABLE: &str = "facts";
/// Default name of the image blob container.
pub const IMAGE_CONTAINER: &str = "fact-images";

/// Upload progress callback, called with a percentage in `0..=100`.
///
/// Advisory only: it may be called from the transport while the body is
/// being streamed and must not block.
pub type ProgressFn = Arc<dyn Fn(u8) + Send + Sync>;

/// Options for a blob upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOptions {
    /// Cache lifetime in seconds, sent as `cache-control: max-age=...`.
    pub cache_control: String,
    /// Replace an existing object of the same name instead of failing.
    pub overwrite: bool,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            cache_control: "3600".to_string(),
            overwrite: false,
        }
    }
}

/// Errors from a gateway call.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Network-level error (DNS, connection, TLS, timeout)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),

    /// Non-2xx response, with the server's message when it sent one
    #[error("HTTP error {status}: {message}")]
    HttpStatus { status: u16, message: String },

    /// Response body was not the expected JSON
    #[error("Malformed response: {0}")]
    Decode(#[from] serde_json::Error),

    /// Response body exceeded the size limit
    #[error("Response too large (exceeds {0} bytes)")]
    ResponseTooLarge(usize),

    /// Local store failure
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// No row with this id
    #[error("Fact {0} not found")]
    NotFound(FactId),

    /// An object with this name already exists and overwrite was off
    #[error("Object already exists: {0}")]
    Conflict(String),

    /// The store base URL was rejected
    #[error("Invalid store URL: {0}")]
    InvalidStoreUrl(#[from] UrlValidationError),
}

/// Abstract remote store.
///
/// Every method is a suspension point; callers resume only once the remote
/// call has settled.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Filtered, ordered, capped read of the facts table.
    async fn read_facts(&self, query: &FactQuery) -> Result<Vec<Fact>, GatewayError>;

    /// Insert one row and return it as stored (with its new id).
    async fn insert_fact(&self, fact: &NewFact) -> Result<Fact, GatewayError>;

    /// Apply a partial update to the row with `id` and return the updated row.
    async fn update_fact(&self, id: FactId, patch: &FactPatch) -> Result<Fact, GatewayError>;

    /// Store `bytes` as `object` inside `container`.
    async fn upload_blob(
        &self,
        container: &str,
        object: &str,
        bytes: Vec<u8>,
        content_type: &str,
        options: &UploadOptions,
        progress: Option<ProgressFn>,
    ) -> Result<(), GatewayError>;

    /// Public URL of an object. Pure string construction, no request.
    fn public_url(&self, container: &str, object: &str) -> String;
}
