use super::{Gateway, GatewayError, ProgressFn, UploadOptions};
use crate::filter::{escape_regex, FactQuery};
use crate::model::{Fact, FactId, FactPatch, NewFact};
use crate::util::validate_store_url;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{HeaderValue, AUTHORIZATION, CACHE_CONTROL, CONTENT_TYPE};
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Largest response body accepted from the table API.
const MAX_RESPONSE_SIZE: usize = 16 * 1024 * 1024; // 16MB
/// Chunk size of a streamed upload body; one progress tick per chunk.
const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;
/// Longest server error message kept in `GatewayError::HttpStatus`.
const MAX_ERROR_MESSAGE: usize = 300;

/// Gateway over a PostgREST table API and an object storage API that share
/// one base URL (`{base}/rest/v1/...` and `{base}/storage/v1/...`).
///
/// The API key, when configured, is sent as both `apikey` and bearer token.
/// It lives in a `SecretString` and is never logged.
#[derive(Clone)]
pub struct RestGateway {
    client: reqwest::Client,
    base: Arc<str>,
    api_key: Option<SecretString>,
    table: Arc<str>,
}

impl std::fmt::Debug for RestGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestGateway")
            .field("base", &self.base)
            .field("table", &self.table)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl RestGateway {
    /// Build a gateway with its own HTTP client.
    ///
    /// `timeout` of `None` leaves requests unbounded.
    pub fn new(
        base_url: &str,
        api_key: Option<SecretString>,
        table: &str,
        timeout: Option<Duration>,
    ) -> Result<Self, GatewayError> {
        // PERF-019: connection pooling and keepalive
        let mut builder = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(3))
            .pool_max_idle_per_host(4)
            .pool_idle_timeout(Duration::from_secs(30)) // Close idle connections promptly
            .tcp_keepalive(Duration::from_secs(60));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Self::with_client(builder.build()?, base_url, api_key, table)
    }

    /// Build a gateway around an existing client.
    pub fn with_client(
        client: reqwest::Client,
        base_url: &str,
        api_key: Option<SecretString>,
        table: &str,
    ) -> Result<Self, GatewayError> {
        let base = validate_store_url(base_url)?;
        Ok(Self {
            client,
            base: Arc::from(base.as_str().trim_end_matches('/')),
            api_key,
            table: Arc::from(table),
        })
    }

    fn table_url(&self) -> Result<Url, GatewayError> {
        let url = Url::parse(&format!("{}/rest/v1/{}", self.base, self.table))
            .map_err(crate::util::UrlValidationError::from)?;
        Ok(url)
    }

    fn object_url(&self, container: &str, object: &str) -> String {
        format!("{}/storage/v1/object/{}/{}", self.base, container, object)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => {
                tracing::trace!("Store API authentication configured");
                request
                    .header("apikey", key.expose_secret())
                    .header(AUTHORIZATION, format!("Bearer {}", key.expose_secret()))
            }
            None => request,
        }
    }

    /// Send a table request that returns rows (`Prefer: return=representation`).
    async fn fetch_rows(&self, request: reqwest::RequestBuilder) -> Result<Vec<Fact>, GatewayError> {
        let response = self.authorize(request).send().await?;
        let body = read_success_body(response).await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

#[async_trait]
impl Gateway for RestGateway {
    async fn read_facts(&self, query: &FactQuery) -> Result<Vec<Fact>, GatewayError> {
        let mut url = self.table_url()?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("select", "*");
            if let Some(category) = query.category {
                pairs.append_pair("category", &format!("eq.{}", category.name()));
            }
            if let Some(text) = &query.text_contains {
                pairs.append_pair("text", &format!("imatch.{}", escape_regex(text)));
            }
            let direction = if query.descending { "desc" } else { "asc" };
            pairs.append_pair("order", &format!("{}.{}", query.order_by.column(), direction));
            pairs.append_pair("limit", &query.limit.to_string());
        }

        tracing::debug!(
            category = ?query.category,
            text = ?query.text_contains,
            limit = query.limit,
            "Reading facts"
        );
        self.fetch_rows(self.client.get(url)).await
    }

    async fn insert_fact(&self, fact: &NewFact) -> Result<Fact, GatewayError> {
        let body = serde_json::to_vec(&[fact])?;
        let request = self
            .client
            .post(self.table_url()?)
            .header("Prefer", "return=representation")
            .header(CONTENT_TYPE, "application/json")
            .body(body);

        self.fetch_rows(request).await?.into_iter().next().ok_or_else(|| {
            GatewayError::HttpStatus {
                status: 200,
                message: "insert returned no rows".to_string(),
            }
        })
    }

    async fn update_fact(&self, id: FactId, patch: &FactPatch) -> Result<Fact, GatewayError> {
        let mut url = self.table_url()?;
        url.query_pairs_mut().append_pair("id", &format!("eq.{}", id));
        let request = self
            .client
            .patch(url)
            .header("Prefer", "return=representation")
            .header(CONTENT_TYPE, "application/json")
            .body(serde_json::to_vec(patch)?);

        self.fetch_rows(request)
            .await?
            .into_iter()
            .next()
            .ok_or(GatewayError::NotFound(id))
    }

    async fn upload_blob(
        &self,
        container: &str,
        object: &str,
        bytes: Vec<u8>,
        content_type: &str,
        options: &UploadOptions,
        progress: Option<ProgressFn>,
    ) -> Result<(), GatewayError> {
        let total = bytes.len();
        let mut sent = 0usize;
        let chunks: Vec<Vec<u8>> = bytes.chunks(UPLOAD_CHUNK_SIZE).map(<[u8]>::to_vec).collect();

        let chunk_progress = progress.clone();
        let stream = futures::stream::iter(chunks).map(move |chunk| {
            sent += chunk.len();
            if let Some(report) = &chunk_progress {
                report(percent(sent, total));
            }
            Ok::<_, std::io::Error>(chunk)
        });

        let cache_control = HeaderValue::from_str(&format!("max-age={}", options.cache_control))
            .unwrap_or_else(|_| HeaderValue::from_static("max-age=3600"));
        let request = self
            .client
            .post(self.object_url(container, object))
            .header(CONTENT_TYPE, content_type)
            .header(CACHE_CONTROL, cache_control)
            .header("x-upsert", if options.overwrite { "true" } else { "false" })
            .body(reqwest::Body::wrap_stream(stream));

        tracing::debug!(container, object, bytes = total, "Uploading blob");
        let response = self.authorize(request).send().await?;
        read_success_body(response).await.map_err(|e| match e {
            GatewayError::HttpStatus { status: 409, message } => GatewayError::Conflict(message),
            other => other,
        })?;

        if let Some(report) = &progress {
            report(100);
        }
        Ok(())
    }

    fn public_url(&self, container: &str, object: &str) -> String {
        format!("{}/storage/v1/object/public/{}/{}", self.base, container, object)
    }
}

fn percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((done.min(total) * 100) / total) as u8
}

/// Read the body of a 2xx response with a size cap; map anything else to
/// `HttpStatus` carrying the server's message.
async fn read_success_body(response: reqwest::Response) -> Result<Vec<u8>, GatewayError> {
    let status = response.status();

    if let Some(len) = response.content_length() {
        if len as usize > MAX_RESPONSE_SIZE {
            return Err(GatewayError::ResponseTooLarge(MAX_RESPONSE_SIZE));
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        // SEC-003: saturating_add keeps the size check overflow-free
        if bytes.len().saturating_add(chunk.len()) > MAX_RESPONSE_SIZE {
            return Err(GatewayError::ResponseTooLarge(MAX_RESPONSE_SIZE));
        }
        bytes.extend_from_slice(&chunk);
    }

    if !status.is_success() {
        return Err(GatewayError::HttpStatus {
            status: status.as_u16(),
            message: error_message(&bytes),
        });
    }
    Ok(bytes)
}

/// Pull a human-readable message out of an error body.
///
/// Both APIs answer with JSON objects carrying `message` (and sometimes
/// `error`); anything else is shown as text.
fn error_message(body: &[u8]) -> String {
    let text = match serde_json::from_slice::<serde_json::Value>(body) {
        Ok(value) => value
            .get("message")
            .or_else(|| value.get("error"))
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| value.to_string()),
        Err(_) => String::from_utf8_lossy(body).into_owned(),
    };
    let text = text.trim();
    match text.char_indices().nth(MAX_ERROR_MESSAGE) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
