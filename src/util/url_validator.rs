use thiserror::Error;
use url::Url;

/// Errors that can occur during URL validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UrlValidationError {
    /// The URL string could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The URL uses a scheme other than http or https.
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    /// The URL has no host component.
    #[error("URL has no host")]
    MissingHost,
    /// A store URL that would send credentials over plain HTTP.
    #[error("Insecure store URL: HTTPS required (except localhost)")]
    InsecureStoreUrl,
}

/// Validates the `source` of a fact.
///
/// The source must be an absolute `http` or `https` URL with a host. Unlike
/// store URLs, any host is accepted: the source is a citation, never fetched.
///
/// # Examples
///
/// ```
/// use factfeed::util::validate_source_url;
///
/// let url = validate_source_url("https://example.com/article").unwrap();
/// assert_eq!(url.host_str(), Some("example.com"));
///
/// assert!(validate_source_url("ftp://example.com").is_err());
/// assert!(validate_source_url("not a url").is_err());
/// ```
pub fn validate_source_url(url_str: &str) -> Result<Url, UrlValidationError> {
    let url = Url::parse(url_str.trim())?;
    check_http_scheme(&url)?;

    match url.host_str() {
        Some(host) if !host.is_empty() => Ok(url),
        _ => Err(UrlValidationError::MissingHost),
    }
}

/// Validates the base URL of the remote store.
///
/// SEC-002: the API key travels in request headers, so plain HTTP is only
/// allowed for `localhost` and `127.0.0.1` (local development and tests).
pub fn validate_store_url(url_str: &str) -> Result<Url, UrlValidationError> {
    let url = validate_source_url(url_str)?;
    if url.scheme() == "https" {
        return Ok(url);
    }

    match url.host_str() {
        Some("localhost") | Some("127.0.0.1") | Some("[::1]") => {
            tracing::warn!(store_url = %url, "Using non-HTTPS store URL (localhost only)");
            Ok(url)
        }
        _ => Err(UrlValidationError::InsecureStoreUrl),
    }
}

fn check_http_scheme(url: &Url) -> Result<(), UrlValidationError> {
    match url.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
    }
}
