//! Error taxonomy of the feed engine.
//!
//! Every failure the engine reports falls into one of four kinds. Validation
//! never reaches the gateway; Read and Write abort the operation that caused
//! them; Upload is always paired with a record that was saved.

use crate::gateway::GatewayError;
use crate::model::MAX_TEXT_CHARS;
use crate::util::UrlValidationError;
use thiserror::Error;

/// Coarse classification of a [`FeedError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    Read,
    Write,
    Upload,
}

impl ErrorKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Read => "read",
            Self::Write => "write",
            Self::Upload => "upload",
        }
    }
}

/// A draft rejected before any remote call.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Fact text is empty")]
    EmptyText,

    #[error("Fact text is {len} characters long (max {})", MAX_TEXT_CHARS)]
    TextTooLong { len: usize },

    #[error("Invalid source: {0}")]
    InvalidSource(#[from] UrlValidationError),

    #[error("Unknown category: {0}")]
    UnknownCategory(String),
}

#[derive(Debug, Error)]
pub enum FeedError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("There was a problem retrieving facts: {0}")]
    Read(#[source] GatewayError),

    #[error("Could not save to the store: {0}")]
    Write(#[source] GatewayError),

    #[error("Fact saved, but the image failed: {0}")]
    Upload(#[source] GatewayError),
}

impl FeedError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Read(_) => ErrorKind::Read,
            Self::Write(_) => ErrorKind::Write,
            Self::Upload(_) => ErrorKind::Upload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FactId;

    #[test]
    fn test_kind_matches_variant() {
        assert_eq!(
            FeedError::from(ValidationError::EmptyText).kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            FeedError::Write(GatewayError::NotFound(FactId(3))).kind(),
            ErrorKind::Write
        );
        assert_eq!(
            FeedError::Upload(GatewayError::Conflict("dup".into())).kind(),
            ErrorKind::Upload
        );
    }

    #[test]
    fn test_too_long_message_names_limit() {
        let msg = ValidationError::TextTooLong { len: 201 }.to_string();
        assert!(msg.contains("201"));
        assert!(msg.contains("200"));
    }

    #[test]
    fn test_upload_message_is_partial_success() {
        let msg = FeedError::Upload(GatewayError::Conflict("exists".into())).to_string();
        assert!(msg.starts_with("Fact saved"));
    }
}
