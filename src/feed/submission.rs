//! Fact submission pipeline: validate, insert the record, then optionally
//! attach an image.
//!
//! The record insert is the commit point. Once it succeeds the fact exists
//! and is never rolled back; a failed image upload or patch only downgrades
//! the outcome to a partial success.

use chrono::Utc;

use crate::error::{FeedError, ValidationError};
use crate::gateway::{Gateway, GatewayError, ProgressFn, UploadOptions};
use crate::model::{Category, Fact, FactDraft, FactId, FactPatch, ImageFile, NewFact, MAX_TEXT_CHARS};
use crate::util::validate_source_url;

/// Object name used when sanitizing leaves nothing of the file name.
const FALLBACK_FILE_NAME: &str = "image";

/// A draft that passed client-side validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidDraft {
    pub text: String,
    pub source: String,
    pub category: Category,
    pub image: Option<ImageFile>,
}

/// Check a draft without touching the network.
///
/// Text is trimmed before the length check; the trimmed text is what gets
/// stored.
pub fn validate(draft: FactDraft) -> Result<ValidDraft, ValidationError> {
    let text = draft.text.trim();
    if text.is_empty() {
        return Err(ValidationError::EmptyText);
    }
    let len = text.chars().count();
    if len > MAX_TEXT_CHARS {
        return Err(ValidationError::TextTooLong { len });
    }

    validate_source_url(&draft.source)?;
    let category: Category = draft.category.parse()?;

    Ok(ValidDraft {
        text: text.to_string(),
        source: draft.source.trim().to_string(),
        category,
        image: draft.image,
    })
}

/// Result of a submission whose record was saved.
#[derive(Debug)]
pub struct SubmissionOutcome {
    /// The fact as last confirmed by the store.
    pub fact: Fact,
    /// Why the image could not be attached, if it could not.
    pub image_error: Option<GatewayError>,
}

impl SubmissionOutcome {
    pub fn is_partial(&self) -> bool {
        self.image_error.is_some()
    }

    /// Split into the fact and the upload warning to surface, if any.
    pub fn into_parts(self) -> (Fact, Option<FeedError>) {
        (self.fact, self.image_error.map(FeedError::Upload))
    }
}

#[derive(Debug)]
enum Phase {
    RecordPending,
    RecordCreated(Fact),
    ImagePending { fact: Fact, image: ImageFile },
    ImageAttached(Fact),
    ImageFailed { fact: Fact, error: GatewayError },
}

impl Phase {
    fn name(&self) -> &'static str {
        match self {
            Self::RecordPending => "record_pending",
            Self::RecordCreated(_) => "record_created",
            Self::ImagePending { .. } => "image_pending",
            Self::ImageAttached(_) => "image_attached",
            Self::ImageFailed { .. } => "image_failed",
        }
    }
}

/// Run the two-phase write for a validated draft.
///
/// Returns `Err(FeedError::Write)` only when the record insert fails, in which
/// case nothing was written.
pub async fn submit_fact(
    gateway: &dyn Gateway,
    draft: ValidDraft,
    container: &str,
    options: &UploadOptions,
    progress: Option<ProgressFn>,
) -> Result<SubmissionOutcome, FeedError> {
    let ValidDraft {
        text,
        source,
        category,
        mut image,
    } = draft;
    let record = NewFact::new(text, source, category);

    let mut phase = Phase::RecordPending;
    loop {
        phase = match phase {
            Phase::RecordPending => {
                let fact = gateway.insert_fact(&record).await.map_err(|e| {
                    tracing::error!(error = %e, "Fact insert failed");
                    FeedError::Write(e)
                })?;
                Phase::RecordCreated(fact)
            }
            Phase::RecordCreated(fact) => match image.take() {
                Some(image) => Phase::ImagePending { fact, image },
                None => return Ok(SubmissionOutcome { fact, image_error: None }),
            },
            Phase::ImagePending { fact, image } => {
                match attach_image(gateway, fact.id, image, container, options, progress.clone())
                    .await
                {
                    Ok(updated) => Phase::ImageAttached(updated),
                    Err(error) => Phase::ImageFailed { fact, error },
                }
            }
            Phase::ImageAttached(fact) => {
                return Ok(SubmissionOutcome { fact, image_error: None });
            }
            Phase::ImageFailed { fact, error } => {
                tracing::warn!(id = %fact.id, error = %error, "Fact saved without image");
                return Ok(SubmissionOutcome {
                    fact,
                    image_error: Some(error),
                });
            }
        };
        tracing::debug!(phase = phase.name(), "Submission phase");
    }
}

async fn attach_image(
    gateway: &dyn Gateway,
    id: FactId,
    image: ImageFile,
    container: &str,
    options: &UploadOptions,
    progress: Option<ProgressFn>,
) -> Result<Fact, GatewayError> {
    let object = object_name(id, Utc::now().timestamp_millis(), &image.file_name);
    let content_type = image.content_type();

    gateway
        .upload_blob(container, &object, image.bytes, content_type, options, progress)
        .await?;
    let url = gateway.public_url(container, &object);
    gateway.update_fact(id, &FactPatch::image(url)).await
}

/// Blob object name for a fact's image: `{id}-{unix_millis}-{file name}`.
pub fn object_name(id: FactId, unix_millis: i64, file_name: &str) -> String {
    format!("{}-{}-{}", id, unix_millis, sanitize_file_name(file_name))
}

/// Keep ASCII alphanumerics, `.`, `-` and `_`; everything else becomes `_`.
pub fn sanitize_file_name(name: &str) -> String {
    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if sanitized.is_empty() {
        FALLBACK_FILE_NAME.to_string()
    } else {
        sanitized
    }
}
