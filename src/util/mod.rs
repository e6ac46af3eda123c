//! Utility functions for common operations.
//!
//! - **URL validation**: fact sources and remote store base URLs
//! - **Text processing**: Unicode-aware truncation and terminal sanitizing
//!   for printing user-submitted fact text

mod text;
mod url_validator;

pub use text::{display_width, strip_control_chars, truncate_to_width};
pub use url_validator::{validate_source_url, validate_store_url, UrlValidationError};
