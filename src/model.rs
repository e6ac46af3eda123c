//! Domain types shared by the gateway, the storage layer and the feed engine.
//!
//! `Fact` mirrors a row of the remote `facts` table. Wire names follow the
//! table's columns: camelCase for the counters and `imageUrl`, snake case for
//! `created_at`.

use crate::error::ValidationError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Maximum fact text length, counted in Unicode scalar values.
pub const MAX_TEXT_CHARS: usize = 200;

// ============================================================================
// Identifiers
// ============================================================================

/// Store-assigned fact identifier. Opaque to the client, immutable once created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FactId(pub i64);

impl fmt::Display for FactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for FactId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(FactId)
    }
}

// ============================================================================
// Category
// ============================================================================

/// The closed set of fact categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Technology,
    Science,
    Finance,
    Society,
    Entertainment,
    Health,
    History,
    News,
}

impl Category {
    /// Every category, in display order.
    pub const ALL: [Category; 8] = [
        Category::Technology,
        Category::Science,
        Category::Finance,
        Category::Society,
        Category::Entertainment,
        Category::Health,
        Category::History,
        Category::News,
    ];

    /// Wire and display name (lowercase).
    pub fn name(self) -> &'static str {
        match self {
            Self::Technology => "technology",
            Self::Science => "science",
            Self::Finance => "finance",
            Self::Society => "society",
            Self::Entertainment => "entertainment",
            Self::Health => "health",
            Self::History => "history",
            Self::News => "news",
        }
    }

    /// Parse a category name (case-insensitive, surrounding whitespace ignored).
    pub fn from_str_name(s: &str) -> Option<Self> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|c| c.name().eq_ignore_ascii_case(wanted))
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Category {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_str_name(s).ok_or_else(|| ValidationError::UnknownCategory(s.to_string()))
    }
}

/// Category selector of the feed filter: everything, or one category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CategoryFilter {
    #[default]
    All,
    Only(Category),
}

impl CategoryFilter {
    /// The category to filter on, or `None` for "all".
    pub fn category(self) -> Option<Category> {
        match self {
            Self::All => None,
            Self::Only(category) => Some(category),
        }
    }
}

impl fmt::Display for CategoryFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("all"),
            Self::Only(category) => category.fmt(f),
        }
    }
}

impl FromStr for CategoryFilter {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("all") {
            return Ok(Self::All);
        }
        s.parse().map(Self::Only)
    }
}

impl From<Category> for CategoryFilter {
    fn from(category: Category) -> Self {
        Self::Only(category)
    }
}

// ============================================================================
// Vote Counters
// ============================================================================

/// One of the three per-fact vote counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VoteCounter {
    Interesting,
    Mindblowing,
    False,
}

impl VoteCounter {
    /// Column name in the remote table.
    pub fn column(self) -> &'static str {
        match self {
            Self::Interesting => "votesInteresting",
            Self::Mindblowing => "votesMindblowing",
            Self::False => "votesFalse",
        }
    }

    /// Short name used on the command line and in logs.
    pub fn name(self) -> &'static str {
        match self {
            Self::Interesting => "interesting",
            Self::Mindblowing => "mindblowing",
            Self::False => "false",
        }
    }
}

impl fmt::Display for VoteCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for VoteCounter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        [Self::Interesting, Self::Mindblowing, Self::False]
            .into_iter()
            .find(|c| c.name().eq_ignore_ascii_case(s) || c.column() == s)
            .ok_or_else(|| format!("unknown vote counter: {s} (expected interesting, mindblowing or false)"))
    }
}

// ============================================================================
// Fact
// ============================================================================

/// A fact row as confirmed by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fact {
    pub id: FactId,
    #[serde(
        rename = "created_at",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<DateTime<Utc>>,
    pub text: String,
    pub source: String,
    pub category: Category,
    /// Public image URL; empty means "no image".
    #[serde(default, deserialize_with = "null_as_empty")]
    pub image_url: String,
    #[serde(default)]
    pub votes_interesting: u32,
    #[serde(default)]
    pub votes_mindblowing: u32,
    #[serde(default)]
    pub votes_false: u32,
}

impl Fact {
    /// A fact is disputed when it has strictly more "false" votes than "interesting" ones.
    pub fn is_disputed(&self) -> bool {
        self.votes_interesting < self.votes_false
    }

    pub fn has_image(&self) -> bool {
        !self.image_url.is_empty()
    }

    /// Current value of one counter.
    pub fn votes(&self, counter: VoteCounter) -> u32 {
        match counter {
            VoteCounter::Interesting => self.votes_interesting,
            VoteCounter::Mindblowing => self.votes_mindblowing,
            VoteCounter::False => self.votes_false,
        }
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Row sent on insert. The store assigns `id` and `created_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewFact {
    pub text: String,
    pub source: String,
    pub category: Category,
    pub image_url: String,
    pub votes_interesting: u32,
    pub votes_mindblowing: u32,
    pub votes_false: u32,
}

impl NewFact {
    /// A fresh record: no image, every counter at zero.
    pub fn new(text: impl Into<String>, source: impl Into<String>, category: Category) -> Self {
        Self {
            text: text.into(),
            source: source.into(),
            category,
            image_url: String::new(),
            votes_interesting: 0,
            votes_mindblowing: 0,
            votes_false: 0,
        }
    }
}

/// Partial update of a fact. Only `Some` fields are sent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FactPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub votes_interesting: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub votes_mindblowing: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub votes_false: Option<u32>,
}

impl FactPatch {
    pub fn image(url: impl Into<String>) -> Self {
        Self {
            image_url: Some(url.into()),
            ..Self::default()
        }
    }

    /// Set one counter to an absolute value.
    pub fn vote(counter: VoteCounter, value: u32) -> Self {
        let mut patch = Self::default();
        match counter {
            VoteCounter::Interesting => patch.votes_interesting = Some(value),
            VoteCounter::Mindblowing => patch.votes_mindblowing = Some(value),
            VoteCounter::False => patch.votes_false = Some(value),
        }
        patch
    }
}

// ============================================================================
// Drafts
// ============================================================================

/// An image picked by the user for a new fact.
#[derive(Clone, PartialEq, Eq)]
pub struct ImageFile {
    /// Original file name, as chosen by the user (unsanitized).
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl ImageFile {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
        }
    }

    /// Read an image from disk, keeping only the final path component as the name.
    pub async fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self { file_name, bytes })
    }

    /// MIME type inferred from the file extension.
    pub fn content_type(&self) -> &'static str {
        let ext = Path::new(&self.file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("png") => "image/png",
            Some("jpg") | Some("jpeg") => "image/jpeg",
            Some("gif") => "image/gif",
            Some("webp") => "image/webp",
            Some("svg") => "image/svg+xml",
            Some("avif") => "image/avif",
            _ => "application/octet-stream",
        }
    }
}

impl fmt::Debug for ImageFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageFile")
            .field("file_name", &self.file_name)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// A fact as typed by the user, before validation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FactDraft {
    pub text: String,
    pub source: String,
    /// Raw category name; checked against the closed set on validation.
    pub category: String,
    pub image: Option<ImageFile>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn fact(interesting: u32, falses: u32) -> Fact {
        Fact {
            id: FactId(1),
            created_at: None,
            text: "Octopuses have three hearts".to_string(),
            source: "https://example.com".to_string(),
            category: Category::Science,
            image_url: String::new(),
            votes_interesting: interesting,
            votes_mindblowing: 0,
            votes_false: falses,
        }
    }

    #[test]
    fn test_disputed_boundary() {
        assert!(!fact(3, 3).is_disputed());
        assert!(fact(2, 3).is_disputed());
        assert!(!fact(4, 3).is_disputed());
        assert!(!fact(0, 0).is_disputed());
    }

    #[test]
    fn test_category_parse_case_insensitive() {
        assert_eq!(Category::from_str_name(" Science "), Some(Category::Science));
        assert_eq!(Category::from_str_name("HISTORY"), Some(Category::History));
        assert_eq!(Category::from_str_name("sports"), None);
        assert!(matches!(
            "sports".parse::<Category>(),
            Err(ValidationError::UnknownCategory(_))
        ));
    }

    #[test]
    fn test_category_filter_parse() {
        assert_eq!("all".parse::<CategoryFilter>().unwrap(), CategoryFilter::All);
        assert_eq!(
            "news".parse::<CategoryFilter>().unwrap(),
            CategoryFilter::Only(Category::News)
        );
        assert!("everything".parse::<CategoryFilter>().is_err());
    }

    #[test]
    fn test_vote_counter_parse() {
        assert_eq!("interesting".parse(), Ok(VoteCounter::Interesting));
        assert_eq!("votesFalse".parse(), Ok(VoteCounter::False));
        assert_eq!("Mindblowing".parse(), Ok(VoteCounter::Mindblowing));
        assert!("boring".parse::<VoteCounter>().is_err());
    }

    #[test]
    fn test_fact_deserializes_store_row() {
        let json = r#"{
            "id": 42,
            "created_at": "2024-03-01T12:00:00+00:00",
            "text": "Honey never spoils",
            "source": "https://example.com/honey",
            "category": "history",
            "imageUrl": null,
            "votesInteresting": 7,
            "votesMindblowing": 2,
            "votesFalse": 1
        }"#;
        let fact: Fact = serde_json::from_str(json).unwrap();
        assert_eq!(fact.id, FactId(42));
        assert_eq!(fact.category, Category::History);
        assert_eq!(fact.image_url, "");
        assert!(!fact.has_image());
        assert_eq!(fact.votes(VoteCounter::Interesting), 7);
        assert!(fact.created_at.is_some());
    }

    #[test]
    fn test_fact_missing_image_and_counters_default() {
        let json = r#"{"id": 1, "text": "t", "source": "https://e.com", "category": "news"}"#;
        let fact: Fact = serde_json::from_str(json).unwrap();
        assert_eq!(fact.image_url, "");
        assert_eq!(fact.votes_false, 0);
    }

    #[test]
    fn test_new_fact_wire_shape() {
        let row = NewFact::new("Text", "https://example.com", Category::Finance);
        let value = serde_json::to_value(&row).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "text": "Text",
                "source": "https://example.com",
                "category": "finance",
                "imageUrl": "",
                "votesInteresting": 0,
                "votesMindblowing": 0,
                "votesFalse": 0
            })
        );
    }

    #[test]
    fn test_vote_patch_sends_only_one_field() {
        let patch = FactPatch::vote(VoteCounter::False, 5);
        let value = serde_json::to_value(&patch).unwrap();
        assert_eq!(value, serde_json::json!({ "votesFalse": 5 }));
        assert_eq!(
            serde_json::to_value(FactPatch::default()).unwrap(),
            serde_json::json!({})
        );
    }

    #[test]
    fn test_image_content_type() {
        assert_eq!(ImageFile::new("a.PNG", vec![]).content_type(), "image/png");
        assert_eq!(ImageFile::new("b.jpeg", vec![]).content_type(), "image/jpeg");
        assert_eq!(
            ImageFile::new("noext", vec![]).content_type(),
            "application/octet-stream"
        );
    }

    proptest::proptest! {
        #[test]
        fn prop_disputed_iff_more_false_votes(interesting in 0u32..1000, falses in 0u32..1000) {
            let fact = fact(interesting, falses);
            proptest::prop_assert_eq!(fact.is_disputed(), falses > interesting);
            // Mindblowing votes never affect the dispute flag
            let mut boosted = fact.clone();
            boosted.votes_mindblowing = 500;
            proptest::prop_assert_eq!(boosted.is_disputed(), fact.is_disputed());
        }
    }
}
