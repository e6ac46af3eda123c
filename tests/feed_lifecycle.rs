//! Integration tests for the fact lifecycle: read, submit, attach an image, vote.
//!
//! Each test creates its own in-memory SQLite database for isolation.
//! The database doubles as the gateway, so these tests exercise the feed
//! engine and the storage layer end-to-end.

use std::sync::Arc;

use async_trait::async_trait;
use factfeed::error::ErrorKind;
use factfeed::feed::{Dispatch, EngineSettings, FeedEngine, FeedEvent, Notice, NoticeLevel};
use factfeed::filter::{FactQuery, FilterState};
use factfeed::gateway::{Gateway, GatewayError, ProgressFn, UploadOptions, IMAGE_CONTAINER};
use factfeed::model::{
    Category, CategoryFilter, Fact, FactDraft, FactId, FactPatch, ImageFile, NewFact, VoteCounter,
};
use factfeed::storage::Database;
use pretty_assertions::assert_eq;
use tokio::sync::mpsc;

async fn test_db() -> Database {
    Database::open(":memory:").await.unwrap()
}

async fn seed(db: &Database, text: &str, category: Category, interesting: u32) -> Fact {
    let fact = db
        .insert_fact(&NewFact::new(text, "https://example.com/src", category))
        .await
        .unwrap();
    if interesting == 0 {
        return fact;
    }
    db.update_fact(
        fact.id,
        &FactPatch::vote(VoteCounter::Interesting, interesting),
    )
    .await
    .unwrap()
}

fn engine(gateway: Arc<dyn Gateway>) -> (FeedEngine, mpsc::Receiver<FeedEvent>) {
    let (tx, rx) = mpsc::channel(64);
    (FeedEngine::new(gateway, tx, EngineSettings::default()), rx)
}

/// Apply events until the engine has nothing in flight.
async fn settle(engine: &mut FeedEngine, rx: &mut mpsc::Receiver<FeedEvent>) -> Vec<Notice> {
    let mut notices = Vec::new();
    while engine.is_busy() {
        let event = rx.recv().await.unwrap();
        notices.extend(engine.handle_event(event));
    }
    notices
}

fn draft(text: &str, category: &str, image: Option<ImageFile>) -> FactDraft {
    FactDraft {
        text: text.to_string(),
        source: "https://example.com/source".to_string(),
        category: category.to_string(),
        image,
    }
}

// ============================================================================
// Read Path
// ============================================================================

#[tokio::test]
async fn test_inserted_fact_appears_in_feed() {
    let db = test_db().await;
    let created = seed(&db, "Honey never spoils", Category::History, 0).await;

    let facts = db.read_facts(&FilterState::default().query()).await.unwrap();
    assert_eq!(facts, vec![created.clone()]);
    assert_eq!(created.image_url, "");
    assert_eq!(created.votes_false, 0);
    assert!(created.created_at.is_some());
}

#[tokio::test]
async fn test_category_filter_reads_only_that_category() {
    let db = test_db().await;
    seed(&db, "Rust 1.0 shipped in 2015", Category::Technology, 0).await;
    seed(&db, "Water boils at lower temperatures at altitude", Category::Science, 0).await;

    let science = db
        .read_facts(&FilterState::from(Category::Science).query())
        .await
        .unwrap();
    assert_eq!(science.len(), 1);
    assert_eq!(science[0].category, Category::Science);

    let news = db
        .read_facts(&FilterState::from(Category::News).query())
        .await
        .unwrap();
    assert!(news.is_empty());
}

#[tokio::test]
async fn test_search_is_literal_and_case_insensitive() {
    let db = test_db().await;
    seed(&db, "Half of all cats are 50% asleep", Category::Science, 0).await;
    seed(&db, "Cats sleep 500 minutes a day", Category::Science, 0).await;
    seed(&db, "Dogs dream", Category::Science, 0).await;

    let query = FilterState::default().with_search("CATS").query();
    assert_eq!(db.read_facts(&query).await.unwrap().len(), 2);

    let query = FilterState::default().with_search("50%").query();
    let facts = db.read_facts(&query).await.unwrap();
    assert_eq!(facts.len(), 1);
    assert!(facts[0].text.contains("50%"));
}

#[tokio::test]
async fn test_feed_is_ordered_by_interesting_votes() {
    let db = test_db().await;
    seed(&db, "low", Category::News, 1).await;
    seed(&db, "high", Category::News, 9).await;
    seed(&db, "mid", Category::News, 4).await;

    let facts = db.read_facts(&FilterState::default().query()).await.unwrap();
    let texts: Vec<&str> = facts.iter().map(|f| f.text.as_str()).collect();
    assert_eq!(texts, vec!["high", "mid", "low"]);
}

#[tokio::test]
async fn test_engine_sync_follows_filter_changes() {
    let db = test_db().await;
    seed(&db, "A tech fact", Category::Technology, 0).await;
    seed(&db, "A health fact", Category::Health, 0).await;
    let (mut engine, mut rx) = engine(Arc::new(db));

    assert_eq!(engine.sync(FilterState::default()), Dispatch::Started);
    settle(&mut engine, &mut rx).await;
    assert_eq!(engine.facts().len(), 2);

    assert_eq!(
        engine.set_category(CategoryFilter::Only(Category::Health)),
        Dispatch::Started
    );
    settle(&mut engine, &mut rx).await;
    assert_eq!(engine.facts().len(), 1);
    assert_eq!(engine.facts()[0].category, Category::Health);

    assert_eq!(
        engine.set_category(CategoryFilter::Only(Category::Health)),
        Dispatch::Unchanged
    );
    assert!(!engine.is_busy());
}

// ============================================================================
// Write Paths
// ============================================================================

#[tokio::test]
async fn test_submit_with_image_then_vote_twice() {
    let db = test_db().await;
    let (mut engine, mut rx) = engine(Arc::new(db.clone()));

    engine.sync(FilterState::default());
    settle(&mut engine, &mut rx).await;
    assert!(engine.facts().is_empty());

    let image = ImageFile::new("my cat.png", vec![0x89, b'P', b'N', b'G']);
    let dispatch = engine
        .submit(draft("  Cats have 32 muscles in each ear  ", "Science", Some(image)))
        .unwrap();
    assert_eq!(dispatch, Dispatch::Started);
    let notices = settle(&mut engine, &mut rx).await;

    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].level, NoticeLevel::Info);
    assert_eq!(engine.upload_progress(), None);

    let fact = engine.facts()[0].clone();
    assert_eq!(fact.text, "Cats have 32 muscles in each ear");
    assert_eq!(fact.category, Category::Science);
    let prefix = format!("sqlite://blobs/{}/{}-", IMAGE_CONTAINER, fact.id);
    assert!(fact.image_url.starts_with(&prefix), "{}", fact.image_url);
    assert!(fact.image_url.ends_with("-my_cat.png"), "{}", fact.image_url);

    let object = fact.image_url.rsplit('/').next().unwrap();
    let blob = db.get_blob(IMAGE_CONTAINER, object).await.unwrap().unwrap();
    assert_eq!(blob.bytes, vec![0x89, b'P', b'N', b'G']);
    assert_eq!(blob.content_type, "image/png");

    for _ in 0..2 {
        assert_eq!(engine.vote(fact.id, VoteCounter::Interesting), Dispatch::Started);
        settle(&mut engine, &mut rx).await;
    }
    assert_eq!(engine.state().get(fact.id).unwrap().votes_interesting, 2);

    // The store agrees with the local list
    engine.refresh();
    settle(&mut engine, &mut rx).await;
    assert_eq!(engine.facts()[0].votes_interesting, 2);
    assert_eq!(db.count_facts().await.unwrap(), 1);
}

#[tokio::test]
async fn test_invalid_draft_writes_nothing() {
    let db = test_db().await;
    let (mut engine, _rx) = engine(Arc::new(db.clone()));

    assert!(engine.submit(draft("   ", "science", None)).is_err());
    assert!(engine.submit(draft("ok", "sports", None)).is_err());
    assert!(engine.submit(draft(&"x".repeat(201), "science", None)).is_err());
    assert!(!engine.is_submitting());
    assert_eq!(db.count_facts().await.unwrap(), 0);
}

/// Local store whose uploads always fail.
struct BrokenBlobs(Database);

#[async_trait]
impl Gateway for BrokenBlobs {
    async fn read_facts(&self, query: &FactQuery) -> Result<Vec<Fact>, GatewayError> {
        self.0.read_facts(query).await
    }

    async fn insert_fact(&self, fact: &NewFact) -> Result<Fact, GatewayError> {
        self.0.insert_fact(fact).await
    }

    async fn update_fact(&self, id: FactId, patch: &FactPatch) -> Result<Fact, GatewayError> {
        self.0.update_fact(id, patch).await
    }

    async fn upload_blob(
        &self,
        _container: &str,
        _object: &str,
        _bytes: Vec<u8>,
        _content_type: &str,
        _options: &UploadOptions,
        _progress: Option<ProgressFn>,
    ) -> Result<(), GatewayError> {
        Err(GatewayError::HttpStatus {
            status: 413,
            message: "Payload too large".to_string(),
        })
    }

    fn public_url(&self, container: &str, object: &str) -> String {
        self.0.public_url(container, object)
    }
}

#[tokio::test]
async fn test_failed_upload_keeps_record_without_image() {
    let db = test_db().await;
    let (mut engine, mut rx) = engine(Arc::new(BrokenBlobs(db.clone())));

    let image = ImageFile::new("big.jpg", vec![0; 16]);
    engine
        .submit(draft("Bananas are berries", "science", Some(image)))
        .unwrap();
    let notices = settle(&mut engine, &mut rx).await;

    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].level, NoticeLevel::Warning);
    assert!(notices[0].message.contains("Payload too large"));

    assert_eq!(engine.facts().len(), 1);
    assert_eq!(engine.facts()[0].image_url, "");
    assert_eq!(engine.state().last_error(), None);

    let stored = db.read_facts(&FilterState::default().query()).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].image_url, "");
}

#[tokio::test]
async fn test_vote_on_unlisted_fact_is_refused() {
    let db = test_db().await;
    let hidden = seed(&db, "Hidden by the filter", Category::Finance, 0).await;
    let (mut engine, mut rx) = engine(Arc::new(db.clone()));

    engine.sync(FilterState::from(Category::News));
    settle(&mut engine, &mut rx).await;

    assert_eq!(
        engine.vote(hidden.id, VoteCounter::False),
        Dispatch::UnknownFact
    );
    assert!(!engine.is_busy());
}

#[tokio::test]
async fn test_read_failure_surfaces_read_error() {
    let db = test_db().await;
    seed(&db, "Still listed", Category::News, 0).await;
    let pool_owner = db.clone();
    let (mut engine, mut rx) = engine(Arc::new(db));

    engine.sync(FilterState::default());
    settle(&mut engine, &mut rx).await;
    assert_eq!(engine.facts().len(), 1);

    // Closing the pool makes every later query fail
    pool_owner.close().await;
    engine.refresh();
    let notices = settle(&mut engine, &mut rx).await;

    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].level, NoticeLevel::Error);
    assert_eq!(engine.state().last_error(), Some(ErrorKind::Read));
    assert_eq!(engine.facts().len(), 1, "failed read keeps the old list");
}
