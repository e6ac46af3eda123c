//! Feed synchronization and mutation engine.
//!
//! This module keeps the client-visible fact list in step with the store:
//!
//! - **Sync**: read the feed for a filter, last request wins
//! - **Submit**: validate a draft, insert it, optionally attach an image
//! - **Vote**: confirmed-only `+1` on one counter of one fact
//!
//! # Architecture
//!
//! - [`FeedEngine`] - single owner of [`FeedState`]; spawns gateway calls
//!   and applies their [`FeedEvent`]s
//! - [`submission`] - draft validation and the two-phase write
//! - [`vote`] - read-then-write-absolute vote increments
//!
//! # Example
//!
//! ```ignore
//! let (tx, mut rx) = tokio::sync::mpsc::channel(64);
//! let mut engine = FeedEngine::new(gateway, tx, EngineSettings::default());
//! engine.sync(FilterState::default().with_category(Category::Science));
//! while let Some(event) = rx.recv().await {
//!     if let Some(notice) = engine.handle_event(event) {
//!         println!("{notice}");
//!     }
//! }
//! ```

mod engine;
mod events;
mod state;
pub mod submission;
mod tasks;
pub mod vote;

pub use engine::{Dispatch, EngineSettings, FeedEngine};
pub use events::{FeedEvent, Notice, NoticeLevel, TaskKind};
pub use state::FeedState;
pub use submission::{validate, SubmissionOutcome, ValidDraft};
