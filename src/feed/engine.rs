use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::error::{ErrorKind, FeedError, ValidationError};
use crate::filter::FilterState;
use crate::gateway::{Gateway, GatewayError, ProgressFn, UploadOptions, IMAGE_CONTAINER};
use crate::model::{CategoryFilter, Fact, FactDraft, FactId, VoteCounter};

use super::events::{FeedEvent, Notice, TaskKind};
use super::state::FeedState;
use super::submission::{self, SubmissionOutcome};
use super::tasks::spawn_reporting;
use super::vote::cast_vote;

/// Settings for the write paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    pub image_container: String,
    pub upload: UploadOptions,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            image_container: IMAGE_CONTAINER.to_string(),
            upload: UploadOptions::default(),
        }
    }
}

/// What a request to the engine did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// A background task was spawned; its result arrives as a [`FeedEvent`].
    Started,
    /// Refused: the same operation is already in flight.
    Busy,
    /// Nothing to do: the requested filter is already active.
    Unchanged,
    /// Refused: no fact with that id is in the list.
    UnknownFact,
}

/// Owner of the fact list.
///
/// Every gateway call runs as a spawned task that reports back over the
/// engine's channel. Results only touch [`FeedState`] inside
/// [`handle_event`](Self::handle_event), which the owner calls from a single
/// context, so splices never interleave.
pub struct FeedEngine {
    gateway: Arc<dyn Gateway>,
    event_tx: mpsc::Sender<FeedEvent>,
    settings: EngineSettings,
    state: FeedState,
    filter: FilterState,
    /// Filter of the most recently issued read.
    issued: Option<FilterState>,
    /// Generation of the most recently issued read. Only its result is applied.
    generation: u64,
    submitting: bool,
    upload_progress: Option<u8>,
    votes_in_flight: HashSet<FactId>,
}

impl FeedEngine {
    pub fn new(
        gateway: Arc<dyn Gateway>,
        event_tx: mpsc::Sender<FeedEvent>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            gateway,
            event_tx,
            settings,
            state: FeedState::default(),
            filter: FilterState::default(),
            issued: None,
            generation: 0,
            submitting: false,
            upload_progress: None,
            votes_in_flight: HashSet::new(),
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn state(&self) -> &FeedState {
        &self.state
    }

    pub fn facts(&self) -> &[Fact] {
        self.state.as_slice()
    }

    pub fn filter(&self) -> &FilterState {
        &self.filter
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting
    }

    /// Progress of the in-flight image upload, if one is running.
    pub fn upload_progress(&self) -> Option<u8> {
        self.upload_progress
    }

    pub fn is_voting(&self, id: FactId) -> bool {
        self.votes_in_flight.contains(&id)
    }

    /// Whether any task is still expected to report back.
    pub fn is_busy(&self) -> bool {
        self.state.loading() || self.submitting || !self.votes_in_flight.is_empty()
    }

    // ========================================================================
    // Feed Synchronizer
    // ========================================================================

    /// Make `filter` the active filter and read the feed for it.
    ///
    /// Returns `Unchanged` without a read when `filter` equals the filter of
    /// the last issued read. Use [`refresh`](Self::refresh) to re-read.
    pub fn sync(&mut self, filter: FilterState) -> Dispatch {
        if self.issued.as_ref() == Some(&filter) {
            tracing::debug!(filter = ?filter, "Filter unchanged, not re-reading");
            return Dispatch::Unchanged;
        }
        self.filter = filter;
        self.start_read()
    }

    /// Re-read the feed for the active filter.
    pub fn refresh(&mut self) -> Dispatch {
        self.start_read()
    }

    pub fn set_category(&mut self, category: CategoryFilter) -> Dispatch {
        self.sync(self.filter.clone().with_category(category))
    }

    pub fn set_search_text(&mut self, search_text: impl Into<String>) -> Dispatch {
        self.sync(self.filter.clone().with_search(search_text))
    }

    fn start_read(&mut self) -> Dispatch {
        self.generation = self.generation.wrapping_add(1);
        let generation = self.generation;
        let filter = self.filter.clone();
        let query = filter.query();
        self.issued = Some(filter.clone());
        self.state.set_loading(true);

        tracing::debug!(generation, filter = ?filter, "Spawning feed read");

        let gateway = Arc::clone(&self.gateway);
        spawn_reporting(
            TaskKind::Sync { generation },
            self.event_tx.clone(),
            async move {
                let result = gateway.read_facts(&query).await;
                FeedEvent::FeedLoaded {
                    generation,
                    filter,
                    result,
                }
            },
        );
        Dispatch::Started
    }

    // ========================================================================
    // Submission Pipeline
    // ========================================================================

    /// Validate `draft` and start the two-phase write.
    ///
    /// Validation failures return `Err` with no gateway call. Only one
    /// submission runs at a time; a second one is refused with `Busy`.
    pub fn submit(&mut self, draft: FactDraft) -> Result<Dispatch, ValidationError> {
        if self.submitting {
            return Ok(Dispatch::Busy);
        }
        let draft = submission::validate(draft)?;

        self.submitting = true;
        self.upload_progress = draft.image.as_ref().map(|_| 0);

        let progress_tx = self.event_tx.clone();
        let progress: ProgressFn = Arc::new(move |percent| {
            // Advisory: dropped when the channel is full
            let _ = progress_tx.try_send(FeedEvent::UploadProgress { percent });
        });

        let gateway = Arc::clone(&self.gateway);
        let settings = self.settings.clone();
        tracing::debug!(category = %draft.category, image = draft.image.is_some(), "Spawning submission");
        spawn_reporting(TaskKind::Submit, self.event_tx.clone(), async move {
            let result = submission::submit_fact(
                gateway.as_ref(),
                draft,
                &settings.image_container,
                &settings.upload,
                Some(progress),
            )
            .await;
            FeedEvent::SubmissionFinished { result }
        });
        Ok(Dispatch::Started)
    }

    // ========================================================================
    // Vote Mutator
    // ========================================================================

    /// Add one vote to `counter` of the listed fact `id`.
    pub fn vote(&mut self, id: FactId, counter: VoteCounter) -> Dispatch {
        if self.votes_in_flight.contains(&id) {
            return Dispatch::Busy;
        }
        let Some(snapshot) = self.state.get(id).cloned() else {
            tracing::debug!(%id, "Vote for a fact that is not listed");
            return Dispatch::UnknownFact;
        };
        self.votes_in_flight.insert(id);

        let gateway = Arc::clone(&self.gateway);
        spawn_reporting(
            TaskKind::Vote { fact_id: id },
            self.event_tx.clone(),
            async move {
                let result = cast_vote(gateway.as_ref(), &snapshot, counter).await;
                FeedEvent::VoteFinished {
                    fact_id: id,
                    counter,
                    result,
                }
            },
        );
        Dispatch::Started
    }

    // ========================================================================
    // Event Handling
    // ========================================================================

    /// Apply a background task's result. Returns the notice to show, if any.
    pub fn handle_event(&mut self, event: FeedEvent) -> Option<Notice> {
        match event {
            FeedEvent::FeedLoaded {
                generation,
                filter,
                result,
            } => self.handle_feed_loaded(generation, filter, result),
            FeedEvent::UploadProgress { percent } => {
                if self.submitting {
                    self.upload_progress = Some(percent.min(100));
                }
                None
            }
            FeedEvent::SubmissionFinished { result } => self.handle_submission_finished(result),
            FeedEvent::VoteFinished {
                fact_id,
                counter,
                result,
            } => self.handle_vote_finished(fact_id, counter, result),
            FeedEvent::TaskPanicked { task, error } => self.handle_task_panicked(task, error),
        }
    }

    fn handle_feed_loaded(
        &mut self,
        generation: u64,
        filter: FilterState,
        result: Result<Vec<Fact>, GatewayError>,
    ) -> Option<Notice> {
        // Check generation to prevent stale feed results
        if generation != self.generation {
            tracing::debug!(
                expected = self.generation,
                got = generation,
                filter = ?filter,
                "Ignoring stale feed result (generation mismatch)"
            );
            return None;
        }

        self.state.set_loading(false);
        match result {
            Ok(facts) => {
                let count = facts.len();
                self.state.replace_all(facts);
                self.state.clear_error();
                tracing::debug!(generation, count, "Feed loaded");
                None
            }
            Err(e) => {
                let err = FeedError::Read(e);
                tracing::warn!(generation, error = %err, "Feed read failed");
                self.state.set_error(ErrorKind::Read);
                Some(Notice::error(err.to_string()))
            }
        }
    }

    fn handle_submission_finished(
        &mut self,
        result: Result<SubmissionOutcome, FeedError>,
    ) -> Option<Notice> {
        self.submitting = false;
        self.upload_progress = None;

        match result {
            Ok(outcome) => {
                let (fact, warning) = outcome.into_parts();
                let id = fact.id;
                self.state.prepend_one(fact);
                match warning {
                    Some(warning) => Some(Notice::warning(warning.to_string())),
                    None => {
                        tracing::info!(%id, "Fact submitted");
                        Some(Notice::info(format!("Fact {id} added")))
                    }
                }
            }
            Err(e) => {
                tracing::warn!(kind = e.kind().name(), error = %e, "Submission failed");
                Some(Notice::error(e.to_string()))
            }
        }
    }

    fn handle_vote_finished(
        &mut self,
        fact_id: FactId,
        counter: VoteCounter,
        result: Result<Fact, FeedError>,
    ) -> Option<Notice> {
        self.votes_in_flight.remove(&fact_id);

        match result {
            Ok(fact) => {
                let votes = fact.votes(counter);
                if !self.state.replace_by_id(fact) {
                    tracing::debug!(%fact_id, "Voted fact is no longer listed");
                }
                Some(Notice::info(format!(
                    "Fact {fact_id}: {} = {votes}",
                    counter.name()
                )))
            }
            Err(e) => {
                tracing::warn!(%fact_id, kind = e.kind().name(), error = %e, "Vote failed");
                Some(Notice::error(e.to_string()))
            }
        }
    }

    fn handle_task_panicked(&mut self, task: TaskKind, error: String) -> Option<Notice> {
        match task {
            TaskKind::Sync { generation } => {
                if generation != self.generation {
                    return None;
                }
                self.state.set_loading(false);
                self.state.set_error(ErrorKind::Read);
            }
            TaskKind::Submit => {
                self.submitting = false;
                self.upload_progress = None;
            }
            TaskKind::Vote { fact_id } => {
                self.votes_in_flight.remove(&fact_id);
            }
        }
        Some(Notice::error(format!(
            "Background {} task failed: {error}",
            task.name()
        )))
    }
}
