use std::fmt;

use crate::error::FeedError;
use crate::filter::FilterState;
use crate::gateway::GatewayError;
use crate::model::{Fact, FactId, VoteCounter};

use super::submission::SubmissionOutcome;

/// Events from background tasks
pub enum FeedEvent {
    /// A feed read settled.
    ///
    /// Fields:
    /// - `generation`: The generation counter when this read was spawned
    /// - `filter`: The filter the read was built from
    /// - `result`: The rows or the gateway error
    FeedLoaded {
        generation: u64,
        filter: FilterState,
        result: Result<Vec<Fact>, GatewayError>,
    },
    /// Image upload progress of the in-flight submission, 0..=100.
    UploadProgress { percent: u8 },
    /// The submission pipeline finished, fully or partially.
    SubmissionFinished {
        result: Result<SubmissionOutcome, FeedError>,
    },
    VoteFinished {
        fact_id: FactId,
        counter: VoteCounter,
        result: Result<Fact, FeedError>,
    },
    /// A background task panicked.
    ///
    /// Fields:
    /// - `task`: Which task, so its in-flight flag can be released
    /// - `error`: The panic message extracted from the panic payload
    TaskPanicked { task: TaskKind, error: String },
}

impl fmt::Debug for FeedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FeedLoaded {
                generation, result, ..
            } => f
                .debug_struct("FeedLoaded")
                .field("generation", generation)
                .field("rows", &result.as_ref().map(Vec::len))
                .finish(),
            Self::UploadProgress { percent } => f
                .debug_struct("UploadProgress")
                .field("percent", percent)
                .finish(),
            Self::SubmissionFinished { result } => f
                .debug_struct("SubmissionFinished")
                .field("ok", &result.is_ok())
                .finish(),
            Self::VoteFinished {
                fact_id, counter, result,
            } => f
                .debug_struct("VoteFinished")
                .field("fact_id", fact_id)
                .field("counter", counter)
                .field("ok", &result.is_ok())
                .finish(),
            Self::TaskPanicked { task, error } => f
                .debug_struct("TaskPanicked")
                .field("task", task)
                .field("error", error)
                .finish(),
        }
    }
}

/// Identifies a background task for panic recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Sync { generation: u64 },
    Submit,
    Vote { fact_id: FactId },
}

impl TaskKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Sync { .. } => "sync",
            Self::Submit => "submit",
            Self::Vote { .. } => "vote",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// A user-facing message produced while applying an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Warning,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.level {
            NoticeLevel::Info => f.write_str(&self.message),
            NoticeLevel::Warning => write!(f, "warning: {}", self.message),
            NoticeLevel::Error => write!(f, "error: {}", self.message),
        }
    }
}
