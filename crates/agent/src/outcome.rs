//! Terminal states of an episode.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum EpisodeOutcome {
    /// The model finished the task.
    Done,
    /// Two consecutive turns produced byte-identical output.
    Stalled,
    /// The turn budget ran out while the loop still wanted to continue.
    BudgetExhausted,
    /// Cancelled from outside. Staged files are kept.
    Aborted,
    /// The endpoint reported the usage allowance as spent.
    FailedQuota(String),
    /// Any other failed model call.
    FailedTransport(String),
    /// Another episode already holds the session; nothing was done.
    AlreadyRunning,
}

impl EpisodeOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::FailedQuota(_) | Self::FailedTransport(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Done => "done",
            Self::Stalled => "stalled",
            Self::BudgetExhausted => "budget_exhausted",
            Self::Aborted => "aborted",
            Self::FailedQuota(_) => "failed_quota",
            Self::FailedTransport(_) => "failed_transport",
            Self::AlreadyRunning => "already_running",
        }
    }
}

impl fmt::Display for EpisodeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Done => f.write_str("Done"),
            Self::Stalled => f.write_str("Stopped: the model repeated itself"),
            Self::BudgetExhausted => f.write_str("Stopped: turn budget reached"),
            Self::Aborted => f.write_str("Aborted"),
            Self::FailedQuota(msg) => write!(f, "Usage limit reached: {msg}"),
            Self::FailedTransport(msg) => write!(f, "Lost connection to the model: {msg}"),
            Self::AlreadyRunning => f.write_str("An episode is already running"),
        }
    }
}

/// Summary handed back to the caller when an episode ends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeReport {
    pub outcome: EpisodeOutcome,
    /// Model invocations issued
    pub turns: u32,
    /// Distinct paths staged during the episode
    pub files_changed: Vec<String>,
    /// Pre-task checkpoint, when one was taken
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint_id: Option<String>,
}

impl EpisodeReport {
    pub(crate) fn noop(outcome: EpisodeOutcome) -> Self {
        Self {
            outcome,
            turns: 0,
            files_changed: Vec::new(),
            checkpoint_id: None,
        }
    }
}
