//! The BoltStudio agent loop.
//!
//! An **episode** turns one user objective into staged file changes:
//!
//! 1. **Checkpoint** the canonical files (optional)
//! 2. **Stream** a model turn, re-extracting directives from the whole buffer
//!    on every chunk and staging file proposals as they appear
//! 3. **Run tools** the turn asked for and feed the results back, or
//!    **re-prompt** a turn that produced nothing actionable
//! 4. **Stop** when the model is done, repeats itself, fails, is cancelled or
//!    the turn budget runs out
//!
//! Staged files are never applied to the canonical set here; accepting them
//! is the caller's decision.

pub mod extractor;
pub mod loop_runner;
pub mod mode;
pub mod outcome;
pub mod prompt;
pub mod session;

#[cfg(test)]
mod test_helpers;

pub use extractor::{Extraction, extract};
pub use loop_runner::{AgentLoop, DEFAULT_MAX_TURNS};
pub use mode::AgentMode;
pub use outcome::{EpisodeOutcome, EpisodeReport};
pub use session::{LastEpisode, Session, SessionState, UNTITLED_PROJECT};
pub use tokio_util::sync::CancellationToken;
