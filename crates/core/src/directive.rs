//! Directive types: structured instructions embedded in model output.
//!
//! The model's streamed text carries three kinds of directive: a plan block,
//! file changes, and tool calls. The extractor turns text into the closed
//! [`Directive`] enum; the loop handles each variant exhaustively.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Progress of a single plan step.
///
/// Statuses only move forward: `Pending → InProgress → Completed`, or to
/// `Error` from any non-terminal state. A step is never put back to pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Completed,
    Error,
}

impl StepStatus {
    fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::InProgress => 1,
            Self::Completed | Self::Error => 2,
        }
    }

    /// Whether a transition from `self` to `next` is allowed.
    pub fn can_advance_to(self, next: StepStatus) -> bool {
        next.rank() > self.rank()
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

/// One step of the model's announced plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanStep {
    pub id: String,
    pub title: String,
    pub description: String,
    pub status: StepStatus,
}

impl PlanStep {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: description.into(),
            status: StepStatus::Pending,
        }
    }

    /// Move to `next` if that is a forward transition. Returns whether the
    /// status changed.
    pub fn advance(&mut self, next: StepStatus) -> bool {
        if self.status.can_advance_to(next) {
            self.status = next;
            true
        } else {
            false
        }
    }
}

/// A proposed full replacement of one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDirective {
    pub path: String,
    pub content: String,
}

/// The side effect a tool directive requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ToolKind {
    Shell,
    Npm,
    Search,
    File,
    ReadDir,
    Find,
    WebRead,
    WebSearch,
    DeleteFile,
}

impl ToolKind {
    pub const ALL: [ToolKind; 9] = [
        Self::Shell,
        Self::Npm,
        Self::Search,
        Self::File,
        Self::ReadDir,
        Self::Find,
        Self::WebRead,
        Self::WebSearch,
        Self::DeleteFile,
    ];

    /// The `type` attribute value used on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Shell => "shell",
            Self::Npm => "npm",
            Self::Search => "search",
            Self::File => "file",
            Self::ReadDir => "readDir",
            Self::Find => "find",
            Self::WebRead => "webRead",
            Self::WebSearch => "webSearch",
            Self::DeleteFile => "deleteFile",
        }
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a `type` attribute names no known tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownToolKind(pub String);

impl fmt::Display for UnknownToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown tool type '{}'", self.0)
    }
}

impl std::error::Error for UnknownToolKind {}

impl FromStr for ToolKind {
    type Err = UnknownToolKind;

    /// Case-insensitive so `readdir` and `readDir` both resolve.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| UnknownToolKind(s.to_string()))
    }
}

/// A requested side effect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolDirective {
    pub kind: ToolKind,
    /// Argument payload (command, path, url, query...)
    pub args: String,
    /// Human-readable first line of the tool body
    pub description: String,
}

/// Anything the extractor can find in model output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Directive {
    Plan(Vec<PlanStep>),
    File(FileDirective),
    Tool(ToolDirective),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steps_only_move_forward() {
        let mut step = PlanStep::new("1", "Scaffold", "Create files");
        assert!(step.advance(StepStatus::InProgress));
        assert!(!step.advance(StepStatus::Pending));
        assert!(step.advance(StepStatus::Completed));
        assert!(!step.advance(StepStatus::InProgress));
        assert!(!step.advance(StepStatus::Error));
        assert_eq!(step.status, StepStatus::Completed);
    }

    #[test]
    fn pending_can_jump_to_error() {
        let mut step = PlanStep::new("1", "t", "d");
        assert!(step.advance(StepStatus::Error));
        assert!(step.status.is_terminal());
    }

    #[test]
    fn tool_kind_parses_wire_names() {
        for kind in ToolKind::ALL {
            assert_eq!(kind.as_str().parse::<ToolKind>().unwrap(), kind);
        }
        assert_eq!("READDIR".parse::<ToolKind>().unwrap(), ToolKind::ReadDir);
        assert!("format_disk".parse::<ToolKind>().is_err());
    }

    #[test]
    fn status_serializes_kebab_case() {
        let json = serde_json::to_string(&StepStatus::InProgress).unwrap();
        assert_eq!(json, r#""in-progress""#);
    }
}
