//! Agent modes: the kind of task an episode is working on.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentMode {
    #[default]
    Build,
    Fix,
    Refactor,
    Ui,
    Deploy,
}

impl AgentMode {
    pub const ALL: [AgentMode; 5] = [
        Self::Build,
        Self::Fix,
        Self::Refactor,
        Self::Ui,
        Self::Deploy,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Build => "build",
            Self::Fix => "fix",
            Self::Refactor => "refactor",
            Self::Ui => "ui",
            Self::Deploy => "deploy",
        }
    }

    /// Whether a turn that changes nothing and calls no tools counts as a
    /// failure to act.
    pub fn expects_output(self) -> bool {
        matches!(self, Self::Build | Self::Fix | Self::Refactor)
    }

    /// One line of mode-specific guidance for the system prompt.
    pub fn guidance(self) -> &'static str {
        match self {
            Self::Build => "Build what the user asks for. Create or change files to deliver it.",
            Self::Fix => "Diagnose the reported problem and ship the corrected files.",
            Self::Refactor => "Restructure the existing code without changing its behaviour.",
            Self::Ui => "Focus on layout, styling and interaction quality.",
            Self::Deploy => "Prepare the project for deployment and explain the steps.",
        }
    }
}

impl fmt::Display for AgentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| {
                format!("unknown mode '{s}' (expected build, fix, refactor, ui or deploy)")
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_expectations() {
        assert!(AgentMode::Build.expects_output());
        assert!(AgentMode::Fix.expects_output());
        assert!(AgentMode::Refactor.expects_output());
        assert!(!AgentMode::Ui.expects_output());
        assert!(!AgentMode::Deploy.expects_output());
    }

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("FIX".parse::<AgentMode>().unwrap(), AgentMode::Fix);
        assert_eq!(" ui ".parse::<AgentMode>().unwrap(), AgentMode::Ui);
        assert!("ship-it".parse::<AgentMode>().is_err());
    }
}
