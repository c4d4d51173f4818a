//! Line-level change summaries for staged files.

use serde::{Deserialize, Serialize};
use similar::{ChangeTag, TextDiff};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffStats {
    pub additions: usize,
    pub deletions: usize,
}

impl DiffStats {
    pub fn is_empty(&self) -> bool {
        self.additions == 0 && self.deletions == 0
    }
}

/// Count added and removed lines between `original` and `proposed`. A missing
/// original counts every proposed line as added.
pub fn diff_stats(original: Option<&str>, proposed: &str) -> DiffStats {
    let diff = TextDiff::from_lines(original.unwrap_or(""), proposed);
    diff.iter_all_changes()
        .fold(DiffStats::default(), |mut stats, change| {
            match change.tag() {
                ChangeTag::Insert => stats.additions += 1,
                ChangeTag::Delete => stats.deletions += 1,
                ChangeTag::Equal => {}
            }
            stats
        })
}
