//! Text the loop feeds the model besides the conversation itself.

use crate::mode::AgentMode;
use boltstudio_core::directive::ToolDirective;
use chrono::{DateTime, SecondsFormat, Utc};
use std::fmt::Write as _;

/// The standing instructions: who the model is, what the project looks like
/// and the response protocol it must follow.
pub fn system_prompt(project_name: &str, paths: &[String], mode: AgentMode) -> String {
    let workspace = if paths.is_empty() {
        "(empty)".to_string()
    } else {
        paths.join(", ")
    };

    format!(
        r####"You are BOLT STUDIO, an elite AI architect.
Project: {project_name}
Current Workspace: {workspace}.
Mode: {mode}. {guidance}

RESPONSE STRUCTURE:
1. **Human Summary**: Briefly explain the solution.
2. **Technical Plan**:
   - Mandatory: wrap your structured plan in <bolt_plan> tags.
   - Each step should be: <step id="..." title="..." description="..." />
   - Keep steps concise but clear.
3. **Implementation**: Mandatory: use "### FILE: path/to/file" followed by a fenced code block with the full file content for every change.
4. **Tools**: When you need to inspect or act on the environment, emit
   <bolt_tool type="KIND">one-line description
   argument</bolt_tool>
   where KIND is one of: shell, npm, search, file, readDir, find, webRead, webSearch, deleteFile.
   Tool results are sent back to you in the next turn.
5. **Conclusion**: Very short wrap-up.

STRICT RULES:
- Never skip the <bolt_plan> and <step> tags for any complex task.
- Provide full file contents for files, never fragments or diffs.
- Be technical but extremely concise."####,
        guidance = mode.guidance(),
    )
}

/// The per-turn view of the environment.
pub fn environment_snapshot(active_file: Option<&str>, index: &str, now: DateTime<Utc>) -> String {
    format!(
        "ENVIRONMENT:\nActive file: {}\nTimestamp: {}\n\n{}",
        active_file.unwrap_or("(none)"),
        now.to_rfc3339_opts(SecondsFormat::Secs, true),
        index.trim_end()
    )
}

/// Injected when a mode that expects changes got a turn with none.
pub fn corrective_message(mode: AgentMode) -> String {
    format!(
        "Your last response did not change any files or call any tools, but this is a {mode} task. \
         Act now: emit \"### FILE: path\" blocks with full file contents, or <bolt_tool> calls to \
         gather what you need. Do not repeat the previous answer."
    )
}

/// Summarize tool executions for the next turn's context.
pub fn tool_results_message(results: &[(ToolDirective, String)]) -> String {
    let mut out = String::from("TOOL RESULTS:\n");
    for (directive, output) in results {
        let _ = write!(
            out,
            "\n[{}] {}\n$ {}\n{}\n",
            directive.kind,
            directive.description,
            directive.args,
            output.trim_end()
        );
    }
    out.push_str("\nContinue the task using these results.");
    out
}

/// Name of the checkpoint taken before an episode touches anything.
pub fn pre_task_checkpoint_name(objective: &str) -> String {
    let head: String = objective.chars().take(30).collect();
    format!("Pre-Task: {head}...")
}

/// Derive a project title from the first objective: first five words with
/// punctuation removed and the first letter capitalized.
pub fn project_name_from_objective(objective: &str) -> Option<String> {
    let words: Vec<String> = objective
        .split_whitespace()
        .take(5)
        .map(|w| w.chars().filter(|c| c.is_alphanumeric() || *c == '_').collect::<String>())
        .filter(|w| !w.is_empty())
        .collect();

    let title = words.join(" ");
    let mut chars = title.chars();
    let first = chars.next()?;
    Some(first.to_uppercase().chain(chars).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use boltstudio_core::directive::ToolKind;
    use chrono::TimeZone;

    #[test]
    fn system_prompt_lists_workspace_and_protocol() {
        let prompt = system_prompt(
            "Todo App",
            &["src/App.tsx".into(), "package.json".into()],
            AgentMode::Fix,
        );
        assert!(prompt.contains("Project: Todo App"));
        assert!(prompt.contains("Current Workspace: src/App.tsx, package.json."));
        assert!(prompt.contains("Mode: fix."));
        assert!(prompt.contains("<bolt_plan>"));
        assert!(prompt.contains("### FILE: path/to/file"));
        assert!(prompt.contains("readDir"));
    }

    #[test]
    fn environment_snapshot_has_rfc3339_timestamp() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 30, 0).unwrap();
        let snapshot = environment_snapshot(Some("src/App.tsx"), "PROJECT STRUCTURE:\n", now);
        assert!(snapshot.contains("Active file: src/App.tsx"));
        assert!(snapshot.contains("Timestamp: 2026-03-01T12:30:00Z"));
        assert!(snapshot.ends_with("PROJECT STRUCTURE:"));

        let snapshot = environment_snapshot(None, "", now);
        assert!(snapshot.contains("Active file: (none)"));
    }

    #[test]
    fn tool_results_include_each_output() {
        let results = vec![
            (
                ToolDirective {
                    kind: ToolKind::Shell,
                    args: "ls".into(),
                    description: "List files".into(),
                },
                "src\npackage.json\n".to_string(),
            ),
            (
                ToolDirective {
                    kind: ToolKind::File,
                    args: "missing.ts".into(),
                    description: "Read it".into(),
                },
                "[File Error] Could not read file: missing.ts".to_string(),
            ),
        ];
        let message = tool_results_message(&results);
        assert!(message.contains("[shell] List files\n$ ls\nsrc\npackage.json\n"));
        assert!(message.contains("[File Error] Could not read file: missing.ts"));
    }

    #[test]
    fn checkpoint_name_truncates_objective() {
        assert_eq!(
            pre_task_checkpoint_name("Build a todo app with drag and drop support"),
            "Pre-Task: Build a todo app with drag and..."
        );
        assert_eq!(pre_task_checkpoint_name("short"), "Pre-Task: short...");
    }

    #[test]
    fn project_naming() {
        assert_eq!(
            project_name_from_objective("build a todo-app, with drag & drop!").as_deref(),
            Some("Build a todoapp with drag")
        );
        assert_eq!(project_name_from_objective("!!! ???"), None);
    }
}
