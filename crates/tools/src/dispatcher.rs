//! The tool dispatcher: executes one tool directive against the sandbox and
//! proxy collaborators and always answers with text.
//!
//! Every failure is folded into a descriptive string so the loop can hand it
//! back to the model as context. Nothing here returns an error.

use crate::text::{bound_chars, html_to_text, shell_quote};
use boltstudio_config::ToolsConfig;
use boltstudio_core::directive::{ToolDirective, ToolKind};
use boltstudio_core::error::ToolError;
use boltstudio_core::sandbox::{Sandbox, WebProxy};
use boltstudio_workspace::SharedWorkspace;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Tunables for output shaping and external lookups.
#[derive(Debug, Clone)]
pub struct ToolLimits {
    pub web_read_limit: usize,
    pub find_max_depth: u32,
    pub search_endpoint: String,
    pub related_results: usize,
}

impl Default for ToolLimits {
    fn default() -> Self {
        Self::from(&ToolsConfig::default())
    }
}

impl From<&ToolsConfig> for ToolLimits {
    fn from(config: &ToolsConfig) -> Self {
        Self {
            web_read_limit: config.web_read_limit,
            find_max_depth: config.find_max_depth,
            search_endpoint: config.search_endpoint.clone(),
            related_results: config.related_results,
        }
    }
}

/// Instant-answer payload returned by the search endpoint.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InstantAnswer {
    #[serde(default)]
    abstract_text: String,
    #[serde(default)]
    related_topics: Vec<RelatedTopic>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RelatedTopic {
    #[serde(default)]
    text: Option<String>,
}

pub struct ToolDispatcher {
    sandbox: Arc<dyn Sandbox>,
    proxy: Arc<dyn WebProxy>,
    limits: ToolLimits,
}

impl ToolDispatcher {
    pub fn new(sandbox: Arc<dyn Sandbox>, proxy: Arc<dyn WebProxy>) -> Self {
        Self {
            sandbox,
            proxy,
            limits: ToolLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: ToolLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn sandbox(&self) -> &Arc<dyn Sandbox> {
        &self.sandbox
    }

    /// Execute one directive. `workspace` is consulted only by `deleteFile`,
    /// which must keep the staging store in step with the sandbox.
    pub async fn execute(&self, directive: &ToolDirective, workspace: &SharedWorkspace) -> String {
        let args = directive.args.trim();
        debug!(kind = %directive.kind, description = %directive.description, "Executing tool");
        let started = Instant::now();

        let output = match directive.kind {
            ToolKind::Shell => self.shell(args).await,
            ToolKind::Npm => self.npm(args).await,
            ToolKind::Search => self.search(args).await,
            ToolKind::File => self.read_file(args).await,
            ToolKind::ReadDir => self.read_dir(args).await,
            ToolKind::Find => self.find(args).await,
            ToolKind::WebRead => self.web_read(args).await,
            ToolKind::WebSearch => self.web_search(args).await,
            ToolKind::DeleteFile => self.delete_file(args, workspace).await,
        };

        debug!(
            kind = %directive.kind,
            elapsed_ms = started.elapsed().as_millis() as u64,
            bytes = output.len(),
            "Tool finished"
        );
        output
    }

    async fn shell(&self, command: &str) -> String {
        if command.is_empty() {
            return format!(
                "[Execution Error] {}",
                ToolError::MissingArgument { kind: "shell".into() }
            );
        }

        match self.sandbox.spawn(command).await {
            Ok(out) if !out.success() => {
                format!("[Error] Exit code {}: {}", out.exit_code, out.output.trim_end())
            }
            Ok(out) if out.output.trim().is_empty() => "Done (no output)".to_string(),
            Ok(out) => out.output,
            Err(e) => {
                warn!(error = %e, "Shell execution failed");
                format!("[Execution Error] {e}")
            }
        }
    }

    async fn npm(&self, packages: &str) -> String {
        if packages.is_empty() {
            return self.shell("npm install").await;
        }
        self.shell(&format!("npm install {packages}")).await
    }

    async fn search(&self, pattern: &str) -> String {
        if pattern.is_empty() {
            return format!(
                "[Execution Error] {}",
                ToolError::MissingArgument { kind: "search".into() }
            );
        }
        self.shell(&format!(
            "grep -rn --exclude-dir=node_modules --exclude-dir=.git -- {} .",
            shell_quote(pattern)
        ))
        .await
    }

    async fn find(&self, glob: &str) -> String {
        if glob.is_empty() {
            return format!(
                "[Execution Error] {}",
                ToolError::MissingArgument { kind: "find".into() }
            );
        }
        self.shell(&format!(
            "find . -maxdepth {} -name {}",
            self.limits.find_max_depth,
            shell_quote(glob)
        ))
        .await
    }

    async fn read_file(&self, path: &str) -> String {
        match self.sandbox.read_file(path).await {
            Ok(content) => content,
            Err(e) => {
                debug!(path = %path, error = %e, "File read failed");
                format!("[File Error] Could not read file: {path}")
            }
        }
    }

    async fn read_dir(&self, path: &str) -> String {
        let path = if path.is_empty() { "." } else { path };
        match self.sandbox.read_dir(path).await {
            Ok(entries) if entries.is_empty() => "(empty directory)".to_string(),
            Ok(entries) => entries
                .iter()
                .map(|e| format!("{} {}", if e.is_dir { "[DIR] " } else { "[FILE]" }, e.name))
                .collect::<Vec<_>>()
                .join("\n"),
            Err(e) => {
                debug!(path = %path, error = %e, "Directory read failed");
                format!("[FS Error] Could not read directory: {path}")
            }
        }
    }

    async fn web_read(&self, url: &str) -> String {
        let page = match self.proxy.fetch(url).await {
            Ok(page) => page,
            Err(e) => return format!("[Web Error] Could not fetch URL via proxy: {e}"),
        };
        let limit = self.limits.web_read_limit;

        if page.is_json() {
            return match serde_json::from_str::<serde_json::Value>(&page.content)
                .and_then(|v| serde_json::to_string_pretty(&v))
            {
                Ok(pretty) => format!("[JSON Data]\n```json\n{}\n```", bound_chars(&pretty, limit)),
                Err(_) => bound_chars(&page.content, limit),
            };
        }

        bound_chars(&html_to_text(&page.content), limit)
    }

    fn search_url(&self, query: &str) -> Result<String, ToolError> {
        reqwest::Url::parse_with_params(
            &self.limits.search_endpoint,
            &[("q", query), ("format", "json"), ("no_html", "1")],
        )
        .map(String::from)
        .map_err(|e| ToolError::InvalidResponse(e.to_string()))
    }

    async fn web_search(&self, query: &str) -> String {
        let failure = || format!("[Search Error] Could not perform search: {query}");
        if query.is_empty() {
            return failure();
        }

        let Ok(url) = self.search_url(query) else {
            return failure();
        };
        let answer: InstantAnswer = match self.proxy.fetch(&url).await {
            Ok(page) => match serde_json::from_str(&page.content) {
                Ok(answer) => answer,
                Err(e) => {
                    debug!(error = %e, "Search response was not an instant answer");
                    return failure();
                }
            },
            Err(e) => {
                debug!(error = %e, "Search request failed");
                return failure();
            }
        };

        let related: Vec<String> = answer
            .related_topics
            .into_iter()
            .filter_map(|t| t.text)
            .take(self.limits.related_results)
            .collect();

        format!(
            "[Search Results for \"{query}\"]\nAbstract: {}\nResults: {}",
            answer.abstract_text,
            related.join("\n")
        )
    }

    /// Remove from the sandbox first; the staging store follows only when the
    /// sandbox removal succeeded, so the two never disagree.
    async fn delete_file(&self, path: &str, workspace: &SharedWorkspace) -> String {
        if path.is_empty() {
            return "[Delete Error] Could not delete: (no path given)".to_string();
        }

        match self.sandbox.remove(path).await {
            Ok(()) => {
                let removed = workspace.write().await.delete_file(path);
                debug!(path = %path, removed, "Deleted from sandbox and workspace");
                format!("Successfully deleted: {path}")
            }
            Err(e) => {
                warn!(path = %path, error = %e, "Delete failed");
                format!("[Delete Error] Could not delete: {path}")
            }
        }
    }
}
