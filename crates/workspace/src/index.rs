//! Project index: a compact rendering of the file tree plus per-file
//! summaries, given to the model so it can see what already exists.

use std::collections::BTreeMap;
use std::fmt::Write as _;

/// Per-file character budget for files the model most needs to see whole.
pub const CORE_FILE_LIMIT: usize = 5000;
/// Per-file character budget for everything else.
pub const FILE_LIMIT: usize = 2500;

const TRUNCATION_MARKER: &str = "\n... [TRUNCATED FOR TOKENS] ...\n";

/// Manifests, config files and env files get the larger budget.
pub fn is_core_file(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    lower == "package.json"
        || lower.ends_with("/package.json")
        || lower.contains("config")
        || lower.ends_with(".env")
}

fn floor_boundary(s: &str, mut idx: usize) -> usize {
    idx = idx.min(s.len());
    while !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn ceil_boundary(s: &str, mut idx: usize) -> usize {
    idx = idx.min(s.len());
    while !s.is_char_boundary(idx) {
        idx += 1;
    }
    idx
}

/// Keep the head and tail of an oversized file with a marker in between.
/// Content within `limit` is returned unchanged.
pub fn truncate_for_tokens(content: &str, limit: usize) -> String {
    if content.len() <= limit {
        return content.to_string();
    }
    let head = floor_boundary(content, limit * 2 / 3);
    let tail = ceil_boundary(content, content.len() - limit / 4);
    format!("{}{TRUNCATION_MARKER}{}", &content[..head], &content[tail..])
}

#[derive(Default)]
struct Node {
    children: BTreeMap<String, Node>,
    is_file: bool,
}

fn render_tree(node: &Node, prefix: &str, out: &mut String) {
    let count = node.children.len();
    for (i, (name, child)) in node.children.iter().enumerate() {
        let last = i + 1 == count;
        let branch = if last { "└── " } else { "├── " };
        let suffix = if child.is_file && child.children.is_empty() { "" } else { "/" };
        let _ = writeln!(out, "{prefix}{branch}{name}{suffix}");
        let nested = format!("{prefix}{}", if last { "    " } else { "│   " });
        render_tree(child, &nested, out);
    }
}

/// Render the tree of `files` followed by a summary of every file.
pub fn project_index(files: &BTreeMap<String, String>) -> String {
    if files.is_empty() {
        return "(empty project)\n".to_string();
    }

    let mut root = Node::default();
    for path in files.keys() {
        let mut node = &mut root;
        for part in path.split('/').filter(|p| !p.is_empty()) {
            node = node.children.entry(part.to_string()).or_default();
        }
        node.is_file = true;
    }

    let mut out = String::from("PROJECT STRUCTURE:\n");
    render_tree(&root, "", &mut out);
    out.push_str("\nFILE CONTENTS:\n");

    for (path, content) in files {
        let limit = if is_core_file(path) { CORE_FILE_LIMIT } else { FILE_LIMIT };
        let _ = write!(
            out,
            "\n### FILE: {path}\n```\n{}\n```\n",
            truncate_for_tokens(content, limit)
        );
    }
    out
}
