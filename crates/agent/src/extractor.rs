//! Directive extraction from streamed model output.
//!
//! [`extract`] is a pure function of the buffer: it keeps no state between
//! calls, so re-running it on a longer prefix of the same stream re-derives
//! everything from scratch. The result for the complete text therefore does
//! not depend on how the stream was chunked.
//!
//! The scanner walks the buffer with a cursor, always taking the earliest of
//! three openers:
//!
//! - `<bolt_plan>` … `</bolt_plan>` holding `<step id=".." title=".."
//!   description=".." />` tags. Only the first complete block counts.
//! - A `### FILE: <path>` marker line followed by a fenced block. The block
//!   ends at a closing fence, at the next marker line, or at end of buffer.
//!   Nothing inside a file block is interpreted as markup.
//! - `<bolt_tool type="..">description\nargs</bolt_tool>`, complete pairs only.
//!
//! Anything malformed or still incomplete produces no directive.

use boltstudio_core::directive::{Directive, FileDirective, PlanStep, ToolDirective, ToolKind};
use tracing::trace;

const PLAN_OPEN: &str = "<bolt_plan";
const PLAN_CLOSE: &str = "</bolt_plan>";
const TOOL_OPEN: &str = "<bolt_tool";
const TOOL_CLOSE: &str = "</bolt_tool>";
const STEP_OPEN: &str = "<step";

/// Everything found in one buffer, in order of appearance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    pub directives: Vec<Directive>,
}

impl Extraction {
    pub fn plan_steps(&self) -> Option<&[PlanStep]> {
        self.directives.iter().find_map(|d| match d {
            Directive::Plan(steps) => Some(steps.as_slice()),
            _ => None,
        })
    }

    pub fn files(&self) -> impl Iterator<Item = &FileDirective> {
        self.directives.iter().filter_map(|d| match d {
            Directive::File(f) => Some(f),
            _ => None,
        })
    }

    pub fn tools(&self) -> impl Iterator<Item = &ToolDirective> {
        self.directives.iter().filter_map(|d| match d {
            Directive::Tool(t) => Some(t),
            _ => None,
        })
    }

    pub fn has_files(&self) -> bool {
        self.files().next().is_some()
    }

    pub fn has_tools(&self) -> bool {
        self.tools().next().is_some()
    }
}

/// Scan `buffer` for directives.
pub fn extract(buffer: &str) -> Extraction {
    Scanner::new(buffer).run()
}

enum Opener {
    Plan(usize),
    Tool(usize),
    File(FileMarker),
}

impl Opener {
    fn position(&self) -> usize {
        match self {
            Self::Plan(p) | Self::Tool(p) => *p,
            Self::File(m) => m.line_start,
        }
    }
}

struct FileMarker {
    line_start: usize,
    /// Index just past the marker line's newline, or the buffer length
    next_line: usize,
    path: String,
}

struct Scanner<'a> {
    text: &'a str,
    /// ASCII-lowercased copy; byte offsets match `text`
    lower: String,
    pos: usize,
    plan_seen: bool,
    out: Vec<Directive>,
}

impl<'a> Scanner<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            lower: text.to_ascii_lowercase(),
            pos: 0,
            plan_seen: false,
            out: Vec::new(),
        }
    }

    fn run(mut self) -> Extraction {
        while let Some(opener) = self.next_opener() {
            match opener {
                Opener::Plan(at) => self.plan(at),
                Opener::Tool(at) => self.tool(at),
                Opener::File(marker) => self.file(marker),
            }
        }
        Extraction {
            directives: self.out,
        }
    }

    fn next_opener(&self) -> Option<Opener> {
        let candidates = [
            find_tag(&self.lower, PLAN_OPEN, self.pos).map(Opener::Plan),
            find_tag(&self.lower, TOOL_OPEN, self.pos).map(Opener::Tool),
            next_file_marker(self.text, self.pos).map(Opener::File),
        ];
        candidates.into_iter().flatten().min_by_key(Opener::position)
    }

    fn plan(&mut self, at: usize) {
        let Some(open_end) = find_tag_end(self.text, at + PLAN_OPEN.len()) else {
            self.pos = at + PLAN_OPEN.len();
            return;
        };
        let Some(close) = find_from(&self.lower, PLAN_CLOSE, open_end) else {
            // Not closed yet: step over the opener and keep scanning
            self.pos = at + PLAN_OPEN.len();
            return;
        };
        self.pos = close + PLAN_CLOSE.len();

        if self.plan_seen {
            trace!("Ignoring additional plan block");
            return;
        }
        self.plan_seen = true;

        let steps = parse_steps(&self.text[open_end..close], &self.lower[open_end..close]);
        if !steps.is_empty() {
            self.out.push(Directive::Plan(steps));
        }
    }

    fn tool(&mut self, at: usize) {
        let attrs_start = at + TOOL_OPEN.len();
        let Some(open_end) = find_tag_end(self.text, attrs_start) else {
            self.pos = attrs_start;
            return;
        };
        let Some(close) = find_from(&self.lower, TOOL_CLOSE, open_end) else {
            self.pos = attrs_start;
            return;
        };
        self.pos = close + TOOL_CLOSE.len();

        let attrs = parse_attributes(self.text[attrs_start..open_end - 1].trim_end_matches('/'));
        let Some(kind) = attribute(&attrs, "type").and_then(|t| t.parse::<ToolKind>().ok()) else {
            trace!("Skipping tool tag without a known type");
            return;
        };

        let body = self.text[open_end..close].trim();
        let (description, args) = match body.split_once('\n') {
            Some((first, rest)) => (first.trim(), rest.trim()),
            None => (body, ""),
        };

        self.out.push(Directive::Tool(ToolDirective {
            kind,
            args: args.to_string(),
            description: description.to_string(),
        }));
    }

    fn file(&mut self, marker: FileMarker) {
        let text = self.text;
        self.pos = marker.next_line;

        // The next non-blank line must open a fence
        let mut line_start = marker.next_line;
        let (fence, content_start) = loop {
            let Some((line, line_end)) = line_at(text, line_start) else {
                return;
            };
            if line.trim().is_empty() {
                line_start = line_end;
                continue;
            }
            match fence_width(line) {
                // An unterminated fence line may still be growing
                Some(width) if text[..line_end].ends_with('\n') => break (width, line_end),
                _ => return,
            }
        };

        let mut cursor = content_start;
        while let Some((line, line_end)) = line_at(text, cursor) {
            let terminated = text[..line_end].ends_with('\n');

            if is_closing_fence(line, fence) {
                let content = text[content_start..cursor]
                    .strip_suffix('\n')
                    .map(|c| c.strip_suffix('\r').unwrap_or(c))
                    .unwrap_or(&text[content_start..cursor]);
                self.push_file(&marker.path, content);
                self.pos = line_end;
                return;
            }

            if parse_file_marker(line).is_some() {
                // A new marker ends an unclosed block
                self.push_file(&marker.path, text[content_start..cursor].trim_end());
                self.pos = cursor;
                return;
            }

            if !terminated {
                // Final partial line; a lone run of backticks is a fence still arriving
                let content = if line.trim().chars().all(|c| c == '`') {
                    &text[content_start..cursor]
                } else {
                    &text[content_start..]
                };
                self.push_file(&marker.path, content.trim_end());
                self.pos = text.len();
                return;
            }
            cursor = line_end;
        }

        // Buffer ends right after the opening fence or after a newline
        self.push_file(&marker.path, text[content_start..].trim_end());
        self.pos = text.len();
    }

    fn push_file(&mut self, path: &str, content: &str) {
        self.out.push(Directive::File(FileDirective {
            path: path.to_string(),
            content: content.to_string(),
        }));
    }
}

/// The line starting at `start` (without its newline) and the index just
/// past it. `None` at end of buffer.
fn line_at(text: &str, start: usize) -> Option<(&str, usize)> {
    if start >= text.len() {
        return None;
    }
    match text[start..].find('\n') {
        Some(i) => Some((text[start..start + i].trim_end_matches('\r'), start + i + 1)),
        None => Some((text[start..].trim_end_matches('\r'), text.len())),
    }
}

fn find_from(haystack: &str, needle: &str, from: usize) -> Option<usize> {
    haystack.get(from..)?.find(needle).map(|i| from + i)
}

/// Find `<name` followed by whitespace, `/` or `>` (so `<bolt_tools` does not
/// match `<bolt_tool`).
fn find_tag(lower: &str, open: &str, from: usize) -> Option<usize> {
    let mut search = from;
    while let Some(at) = find_from(lower, open, search) {
        match lower[at + open.len()..].chars().next() {
            Some(c) if c.is_whitespace() || c == '>' || c == '/' => return Some(at),
            None => return None,
            _ => search = at + open.len(),
        }
    }
    None
}

/// Index just past the `>` closing a tag whose attributes start at `from`.
/// Quoted attribute values may contain `>`.
fn find_tag_end(text: &str, from: usize) -> Option<usize> {
    let mut quote: Option<char> = None;
    for (i, c) in text.get(from..)?.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '>') => return Some(from + i + 1),
            _ => {}
        }
    }
    None
}

/// Parse `name="value"` pairs. Names are lowercased; values may use single
/// or double quotes, or be bare words. Entities in values are decoded.
fn parse_attributes(s: &str) -> Vec<(String, String)> {
    let mut attrs = Vec::new();
    let mut chars = s.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        if !(c.is_alphanumeric() || c == '_' || c == '-' || c == ':') {
            chars.next();
            continue;
        }

        let mut name_end = start;
        while let Some(&(i, c)) = chars.peek() {
            if c.is_alphanumeric() || c == '_' || c == '-' || c == ':' {
                name_end = i + c.len_utf8();
                chars.next();
            } else {
                break;
            }
        }
        let name = s[start..name_end].to_ascii_lowercase();

        while chars.peek().is_some_and(|&(_, c)| c.is_whitespace()) {
            chars.next();
        }
        if chars.peek().is_none_or(|&(_, c)| c != '=') {
            continue; // valueless attribute
        }
        chars.next();
        while chars.peek().is_some_and(|&(_, c)| c.is_whitespace()) {
            chars.next();
        }

        let value = match chars.peek().copied() {
            Some((i, q @ ('"' | '\''))) => {
                chars.next();
                let value_start = i + 1;
                let mut value_end = None;
                for (j, c) in chars.by_ref() {
                    if c == q {
                        value_end = Some(j);
                        break;
                    }
                }
                // An unterminated quote leaves nothing trustworthy to parse
                let Some(value_end) = value_end else { break };
                &s[value_start..value_end]
            }
            Some((i, _)) => {
                let mut end = s.len();
                while let Some(&(j, c)) = chars.peek() {
                    if c.is_whitespace() || c == '/' {
                        end = j;
                        break;
                    }
                    chars.next();
                }
                &s[i..end]
            }
            None => break,
        };
        attrs.push((name, decode_entities(value)));
    }
    attrs
}

fn attribute<'a>(attrs: &'a [(String, String)], name: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|(n, _)| n == name)
        .map(|(_, v)| v.as_str())
}

fn decode_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

/// Every `<step ..>` in a plan body that carries id, title and description.
fn parse_steps(body: &str, lower: &str) -> Vec<PlanStep> {
    let mut steps = Vec::new();
    let mut pos = 0;

    while let Some(at) = find_tag(lower, STEP_OPEN, pos) {
        let attrs_start = at + STEP_OPEN.len();
        let Some(end) = find_tag_end(body, attrs_start) else {
            break;
        };
        pos = end;

        let attrs = parse_attributes(body[attrs_start..end - 1].trim_end_matches('/'));
        match (
            attribute(&attrs, "id"),
            attribute(&attrs, "title"),
            attribute(&attrs, "description"),
        ) {
            (Some(id), Some(title), Some(description)) if !id.trim().is_empty() => {
                steps.push(PlanStep::new(id.trim(), title.trim(), description.trim()));
            }
            _ => trace!("Skipping plan step with missing attributes"),
        }
    }
    steps
}

/// Recognize `### FILE: path` (case-insensitive keyword, optional colon,
/// path optionally wrapped in backticks or emphasis).
fn parse_file_marker(line: &str) -> Option<String> {
    let rest = line.trim_start().strip_prefix("###")?.trim_start();
    if rest.len() < 4 || !rest.is_char_boundary(4) || !rest[..4].eq_ignore_ascii_case("file") {
        return None;
    }
    let rest = &rest[4..];
    let rest = match rest.strip_prefix(':') {
        Some(r) => r,
        None if rest.starts_with(char::is_whitespace) => rest,
        None => return None,
    };
    let path = rest.trim().trim_matches(|c| c == '`' || c == '*' || c == '"' || c == '\'');
    let path = path.trim();
    if path.is_empty() {
        None
    } else {
        Some(path.to_string())
    }
}

/// The first complete marker line at or after `pos`.
fn next_file_marker(text: &str, pos: usize) -> Option<FileMarker> {
    let mut line_start = if pos == 0 || text[..pos].ends_with('\n') {
        pos
    } else {
        pos + text[pos..].find('\n')? + 1
    };

    while let Some((line, next_line)) = line_at(text, line_start) {
        // A marker line still being streamed may not have its full path yet
        if next_line < text.len() || text.ends_with('\n') {
            if let Some(path) = parse_file_marker(line) {
                return Some(FileMarker {
                    line_start,
                    next_line,
                    path,
                });
            }
        }
        line_start = next_line;
    }
    None
}

/// Width of an opening fence (three or more backticks, optional info string).
fn fence_width(line: &str) -> Option<usize> {
    let trimmed = line.trim_start();
    let width = trimmed.chars().take_while(|&c| c == '`').count();
    (width >= 3).then_some(width)
}

fn is_closing_fence(line: &str, width: usize) -> bool {
    let trimmed = line.trim();
    trimmed.len() >= width && trimmed.chars().all(|c| c == '`')
}

#[cfg(test)]
mod tests {
    use super::*;
    use boltstudio_core::directive::StepStatus;

    const RESPONSE: &str = r#"I'll build a counter app with a button.

<bolt_plan>
  <step id="1" title="Scaffold" description="Create the entry point" />
  <step title='Counter' id='2' description="State &amp; button"/>
</bolt_plan>

### FILE: src/App.tsx
```tsx
export default function App() {
  return <Counter label="Zähler" />;
}
```

### FILE: src/Counter.tsx
```tsx
export function Counter() { return null; }
```

<bolt_tool type="npm">Install the runtime
react react-dom</bolt_tool>

Done, run `npm run dev`.
"#;

    fn paths(e: &Extraction) -> Vec<&str> {
        e.files().map(|f| f.path.as_str()).collect()
    }

    #[test]
    fn full_response() {
        let e = extract(RESPONSE);

        let steps = e.plan_steps().unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].id, "1");
        assert_eq!(steps[1].title, "Counter");
        assert_eq!(steps[1].description, "State & button");
        assert!(steps.iter().all(|s| s.status == StepStatus::Pending));

        assert_eq!(paths(&e), vec!["src/App.tsx", "src/Counter.tsx"]);
        let app = e.files().next().unwrap();
        assert_eq!(
            app.content,
            "export default function App() {\n  return <Counter label=\"Zähler\" />;\n}"
        );

        let tools: Vec<_> = e.tools().collect();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].kind, ToolKind::Npm);
        assert_eq!(tools[0].description, "Install the runtime");
        assert_eq!(tools[0].args, "react react-dom");
    }

    #[test]
    fn idempotent() {
        assert_eq!(extract(RESPONSE), extract(RESPONSE));
    }

    #[test]
    fn every_prefix_is_safe_and_final_result_is_stable() {
        let full = extract(RESPONSE);
        let mut last = Extraction::default();
        for (i, _) in RESPONSE.char_indices() {
            last = extract(&RESPONSE[..i]);
        }
        // The last strict prefix only lacks the trailing newline
        assert_eq!(last, full);
        assert_eq!(extract(RESPONSE), full);
    }

    #[test]
    fn chunk_boundaries_do_not_matter() {
        let full = extract(RESPONSE);
        for chunk_size in [1, 2, 3, 7, 16, 64] {
            let mut buffer = String::new();
            let mut chars = RESPONSE.chars().peekable();
            while chars.peek().is_some() {
                buffer.extend(chars.by_ref().take(chunk_size));
                let _ = extract(&buffer);
            }
            assert_eq!(extract(&buffer), full, "chunk size {chunk_size}");
        }
    }

    #[test]
    fn plan_requires_closing_tag() {
        let partial = "<bolt_plan>\n<step id=\"1\" title=\"a\" description=\"b\" />\n";
        assert!(extract(partial).plan_steps().is_none());

        let closed = format!("{partial}</bolt_plan>");
        assert_eq!(extract(&closed).plan_steps().unwrap().len(), 1);
    }

    #[test]
    fn lenient_step_grammar() {
        let text = r#"<BOLT_PLAN>
<Step DESCRIPTION="d1" id=1 title="t1">
<step id="2" extra="ignored" title="t2 &lt;b&gt;" description='it&apos;s'/>
<step id="3" title="no description" />
<step id="4" title="a > b" description="quoted gt" />
</bolt_plan>"#;
        let steps = extract(text).plan_steps().unwrap().to_vec();
        assert_eq!(steps.len(), 3);
        assert_eq!((steps[0].id.as_str(), steps[0].title.as_str()), ("1", "t1"));
        assert_eq!(steps[1].title, "t2 <b>");
        assert_eq!(steps[1].description, "it's");
        assert_eq!(steps[2].title, "a > b");
    }

    #[test]
    fn only_first_plan_block_counts() {
        let text = r#"<bolt_plan><step id="1" title="a" description="a"/></bolt_plan>
<bolt_plan><step id="9" title="z" description="z"/></bolt_plan>"#;
        let e = extract(text);
        let plans = e
            .directives
            .iter()
            .filter(|d| matches!(d, Directive::Plan(_)))
            .count();
        assert_eq!(plans, 1);
        assert_eq!(e.plan_steps().unwrap()[0].id, "1");
    }

    #[test]
    fn no_bleed_through_between_unclosed_files() {
        let text = "### FILE: a.ts\n```ts\nconst a = 1;\n\n### FILE: b.ts\n```ts\nconst b = 2;\n```\n";
        let e = extract(text);
        let files: Vec<_> = e.files().collect();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].path, "a.ts");
        assert_eq!(files[0].content, "const a = 1;");
        assert_eq!(files[1].path, "b.ts");
        assert_eq!(files[1].content, "const b = 2;");
    }

    #[test]
    fn streaming_file_is_captured_to_end_of_buffer() {
        let e = extract("### FILE: src/main.ts\n```ts\nline one\nline tw");
        let file = e.files().next().unwrap();
        assert_eq!(file.content, "line one\nline tw");

        // A closing fence still arriving is not content
        let e = extract("### FILE: src/main.ts\n```ts\nline one\n``");
        assert_eq!(e.files().next().unwrap().content, "line one");
    }

    #[test]
    fn marker_without_fence_yields_nothing() {
        assert!(!extract("### FILE: a.ts\n").has_files());
        assert!(!extract("### FILE: a.ts\nplain prose\n```\nx\n```").has_files());
        // Opening fence line not finished yet
        assert!(!extract("### FILE: a.ts\n```t").has_files());
        // Marker line not finished yet
        assert!(!extract("### FILE: src/comp").has_files());
    }

    #[test]
    fn marker_variants() {
        assert_eq!(parse_file_marker("### FILE: src/a.ts").as_deref(), Some("src/a.ts"));
        assert_eq!(parse_file_marker("###file:`src/a.ts`").as_deref(), Some("src/a.ts"));
        assert_eq!(parse_file_marker("### File **src/a.ts**").as_deref(), Some("src/a.ts"));
        assert_eq!(parse_file_marker("### FILES: a"), None);
        assert_eq!(parse_file_marker("### FILE:   "), None);
        assert_eq!(parse_file_marker("## FILE: a"), None);
    }

    #[test]
    fn longer_fences_allow_inner_backticks() {
        let text = "### FILE: README.md\n````md\n```sh\nnpm i\n```\n````\n";
        let e = extract(text);
        assert_eq!(e.files().next().unwrap().content, "```sh\nnpm i\n```");
    }

    #[test]
    fn markup_inside_file_content_is_not_interpreted() {
        let text = "### FILE: docs/protocol.md\n```md\n<bolt_tool type=\"shell\">x\nrm -rf /</bolt_tool>\n```\n";
        let e = extract(text);
        assert!(!e.has_tools());
        assert!(e.files().next().unwrap().content.contains("rm -rf"));
    }

    #[test]
    fn tool_requires_complete_pair_and_known_type() {
        assert!(!extract("<bolt_tool type=\"shell\">List\nls -la").has_tools());
        assert!(!extract("<bolt_tool type=\"format_disk\">x\ny</bolt_tool>").has_tools());
        assert!(!extract("<bolt_tool>x\ny</bolt_tool>").has_tools());

        let e = extract("<bolt_tool type='readdir'>Look around</bolt_tool>");
        let tool = e.tools().next().unwrap();
        assert_eq!(tool.kind, ToolKind::ReadDir);
        assert_eq!(tool.description, "Look around");
        assert_eq!(tool.args, "");
    }

    #[test]
    fn multiline_tool_args_are_kept() {
        let e = extract("<bolt_tool type=\"shell\">\n  Build and test\n  npm run build\n  npm test\n</bolt_tool>");
        let tool = e.tools().next().unwrap();
        assert_eq!(tool.description, "Build and test");
        assert_eq!(tool.args, "npm run build\n  npm test");
    }

    #[test]
    fn similar_tag_names_are_not_tools() {
        assert!(!extract("<bolt_tools type=\"shell\">x\ny</bolt_tools>").has_tools());
    }

    #[test]
    fn plain_text_yields_nothing() {
        let e = extract("Sure! Here is an explanation with no changes.");
        assert!(e.directives.is_empty());
    }
}
