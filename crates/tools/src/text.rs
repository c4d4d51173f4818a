//! Text shaping for tool output that goes back into the model's context.

use regex_lite::Regex;

fn replace_all(pattern: &str, text: &str, replacement: &str) -> String {
    match Regex::new(pattern) {
        Ok(re) => re.replace_all(text, replacement).into_owned(),
        Err(_) => text.to_string(),
    }
}

/// Reduce an HTML page to its readable text: script and style blocks
/// removed, remaining tags stripped, whitespace collapsed.
pub fn html_to_text(html: &str) -> String {
    let text = replace_all(r"(?is)<script\b[^>]*>.*?</script>", html, "");
    let text = replace_all(r"(?is)<style\b[^>]*>.*?</style>", &text, "");
    let text = replace_all(r"<[^>]*>?", &text, "");
    let text = replace_all(r"\s+", &text, " ");
    text.trim().to_string()
}

/// Keep at most `limit` characters.
pub fn bound_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

/// Single-quote an argument for `sh -c`.
pub fn shell_quote(arg: &str) -> String {
    format!("'{}'", arg.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_scripts_styles_and_tags() {
        let html = r#"<html><head><style>body { color: red }</style>
            <script type="text/javascript">alert("x")</script></head>
            <body><h1>Title</h1>
            <p>Some   <b>bold</b> text</p></body></html>"#;
        assert_eq!(html_to_text(html), "Title Some bold text");
    }

    #[test]
    fn bound_respects_char_boundaries() {
        assert_eq!(bound_chars("héllo", 2), "hé");
        assert_eq!(bound_chars("abc", 10), "abc");
    }

    #[test]
    fn quoting_escapes_single_quotes() {
        assert_eq!(shell_quote("plain"), "'plain'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }
}
