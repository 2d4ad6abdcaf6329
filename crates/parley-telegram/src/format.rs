// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Telegram HTML rendering and message chunking.
//!
//! Model output is Markdown. Telegram accepts a small HTML subset, so replies
//! are split into chunks that fit the 4096 character limit first and each
//! chunk is rendered on its own. A fenced code block cut by a split is closed
//! at the end of one chunk and reopened, with its language, at the start of
//! the next.

use std::sync::LazyLock;

use regex::Regex;

/// Telegram's limit on the length of one text message.
pub const MAX_MESSAGE_LEN: usize = 4096;

const FENCE: &str = "```";
/// Room kept at the end of a chunk for a closing `\n```` `.
const FENCE_RESERVE: usize = FENCE.len() + 1;

static RE_HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#{1,6}\s+(.+)$").expect("valid regex"));
static RE_BULLET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\s*)[-*+]\s+").expect("valid regex"));
static RE_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[([^\]]+)\]\((https?://[^\s)]+)\)").expect("valid regex")
});
static RE_BOLD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*([^*\n]+)\*\*").expect("valid regex"));
static RE_UNDERLINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b__([^_\n]+)__\b").expect("valid regex"));
static RE_ITALIC_STAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*([^*\n]+)\*").expect("valid regex"));
static RE_ITALIC_UNDERSCORE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b_([^_\n]+)_\b").expect("valid regex"));
static RE_STRIKE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"~~([^~\n]+)~~").expect("valid regex"));

/// Escapes the three characters Telegram's HTML parser treats specially.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Renders Markdown as Telegram HTML.
///
/// Fenced blocks become `<pre>`, inline code `<code>`; emphasis, headings,
/// bullets, and links are mapped to their closest Telegram tags. Anything
/// else passes through escaped.
pub fn markdown_to_html(text: &str) -> String {
    let mut out: Vec<String> = Vec::new();
    let mut code: Option<(String, Vec<&str>)> = None;

    for line in text.split('\n') {
        let trimmed = line.trim();
        match code.as_mut() {
            Some((lang, body)) => {
                if trimmed.starts_with(FENCE) {
                    out.push(render_code_block(lang, body));
                    code = None;
                } else {
                    body.push(line);
                }
            }
            None if trimmed.starts_with(FENCE) => {
                let lang = trimmed.trim_start_matches('`').trim().to_string();
                code = Some((lang, Vec::new()));
            }
            None => out.push(render_line(line)),
        }
    }

    // An unterminated block still renders as code.
    if let Some((lang, body)) = code {
        out.push(render_code_block(&lang, &body));
    }
    out.join("\n")
}

fn render_code_block(lang: &str, body: &[&str]) -> String {
    let body = escape_html(&body.join("\n"));
    if lang.is_empty() {
        format!("<pre>{body}</pre>")
    } else {
        format!(
            "<pre><code class=\"language-{}\">{body}</code></pre>",
            escape_html(lang)
        )
    }
}

fn render_line(line: &str) -> String {
    if let Some(caps) = RE_HEADING.captures(line.trim_end()) {
        return format!("<b>{}</b>", render_inline(&caps[1]));
    }
    let line = RE_BULLET.replace(line, "$1• ");
    render_inline(&line)
}

/// Formats one line, leaving backtick spans as literal code.
fn render_inline(line: &str) -> String {
    let parts: Vec<&str> = line.split('`').collect();
    // An odd number of backticks has no matching close; treat them as text.
    if parts.len() % 2 == 0 {
        return render_prose(line);
    }
    parts
        .iter()
        .enumerate()
        .map(|(i, part)| {
            if i % 2 == 1 {
                format!("<code>{}</code>", escape_html(part))
            } else {
                render_prose(part)
            }
        })
        .collect()
}

fn render_prose(text: &str) -> String {
    let text = escape_html(text);
    let text = RE_LINK.replace_all(&text, r#"<a href="$2">$1</a>"#);
    let text = RE_BOLD.replace_all(&text, "<b>$1</b>");
    let text = RE_UNDERLINE.replace_all(&text, "<u>$1</u>");
    let text = RE_ITALIC_STAR.replace_all(&text, "<i>$1</i>");
    let text = RE_ITALIC_UNDERSCORE.replace_all(&text, "<i>$1</i>");
    RE_STRIKE.replace_all(&text, "<s>$1</s>").into_owned()
}

/// Splits `text` into chunks of at most `max_len` characters.
///
/// Splits prefer the last newline before the limit, then the last space, and
/// fall back to a hard cut. A chunk that ends inside a fenced code block is
/// closed with a fence and the next chunk reopens it with the same opening
/// line, so every chunk renders on its own.
pub fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    let max_len = max_len.max(FENCE_RESERVE * 4);
    if text.chars().count() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut rest = text.to_string();

    loop {
        if rest.chars().count() <= max_len {
            if !rest.trim().is_empty() {
                chunks.push(rest);
            }
            break;
        }

        let budget = max_len - FENCE_RESERVE;
        let mut split = split_point(&rest, budget, 0);
        // A chunk holding only a fence opener would reopen to the same text.
        if let Some((_, body_start)) = open_fence(&rest[..split])
            && rest[body_start..split].trim().is_empty()
        {
            split = split_point(&rest, budget, body_start);
        }
        let (chunk, remainder) = rest.split_at(split);

        match open_fence(chunk) {
            Some((opening, _)) if opening.len() + 1 + remainder.len() < rest.len() => {
                chunks.push(format!("{}\n{FENCE}", chunk.trim_end_matches('\n')));
                rest = format!("{opening}\n{remainder}");
            }
            _ => {
                if !chunk.trim().is_empty() {
                    chunks.push(chunk.to_string());
                }
                rest = remainder.to_string();
            }
        }
    }
    chunks
}

/// Byte offset to split at so the head holds at most `budget` characters.
///
/// Only separators past byte `floor` are considered.
fn split_point(text: &str, budget: usize, floor: usize) -> usize {
    let limit = text
        .char_indices()
        .nth(budget)
        .map_or(text.len(), |(i, _)| i);
    if limit <= floor {
        return limit;
    }
    let window = &text[floor..limit];

    [window.rfind('\n'), window.rfind(' ')]
        .into_iter()
        .flatten()
        .next()
        .map_or(limit, |pos| floor + pos + 1)
}

/// The opening line of a fenced block still open at the end of `chunk`,
/// with the byte offset where that block's body starts.
fn open_fence(chunk: &str) -> Option<(String, usize)> {
    let mut open: Option<(&str, usize)> = None;
    let mut offset = 0;
    for line in chunk.split_inclusive('\n') {
        offset += line.len();
        let trimmed = line.trim();
        if trimmed.starts_with(FENCE) {
            open = match open {
                Some(_) => None,
                None => Some((trimmed, offset)),
            };
        }
    }
    open.map(|(line, start)| (line.to_string(), start))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_html_specials() {
        assert_eq!(escape_html("a < b && c > d"), "a &lt; b &amp;&amp; c &gt; d");
    }

    #[test]
    fn renders_emphasis() {
        assert_eq!(
            markdown_to_html("**bold** and *it* and ~~gone~~"),
            "<b>bold</b> and <i>it</i> and <s>gone</s>"
        );
    }

    #[test]
    fn snake_case_is_not_italic() {
        assert_eq!(markdown_to_html("call my_func_name now"), "call my_func_name now");
        assert_eq!(markdown_to_html("an _emphasis_ here"), "an <i>emphasis</i> here");
    }

    #[test]
    fn inline_code_is_literal() {
        assert_eq!(
            markdown_to_html("use `**ptr < 0**` here"),
            "use <code>**ptr &lt; 0**</code> here"
        );
    }

    #[test]
    fn unbalanced_backtick_is_text() {
        assert_eq!(markdown_to_html("a ` b"), "a ` b");
    }

    #[test]
    fn code_block_with_language() {
        let html = markdown_to_html("Example:\n```rust\nlet x = a < b;\n```\nDone.");
        assert_eq!(
            html,
            "Example:\n<pre><code class=\"language-rust\">let x = a &lt; b;</code></pre>\nDone."
        );
    }

    #[test]
    fn unterminated_code_block_still_renders() {
        assert_eq!(markdown_to_html("```\n*x*"), "<pre>*x*</pre>");
    }

    #[test]
    fn headings_links_and_bullets() {
        assert_eq!(markdown_to_html("## Title"), "<b>Title</b>");
        assert_eq!(
            markdown_to_html("[docs](https://example.com/a?b=1&c=2)"),
            "<a href=\"https://example.com/a?b=1&amp;c=2\">docs</a>"
        );
        assert_eq!(markdown_to_html("- one\n  * two"), "• one\n  • two");
    }

    #[test]
    fn short_text_is_one_chunk() {
        assert_eq!(split_message("hello", MAX_MESSAGE_LEN), vec!["hello"]);
        assert!(split_message("", MAX_MESSAGE_LEN).is_empty());
    }

    #[test]
    fn chunks_respect_limit_and_prefer_newlines() {
        let text = (0..400)
            .map(|i| format!("line number {i}"))
            .collect::<Vec<_>>()
            .join("\n");
        let chunks = split_message(&text, 1000);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 1000);
            assert!(chunk.ends_with('\n') || chunk == chunks.last().unwrap());
        }
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn hard_cut_without_whitespace() {
        let text = "x".repeat(250);
        let chunks = split_message(&text, 100);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.chars().count() <= 100));
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn multibyte_text_splits_on_char_boundaries() {
        let text = "é".repeat(300);
        let chunks = split_message(&text, 100);
        assert!(chunks.iter().all(|c| c.chars().count() <= 100));
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn interrupted_code_block_is_reopened() {
        let body = (0..60)
            .map(|i| format!("print({i})"))
            .collect::<Vec<_>>()
            .join("\n");
        let text = format!("Intro\n```python\n{body}\n```\nOutro");
        let chunks = split_message(&text, 200);

        assert!(chunks.len() > 2);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 200, "chunk too long: {}", chunk.len());
            let fences = chunk.lines().filter(|l| l.trim().starts_with("```")).count();
            assert_eq!(fences % 2, 0, "unbalanced fences in {chunk:?}");
        }
        assert!(chunks[1].starts_with("```python\n"));
        assert!(chunks.last().unwrap().ends_with("Outro"));
    }

    #[test]
    fn long_line_after_fence_opener_is_split() {
        let text = format!("```\n{}\n```", "word ".repeat(1200));
        let chunks = split_message(&text, MAX_MESSAGE_LEN);

        assert!(chunks.len() >= 2);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= MAX_MESSAGE_LEN);
            let fences = chunk.lines().filter(|l| l.trim().starts_with("```")).count();
            assert_eq!(fences % 2, 0, "unbalanced fences in {chunk:?}");
            assert!(chunk.starts_with("```\nword"));
        }
        assert!(chunks.last().unwrap().ends_with("\n```"));
    }

    #[test]
    fn intro_then_fenced_unbroken_line_is_split() {
        let text = format!("Intro\n```rust\n{}\n```", "x".repeat(500));
        let chunks = split_message(&text, 200);

        assert!(chunks.len() >= 3);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 200);
            let fences = chunk.lines().filter(|l| l.trim().starts_with("```")).count();
            assert_eq!(fences % 2, 0, "unbalanced fences in {chunk:?}");
        }
        let xs: usize = chunks.iter().map(|c| c.matches('x').count()).sum();
        assert_eq!(xs, 500);
    }

    #[test]
    fn oversized_fence_opener_still_terminates() {
        let text = format!("```{}\nbody", "a".repeat(300));
        let chunks = split_message(&text, 100);
        assert!(chunks.iter().all(|c| c.chars().count() <= 100));
    }
}
