//! Post-processing: deterministic cleanup of model output.
//!
//! Two kinds of output need fixing up before the pipeline can use it:
//!
//! - **Transcripts** from the extraction stage arrive with CRLF line endings,
//!   trailing spaces, runs of blank lines, zero-width characters, and
//!   sometimes a code fence the prompt said not to add.
//!   [`clean_transcript`] normalises these.
//!
//! - **Card JSON** from the synthesis stage is occasionally wrapped in
//!   ```` ```json ```` fences or a sentence of prose.
//!   [`recover_json_object`] strips those wrappers so the caller can make a
//!   second parse attempt.
//!
//! Every rule is a pure `&str → String` function and is tested on its own.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all transcript rules in order.
///
/// 1. Strip an outer code fence
/// 2. Normalise line endings (CRLF → LF)
/// 3. Strip invisible Unicode (zero-width spaces, BOM, soft hyphens)
/// 4. Trim trailing whitespace per line
/// 5. Collapse 3+ consecutive blank lines down to 1
/// 6. Trim leading/trailing blank space
pub fn clean_transcript(input: &str) -> String {
    let s = strip_code_fences(input);
    let s = normalise_line_endings(&s);
    let s = remove_invisible_chars(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    s.trim().to_string()
}

/// Strip formatting wrappers around a JSON object.
///
/// Returns `None` when no `{ … }` span can be found at all.
pub fn recover_json_object(input: &str) -> Option<String> {
    let s = strip_code_fences(input);
    let s = remove_invisible_chars(&s);
    let start = s.find('{')?;
    let end = s.rfind('}')?;
    if end < start {
        return None;
    }
    Some(s[start..=end].to_string())
}

// ── Rule 1: Strip outer code fences ──────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z0-9_-]*[ \t]*\r?\n(.*?)\r?\n?```\s*$").unwrap());

fn strip_code_fences(input: &str) -> String {
    let trimmed = input.trim();
    if let Some(caps) = RE_OUTER_FENCES.captures(trimmed) {
        caps[1].to_string()
    } else {
        trimmed.to_string()
    }
}

// ── Rule 2: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 3: Remove invisible Unicode characters ─────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rule 4: Trim trailing whitespace per line ────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 5: Collapse excessive blank lines ───────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n").to_string()
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_json_fence() {
        let input = "```json\n{\"front\": \"Q\"}\n```";
        assert_eq!(strip_code_fences(input), "{\"front\": \"Q\"}");
    }

    #[test]
    fn test_strip_fence_no_lang() {
        let input = "```\nline one\nline two\n```";
        assert_eq!(strip_code_fences(input), "line one\nline two");
    }

    #[test]
    fn test_no_fences_passthrough() {
        assert_eq!(strip_code_fences("  plain text \n"), "plain text");
    }

    #[test]
    fn test_inner_fence_is_kept() {
        let input = "Intro\n```\ncode\n```\nOutro";
        assert_eq!(strip_code_fences(input), input);
    }

    #[test]
    fn test_normalise_line_endings() {
        assert_eq!(normalise_line_endings("a\r\nb\rc"), "a\nb\nc");
    }

    #[test]
    fn test_trim_trailing_whitespace() {
        assert_eq!(
            trim_trailing_whitespace("  hello   \nworld  "),
            "  hello\nworld"
        );
    }

    #[test]
    fn test_collapse_blank_lines() {
        assert_eq!(collapse_blank_lines("a\n\n\n\n\nb"), "a\n\nb");
        assert_eq!(collapse_blank_lines("a\n\nb"), "a\n\nb");
    }

    #[test]
    fn test_remove_invisible() {
        let input = "hello\u{200B}world\u{FEFF}foo\u{00AD}bar";
        assert_eq!(remove_invisible_chars(input), "helloworldfoobar");
    }

    #[test]
    fn test_clean_transcript_full_pipeline() {
        let input = "```\r\nQuestion 1:   \r\n\r\n\r\n\r\nA. {{BLANK}}\u{200B}\r\n```";
        assert_eq!(clean_transcript(input), "Question 1:\n\nA. {{BLANK}}");
    }

    #[test]
    fn test_recover_from_fence() {
        let input = "```json\n{\"front\":\"Q\",\"back\":\"A\"}\n```";
        assert_eq!(
            recover_json_object(input).as_deref(),
            Some("{\"front\":\"Q\",\"back\":\"A\"}")
        );
    }

    #[test]
    fn test_recover_from_prose() {
        let input = "Sure! Here is your card:\n{\"front\":\"Q\",\"back\":\"A\"}\nGood luck.";
        assert_eq!(
            recover_json_object(input).as_deref(),
            Some("{\"front\":\"Q\",\"back\":\"A\"}")
        );
    }

    #[test]
    fn test_recover_without_object() {
        assert_eq!(recover_json_object("no json here"), None);
        assert_eq!(recover_json_object("} backwards {"), None);
    }
}
