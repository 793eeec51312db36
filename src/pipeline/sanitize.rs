//! Cleanup applied to model-authored section text before it is stored.
//!
//! Header grammar: a *section header token* is three or more `=`, optional
//! spaces, a run of letters, spaces and hyphens starting with a letter,
//! optional spaces, three or more `=` (e.g. `===WARNING SIGNS===`,
//! `=== Follow-Ups ===`). Lines made only of a header token are dropped;
//! header tokens embedded in other text are removed. Plain `=` rules
//! (`=====`), `a == b`, and `=` inside prose are left alone.

use std::sync::LazyLock;

use regex::Regex;

static HEADER_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*={3,}[ \t]*[A-Za-z][A-Za-z \t\-]*?[ \t]*={3,}[ \t]*\r?$\n?").unwrap()
});

static HEADER_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"={3,}[ \t]*[A-Za-z][A-Za-z \t\-]*?[ \t]*={3,}").unwrap());

static EXCESS_BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n[ \t]*\n([ \t]*\n)+").unwrap());

/// Titles shorter than this may be dropped from the top of an expansion.
const TITLE_MAX_CHARS: usize = 60;

/// Strip echoed section headers and collapse the blank runs they leave.
pub fn strip_section_headers(text: &str) -> String {
    let without_lines = HEADER_LINE.replace_all(text, "");
    let without_tokens = HEADER_TOKEN.replace_all(&without_lines, "");
    EXCESS_BLANK_LINES
        .replace_all(&without_tokens, "\n\n")
        .trim()
        .to_string()
}

/// Remove a code fence wrapping the whole text, if any.
fn strip_code_fence(text: &str) -> String {
    let trimmed = text.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }
    let mut lines: Vec<&str> = trimmed.lines().skip(1).collect();
    if lines.last().is_some_and(|l| l.trim_start().starts_with("```")) {
        lines.pop();
    }
    lines.join("\n").trim().to_string()
}

fn is_list_item(line: &str) -> bool {
    line.starts_with(['-', '*', '•']) || line.chars().next().is_some_and(|c| c.is_ascii_digit())
}

/// Whether the first line of an expansion is a title the model added
/// (`Medications for Ann Lee`, `Mobility:`, `# Diet`).
fn looks_like_title(line: &str, patient_name: &str) -> bool {
    if line.is_empty() || line.chars().count() >= TITLE_MAX_CHARS {
        return false;
    }
    if line.starts_with('#') || line.ends_with(':') {
        return true;
    }
    if is_list_item(line) {
        return false;
    }
    let mut parts = patient_name.split_whitespace();
    let first = parts.next();
    let last = parts.last().or(first);
    [first, last]
        .into_iter()
        .flatten()
        .filter(|part| part.chars().count() >= 2)
        .any(|part| line.contains(part))
}

/// Cleanup for expansion proposals: code fence, leading title line, then the
/// header grammar.
pub fn clean_expansion(raw: &str, patient_name: &str) -> String {
    let unfenced = strip_code_fence(raw);
    let mut lines = unfenced.lines();
    let body = match lines.next() {
        Some(first) if looks_like_title(first.trim(), patient_name) => {
            lines.collect::<Vec<_>>().join("\n")
        }
        _ => unfenced.clone(),
    };
    strip_section_headers(&body)
}
