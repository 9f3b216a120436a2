//! Fault-tolerant parsing of collaborator output.
//!
//! Generation replies are expected to carry a `[SUMMARY]` section followed
//! by one `[FILE <path>]` section per file, each holding a fenced code block.
//! Models do not always comply, so every parser here returns a tagged
//! outcome instead of an error and the caller decides how to degrade.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

static SUMMARY_SECTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\[SUMMARY\]\s*(.*?)\s*(?:\[FILE\s|\[CODE\]|\z)").expect("invalid regex")
});
static FILE_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t>#*]*\[FILE\s+([^\]\r\n]+?)\s*\]").expect("invalid regex")
});
static CODE_SECTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\[CODE\]\s*(.*?)\s*(?:\[FILE\s|\[SUMMARY\]|\z)").expect("invalid regex")
});
static CRITIQUE_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^[\s#*>-]*(error summary|suggested fix)[\s*]*:?[\s*]*").expect("invalid regex")
});

/// How much of a generation reply could be understood.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    /// Summary and every known file were present, each in a cleanly
    /// delimited fence.
    FullMatch {
        summary: String,
        files: BTreeMap<String, String>,
    },
    /// Some content was recovered. Files not found keep their current
    /// content and are listed in `missing`.
    PartialMatch {
        summary: Option<String>,
        files: BTreeMap<String, String>,
        missing: Vec<String>,
    },
    /// Nothing usable.
    NoMatch,
}

/// Body of a fenced block.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Fenced {
    body: String,
    /// The closing fence could not be placed with certainty: it was missing,
    /// or an inner bare fence line would also have closed the block.
    ambiguous: bool,
}

/// Where a block's closing fence is looked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Close {
    /// First matching fence line, for blocks embedded in prose.
    First,
    /// Last matching fence line of a section whose end is already known.
    Last,
}

/// Parse a generation reply against the current file set.
///
/// Only paths already in `current` are accepted; the file set never grows
/// from model output. Each file's trailing newline follows the current
/// content, so reproducing a file verbatim yields identical content.
pub fn extract_generation(content: &str, current: &BTreeMap<String, String>) -> Extraction {
    let summary = SUMMARY_SECTION
        .captures(content)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty());

    let mut found = BTreeMap::new();
    let mut clean = true;
    for (path, section) in file_sections(content) {
        let Some(existing) = current.get(path) else {
            continue;
        };
        if let Some(block) = fenced_body(section, Close::Last) {
            clean &= !block.ambiguous;
            found.insert(path.to_string(), conform_newline(block.body, existing));
        }
    }
    let from_sections = !found.is_empty();

    if found.is_empty() && current.len() == 1 {
        if let Some((path, existing)) = current.iter().next() {
            if let Some(code) = single_file_code(content) {
                found.insert(path.clone(), conform_newline(code, existing));
            }
        }
    }

    if found.is_empty() && summary.is_none() {
        return Extraction::NoMatch;
    }

    let missing: Vec<String> = current
        .keys()
        .filter(|path| !found.contains_key(*path))
        .cloned()
        .collect();
    let strict = missing.is_empty() && from_sections && clean;

    let mut files = current.clone();
    files.extend(found);

    match summary {
        Some(summary) if strict => Extraction::FullMatch { summary, files },
        summary => Extraction::PartialMatch {
            summary,
            files,
            missing,
        },
    }
}

/// Split a reply into `(path, body)` pairs. A section runs from its header
/// line to the next header or the end of the reply.
fn file_sections(content: &str) -> Vec<(&str, &str)> {
    let headers: Vec<_> = FILE_HEADER.captures_iter(content).collect();
    let mut sections = Vec::with_capacity(headers.len());
    for (idx, caps) in headers.iter().enumerate() {
        let (Some(whole), Some(path)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let end = headers
            .get(idx + 1)
            .and_then(|next| next.get(0))
            .map(|m| m.start())
            .unwrap_or(content.len());
        let path = path.as_str().trim().trim_matches('`');
        sections.push((path, &content[whole.end()..end]));
    }
    sections
}

/// Code for a single-file workflow from a `[CODE]` section or the first
/// fenced block anywhere in the reply.
fn single_file_code(content: &str) -> Option<String> {
    if let Some(section) = CODE_SECTION.captures(content).and_then(|c| c.get(1)) {
        let section = section.as_str();
        let code = fenced_body(section, Close::Last)
            .map(|block| block.body)
            .unwrap_or_else(|| section.to_string());
        if !code.trim().is_empty() {
            return Some(code);
        }
    }

    fenced_body(content, Close::First)
        .map(|block| block.body)
        .filter(|code| !code.trim().is_empty())
}

/// Length of the backtick run opening `line`, ignoring indentation.
fn fence_ticks(line: &str) -> usize {
    line.trim_start().bytes().take_while(|b| *b == b'`').count()
}

/// A line made only of at least `width` backticks closes a block of that
/// width.
fn is_closing_fence(line: &str, width: usize) -> bool {
    let line = line.trim();
    line.len() >= width && line.bytes().all(|b| b == b'`')
}

/// Extract the body of the first fenced block in `text`.
///
/// The closing fence must be at least as long as the opening one, so a
/// four-backtick block may hold triple-backtick lines. The body keeps the
/// newline that ends its last line.
fn fenced_body(text: &str, close: Close) -> Option<Fenced> {
    let mut lines = Vec::new();
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        lines.push((offset, line));
        offset += line.len();
    }

    let open = lines.iter().position(|(_, line)| fence_ticks(line) >= 3)?;
    let width = fence_ticks(lines[open].1);
    let start = lines[open].0 + lines[open].1.len();

    let closers: Vec<usize> = (open + 1..lines.len())
        .filter(|&idx| is_closing_fence(lines[idx].1, width))
        .collect();
    let chosen = match close {
        Close::First => closers.first(),
        Close::Last => closers.last(),
    };

    match chosen {
        Some(&idx) => Some(Fenced {
            body: text[start..lines[idx].0].to_string(),
            ambiguous: closers.len() > 1,
        }),
        None => {
            let body = text[start..].trim_end();
            Some(Fenced {
                body: format!("{body}\n"),
                ambiguous: true,
            })
        }
    }
}

/// Give `body` the same trailing-newline convention as `existing`.
fn conform_newline(mut body: String, existing: &str) -> String {
    if existing.ends_with('\n') {
        if !body.is_empty() && !body.ends_with('\n') {
            body.push('\n');
        }
    } else if body.ends_with('\n') {
        body.pop();
        if body.ends_with('\r') {
            body.pop();
        }
    }
    body
}

/// Sections recovered from a reflection reply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CritiqueSections {
    pub error_summary: Option<String>,
    pub suggested_fix: Option<String>,
}

/// Split a reflection reply into its "Error Summary" and "Suggested Fix"
/// sections. Headings are matched case-insensitively and may carry markdown
/// decoration.
pub fn extract_critique(content: &str) -> CritiqueSections {
    let headings: Vec<_> = CRITIQUE_HEADING.captures_iter(content).collect();
    let mut sections = CritiqueSections::default();

    for (idx, caps) in headings.iter().enumerate() {
        let (Some(whole), Some(label)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let body_end = headings
            .get(idx + 1)
            .and_then(|next| next.get(0))
            .map(|m| m.start())
            .unwrap_or(content.len());
        let body = content[whole.end()..body_end].trim();
        if body.is_empty() {
            continue;
        }
        let slot = if label.as_str().to_lowercase().starts_with("error") {
            &mut sections.error_summary
        } else {
            &mut sections.suggested_fix
        };
        slot.get_or_insert_with(|| body.to_string());
    }

    sections
}

/// Truncate to at most `max` characters on a char boundary.
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
