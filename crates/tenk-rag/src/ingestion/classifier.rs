//! Line classification heuristics for normalized filing text
//!
//! Each predicate looks at a single line in isolation. [`classify`] composes
//! them in a fixed order so the chunker only ever sees a [`LineKind`].

use once_cell::sync::Lazy;
use regex::Regex;

/// `PART II` / `Part II - Other Information`
static PART_HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^part\s+[ivxlc]+\b").expect("Invalid regex"));
/// `ITEM 1. BUSINESS` / `Item 1A. Risk Factors`
static ITEM_HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^item\s+\d{1,2}[a-z]?\s*\.").expect("Invalid regex"));
/// Two or more spaces next to a digit, the shape of space-aligned columns
static SPACED_COLUMNS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d\s{2,}|\s{2,}\d").expect("Invalid regex"));
/// Title Case phrase, small connecting words allowed
static CAPITALIZED_PHRASE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^[A-Z][A-Za-z0-9'&/()\-]*(?:,?\s+(?:[A-Z0-9][A-Za-z0-9'&/()\-]*|and|of|the|for|in|on|to|a|an|or|with|by|from|&|-))*$",
    )
    .expect("Invalid regex")
});
/// Digits, dates and punctuation only
static NUMERIC_ONLY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\d\s\-.,:/$%()]+$").expect("Invalid regex"));
/// Known XBRL/iXBRL taxonomy prefixes
static XBRL_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:us-gaap|ifrs-full|ifrs|dei|srt|country|iso4217|xbrli|utr|stpr):")
        .expect("Invalid regex")
});
/// A lone `prefix:LocalName` token, e.g. `aapl:IPhoneMember`
static XBRL_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z][a-z0-9\-]{1,20}:[A-Za-z0-9_]+$").expect("Invalid regex"));
/// ISO-8601 durations such as `P1Y`
static ISO_DURATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^P\d+[YMWD]$").expect("Invalid regex"));
/// Running page footer `Apple Inc. | 2023 Form 10-K | 21`
static PAGE_FOOTER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^[\w\s.\-&,]+?\|\s*\d{4}\s*Form\s*10-K\s*\|\s*\d+$").expect("Invalid regex")
});

const MAX_ITEM_HEADING_CHARS: usize = 120;
const MAX_PART_HEADING_CHARS: usize = 60;
const MAX_SUB_HEADING_WORDS: usize = 10;

/// What a single normalized line is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    /// Empty or whitespace
    Blank,
    /// Boilerplate that never becomes content
    Noise,
    /// Top-level `PART`/`ITEM` heading
    Heading,
    /// Short heading below the current section
    SubHeading,
    /// Delimited or space-aligned row
    TableRow,
    /// Anything else
    Prose,
}

/// Classify one line
pub fn classify(line: &str) -> LineKind {
    let line = line.trim();
    if line.is_empty() {
        LineKind::Blank
    } else if is_noise(line) {
        LineKind::Noise
    } else if is_top_level_heading(line) {
        LineKind::Heading
    } else if is_table_row(line) {
        LineKind::TableRow
    } else if is_sub_heading(line) {
        LineKind::SubHeading
    } else {
        LineKind::Prose
    }
}

/// Heading text with `## … ##` / leading `#` markers removed
pub fn heading_text(line: &str) -> &str {
    strip_marker(line.trim()).0
}

fn strip_marker(line: &str) -> (&str, bool) {
    if line.starts_with('#') {
        let inner = line.trim_start_matches('#').trim_end_matches('#').trim();
        (inner, true)
    } else {
        (line, false)
    }
}

/// `PART <roman>` or `ITEM <n><letter?>.` line
pub fn is_top_level_heading(line: &str) -> bool {
    let text = heading_text(line);
    if text.is_empty() {
        return false;
    }
    if ITEM_HEADING.is_match(text) {
        return text.chars().count() <= MAX_ITEM_HEADING_CHARS;
    }
    PART_HEADING.is_match(text)
        && text.chars().count() <= MAX_PART_HEADING_CHARS
        && !text.ends_with('.')
}

/// Contains a cell delimiter or space-aligned numeric columns
pub fn is_table_row(line: &str) -> bool {
    line.contains('|') || SPACED_COLUMNS.is_match(line.trim_end())
}

/// Short all-caps line, Title Case phrase, short label ending in `:`, or a marked heading
pub fn is_sub_heading(line: &str) -> bool {
    let (text, marked) = strip_marker(line.trim());
    if text.chars().count() <= 3 {
        return false;
    }
    if marked {
        return true;
    }
    let words = text.split_whitespace().count();
    if words > MAX_SUB_HEADING_WORDS {
        return false;
    }
    let short = words < MAX_SUB_HEADING_WORDS;
    (short && (is_all_caps(text) || text.ends_with(':'))) || CAPITALIZED_PHRASE.is_match(text)
}

fn is_all_caps(text: &str) -> bool {
    text.chars().any(|c| c.is_alphabetic()) && !text.chars().any(|c| c.is_lowercase())
}

/// Boilerplate lines dropped by the normalizer and skipped by the chunker
pub fn is_noise(line: &str) -> bool {
    let line = line.trim();
    if line.is_empty() {
        return false;
    }
    if line.chars().count() <= 2 {
        return true;
    }
    let lower = line.to_ascii_lowercase();
    NUMERIC_ONLY.is_match(line)
        || is_rule_line(line)
        || XBRL_PREFIX.is_match(line)
        || XBRL_TOKEN.is_match(line)
        || ISO_DURATION.is_match(line)
        || lower == "true"
        || lower == "false"
        || PAGE_FOOTER.is_match(line)
}

fn is_rule_line(line: &str) -> bool {
    line.chars().all(|c| matches!(c, '|' | '-' | ':' | ' '))
}
