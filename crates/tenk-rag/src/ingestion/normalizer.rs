//! HTML filing normalization into classifier-friendly plain text

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};
use std::collections::HashSet;

use super::classifier::{self, LineKind};
use crate::config::NormalizerConfig;
use crate::error::{Error, Result};

static TOC_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*table\s+of\s+contents").expect("Invalid regex"));
/// `Item 1A. | Risk Factors | 12` or `Item 1A. | Risk Factors`
static TOC_ENTRY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(item\s*\d+[a-z]?\.?)\s*(?:\|\s*([^|]*?)\s*)?(?:\|\s*\d*\s*)?$")
        .expect("Invalid regex")
});
static PAGE_ONLY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*page\s*$").expect("Invalid regex"));
static TR_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("tr").expect("Invalid selector"));

/// Prose this long inside a TOC block means the block has ended, or never was one
const TOC_ABORT_WORDS: usize = 12;

const SKIPPED_TAGS: &[&str] = &[
    "script", "style", "head", "nav", "noscript", "form", "footer", "template", "svg",
    "ix:header", "ix:hidden",
];

const BLOCK_TAGS: &[&str] = &[
    "p", "div", "li", "ul", "ol", "section", "article", "blockquote", "center", "dd", "dt", "dl",
    "main", "header", "aside", "address", "figure", "figcaption", "caption", "pre", "hr",
];

/// Turns raw 10-K markup into line-oriented text
#[derive(Debug, Clone, Default)]
pub struct FilingNormalizer {
    config: NormalizerConfig,
}

impl FilingNormalizer {
    /// Create a normalizer
    pub fn new(config: NormalizerConfig) -> Self {
        Self { config }
    }

    /// Normalize raw bytes, decoding lossily
    pub fn normalize_bytes(&self, filename: &str, data: &[u8]) -> Result<String> {
        let html = String::from_utf8_lossy(data);
        self.normalize(filename, &html)
    }

    /// Normalize an HTML document
    ///
    /// Malformed markup never fails; a document without any text is a
    /// [`Error::FileParse`].
    pub fn normalize(&self, filename: &str, html: &str) -> Result<String> {
        let document = Html::parse_document(html);

        let mut collector = LineCollector::new(&self.config);
        collector.walk(document.root_element());
        let lines = collector.finish();

        if lines.iter().all(|l| l.trim().is_empty()) {
            return Err(Error::file_parse(filename, "document contains no text"));
        }

        let lines = rewrite_toc(lines);
        let lines = drop_front_matter(lines, &self.config.front_matter_anchors);
        let lines: Vec<String> = lines
            .into_iter()
            .filter(|l| !classifier::is_noise(l))
            .collect();

        let text = layout(&lines);
        if text.is_empty() {
            return Err(Error::file_parse(filename, "no content left after noise removal"));
        }
        Ok(text)
    }
}

/// Walks the DOM, emitting one string per visual line
struct LineCollector<'cfg> {
    config: &'cfg NormalizerConfig,
    lines: Vec<String>,
    current: String,
}

impl<'cfg> LineCollector<'cfg> {
    fn new(config: &'cfg NormalizerConfig) -> Self {
        Self {
            config,
            lines: Vec::new(),
            current: String::new(),
        }
    }

    fn walk(&mut self, element: ElementRef<'_>) {
        for child in element.children() {
            match child.value() {
                Node::Text(text) => self.current.push_str(text),
                Node::Element(_) => {
                    if let Some(child) = ElementRef::wrap(child) {
                        self.visit_element(child);
                    }
                }
                _ => {}
            }
        }
    }

    fn visit_element(&mut self, element: ElementRef<'_>) {
        let tag = element.value().name();
        if SKIPPED_TAGS.contains(&tag) || is_hidden(&element) {
            return;
        }

        match tag {
            "br" => self.break_line(),
            "table" => {
                self.break_line();
                self.push_table(&element);
                self.lines.push(String::new());
            }
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                self.break_line();
                self.push_heading(&collapse_whitespace(&element_text(&element)));
            }
            "tr" | "td" | "th" => {
                // Stray table parts outside a <table>
                self.break_line();
                self.walk(element);
                self.break_line();
            }
            _ if BLOCK_TAGS.contains(&tag) => {
                self.break_line();
                if self.is_bold_heading(&element) {
                    self.push_heading(&collapse_whitespace(&element_text(&element)));
                } else {
                    self.walk(element);
                    self.break_line();
                }
            }
            _ => self.walk(element),
        }
    }

    fn is_bold_heading(&self, element: &ElementRef<'_>) -> bool {
        let text = collapse_whitespace(&element_text(element));
        let words = text.split_whitespace().count();
        words > 0 && words < self.config.max_heading_words && is_all_bold(element)
    }

    fn push_heading(&mut self, text: &str) {
        if !text.is_empty() {
            self.lines.push(format!("## {} ##", text));
        }
    }

    fn break_line(&mut self) {
        let line = collapse_whitespace(&self.current);
        self.current.clear();
        if !line.is_empty() {
            self.lines.push(line);
        }
    }

    fn push_table(&mut self, table: &ElementRef<'_>) {
        let rows: Vec<Vec<String>> = table
            .select(&TR_SELECTOR)
            .map(|tr| merge_cells(row_cells(&tr)))
            .filter(|cells| !cells.is_empty())
            .collect();

        let mut widths: Vec<usize> = Vec::new();
        for cells in rows.iter().filter(|c| c.len() >= 2) {
            for (i, cell) in cells.iter().enumerate() {
                let len = cell.chars().count();
                match widths.get_mut(i) {
                    Some(w) => *w = (*w).max(len),
                    None => widths.push(len),
                }
            }
        }

        for cells in rows {
            if cells.len() < 2 {
                self.lines.extend(cells);
                continue;
            }
            let padded: Vec<String> = cells
                .iter()
                .enumerate()
                .map(|(i, cell)| format!("{:<width$}", cell, width = widths[i]))
                .collect();
            self.lines.push(padded.join(" | ").trim_end().to_string());
        }
    }

    fn finish(mut self) -> Vec<String> {
        self.break_line();
        self.lines
    }
}

/// Non-empty, cleaned cell texts of one `<tr>`
fn row_cells(tr: &ElementRef<'_>) -> Vec<String> {
    tr.children()
        .filter_map(ElementRef::wrap)
        .filter(|cell| matches!(cell.value().name(), "td" | "th") && !is_hidden(cell))
        .map(|cell| collapse_whitespace(&element_text(&cell)))
        .filter(|text| !text.is_empty())
        .collect()
}

/// Fold stand-alone currency/percent/paren cells into their neighbours
fn merge_cells(cells: Vec<String>) -> Vec<String> {
    let mut merged: Vec<String> = Vec::with_capacity(cells.len());
    let mut pending_prefix = String::new();

    for cell in cells {
        match cell.as_str() {
            "$" => pending_prefix.push('$'),
            "%" | ")" | "%)" if !merged.is_empty() => {
                if let Some(last) = merged.last_mut() {
                    last.push_str(&cell);
                }
            }
            _ => {
                merged.push(format!("{}{}", pending_prefix, cell));
                pending_prefix.clear();
            }
        }
    }
    if !pending_prefix.is_empty() {
        merged.push(pending_prefix);
    }
    merged
}

fn element_text(element: &ElementRef<'_>) -> String {
    let mut raw = String::new();
    collect_visible_text(element, &mut raw);
    raw
}

fn collect_visible_text(element: &ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(_) => {
                let Some(child) = ElementRef::wrap(child) else {
                    continue;
                };
                let tag = child.value().name();
                if SKIPPED_TAGS.contains(&tag) || is_hidden(&child) {
                    continue;
                }
                if tag == "br" {
                    out.push(' ');
                }
                collect_visible_text(&child, out);
            }
            _ => {}
        }
    }
}

fn style_of(element: &ElementRef<'_>) -> String {
    element
        .value()
        .attr("style")
        .map(|s| s.to_ascii_lowercase().replace(' ', ""))
        .unwrap_or_default()
}

fn is_hidden(element: &ElementRef<'_>) -> bool {
    style_of(element).contains("display:none")
}

fn is_bold_element(element: &ElementRef<'_>) -> bool {
    if matches!(element.value().name(), "b" | "strong") {
        return true;
    }
    let style = style_of(element);
    ["bold", "600", "700", "800", "900"]
        .iter()
        .any(|weight| style.contains(&format!("font-weight:{}", weight)))
}

/// Every visible text node below `element` sits inside bold markup
fn is_all_bold(element: &ElementRef<'_>) -> bool {
    if is_bold_element(element) {
        return true;
    }
    let mut saw_text = false;
    for node in element.descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        if text.trim().is_empty() {
            continue;
        }
        saw_text = true;
        let bold = node
            .ancestors()
            .take_while(|a| *a != **element)
            .filter_map(ElementRef::wrap)
            .any(|a| is_bold_element(&a));
        if !bold {
            return false;
        }
    }
    saw_text
}

/// Typographic cleanup followed by whitespace collapse
fn collapse_whitespace(input: &str) -> String {
    let cleaned = cleanup_text(input);
    let mut buf = String::with_capacity(cleaned.len());
    let mut last_space = false;
    for ch in cleaned.chars() {
        if ch.is_whitespace() {
            if !last_space && !buf.is_empty() {
                buf.push(' ');
            }
            last_space = true;
        } else {
            buf.push(ch);
            last_space = false;
        }
    }
    buf.trim().to_string()
}

fn cleanup_text(text: &str) -> String {
    text.replace('\u{00A0}', " ") // Non-breaking space
        .replace('\u{2002}', " ") // En space
        .replace('\u{2003}', " ") // Em space
        .replace('\u{2009}', " ") // Thin space
        .replace('\u{200B}', "") // Zero-width space
        .replace('\u{FEFF}', "") // BOM
        .replace('\u{2010}', "-")
        .replace('\u{2011}', "-")
        .replace('\u{2012}', "-")
        .replace('\u{2013}', "-")
        .replace('\u{2014}', "-")
        .replace('\u{2018}', "'")
        .replace('\u{2019}', "'")
        .replace('\u{201C}', "\"")
        .replace('\u{201D}', "\"")
        .replace('\u{2022}', "* ")
        .replace('\u{25CF}', "* ")
        .replace('\u{2026}', "...")
        .replace('\u{00AE}', "") // Registered sign
        .replace('\u{2122}', "") // Trade mark sign
}

/// Flatten the table of contents into `Item N. Title` lines
///
/// TOC mode ends on a blank line after entries, on a repeated entry label
/// (the body heading), or on a prose line longer than [`TOC_ABORT_WORDS`].
fn rewrite_toc(lines: Vec<String>) -> Vec<String> {
    let mut output = Vec::with_capacity(lines.len());
    let mut seen_toc = false;
    let mut in_toc = false;
    let mut labels: HashSet<String> = HashSet::new();
    // Non-entry lines since the marker or the last entry
    let mut held: Vec<String> = Vec::new();

    for line in lines {
        let trimmed = line.trim();
        if PAGE_ONLY.is_match(trimmed) {
            continue;
        }
        let text = classifier::heading_text(trimmed);
        if TOC_MARKER.is_match(text) {
            // Repeated page-header links back to the TOC
            if !seen_toc {
                seen_toc = true;
                in_toc = true;
            }
            continue;
        }
        if !in_toc {
            output.push(line);
            continue;
        }

        if trimmed.is_empty() {
            if !labels.is_empty() {
                in_toc = false;
                held.clear();
            }
            continue;
        }
        if let Some(cap) = TOC_ENTRY.captures(text) {
            let label = cap.get(1).map(|m| m.as_str()).unwrap_or_default();
            if !labels.insert(label_key(label)) {
                // Body heading for an item already listed
                in_toc = false;
                held.clear();
                output.push(line);
                continue;
            }
            let title = cap.get(2).map(|m| m.as_str().trim()).unwrap_or_default();
            if title.is_empty() {
                output.push(label.to_string());
            } else {
                output.push(format!("{} {}", label, title));
            }
            held.clear();
            continue;
        }
        if trimmed.split_whitespace().count() > TOC_ABORT_WORDS {
            // Real prose: whatever was held belongs to the body
            in_toc = false;
            output.append(&mut held);
            output.push(line);
            continue;
        }
        held.push(line);
    }
    if in_toc {
        output.append(&mut held);
    }
    output
}

/// `Item 1A.` and `ITEM 1A` compare equal
fn label_key(label: &str) -> String {
    label
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '.')
        .flat_map(char::to_uppercase)
        .collect()
}

/// Keep lines from the first SEC anchor on; keep everything when there is none
fn drop_front_matter(lines: Vec<String>, anchors: &[String]) -> Vec<String> {
    let anchors: Vec<String> = anchors.iter().map(|a| a.to_uppercase()).collect();
    let start = lines.iter().position(|line| {
        let upper = line.to_uppercase();
        anchors.iter().any(|a| upper.contains(a.as_str()))
    });
    match start {
        Some(idx) => lines.into_iter().skip(idx).collect(),
        None => lines,
    }
}

/// Blank line between prose lines and around headings; table rows stay together
fn layout(lines: &[String]) -> String {
    let mut output: Vec<&str> = Vec::with_capacity(lines.len() * 2);
    let mut prev = LineKind::Blank;

    for line in lines {
        let kind = classifier::classify(line);
        if kind == LineKind::Blank {
            continue;
        }
        let contiguous = kind == LineKind::TableRow && prev == LineKind::TableRow;
        if !contiguous && output.last().is_some_and(|l| !l.is_empty()) {
            output.push("");
        }
        output.push(line.trim());
        prev = kind;
    }

    let mut text = output.join("\n");
    if !text.is_empty() {
        text.push('\n');
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalize(html: &str) -> String {
        FilingNormalizer::default().normalize("test.htm", html).unwrap()
    }

    #[test]
    fn strips_boilerplate_and_breaks_blocks() {
        let html = r#"<html><head><title>x</title><style>p{}</style></head><body>
            <script>var a = 1;</script>
            <div>UNITED STATES SECURITIES AND EXCHANGE COMMISSION</div>
            <p>The Company designs and sells consumer electronics worldwide.</p>
            <p>It also sells a range of related services.<br/>Services include advertising and cloud.</p>
            <div style="display: none">hidden text that must vanish</div>
        </body></html>"#;
        let text = normalize(html);
        assert!(!text.contains("var a"));
        assert!(!text.contains("hidden text"));
        assert!(text.contains("The Company designs and sells consumer electronics worldwide.\n\nIt also"));
        assert!(text.contains("related services.\n\nServices include"));
    }

    #[test]
    fn marks_headings_and_bold_blocks() {
        let html = r#"<body>
            <p>FORM 10-K annual report</p>
            <h2>Overview</h2>
            <p><b>ITEM 1. BUSINESS</b></p>
            <p><span style="font-weight:700">Competition</span></p>
            <p><b>Bold</b> lead-in followed by normal prose in the same paragraph.</p>
        </body>"#;
        let text = normalize(html);
        assert!(text.contains("## Overview ##"));
        assert!(text.contains("## ITEM 1. BUSINESS ##"));
        assert!(text.contains("## Competition ##"));
        assert!(text.contains("Bold lead-in followed by normal prose"));
        assert!(!text.contains("## Bold lead-in"));
    }

    #[test]
    fn flattens_tables_with_merged_cells() {
        let html = r#"<body><p>FORM 10-K</p><table>
            <tr><td>Net sales</td><td>$</td><td>394,328</td><td>$</td><td>365,817</td></tr>
            <tr><td>Gross margin</td><td>44.1</td><td>%</td><td>41.8</td><td>%</td></tr>
            <tr><td></td><td>Segment data</td><td></td></tr>
        </table></body>"#;
        let text = normalize(html);
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines.contains(&"Net sales    | $394,328 | $365,817"));
        assert!(lines.contains(&"Gross margin | 44.1%    | 41.8%"));
        assert!(lines.contains(&"Segment data"));
    }

    #[test]
    fn table_rows_stay_contiguous() {
        let html = r#"<body><p>FORM 10-K</p>
            <p>Revenue grew across every geographic segment this year.</p>
            <table><tr><td>Revenue</td><td>100</td><td>200</td></tr>
            <tr><td>Cost</td><td>50</td><td>75</td></tr></table>
            <p>Costs grew more slowly than revenue during the year.</p></body>"#;
        let text = normalize(html);
        assert!(text.contains("this year.\n\nRevenue | 100 | 200\nCost    | 50  | 75\n\nCosts grew"));
    }

    #[test]
    fn drops_front_matter_before_anchor() {
        let html = r#"<body><p>Cover page material nobody needs to read here.</p>
            <p>SECURITIES AND EXCHANGE COMMISSION</p>
            <p>Apple Inc. designs smartphones and personal computers.</p></body>"#;
        let text = normalize(html);
        assert!(!text.contains("Cover page"));
        assert!(text.starts_with("SECURITIES AND EXCHANGE COMMISSION"));
    }

    #[test]
    fn keeps_everything_without_anchor() {
        let html = "<body><p>Plain document without any filing anchor at all.</p></body>";
        let text = normalize(html);
        assert_eq!(text, "Plain document without any filing anchor at all.\n");
    }

    #[test]
    fn drops_noise_lines() {
        let html = r#"<body><p>FORM 10-K</p>
            <p>us-gaap:RevenueFromContractWithCustomerMember</p>
            <p>P1Y</p><p>false</p><p>2023-09-30</p><p>42</p>
            <p>Apple Inc. | 2023 Form 10-K | 21</p>
            <p>Actual content survives the noise filter intact.</p></body>"#;
        let text = normalize(html);
        assert_eq!(
            text,
            "FORM 10-K\n\nActual content survives the noise filter intact.\n"
        );
    }

    #[test]
    fn rewrites_table_of_contents() {
        let html = r#"<body><p>FORM 10-K</p>
            <p>TABLE OF CONTENTS</p>
            <table>
              <tr><td></td><td>Page</td></tr>
              <tr><td>Part I</td></tr>
              <tr><td>Item 1.</td><td>Business</td><td>1</td></tr>
              <tr><td>Item 1A.</td><td>Risk Factors</td><td>5</td></tr>
            </table>
            <p>The Company is a global technology business with many products.</p></body>"#;
        let text = normalize(html);
        let lines: Vec<&str> = text.lines().filter(|l| !l.is_empty()).collect();
        assert_eq!(
            lines,
            vec![
                "FORM 10-K",
                "Item 1. Business",
                "Item 1A. Risk Factors",
                "The Company is a global technology business with many products.",
            ]
        );
    }

    #[test]
    fn page_header_link_is_not_a_toc() {
        let html = r#"<body><p>FORM 10-K</p><p>Table of Contents</p>
            <p>This paragraph is ordinary prose that follows a repeated page header link in the filing.</p></body>"#;
        let text = normalize(html);
        assert!(text.contains("ordinary prose that follows"));
    }

    #[test]
    fn div_toc_ends_at_repeated_item_heading() {
        let html = r#"<body><p>FORM 10-K</p><p>TABLE OF CONTENTS</p>
            <div>Item 1.</div><div>Business</div><div>1</div>
            <div>Item 1A.</div><div>Risk Factors</div><div>5</div>
            <p>Item 1.</p><p>Business</p>
            <p>The Company designs, manufactures and markets smartphones and personal computers.</p>
            <p>Item 1A.</p><p>Risk Factors</p>
            <p>Supply shortages could affect results.</p></body>"#;
        let text = normalize(html);
        let lines: Vec<&str> = text.lines().filter(|l| !l.is_empty()).collect();
        assert_eq!(
            lines,
            vec![
                "FORM 10-K",
                "Item 1.",
                "Item 1A.",
                "Item 1.",
                "Business",
                "The Company designs, manufactures and markets smartphones and personal computers.",
                "Item 1A.",
                "Risk Factors",
                "Supply shortages could affect results.",
            ]
        );
    }

    #[test]
    fn page_link_before_split_heading_keeps_body() {
        let html = r#"<body><p>FORM 10-K</p><p>Table of Contents</p>
            <p>PART I</p><p>Item 1.</p><p>Business</p>
            <p>The Company designs, manufactures and markets smartphones, personal computers, tablets and wearables worldwide.</p>
            <p>Competition is intense.</p></body>"#;
        let text = normalize(html);
        assert!(text.contains("Business"));
        assert!(text.contains("designs, manufactures and markets"));
        assert!(text.contains("Competition is intense."));
    }

    #[test]
    fn malformed_markup_does_not_fail() {
        let html = "<body><div><p>FORM 10-K<p>Unclosed paragraph with <b>bold text and more words";
        let text = normalize(html);
        assert!(text.contains("Unclosed paragraph"));
    }

    #[test]
    fn empty_document_is_a_parse_error() {
        let err = FilingNormalizer::default()
            .normalize("empty.htm", "<html><body><script>x</script></body></html>")
            .unwrap_err();
        assert!(matches!(err, Error::FileParse { .. }));
    }

    #[test]
    fn merge_cells_folds_symbols() {
        let cells = vec!["(1,234".to_string(), ")".to_string(), "$".to_string(), "5".to_string()];
        assert_eq!(merge_cells(cells), vec!["(1,234)", "$5"]);
    }
}
