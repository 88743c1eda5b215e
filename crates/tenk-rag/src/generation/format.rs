//! Answer rendering with section and source citations

use crate::types::{Answer, AnswerCandidate, ChunkRecord};

/// Text shown when retrieval finds nothing usable
pub const NOT_FOUND: &str = "No relevant information found.";

const MISSING: &str = "N/A";

/// Markdown rendering of an answer
pub fn render_answer(answer: &Answer) -> String {
    match answer {
        Answer::Found { best, .. } => render_candidate(best),
        Answer::Summary { text, sources } => render_summary(text, sources),
        Answer::NotFound => NOT_FOUND.to_string(),
    }
}

/// Answer span, score, section and source of one candidate
pub fn render_candidate(candidate: &AnswerCandidate) -> String {
    let meta = &candidate.meta;
    format!(
        "**Answer:** {} (score: {:.3})\n\n{}\n\n{}",
        candidate.answer,
        candidate.score,
        render_section(meta),
        render_source(meta)
    )
}

fn render_summary(text: &str, sources: &[ChunkRecord]) -> String {
    let mut out = format!("**Answer:** {}", text.trim());
    if !sources.is_empty() {
        out.push_str("\n\n**Sources:**");
        for meta in sources {
            out.push_str(&format!("\n- {}", meta.format_citation()));
        }
    }
    out
}

/// `**Section:** … | **Subheading:** …`
pub fn render_section(meta: &ChunkRecord) -> String {
    format!(
        "**Section:** {} | **Subheading:** {}",
        meta.chunk.section.as_deref().unwrap_or(MISSING),
        meta.chunk.subheading.as_deref().unwrap_or(MISSING)
    )
}

/// `**Source:** COMPANY YEAR | *File: filename*`
pub fn render_source(meta: &ChunkRecord) -> String {
    format!(
        "**Source:** {} {} | *File: {}*",
        meta.chunk.company,
        meta.year_label(),
        meta.filename
    )
}

/// First `max_chars` characters of `context` followed by `...`
pub fn context_preview(context: &str, max_chars: usize) -> String {
    let cut = context
        .char_indices()
        .nth(max_chars)
        .map(|(i, _)| i)
        .unwrap_or(context.len());
    format!("{}...", &context[..cut])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Chunk, ChunkType};

    fn candidate(section: Option<&str>, subheading: Option<&str>) -> AnswerCandidate {
        let chunk = Chunk {
            chunk_id: 7,
            text: "Net sales were $383.3 billion".to_string(),
            section: section.map(str::to_string),
            subheading: subheading.map(str::to_string),
            chunk_type: ChunkType::Paragraph,
            start: 0,
            end: 29,
            company: "AAPL".to_string(),
            year: Some(2023),
        };
        AnswerCandidate {
            answer: "$383.3 billion".to_string(),
            score: 0.91234,
            context: chunk.text.clone(),
            meta: ChunkRecord::new(chunk, "AAPL", "AAPL_2023_10K_chunks.json"),
        }
    }

    #[test]
    fn renders_found_answer() {
        let best = candidate(Some("ITEM 7. MD&A"), Some("Net Sales"));
        let answer = Answer::Found {
            best: best.clone(),
            candidates: vec![best],
        };
        assert_eq!(
            render_answer(&answer),
            "**Answer:** $383.3 billion (score: 0.912)\n\n\
             **Section:** ITEM 7. MD&A | **Subheading:** Net Sales\n\n\
             **Source:** AAPL 2023 | *File: AAPL_2023_10K_chunks.json*"
        );
    }

    #[test]
    fn missing_headings_render_placeholder() {
        let rendered = render_candidate(&candidate(None, None));
        assert!(rendered.contains("**Section:** N/A | **Subheading:** N/A"));
    }

    #[test]
    fn not_found_sentinel() {
        assert_eq!(render_answer(&Answer::NotFound), "No relevant information found.");
    }

    #[test]
    fn summary_lists_sources() {
        let meta = candidate(None, None).meta;
        let rendered = render_answer(&Answer::Summary {
            text: " Sales grew. ".to_string(),
            sources: vec![meta],
        });
        assert_eq!(
            rendered,
            "**Answer:** Sales grew.\n\n**Sources:**\n- AAPL 2023 - AAPL_2023_10K_chunks.json"
        );
    }

    #[test]
    fn preview_cuts_on_char_boundary() {
        assert_eq!(context_preview("héllo world", 2), "hé...");
        assert_eq!(context_preview("short", 700), "short...");
    }
}
