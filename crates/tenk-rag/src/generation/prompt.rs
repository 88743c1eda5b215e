//! Prompt templates for the summary strategy

use unicode_segmentation::UnicodeSegmentation;

use crate::types::RetrievalResult;

/// Prompt builder for filing questions
pub struct PromptBuilder;

impl PromptBuilder {
    /// Concatenate retrieved chunks, each with its source line, within `max_chars`
    ///
    /// The last chunk that fits only partially is cut at a sentence boundary.
    /// Returns the context and how many chunks contributed to it.
    pub fn build_context(results: &[RetrievalResult], max_chars: usize) -> (String, usize) {
        let mut context = String::new();
        let mut used = 0;

        for (i, result) in results.iter().enumerate() {
            let header = format!("[{}] {}\n", i + 1, Self::format_source_ref(result));
            let remaining = max_chars.saturating_sub(char_len(&context) + char_len(&header));
            if remaining == 0 {
                break;
            }

            let body = truncate_at_sentence(&result.text, remaining);
            if body.is_empty() {
                break;
            }
            context.push_str(&header);
            context.push_str(body);
            context.push_str("\n\n");
            used += 1;

            if body.len() < result.text.len() {
                break;
            }
        }

        (context.trim_end().to_string(), used)
    }

    /// Format source reference for context
    fn format_source_ref(result: &RetrievalResult) -> String {
        let meta = &result.meta;
        let mut parts = vec![format!("{} {}", meta.chunk.company, meta.year_label())];
        if let Some(section) = &meta.chunk.section {
            parts.push(section.clone());
        }
        if let Some(subheading) = &meta.chunk.subheading {
            parts.push(subheading.clone());
        }
        parts.join(", ")
    }

    /// Grounded summary prompt over 10-K excerpts
    pub fn build_summary_prompt(question: &str, context: &str) -> String {
        format!(
            r#"You answer questions about SEC 10-K annual reports using ONLY the excerpts below.

RULES:
1. Use only facts stated in the excerpts
2. If the excerpts do not contain the answer, respond with "No relevant information found."
3. Mention the company and year of each fact you use
4. Keep the answer to a short paragraph

EXCERPTS:
{context}

QUESTION: {question}

Answer:"#,
            context = context,
            question = question
        )
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Longest prefix of whole sentences within `max_chars`
///
/// Falls back to a word boundary when the first sentence alone is too long.
pub fn truncate_at_sentence(text: &str, max_chars: usize) -> &str {
    if char_len(text) <= max_chars {
        return text;
    }

    let mut end = 0;
    let mut chars = 0;
    for (offset, sentence) in text.split_sentence_bound_indices() {
        chars += char_len(sentence);
        if chars > max_chars {
            break;
        }
        end = offset + sentence.len();
    }
    if end > 0 {
        return text[..end].trim_end();
    }

    let mut end = 0;
    let mut chars = 0;
    for (offset, word) in text.split_word_bound_indices() {
        chars += char_len(word);
        if chars > max_chars {
            break;
        }
        end = offset + word.len();
    }
    text[..end].trim_end()
}
