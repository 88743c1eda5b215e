//! Answer generation and citation rendering

pub mod answerer;
pub mod format;
pub mod prompt;

pub use answerer::Answerer;
pub use format::{context_preview, render_answer, NOT_FOUND};
pub use prompt::PromptBuilder;
