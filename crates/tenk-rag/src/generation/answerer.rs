//! Question answering over retrieved chunks
//!
//! The extractive strategy runs the QA model on every retrieved chunk and
//! keeps the highest-scoring span; the summary strategy hands the
//! concatenated chunks to the LLM.

use std::sync::Arc;
use tracing::{info, warn};

use super::prompt::PromptBuilder;
use crate::config::{AnswerConfig, AnswerStrategy};
use crate::error::{Error, Result};
use crate::providers::{LlmProvider, Models, QaProvider};
use crate::retrieval::Retriever;
use crate::types::{Answer, AnswerCandidate};

/// Retrieve-then-answer pipeline
#[derive(Clone)]
pub struct Answerer {
    retriever: Retriever,
    qa: Arc<dyn QaProvider>,
    llm: Option<Arc<dyn LlmProvider>>,
    config: AnswerConfig,
}

impl Answerer {
    /// Create an answerer
    pub fn new(
        retriever: Retriever,
        qa: Arc<dyn QaProvider>,
        llm: Option<Arc<dyn LlmProvider>>,
        config: AnswerConfig,
    ) -> Self {
        Self {
            retriever,
            qa,
            llm,
            config,
        }
    }

    /// Answerer using the QA model and LLM from `models`
    pub fn from_models(retriever: Retriever, models: &Models, config: AnswerConfig) -> Self {
        Self::new(retriever, models.qa.clone(), models.llm.clone(), config)
    }

    /// Retriever backing this answerer
    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    /// Rendering and strategy settings
    pub fn config(&self) -> &AnswerConfig {
        &self.config
    }

    /// Answer with the given strategy
    pub async fn ask(
        &self,
        question: &str,
        company: Option<&str>,
        strategy: AnswerStrategy,
    ) -> Result<Answer> {
        match strategy {
            AnswerStrategy::Extractive => self.answer(question, company).await,
            AnswerStrategy::Summary => self.summarize(question, company).await,
        }
    }

    /// Best extractive span across the retrieved chunks
    pub async fn answer(&self, question: &str, company: Option<&str>) -> Result<Answer> {
        let results = self.retriever.search_default(question, company).await?;
        if results.is_empty() {
            info!("No chunks passed retrieval filters for {:?}", question);
            return Ok(Answer::NotFound);
        }

        let mut candidates = Vec::with_capacity(results.len());
        let mut last_error = None;
        for result in results {
            match self.qa.answer(question, &result.text).await {
                Ok(span) => candidates.push(AnswerCandidate {
                    answer: span.answer,
                    score: span.score,
                    context: result.text,
                    meta: result.meta,
                }),
                Err(e) => {
                    warn!(
                        "QA failed on {}#{}: {}",
                        result.meta.filename, result.meta.chunk.chunk_id, e
                    );
                    last_error = Some(e);
                }
            }
        }

        // Stable: equal scores keep retrieval order
        candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

        match candidates.first().cloned() {
            Some(best) => Ok(Answer::Found { best, candidates }),
            None => Err(Error::qa(format!(
                "Every retrieved chunk failed: {}",
                last_error.map(|e| e.to_string()).unwrap_or_default()
            ))),
        }
    }

    /// Free-text answer from the LLM over the retrieved context
    pub async fn summarize(&self, question: &str, company: Option<&str>) -> Result<Answer> {
        let llm = self.llm.as_ref().ok_or_else(|| {
            Error::Config("Summary answers need [llm] enabled = true".to_string())
        })?;

        let results = self.retriever.search_default(question, company).await?;
        if results.is_empty() {
            return Ok(Answer::NotFound);
        }

        let (context, used) =
            PromptBuilder::build_context(&results, self.config.summary_context_chars);
        info!(
            "Summarizing {} chunks ({} chars) with {}",
            used,
            context.chars().count(),
            llm.model()
        );
        let text = llm.summarize(question, &context).await?;

        Ok(Answer::Summary {
            text,
            sources: results.into_iter().take(used).map(|r| r.meta).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetrievalConfig;
    use crate::providers::{EmbeddingProvider, QaSpan};
    use crate::retrieval::{FlatIndex, IndexStore};
    use crate::types::{Chunk, ChunkRecord, ChunkType};
    use async_trait::async_trait;
    use parking_lot::Mutex;

    struct ConstantEmbedder;

    #[async_trait]
    impl EmbeddingProvider for ConstantEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![0.0])
        }

        fn dimensions(&self) -> usize {
            1
        }

        fn name(&self) -> &str {
            "constant"
        }
    }

    /// Scores a context by the number after `score=`; fails on `fail`
    struct ScriptedQa {
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl QaProvider for ScriptedQa {
        async fn answer(&self, _question: &str, context: &str) -> Result<QaSpan> {
            *self.calls.lock() += 1;
            if context.contains("fail") {
                return Err(Error::qa("scripted failure"));
            }
            let score = context
                .split_whitespace()
                .find_map(|w| w.strip_prefix("score="))
                .and_then(|s| s.parse().ok())
                .unwrap_or(0.0);
            let answer = context.split_whitespace().next().unwrap_or_default();
            Ok(QaSpan {
                answer: answer.to_string(),
                score,
                start: 0,
                end: answer.len(),
            })
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    struct EchoLlm;

    #[async_trait]
    impl LlmProvider for EchoLlm {
        async fn summarize(&self, question: &str, context: &str) -> Result<String> {
            Ok(format!("{} / {}", question, context.lines().count()))
        }

        async fn health_check(&self) -> Result<bool> {
            Ok(true)
        }

        fn name(&self) -> &str {
            "echo"
        }

        fn model(&self) -> &str {
            "echo"
        }
    }

    const FILLER: &str = "revenue margin growth segment outlook guidance demand supply";

    fn record(company: &str, id: u32, body: &str) -> ChunkRecord {
        let text = format!("{} {}", body, FILLER);
        let chunk = Chunk {
            chunk_id: id,
            end: text.chars().count(),
            text,
            section: None,
            subheading: None,
            chunk_type: ChunkType::Section,
            start: 0,
            company: company.to_string(),
            year: Some(2019),
        };
        ChunkRecord::new(chunk, company, format!("{}_2019_chunks.json", company))
    }

    fn answerer(
        records: Vec<ChunkRecord>,
        llm: Option<Arc<dyn LlmProvider>>,
    ) -> (Answerer, Arc<ScriptedQa>) {
        let mut index = FlatIndex::new(1);
        for r in &records {
            index.add(r.key(), &[0.0]).unwrap();
        }
        let store = IndexStore::new(index, records).unwrap();
        let retriever = Retriever::new(
            Arc::new(ConstantEmbedder),
            Arc::new(store),
            RetrievalConfig::default(),
        );
        let qa = Arc::new(ScriptedQa {
            calls: Mutex::new(0),
        });
        let answerer = Answerer::new(retriever, qa.clone(), llm, AnswerConfig::default());
        (answerer, qa)
    }

    #[tokio::test]
    async fn highest_score_wins() {
        let (answerer, _) = answerer(
            vec![
                record("AAPL", 2, "low score=0.2"),
                record("AAPL", 3, "high score=0.9"),
                record("AAPL", 4, "mid score=0.5"),
            ],
            None,
        );

        match answerer.answer("question", None).await.unwrap() {
            Answer::Found { best, candidates } => {
                assert_eq!(best.answer, "high");
                let scores: Vec<f32> = candidates.iter().map(|c| c.score).collect();
                assert_eq!(scores, vec![0.9, 0.5, 0.2]);
            }
            other => panic!("unexpected answer: {:?}", other),
        }
    }

    #[tokio::test]
    async fn ties_keep_retrieval_order() {
        let (answerer, _) = answerer(
            vec![
                record("AAPL", 2, "first score=0.5"),
                record("AAPL", 3, "second score=0.5"),
            ],
            None,
        );
        let answer = answerer.answer("question", None).await.unwrap();
        match answer {
            Answer::Found { best, .. } => assert_eq!(best.answer, "first"),
            other => panic!("unexpected answer: {:?}", other),
        }
    }

    #[tokio::test]
    async fn failing_chunk_is_skipped() {
        let (answerer, qa) = answerer(
            vec![
                record("AAPL", 2, "fail score=0.99"),
                record("AAPL", 3, "ok score=0.4"),
            ],
            None,
        );
        let answer = answerer.answer("question", None).await.unwrap();
        assert_eq!(*qa.calls.lock(), 2);
        match answer {
            Answer::Found { best, candidates } => {
                assert_eq!(best.answer, "ok");
                assert_eq!(candidates.len(), 1);
            }
            other => panic!("unexpected answer: {:?}", other),
        }
    }

    #[tokio::test]
    async fn all_failing_is_an_error() {
        let (answerer, _) = answerer(vec![record("AAPL", 2, "fail")], None);
        let err = answerer.answer("question", None).await.unwrap_err();
        assert!(matches!(err, Error::Qa(_)));
    }

    #[tokio::test]
    async fn empty_retrieval_skips_model() {
        let (answerer, qa) = answerer(vec![record("AAPL", 2, "score=0.9")], None);
        let answer = answerer.answer("question", Some("MSFT")).await.unwrap();
        assert!(answer.is_not_found());
        assert_eq!(*qa.calls.lock(), 0);
    }

    #[tokio::test]
    async fn summary_requires_llm() {
        let (answerer, _) = answerer(vec![record("AAPL", 2, "text")], None);
        let err = answerer.summarize("question", None).await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[tokio::test]
    async fn summary_cites_used_chunks() {
        let (answerer, _) = answerer(
            vec![record("AAPL", 2, "alpha."), record("MSFT", 2, "beta.")],
            Some(Arc::new(EchoLlm)),
        );
        match answerer
            .ask("question", None, AnswerStrategy::Summary)
            .await
            .unwrap()
        {
            Answer::Summary { text, sources } => {
                assert!(text.starts_with("question / "));
                assert_eq!(sources.len(), 2);
                assert_eq!(sources[0].chunk.company, "AAPL");
            }
            other => panic!("unexpected answer: {:?}", other),
        }
    }
}
