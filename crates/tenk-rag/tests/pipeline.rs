//! End-to-end: raw HTML filing to a cited answer, with deterministic providers

use async_trait::async_trait;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use tenk_rag::chat::{ChatSession, Role};
use tenk_rag::config::{AnswerConfig, AnswerStrategy, ChunkingConfig, RetrievalConfig};
use tenk_rag::generation::{render_answer, Answerer};
use tenk_rag::ingestion::{chunk_dir, convert_dir, FilingNormalizer, SectionChunker};
use tenk_rag::providers::{EmbeddingProvider, QaProvider, QaSpan};
use tenk_rag::retrieval::{IndexStore, Indexer, Retriever};
use tenk_rag::{Answer, ChunkType, Chunk, Error, Result};

const DIMS: usize = 256;

/// L2-normalized hashed bag of words
struct BagOfWords;

fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn bucket(word: &str) -> usize {
    // FNV-1a
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in word.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    (hash % DIMS as u64) as usize
}

#[async_trait]
impl EmbeddingProvider for BagOfWords {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0f32; DIMS];
        for word in words(text) {
            vector[bucket(&word)] += 1.0;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        Ok(vector)
    }

    fn dimensions(&self) -> usize {
        DIMS
    }

    fn name(&self) -> &str {
        "bag-of-words"
    }
}

/// Scores by question-word overlap; answers with the first word holding a digit
struct OverlapQa;

#[async_trait]
impl QaProvider for OverlapQa {
    async fn answer(&self, question: &str, context: &str) -> Result<QaSpan> {
        let question_words = words(question);
        let context_words = words(context);
        let hits = question_words
            .iter()
            .filter(|w| context_words.contains(w))
            .count();
        let score = hits as f32 / question_words.len().max(1) as f32;

        let answer = context
            .split_whitespace()
            .find(|w| w.chars().any(|c| c.is_ascii_digit()))
            .or_else(|| context.split_whitespace().next())
            .ok_or_else(|| Error::qa("empty context"))?;
        let start = context.find(answer).unwrap_or(0);
        Ok(QaSpan {
            answer: answer.to_string(),
            score,
            start,
            end: start + answer.len(),
        })
    }

    fn name(&self) -> &str {
        "overlap"
    }
}

const FILING: &str = r#"<html><head><title>aapl-20230930</title></head><body>
<p>Cover page material before the filing proper.</p>
<p>FORM 10-K</p>
<p><b>ITEM 1. BUSINESS</b></p>
<p>Apple designs, manufactures and markets smartphones, personal computers, tablets and wearables.</p>
<p><b>Competition</b></p>
<p>The markets for the company's products are highly competitive and subject to rapid change.</p>
<p><b>ITEM 7. MANAGEMENT'S DISCUSSION AND ANALYSIS</b></p>
<p>Total net sales increased to 383 billion dollars during fiscal 2023 compared with the prior year.</p>
<table>
  <tr><td>Net sales</td><td>$</td><td>383,285</td></tr>
  <tr><td>Cost</td><td>214,137</td></tr>
</table>
</body></html>"#;

const QUESTION: &str = "What were total net sales in fiscal 2023?";

/// raw -> txt -> chunks -> index, returning the opened store
async fn build(root: &Path) -> IndexStore {
    let raw = root.join("raw");
    let txt = root.join("txt");
    let chunks = root.join("chunks");
    std::fs::create_dir_all(raw.join("AAPL")).unwrap();
    std::fs::write(raw.join("AAPL").join("AAPL_2023_10K.htm"), FILING).unwrap();
    std::fs::create_dir_all(raw.join("MSFT")).unwrap();
    std::fs::write(raw.join("MSFT").join("MSFT_2023_10K.htm"), "<html><body></body></html>")
        .unwrap();

    let converted = convert_dir(&raw, &txt, &FilingNormalizer::default()).unwrap();
    assert_eq!(converted.processed, 1);
    assert_eq!(converted.failed, 1);

    let chunked = chunk_dir(&txt, &chunks, &SectionChunker::new(ChunkingConfig::default())).unwrap();
    assert_eq!(chunked.processed, 1);
    assert_eq!(
        chunked.outputs,
        vec![chunks.join("AAPL").join("AAPL_2023_10K_chunks.json")]
    );

    let indexer = Indexer::new(8, 2);
    let records = indexer.collect(&chunks).unwrap();
    let store = indexer.build(records, &BagOfWords, |_| {}).await.unwrap();

    let index_path = root.join("index").join("chunks.idx");
    let metadata_path = root.join("index").join("chunk_metadata.json");
    store.save(&index_path, &metadata_path).unwrap();
    IndexStore::open(&index_path, &metadata_path).unwrap()
}

fn answerer(store: IndexStore) -> Answerer {
    let retriever = Retriever::new(
        Arc::new(BagOfWords),
        Arc::new(store),
        RetrievalConfig::default(),
    );
    Answerer::new(retriever, Arc::new(OverlapQa), None, AnswerConfig::default())
}

#[tokio::test]
async fn chunk_artifact_follows_filing_structure() {
    let dir = tempfile::tempdir().unwrap();
    build(dir.path()).await;

    let json = std::fs::read(
        dir.path()
            .join("chunks")
            .join("AAPL")
            .join("AAPL_2023_10K_chunks.json"),
    )
    .unwrap();
    let chunks: Vec<Chunk> = serde_json::from_slice(&json).unwrap();

    let types: Vec<ChunkType> = chunks.iter().map(|c| c.chunk_type).collect();
    assert_eq!(
        types,
        vec![
            ChunkType::Info,
            ChunkType::Section,
            ChunkType::Paragraph,
            ChunkType::Section
        ]
    );
    assert_eq!(chunks[0].text, "Company: AAPL, Year: 2023");
    assert_eq!(chunks[1].section.as_deref(), Some("ITEM 1. BUSINESS"));
    assert_eq!(chunks[2].subheading.as_deref(), Some("Competition"));
    assert_eq!(
        chunks[3].section.as_deref(),
        Some("ITEM 7. MANAGEMENT'S DISCUSSION AND ANALYSIS")
    );
    assert!(chunks.iter().all(|c| !c.text.contains("Cover page")));
}

#[tokio::test]
async fn answers_with_citation() {
    let dir = tempfile::tempdir().unwrap();
    let store = build(dir.path()).await;
    assert_eq!(store.len(), 3);
    assert_eq!(store.companies(), vec!["AAPL"]);

    let answer = answerer(store).answer(QUESTION, None).await.unwrap();
    let Answer::Found { best, candidates } = &answer else {
        panic!("expected an extractive answer, got {:?}", answer);
    };
    assert_eq!(best.answer, "383");
    assert_eq!(candidates.len(), 3);

    let rendered = render_answer(&answer);
    assert!(rendered.starts_with("**Answer:** 383 (score: 0.625)"));
    assert!(rendered.contains(
        "**Section:** ITEM 7. MANAGEMENT'S DISCUSSION AND ANALYSIS | **Subheading:** N/A"
    ));
    assert!(rendered.ends_with("**Source:** AAPL 2023 | *File: AAPL_2023_10K_chunks.json*"));
}

#[tokio::test]
async fn unknown_company_finds_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let store = build(dir.path()).await;

    let answer = answerer(store).answer(QUESTION, Some("MSFT")).await.unwrap();
    assert!(answer.is_not_found());
    assert_eq!(render_answer(&answer), "No relevant information found.");
}

#[tokio::test]
async fn chat_session_records_completed_turns() {
    let dir = tempfile::tempdir().unwrap();
    let store = build(dir.path()).await;

    let mut session = ChatSession::new(answerer(store), AnswerStrategy::Extractive, None);
    let input = Cursor::new(format!(
        "/companies\n/company aapl\n{}\n/context\nexit\nnever read\n",
        QUESTION
    ));
    let mut output = Vec::new();
    session.run(input, &mut output).await.unwrap();
    let output = String::from_utf8(output).unwrap();

    assert!(output.contains("AAPL"));
    assert!(output.contains("Company filter: AAPL"));
    assert!(output.contains("Total net sales increased to 383 billion dollars"));
    assert_eq!(session.company(), Some("AAPL"));

    let transcript = session.transcript();
    assert_eq!(transcript.len(), 2);
    assert_eq!(transcript[0].role, Role::User);
    assert_eq!(transcript[0].content, QUESTION);
    assert_eq!(transcript[1].role, Role::Assistant);
    assert!(transcript[1].content.contains("**Answer:** 383"));
}

#[tokio::test]
async fn chat_reset_clears_transcript() {
    let dir = tempfile::tempdir().unwrap();
    let store = build(dir.path()).await;

    let mut session = ChatSession::new(answerer(store), AnswerStrategy::Extractive, None);
    let input = Cursor::new(format!("{}\n/reset\n/context\n", QUESTION));
    let mut output = Vec::new();
    session.run(input, &mut output).await.unwrap();

    assert!(session.transcript().is_empty());
    assert!(String::from_utf8(output).unwrap().contains("No answer yet."));
}
