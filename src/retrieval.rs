use std::cmp::Ordering;
use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::config::{PipelineConfig, RetryPolicy};
use crate::error::{AnalysisError, Result};
use crate::llm::retry::with_retry;

/// Largest batch sent to the embedder in one call.
const EMBED_BATCH_SIZE: usize = 100;

/// Turns text into dense vectors for similarity search.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// One vector per input text, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    fn model_name(&self) -> &str;
}

/// Recursive character splitter: tries paragraph, line, then word boundaries,
/// and only cuts inside a word when nothing else fits.
#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
    separators: Vec<&'static str>,
}

impl TextSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            chunk_overlap: chunk_overlap.min(chunk_size.saturating_sub(1)),
            separators: vec!["\n\n", "\n", " ", ""],
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    pub fn split(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, 0)
            .into_iter()
            .map(|chunk| chunk.trim().to_string())
            .filter(|chunk| !chunk.is_empty())
            .collect()
    }

    fn split_recursive(&self, text: &str, level: usize) -> Vec<String> {
        let (separator, next_level) = self.separators[level..]
            .iter()
            .enumerate()
            .find(|(_, sep)| sep.is_empty() || text.contains(**sep))
            .map(|(offset, sep)| (*sep, level + offset + 1))
            .unwrap_or(("", self.separators.len()));

        let pieces: Vec<&str> = if separator.is_empty() {
            text.char_indices()
                .map(|(i, c)| &text[i..i + c.len_utf8()])
                .collect()
        } else {
            text.split(separator).filter(|p| !p.is_empty()).collect()
        };

        let mut chunks = Vec::new();
        let mut fitting: Vec<&str> = Vec::new();

        for piece in pieces {
            if char_len(piece) <= self.chunk_size {
                fitting.push(piece);
                continue;
            }
            if !fitting.is_empty() {
                chunks.extend(self.merge(&fitting, separator));
                fitting.clear();
            }
            if next_level >= self.separators.len() {
                chunks.push(piece.to_string());
            } else {
                chunks.extend(self.split_recursive(piece, next_level));
            }
        }

        if !fitting.is_empty() {
            chunks.extend(self.merge(&fitting, separator));
        }
        chunks
    }

    fn merge(&self, pieces: &[&str], separator: &str) -> Vec<String> {
        let sep_len = char_len(separator);
        let mut chunks = Vec::new();
        let mut window: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for piece in pieces {
            let len = char_len(piece);
            let added = if window.is_empty() { len } else { len + sep_len };

            if total + added > self.chunk_size && !window.is_empty() {
                chunks.push(join(&window, separator));

                // keep at most `chunk_overlap` characters as the next chunk's prefix
                while let Some(front) = window.front() {
                    if total <= self.chunk_overlap && total + len + sep_len <= self.chunk_size {
                        break;
                    }
                    let front_len = char_len(front);
                    window.pop_front();
                    total -= if window.is_empty() {
                        front_len
                    } else {
                        front_len + sep_len
                    };
                }
            }

            total += if window.is_empty() { len } else { len + sep_len };
            window.push_back(piece);
        }

        if !window.is_empty() {
            chunks.push(join(&window, separator));
        }
        chunks
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

fn join(window: &VecDeque<&str>, separator: &str) -> String {
    window.iter().copied().collect::<Vec<_>>().join(separator)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Zero-based page the chunk came from.
    pub page: usize,
    pub text: String,
    pub embedding: Vec<f32>,
}

/// A persisted, read-only similarity index over a document's text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticIndex {
    pub model: String,
    pub dimension: usize,
    pub created_at: DateTime<Utc>,
    pub entries: Vec<IndexEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Passage {
    pub page: usize,
    pub text: String,
    pub score: f32,
}

impl SemanticIndex {
    /// Chunks every page and embeds the chunks.
    pub async fn build(
        pages: &[String],
        splitter: &TextSplitter,
        embedder: &dyn Embedder,
        retry: &RetryPolicy,
    ) -> Result<Self> {
        let chunks: Vec<(usize, String)> = pages
            .iter()
            .enumerate()
            .flat_map(|(page, text)| {
                splitter
                    .split(text)
                    .into_iter()
                    .map(move |chunk| (page, chunk))
            })
            .collect();

        if chunks.is_empty() {
            return Err(AnalysisError::InvalidIndex(
                "document contains no extractable text".to_string(),
            ));
        }
        info!(
            "Embedding {} chunks from {} pages with {}",
            chunks.len(),
            pages.len(),
            embedder.model_name()
        );

        let mut entries = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(EMBED_BATCH_SIZE) {
            let texts: Vec<String> = batch.iter().map(|(_, text)| text.clone()).collect();
            let texts = &texts;
            let vectors =
                with_retry(retry, "embedding batch", || async move { embedder.embed(texts).await })
                    .await?;

            if vectors.len() != batch.len() {
                return Err(AnalysisError::UpstreamService(format!(
                    "embedder returned {} vectors for {} texts",
                    vectors.len(),
                    batch.len()
                )));
            }

            for ((page, text), embedding) in batch.iter().cloned().zip(vectors) {
                entries.push(IndexEntry {
                    page,
                    text,
                    embedding,
                });
            }
        }

        let dimension = entries[0].embedding.len();
        if dimension == 0 || entries.iter().any(|e| e.embedding.len() != dimension) {
            return Err(AnalysisError::InvalidIndex(
                "embeddings have inconsistent dimensions".to_string(),
            ));
        }

        Ok(Self {
            model: embedder.model_name().to_string(),
            dimension,
            created_at: Utc::now(),
            entries,
        })
    }

    pub fn exists(path: &Path) -> bool {
        path.is_file()
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !Self::exists(path) {
            return Err(AnalysisError::IndexNotFound(path.to_path_buf()));
        }
        let reader = BufReader::new(File::open(path)?);
        let index: SemanticIndex = serde_json::from_reader(reader)
            .map_err(|e| AnalysisError::InvalidIndex(format!("{}: {e}", path.display())))?;
        debug!(
            "Loaded index {} ({} entries, dim {})",
            path.display(),
            index.entries.len(),
            index.dimension
        );
        Ok(index)
    }

    /// Writes the index atomically (temp file then rename).
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        {
            let writer = BufWriter::new(File::create(&tmp)?);
            serde_json::to_writer(writer, self)?;
        }
        std::fs::rename(&tmp, path)?;
        info!("Saved semantic index to {}", path.display());
        Ok(())
    }

    /// Top `k` entries by cosine similarity, best first. Ties keep index order.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<Passage> {
        if k == 0 {
            return Vec::new();
        }

        let mut scored: Vec<Passage> = self
            .entries
            .iter()
            .filter(|entry| entry.embedding.len() == query.len())
            .filter_map(|entry| {
                cosine_similarity(query, &entry.embedding).map(|score| Passage {
                    page: entry.page,
                    text: entry.text.clone(),
                    score,
                })
            })
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        scored.truncate(k);
        scored
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return None;
    }
    Some(dot / (norm_a.sqrt() * norm_b.sqrt()))
}

/// Answers "most relevant passages for a query" over a loaded index.
#[derive(Clone)]
pub struct RetrievalEngine {
    index: Arc<SemanticIndex>,
    embedder: Arc<dyn Embedder>,
    default_k: usize,
    retry: RetryPolicy,
}

impl RetrievalEngine {
    /// Loads the index at `path`. Fails with `IndexNotFound` when the artifact
    /// is missing.
    pub async fn open(
        path: &Path,
        embedder: Arc<dyn Embedder>,
        config: &PipelineConfig,
    ) -> Result<Self> {
        let owned = path.to_path_buf();
        let index = tokio::task::spawn_blocking(move || SemanticIndex::load(&owned))
            .await
            .map_err(|e| AnalysisError::InvalidIndex(format!("index load task failed: {e}")))??;
        Ok(Self::from_index(Arc::new(index), embedder, config))
    }

    pub fn from_index(
        index: Arc<SemanticIndex>,
        embedder: Arc<dyn Embedder>,
        config: &PipelineConfig,
    ) -> Self {
        if index.model != embedder.model_name() {
            warn!(
                "Index was built with '{}' but queries use '{}'",
                index.model,
                embedder.model_name()
            );
        }
        Self {
            index,
            embedder,
            default_k: config.retrieval_k,
            retry: config.retry.clone(),
        }
    }

    pub fn index(&self) -> &SemanticIndex {
        &self.index
    }

    pub async fn query(&self, text: &str, k: usize) -> Result<Vec<Passage>> {
        let input = vec![text.to_string()];
        let input = &input;
        let embedder = &self.embedder;
        let mut vectors = with_retry(&self.retry, "query embedding", || async move {
            embedder.embed(input).await
        })
        .await?;

        let query = vectors.pop().ok_or_else(|| {
            AnalysisError::UpstreamService("embedder returned no vector for query".to_string())
        })?;
        Ok(self.index.search(&query, k))
    }

    /// Passages for `text` with the default `k`, joined in ranked order.
    pub async fn context_for(&self, text: &str) -> Result<String> {
        let passages = self.query(text, self.default_k).await?;
        Ok(passages
            .iter()
            .map(|p| p.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct KeywordEmbedder;

    const KEYWORDS: [&str; 4] = ["revenue", "equity", "cash", "year"];

    #[async_trait]
    impl Embedder for KeywordEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    let lower = t.to_lowercase();
                    KEYWORDS
                        .iter()
                        .map(|k| lower.matches(k).count() as f32 + 0.01)
                        .collect()
                })
                .collect())
        }

        fn model_name(&self) -> &str {
            "keyword-test"
        }
    }

    #[test]
    fn test_splitter_respects_chunk_size_and_overlap() {
        let splitter = TextSplitter::new(20, 5);
        let text = "alpha beta gamma delta epsilon zeta eta theta iota kappa";
        let chunks = splitter.split(text);

        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.chars().count() <= 20));
        // consecutive chunks share a trailing word
        let first_last_word = chunks[0].split(' ').last().unwrap();
        assert!(chunks[1].starts_with(first_last_word));
    }

    #[test]
    fn test_splitter_prefers_paragraphs() {
        let splitter = TextSplitter::new(30, 0);
        let chunks = splitter.split("Balance sheet\n\nCash flow statement\n\nNotes");
        assert_eq!(chunks, vec!["Balance sheet", "Cash flow statement\n\nNotes"]);
    }

    #[test]
    fn test_splitter_cuts_long_words() {
        let splitter = TextSplitter::new(4, 0);
        let chunks = splitter.split("abcdefghij");
        assert_eq!(chunks, vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn test_cosine_similarity() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]), Some(1.0));
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), Some(0.0));
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), None);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), None);
    }

    #[tokio::test]
    async fn test_build_save_load_and_query() {
        let pages = vec![
            "Revenue from operations was 1,000 crore against 800 crore last year.".to_string(),
            "Total equity stood at 700 crore. Equity share capital unchanged.".to_string(),
            "Cash and cash equivalents at the end of the year: 200 crore.".to_string(),
        ];
        let splitter = TextSplitter::new(1500, 300);
        let index = SemanticIndex::build(&pages, &splitter, &KeywordEmbedder, &RetryPolicy::none())
            .await
            .unwrap();
        assert_eq!(index.entries.len(), 3);
        assert_eq!(index.dimension, 4);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index").join("report.json");
        index.save(&path).unwrap();

        let engine = RetrievalEngine::open(&path, Arc::new(KeywordEmbedder), &PipelineConfig::default())
            .await
            .unwrap();
        let passages = engine.query("total equity", 2).await.unwrap();
        assert_eq!(passages.len(), 2);
        assert_eq!(passages[0].page, 1);
        assert!(passages[0].score >= passages[1].score);
    }

    #[tokio::test]
    async fn test_missing_index_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.json");
        let result =
            RetrievalEngine::open(&path, Arc::new(KeywordEmbedder), &PipelineConfig::default())
                .await;
        assert!(matches!(result, Err(AnalysisError::IndexNotFound(p)) if p == path));
    }

    #[tokio::test]
    async fn test_empty_document_is_rejected() {
        let pages = vec!["   ".to_string()];
        let result = SemanticIndex::build(
            &pages,
            &TextSplitter::new(100, 10),
            &KeywordEmbedder,
            &RetryPolicy::none(),
        )
        .await;
        assert!(matches!(result, Err(AnalysisError::InvalidIndex(_))));
    }
}
