//! External Capability Providers
//!
//! Capability seams for everything the engine consumes but does not
//! implement: embedding generation, chat completion (used only by the
//! merge engine's description summarization), and query keyword
//! extraction. Concrete LLM/embedding backends live outside this crate;
//! deterministic mock implementations are bundled for tests and local
//! experimentation.
//!
//! # Example
//!
//! ```
//! use pathrag::providers::{EmbeddingProvider, MockEmbeddingProvider};
//!
//! let provider = MockEmbeddingProvider::new(64);
//! let embeddings = provider.embed(&["hello".to_string()]).unwrap();
//! assert_eq!(embeddings.len(), 1);
//! assert_eq!(embeddings[0].len(), 64);
//! ```

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Batched embedding generation.
///
/// Implementations must return exactly one embedding per input text, in
/// input order.
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a batch of texts.
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Single-shot chat completion.
pub trait CompletionProvider: Send + Sync {
    /// Produce a completion for a prompt.
    fn complete(&self, prompt: &str) -> Result<String>;
}

/// High-level (thematic/relationship) and low-level (specific/entity)
/// keywords extracted from a query.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractedKeywords {
    /// Broad thematic keywords, used to seed relationship search.
    pub high_level: Vec<String>,
    /// Specific entity keywords, used to seed entity search.
    pub low_level: Vec<String>,
}

/// Query keyword extraction.
pub trait KeywordExtractor: Send + Sync {
    /// Split a query into high-level and low-level keywords.
    fn extract_keywords(&self, query: &str) -> Result<ExtractedKeywords>;
}

// ── Mock providers ───────────────────────────────────────────────────────────

/// Deterministic embedding provider for tests.
///
/// Each dimension is derived by hashing the input text with the dimension
/// index, so identical texts always produce identical unit-normalized
/// vectors and distinct texts diverge.
pub struct MockEmbeddingProvider {
    dimensions: usize,
}

impl MockEmbeddingProvider {
    /// Create a provider producing vectors of the given dimensionality.
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v: Vec<f32> = (0..self.dimensions)
            .map(|i| {
                let mut hasher = DefaultHasher::new();
                text.hash(&mut hasher);
                (i as u64).hash(&mut hasher);
                (hasher.finish() as f32 / u64::MAX as f32) * 2.0 - 1.0
            })
            .collect();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt().max(1e-8);
        v.iter_mut().for_each(|x| *x /= norm);
        v
    }
}

impl EmbeddingProvider for MockEmbeddingProvider {
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

/// Completion provider returning a canned response.
pub struct MockCompletionProvider {
    response: String,
}

impl MockCompletionProvider {
    /// Create a provider that always returns `response`.
    pub fn new(response: impl Into<String>) -> Self {
        Self { response: response.into() }
    }
}

impl CompletionProvider for MockCompletionProvider {
    fn complete(&self, _prompt: &str) -> Result<String> {
        Ok(self.response.clone())
    }
}

/// Keyword extractor returning fixed keyword lists, or a trivial
/// whitespace split of the query when none were configured.
#[derive(Default)]
pub struct MockKeywordExtractor {
    fixed: Option<ExtractedKeywords>,
}

impl MockKeywordExtractor {
    /// Extract by whitespace-splitting the query.
    pub fn new() -> Self {
        Self::default()
    }

    /// Always return the given keyword lists.
    pub fn with_keywords(high_level: Vec<String>, low_level: Vec<String>) -> Self {
        Self {
            fixed: Some(ExtractedKeywords { high_level, low_level }),
        }
    }
}

impl KeywordExtractor for MockKeywordExtractor {
    fn extract_keywords(&self, query: &str) -> Result<ExtractedKeywords> {
        if let Some(fixed) = &self.fixed {
            return Ok(fixed.clone());
        }
        let words: Vec<String> = query
            .split_whitespace()
            .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
            .filter(|w| !w.is_empty())
            .collect();
        Ok(ExtractedKeywords {
            high_level: vec![query.trim().to_string()],
            low_level: words,
        })
    }
}
