//! # PathRAG
//!
//! An embeddable, path-aware graph retrieval engine for
//! retrieval-augmented generation. Extracted entities and relationships
//! are merged into a knowledge graph with dedicated merge semantics,
//! queried through vector similarity over entity and relationship
//! embeddings, connected by path-weighted graph traversal, and assembled
//! into token-budgeted CSV context blocks for a language-model prompt.
//!
//! ## Quick start
//!
//! ```
//! use std::sync::Arc;
//!
//! use pathrag::{
//!     CancelToken, ExtractedEntity, ExtractedRelationship, MemoryGraphStore,
//!     MergeConfig, MergeEngine, MockCompletionProvider, MockEmbeddingProvider,
//!     MockKeywordExtractor, QueryEngine, QueryParams, VectorIndex,
//! };
//!
//! # fn main() -> pathrag::Result<()> {
//! let store = Arc::new(MemoryGraphStore::new());
//! let vectors = Arc::new(VectorIndex::new(-1.0));
//! let embedder = Arc::new(MockEmbeddingProvider::new(32));
//! let completion = Arc::new(MockCompletionProvider::new("summary"));
//!
//! let merge = MergeEngine::new(
//!     store.clone(),
//!     vectors.clone(),
//!     embedder.clone(),
//!     completion,
//!     MergeConfig::default(),
//! );
//! merge.merge_and_upsert_entity(&ExtractedEntity {
//!     entity_name: "Alice".into(),
//!     entity_type: "person".into(),
//!     description: "a researcher".into(),
//!     source_id: "chunk-1".into(),
//!     document_id: "doc-1".into(),
//! })?;
//! merge.merge_and_upsert_entity(&ExtractedEntity {
//!     entity_name: "Bob".into(),
//!     entity_type: "person".into(),
//!     description: "an engineer".into(),
//!     source_id: "chunk-1".into(),
//!     document_id: "doc-1".into(),
//! })?;
//! merge.merge_and_upsert_relationship(&ExtractedRelationship {
//!     source_entity: "Alice".into(),
//!     target_entity: "Bob".into(),
//!     description: "Alice works with Bob".into(),
//!     keywords: "collaboration".into(),
//!     weight: 1.0,
//!     source_id: "chunk-1".into(),
//!     document_id: "doc-1".into(),
//! })?;
//!
//! let keywords = Arc::new(MockKeywordExtractor::new());
//! let engine = QueryEngine::new(store, vectors, embedder, keywords);
//! let context = engine.build_query_context(
//!     "How do Alice and Bob relate?",
//!     &QueryParams::default(),
//!     &CancelToken::new(),
//! )?;
//! assert!(context.low_level_entities.contains("ALICE"));
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`graph`] — the [`GraphStore`] trait and the in-memory reference
//!   store. Entities are keyed by normalized name and document.
//! - [`vector`] — brute-force cosine search over entity and relationship
//!   embedding records.
//! - [`merge`] — merge-and-upsert of extracted entities and
//!   relationships: type voting, description unions, weight accumulation,
//!   placeholder endpoints, and summarization of oversized descriptions.
//! - [`traversal`] — path enumeration between seed entities and weighted
//!   propagation scoring, up to three hops.
//! - [`context`] — token estimation, budget truncation, and CSV table
//!   rendering.
//! - [`query`] — the query pipeline tying keyword extraction, both
//!   context levels, and final assembly together.
//! - [`providers`] — the embedding, completion, and keyword-extraction
//!   seams, with deterministic mock implementations for tests.

#![warn(missing_docs)]

pub mod cancel;
pub mod context;
pub mod distance;
pub mod error;
pub mod graph;
pub mod merge;
pub mod model;
pub mod observe;
pub mod providers;
pub mod query;
pub mod traversal;
pub mod vector;

pub use cancel::CancelToken;
pub use context::{estimate_tokens, truncate_by_token_size, EdgeRow, NodeRow, TextUnitRow};
pub use distance::{cosine_distance, cosine_similarity};
pub use error::{ErrorCode, PathRagError, Result};
pub use graph::{GraphStore, MemoryGraphStore};
pub use merge::{IngestSummary, MergeConfig, MergeEngine};
pub use model::{
    normalize_entity_name, undirected_key, Entity, ExtractedEntity, ExtractedRelationship,
    QueryContext, QueryParams, Relationship, TextUnit, GRAPH_FIELD_SEP, UNKNOWN_ENTITY_TYPE,
};
pub use observe::{NoopObserver, StageObserver, TracingObserver};
pub use providers::{
    CompletionProvider, EmbeddingProvider, ExtractedKeywords, KeywordExtractor,
    MockCompletionProvider, MockEmbeddingProvider, MockKeywordExtractor,
};
pub use query::{format_query_context, QueryEngine, QueryEngineConfig};
pub use traversal::{
    build_adjacency, describe_paths, find_related_path_descriptions, find_seed_paths,
    score_paths, select_paths, Adjacency, PairPaths, PathSearchResult, ScoredPath,
    TraversalConfig,
};
pub use vector::{
    entity_vector_content, relationship_vector_content, EntityMatch, EntityVectorRecord,
    RelationshipMatch, RelationshipVectorRecord, VectorIndex,
};
