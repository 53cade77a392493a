//! Query Engine
//!
//! Orchestrates a retrieval query: keyword extraction, low-level (entity
//! seeded) and high-level (relationship seeded) context building, and
//! final prompt-block assembly. The two context levels are independent
//! and mirror each other: low-level starts from entity matches and
//! derives relation paths by traversal; high-level starts from
//! relationship matches and derives its entity table from edge
//! endpoints.

use std::cmp::Reverse;
use std::sync::Arc;

use ordered_float::OrderedFloat;
use tracing::info;

use crate::cancel::CancelToken;
use crate::context::{
    edges_to_csv, entities_for_edges, entities_to_csv, relations_to_csv,
    text_units_for_edges, text_units_for_entities, text_units_to_csv, truncate_by_token_size,
    EdgeRow, NodeRow, TextUnitRow,
};
use crate::error::Result;
use crate::graph::GraphStore;
use crate::model::{QueryContext, QueryParams};
use crate::observe::{NoopObserver, StageObserver};
use crate::providers::{EmbeddingProvider, KeywordExtractor};
use crate::traversal::{build_adjacency, find_related_path_descriptions, TraversalConfig};
use crate::vector::VectorIndex;

const OP_QUERY: &str = "build_query_context";

/// Query engine tuning.
#[derive(Debug, Clone)]
pub struct QueryEngineConfig {
    /// Traversal tuning for low-level relation paths.
    pub traversal: TraversalConfig,
    /// Upper bound on entities/relationships scanned when building the
    /// adjacency snapshot.
    pub scan_limit: usize,
}

impl Default for QueryEngineConfig {
    fn default() -> Self {
        Self { traversal: TraversalConfig::default(), scan_limit: 1000 }
    }
}

/// Builds token-budgeted query contexts from the graph and vector index.
pub struct QueryEngine {
    store: Arc<dyn GraphStore>,
    vectors: Arc<VectorIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    keywords: Arc<dyn KeywordExtractor>,
    observer: Arc<dyn StageObserver>,
    config: QueryEngineConfig,
}

impl QueryEngine {
    /// Create an engine with default tuning and no observer.
    pub fn new(
        store: Arc<dyn GraphStore>,
        vectors: Arc<VectorIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
        keywords: Arc<dyn KeywordExtractor>,
    ) -> Self {
        Self {
            store,
            vectors,
            embedder,
            keywords,
            observer: Arc::new(NoopObserver),
            config: QueryEngineConfig::default(),
        }
    }

    /// Replace the stage observer.
    pub fn with_observer(mut self, observer: Arc<dyn StageObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Replace the tuning.
    pub fn with_config(mut self, config: QueryEngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the full query context for a question.
    pub fn build_query_context(
        &self,
        query: &str,
        params: &QueryParams,
        cancel: &CancelToken,
    ) -> Result<QueryContext> {
        let result = self.build_inner(query, params, cancel);
        if let Err(error) = &result {
            self.observer.on_operation_failed(OP_QUERY, &error.to_string());
        }
        result
    }

    fn build_inner(
        &self,
        query: &str,
        params: &QueryParams,
        cancel: &CancelToken,
    ) -> Result<QueryContext> {
        let scope = params.document_scope.as_deref();

        cancel.check()?;
        self.observer.on_stage_start(OP_QUERY, "keywords");
        let keywords = self.keywords.extract_keywords(query)?;
        self.observer.on_stage_end(
            OP_QUERY,
            "keywords",
            &format!(
                "high_level={} low_level={}",
                keywords.high_level.len(),
                keywords.low_level.len()
            ),
        );
        info!(
            high_level = keywords.high_level.len(),
            low_level = keywords.low_level.len(),
            "extracted query keywords"
        );

        cancel.check()?;
        self.observer.on_stage_start(OP_QUERY, "low_level_search");
        let low = self.node_data(&keywords.low_level, params, scope, cancel)?;
        self.observer.on_stage_end(
            OP_QUERY,
            "low_level_search",
            &format!("entities={} text_units={}", low.row_count, low.text_units.len()),
        );

        cancel.check()?;
        self.observer.on_stage_start(OP_QUERY, "high_level_search");
        let high = self.edge_data(&keywords.high_level, params, scope, cancel)?;
        self.observer.on_stage_end(
            OP_QUERY,
            "high_level_search",
            &format!("edges={} text_units={}", high.row_count, high.text_units.len()),
        );

        cancel.check()?;
        self.observer.on_stage_start(OP_QUERY, "combine");
        let text_units = combine_text_units(high.text_units, low.text_units);
        self.observer
            .on_stage_end(OP_QUERY, "combine", &format!("text_units={}", text_units.len()));

        Ok(QueryContext {
            high_level_entities: high.entities_csv,
            high_level_relations: high.relations_csv,
            low_level_entities: low.entities_csv,
            low_level_relations: low.relations_csv,
            text_units: text_units_to_csv(&text_units),
        })
    }

    /// Low-level context: entity vector matches, their text units, and
    /// traversal paths between the matched entities.
    fn node_data(
        &self,
        keywords: &[String],
        params: &QueryParams,
        scope: Option<&[String]>,
        cancel: &CancelToken,
    ) -> Result<LevelData> {
        if keywords.is_empty() {
            return Ok(LevelData::empty_low());
        }

        let query_text = keywords.join(", ");
        let embedding = self.embed_single(&query_text)?;
        let matches = self.vectors.search_entities(&embedding, params.top_k, scope);

        let mut rows = Vec::new();
        let mut source_ids = Vec::new();
        let mut seed_names = Vec::new();
        for hit in &matches {
            let Some(entity) = self.store.get_entity(&hit.entity_name, None)? else {
                continue;
            };
            let rank = self.store.neighbors(&entity.name)?.len();
            if !seed_names.contains(&entity.name) {
                seed_names.push(entity.name.clone());
            }
            source_ids.push(entity.source_id.clone());
            rows.push(NodeRow {
                entity_name: entity.name,
                entity_type: entity.entity_type,
                description: entity.description,
                rank,
            });
        }

        let text_units = text_units_for_entities(
            self.store.as_ref(),
            &rows,
            &source_ids,
            params.max_token_for_text_unit,
        )?;

        let relations = if seed_names.len() >= 2 {
            let entities = self.store.all_entities(self.config.scan_limit, scope)?;
            let relationships = self.store.all_relationships(self.config.scan_limit, scope)?;
            let adjacency = build_adjacency(&entities, &relationships);
            find_related_path_descriptions(
                self.store.as_ref(),
                &adjacency,
                &seed_names,
                &self.config.traversal,
                params.max_token_for_local_context,
                cancel,
            )?
        } else {
            Vec::new()
        };

        Ok(LevelData {
            row_count: rows.len(),
            entities_csv: entities_to_csv(&rows),
            relations_csv: relations_to_csv(&relations),
            text_units,
        })
    }

    /// High-level context: relationship vector matches ranked by endpoint
    /// degree and weight, their endpoint entities, and text units.
    fn edge_data(
        &self,
        keywords: &[String],
        params: &QueryParams,
        scope: Option<&[String]>,
        cancel: &CancelToken,
    ) -> Result<LevelData> {
        if keywords.is_empty() {
            return Ok(LevelData::empty_high());
        }

        let query_text = keywords.join(", ");
        let embedding = self.embed_single(&query_text)?;
        let matches = self.vectors.search_relationships(&embedding, params.top_k, scope);

        let mut edges = Vec::new();
        for hit in &matches {
            cancel.check()?;
            let Some(edge) = self.store.get_relationship(
                &hit.source_name,
                &hit.target_name,
                Some(&hit.document_id),
            )?
            else {
                continue;
            };
            let rank = self.store.neighbors(&edge.source_name)?.len()
                + self.store.neighbors(&edge.target_name)?.len();
            edges.push(EdgeRow {
                source_name: edge.source_name,
                target_name: edge.target_name,
                description: edge.description,
                keywords: edge.keywords,
                weight: edge.weight,
                rank,
            });
        }

        edges.sort_by_key(|e| (Reverse(e.rank), Reverse(OrderedFloat(e.weight))));
        let edges = truncate_by_token_size(
            edges,
            |e| e.description.as_str(),
            params.max_token_for_global_context,
        );

        let entity_rows = entities_for_edges(
            self.store.as_ref(),
            &edges,
            params.max_token_for_local_context,
        )?;
        let text_units = text_units_for_edges(
            self.store.as_ref(),
            &edges,
            params.max_token_for_text_unit,
        )?;

        Ok(LevelData {
            row_count: edges.len(),
            entities_csv: entities_to_csv(&entity_rows),
            relations_csv: edges_to_csv(&edges),
            text_units,
        })
    }

    fn embed_single(&self, text: &str) -> Result<Vec<f32>> {
        let mut embeddings = self.embedder.embed(std::slice::from_ref(&text.to_string()))?;
        embeddings.pop().ok_or_else(|| {
            crate::error::PathRagError::Embedding("provider returned no embedding".to_string())
        })
    }
}

struct LevelData {
    row_count: usize,
    entities_csv: String,
    relations_csv: String,
    text_units: Vec<TextUnitRow>,
}

impl LevelData {
    // The two relation shapes differ: low-level carries rendered path
    // sentences (2 columns), high-level carries raw edges (7 columns).
    // An empty result must still render the matching header.

    fn empty_low() -> Self {
        Self {
            row_count: 0,
            entities_csv: entities_to_csv(&[]),
            relations_csv: relations_to_csv(&[]),
            text_units: Vec::new(),
        }
    }

    fn empty_high() -> Self {
        Self {
            row_count: 0,
            entities_csv: entities_to_csv(&[]),
            relations_csv: edges_to_csv(&[]),
            text_units: Vec::new(),
        }
    }
}

/// High-level units first, then low-level, deduplicated by id.
fn combine_text_units(high: Vec<TextUnitRow>, low: Vec<TextUnitRow>) -> Vec<TextUnitRow> {
    let mut seen = std::collections::BTreeSet::new();
    let mut combined = Vec::new();
    for unit in high.into_iter().chain(low) {
        if seen.insert(unit.id.clone()) {
            combined.push(unit);
        }
    }
    combined
}

/// Render the context blocks into the final prompt section.
pub fn format_query_context(context: &QueryContext) -> String {
    format!(
        "\n-----global-information-----\n\
         -----high-level entity information-----\n\
         ```csv\n{}```\n\
         -----high-level relationship information-----\n\
         ```csv\n{}```\n\
         -----Sources-----\n\
         ```csv\n{}```\n\
         -----local-information-----\n\
         -----low-level entity information-----\n\
         ```csv\n{}```\n\
         -----low-level relationship information-----\n\
         ```csv\n{}```\n",
        context.high_level_entities,
        context.high_level_relations,
        context.text_units,
        context.low_level_entities,
        context.low_level_relations,
    )
}
