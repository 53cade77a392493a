//! Entity/Relationship Merge Engine
//!
//! Builds the deduplicated knowledge graph incrementally from extraction
//! passes. Each merge fetches the pre-existing record for the candidate's
//! identity (absence is a valid "create new" signal), computes the merged
//! record, and upserts it before returning:
//!
//! - entity type: most-frequent value wins, ties broken by first-seen order
//! - descriptions / keywords: exact-duplicate-free union, sorted
//!   lexicographically, `<SEP>`-joined
//! - source ids: union preserving new-then-existing order (no sort)
//! - relationship weight: summed — repeated evidence strengthens an edge
//!
//! Upserting a relationship whose endpoint entity does not exist yet
//! creates an `UNKNOWN`-typed placeholder, so the graph never contains a
//! dangling edge. When a merged description grows past the configured
//! token threshold it is replaced by a single LLM synthesis; this is the
//! only point where merge invokes generation instead of pure set algebra.
//!
//! After every merge the affected vector record is rebuilt (the embedded
//! `content` depends on description/keywords) and re-upserted into the
//! vector index.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::cancel::CancelToken;
use crate::context::estimate_tokens;
use crate::error::{PathRagError, Result};
use crate::graph::GraphStore;
use crate::model::{
    join_field, normalize_entity_name, split_field, Entity, ExtractedEntity,
    ExtractedRelationship, Relationship, UNKNOWN_ENTITY_TYPE,
};
use crate::providers::{CompletionProvider, EmbeddingProvider};
use crate::vector::{
    entity_vector_content, relationship_vector_content, EntityVectorRecord,
    RelationshipVectorRecord, VectorIndex,
};

/// Merge engine tuning.
#[derive(Debug, Clone)]
pub struct MergeConfig {
    /// Estimated-token threshold above which a merged description is
    /// replaced by an LLM synthesis.
    pub summary_max_tokens: usize,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self { summary_max_tokens: 500 }
    }
}

/// Merge-and-upsert engine over a graph store and vector index.
///
/// Safe to invoke sequentially in a tight loop over candidates sharing an
/// identity; concurrent merges on the *same* identity key must be
/// serialized by the caller or the union/sum invariants are violated.
pub struct MergeEngine {
    store: Arc<dyn GraphStore>,
    vectors: Arc<VectorIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    completion: Arc<dyn CompletionProvider>,
    config: MergeConfig,
}

impl MergeEngine {
    /// Create a merge engine over the given collaborators.
    pub fn new(
        store: Arc<dyn GraphStore>,
        vectors: Arc<VectorIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
        completion: Arc<dyn CompletionProvider>,
        config: MergeConfig,
    ) -> Self {
        Self { store, vectors, embedder, completion, config }
    }

    /// Merge an extracted entity with the stored record for the same
    /// `(name, document)` identity and upsert the result.
    pub fn merge_and_upsert_entity(&self, candidate: &ExtractedEntity) -> Result<Entity> {
        let name = normalize_entity_name(&candidate.entity_name);
        if name.is_empty() {
            return Err(PathRagError::InvalidInput("entity candidate has no name".into()));
        }

        let existing = self.store.get_entity(&name, Some(&candidate.document_id))?;

        let mut types = vec![candidate.entity_type.clone()];
        let mut descriptions = vec![candidate.description.clone()];
        let mut source_ids = vec![candidate.source_id.clone()];
        if let Some(existing) = &existing {
            types.push(existing.entity_type.clone());
            descriptions.extend(split_field(&existing.description));
            source_ids.extend(split_field(&existing.source_id));
        }

        let entity_type = majority_vote(&types);
        let mut description = sorted_union(descriptions);
        let source_id = ordered_union(source_ids);

        description = self.summarize_if_needed(&name, description)?;

        let entity = self.store.upsert_entity(Entity {
            name: name.clone(),
            entity_type,
            description,
            source_id,
            document_id: candidate.document_id.clone(),
        })?;
        debug!(entity = %name, "merged entity");

        let content = entity_vector_content(&entity);
        let embedding = self.embed_single(&content)?;
        self.vectors.upsert_entity(EntityVectorRecord {
            entity_name: entity.name.clone(),
            document_id: entity.document_id.clone(),
            content,
            embedding,
        });

        Ok(entity)
    }

    /// Merge an extracted relationship with the stored record for the same
    /// `(source, target, document)` identity and upsert the result.
    ///
    /// Both endpoint entities are guaranteed to exist afterwards; missing
    /// endpoints are created as `UNKNOWN`-typed placeholders carrying the
    /// merged description and source ids.
    pub fn merge_and_upsert_relationship(
        &self,
        candidate: &ExtractedRelationship,
    ) -> Result<Relationship> {
        let source_name = normalize_entity_name(&candidate.source_entity);
        let target_name = normalize_entity_name(&candidate.target_entity);
        if source_name.is_empty() || target_name.is_empty() {
            return Err(PathRagError::InvalidInput(
                "relationship candidate is missing an endpoint".into(),
            ));
        }

        let existing =
            self.store
                .get_relationship(&source_name, &target_name, Some(&candidate.document_id))?;

        let mut weight = candidate.weight;
        let mut descriptions = vec![candidate.description.clone()];
        let mut keywords = vec![candidate.keywords.clone()];
        let mut source_ids = vec![candidate.source_id.clone()];
        if let Some(existing) = &existing {
            weight += existing.weight;
            descriptions.extend(split_field(&existing.description));
            keywords.extend(split_field(&existing.keywords));
            source_ids.extend(split_field(&existing.source_id));
        }

        let mut description = sorted_union(descriptions);
        let keywords = sorted_union(keywords);
        let source_id = ordered_union(source_ids);

        self.ensure_entity_exists(&source_name, &source_id, &description, &candidate.document_id)?;
        self.ensure_entity_exists(&target_name, &source_id, &description, &candidate.document_id)?;

        let pair = format!("({source_name}, {target_name})");
        description = self.summarize_if_needed(&pair, description)?;

        let relationship = self.store.upsert_relationship(Relationship {
            source_name: source_name.clone(),
            target_name: target_name.clone(),
            weight,
            description,
            keywords,
            source_id,
            document_id: candidate.document_id.clone(),
        })?;
        debug!(source = %source_name, target = %target_name, weight, "merged relationship");

        let content = relationship_vector_content(&relationship);
        let embedding = self.embed_single(&content)?;
        self.vectors.upsert_relationship(RelationshipVectorRecord {
            source_name: relationship.source_name.clone(),
            target_name: relationship.target_name.clone(),
            document_id: relationship.document_id.clone(),
            content,
            embedding,
        });

        Ok(relationship)
    }

    /// Ingest one document-extraction batch.
    ///
    /// Candidates are grouped by identity (entity name; relationship
    /// endpoint pair) so same-identity extractions from different chunks
    /// merge sequentially rather than racing. Malformed candidates (missing
    /// name or endpoint) are skipped silently and do not abort the batch.
    pub fn ingest(
        &self,
        entities: &[ExtractedEntity],
        relationships: &[ExtractedRelationship],
        cancel: &CancelToken,
    ) -> Result<IngestSummary> {
        let mut summary = IngestSummary::default();

        let entity_groups = group_by_key(entities, |e| {
            let name = normalize_entity_name(&e.entity_name);
            (!name.is_empty()).then(|| (name, e.document_id.clone()))
        });
        for group in entity_groups {
            for candidate in group {
                cancel.check()?;
                self.merge_and_upsert_entity(candidate)?;
                summary.entities_merged += 1;
            }
        }
        summary.entities_skipped = entities.len() - summary.entities_merged;

        let relationship_groups = group_by_key(relationships, |r| {
            let source = normalize_entity_name(&r.source_entity);
            let target = normalize_entity_name(&r.target_entity);
            (!source.is_empty() && !target.is_empty())
                .then(|| (source, target, r.document_id.clone()))
        });
        for group in relationship_groups {
            for candidate in group {
                cancel.check()?;
                self.merge_and_upsert_relationship(candidate)?;
                summary.relationships_merged += 1;
            }
        }
        summary.relationships_skipped = relationships.len() - summary.relationships_merged;

        Ok(summary)
    }

    /// Cascading delete of a document: graph records, text units, and both
    /// vector projections.
    pub fn delete_document(&self, document_id: &str) -> Result<()> {
        self.store.delete_document(document_id)?;
        self.vectors.delete_document(document_id);
        Ok(())
    }

    fn ensure_entity_exists(
        &self,
        name: &str,
        source_id: &str,
        description: &str,
        document_id: &str,
    ) -> Result<()> {
        if self.store.entity_exists(name, document_id)? {
            return Ok(());
        }
        self.store.upsert_entity(Entity {
            name: name.to_string(),
            entity_type: UNKNOWN_ENTITY_TYPE.to_string(),
            description: description.to_string(),
            source_id: source_id.to_string(),
            document_id: document_id.to_string(),
        })?;
        debug!(entity = %name, "created placeholder endpoint entity");
        Ok(())
    }

    fn summarize_if_needed(&self, identity: &str, description: String) -> Result<String> {
        if estimate_tokens(&description) < self.config.summary_max_tokens {
            return Ok(description);
        }
        let parts = split_field(&description);
        let prompt = format!(
            "Given the entities and the list of descriptions below, all related to the \
             same entity or pair of entities, synthesize a single comprehensive \
             description. Resolve contradictions, write in third person, and include \
             the entity names for full context.\n\nEntities: {identity}\nDescription \
             list:\n{}\n\nOutput:",
            parts.join("\n")
        );
        debug!(identity, "summarizing over-threshold description");
        self.completion.complete(&prompt)
    }

    fn embed_single(&self, content: &str) -> Result<Vec<f32>> {
        let mut embeddings = self.embedder.embed(std::slice::from_ref(&content.to_string()))?;
        if embeddings.len() != 1 {
            return Err(PathRagError::Embedding(format!(
                "expected 1 embedding, provider returned {}",
                embeddings.len()
            )));
        }
        Ok(embeddings.remove(0))
    }
}

/// Counts from one [`MergeEngine::ingest`] batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSummary {
    /// Entity candidates merged.
    pub entities_merged: usize,
    /// Entity candidates skipped as malformed.
    pub entities_skipped: usize,
    /// Relationship candidates merged.
    pub relationships_merged: usize,
    /// Relationship candidates skipped as malformed.
    pub relationships_skipped: usize,
}

/// Most-frequent value, ties broken by first-seen order.
fn majority_vote(values: &[String]) -> String {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for value in values {
        *counts.entry(value).or_default() += 1;
    }
    values
        .iter()
        .max_by_key(|v| (counts[v.as_str()], std::cmp::Reverse(first_index(values, v))))
        .cloned()
        .unwrap_or_default()
}

fn first_index(values: &[String], value: &str) -> usize {
    values.iter().position(|v| v == value).unwrap_or(usize::MAX)
}

/// Duplicate-free union, sorted lexicographically, `<SEP>`-joined. Empty
/// parts are dropped.
fn sorted_union(parts: Vec<String>) -> String {
    let mut unique: Vec<String> = Vec::new();
    for part in parts {
        let part = part.trim().to_string();
        if !part.is_empty() && !unique.contains(&part) {
            unique.push(part);
        }
    }
    unique.sort();
    join_field(unique)
}

/// Duplicate-free union preserving insertion order, `<SEP>`-joined.
fn ordered_union(parts: Vec<String>) -> String {
    let mut unique: Vec<String> = Vec::new();
    for part in parts {
        let part = part.trim().to_string();
        if !part.is_empty() && !unique.contains(&part) {
            unique.push(part);
        }
    }
    join_field(unique)
}

/// Group items by an identity key, preserving first-seen group order.
/// Items whose key function returns `None` are dropped.
fn group_by_key<'a, T, K, F>(items: &'a [T], key: F) -> Vec<Vec<&'a T>>
where
    K: std::hash::Hash + Eq,
    F: Fn(&T) -> Option<K>,
{
    let mut order: Vec<Vec<&T>> = Vec::new();
    let mut index: HashMap<K, usize> = HashMap::new();
    for item in items {
        let Some(k) = key(item) else { continue };
        match index.get(&k) {
            Some(&i) => order[i].push(item),
            None => {
                index.insert(k, order.len());
                order.push(vec![item]);
            }
        }
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::MemoryGraphStore;
    use crate::providers::{MockCompletionProvider, MockEmbeddingProvider};

    fn engine_with(config: MergeConfig) -> (MergeEngine, Arc<MemoryGraphStore>, Arc<VectorIndex>) {
        let store = Arc::new(MemoryGraphStore::new());
        let vectors = Arc::new(VectorIndex::new(0.0));
        let engine = MergeEngine::new(
            store.clone(),
            vectors.clone(),
            Arc::new(MockEmbeddingProvider::new(16)),
            Arc::new(MockCompletionProvider::new("synthesized summary")),
            config,
        );
        (engine, store, vectors)
    }

    fn engine() -> (MergeEngine, Arc<MemoryGraphStore>, Arc<VectorIndex>) {
        engine_with(MergeConfig::default())
    }

    fn entity_candidate(name: &str, entity_type: &str, description: &str, source: &str) -> ExtractedEntity {
        ExtractedEntity {
            entity_name: name.to_string(),
            entity_type: entity_type.to_string(),
            description: description.to_string(),
            source_id: source.to_string(),
            document_id: "doc-1".to_string(),
        }
    }

    fn relationship_candidate(
        source: &str,
        target: &str,
        keywords: &str,
        weight: f64,
    ) -> ExtractedRelationship {
        ExtractedRelationship {
            source_entity: source.to_string(),
            target_entity: target.to_string(),
            description: format!("{source} relates to {target}"),
            keywords: keywords.to_string(),
            weight,
            source_id: "chunk-1".to_string(),
            document_id: "doc-1".to_string(),
        }
    }

    #[test]
    fn test_description_union_is_sorted_regardless_of_order() {
        let (forward, ..) = engine();
        forward
            .merge_and_upsert_entity(&entity_candidate("ALICE", "person", "b", "chunk-1"))
            .unwrap();
        let merged = forward
            .merge_and_upsert_entity(&entity_candidate("ALICE", "person", "a", "chunk-2"))
            .unwrap();
        assert_eq!(merged.description, "a<SEP>b");

        let (reverse, ..) = engine();
        reverse
            .merge_and_upsert_entity(&entity_candidate("ALICE", "person", "a", "chunk-1"))
            .unwrap();
        let merged = reverse
            .merge_and_upsert_entity(&entity_candidate("ALICE", "person", "b", "chunk-2"))
            .unwrap();
        assert_eq!(merged.description, "a<SEP>b");
    }

    #[test]
    fn test_source_ids_keep_new_then_existing_order() {
        let (engine, ..) = engine();
        engine
            .merge_and_upsert_entity(&entity_candidate("ALICE", "person", "x", "chunk-z"))
            .unwrap();
        let merged = engine
            .merge_and_upsert_entity(&entity_candidate("ALICE", "person", "y", "chunk-a"))
            .unwrap();
        // New candidate's source id first, then the existing ones; no sort.
        assert_eq!(merged.source_id, "chunk-a<SEP>chunk-z");
    }

    #[test]
    fn test_type_vote_majority_and_tie_break() {
        let (engine, ..) = engine();
        engine
            .merge_and_upsert_entity(&entity_candidate("ACME", "organization", "d1", "c1"))
            .unwrap();
        // 1-1 tie between candidate and existing: candidate (first-seen) wins.
        let merged = engine
            .merge_and_upsert_entity(&entity_candidate("ACME", "company", "d2", "c2"))
            .unwrap();
        assert_eq!(merged.entity_type, "company");

        // The vote only sees the candidate and the stored value, which is
        // now "company", so "organization" ties and wins as first-seen.
        let merged = engine
            .merge_and_upsert_entity(&entity_candidate("ACME", "organization", "d3", "c3"))
            .unwrap();
        assert_eq!(merged.entity_type, "organization");
    }

    #[test]
    fn test_repeated_merge_dedups_structure_but_sums_weight() {
        let (engine, store, _) = engine();
        let candidate = relationship_candidate("ALICE", "BOB", "friendship", 1.0);
        engine.merge_and_upsert_relationship(&candidate).unwrap();
        let merged = engine.merge_and_upsert_relationship(&candidate).unwrap();

        assert_eq!(merged.weight, 2.0);
        assert_eq!(merged.keywords, "friendship");
        assert_eq!(merged.description, "ALICE relates to BOB");
        assert_eq!(merged.source_id, "chunk-1");
        assert_eq!(store.relationship_count(), 1);
    }

    #[test]
    fn test_keyword_union_across_reextraction() {
        let (engine, ..) = engine();
        engine
            .merge_and_upsert_relationship(&relationship_candidate("ALICE", "BOB", "friendship", 1.0))
            .unwrap();
        let merged = engine
            .merge_and_upsert_relationship(&relationship_candidate("ALICE", "BOB", "collaboration", 1.0))
            .unwrap();
        assert_eq!(merged.weight, 2.0);
        assert_eq!(merged.keywords, "collaboration<SEP>friendship");
    }

    #[test]
    fn test_relationship_creates_placeholder_endpoints() {
        let (engine, store, _) = engine();
        engine
            .merge_and_upsert_relationship(&relationship_candidate("ALICE", "BOB", "friendship", 1.0))
            .unwrap();

        let alice = store.get_entity("ALICE", Some("doc-1")).unwrap().unwrap();
        let bob = store.get_entity("BOB", Some("doc-1")).unwrap().unwrap();
        assert_eq!(alice.entity_type, UNKNOWN_ENTITY_TYPE);
        assert_eq!(bob.entity_type, UNKNOWN_ENTITY_TYPE);
    }

    #[test]
    fn test_placeholder_not_replaced_when_entity_exists() {
        let (engine, store, _) = engine();
        engine
            .merge_and_upsert_entity(&entity_candidate("ALICE", "person", "a person", "chunk-1"))
            .unwrap();
        engine
            .merge_and_upsert_relationship(&relationship_candidate("ALICE", "BOB", "friendship", 1.0))
            .unwrap();

        let alice = store.get_entity("ALICE", Some("doc-1")).unwrap().unwrap();
        assert_eq!(alice.entity_type, "person");
    }

    #[test]
    fn test_summarization_replaces_long_description() {
        let (engine, ..) = engine_with(MergeConfig { summary_max_tokens: 4 });
        let merged = engine
            .merge_and_upsert_entity(&entity_candidate(
                "ALICE",
                "person",
                "a long description that certainly exceeds four estimated tokens",
                "chunk-1",
            ))
            .unwrap();
        assert_eq!(merged.description, "synthesized summary");
    }

    #[test]
    fn test_merge_refreshes_vector_content() {
        let (engine, _, vectors) = engine();
        engine
            .merge_and_upsert_entity(&entity_candidate("ALICE", "person", "first", "chunk-1"))
            .unwrap();
        engine
            .merge_and_upsert_entity(&entity_candidate("ALICE", "person", "second", "chunk-2"))
            .unwrap();
        // Still one record, re-embedded with the merged content.
        assert_eq!(vectors.entity_count(), 1);
    }

    #[test]
    fn test_name_normalization() {
        let (engine, store, _) = engine();
        engine
            .merge_and_upsert_entity(&entity_candidate("  alice ", "person", "d", "c"))
            .unwrap();
        assert!(store.entity_exists("ALICE", "doc-1").unwrap());
    }

    #[test]
    fn test_ingest_groups_and_skips_malformed() {
        let (engine, store, _) = engine();
        let entities = vec![
            entity_candidate("ALICE", "person", "one", "chunk-1"),
            entity_candidate("", "person", "nameless", "chunk-1"),
            entity_candidate("alice", "person", "two", "chunk-2"),
        ];
        let relationships = vec![
            relationship_candidate("ALICE", "BOB", "friendship", 1.0),
            relationship_candidate("ALICE", "", "broken", 1.0),
        ];

        let summary = engine
            .ingest(&entities, &relationships, &CancelToken::new())
            .unwrap();
        assert_eq!(summary.entities_merged, 2);
        assert_eq!(summary.entities_skipped, 1);
        assert_eq!(summary.relationships_merged, 1);
        assert_eq!(summary.relationships_skipped, 1);

        let alice = store.get_entity("ALICE", Some("doc-1")).unwrap().unwrap();
        assert_eq!(alice.description, "one<SEP>two");
    }

    #[test]
    fn test_ingest_cancellation() {
        let (engine, ..) = engine();
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = engine
            .ingest(&[entity_candidate("ALICE", "person", "d", "c")], &[], &cancel)
            .unwrap_err();
        assert!(matches!(err, PathRagError::Cancelled));
    }
}
