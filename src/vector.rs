//! Vector Index
//!
//! Two independent nearest-neighbor indices — one for entities, one for
//! relationships — each storing an embedding plus its identity payload.
//! Search is exact top-K cosine over the stored records, optionally
//! filtered to a set of document scopes, with a minimum-similarity floor
//! below which matches are discarded.
//!
//! Each record also carries the exact `content` string that was fed to the
//! embedding function; the merge engine rebuilds it whenever a merge
//! changes the underlying description or keywords.

use std::collections::BTreeMap;

use ordered_float::OrderedFloat;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::distance::cosine_similarity;
use crate::model::{Entity, Relationship};

/// Embedding-space projection of an [`Entity`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityVectorRecord {
    /// Normalized entity name.
    pub entity_name: String,
    /// Owning document scope.
    pub document_id: String,
    /// Exact text fed to the embedding function.
    pub content: String,
    /// Embedding of `content`.
    pub embedding: Vec<f32>,
}

/// Embedding-space projection of a [`Relationship`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipVectorRecord {
    /// Normalized source entity name.
    pub source_name: String,
    /// Normalized target entity name.
    pub target_name: String,
    /// Owning document scope.
    pub document_id: String,
    /// Exact text fed to the embedding function.
    pub content: String,
    /// Embedding of `content`.
    pub embedding: Vec<f32>,
}

/// An entity hit from vector search.
#[derive(Debug, Clone)]
pub struct EntityMatch {
    /// Matched entity name.
    pub entity_name: String,
    /// Scope of the matched record.
    pub document_id: String,
    /// Cosine similarity to the query.
    pub similarity: f32,
}

/// A relationship hit from vector search.
#[derive(Debug, Clone)]
pub struct RelationshipMatch {
    /// Matched source entity name.
    pub source_name: String,
    /// Matched target entity name.
    pub target_name: String,
    /// Scope of the matched record.
    pub document_id: String,
    /// Cosine similarity to the query.
    pub similarity: f32,
}

/// Build the embedding content for an entity: `name + description`.
pub fn entity_vector_content(entity: &Entity) -> String {
    format!("{}{}", entity.name, entity.description)
}

/// Build the embedding content for a relationship:
/// `keywords + source + target + description`.
pub fn relationship_vector_content(relationship: &Relationship) -> String {
    format!(
        "{}{}{}{}",
        relationship.keywords,
        relationship.source_name,
        relationship.target_name,
        relationship.description
    )
}

/// Dual cosine index over entity and relationship embeddings.
pub struct VectorIndex {
    /// Matches below this similarity are discarded.
    min_similarity: f32,
    // (name, document_id) -> record
    entities: RwLock<BTreeMap<(String, String), EntityVectorRecord>>,
    // (source, target, document_id) -> record
    relationships: RwLock<BTreeMap<(String, String, String), RelationshipVectorRecord>>,
}

impl Default for VectorIndex {
    fn default() -> Self {
        Self::new(0.2)
    }
}

impl VectorIndex {
    /// Create an empty index with the given minimum-similarity floor.
    pub fn new(min_similarity: f32) -> Self {
        Self {
            min_similarity,
            entities: RwLock::new(BTreeMap::new()),
            relationships: RwLock::new(BTreeMap::new()),
        }
    }

    /// Insert or replace an entity record, keyed by `(name, document_id)`.
    pub fn upsert_entity(&self, record: EntityVectorRecord) {
        let key = (record.entity_name.clone(), record.document_id.clone());
        self.entities.write().insert(key, record);
    }

    /// Insert or replace a relationship record, keyed by
    /// `(source, target, document_id)`.
    pub fn upsert_relationship(&self, record: RelationshipVectorRecord) {
        let key = (
            record.source_name.clone(),
            record.target_name.clone(),
            record.document_id.clone(),
        );
        self.relationships.write().insert(key, record);
    }

    /// Top-K entity search by cosine similarity, optionally scope-filtered.
    pub fn search_entities(
        &self,
        query: &[f32],
        top_k: usize,
        scope: Option<&[String]>,
    ) -> Vec<EntityMatch> {
        let entities = self.entities.read();
        let mut hits: Vec<EntityMatch> = entities
            .values()
            .filter(|r| scope_matches(&r.document_id, scope))
            .filter(|r| r.embedding.len() == query.len())
            .map(|r| EntityMatch {
                entity_name: r.entity_name.clone(),
                document_id: r.document_id.clone(),
                similarity: cosine_similarity(query, &r.embedding),
            })
            .filter(|m| m.similarity > self.min_similarity)
            .collect();
        hits.sort_by_key(|m| std::cmp::Reverse(OrderedFloat(m.similarity)));
        hits.truncate(top_k);
        hits
    }

    /// Top-K relationship search by cosine similarity, optionally
    /// scope-filtered.
    pub fn search_relationships(
        &self,
        query: &[f32],
        top_k: usize,
        scope: Option<&[String]>,
    ) -> Vec<RelationshipMatch> {
        let relationships = self.relationships.read();
        let mut hits: Vec<RelationshipMatch> = relationships
            .values()
            .filter(|r| scope_matches(&r.document_id, scope))
            .filter(|r| r.embedding.len() == query.len())
            .map(|r| RelationshipMatch {
                source_name: r.source_name.clone(),
                target_name: r.target_name.clone(),
                document_id: r.document_id.clone(),
                similarity: cosine_similarity(query, &r.embedding),
            })
            .filter(|m| m.similarity > self.min_similarity)
            .collect();
        hits.sort_by_key(|m| std::cmp::Reverse(OrderedFloat(m.similarity)));
        hits.truncate(top_k);
        hits
    }

    /// Drop all records scoped to a document (cascade from document delete).
    pub fn delete_document(&self, document_id: &str) {
        self.entities.write().retain(|(_, doc), _| doc != document_id);
        self.relationships
            .write()
            .retain(|(_, _, doc), _| doc != document_id);
    }

    /// Number of stored entity records.
    pub fn entity_count(&self) -> usize {
        self.entities.read().len()
    }

    /// Number of stored relationship records.
    pub fn relationship_count(&self) -> usize {
        self.relationships.read().len()
    }
}

fn scope_matches(document_id: &str, scope: Option<&[String]>) -> bool {
    match scope {
        Some(ids) => ids.iter().any(|id| id == document_id),
        None => true,
    }
}
