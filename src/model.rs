//! Knowledge-Graph Data Model
//!
//! Core record types shared by the merge engine, the traversal engine, and
//! context assembly: entities (nodes), relationships (edges), text units
//! (source chunks), extraction candidates, and query parameter/context
//! shapes.
//!
//! Multi-valued text fields (descriptions, keywords, source ids) are stored
//! as a single string joined by [`GRAPH_FIELD_SEP`], a reserved marker not
//! expected in natural text. Use [`split_field`] and [`join_field`] to move
//! between the joined and list representations.

use serde::{Deserialize, Serialize};

/// Reserved separator for multi-valued graph fields.
pub const GRAPH_FIELD_SEP: &str = "<SEP>";

/// Entity type assigned to placeholder nodes created to keep edges from
/// dangling.
pub const UNKNOWN_ENTITY_TYPE: &str = "UNKNOWN";

/// A node in the knowledge graph.
///
/// The `name` is the primary identity key, unique within a document scope.
/// `description` and `source_id` are `<SEP>`-joined unions that grow across
/// merges.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    /// Normalized entity name (trimmed, upper-cased).
    pub name: String,
    /// Free-text category (e.g. "organization"), resolved by majority vote
    /// on merge.
    pub entity_type: String,
    /// `<SEP>`-joined union of extracted descriptions.
    pub description: String,
    /// `<SEP>`-joined union of originating text-unit ids.
    pub source_id: String,
    /// Owning document scope.
    pub document_id: String,
}

/// A directed-in-storage, logically-undirected edge between two entities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    /// Normalized source entity name.
    pub source_name: String,
    /// Normalized target entity name.
    pub target_name: String,
    /// Evidence weight, summed across merges.
    pub weight: f64,
    /// `<SEP>`-joined union of extracted descriptions.
    pub description: String,
    /// `<SEP>`-joined union of extracted keywords.
    pub keywords: String,
    /// `<SEP>`-joined union of originating text-unit ids.
    pub source_id: String,
    /// Owning document scope.
    pub document_id: String,
}

/// A source text chunk referenced by entities/relationships via their
/// `source_id` fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextUnit {
    /// Text-unit identifier.
    pub id: String,
    /// Chunk content.
    pub content: String,
    /// Owning document scope.
    pub document_id: String,
}

/// An entity candidate produced by an upstream extraction pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedEntity {
    /// Entity name as extracted (normalized by the merge engine).
    pub entity_name: String,
    /// Extracted category.
    pub entity_type: String,
    /// Extracted description.
    pub description: String,
    /// Id of the text unit the candidate was extracted from.
    pub source_id: String,
    /// Owning document scope.
    pub document_id: String,
}

/// A relationship candidate produced by an upstream extraction pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedRelationship {
    /// Source entity name as extracted.
    pub source_entity: String,
    /// Target entity name as extracted.
    pub target_entity: String,
    /// Extracted description.
    pub description: String,
    /// Extracted keywords.
    pub keywords: String,
    /// Evidence weight of this single extraction event.
    pub weight: f64,
    /// Id of the text unit the candidate was extracted from.
    pub source_id: String,
    /// Owning document scope.
    pub document_id: String,
}

/// Recognized per-query options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryParams {
    /// Vector-search breadth for both entity and relationship indices.
    pub top_k: usize,
    /// Token budget for source text units.
    pub max_token_for_text_unit: usize,
    /// Token budget for high-level (relationship-seeded) context.
    pub max_token_for_global_context: usize,
    /// Token budget for low-level (entity-seeded) context.
    pub max_token_for_local_context: usize,
    /// Optional set of document scope ids to restrict retrieval to.
    pub document_scope: Option<Vec<String>>,
}

impl Default for QueryParams {
    fn default() -> Self {
        Self {
            top_k: 40,
            max_token_for_text_unit: 4000,
            max_token_for_global_context: 3000,
            max_token_for_local_context: 5000,
            document_scope: None,
        }
    }
}

/// The five formatted context blocks produced for a query, suitable for
/// direct LLM prompt interpolation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryContext {
    /// Global entity table (relationship-seeded).
    pub high_level_entities: String,
    /// Global relationship table (raw edges, 7 columns).
    pub high_level_relations: String,
    /// Local entity table (entity-seeded).
    pub low_level_entities: String,
    /// Local relation table (natural-language paths, 2 columns).
    pub low_level_relations: String,
    /// Combined source text block.
    pub text_units: String,
}

/// Normalize an entity name into its identity form: trimmed and upper-cased.
pub fn normalize_entity_name(name: &str) -> String {
    name.trim().to_uppercase()
}

/// Split a `<SEP>`-joined field into its parts, dropping empty segments.
pub fn split_field(value: &str) -> Vec<String> {
    value
        .split(GRAPH_FIELD_SEP)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Join field parts with the reserved separator.
pub fn join_field<I, S>(parts: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    parts
        .into_iter()
        .map(|s| s.as_ref().to_string())
        .collect::<Vec<_>>()
        .join(GRAPH_FIELD_SEP)
}

impl Relationship {
    /// Direction-normalized identity of the edge: `(min, max)` of the two
    /// endpoint names. Relationships are logically undirected at the
    /// presentation layer.
    pub fn undirected_key(&self) -> (String, String) {
        undirected_key(&self.source_name, &self.target_name)
    }
}

/// Direction-normalize an endpoint pair.
pub fn undirected_key(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}
