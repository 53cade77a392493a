//! Graph Store
//!
//! Persistence seam for the knowledge graph: entities keyed by normalized
//! name, relationships keyed by name pair, source text units keyed by id.
//! The engine only assumes the [`GraphStore`] contract — exact lookup,
//! neighbor listing, bulk scan, atomic upsert, and cascading delete by
//! document scope — so relational, graph-native, or in-memory backends are
//! all valid.
//!
//! [`MemoryGraphStore`] is the bundled in-memory backend. Each upsert takes
//! a single write lock, which is the read-modify-write atomicity the merge
//! invariants require; merges for the *same* identity key must still be
//! invoked sequentially by the caller.

use std::collections::{BTreeMap, BTreeSet};

use parking_lot::RwLock;

use crate::error::Result;
use crate::model::{Entity, Relationship, TextUnit};

/// Storage contract for the knowledge graph.
///
/// Absence on lookup is not an error: `get_*` return `Ok(None)` and callers
/// treat it as a valid "create new" signal.
pub trait GraphStore: Send + Sync {
    /// Exact entity lookup by normalized name. When `document_id` is
    /// `None`, any scope matches (first match in scan order wins).
    fn get_entity(&self, name: &str, document_id: Option<&str>) -> Result<Option<Entity>>;

    /// Whether an entity exists in the given document scope.
    fn entity_exists(&self, name: &str, document_id: &str) -> Result<bool>;

    /// Insert or replace an entity, keyed by `(name, document_id)`.
    fn upsert_entity(&self, entity: Entity) -> Result<Entity>;

    /// Exact relationship lookup by `(source, target)` pair. When
    /// `document_id` is `None`, any scope matches.
    fn get_relationship(
        &self,
        source: &str,
        target: &str,
        document_id: Option<&str>,
    ) -> Result<Option<Relationship>>;

    /// Insert or replace a relationship, keyed by
    /// `(source, target, document_id)`.
    fn upsert_relationship(&self, relationship: Relationship) -> Result<Relationship>;

    /// Distinct 1-hop neighbor names of an entity in the undirected
    /// adjacency view.
    fn neighbors(&self, name: &str) -> Result<Vec<String>>;

    /// Bulk entity scan, optionally restricted to a set of document scopes.
    fn all_entities(&self, limit: usize, scope: Option<&[String]>) -> Result<Vec<Entity>>;

    /// Bulk relationship scan, optionally restricted to a set of document
    /// scopes.
    fn all_relationships(&self, limit: usize, scope: Option<&[String]>)
        -> Result<Vec<Relationship>>;

    /// Text unit lookup by id.
    fn get_text_unit(&self, id: &str) -> Result<Option<TextUnit>>;

    /// Insert or replace a text unit.
    fn upsert_text_unit(&self, unit: TextUnit) -> Result<()>;

    /// Cascading delete of all entities, relationships, and text units
    /// scoped to a document.
    fn delete_document(&self, document_id: &str) -> Result<()>;
}

#[derive(Default)]
struct MemoryGraphInner {
    // (name, document_id) -> entity
    entities: BTreeMap<(String, String), Entity>,
    // (source, target, document_id) -> relationship
    relationships: BTreeMap<(String, String, String), Relationship>,
    text_units: BTreeMap<String, TextUnit>,
}

/// In-memory [`GraphStore`] backed by a `parking_lot::RwLock`.
///
/// BTreeMap keys make scan order deterministic, which keeps traversal and
/// context output reproducible across runs.
#[derive(Default)]
pub struct MemoryGraphStore {
    inner: RwLock<MemoryGraphInner>,
}

impl MemoryGraphStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entities across all scopes.
    pub fn entity_count(&self) -> usize {
        self.inner.read().entities.len()
    }

    /// Number of stored relationships across all scopes.
    pub fn relationship_count(&self) -> usize {
        self.inner.read().relationships.len()
    }
}

fn in_scope(document_id: &str, scope: Option<&[String]>) -> bool {
    match scope {
        Some(ids) => ids.iter().any(|id| id == document_id),
        None => true,
    }
}

impl GraphStore for MemoryGraphStore {
    fn get_entity(&self, name: &str, document_id: Option<&str>) -> Result<Option<Entity>> {
        let inner = self.inner.read();
        match document_id {
            Some(doc) => Ok(inner.entities.get(&(name.to_string(), doc.to_string())).cloned()),
            None => Ok(inner
                .entities
                .iter()
                .find(|((n, _), _)| n == name)
                .map(|(_, e)| e.clone())),
        }
    }

    fn entity_exists(&self, name: &str, document_id: &str) -> Result<bool> {
        let inner = self.inner.read();
        Ok(inner
            .entities
            .contains_key(&(name.to_string(), document_id.to_string())))
    }

    fn upsert_entity(&self, entity: Entity) -> Result<Entity> {
        let mut inner = self.inner.write();
        let key = (entity.name.clone(), entity.document_id.clone());
        inner.entities.insert(key, entity.clone());
        Ok(entity)
    }

    fn get_relationship(
        &self,
        source: &str,
        target: &str,
        document_id: Option<&str>,
    ) -> Result<Option<Relationship>> {
        let inner = self.inner.read();
        match document_id {
            Some(doc) => Ok(inner
                .relationships
                .get(&(source.to_string(), target.to_string(), doc.to_string()))
                .cloned()),
            None => Ok(inner
                .relationships
                .iter()
                .find(|((s, t, _), _)| s == source && t == target)
                .map(|(_, r)| r.clone())),
        }
    }

    fn upsert_relationship(&self, relationship: Relationship) -> Result<Relationship> {
        let mut inner = self.inner.write();
        let key = (
            relationship.source_name.clone(),
            relationship.target_name.clone(),
            relationship.document_id.clone(),
        );
        inner.relationships.insert(key, relationship.clone());
        Ok(relationship)
    }

    fn neighbors(&self, name: &str) -> Result<Vec<String>> {
        let inner = self.inner.read();
        let mut seen = BTreeSet::new();
        for (source, target, _) in inner.relationships.keys() {
            if source == name {
                seen.insert(target.clone());
            } else if target == name {
                seen.insert(source.clone());
            }
        }
        Ok(seen.into_iter().collect())
    }

    fn all_entities(&self, limit: usize, scope: Option<&[String]>) -> Result<Vec<Entity>> {
        let inner = self.inner.read();
        Ok(inner
            .entities
            .values()
            .filter(|e| in_scope(&e.document_id, scope))
            .take(limit)
            .cloned()
            .collect())
    }

    fn all_relationships(
        &self,
        limit: usize,
        scope: Option<&[String]>,
    ) -> Result<Vec<Relationship>> {
        let inner = self.inner.read();
        Ok(inner
            .relationships
            .values()
            .filter(|r| in_scope(&r.document_id, scope))
            .take(limit)
            .cloned()
            .collect())
    }

    fn get_text_unit(&self, id: &str) -> Result<Option<TextUnit>> {
        Ok(self.inner.read().text_units.get(id).cloned())
    }

    fn upsert_text_unit(&self, unit: TextUnit) -> Result<()> {
        self.inner.write().text_units.insert(unit.id.clone(), unit);
        Ok(())
    }

    fn delete_document(&self, document_id: &str) -> Result<()> {
        let mut inner = self.inner.write();
        inner.entities.retain(|(_, doc), _| doc != document_id);
        inner
            .relationships
            .retain(|(_, _, doc), _| doc != document_id);
        inner.text_units.retain(|_, u| u.document_id != document_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(name: &str, doc: &str) -> Entity {
        Entity {
            name: name.to_string(),
            entity_type: "person".to_string(),
            description: format!("{name} description"),
            source_id: "chunk-1".to_string(),
            document_id: doc.to_string(),
        }
    }

    fn relationship(source: &str, target: &str, doc: &str) -> Relationship {
        Relationship {
            source_name: source.to_string(),
            target_name: target.to_string(),
            weight: 1.0,
            description: format!("{source} and {target}"),
            keywords: "link".to_string(),
            source_id: "chunk-1".to_string(),
            document_id: doc.to_string(),
        }
    }

    #[test]
    fn test_entity_upsert_and_lookup() {
        let store = MemoryGraphStore::new();
        store.upsert_entity(entity("ALICE", "doc-1")).unwrap();

        assert!(store.entity_exists("ALICE", "doc-1").unwrap());
        assert!(!store.entity_exists("ALICE", "doc-2").unwrap());
        assert!(store.get_entity("ALICE", Some("doc-1")).unwrap().is_some());
        assert!(store.get_entity("ALICE", None).unwrap().is_some());
        assert!(store.get_entity("BOB", None).unwrap().is_none());
    }

    #[test]
    fn test_upsert_replaces_same_key() {
        let store = MemoryGraphStore::new();
        store.upsert_entity(entity("ALICE", "doc-1")).unwrap();
        let mut updated = entity("ALICE", "doc-1");
        updated.entity_type = "organization".to_string();
        store.upsert_entity(updated).unwrap();

        assert_eq!(store.entity_count(), 1);
        let stored = store.get_entity("ALICE", Some("doc-1")).unwrap().unwrap();
        assert_eq!(stored.entity_type, "organization");
    }

    #[test]
    fn test_neighbors_are_undirected_and_distinct() {
        let store = MemoryGraphStore::new();
        store.upsert_relationship(relationship("A", "B", "doc-1")).unwrap();
        store.upsert_relationship(relationship("C", "A", "doc-1")).unwrap();
        // Same pair in a second scope must not duplicate the neighbor.
        store.upsert_relationship(relationship("A", "B", "doc-2")).unwrap();

        assert_eq!(store.neighbors("A").unwrap(), vec!["B", "C"]);
        assert_eq!(store.neighbors("B").unwrap(), vec!["A"]);
        assert!(store.neighbors("Z").unwrap().is_empty());
    }

    #[test]
    fn test_scoped_scans() {
        let store = MemoryGraphStore::new();
        store.upsert_entity(entity("ALICE", "doc-1")).unwrap();
        store.upsert_entity(entity("BOB", "doc-2")).unwrap();

        let scope = vec!["doc-2".to_string()];
        let scoped = store.all_entities(100, Some(&scope)).unwrap();
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].name, "BOB");
        assert_eq!(store.all_entities(100, None).unwrap().len(), 2);
        assert_eq!(store.all_entities(1, None).unwrap().len(), 1);
    }

    #[test]
    fn test_delete_document_cascades() {
        let store = MemoryGraphStore::new();
        store.upsert_entity(entity("ALICE", "doc-1")).unwrap();
        store.upsert_entity(entity("BOB", "doc-2")).unwrap();
        store.upsert_relationship(relationship("ALICE", "BOB", "doc-1")).unwrap();
        store
            .upsert_text_unit(TextUnit {
                id: "chunk-1".to_string(),
                content: "text".to_string(),
                document_id: "doc-1".to_string(),
            })
            .unwrap();

        store.delete_document("doc-1").unwrap();

        assert_eq!(store.entity_count(), 1);
        assert_eq!(store.relationship_count(), 0);
        assert!(store.get_text_unit("chunk-1").unwrap().is_none());
        assert!(store.get_entity("BOB", Some("doc-2")).unwrap().is_some());
    }
}
