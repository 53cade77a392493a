//! End-to-end tests: ingest extraction batches, then build query contexts
//! over the resulting graph and vector index.

use std::sync::Arc;

use pathrag::{
    CancelToken, ExtractedEntity, ExtractedRelationship, GraphStore, MemoryGraphStore,
    MergeConfig, MergeEngine, MockCompletionProvider, MockEmbeddingProvider,
    MockKeywordExtractor, QueryEngine, QueryParams, TextUnit, VectorIndex,
};

const DIMS: usize = 32;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

struct Fixture {
    store: Arc<MemoryGraphStore>,
    vectors: Arc<VectorIndex>,
    merge: MergeEngine,
}

impl Fixture {
    fn new() -> Self {
        init_tracing();
        let store = Arc::new(MemoryGraphStore::new());
        // Hash-derived mock embeddings can land anywhere on the sphere, so
        // disable the similarity floor and rely on top-k alone.
        let vectors = Arc::new(VectorIndex::new(-1.0));
        let merge = MergeEngine::new(
            store.clone(),
            vectors.clone(),
            Arc::new(MockEmbeddingProvider::new(DIMS)),
            Arc::new(MockCompletionProvider::new("synthesized summary")),
            MergeConfig::default(),
        );
        Self { store, vectors, merge }
    }

    fn query_engine(&self, high: &[&str], low: &[&str]) -> QueryEngine {
        let keywords = Arc::new(MockKeywordExtractor::with_keywords(
            high.iter().map(|s| s.to_string()).collect(),
            low.iter().map(|s| s.to_string()).collect(),
        ));
        QueryEngine::new(
            self.store.clone(),
            self.vectors.clone(),
            Arc::new(MockEmbeddingProvider::new(DIMS)),
            keywords,
        )
    }
}

fn entity(name: &str, description: &str, source_id: &str, document_id: &str) -> ExtractedEntity {
    ExtractedEntity {
        entity_name: name.to_string(),
        entity_type: "person".to_string(),
        description: description.to_string(),
        source_id: source_id.to_string(),
        document_id: document_id.to_string(),
    }
}

fn relationship(
    source: &str,
    target: &str,
    keywords: &str,
    document_id: &str,
) -> ExtractedRelationship {
    ExtractedRelationship {
        source_entity: source.to_string(),
        target_entity: target.to_string(),
        description: format!("{source} is connected to {target}"),
        keywords: keywords.to_string(),
        weight: 1.0,
        source_id: "chunk-1".to_string(),
        document_id: document_id.to_string(),
    }
}

fn seed_story(fixture: &Fixture) {
    fixture
        .store
        .upsert_text_unit(TextUnit {
            id: "chunk-1".to_string(),
            content: "Alice and Bob collaborate on graph retrieval.".to_string(),
            document_id: "doc-1".to_string(),
        })
        .unwrap();
    fixture
        .merge
        .ingest(
            &[
                entity("Alice", "a researcher", "chunk-1", "doc-1"),
                entity("Bob", "an engineer", "chunk-1", "doc-1"),
                entity("Carol", "a reviewer", "chunk-1", "doc-1"),
            ],
            &[
                relationship("Alice", "Bob", "collaboration", "doc-1"),
                relationship("Bob", "Carol", "review", "doc-1"),
            ],
            &CancelToken::new(),
        )
        .unwrap();
}

#[test]
fn test_ingest_then_query_populates_every_block() {
    let fixture = Fixture::new();
    seed_story(&fixture);

    let engine = fixture.query_engine(&["collaboration"], &["alice", "bob", "carol"]);
    let context = engine
        .build_query_context("who collaborates", &QueryParams::default(), &CancelToken::new())
        .unwrap();

    for name in ["ALICE", "BOB", "CAROL"] {
        assert!(context.low_level_entities.contains(name), "missing {name}");
    }
    // ALICE and CAROL are two hops apart through BOB, so traversal has
    // paths to describe.
    assert!(context.low_level_relations.contains("The entity ALICE"));
    assert!(context.high_level_relations.contains("collaboration"));
    assert!(context.high_level_entities.contains("BOB"));
    assert!(context.text_units.contains("graph retrieval"));
}

#[test]
fn test_repeated_extraction_accumulates_weight() {
    let fixture = Fixture::new();
    seed_story(&fixture);

    // The same pair extracted again from another chunk.
    fixture
        .merge
        .merge_and_upsert_relationship(&ExtractedRelationship {
            source_entity: "Alice".to_string(),
            target_entity: "Bob".to_string(),
            description: "Alice reviews Bob's work".to_string(),
            keywords: "review".to_string(),
            weight: 1.0,
            source_id: "chunk-2".to_string(),
            document_id: "doc-1".to_string(),
        })
        .unwrap();

    let stored = fixture
        .store
        .get_relationship("ALICE", "BOB", Some("doc-1"))
        .unwrap()
        .unwrap();
    assert_eq!(stored.weight, 2.0);
    assert!(stored.keywords.contains("collaboration"));
    assert!(stored.keywords.contains("review"));
    assert!(stored.source_id.starts_with("chunk-2"));
    assert!(stored.source_id.contains("chunk-1"));

    // The accumulated weight surfaces in the high-level table.
    let engine = fixture.query_engine(&["collaboration"], &[]);
    let context = engine
        .build_query_context("collaboration", &QueryParams::default(), &CancelToken::new())
        .unwrap();
    let edge_line = context
        .high_level_relations
        .lines()
        .find(|l| l.contains("ALICE"))
        .unwrap();
    assert!(edge_line.contains(",2,"), "weight missing from: {edge_line}");
}

#[test]
fn test_relationship_to_unseen_entity_creates_placeholder() {
    let fixture = Fixture::new();
    fixture
        .merge
        .merge_and_upsert_relationship(&relationship("Alice", "Ghost", "haunting", "doc-1"))
        .unwrap();

    let ghost = fixture.store.get_entity("GHOST", Some("doc-1")).unwrap().unwrap();
    assert_eq!(ghost.entity_type, "UNKNOWN");
    assert!(!ghost.description.is_empty());

    // Placeholders carry no entity vector record, but they still surface
    // through the high-level table as edge endpoints.
    let engine = fixture.query_engine(&["haunting"], &[]);
    let context = engine
        .build_query_context("ghosts", &QueryParams::default(), &CancelToken::new())
        .unwrap();
    assert!(context.high_level_relations.contains("haunting"));
    assert!(context.high_level_entities.contains("GHOST"));
    assert!(context.high_level_entities.contains("UNKNOWN"));
}

#[test]
fn test_document_scope_isolates_documents() {
    let fixture = Fixture::new();
    seed_story(&fixture);
    fixture
        .merge
        .ingest(
            &[entity("Dave", "from another document", "chunk-9", "doc-2")],
            &[],
            &CancelToken::new(),
        )
        .unwrap();

    let engine = fixture.query_engine(&[], &["dave", "alice"]);
    let params = QueryParams {
        document_scope: Some(vec!["doc-2".to_string()]),
        ..QueryParams::default()
    };
    let context = engine
        .build_query_context("who is dave", &params, &CancelToken::new())
        .unwrap();

    assert!(context.low_level_entities.contains("DAVE"));
    assert!(!context.low_level_entities.contains("ALICE"));
}

#[test]
fn test_delete_document_cascades_to_queries() {
    let fixture = Fixture::new();
    seed_story(&fixture);
    assert!(fixture.store.entity_count() > 0);

    fixture.merge.delete_document("doc-1").unwrap();

    assert_eq!(fixture.store.entity_count(), 0);
    assert_eq!(fixture.store.relationship_count(), 0);
    assert_eq!(fixture.vectors.entity_count(), 0);
    assert_eq!(fixture.vectors.relationship_count(), 0);

    let engine = fixture.query_engine(&["collaboration"], &["alice"]);
    let context = engine
        .build_query_context("who collaborates", &QueryParams::default(), &CancelToken::new())
        .unwrap();
    assert_eq!(context.low_level_entities, "id,entity,type,description,rank\n");
    assert_eq!(context.text_units, "id,content\n");
}

#[test]
fn test_ingest_skips_malformed_candidates() {
    let fixture = Fixture::new();
    let summary = fixture
        .merge
        .ingest(
            &[
                entity("Alice", "fine", "chunk-1", "doc-1"),
                entity("   ", "no name", "chunk-1", "doc-1"),
            ],
            &[
                relationship("Alice", "Bob", "ok", "doc-1"),
                relationship("", "Bob", "missing endpoint", "doc-1"),
            ],
            &CancelToken::new(),
        )
        .unwrap();

    assert_eq!(summary.entities_merged, 1);
    assert_eq!(summary.entities_skipped, 1);
    assert_eq!(summary.relationships_merged, 1);
    assert_eq!(summary.relationships_skipped, 1);
}

#[test]
fn test_text_unit_budget_truncates_sources() {
    let fixture = Fixture::new();
    for i in 0..5 {
        fixture
            .store
            .upsert_text_unit(TextUnit {
                id: format!("chunk-{i}"),
                content: "x".repeat(400), // 100 estimated tokens each
                document_id: "doc-1".to_string(),
            })
            .unwrap();
    }
    let source_id = (0..5).map(|i| format!("chunk-{i}")).collect::<Vec<_>>().join("<SEP>");
    fixture
        .merge
        .merge_and_upsert_entity(&ExtractedEntity {
            entity_name: "Alice".to_string(),
            entity_type: "person".to_string(),
            description: "a researcher".to_string(),
            source_id,
            document_id: "doc-1".to_string(),
        })
        .unwrap();

    let engine = fixture.query_engine(&[], &["alice"]);
    let params = QueryParams { max_token_for_text_unit: 250, ..QueryParams::default() };
    let context = engine
        .build_query_context("alice", &params, &CancelToken::new())
        .unwrap();

    // 2 units of 100 tokens fit a 250-token budget; the third overflows.
    let rows = context.text_units.lines().count() - 1; // minus header
    assert_eq!(rows, 2);
}

#[test]
fn test_oversized_descriptions_are_summarized() {
    let fixture = Fixture::new();
    // Two merges whose union clears the 500-token threshold (2000+ chars).
    fixture
        .merge
        .merge_and_upsert_entity(&entity("Alice", &"a".repeat(1200), "chunk-1", "doc-1"))
        .unwrap();
    fixture
        .merge
        .merge_and_upsert_entity(&entity("Alice", &"b".repeat(1200), "chunk-2", "doc-1"))
        .unwrap();

    let stored = fixture.store.get_entity("ALICE", Some("doc-1")).unwrap().unwrap();
    assert_eq!(stored.description, "synthesized summary");
}

#[test]
fn test_cancelled_ingest_stops_early() {
    let fixture = Fixture::new();
    let cancel = CancelToken::new();
    cancel.cancel();
    let result = fixture.merge.ingest(
        &[entity("Alice", "a researcher", "chunk-1", "doc-1")],
        &[],
        &cancel,
    );
    assert!(result.is_err());
    assert_eq!(fixture.store.entity_count(), 0);
}
