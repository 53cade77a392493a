//! Context Assembly
//!
//! Turns graph matches into the CSV tables and token-budgeted lists that
//! make up a query context. Token counts are estimated as `len / 4`; the
//! estimate only has to be consistent, not exact, because it is applied
//! uniformly on both sides of every budget comparison.

use std::collections::BTreeSet;

use crate::error::Result;
use crate::graph::GraphStore;
use crate::model::split_field;

/// Estimated token count of a text: one token per 4 characters, rounded
/// down (texts under 4 characters estimate to 0).
pub fn estimate_tokens(text: &str) -> usize {
    text.len() / 4
}

/// Keep a prefix of `items` whose summed estimated tokens stays within
/// `max_tokens`. Admission stops at the first item that would overflow;
/// later smaller items are not reconsidered.
pub fn truncate_by_token_size<T, F>(items: Vec<T>, text_of: F, max_tokens: usize) -> Vec<T>
where
    F: Fn(&T) -> &str,
{
    let mut total = 0usize;
    let mut kept = Vec::new();
    for item in items {
        let tokens = estimate_tokens(text_of(&item));
        if total + tokens > max_tokens {
            break;
        }
        total += tokens;
        kept.push(item);
    }
    kept
}

// ── CSV rendering ───────────────────────────────────────────────────────

/// One row of the entity table.
#[derive(Debug, Clone)]
pub struct NodeRow {
    /// Entity name.
    pub entity_name: String,
    /// Entity type label.
    pub entity_type: String,
    /// Merged description.
    pub description: String,
    /// Degree in the undirected graph.
    pub rank: usize,
}

/// One row of the relationship table.
#[derive(Debug, Clone)]
pub struct EdgeRow {
    /// Edge source entity name.
    pub source_name: String,
    /// Edge target entity name.
    pub target_name: String,
    /// Edge description.
    pub description: String,
    /// Edge keywords.
    pub keywords: String,
    /// Accumulated edge weight.
    pub weight: f64,
    /// Sum of endpoint degrees.
    pub rank: usize,
}

/// One row of the sources table.
#[derive(Debug, Clone)]
pub struct TextUnitRow {
    /// Text unit id.
    pub id: String,
    /// Text unit content.
    pub content: String,
}

/// Quote a CSV value when it contains a comma, quote, or newline;
/// embedded quotes are doubled.
fn escape_csv_value(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn rows_to_csv(rows: &[Vec<String>]) -> String {
    let mut out = String::new();
    for row in rows {
        let escaped: Vec<String> = row.iter().map(|v| escape_csv_value(v)).collect();
        out.push_str(&escaped.join(","));
        out.push('\n');
    }
    out
}

/// Render the entity table. An empty input still yields the header row.
pub fn entities_to_csv(rows: &[NodeRow]) -> String {
    let mut table = vec![vec![
        "id".to_string(),
        "entity".to_string(),
        "type".to_string(),
        "description".to_string(),
        "rank".to_string(),
    ]];
    for (i, row) in rows.iter().enumerate() {
        table.push(vec![
            i.to_string(),
            row.entity_name.clone(),
            row.entity_type.clone(),
            row.description.clone(),
            row.rank.to_string(),
        ]);
    }
    rows_to_csv(&table)
}

/// Render path descriptions as a two-column table.
pub fn relations_to_csv(descriptions: &[String]) -> String {
    let mut table = vec![vec!["id".to_string(), "context".to_string()]];
    for (i, description) in descriptions.iter().enumerate() {
        table.push(vec![i.to_string(), description.clone()]);
    }
    rows_to_csv(&table)
}

/// Render the relationship table.
pub fn edges_to_csv(rows: &[EdgeRow]) -> String {
    let mut table = vec![vec![
        "id".to_string(),
        "source".to_string(),
        "target".to_string(),
        "description".to_string(),
        "keywords".to_string(),
        "weight".to_string(),
        "rank".to_string(),
    ]];
    for (i, row) in rows.iter().enumerate() {
        table.push(vec![
            i.to_string(),
            row.source_name.clone(),
            row.target_name.clone(),
            row.description.clone(),
            row.keywords.clone(),
            row.weight.to_string(),
            row.rank.to_string(),
        ]);
    }
    rows_to_csv(&table)
}

/// Render the sources table.
pub fn text_units_to_csv(rows: &[TextUnitRow]) -> String {
    let mut table = vec![vec!["id".to_string(), "content".to_string()]];
    for (i, row) in rows.iter().enumerate() {
        table.push(vec![i.to_string(), row.content.clone()]);
    }
    rows_to_csv(&table)
}

// ── Supporting data gathering ───────────────────────────────────────────

/// Resolve the distinct text units referenced by the entity rows'
/// source-id lists, in first-reference order, truncated to the budget.
/// Dangling references are skipped.
pub fn text_units_for_entities(
    store: &dyn GraphStore,
    rows: &[NodeRow],
    source_ids: &[String],
    max_tokens: usize,
) -> Result<Vec<TextUnitRow>> {
    debug_assert_eq!(rows.len(), source_ids.len());
    let mut seen: BTreeSet<String> = BTreeSet::new();
    let mut units = Vec::new();
    for source_id in source_ids {
        for id in split_field(source_id) {
            if !seen.insert(id.clone()) {
                continue;
            }
            if let Some(unit) = store.get_text_unit(&id)? {
                units.push(TextUnitRow { id: unit.id, content: unit.content });
            }
        }
    }
    Ok(truncate_by_token_size(units, |u| u.content.as_str(), max_tokens))
}

/// Collect the entity rows touched by the edge rows, walking the edge
/// list once and taking each edge's source then its target, first
/// appearance wins, truncated by description budget.
pub fn entities_for_edges(
    store: &dyn GraphStore,
    edges: &[EdgeRow],
    max_tokens: usize,
) -> Result<Vec<NodeRow>> {
    let mut seen: BTreeSet<String> = BTreeSet::new();
    let mut names = Vec::new();
    for edge in edges {
        for name in [&edge.source_name, &edge.target_name] {
            if seen.insert(name.clone()) {
                names.push(name.clone());
            }
        }
    }

    let mut rows = Vec::new();
    for name in names {
        if let Some(entity) = store.get_entity(&name, None)? {
            let rank = store.neighbors(&name)?.len();
            rows.push(NodeRow {
                entity_name: entity.name,
                entity_type: entity.entity_type,
                description: entity.description,
                rank,
            });
        }
    }
    Ok(truncate_by_token_size(rows, |row| row.description.as_str(), max_tokens))
}

/// Resolve text units for edge rows via their endpoint entities'
/// source-id lists, first appearance wins, truncated to the budget.
pub fn text_units_for_edges(
    store: &dyn GraphStore,
    edges: &[EdgeRow],
    max_tokens: usize,
) -> Result<Vec<TextUnitRow>> {
    let mut seen_names: BTreeSet<String> = BTreeSet::new();
    let mut names = Vec::new();
    for edge in edges {
        for name in [&edge.source_name, &edge.target_name] {
            if seen_names.insert(name.clone()) {
                names.push(name.clone());
            }
        }
    }

    let mut seen_ids: BTreeSet<String> = BTreeSet::new();
    let mut units = Vec::new();
    for name in names {
        let Some(entity) = store.get_entity(&name, None)? else { continue };
        for id in split_field(&entity.source_id) {
            if !seen_ids.insert(id.clone()) {
                continue;
            }
            if let Some(unit) = store.get_text_unit(&id)? {
                units.push(TextUnitRow { id: unit.id, content: unit.content });
            }
        }
    }
    Ok(truncate_by_token_size(units, |u| u.content.as_str(), max_tokens))
}
