//! Semantic similarity capability (§6.3) and the `entity_mappings` table
//! construction it feeds into (§4.1 step 4). Answered from the vector
//! store directly — no LLM call beyond the embedding already computed for
//! the candidate's name/content, since cosine-nearest-neighbor search is
//! all the capability needs.

use crate::llm::LlmClient;
use crate::storage::VectorStore;
use mnemosyne_common::entities::EntityKind;
use mnemosyne_common::error::LlmError;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy)]
pub struct SimilarityMatch {
    pub entity_id: Uuid,
    pub similarity_score: f32,
}

/// Find the best existing match for `candidate_text` among the same
/// user's entities of `kind`, above `threshold`. Returns `None` below
/// threshold — the caller then creates a new entity (§4.1 step 4).
pub async fn find_best_match(
    vector_store: &VectorStore,
    llm: &dyn LlmClient,
    user_id: &str,
    candidate_text: &str,
    kind: EntityKind,
    threshold: f32,
) -> Result<Option<SimilarityMatch>, LlmError> {
    let embedding = llm.embed(candidate_text).await?;
    let entity_type_str = serde_json::to_value(kind)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default();
    let escaped_user = user_id.replace('\'', "''");
    let filter = format!("user_id = '{escaped_user}' AND entity_type = '{entity_type_str}' AND status = 'active'");

    let results = vector_store
        .search(&embedding, 1, Some(filter))
        .await
        .map_err(LlmError::Deterministic)?;

    Ok(results
        .into_iter()
        .next()
        .filter(|(_, score)| *score > threshold)
        .map(|(entity_id, similarity_score)| SimilarityMatch {
            entity_id,
            similarity_score,
        }))
}

/// `entity_mappings`: candidate name (or existing UUID string) → resolved
/// `entity_id`, built incrementally as candidates are resolved to either
/// an existing match or a freshly minted placeholder id (§4.1 step 4).
#[derive(Debug, Default)]
pub struct EntityMappings {
    map: HashMap<String, Uuid>,
}

impl EntityMappings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve `candidate_name`: if it's already a known UUID, use it
    /// as-is; otherwise reuse `existing` if given, or mint and remember a
    /// fresh placeholder id for a new entity.
    pub fn resolve(&mut self, candidate_name: &str, existing: Option<Uuid>) -> Uuid {
        if let Ok(id) = Uuid::parse_str(candidate_name) {
            return id;
        }
        if let Some(id) = self.map.get(candidate_name) {
            return *id;
        }
        let id = existing.unwrap_or_else(Uuid::new_v4);
        self.map.insert(candidate_name.to_string(), id);
        id
    }

    pub fn get(&self, candidate_name: &str) -> Option<Uuid> {
        if let Ok(id) = Uuid::parse_str(candidate_name) {
            return Some(id);
        }
        self.map.get(candidate_name).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_reuses_an_existing_match() {
        let mut mappings = EntityMappings::new();
        let existing = Uuid::new_v4();
        let resolved = mappings.resolve("Rust ownership", Some(existing));
        assert_eq!(resolved, existing);
        assert_eq!(mappings.get("Rust ownership"), Some(existing));
    }

    #[test]
    fn resolve_is_stable_across_repeated_calls_for_a_new_entity() {
        let mut mappings = EntityMappings::new();
        let first = mappings.resolve("Brand new concept", None);
        let second = mappings.resolve("Brand new concept", None);
        assert_eq!(first, second);
    }

    #[test]
    fn resolve_passes_through_uuid_looking_candidates() {
        let mut mappings = EntityMappings::new();
        let id = Uuid::new_v4();
        let resolved = mappings.resolve(&id.to_string(), None);
        assert_eq!(resolved, id);
    }
}
