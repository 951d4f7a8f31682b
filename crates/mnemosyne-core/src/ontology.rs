//! Concept merge/archive mutations (§4.2 step 4a/4b), kept consistent
//! across the relational, vector, and graph stores (§3.2 invariants 3
//! "concept status monotonicity" and 4 "merge consistency"). Per-entity
//! locking via a `DashMap<Uuid, Arc<Mutex<()>>>` (§9.1 supplement) so two
//! concurrent Insight Worker runs for the same user never interleave a
//! merge's three store writes.

use crate::llm::{ConceptArchive, ConceptMerge};
use crate::storage::{GraphStore, RelationalStore, VectorStore};
use anyhow::{Context, Result};
use chrono::Utc;
use dashmap::DashMap;
use mnemosyne_common::entities::{Concept, ConceptStatus};
use std::sync::{Arc, OnceLock};
use tokio::sync::Mutex;
use uuid::Uuid;

const NAMESPACE: &str = "concept";

fn locks() -> &'static DashMap<Uuid, Arc<Mutex<()>>> {
    static LOCKS: OnceLock<DashMap<Uuid, Arc<Mutex<()>>>> = OnceLock::new();
    LOCKS.get_or_init(DashMap::new)
}

async fn lock_for(entity_id: Uuid) -> tokio::sync::OwnedMutexGuard<()> {
    let mutex = locks().entry(entity_id).or_insert_with(|| Arc::new(Mutex::new(()))).clone();
    mutex.lock_owned().await
}

/// Apply one `concepts_to_merge` entry (§4.2 step 4a): rename/redescribe
/// the primary, mark secondaries `merged` everywhere, redirect their
/// incident edges onto the primary, then detach-delete the secondaries
/// from the graph.
pub async fn apply_merge(
    relational: &RelationalStore,
    vector: &VectorStore,
    graph: &GraphStore,
    user_id: &str,
    merge: &ConceptMerge,
) -> Result<()> {
    let primary_id = Uuid::parse_str(&merge.primary_concept_id).context("primary_concept_id")?;
    let _primary_guard = lock_for(primary_id).await;

    let mut primary: Concept = relational
        .get(NAMESPACE, user_id, &merge.primary_concept_id)?
        .context("primary concept missing from relational store")?;
    primary.title = merge.new_concept_name.clone();
    primary.content = merge.new_concept_description.clone();
    primary.updated_at = Utc::now();
    relational.put(NAMESPACE, user_id, &merge.primary_concept_id, &primary)?;

    if let Some(mut node) = graph.get_node(user_id, primary_id).await? {
        node.title = primary.title.clone();
        node.content = primary.content.clone();
        node.updated_at = primary.updated_at;
        graph.replace_node(primary_id, user_id, node).await?;
    }

    for secondary in &merge.secondary_concept_ids {
        let secondary_id = Uuid::parse_str(secondary).context("secondary_concept_id")?;
        let _secondary_guard = lock_for(secondary_id).await;

        if let Some(mut concept) = relational.get::<Concept>(NAMESPACE, user_id, secondary)? {
            concept.status = ConceptStatus::Merged;
            concept.merged_into_concept_id = Some(primary_id);
            concept.updated_at = Utc::now();
            relational.put(NAMESPACE, user_id, secondary, &concept)?;
        }
        vector.set_status(secondary_id, "merged").await?;

        graph.redirect_edges(user_id, secondary_id, primary_id).await?;
        graph.delete_node_row(secondary_id, user_id).await?;
    }

    Ok(())
}

/// Apply one `concepts_to_archive` entry (§4.2 step 4b).
pub async fn apply_archive(
    relational: &RelationalStore,
    vector: &VectorStore,
    graph: &GraphStore,
    user_id: &str,
    archive: &ConceptArchive,
) -> Result<()> {
    let concept_id = Uuid::parse_str(&archive.concept_id).context("concept_id")?;
    let _guard = lock_for(concept_id).await;

    if let Some(mut concept) = relational.get::<Concept>(NAMESPACE, user_id, &archive.concept_id)? {
        concept.status = ConceptStatus::Archived;
        concept.updated_at = Utc::now();
        relational.put(NAMESPACE, user_id, &archive.concept_id, &concept)?;
    }
    vector.set_status(concept_id, "archived").await?;

    if let Some(mut node) = graph.get_node(user_id, concept_id).await? {
        node.status = "archived".to_string();
        node.updated_at = Utc::now();
        node.properties["archive_rationale"] = serde_json::Value::String(archive.archive_rationale.clone());
        if let Some(replacement) = &archive.replacement_concept_id {
            node.properties["replacement_concept_id"] = serde_json::Value::String(replacement.clone());
        }
        graph.replace_node(concept_id, user_id, node).await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lock_for_same_entity_can_be_reacquired_after_release() {
        let id = Uuid::new_v4();
        let guard1 = lock_for(id).await;
        drop(guard1);
        // Would deadlock if the first guard weren't released before this.
        let _guard2 = tokio::time::timeout(std::time::Duration::from_secs(1), lock_for(id))
            .await
            .expect("re-acquiring the per-entity lock must not block");
    }
}
