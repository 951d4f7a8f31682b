//! Embedding Worker (§4.5): produce and store a vector for one textual
//! entity.

use super::Stores;
use anyhow::{Context, Result};
use mnemosyne_common::entities::ConceptStatus;
use mnemosyne_common::events::EmbeddingJob;

const LOW_CONTEXT_THRESHOLD: usize = 50;
const NEAR_TRUNCATION_THRESHOLD: usize = 8000;
const CRITICAL_THRESHOLD: usize = 15000;

pub async fn process(stores: &Stores, job: EmbeddingJob) {
    if let Err(e) = run(stores, &job).await {
        tracing::error!(
            entity_id = %job.entity_id,
            entity_type = ?job.entity_type,
            error = %e,
            "embedding job failed"
        );
    }
}

async fn run(stores: &Stores, job: &EmbeddingJob) -> Result<()> {
    let len = job.text_content.len();
    if len < LOW_CONTEXT_THRESHOLD {
        tracing::warn!(entity_id = %job.entity_id, len, "embedding text is low-context");
    } else if len > CRITICAL_THRESHOLD {
        tracing::warn!(entity_id = %job.entity_id, len, "embedding text is critically long, proceeding anyway");
    } else if len > NEAR_TRUNCATION_THRESHOLD {
        tracing::warn!(entity_id = %job.entity_id, len, "embedding text is near the truncation limit");
    }

    let vector = stores
        .llm
        .embed(&job.text_content)
        .await
        .context("embedding capability call failed")?;

    let status = current_status(stores, job).await.unwrap_or_else(|| "active".to_string());

    stores
        .vector
        .upsert(job.entity_id, &job.user_id, job.entity_type, &vector, &status)
        .await
        .context("vector store upsert failed")?;
    Ok(())
}

/// Mirror the relational concept status (§4.5 contract). Other entity
/// kinds are immutable once created, so they stay `active`.
async fn current_status(stores: &Stores, job: &EmbeddingJob) -> Option<String> {
    if job.entity_type != mnemosyne_common::entities::EntityKind::Concept {
        return None;
    }
    let concept: mnemosyne_common::entities::Concept = stores
        .relational
        .get("concept", &job.user_id, &job.entity_id.to_string())
        .ok()??;
    Some(
        match concept.status {
            ConceptStatus::Active => "active",
            ConceptStatus::Merged => "merged",
            ConceptStatus::Archived => "archived",
        }
        .to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_thresholds_are_ordered() {
        assert!(LOW_CONTEXT_THRESHOLD < NEAR_TRUNCATION_THRESHOLD);
        assert!(NEAR_TRUNCATION_THRESHOLD < CRITICAL_THRESHOLD);
    }
}
