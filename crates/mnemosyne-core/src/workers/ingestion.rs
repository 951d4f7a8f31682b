//! Ingestion Worker (§4.1): turn one finished conversation into graph-
//! structured knowledge exactly once.

use super::Stores;
use crate::coherence;
use crate::dedup::{self, EntityMappings};
use crate::storage::GraphNode;
use anyhow::{Context, Result};
use chrono::Utc;
use mnemosyne_common::entities::{
    Concept, ConceptStatus, Conversation, ConversationStatus, EntityKind, GrowthEvent, MemoryUnit,
    Relationship, User, GROWTH_DIMENSION_KEYS,
};
use mnemosyne_common::events::queue;
use mnemosyne_common::events::{EmbeddingJob, EntitiesCreatedEvent, EntityRef, IngestionJob};
use uuid::Uuid;

const CONVERSATION_NS: &str = "conversation";
const USER_NS: &str = "user";

pub async fn process(stores: &Stores, job: IngestionJob) {
    if let Err(e) = run(stores, &job).await {
        tracing::error!(
            conversation_id = %job.conversation_id,
            user_id = %job.user_id,
            error = %e,
            "ingestion job failed"
        );
        if let Err(mark_err) = mark_failed(stores, &job, &e.to_string()).await {
            tracing::error!(error = %mark_err, "failed to mark conversation failed");
        }
    }
}

async fn mark_failed(stores: &Stores, job: &IngestionJob, message: &str) -> Result<()> {
    let existing: Option<Conversation> =
        stores
            .relational
            .get(CONVERSATION_NS, &job.user_id, &job.conversation_id.to_string())?;
    let Some(mut conversation) = existing else {
        return Ok(());
    };
    conversation.status = ConversationStatus::Failed;
    conversation.content = message.to_string();
    conversation.updated_at = Utc::now();
    stores
        .relational
        .put(CONVERSATION_NS, &job.user_id, &job.conversation_id.to_string(), &conversation)
}

async fn run(stores: &Stores, job: &IngestionJob) -> Result<()> {
    // Step 1: gather context.
    let conversation: Option<Conversation> =
        stores
            .relational
            .get(CONVERSATION_NS, &job.user_id, &job.conversation_id.to_string())?;
    let Some(mut conversation) = conversation else {
        tracing::debug!(conversation_id = %job.conversation_id, "ingestion job for missing conversation, skipping");
        return Ok(());
    };
    if conversation.status == ConversationStatus::Processed {
        tracing::debug!(conversation_id = %job.conversation_id, "conversation already processed, no-op");
        return Ok(());
    }

    let user: Option<User> = stores.relational.get(USER_NS, &job.user_id, &job.user_id)?;
    let (user_name, memory_profile) = user
        .map(|u| (u.display_name, u.memory_profile))
        .unwrap_or_else(|| ("friend".to_string(), String::new()));

    // Step 2: synthesize.
    let synthesis = stores
        .llm
        .synthesize_holistic(crate::llm::HolisticSynthesisInput {
            user_id: &job.user_id,
            user_name: &user_name,
            full_conversation_transcript: &conversation.content,
            user_memory_profile: &memory_profile,
        })
        .await
        .context("holistic synthesis failed")?;
    let payload = synthesis.persistence_payload;

    // Step 3: importance gate.
    let threshold = stores.config.thresholds.ingestion_min_importance_threshold;
    if payload.conversation_importance_score < threshold {
        conversation.title = payload.conversation_title;
        conversation.content = payload.conversation_summary;
        conversation.importance_score = payload.conversation_importance_score;
        conversation.status = ConversationStatus::Processed;
        conversation.proactive_greeting = synthesis
            .forward_looking_context
            .get("proactive_greeting")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        conversation.forward_looking_context = Some(synthesis.forward_looking_context);
        conversation.updated_at = Utc::now();
        stores.relational.put(
            CONVERSATION_NS,
            &job.user_id,
            &job.conversation_id.to_string(),
            &conversation,
        )?;
        return Ok(());
    }

    // Step 4: semantic deduplication.
    let mut mappings = EntityMappings::new();
    let mut new_memory_units: Vec<MemoryUnit> = Vec::new();
    let mut new_concepts: Vec<Concept> = Vec::new();
    let now = Utc::now();

    for candidate in &payload.extracted_memory_units {
        let embedding_text = format!("{}\n{}", candidate.title, candidate.content);
        let existing = dedup::find_best_match(
            &stores.vector,
            stores.llm.as_ref(),
            &job.user_id,
            &embedding_text,
            EntityKind::MemoryUnit,
            stores.config.thresholds.semantic_similarity_reuse_threshold,
        )
        .await;
        match existing {
            Ok(Some(m)) => {
                reuse_memory_unit(stores, &job.user_id, m.entity_id, &candidate.content).await?;
                mappings.resolve(&candidate.title, Some(m.entity_id));
            }
            _ => {
                let entity_id = mappings.resolve(&candidate.title, None);
                new_memory_units.push(MemoryUnit {
                    entity_id,
                    user_id: job.user_id.clone(),
                    title: candidate.title.clone(),
                    content: candidate.content.clone(),
                    importance_score: candidate.importance_score.unwrap_or(0.0),
                    sentiment_score: candidate.sentiment_score.unwrap_or(0.0),
                    source_conversation_id: job.conversation_id,
                    source: "Ingestion".to_string(),
                    created_at: now,
                    updated_at: now,
                });
            }
        }
    }

    for candidate in &payload.extracted_concepts {
        let existing = dedup::find_best_match(
            &stores.vector,
            stores.llm.as_ref(),
            &job.user_id,
            &candidate.title,
            EntityKind::Concept,
            stores.config.thresholds.semantic_similarity_reuse_threshold,
        )
        .await;
        match existing {
            Ok(Some(m)) => {
                reuse_concept(stores, &job.user_id, m.entity_id, &candidate.content).await?;
                mappings.resolve(&candidate.title, Some(m.entity_id));
            }
            _ => {
                let entity_id = mappings.resolve(&candidate.title, None);
                new_concepts.push(Concept {
                    entity_id,
                    user_id: job.user_id.clone(),
                    title: candidate.title.clone(),
                    concept_type: candidate.concept_type.clone(),
                    content: candidate.content.clone(),
                    importance_score: candidate.importance_score.unwrap_or(0.0),
                    status: ConceptStatus::Active,
                    merged_into_concept_id: None,
                    community_id: None,
                    source: "Ingestion".to_string(),
                    created_at: now,
                    updated_at: now,
                });
            }
        }
    }

    // Step 5: persist new entities + relationships + growth events.
    let mut newly_created: Vec<EntityRef> = Vec::new();
    let mut embedding_jobs: Vec<EmbeddingJob> = Vec::new();

    for unit in &new_memory_units {
        stores
            .relational
            .put("memory_unit", &job.user_id, &unit.entity_id.to_string(), unit)?;
        stores
            .graph
            .create_node(standard_node(EntityKind::MemoryUnit, unit.entity_id, &job.user_id, &unit.title, &unit.content, unit.importance_score, now))
            .await?;
        newly_created.push(EntityRef {
            id: unit.entity_id,
            entity_type: EntityKind::MemoryUnit,
        });
        embedding_jobs.push(EmbeddingJob {
            entity_id: unit.entity_id,
            entity_type: EntityKind::MemoryUnit,
            text_content: format!("{}\n{}", unit.title, unit.content),
            user_id: job.user_id.clone(),
        });
    }

    for concept in &new_concepts {
        stores
            .relational
            .put("concept", &job.user_id, &concept.entity_id.to_string(), concept)?;
        stores
            .graph
            .create_node(standard_node(
                EntityKind::Concept,
                concept.entity_id,
                &job.user_id,
                &concept.title,
                &concept.content,
                concept.importance_score,
                now,
            ))
            .await?;
        newly_created.push(EntityRef {
            id: concept.entity_id,
            entity_type: EntityKind::Concept,
        });
        embedding_jobs.push(EmbeddingJob {
            entity_id: concept.entity_id,
            entity_type: EntityKind::Concept,
            text_content: concept.title.clone(),
            user_id: job.user_id.clone(),
        });
    }

    for event in &payload.detected_growth_events {
        let entity_id = Uuid::new_v4();
        let growth_event = GrowthEvent {
            entity_id,
            user_id: job.user_id.clone(),
            title: event.title.clone(),
            dimension_key: event.dimension_key.clone(),
            delta_value: event.delta,
            content: event.content.clone(),
            source_memory_unit_ids: event
                .source_memory_unit_ids
                .iter()
                .filter_map(|s| mappings.get(s).or_else(|| Uuid::parse_str(s).ok()))
                .collect(),
            source_concept_ids: event
                .source_concept_ids
                .iter()
                .filter_map(|s| mappings.get(s).or_else(|| Uuid::parse_str(s).ok()))
                .collect(),
            source: "Ingestion".to_string(),
            created_at: now,
        };
        stores
            .relational
            .put("growth_event", &job.user_id, &entity_id.to_string(), &growth_event)?;
        let text_content = format!("{} Growth Event: {}", growth_event.dimension_key, growth_event.content);
        stores
            .graph
            .create_node(standard_node(
                EntityKind::GrowthEvent,
                entity_id,
                &job.user_id,
                &growth_event.title,
                &growth_event.content,
                0.0,
                now,
            ))
            .await?;
        newly_created.push(EntityRef {
            id: entity_id,
            entity_type: EntityKind::GrowthEvent,
        });
        embedding_jobs.push(EmbeddingJob {
            entity_id,
            entity_type: EntityKind::GrowthEvent,
            text_content,
            user_id: job.user_id.clone(),
        });
    }

    for rel in &payload.new_relationships {
        let Some(source_id) =
            resolve_endpoint(stores, &job.user_id, &rel.source_entity_id_or_name, &mut mappings, now).await?
        else {
            continue;
        };
        let Some(target_id) =
            resolve_endpoint(stores, &job.user_id, &rel.target_entity_id_or_name, &mut mappings, now).await?
        else {
            continue;
        };

        coherence::check(&rel.relationship_type, &rel.relationship_description);

        let relationship = Relationship {
            relationship_id: Uuid::new_v4(),
            relationship_type: rel.relationship_type.clone(),
            source_entity_id: source_id,
            target_entity_id: target_id,
            user_id: job.user_id.clone(),
            strength: rel.strength.unwrap_or(0.5),
            description: rel.relationship_description.clone(),
            source_agent: "Ingestion".to_string(),
            created_at: now,
        };
        stores.graph.create_relationship(relationship.into()).await?;
    }
    stores.graph.flush().await?;

    // Step 6: conversation finalize.
    conversation.title = payload.conversation_title;
    conversation.content = payload.conversation_summary;
    conversation.importance_score = payload.conversation_importance_score;
    conversation.status = ConversationStatus::Processed;
    conversation.proactive_greeting = synthesis
        .forward_looking_context
        .get("proactive_greeting")
        .and_then(|v| v.as_str())
        .map(str::to_string);
    conversation.forward_looking_context = Some(synthesis.forward_looking_context);
    conversation.updated_at = now;
    stores.relational.put(
        CONVERSATION_NS,
        &job.user_id,
        &job.conversation_id.to_string(),
        &conversation,
    )?;

    // Step 7: fan out.
    for job_payload in embedding_jobs {
        if let Err(e) = crate::broker::JobBroker::enqueue(&stores.broker, queue::EMBEDDING, &job_payload).await {
            tracing::warn!(error = %e, "failed to enqueue embedding job, continuing");
        }
    }
    if !newly_created.is_empty() {
        let event = EntitiesCreatedEvent::new_entities_created(job.user_id.clone(), newly_created);
        if let Err(e) = crate::broker::JobBroker::enqueue(&stores.broker, queue::CARD, &event).await {
            tracing::warn!(error = %e, "failed to enqueue card event, continuing");
        }
        if let Err(e) = crate::broker::JobBroker::enqueue(&stores.broker, queue::GRAPH, &event).await {
            tracing::warn!(error = %e, "failed to enqueue graph event, continuing");
        }
    }

    Ok(())
}

/// Resolve one relationship endpoint (§4.1 step 5): a UUID is used as-is,
/// a reserved growth-dimension key is skipped (no pseudo-node, per the
/// recorded Open Question decision), a mapped candidate name resolves
/// through `entity_mappings`, and anything else gets a fallback
/// `auto_generated` concept.
async fn resolve_endpoint(
    stores: &Stores,
    user_id: &str,
    name_or_id: &str,
    mappings: &mut EntityMappings,
    now: chrono::DateTime<Utc>,
) -> Result<Option<Uuid>> {
    if let Ok(id) = Uuid::parse_str(name_or_id) {
        return Ok(Some(id));
    }
    if GROWTH_DIMENSION_KEYS.contains(&name_or_id) {
        return Ok(None);
    }
    if let Some(id) = mappings.get(name_or_id) {
        return Ok(Some(id));
    }

    let entity_id = mappings.resolve(name_or_id, None);
    let concept = Concept {
        entity_id,
        user_id: user_id.to_string(),
        title: name_or_id.to_string(),
        concept_type: "auto_generated".to_string(),
        content: String::new(),
        importance_score: 0.0,
        status: ConceptStatus::Active,
        merged_into_concept_id: None,
        community_id: None,
        source: "Ingestion".to_string(),
        created_at: now,
        updated_at: now,
    };
    stores
        .relational
        .put("concept", user_id, &entity_id.to_string(), &concept)?;
    stores
        .graph
        .create_node(standard_node(
            EntityKind::Concept,
            entity_id,
            user_id,
            &concept.title,
            &concept.content,
            0.0,
            now,
        ))
        .await?;
    Ok(Some(entity_id))
}

async fn reuse_memory_unit(stores: &Stores, user_id: &str, entity_id: Uuid, new_content: &str) -> Result<()> {
    let Some(mut unit) = stores.relational.get::<MemoryUnit>("memory_unit", user_id, &entity_id.to_string())? else {
        return Ok(());
    };
    let date_tag = Utc::now().format("%Y-%m-%d");
    unit.content = format!("{}\n[{}] {}", unit.content, date_tag, new_content);
    unit.updated_at = Utc::now();
    stores
        .relational
        .put("memory_unit", user_id, &entity_id.to_string(), &unit)?;
    if let Some(mut node) = stores.graph.get_node(user_id, entity_id).await? {
        node.content = unit.content.clone();
        node.updated_at = unit.updated_at;
        stores.graph.replace_node(entity_id, user_id, node).await?;
    }
    Ok(())
}

async fn reuse_concept(stores: &Stores, user_id: &str, entity_id: Uuid, new_content: &str) -> Result<()> {
    let Some(mut concept) = stores.relational.get::<Concept>("concept", user_id, &entity_id.to_string())? else {
        return Ok(());
    };
    let date_tag = Utc::now().format("%Y-%m-%d");
    concept.content = format!("{}\n[{}] {}", concept.content, date_tag, new_content);
    concept.updated_at = Utc::now();
    stores
        .relational
        .put("concept", user_id, &entity_id.to_string(), &concept)?;
    if let Some(mut node) = stores.graph.get_node(user_id, entity_id).await? {
        node.content = concept.content.clone();
        node.updated_at = concept.updated_at;
        stores.graph.replace_node(entity_id, user_id, node).await?;
    }
    Ok(())
}

fn standard_node(
    kind: EntityKind,
    entity_id: Uuid,
    user_id: &str,
    title: &str,
    content: &str,
    importance_score: f32,
    now: chrono::DateTime<Utc>,
) -> GraphNode {
    GraphNode {
        entity_id,
        user_id: user_id.to_string(),
        entity_type: kind,
        title: title.to_string(),
        content: content.to_string(),
        importance_score,
        status: "active".to_string(),
        source: "Ingestion".to_string(),
        merged_into_concept_id: None,
        community_id: None,
        properties: serde_json::json!({}),
        created_at: now,
        updated_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn growth_dimension_keys_are_recognized() {
        assert!(GROWTH_DIMENSION_KEYS.contains(&"act_self"));
        assert!(!GROWTH_DIMENSION_KEYS.contains(&"some concept name"));
    }
}
