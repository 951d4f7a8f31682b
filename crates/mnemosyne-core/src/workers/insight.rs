//! Insight Worker (§4.2): periodically elevate a user's accumulated graph
//! into strategic artifacts and consolidate its ontology.

use super::Stores;
use crate::llm::StrategicSynthesisInput;
use crate::ontology;
use crate::storage::GraphNode;
use anyhow::{Context, Result};
use chrono::{Duration as ChronoDuration, Utc};
use mnemosyne_common::entities::{
    Community, ConceptStatus, CycleStatus, DerivedArtifact, EntityKind, ProactivePrompt,
    ProactivePromptMetadata, Relationship, TextualEntity, User, UserCycle,
};
use mnemosyne_common::events::queue;
use mnemosyne_common::events::{EmbeddingJob, EntitiesCreatedEvent, EntityRef, InsightJob};
use uuid::Uuid;

const USER_NS: &str = "user";
const CYCLE_NS: &str = "user_cycle";
const CONCEPT_NS: &str = "concept";
const MEMORY_UNIT_NS: &str = "memory_unit";
const CONVERSATION_NS: &str = "conversation";

pub async fn process(stores: &Stores, job: InsightJob) {
    if let Err(e) = run(stores, &job).await {
        tracing::error!(user_id = %job.user_id, error = %e, "insight job failed");
    }
}

async fn run(stores: &Stores, job: &InsightJob) -> Result<()> {
    let start = std::time::Instant::now();

    // Step 1: open cycle.
    let cycle_id = Uuid::new_v4();
    let now = Utc::now();
    let window_days = stores.config.thresholds.insight_cycle_duration_days;
    let cycle_start_date = now - ChronoDuration::days(window_days);
    let mut cycle = UserCycle {
        cycle_id,
        user_id: job.user_id.clone(),
        status: CycleStatus::Running,
        cycle_start_date,
        cycle_end_date: now,
        artifacts_created: 0,
        prompts_created: 0,
        concepts_merged: 0,
        relationships_created: 0,
        processing_duration_ms: 0,
        error_count: 0,
        dashboard_ready: false,
    };
    stores
        .relational
        .put(CYCLE_NS, &job.user_id, &cycle_id.to_string(), &cycle)?;

    match run_cycle(stores, job, cycle_start_date, now, &mut cycle).await {
        Ok(()) => {
            cycle.status = CycleStatus::Completed;
        }
        Err(e) => {
            cycle.status = CycleStatus::Failed;
            cycle.error_count += 1;
            tracing::error!(user_id = %job.user_id, error = %e, "insight cycle synthesis failed");
        }
    }

    // Step 8: close cycle.
    cycle.processing_duration_ms = start.elapsed().as_millis() as u64;
    cycle.dashboard_ready = cycle.status == CycleStatus::Completed;
    stores
        .relational
        .put(CYCLE_NS, &job.user_id, &cycle_id.to_string(), &cycle)?;

    Ok(())
}

async fn run_cycle(
    stores: &Stores,
    job: &InsightJob,
    cycle_start_date: chrono::DateTime<Utc>,
    now: chrono::DateTime<Utc>,
    cycle: &mut UserCycle,
) -> Result<()> {
    // Step 2: compile context.
    let user: User = stores
        .relational
        .get(USER_NS, &job.user_id, &job.user_id)?
        .context("user row missing")?;

    let active_concepts: Vec<mnemosyne_common::entities::Concept> = stores
        .relational
        .list(CONCEPT_NS, &job.user_id)?
        .into_iter()
        .filter(|c: &mnemosyne_common::entities::Concept| c.status == ConceptStatus::Active)
        .collect();

    let memory_units: Vec<mnemosyne_common::entities::MemoryUnit> = stores
        .relational
        .list(MEMORY_UNIT_NS, &job.user_id)?
        .into_iter()
        .filter(|m: &mnemosyne_common::entities::MemoryUnit| m.created_at >= cycle_start_date)
        .collect();

    let conversation_summaries: Vec<String> = stores
        .relational
        .list::<mnemosyne_common::entities::Conversation>(CONVERSATION_NS, &job.user_id)?
        .into_iter()
        .filter(|c| c.updated_at >= cycle_start_date)
        .map(|c| c.content)
        .collect();

    let mut growth_events: Vec<mnemosyne_common::entities::GrowthEvent> =
        stores.relational.list("growth_event", &job.user_id)?;
    growth_events.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    growth_events.truncate(20);

    let concepts_needing_synthesis: Vec<&mnemosyne_common::entities::Concept> = active_concepts
        .iter()
        .filter(|c| c.updated_at >= cycle_start_date)
        .collect();

    let context = serde_json::json!({
        "conversation_summaries": conversation_summaries,
        "active_concepts": active_concepts,
        "memory_units": memory_units,
        "conceptsNeedingSynthesis": concepts_needing_synthesis,
    });

    // Step 3: synthesize.
    let synthesis = stores
        .llm
        .synthesize_strategic(StrategicSynthesisInput {
            user_id: &job.user_id,
            user_name: &user.display_name,
            cycle_id: &cycle.cycle_id.to_string(),
            cycle_start_date: cycle_start_date.to_rfc3339(),
            cycle_end_date: now.to_rfc3339(),
            current_knowledge_graph: context,
            recent_growth_events: serde_json::to_value(&growth_events).unwrap_or_default(),
            user_profile: &user.memory_profile,
        })
        .await
        .context("strategic synthesis failed")?;

    let optimizations = synthesis.ontology_optimizations;

    // Step 4a: merges.
    for merge in &optimizations.concepts_to_merge {
        match ontology::apply_merge(&stores.relational, &stores.vector, &stores.graph, &job.user_id, merge).await {
            Ok(()) => cycle.concepts_merged += 1,
            Err(e) => {
                cycle.error_count += 1;
                tracing::warn!(error = %e, "concept merge failed, continuing");
            }
        }
    }

    // Step 4b: archives.
    for archive in &optimizations.concepts_to_archive {
        if let Err(e) =
            ontology::apply_archive(&stores.relational, &stores.vector, &stores.graph, &job.user_id, archive).await
        {
            cycle.error_count += 1;
            tracing::warn!(error = %e, "concept archive failed, continuing");
        }
    }

    // Step 4c: communities.
    let mut new_entities: Vec<EntityRef> = Vec::new();
    let mut content_entities: Vec<EntityRef> = Vec::new();
    let mut embedding_jobs: Vec<EmbeddingJob> = Vec::new();

    for community_spec in &optimizations.community_structures {
        if let Err(e) = apply_community(stores, job, community_spec, now, &mut new_entities, &mut content_entities, &mut embedding_jobs).await {
            cycle.error_count += 1;
            tracing::warn!(error = %e, "community creation failed, continuing");
        }
    }

    // Step 4d: strategic relationships.
    for rel in &optimizations.new_strategic_relationships {
        if let Err(e) = apply_strategic_relationship(stores, job, rel, now).await {
            cycle.error_count += 1;
            tracing::warn!(error = %e, "strategic relationship creation failed, continuing");
        } else {
            cycle.relationships_created += 1;
        }
    }

    // Step 4e: description synthesis.
    for synthesis_item in &optimizations.concept_description_synthesis {
        if synthesis_item.synthesized_description.len() < 3 {
            continue;
        }
        if let Err(e) = apply_description_synthesis(stores, job, synthesis_item, now).await {
            cycle.error_count += 1;
            tracing::warn!(error = %e, "concept description synthesis failed, continuing");
        }
    }

    // Step 5: content entities (derived artifacts + proactive prompts).
    for artifact_spec in &synthesis.derived_artifacts {
        match apply_derived_artifact(stores, job, cycle.cycle_id, artifact_spec, now).await {
            Ok(entity_ref) => {
                cycle.artifacts_created += 1;
                new_entities.push(entity_ref);
                content_entities.push(entity_ref);
                embedding_jobs.push(EmbeddingJob {
                    entity_id: entity_ref.id,
                    entity_type: EntityKind::DerivedArtifact,
                    text_content: format!("{}\n{}", artifact_spec.title, artifact_spec.content),
                    user_id: job.user_id.clone(),
                });
            }
            Err(e) => {
                cycle.error_count += 1;
                tracing::warn!(error = %e, "derived artifact persistence failed, continuing");
            }
        }
    }

    let mut next_conversation_starters = Vec::new();
    for prompt_spec in &synthesis.proactive_prompts {
        match apply_proactive_prompt(stores, job, cycle.cycle_id, prompt_spec, now).await {
            Ok(entity_ref) => {
                cycle.prompts_created += 1;
                new_entities.push(entity_ref);
                content_entities.push(entity_ref);
                embedding_jobs.push(EmbeddingJob {
                    entity_id: entity_ref.id,
                    entity_type: EntityKind::ProactivePrompt,
                    text_content: prompt_spec.prompt_text.clone(),
                    user_id: job.user_id.clone(),
                });
                if prompt_spec.timing_suggestion == "next_conversation" {
                    next_conversation_starters.push(prompt_spec.prompt_text.clone());
                }
            }
            Err(e) => {
                cycle.error_count += 1;
                tracing::warn!(error = %e, "proactive prompt persistence failed, continuing");
            }
        }
    }

    // Merge-primary representatives also get re-embedded (step 7).
    for merge in &optimizations.concepts_to_merge {
        if let Ok(primary_id) = Uuid::parse_str(&merge.primary_concept_id) {
            embedding_jobs.push(EmbeddingJob {
                entity_id: primary_id,
                entity_type: EntityKind::Concept,
                text_content: merge.new_concept_name.clone(),
                user_id: job.user_id.clone(),
            });
        }
    }

    // Step 6: refresh user state.
    let mut refreshed = user;
    refreshed.memory_profile = format!(
        "{}\n[{}] cycle summary: {} merges, {} archives, {} artifacts, {} prompts.",
        refreshed.memory_profile,
        now.format("%Y-%m-%d"),
        optimizations.concepts_to_merge.len(),
        optimizations.concepts_to_archive.len(),
        cycle.artifacts_created,
        cycle.prompts_created,
    );
    refreshed.next_conversation_context_package = Some(serde_json::json!({
        "conversation_starters": next_conversation_starters,
    }));
    refreshed.updated_at = now;
    stores
        .relational
        .put(USER_NS, &job.user_id, &job.user_id, &refreshed)?;

    stores.graph.flush().await?;

    // Step 7: fan out.
    for job_payload in embedding_jobs {
        if let Err(e) = crate::broker::JobBroker::enqueue(&stores.broker, queue::EMBEDDING, &job_payload).await {
            tracing::warn!(error = %e, "failed to enqueue embedding job, continuing");
        }
    }
    if !content_entities.is_empty() {
        let card_event = EntitiesCreatedEvent::cycle_artifacts_created(job.user_id.clone(), content_entities);
        if let Err(e) = crate::broker::JobBroker::enqueue(&stores.broker, queue::CARD, &card_event).await {
            tracing::warn!(error = %e, "failed to enqueue card event, continuing");
        }
    }
    if !new_entities.is_empty() {
        let graph_event = EntitiesCreatedEvent::cycle_artifacts_created(job.user_id.clone(), new_entities);
        if let Err(e) = crate::broker::JobBroker::enqueue(&stores.broker, queue::GRAPH, &graph_event).await {
            tracing::warn!(error = %e, "failed to enqueue graph event, continuing");
        }
    }

    Ok(())
}

async fn apply_community(
    stores: &Stores,
    job: &InsightJob,
    spec: &crate::llm::CommunityStructure,
    now: chrono::DateTime<Utc>,
    new_entities: &mut Vec<EntityRef>,
    content_entities: &mut Vec<EntityRef>,
    embedding_jobs: &mut Vec<EmbeddingJob>,
) -> Result<()> {
    let entity_id = Uuid::new_v4();
    let member_ids: Vec<Uuid> = spec
        .member_concept_ids
        .iter()
        .filter_map(|s| Uuid::parse_str(s).ok())
        .collect();

    let community = Community {
        entity_id,
        user_id: job.user_id.clone(),
        title: spec.theme.clone(),
        content: format!("{} ({})", spec.theme, spec.strategic_importance),
        member_concept_ids: member_ids.clone(),
        source: "Insight".to_string(),
        created_at: now,
        updated_at: now,
    };
    stores
        .relational
        .put("community", &job.user_id, &entity_id.to_string(), &community)?;
    stores
        .graph
        .create_node(standard_node(
            EntityKind::Community,
            entity_id,
            &job.user_id,
            &community.title,
            &community.content,
            0.0,
            now,
        ))
        .await?;

    for member_id in &member_ids {
        if let Some(mut concept) =
            stores
                .relational
                .get::<mnemosyne_common::entities::Concept>(CONCEPT_NS, &job.user_id, &member_id.to_string())?
        {
            concept.community_id = Some(entity_id);
            concept.updated_at = now;
            stores
                .relational
                .put(CONCEPT_NS, &job.user_id, &member_id.to_string(), &concept)?;
        }
        let relationship = Relationship {
            relationship_id: Uuid::new_v4(),
            relationship_type: "MEMBER_OF".to_string(),
            source_entity_id: *member_id,
            target_entity_id: entity_id,
            user_id: job.user_id.clone(),
            strength: 1.0,
            description: "community membership".to_string(),
            source_agent: "Insight".to_string(),
            created_at: now,
        };
        stores.graph.create_relationship(relationship.into()).await?;
    }

    let entity_ref = EntityRef {
        id: entity_id,
        entity_type: EntityKind::Community,
    };
    new_entities.push(entity_ref);
    content_entities.push(entity_ref);
    embedding_jobs.push(EmbeddingJob {
        entity_id,
        entity_type: EntityKind::Community,
        text_content: community.embedding_text(),
        user_id: job.user_id.clone(),
    });
    Ok(())
}

async fn apply_strategic_relationship(
    stores: &Stores,
    job: &InsightJob,
    spec: &crate::llm::StrategicRelationship,
    now: chrono::DateTime<Utc>,
) -> Result<()> {
    let source_id = Uuid::parse_str(&spec.source_id).context("strategic relationship source_id")?;
    let target_id = Uuid::parse_str(&spec.target_id).context("strategic relationship target_id")?;
    let relationship = Relationship {
        relationship_id: Uuid::new_v4(),
        relationship_type: "STRATEGIC_RELATIONSHIP".to_string(),
        source_entity_id: source_id,
        target_entity_id: target_id,
        user_id: job.user_id.clone(),
        strength: spec.strength,
        description: spec.strategic_value.clone(),
        source_agent: "Insight".to_string(),
        created_at: now,
    };
    stores.graph.create_relationship(relationship.into()).await?;
    Ok(())
}

async fn apply_description_synthesis(
    stores: &Stores,
    job: &InsightJob,
    spec: &crate::llm::ConceptDescriptionSynthesis,
    now: chrono::DateTime<Utc>,
) -> Result<()> {
    let Some(mut concept) = stores
        .relational
        .get::<mnemosyne_common::entities::Concept>(CONCEPT_NS, &job.user_id, &spec.concept_id)?
    else {
        return Ok(());
    };
    concept.content = spec.synthesized_description.clone();
    concept.updated_at = now;
    stores
        .relational
        .put(CONCEPT_NS, &job.user_id, &spec.concept_id, &concept)?;

    let entity_id = Uuid::parse_str(&spec.concept_id)?;
    if let Some(mut node) = stores.graph.get_node(&job.user_id, entity_id).await? {
        node.content = concept.content.clone();
        node.updated_at = now;
        stores.graph.replace_node(entity_id, &job.user_id, node).await?;
    }
    Ok(())
}

async fn apply_derived_artifact(
    stores: &Stores,
    job: &InsightJob,
    cycle_id: Uuid,
    spec: &crate::llm::DerivedArtifactOutput,
    now: chrono::DateTime<Utc>,
) -> Result<EntityRef> {
    let entity_id = Uuid::new_v4();
    let source_concept_ids = parse_uuids(&spec.source_concept_ids);
    let source_memory_unit_ids = parse_uuids(&spec.source_memory_unit_ids);

    let artifact = DerivedArtifact {
        entity_id,
        user_id: job.user_id.clone(),
        cycle_id,
        artifact_type: spec.artifact_type.clone(),
        title: spec.title.clone(),
        content_narrative: spec.content.clone(),
        content_data: spec.content_data.clone(),
        source_concept_ids: source_concept_ids.clone(),
        source_memory_unit_ids: source_memory_unit_ids.clone(),
        source: "Insight".to_string(),
        created_at: now,
        updated_at: now,
    };
    stores
        .relational
        .put("derived_artifact", &job.user_id, &entity_id.to_string(), &artifact)?;
    stores
        .graph
        .create_node(standard_node(
            EntityKind::DerivedArtifact,
            entity_id,
            &job.user_id,
            &artifact.title,
            &artifact.content_narrative,
            spec.confidence_score.unwrap_or(0.0),
            now,
        ))
        .await?;

    create_derived_from_edges(stores, job, entity_id, &source_concept_ids, &source_memory_unit_ids, now).await?;

    Ok(EntityRef {
        id: entity_id,
        entity_type: EntityKind::DerivedArtifact,
    })
}

async fn apply_proactive_prompt(
    stores: &Stores,
    job: &InsightJob,
    cycle_id: Uuid,
    spec: &crate::llm::ProactivePromptOutput,
    now: chrono::DateTime<Utc>,
) -> Result<EntityRef> {
    let entity_id = Uuid::new_v4();

    let prompt = ProactivePrompt {
        entity_id,
        user_id: job.user_id.clone(),
        cycle_id,
        prompt_text: spec.prompt_text.clone(),
        source_agent: "Insight".to_string(),
        metadata: ProactivePromptMetadata {
            prompt_type: spec.prompt_type.clone(),
            timing_suggestion: spec.timing_suggestion.clone(),
            priority_level: spec.priority_level.clone(),
        },
        source: "Insight".to_string(),
        created_at: now,
        updated_at: now,
    };
    stores
        .relational
        .put("proactive_prompt", &job.user_id, &entity_id.to_string(), &prompt)?;
    stores
        .graph
        .create_node(standard_node(
            EntityKind::ProactivePrompt,
            entity_id,
            &job.user_id,
            &spec.title,
            &prompt.prompt_text,
            0.0,
            now,
        ))
        .await?;

    Ok(EntityRef {
        id: entity_id,
        entity_type: EntityKind::ProactivePrompt,
    })
}

async fn create_derived_from_edges(
    stores: &Stores,
    job: &InsightJob,
    artifact_id: Uuid,
    source_concept_ids: &[Uuid],
    source_memory_unit_ids: &[Uuid],
    now: chrono::DateTime<Utc>,
) -> Result<()> {
    for source_id in source_concept_ids.iter().chain(source_memory_unit_ids.iter()) {
        let relationship = Relationship {
            relationship_id: Uuid::new_v4(),
            relationship_type: "DERIVED_FROM".to_string(),
            source_entity_id: artifact_id,
            target_entity_id: *source_id,
            user_id: job.user_id.clone(),
            strength: 1.0,
            description: "derivation source".to_string(),
            source_agent: "Insight".to_string(),
            created_at: now,
        };
        stores.graph.create_relationship(relationship.into()).await?;
    }
    Ok(())
}

fn parse_uuids(values: &[String]) -> Vec<Uuid> {
    values.iter().filter_map(|s| Uuid::parse_str(s).ok()).collect()
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
        source: "Insight".to_string(),
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
    fn parse_uuids_skips_invalid_entries() {
        let id = Uuid::new_v4();
        let parsed = parse_uuids(&[id.to_string(), "not-a-uuid".to_string()]);
        assert_eq!(parsed, vec![id]);
    }
}
