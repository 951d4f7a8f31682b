//! Entity sum type and per-variant structs for the knowledge graph.
//!
//! The original system dispatched on a stringly-typed `entity.type` field at
//! every call site. Here that dispatch collapses into one sum type
//! (`Entity`) plus a `TextualEntity` trait implemented per variant, so the
//! compiler — not a runtime string match — enforces that every new entity
//! kind gets an embedding-text extractor and a queue-event kind.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Conversation,
    MemoryUnit,
    Concept,
    GrowthEvent,
    DerivedArtifact,
    ProactivePrompt,
    Community,
}

impl EntityKind {
    /// `card_type = lower(type)` per the Card Worker contract.
    pub fn card_type(&self) -> &'static str {
        match self {
            EntityKind::Conversation => "conversation",
            EntityKind::MemoryUnit => "memory_unit",
            EntityKind::Concept => "concept",
            EntityKind::GrowthEvent => "growth_event",
            EntityKind::DerivedArtifact => "derived_artifact",
            EntityKind::ProactivePrompt => "proactive_prompt",
            EntityKind::Community => "community",
        }
    }

    /// Entities eligible for a presentation card (§4.3).
    pub fn is_card_eligible(&self) -> bool {
        matches!(
            self,
            EntityKind::MemoryUnit
                | EntityKind::Concept
                | EntityKind::DerivedArtifact
                | EntityKind::ProactivePrompt
                | EntityKind::Community
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    Active,
    Processed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConceptStatus {
    Active,
    Merged,
    Archived,
}

/// The user row: display identity plus the two rolling context blobs the
/// Ingestion and Insight Workers read and refresh (§4.1 step 1, §4.2 step 6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub user_id: String,
    pub display_name: String,
    pub memory_profile: String,
    pub next_conversation_context_package: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub conversation_id: Uuid,
    pub user_id: String,
    pub title: String,
    pub status: ConversationStatus,
    pub importance_score: f32,
    pub content: String,
    pub proactive_greeting: Option<String>,
    pub forward_looking_context: Option<serde_json::Value>,
    pub start_time: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryUnit {
    pub entity_id: Uuid,
    pub user_id: String,
    pub title: String,
    pub content: String,
    pub importance_score: f32,
    pub sentiment_score: f32,
    pub source_conversation_id: Uuid,
    pub source: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Concept {
    pub entity_id: Uuid,
    pub user_id: String,
    pub title: String,
    /// theme | person | skill | location | emotion | experience | knowledge
    /// | goal | challenge | auto_generated | ...
    pub concept_type: String,
    pub content: String,
    pub importance_score: f32,
    pub status: ConceptStatus,
    pub merged_into_concept_id: Option<Uuid>,
    pub community_id: Option<Uuid>,
    pub source: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrowthEvent {
    pub entity_id: Uuid,
    pub user_id: String,
    pub title: String,
    /// dimension key, e.g. act_self / know_world / act_world / know_self
    pub dimension_key: String,
    pub delta_value: f32,
    pub content: String,
    pub source_memory_unit_ids: Vec<Uuid>,
    pub source_concept_ids: Vec<Uuid>,
    pub source: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DerivedArtifact {
    pub entity_id: Uuid,
    pub user_id: String,
    pub cycle_id: Uuid,
    pub artifact_type: String,
    pub title: String,
    pub content_narrative: String,
    pub content_data: Option<serde_json::Value>,
    pub source_concept_ids: Vec<Uuid>,
    pub source_memory_unit_ids: Vec<Uuid>,
    pub source: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProactivePromptMetadata {
    pub prompt_type: String,
    pub timing_suggestion: String,
    pub priority_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProactivePrompt {
    pub entity_id: Uuid,
    pub user_id: String,
    pub cycle_id: Uuid,
    pub prompt_text: String,
    pub source_agent: String,
    pub metadata: ProactivePromptMetadata,
    pub source: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Community {
    pub entity_id: Uuid,
    pub user_id: String,
    pub title: String,
    pub content: String,
    pub member_concept_ids: Vec<Uuid>,
    pub source: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Card {
    pub card_id: Uuid,
    pub user_id: String,
    pub source_entity_id: Uuid,
    pub source_entity_type: EntityKind,
    pub card_type: String,
    pub display_data: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectionPosition {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectionNode {
    pub entity_id: Uuid,
    pub entity_type: EntityKind,
    pub position: ProjectionPosition,
    pub properties: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectionEdge {
    pub source: Uuid,
    pub target: Uuid,
    pub relationship_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectionMetadata {
    pub algorithm: String,
    pub node_count: usize,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphProjection {
    pub user_id: String,
    pub nodes: Vec<ProjectionNode>,
    pub edges: Vec<ProjectionEdge>,
    pub metadata: ProjectionMetadata,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleStatus {
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserCycle {
    pub cycle_id: Uuid,
    pub user_id: String,
    pub status: CycleStatus,
    pub cycle_start_date: DateTime<Utc>,
    pub cycle_end_date: DateTime<Utc>,
    pub artifacts_created: u32,
    pub prompts_created: u32,
    pub concepts_merged: u32,
    pub relationships_created: u32,
    pub processing_duration_ms: u64,
    pub error_count: u32,
    pub dashboard_ready: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Relationship {
    pub relationship_id: Uuid,
    /// Emergent label, e.g. INFLUENCES, CAUSES, MEMBER_OF, DERIVED_FROM,
    /// STRATEGIC_RELATIONSHIP, or the RELATED_TO fallback.
    pub relationship_type: String,
    pub source_entity_id: Uuid,
    pub target_entity_id: Uuid,
    pub user_id: String,
    pub strength: f32,
    pub description: String,
    pub source_agent: String,
    pub created_at: DateTime<Utc>,
}

/// The relationship types with a restricted allowed-phrase set for
/// `description` (§4.1 coherence table). Mismatches are logged, never
/// rejected — see `mnemosyne_core::coherence`.
pub const COHERENCE_CHECKED_RELATIONSHIPS: &[&str] = &[
    "INFLUENCES",
    "CAUSES",
    "IS_SIMILAR_TO",
    "INSPIRES",
    "CONTRIBUTES_TO",
    "IS_A_TYPE_OF",
    "IS_PART_OF",
    "PRECEDES",
    "FOLLOWS",
    "ENABLES",
    "PREVENTS",
    "EXEMPLIFIES_TRAIT",
    "SUPPORTS_VALUE",
    "IS_MILESTONE_FOR",
    "IS_METAPHOR_FOR",
    "REPRESENTS_SYMBOLICALLY",
];

pub const RELATED_TO: &str = "RELATED_TO";

/// Reserved growth-dimension keys. A relationship endpoint matching one of
/// these is neither a UUID nor a concept name — it is skipped entirely
/// rather than materialized as a pseudo-node (§9 Open Questions).
pub const GROWTH_DIMENSION_KEYS: &[&str] = &["act_self", "know_world", "act_world", "know_self"];

/// One textual entity, dispatched by variant instead of by a string tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "entity_type")]
pub enum Entity {
    MemoryUnit(MemoryUnit),
    Concept(Concept),
    GrowthEvent(GrowthEvent),
    DerivedArtifact(DerivedArtifact),
    ProactivePrompt(ProactivePrompt),
    Community(Community),
}

/// Behavior every embeddable, graph-persisted entity must provide.
pub trait TextualEntity {
    fn entity_id(&self) -> Uuid;
    fn user_id(&self) -> &str;
    fn kind(&self) -> EntityKind;
    fn created_at(&self) -> DateTime<Utc>;

    /// Text handed to the embedding capability (§4.1 step 7, §4.5).
    fn embedding_text(&self) -> String;
}

impl TextualEntity for MemoryUnit {
    fn entity_id(&self) -> Uuid {
        self.entity_id
    }
    fn user_id(&self) -> &str {
        &self.user_id
    }
    fn kind(&self) -> EntityKind {
        EntityKind::MemoryUnit
    }
    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
    fn embedding_text(&self) -> String {
        format!("{}\n{}", self.title, self.content)
    }
}

impl TextualEntity for Concept {
    fn entity_id(&self) -> Uuid {
        self.entity_id
    }
    fn user_id(&self) -> &str {
        &self.user_id
    }
    fn kind(&self) -> EntityKind {
        EntityKind::Concept
    }
    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
    fn embedding_text(&self) -> String {
        self.title.clone()
    }
}

impl TextualEntity for GrowthEvent {
    fn entity_id(&self) -> Uuid {
        self.entity_id
    }
    fn user_id(&self) -> &str {
        &self.user_id
    }
    fn kind(&self) -> EntityKind {
        EntityKind::GrowthEvent
    }
    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
    fn embedding_text(&self) -> String {
        format!("{} Growth Event: {}", self.dimension_key, self.content)
    }
}

impl TextualEntity for DerivedArtifact {
    fn entity_id(&self) -> Uuid {
        self.entity_id
    }
    fn user_id(&self) -> &str {
        &self.user_id
    }
    fn kind(&self) -> EntityKind {
        EntityKind::DerivedArtifact
    }
    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
    fn embedding_text(&self) -> String {
        format!("{}\n{}", self.title, self.content_narrative)
    }
}

impl TextualEntity for ProactivePrompt {
    fn entity_id(&self) -> Uuid {
        self.entity_id
    }
    fn user_id(&self) -> &str {
        &self.user_id
    }
    fn kind(&self) -> EntityKind {
        EntityKind::ProactivePrompt
    }
    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
    fn embedding_text(&self) -> String {
        self.prompt_text.clone()
    }
}

impl TextualEntity for Community {
    fn entity_id(&self) -> Uuid {
        self.entity_id
    }
    fn user_id(&self) -> &str {
        &self.user_id
    }
    fn kind(&self) -> EntityKind {
        EntityKind::Community
    }
    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
    fn embedding_text(&self) -> String {
        format!("{}\n{}", self.title, self.content)
    }
}

impl Entity {
    pub fn entity_id(&self) -> Uuid {
        match self {
            Entity::MemoryUnit(e) => e.entity_id(),
            Entity::Concept(e) => e.entity_id(),
            Entity::GrowthEvent(e) => e.entity_id(),
            Entity::DerivedArtifact(e) => e.entity_id(),
            Entity::ProactivePrompt(e) => e.entity_id(),
            Entity::Community(e) => e.entity_id(),
        }
    }

    pub fn user_id(&self) -> &str {
        match self {
            Entity::MemoryUnit(e) => e.user_id(),
            Entity::Concept(e) => e.user_id(),
            Entity::GrowthEvent(e) => e.user_id(),
            Entity::DerivedArtifact(e) => e.user_id(),
            Entity::ProactivePrompt(e) => e.user_id(),
            Entity::Community(e) => e.user_id(),
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::MemoryUnit(e) => e.kind(),
            Entity::Concept(e) => e.kind(),
            Entity::GrowthEvent(e) => e.kind(),
            Entity::DerivedArtifact(e) => e.kind(),
            Entity::ProactivePrompt(e) => e.kind(),
            Entity::Community(e) => e.kind(),
        }
    }

    pub fn embedding_text(&self) -> String {
        match self {
            Entity::MemoryUnit(e) => e.embedding_text(),
            Entity::Concept(e) => e.embedding_text(),
            Entity::GrowthEvent(e) => e.embedding_text(),
            Entity::DerivedArtifact(e) => e.embedding_text(),
            Entity::ProactivePrompt(e) => e.embedding_text(),
            Entity::Community(e) => e.embedding_text(),
        }
    }

    /// Entities fanned out for embedding only as "content entities" in the
    /// Insight Worker's step 7 (DerivedArtifact, ProactivePrompt,
    /// Community) or as merge representatives.
    pub fn is_content_entity(&self) -> bool {
        matches!(
            self,
            Entity::DerivedArtifact(_) | Entity::ProactivePrompt(_) | Entity::Community(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_memory_unit() -> MemoryUnit {
        MemoryUnit {
            entity_id: Uuid::new_v4(),
            user_id: "u1".into(),
            title: "Learned Rust".into(),
            content: "Picked up ownership and borrowing.".into(),
            importance_score: 6.0,
            sentiment_score: 0.4,
            source_conversation_id: Uuid::new_v4(),
            source: "Ingestion".into(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn memory_unit_embedding_text_joins_title_and_content() {
        let unit = sample_memory_unit();
        let text = Entity::MemoryUnit(unit.clone()).embedding_text();
        assert_eq!(text, format!("{}\n{}", unit.title, unit.content));
    }

    #[test]
    fn growth_event_embedding_text_matches_contract() {
        let event = GrowthEvent {
            entity_id: Uuid::new_v4(),
            user_id: "u1".into(),
            title: "Shipped a project".into(),
            dimension_key: "act_world".into(),
            delta_value: 0.3,
            content: "Deployed the service to production.".into(),
            source_memory_unit_ids: vec![],
            source_concept_ids: vec![],
            source: "Ingestion".into(),
            created_at: Utc::now(),
        };
        let text = Entity::GrowthEvent(event.clone()).embedding_text();
        assert_eq!(text, "act_world Growth Event: Deployed the service to production.");
    }

    #[test]
    fn only_content_entities_are_fanned_out_for_insight_embedding() {
        let artifact = Entity::DerivedArtifact(DerivedArtifact {
            entity_id: Uuid::new_v4(),
            user_id: "u1".into(),
            cycle_id: Uuid::new_v4(),
            artifact_type: "report".into(),
            title: "Weekly Report".into(),
            content_narrative: "...".into(),
            content_data: None,
            source_concept_ids: vec![],
            source_memory_unit_ids: vec![],
            source: "Insight".into(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        });
        assert!(artifact.is_content_entity());

        let memory = Entity::MemoryUnit(sample_memory_unit());
        assert!(!memory.is_content_entity());
    }

    #[test]
    fn card_type_is_lowercase_entity_kind() {
        assert_eq!(EntityKind::DerivedArtifact.card_type(), "derived_artifact");
        assert!(EntityKind::MemoryUnit.is_card_eligible());
        assert!(!EntityKind::Conversation.is_card_eligible());
    }
}
