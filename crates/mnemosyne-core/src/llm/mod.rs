//! The synthesis and embedding capabilities (§6.1, §6.2), modeled as one
//! `LlmClient` trait object the way the teacher's `LLMClient` trait
//! abstracts its provider. The reducer (§6.4) and semantic-similarity
//! (§6.3) capabilities are not part of this trait: the former is a plain
//! HTTP client (`reducer.rs`), the latter is answered from the vector
//! store (`dedup.rs`), neither needs an LLM call.

pub mod gemini;

pub use gemini::GeminiClient;

use async_trait::async_trait;
use mnemosyne_common::error::LlmError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedMemoryUnit {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub importance_score: Option<f32>,
    #[serde(default)]
    pub sentiment_score: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedConcept {
    pub title: String,
    #[serde(rename = "type")]
    pub concept_type: String,
    pub content: String,
    #[serde(default)]
    pub importance_score: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectedGrowthEvent {
    pub title: String,
    #[serde(rename = "type")]
    pub dimension_key: String,
    pub delta: f32,
    pub content: String,
    #[serde(default)]
    pub source_memory_unit_ids: Vec<String>,
    #[serde(default)]
    pub source_concept_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRelationship {
    pub source_entity_id_or_name: String,
    pub target_entity_id_or_name: String,
    pub relationship_type: String,
    pub relationship_description: String,
    #[serde(default)]
    pub strength: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistencePayload {
    pub conversation_title: String,
    pub conversation_summary: String,
    pub conversation_importance_score: f32,
    #[serde(default)]
    pub extracted_memory_units: Vec<ExtractedMemoryUnit>,
    #[serde(default)]
    pub extracted_concepts: Vec<ExtractedConcept>,
    #[serde(default)]
    pub detected_growth_events: Vec<DetectedGrowthEvent>,
    #[serde(default)]
    pub new_relationships: Vec<NewRelationship>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HolisticSynthesisOutput {
    pub persistence_payload: PersistencePayload,
    pub forward_looking_context: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HolisticSynthesisInput<'a> {
    pub user_id: &'a str,
    pub user_name: &'a str,
    pub full_conversation_transcript: &'a str,
    pub user_memory_profile: &'a str,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConceptMerge {
    pub primary_concept_id: String,
    pub secondary_concept_ids: Vec<String>,
    pub new_concept_name: String,
    pub new_concept_description: String,
    pub merge_rationale: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConceptArchive {
    pub concept_id: String,
    pub archive_rationale: String,
    #[serde(default)]
    pub replacement_concept_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategicRelationship {
    pub source_id: String,
    pub target_id: String,
    pub relationship_type: String,
    pub strength: f32,
    pub strategic_value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommunityStructure {
    #[serde(default)]
    pub community_id: Option<String>,
    pub member_concept_ids: Vec<String>,
    pub theme: String,
    pub strategic_importance: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConceptDescriptionSynthesis {
    pub concept_id: String,
    pub synthesized_description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OntologyOptimizations {
    #[serde(default)]
    pub concepts_to_merge: Vec<ConceptMerge>,
    #[serde(default)]
    pub concepts_to_archive: Vec<ConceptArchive>,
    #[serde(default)]
    pub new_strategic_relationships: Vec<StrategicRelationship>,
    #[serde(default)]
    pub community_structures: Vec<CommunityStructure>,
    #[serde(default)]
    pub concept_description_synthesis: Vec<ConceptDescriptionSynthesis>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DerivedArtifactOutput {
    pub artifact_type: String,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub content_data: Option<serde_json::Value>,
    #[serde(default)]
    pub source_concept_ids: Vec<String>,
    #[serde(default)]
    pub source_memory_unit_ids: Vec<String>,
    #[serde(default)]
    pub confidence_score: Option<f32>,
    #[serde(default)]
    pub actionability: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProactivePromptOutput {
    pub title: String,
    pub prompt_text: String,
    pub prompt_type: String,
    pub timing_suggestion: String,
    pub priority_level: String,
    #[serde(default)]
    pub context_explanation: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategicSynthesisOutput {
    pub ontology_optimizations: OntologyOptimizations,
    pub derived_artifacts: Vec<DerivedArtifactOutput>,
    pub proactive_prompts: Vec<ProactivePromptOutput>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StrategicSynthesisInput<'a> {
    pub user_id: &'a str,
    pub user_name: &'a str,
    pub cycle_id: &'a str,
    pub cycle_start_date: String,
    pub cycle_end_date: String,
    pub current_knowledge_graph: serde_json::Value,
    pub recent_growth_events: serde_json::Value,
    pub user_profile: &'a str,
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError>;

    /// Default falls back to sequential `embed` calls, exactly as the
    /// teacher's `LLMClient::embed_batch` default does.
    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, LlmError> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(&text).await?);
        }
        Ok(results)
    }

    async fn synthesize_holistic(
        &self,
        input: HolisticSynthesisInput<'_>,
    ) -> Result<HolisticSynthesisOutput, LlmError>;

    async fn synthesize_strategic(
        &self,
        input: StrategicSynthesisInput<'_>,
    ) -> Result<StrategicSynthesisOutput, LlmError>;
}
