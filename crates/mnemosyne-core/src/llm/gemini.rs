//! Gemini-backed `LlmClient`, adapted from the teacher's `GeminiClient`:
//! same request/response shapes for `generateContent` and `embedContent`,
//! retargeted to the synthesis capabilities this system needs instead of
//! the teacher's compress/summarize/describe-image surface.

use super::{
    HolisticSynthesisInput, HolisticSynthesisOutput, LlmClient, StrategicSynthesisInput,
    StrategicSynthesisOutput,
};
use crate::retry::with_backoff;
use async_trait::async_trait;
use mnemosyne_common::error::LlmError;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    embedding_model: String,
}

impl GeminiClient {
    pub fn new(api_key: String, model: String, embedding_model: String) -> Self {
        Self::with_base_url(
            api_key,
            model,
            embedding_model,
            "https://generativelanguage.googleapis.com".to_string(),
        )
    }

    pub fn with_base_url(api_key: String, model: String, embedding_model: String, base_url: String) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.trim().to_string(),
            base_url,
            model,
            embedding_model,
        }
    }

    async fn generate_raw(&self, prompt: &str, system_instruction: Option<&str>) -> Result<String, LlmError> {
        #[derive(Serialize)]
        struct Part<'a> {
            text: &'a str,
        }
        #[derive(Serialize)]
        struct Content<'a> {
            parts: Vec<Part<'a>>,
        }
        #[derive(Serialize)]
        struct GenerateRequest<'a> {
            contents: Vec<Content<'a>>,
            #[serde(rename = "systemInstruction", skip_serializing_if = "Option::is_none")]
            system_instruction: Option<Content<'a>>,
        }
        #[derive(Deserialize)]
        struct RespContent {
            parts: Vec<RespPart>,
        }
        #[derive(Deserialize)]
        struct RespPart {
            text: Option<String>,
        }
        #[derive(Deserialize)]
        struct Candidate {
            content: RespContent,
        }
        #[derive(Deserialize)]
        struct ApiError {
            message: String,
        }
        #[derive(Deserialize)]
        struct GenerateResponse {
            candidates: Option<Vec<Candidate>>,
            error: Option<ApiError>,
        }

        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );
        let body = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
            system_instruction: system_instruction.map(|s| Content {
                parts: vec![Part { text: s }],
            }),
        };

        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Transient(anyhow::anyhow!(e)))?;

        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Err(LlmError::Transient(anyhow::anyhow!(
                "gemini returned status {status}"
            )));
        }

        let parsed: GenerateResponse = resp
            .json()
            .await
            .map_err(|e| LlmError::Deterministic(anyhow::anyhow!(e)))?;

        if let Some(err) = parsed.error {
            return Err(LlmError::Deterministic(anyhow::anyhow!(err.message)));
        }

        let text = parsed
            .candidates
            .and_then(|mut c| c.pop())
            .and_then(|c| c.content.parts.into_iter().find_map(|p| p.text))
            .ok_or_else(|| LlmError::Deterministic(anyhow::anyhow!("gemini response had no text part")))?;

        Ok(text)
    }

    async fn generate_json<T: for<'de> Deserialize<'de>>(
        &self,
        operation: &str,
        prompt: &str,
        system_instruction: &str,
    ) -> Result<T, LlmError> {
        with_backoff(operation, || async {
            let text = self.generate_raw(prompt, Some(system_instruction)).await?;
            let trimmed = strip_code_fence(&text);
            reject_partial_output(trimmed)?;
            serde_json::from_str(trimmed)
                .map_err(|e| LlmError::Deterministic(anyhow::anyhow!("invalid JSON from LLM: {e}")))
        })
        .await
    }
}

/// §9 "Partial JSON": a response that parses but was visibly cut off
/// (too short, or carrying its own truncation marker) must not reach
/// persistence. Checked before `serde_json::from_str`.
fn reject_partial_output(text: &str) -> Result<(), LlmError> {
    const TRUNCATION_MARKERS: [&str; 3] = ["...", "truncated", "incomplete"];

    if text.len() < 100 {
        return Err(LlmError::Deterministic(anyhow::anyhow!(
            "llm output too short ({} bytes), looks truncated",
            text.len()
        )));
    }
    let lower = text.to_lowercase();
    if TRUNCATION_MARKERS.iter().any(|marker| lower.contains(marker)) {
        return Err(LlmError::Deterministic(anyhow::anyhow!(
            "llm output contains a truncation marker"
        )));
    }
    Ok(())
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .map(|s| s.strip_suffix("```").unwrap_or(s))
        .unwrap_or(trimmed)
        .trim()
}

#[async_trait]
impl LlmClient for GeminiClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        #[derive(Serialize)]
        struct Part<'a> {
            text: &'a str,
        }
        #[derive(Serialize)]
        struct EmbedContent<'a> {
            parts: Vec<Part<'a>>,
        }
        #[derive(Serialize)]
        struct EmbedRequest<'a> {
            model: String,
            content: EmbedContent<'a>,
        }
        #[derive(Deserialize)]
        struct Embedding {
            values: Vec<f32>,
        }
        #[derive(Deserialize)]
        struct EmbedResponse {
            embedding: Option<Embedding>,
            error: Option<ApiErrorBody>,
        }
        #[derive(Deserialize)]
        struct ApiErrorBody {
            message: String,
        }

        let url = format!(
            "{}/v1beta/models/{}:embedContent?key={}",
            self.base_url, self.embedding_model, self.api_key
        );
        let model_path = format!("models/{}", self.embedding_model);
        let body = EmbedRequest {
            model: model_path,
            content: EmbedContent {
                parts: vec![Part { text }],
            },
        };

        with_backoff("gemini_embed", || async {
            let resp = self
                .client
                .post(&url)
                .json(&body)
                .send()
                .await
                .map_err(|e| LlmError::Transient(anyhow::anyhow!(e)))?;

            if resp.status().is_server_error() || resp.status() == StatusCode::TOO_MANY_REQUESTS {
                return Err(LlmError::Transient(anyhow::anyhow!(
                    "gemini embed returned status {}",
                    resp.status()
                )));
            }

            let parsed: EmbedResponse = resp
                .json()
                .await
                .map_err(|e| LlmError::Deterministic(anyhow::anyhow!(e)))?;

            if let Some(err) = parsed.error {
                return Err(LlmError::Deterministic(anyhow::anyhow!(err.message)));
            }

            parsed
                .embedding
                .map(|e| e.values)
                .ok_or_else(|| LlmError::Deterministic(anyhow::anyhow!("gemini embed response had no values")))
        })
        .await
    }

    async fn synthesize_holistic(
        &self,
        input: HolisticSynthesisInput<'_>,
    ) -> Result<HolisticSynthesisOutput, LlmError> {
        let system_instruction = "You extract structured memories from a conversation transcript \
            and respond with a single JSON object matching the requested schema exactly, \
            with no surrounding prose.";
        let prompt = format!(
            "userId={}\nuserName={}\nuserMemoryProfile={}\n\nTranscript:\n{}\n\n\
            Respond with JSON: {{\"persistence_payload\": {{\"conversation_title\": string, \
            \"conversation_summary\": string, \"conversation_importance_score\": number (0-10), \
            \"extracted_memory_units\": [...], \"extracted_concepts\": [...], \
            \"detected_growth_events\": [...], \"new_relationships\": [...] }}, \
            \"forward_looking_context\": {{\"proactive_greeting\": string}} }}",
            input.user_id, input.user_name, input.user_memory_profile, input.full_conversation_transcript
        );
        self.generate_json("gemini_synthesize_holistic", &prompt, system_instruction)
            .await
    }

    async fn synthesize_strategic(
        &self,
        input: StrategicSynthesisInput<'_>,
    ) -> Result<StrategicSynthesisOutput, LlmError> {
        let system_instruction = "You periodically review a user's knowledge graph and respond with \
            a single JSON object matching the requested schema exactly, with no surrounding prose.";
        let prompt = format!(
            "userId={}\nuserName={}\ncycleId={}\ncycleStartDate={}\ncycleEndDate={}\n\
            currentKnowledgeGraph={}\nrecentGrowthEvents={}\nuserProfile={}\n\n\
            Respond with JSON: {{\"ontology_optimizations\": {{...}}, \"derived_artifacts\": [...], \
            \"proactive_prompts\": [...] }}",
            input.user_id,
            input.user_name,
            input.cycle_id,
            input.cycle_start_date,
            input.cycle_end_date,
            input.current_knowledge_graph,
            input.recent_growth_events,
            input.user_profile
        );
        self.generate_json("gemini_synthesize_strategic", &prompt, system_instruction)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_code_fence_removes_markdown_json_fence() {
        let raw = "```json\n{\"a\":1}\n```";
        assert_eq!(strip_code_fence(raw), "{\"a\":1}");
    }

    #[test]
    fn strip_code_fence_passes_through_bare_json() {
        let raw = "{\"a\":1}";
        assert_eq!(strip_code_fence(raw), "{\"a\":1}");
    }

    #[test]
    fn reject_partial_output_rejects_short_text() {
        assert!(reject_partial_output("{\"a\":1}").is_err());
    }

    #[test]
    fn reject_partial_output_rejects_truncation_marker() {
        let padded = format!("{{\"a\": \"this response got cut off and is truncated...\", \"pad\": \"{}\"}}", "x".repeat(80));
        assert!(reject_partial_output(&padded).is_err());
    }

    #[test]
    fn reject_partial_output_accepts_well_formed_payload() {
        let padded = format!("{{\"a\": \"{}\"}}", "x".repeat(120));
        assert!(reject_partial_output(&padded).is_ok());
    }
}
