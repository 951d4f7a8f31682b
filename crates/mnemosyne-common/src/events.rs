//! Job and event contracts for the five queues (§6.5). These are the only
//! shapes that cross the job broker; everything else is internal to a
//! worker.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::EntityKind;

/// Stable queue names, used as Redis list keys by the broker.
pub mod queue {
    pub const INGESTION: &str = "ingestion";
    pub const CARD: &str = "card";
    pub const GRAPH: &str = "graph";
    pub const EMBEDDING: &str = "embedding";
    pub const INSIGHT: &str = "insight";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionJob {
    pub conversation_id: Uuid,
    pub user_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsightJob {
    pub user_id: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EntityRef {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub entity_type: EntityKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum EventSource {
    Ingestion,
    Insight,
}

/// `new_entities_created` (source=Ingestion) and `cycle_artifacts_created`
/// (source=Insight) share this shape (§6.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntitiesCreatedEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub user_id: String,
    pub source: EventSource,
    pub timestamp: DateTime<Utc>,
    pub entities: Vec<EntityRef>,
}

impl EntitiesCreatedEvent {
    pub fn new_entities_created(user_id: String, entities: Vec<EntityRef>) -> Self {
        Self {
            event_type: "new_entities_created".to_string(),
            user_id,
            source: EventSource::Ingestion,
            timestamp: Utc::now(),
            entities,
        }
    }

    pub fn cycle_artifacts_created(user_id: String, entities: Vec<EntityRef>) -> Self {
        Self {
            event_type: "cycle_artifacts_created".to_string(),
            user_id,
            source: EventSource::Insight,
            timestamp: Utc::now(),
            entities,
        }
    }
}

/// Card queue consumes either flavor of `EntitiesCreatedEvent`. The Graph
/// Projection Worker also consumes both, and skips any other shape
/// (§4.4 step 0) — represented here by a catch-all deserialization target.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GraphQueueEvent {
    #[serde(rename = "new_entities_created")]
    NewEntitiesCreated(EntitiesCreatedEvent),
    #[serde(rename = "cycle_artifacts_created")]
    CycleArtifactsCreated(EntitiesCreatedEvent),
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingJob {
    pub entity_id: Uuid,
    pub entity_type: EntityKind,
    pub text_content: String,
    pub user_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_graph_event_shapes_are_skipped_not_rejected() {
        let json = serde_json::json!({"type": "something_else", "foo": "bar"});
        let event: GraphQueueEvent = serde_json::from_value(json).unwrap();
        assert!(matches!(event, GraphQueueEvent::Unknown));
    }

    #[test]
    fn new_entities_created_roundtrips() {
        let event = EntitiesCreatedEvent::new_entities_created(
            "u1".into(),
            vec![EntityRef {
                id: Uuid::new_v4(),
                entity_type: EntityKind::MemoryUnit,
            }],
        );
        let json = serde_json::to_string(&event).unwrap();
        let back: EntitiesCreatedEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.event_type, "new_entities_created");
        assert_eq!(back.source, EventSource::Ingestion);
    }
}
