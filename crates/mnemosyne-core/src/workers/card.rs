//! Card Worker (§4.3): materialize one presentation card per eligible new
//! entity, idempotently.

use super::Stores;
use anyhow::Result;
use mnemosyne_common::entities::Card;
use mnemosyne_common::events::GraphQueueEvent;
use uuid::Uuid;

pub async fn process(stores: &Stores, event: GraphQueueEvent) {
    let (user_id, entities) = match event {
        GraphQueueEvent::NewEntitiesCreated(e) | GraphQueueEvent::CycleArtifactsCreated(e) => {
            (e.user_id, e.entities)
        }
        GraphQueueEvent::Unknown => return,
    };

    for entity in entities {
        if let Err(e) = create_card_if_missing(stores, &user_id, entity.id, entity.entity_type).await {
            tracing::warn!(
                entity_id = %entity.id,
                entity_type = ?entity.entity_type,
                error = %e,
                "card creation failed for one entity, continuing batch"
            );
        }
    }
}

async fn create_card_if_missing(
    stores: &Stores,
    user_id: &str,
    source_entity_id: Uuid,
    source_entity_type: mnemosyne_common::entities::EntityKind,
) -> Result<()> {
    if !source_entity_type.is_card_eligible() {
        return Ok(());
    }
    let type_str = source_entity_type.card_type();
    if stores
        .relational
        .card_exists(user_id, &source_entity_id.to_string(), type_str)?
    {
        return Ok(());
    }

    let card = Card {
        card_id: Uuid::new_v4(),
        user_id: user_id.to_string(),
        source_entity_id,
        source_entity_type,
        card_type: type_str.to_string(),
        display_data: serde_json::json!({}),
        created_at: chrono::Utc::now(),
    };
    stores
        .relational
        .put_card(user_id, &source_entity_id.to_string(), type_str, &card)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mnemosyne_common::entities::EntityKind;

    #[test]
    fn conversation_is_never_card_eligible() {
        assert!(!EntityKind::Conversation.is_card_eligible());
    }
}
