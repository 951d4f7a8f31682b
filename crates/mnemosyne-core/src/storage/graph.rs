//! Graph store: two buffered LanceDB tables, `nodes` and `relationships`,
//! following the teacher's buffer-then-flush pattern (periodic background
//! flush, in-memory buffer searched alongside on-disk rows, delete+reinsert
//! for "updates" since Lance has no cheap row update).

use anyhow::{Context, Result};
use arrow_array::{
    Array, Float32Array, RecordBatch, RecordBatchIterator, StringArray, TimestampMicrosecondArray,
};
use arrow_schema::{DataType, Field, Schema, TimeUnit};
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::Connection;
use mnemosyne_common::entities::{EntityKind, Relationship};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

/// A node as persisted in the graph: the standardized properties from
/// §4.1 step 5 plus the status/merge/archive bookkeeping Insight Worker
/// mutates in §4.2 step 4.
#[derive(Debug, Clone)]
pub struct GraphNode {
    pub entity_id: Uuid,
    pub user_id: String,
    pub entity_type: EntityKind,
    pub title: String,
    pub content: String,
    pub importance_score: f32,
    pub status: String,
    pub source: String,
    pub merged_into_concept_id: Option<Uuid>,
    pub community_id: Option<Uuid>,
    pub properties: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn node_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("entity_id", DataType::Utf8, false),
        Field::new("user_id", DataType::Utf8, false),
        Field::new("entity_type", DataType::Utf8, false),
        Field::new("title", DataType::Utf8, false),
        Field::new("content", DataType::Utf8, false),
        Field::new("importance_score", DataType::Float32, false),
        Field::new("status", DataType::Utf8, false),
        Field::new("source", DataType::Utf8, false),
        Field::new("merged_into_concept_id", DataType::Utf8, true),
        Field::new("community_id", DataType::Utf8, true),
        Field::new("properties", DataType::Utf8, false),
        Field::new(
            "created_at",
            DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
            false,
        ),
        Field::new(
            "updated_at",
            DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
            false,
        ),
    ]))
}

fn relationship_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("relationship_id", DataType::Utf8, false),
        Field::new("relationship_type", DataType::Utf8, false),
        Field::new("source_entity_id", DataType::Utf8, false),
        Field::new("target_entity_id", DataType::Utf8, false),
        Field::new("user_id", DataType::Utf8, false),
        Field::new("strength", DataType::Float32, false),
        Field::new("description", DataType::Utf8, false),
        Field::new("source_agent", DataType::Utf8, false),
        Field::new("redirected_from", DataType::Utf8, true),
        Field::new(
            "redirected_at",
            DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
            true,
        ),
        Field::new(
            "created_at",
            DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
            false,
        ),
    ]))
}

/// Relationship row plus the merge-redirect markers from §4.2 step 4a.
#[derive(Debug, Clone)]
pub struct RelationshipRow {
    pub relationship: Relationship,
    pub redirected_from: Option<Uuid>,
    pub redirected_at: Option<DateTime<Utc>>,
}

impl From<Relationship> for RelationshipRow {
    fn from(relationship: Relationship) -> Self {
        Self {
            relationship,
            redirected_from: None,
            redirected_at: None,
        }
    }
}

#[derive(Clone)]
pub struct GraphStore {
    db: Arc<Connection>,
    node_buffer: Arc<Mutex<Vec<GraphNode>>>,
    edge_buffer: Arc<Mutex<Vec<RelationshipRow>>>,
    _shutdown: Arc<tokio::sync::Notify>,
    _flush_task: Arc<tokio::task::JoinHandle<()>>,
}

const NODE_TABLE: &str = "nodes";
const EDGE_TABLE: &str = "relationships";
const FLUSH_THRESHOLD: usize = 100;

impl Drop for GraphStore {
    fn drop(&mut self) {
        if Arc::strong_count(&self._shutdown) == 2 {
            self._shutdown.notify_one();
        }
    }
}

impl GraphStore {
    pub async fn new(db: Arc<Connection>) -> Result<Self> {
        let node_buffer = Arc::new(Mutex::new(Vec::new()));
        let edge_buffer = Arc::new(Mutex::new(Vec::new()));
        let shutdown = Arc::new(tokio::sync::Notify::new());

        let db_clone = db.clone();
        let node_buf_clone = node_buffer.clone();
        let edge_buf_clone = edge_buffer.clone();
        let shutdown_clone = shutdown.clone();

        let flush_task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(5));
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if let Err(e) = flush_nodes(&db_clone, &node_buf_clone).await {
                            tracing::error!("GraphStore periodic node flush failed: {:?}", e);
                        }
                        if let Err(e) = flush_edges(&db_clone, &edge_buf_clone).await {
                            tracing::error!("GraphStore periodic edge flush failed: {:?}", e);
                        }
                    }
                    _ = shutdown_clone.notified() => {
                        tracing::debug!("GraphStore background flush task stopping");
                        break;
                    }
                }
            }
        });

        let store = Self {
            db,
            node_buffer,
            edge_buffer,
            _shutdown: shutdown,
            _flush_task: Arc::new(flush_task),
        };
        store.init().await?;
        Ok(store)
    }

    async fn init(&self) -> Result<()> {
        let tables = self.db.table_names().execute().await?;
        if !tables.contains(&NODE_TABLE.to_string()) {
            let schema = node_schema();
            let batch = RecordBatch::new_empty(schema.clone());
            let reader = RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema);
            self.db.create_table(NODE_TABLE, reader).execute().await?;
        }
        if !tables.contains(&EDGE_TABLE.to_string()) {
            let schema = relationship_schema();
            let batch = RecordBatch::new_empty(schema.clone());
            let reader = RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema);
            self.db.create_table(EDGE_TABLE, reader).execute().await?;
        }
        Ok(())
    }

    pub async fn flush(&self) -> Result<()> {
        flush_nodes(&self.db, &self.node_buffer).await?;
        flush_edges(&self.db, &self.edge_buffer).await?;
        Ok(())
    }

    // ---- nodes ----

    pub async fn create_node(&self, node: GraphNode) -> Result<()> {
        let should_flush = {
            let mut buf = self.node_buffer.lock().await;
            buf.push(node);
            buf.len() >= FLUSH_THRESHOLD
        };
        if should_flush {
            flush_nodes(&self.db, &self.node_buffer).await?;
        }
        Ok(())
    }

    /// Delete the on-disk + buffered row for `entity_id` and reinsert
    /// `node` in its place — the delete+reinsert "update" pattern used
    /// throughout this store for mutable Lance tables.
    pub async fn replace_node(&self, entity_id: Uuid, user_id: &str, node: GraphNode) -> Result<()> {
        self.delete_node_row(entity_id, user_id).await?;
        self.create_node(node).await
    }

    pub async fn delete_node_row(&self, entity_id: Uuid, user_id: &str) -> Result<()> {
        let escaped_user = user_id.replace('\'', "''");
        let filter = format!("user_id = '{escaped_user}' AND entity_id = '{entity_id}'");
        let table = self.db.open_table(NODE_TABLE).execute().await?;
        table.delete(&filter).await?;

        let mut buf = self.node_buffer.lock().await;
        buf.retain(|n| !(n.user_id == user_id && n.entity_id == entity_id));
        Ok(())
    }

    pub async fn get_node(&self, user_id: &str, entity_id: Uuid) -> Result<Option<GraphNode>> {
        {
            let buf = self.node_buffer.lock().await;
            if let Some(n) = buf
                .iter()
                .find(|n| n.user_id == user_id && n.entity_id == entity_id)
            {
                return Ok(Some(n.clone()));
            }
        }

        let table = self.db.open_table(NODE_TABLE).execute().await?;
        let escaped_user = user_id.replace('\'', "''");
        let batches: Vec<RecordBatch> = table
            .query()
            .only_if(format!(
                "user_id = '{escaped_user}' AND entity_id = '{entity_id}'"
            ))
            .execute()
            .await?
            .try_collect()
            .await?;
        Ok(batches_to_nodes(batches)?.into_iter().next())
    }

    /// Non-merged, non-archived nodes for a user (§3.2 invariant 5,
    /// §4.4 step 1).
    pub async fn list_active_nodes(&self, user_id: &str) -> Result<Vec<GraphNode>> {
        let mut nodes = {
            let buf = self.node_buffer.lock().await;
            buf.iter()
                .filter(|n| n.user_id == user_id && n.status == "active")
                .cloned()
                .collect::<Vec<_>>()
        };

        let table = self.db.open_table(NODE_TABLE).execute().await?;
        let escaped_user = user_id.replace('\'', "''");
        let batches: Vec<RecordBatch> = table
            .query()
            .only_if(format!("user_id = '{escaped_user}' AND status = 'active'"))
            .execute()
            .await?
            .try_collect()
            .await?;
        nodes.extend(batches_to_nodes(batches)?);
        Ok(dedup_nodes(nodes))
    }

    // ---- relationships ----

    pub async fn create_relationship(&self, row: RelationshipRow) -> Result<()> {
        let should_flush = {
            let mut buf = self.edge_buffer.lock().await;
            buf.push(row);
            buf.len() >= FLUSH_THRESHOLD
        };
        if should_flush {
            flush_edges(&self.db, &self.edge_buffer).await?;
        }
        Ok(())
    }

    /// Rewrite every edge incident to `from` to be incident to `to`,
    /// stamping `redirected_from`/`redirected_at` (§4.2 step 4a).
    pub async fn redirect_edges(&self, user_id: &str, from: Uuid, to: Uuid) -> Result<usize> {
        self.flush().await?;
        let table = self.db.open_table(EDGE_TABLE).execute().await?;
        let escaped_user = user_id.replace('\'', "''");
        let filter = format!(
            "user_id = '{escaped_user}' AND (source_entity_id = '{from}' OR target_entity_id = '{from}')"
        );
        let batches: Vec<RecordBatch> = table
            .query()
            .only_if(filter.clone())
            .execute()
            .await?
            .try_collect()
            .await?;
        let incident = batches_to_relationships(batches)?;
        if incident.is_empty() {
            return Ok(0);
        }
        table.delete(&filter).await?;

        let now = Utc::now();
        let mut count = 0;
        for mut row in incident {
            if row.relationship.source_entity_id == from {
                row.relationship.source_entity_id = to;
            }
            if row.relationship.target_entity_id == from {
                row.relationship.target_entity_id = to;
            }
            row.redirected_from = Some(from);
            row.redirected_at = Some(now);
            self.create_relationship(row).await?;
            count += 1;
        }
        Ok(count)
    }

    pub async fn get_outgoing(&self, user_id: &str, source_id: Uuid) -> Result<Vec<Relationship>> {
        let mut rows = {
            let buf = self.edge_buffer.lock().await;
            buf.iter()
                .filter(|r| {
                    r.relationship.user_id == user_id && r.relationship.source_entity_id == source_id
                })
                .cloned()
                .collect::<Vec<_>>()
        };

        let table = self.db.open_table(EDGE_TABLE).execute().await?;
        let escaped_user = user_id.replace('\'', "''");
        let batches: Vec<RecordBatch> = table
            .query()
            .only_if(format!(
                "user_id = '{escaped_user}' AND source_entity_id = '{source_id}'"
            ))
            .execute()
            .await?
            .try_collect()
            .await?;
        rows.extend(batches_to_relationships(batches)?);
        Ok(dedup_relationships(rows)
            .into_iter()
            .map(|r| r.relationship)
            .collect())
    }

    pub async fn list_all_edges_for_user(&self, user_id: &str) -> Result<Vec<Relationship>> {
        let mut rows = {
            let buf = self.edge_buffer.lock().await;
            buf.iter()
                .filter(|r| r.relationship.user_id == user_id)
                .cloned()
                .collect::<Vec<_>>()
        };

        let table = self.db.open_table(EDGE_TABLE).execute().await?;
        let escaped_user = user_id.replace('\'', "''");
        let batches: Vec<RecordBatch> = table
            .query()
            .only_if(format!("user_id = '{escaped_user}'"))
            .execute()
            .await?
            .try_collect()
            .await?;
        rows.extend(batches_to_relationships(batches)?);
        Ok(dedup_relationships(rows)
            .into_iter()
            .map(|r| r.relationship)
            .collect())
    }
}

async fn flush_nodes(db: &Arc<Connection>, buffer: &Arc<Mutex<Vec<GraphNode>>>) -> Result<()> {
    let nodes = {
        let mut buf = buffer.lock().await;
        if buf.is_empty() {
            return Ok(());
        }
        std::mem::take(&mut *buf)
    };

    let schema = node_schema();
    let entity_ids: Vec<String> = nodes.iter().map(|n| n.entity_id.to_string()).collect();
    let user_ids: Vec<String> = nodes.iter().map(|n| n.user_id.clone()).collect();
    let entity_types: Vec<String> = nodes
        .iter()
        .map(|n| serde_json::to_value(n.entity_type).unwrap().as_str().unwrap().to_string())
        .collect();
    let titles: Vec<String> = nodes.iter().map(|n| n.title.clone()).collect();
    let contents: Vec<String> = nodes.iter().map(|n| n.content.clone()).collect();
    let importance: Vec<f32> = nodes.iter().map(|n| n.importance_score).collect();
    let statuses: Vec<String> = nodes.iter().map(|n| n.status.clone()).collect();
    let sources: Vec<String> = nodes.iter().map(|n| n.source.clone()).collect();
    let merged_into: Vec<Option<String>> = nodes
        .iter()
        .map(|n| n.merged_into_concept_id.map(|id| id.to_string()))
        .collect();
    let community_id: Vec<Option<String>> = nodes
        .iter()
        .map(|n| n.community_id.map(|id| id.to_string()))
        .collect();
    let properties: Vec<String> = nodes.iter().map(|n| n.properties.to_string()).collect();
    let created_at: Vec<i64> = nodes.iter().map(|n| n.created_at.timestamp_micros()).collect();
    let updated_at: Vec<i64> = nodes.iter().map(|n| n.updated_at.timestamp_micros()).collect();

    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(StringArray::from(entity_ids)),
            Arc::new(StringArray::from(user_ids)),
            Arc::new(StringArray::from(entity_types)),
            Arc::new(StringArray::from(titles)),
            Arc::new(StringArray::from(contents)),
            Arc::new(Float32Array::from(importance)),
            Arc::new(StringArray::from(statuses)),
            Arc::new(StringArray::from(sources)),
            Arc::new(StringArray::from(merged_into)),
            Arc::new(StringArray::from(community_id)),
            Arc::new(StringArray::from(properties)),
            Arc::new(TimestampMicrosecondArray::from(created_at).with_timezone("UTC")),
            Arc::new(TimestampMicrosecondArray::from(updated_at).with_timezone("UTC")),
        ],
    );

    let write_result = async {
        let batch = batch?;
        let reader = RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema);
        let table = db.open_table(NODE_TABLE).execute().await?;
        table.add(reader).execute().await?;
        Ok::<_, anyhow::Error>(())
    }
    .await;

    if let Err(e) = write_result {
        let mut buf = buffer.lock().await;
        let newer = std::mem::take(&mut *buf);
        *buf = nodes;
        buf.extend(newer);
        return Err(e);
    }
    Ok(())
}

async fn flush_edges(db: &Arc<Connection>, buffer: &Arc<Mutex<Vec<RelationshipRow>>>) -> Result<()> {
    let rows = {
        let mut buf = buffer.lock().await;
        if buf.is_empty() {
            return Ok(());
        }
        std::mem::take(&mut *buf)
    };

    let schema = relationship_schema();
    let ids: Vec<String> = rows.iter().map(|r| r.relationship.relationship_id.to_string()).collect();
    let types: Vec<String> = rows.iter().map(|r| r.relationship.relationship_type.clone()).collect();
    let sources: Vec<String> = rows
        .iter()
        .map(|r| r.relationship.source_entity_id.to_string())
        .collect();
    let targets: Vec<String> = rows
        .iter()
        .map(|r| r.relationship.target_entity_id.to_string())
        .collect();
    let users: Vec<String> = rows.iter().map(|r| r.relationship.user_id.clone()).collect();
    let strengths: Vec<f32> = rows.iter().map(|r| r.relationship.strength).collect();
    let descriptions: Vec<String> = rows.iter().map(|r| r.relationship.description.clone()).collect();
    let agents: Vec<String> = rows.iter().map(|r| r.relationship.source_agent.clone()).collect();
    let redirected_from: Vec<Option<String>> =
        rows.iter().map(|r| r.redirected_from.map(|id| id.to_string())).collect();
    let redirected_at: Vec<Option<i64>> = rows
        .iter()
        .map(|r| r.redirected_at.map(|t| t.timestamp_micros()))
        .collect();
    let created_at: Vec<i64> = rows
        .iter()
        .map(|r| r.relationship.created_at.timestamp_micros())
        .collect();

    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(StringArray::from(types)),
            Arc::new(StringArray::from(sources)),
            Arc::new(StringArray::from(targets)),
            Arc::new(StringArray::from(users)),
            Arc::new(Float32Array::from(strengths)),
            Arc::new(StringArray::from(descriptions)),
            Arc::new(StringArray::from(agents)),
            Arc::new(StringArray::from(redirected_from)),
            Arc::new(TimestampMicrosecondArray::from(redirected_at).with_timezone("UTC")),
            Arc::new(TimestampMicrosecondArray::from(created_at).with_timezone("UTC")),
        ],
    );

    let write_result = async {
        let batch = batch?;
        let reader = RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema);
        let table = db.open_table(EDGE_TABLE).execute().await?;
        table.add(reader).execute().await?;
        Ok::<_, anyhow::Error>(())
    }
    .await;

    if let Err(e) = write_result {
        let mut buf = buffer.lock().await;
        let newer = std::mem::take(&mut *buf);
        *buf = rows;
        buf.extend(newer);
        return Err(e);
    }
    Ok(())
}

fn dedup_nodes(nodes: Vec<GraphNode>) -> Vec<GraphNode> {
    use std::collections::HashMap;
    let mut map: HashMap<(String, Uuid), GraphNode> = HashMap::new();
    for node in nodes {
        let key = (node.user_id.clone(), node.entity_id);
        match map.get(&key) {
            Some(existing) if existing.updated_at >= node.updated_at => {}
            _ => {
                map.insert(key, node);
            }
        }
    }
    map.into_values().collect()
}

fn dedup_relationships(rows: Vec<RelationshipRow>) -> Vec<RelationshipRow> {
    use std::collections::HashMap;
    let mut map: HashMap<Uuid, RelationshipRow> = HashMap::new();
    for row in rows {
        map.insert(row.relationship.relationship_id, row);
    }
    map.into_values().collect()
}

fn batches_to_nodes(batches: Vec<RecordBatch>) -> Result<Vec<GraphNode>> {
    let mut nodes = Vec::new();
    for batch in batches {
        let entity_id = string_col(&batch, 0)?;
        let user_id = string_col(&batch, 1)?;
        let entity_type = string_col(&batch, 2)?;
        let title = string_col(&batch, 3)?;
        let content = string_col(&batch, 4)?;
        let importance = batch
            .column(5)
            .as_any()
            .downcast_ref::<Float32Array>()
            .context("importance_score column")?;
        let status = string_col(&batch, 6)?;
        let source = string_col(&batch, 7)?;
        let merged_into = string_col_nullable(&batch, 8)?;
        let community_id = string_col_nullable(&batch, 9)?;
        let properties = string_col(&batch, 10)?;
        let created_at = timestamp_col(&batch, 11)?;
        let updated_at = timestamp_col(&batch, 12)?;

        for i in 0..batch.num_rows() {
            nodes.push(GraphNode {
                entity_id: Uuid::parse_str(entity_id.value(i)).unwrap_or_default(),
                user_id: user_id.value(i).to_string(),
                entity_type: serde_json::from_value(serde_json::Value::String(
                    entity_type.value(i).to_string(),
                ))
                .unwrap_or(EntityKind::Concept),
                title: title.value(i).to_string(),
                content: content.value(i).to_string(),
                importance_score: importance.value(i),
                status: status.value(i).to_string(),
                source: source.value(i).to_string(),
                merged_into_concept_id: if merged_into.is_null(i) {
                    None
                } else {
                    Uuid::parse_str(merged_into.value(i)).ok()
                },
                community_id: if community_id.is_null(i) {
                    None
                } else {
                    Uuid::parse_str(community_id.value(i)).ok()
                },
                properties: serde_json::from_str(properties.value(i)).unwrap_or_default(),
                created_at: micros_to_datetime(created_at.value(i)),
                updated_at: micros_to_datetime(updated_at.value(i)),
            });
        }
    }
    Ok(nodes)
}

fn batches_to_relationships(batches: Vec<RecordBatch>) -> Result<Vec<RelationshipRow>> {
    let mut rows = Vec::new();
    for batch in batches {
        let relationship_id = string_col(&batch, 0)?;
        let relationship_type = string_col(&batch, 1)?;
        let source_entity_id = string_col(&batch, 2)?;
        let target_entity_id = string_col(&batch, 3)?;
        let user_id = string_col(&batch, 4)?;
        let strength = batch
            .column(5)
            .as_any()
            .downcast_ref::<Float32Array>()
            .context("strength column")?;
        let description = string_col(&batch, 6)?;
        let source_agent = string_col(&batch, 7)?;
        let redirected_from = string_col_nullable(&batch, 8)?;
        let redirected_at = batch
            .column(9)
            .as_any()
            .downcast_ref::<TimestampMicrosecondArray>()
            .context("redirected_at column")?;
        let created_at = timestamp_col(&batch, 10)?;

        for i in 0..batch.num_rows() {
            rows.push(RelationshipRow {
                relationship: Relationship {
                    relationship_id: Uuid::parse_str(relationship_id.value(i)).unwrap_or_default(),
                    relationship_type: relationship_type.value(i).to_string(),
                    source_entity_id: Uuid::parse_str(source_entity_id.value(i)).unwrap_or_default(),
                    target_entity_id: Uuid::parse_str(target_entity_id.value(i)).unwrap_or_default(),
                    user_id: user_id.value(i).to_string(),
                    strength: strength.value(i),
                    description: description.value(i).to_string(),
                    source_agent: source_agent.value(i).to_string(),
                    created_at: micros_to_datetime(created_at.value(i)),
                },
                redirected_from: if redirected_from.is_null(i) {
                    None
                } else {
                    Uuid::parse_str(redirected_from.value(i)).ok()
                },
                redirected_at: if redirected_at.is_null(i) {
                    None
                } else {
                    Some(micros_to_datetime(redirected_at.value(i)))
                },
            });
        }
    }
    Ok(rows)
}

fn string_col(batch: &RecordBatch, idx: usize) -> Result<&StringArray> {
    batch
        .column(idx)
        .as_any()
        .downcast_ref::<StringArray>()
        .with_context(|| format!("column {idx} is not Utf8"))
}

fn string_col_nullable(batch: &RecordBatch, idx: usize) -> Result<&StringArray> {
    string_col(batch, idx)
}

fn timestamp_col(batch: &RecordBatch, idx: usize) -> Result<&TimestampMicrosecondArray> {
    batch
        .column(idx)
        .as_any()
        .downcast_ref::<TimestampMicrosecondArray>()
        .with_context(|| format!("column {idx} is not a microsecond timestamp"))
}

fn micros_to_datetime(ts_micros: i64) -> DateTime<Utc> {
    let secs = ts_micros.div_euclid(1_000_000);
    let nanos = (ts_micros.rem_euclid(1_000_000) * 1_000) as u32;
    chrono::TimeZone::timestamp_opt(&Utc, secs, nanos)
        .single()
        .unwrap_or_else(Utc::now)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_node(user_id: &str, entity_id: Uuid) -> GraphNode {
        let now = Utc::now();
        GraphNode {
            entity_id,
            user_id: user_id.to_string(),
            entity_type: EntityKind::Concept,
            title: "Rust ownership".into(),
            content: "A concept about memory safety.".into(),
            importance_score: 0.6,
            status: "active".into(),
            source: "Ingestion".into(),
            merged_into_concept_id: None,
            community_id: None,
            properties: serde_json::json!({}),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn create_and_fetch_node_round_trips() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let conn = Arc::new(lancedb::connect(dir.path().to_str().unwrap()).execute().await?);
        let store = GraphStore::new(conn).await?;

        let entity_id = Uuid::new_v4();
        store.create_node(sample_node("u1", entity_id)).await?;

        let fetched = store.get_node("u1", entity_id).await?;
        assert!(fetched.is_some());
        assert_eq!(fetched.unwrap().title, "Rust ownership");
        Ok(())
    }

    #[tokio::test]
    async fn redirect_edges_rewrites_incident_endpoints() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let conn = Arc::new(lancedb::connect(dir.path().to_str().unwrap()).execute().await?);
        let store = GraphStore::new(conn).await?;

        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let primary = Uuid::new_v4();

        let rel = Relationship {
            relationship_id: Uuid::new_v4(),
            relationship_type: "RELATED_TO".into(),
            source_entity_id: a,
            target_entity_id: b,
            user_id: "u1".into(),
            strength: 0.5,
            description: "placeholder".into(),
            source_agent: "Ingestion".into(),
            created_at: Utc::now(),
        };
        store.create_relationship(rel.into()).await?;
        store.flush().await?;

        let moved = store.redirect_edges("u1", a, primary).await?;
        assert_eq!(moved, 1);

        let outgoing = store.get_outgoing("u1", primary).await?;
        assert_eq!(outgoing.len(), 1);
        assert_eq!(outgoing[0].target_entity_id, b);
        Ok(())
    }
}
