//! Vector store: a single LanceDB table keyed by `entity_id`, adapted from
//! the teacher's `VectorStore` (fixed-size-list vector column, `nearest_to`
//! search, filter pushdown) but upsert-on-`entity_id` instead of
//! append-only, since the Embedding Worker's contract (§4.5) is an upsert.

use anyhow::{Context, Result};
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator, StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use futures::{StreamExt, TryStreamExt};
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::Connection;
use mnemosyne_common::entities::EntityKind;
use std::sync::Arc;
use uuid::Uuid;

const TABLE_NAME: &str = "entity_vectors";

#[derive(Clone)]
pub struct VectorStore {
    conn: Connection,
    dim: i32,
}

fn vector_schema(dim: i32) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("entity_id", DataType::Utf8, false),
        Field::new("user_id", DataType::Utf8, false),
        Field::new("entity_type", DataType::Utf8, false),
        Field::new("status", DataType::Utf8, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim),
            false,
        ),
    ]))
}

impl VectorStore {
    pub async fn connect(path: &str, dim: i32) -> Result<Self> {
        let conn = lancedb::connect(path).execute().await?;
        let store = Self { conn, dim };
        store.ensure_table().await?;
        Ok(store)
    }

    async fn ensure_table(&self) -> Result<()> {
        let tables = self.conn.table_names().execute().await?;
        if !tables.contains(&TABLE_NAME.to_string()) {
            let schema = vector_schema(self.dim);
            self.conn.create_empty_table(TABLE_NAME, schema).execute().await?;
        }
        Ok(())
    }

    /// Upsert `{entity_id, user_id, entity_type, vector, status}` (§4.5).
    /// Lance has no native upsert, so delete any existing row for this
    /// `entity_id` first, matching the delete+reinsert pattern used
    /// throughout the graph store.
    pub async fn upsert(
        &self,
        entity_id: Uuid,
        user_id: &str,
        entity_type: EntityKind,
        vector: &[f32],
        status: &str,
    ) -> Result<()> {
        let table = self.conn.open_table(TABLE_NAME).execute().await?;
        let filter = format!("entity_id = '{entity_id}'");
        table.delete(&filter).await?;

        let mut v = vector.to_vec();
        if v.len() != self.dim as usize {
            v.resize(self.dim as usize, 0.0);
        }

        let entity_type_str = serde_json::to_value(entity_type)?
            .as_str()
            .unwrap_or_default()
            .to_string();

        let schema = vector_schema(self.dim);
        let field = Arc::new(Field::new("item", DataType::Float32, true));
        let vector_array = FixedSizeListArray::new(field, self.dim, Arc::new(Float32Array::from(v)), None);

        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(StringArray::from(vec![entity_id.to_string()])),
                Arc::new(StringArray::from(vec![user_id.to_string()])),
                Arc::new(StringArray::from(vec![entity_type_str])),
                Arc::new(StringArray::from(vec![status.to_string()])),
                Arc::new(vector_array),
            ],
        )?;
        let reader = RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema);
        table.add(reader).execute().await?;
        Ok(())
    }

    /// Mirror a relational status change (active/merged/archived) onto the
    /// stored vector row without re-embedding (§4.2 steps 4a/4b).
    pub async fn set_status(&self, entity_id: Uuid, status: &str) -> Result<()> {
        let vector = self.get_vector(entity_id).await?;
        let Some((vector, user_id, entity_type)) = vector else {
            return Ok(());
        };
        self.upsert(entity_id, &user_id, entity_type, &vector, status).await
    }

    pub async fn get_vector(&self, entity_id: Uuid) -> Result<Option<(Vec<f32>, String, EntityKind)>> {
        let table = self.conn.open_table(TABLE_NAME).execute().await?;
        let batches: Vec<RecordBatch> = table
            .query()
            .only_if(format!("entity_id = '{entity_id}'"))
            .execute()
            .await?
            .try_collect()
            .await?;
        for batch in batches {
            if batch.num_rows() == 0 {
                continue;
            }
            let user_id = batch
                .column_by_name("user_id")
                .and_then(|c| c.as_any().downcast_ref::<StringArray>())
                .context("user_id column")?
                .value(0)
                .to_string();
            let entity_type_str = batch
                .column_by_name("entity_type")
                .and_then(|c| c.as_any().downcast_ref::<StringArray>())
                .context("entity_type column")?
                .value(0)
                .to_string();
            let entity_type: EntityKind =
                serde_json::from_value(serde_json::Value::String(entity_type_str))
                    .unwrap_or(EntityKind::Concept);
            let vector_col = batch
                .column_by_name("vector")
                .and_then(|c| c.as_any().downcast_ref::<FixedSizeListArray>())
                .context("vector column")?;
            let values = vector_col
                .value(0)
                .as_any()
                .downcast_ref::<Float32Array>()
                .context("vector values")?
                .values()
                .to_vec();
            return Ok(Some((values, user_id, entity_type)));
        }
        Ok(None)
    }

    /// Nearest-neighbor search for the semantic similarity capability
    /// (§6.3). Returns `(entity_id, score)` sorted by LanceDB's own
    /// nearest-first ordering.
    pub async fn search(
        &self,
        query_vector: &[f32],
        limit: usize,
        filter: Option<String>,
    ) -> Result<Vec<(Uuid, f32)>> {
        let table = self.conn.open_table(TABLE_NAME).execute().await?;
        let mut q = query_vector.to_vec();
        q.resize(self.dim as usize, 0.0);

        let mut query = table.query().nearest_to(q.as_slice())?.limit(limit);
        if let Some(f) = filter {
            query = query.only_if(f);
        }

        let mut stream = query.execute().await?;
        let mut results = Vec::new();
        while let Some(batch_res) = stream.next().await {
            let batch: RecordBatch = batch_res?;
            let id_col = batch
                .column_by_name("entity_id")
                .context("entity_id column")?
                .as_any()
                .downcast_ref::<StringArray>()
                .context("downcast entity_id")?;
            let dist_col = batch
                .column_by_name("_distance")
                .context("_distance column")?
                .as_any()
                .downcast_ref::<Float32Array>()
                .context("downcast _distance")?;
            for i in 0..id_col.len() {
                if let Ok(id) = Uuid::parse_str(id_col.value(i)) {
                    let dist = dist_col.value(i);
                    results.push((id, 1.0 / (1.0 + dist)));
                }
            }
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upsert_then_search_finds_exact_match() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let store = VectorStore::connect(dir.path().to_str().unwrap(), 8).await?;

        let id = Uuid::new_v4();
        let mut vector = vec![0.0; 8];
        vector[0] = 1.0;
        store.upsert(id, "u1", EntityKind::MemoryUnit, &vector, "active").await?;

        let results = store.search(&vector, 5, None).await?;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, id);
        assert!(results[0].1 > 0.99);
        Ok(())
    }

    #[tokio::test]
    async fn upsert_replaces_previous_vector_for_same_entity() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let store = VectorStore::connect(dir.path().to_str().unwrap(), 4).await?;

        let id = Uuid::new_v4();
        store.upsert(id, "u1", EntityKind::Concept, &[1.0, 0.0, 0.0, 0.0], "active").await?;
        store.upsert(id, "u1", EntityKind::Concept, &[0.0, 1.0, 0.0, 0.0], "merged").await?;

        let (vector, _, _) = store.get_vector(id).await?.expect("row exists");
        assert_eq!(vector, vec![0.0, 1.0, 0.0, 0.0]);
        Ok(())
    }
}
