//! Relational store: a RocksDB key-value store keyed
//! `{entity_type}:{user_id}:{entity_id}`, exactly the teacher's
//! `KvStore` plus a typed JSON CRUD layer on top. Every entity in the
//! system (Conversation, MemoryUnit, Concept, GrowthEvent,
//! DerivedArtifact, ProactivePrompt, Community, Card, UserCycle) is
//! stored as a JSON blob under its own key, with a per-user prefix scan
//! for listing.

use anyhow::Result;
use rocksdb::{Options, DB};
use serde::{de::DeserializeOwned, Serialize};
use std::path::Path;
use std::sync::Arc;

#[derive(Clone)]
pub struct KvStore {
    db: Arc<DB>,
}

impl KvStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        let db = DB::open(&opts, path)?;
        Ok(Self { db: Arc::new(db) })
    }

    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.db.put(key, value)?;
        Ok(())
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.db.get(key)?)
    }

    pub fn delete(&self, key: &[u8]) -> Result<()> {
        self.db.delete(key)?;
        Ok(())
    }

    pub fn scan(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        use rocksdb::{Direction, IteratorMode};
        let iter = self.db.iterator(IteratorMode::From(prefix, Direction::Forward));
        let mut results = Vec::new();
        for item in iter {
            let (k, v) = item?;
            if !k.starts_with(prefix) {
                break;
            }
            results.push((k.to_vec(), v.to_vec()));
        }
        Ok(results)
    }

    pub fn checkpoint(&self, path: &Path) -> Result<()> {
        let checkpoint = rocksdb::checkpoint::Checkpoint::new(&self.db)?;
        checkpoint.create_checkpoint(path)?;
        Ok(())
    }
}

/// Typed JSON CRUD over `KvStore`, scoped by entity-type namespace so
/// different entity kinds never collide in the key space even though
/// they share one RocksDB instance.
#[derive(Clone)]
pub struct RelationalStore {
    kv: KvStore,
}

fn key(namespace: &str, user_id: &str, id: &str) -> Vec<u8> {
    format!("{namespace}:{user_id}:{id}").into_bytes()
}

fn prefix(namespace: &str, user_id: &str) -> Vec<u8> {
    format!("{namespace}:{user_id}:").into_bytes()
}

impl RelationalStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self {
            kv: KvStore::open(path)?,
        })
    }

    pub fn put<T: Serialize>(&self, namespace: &str, user_id: &str, id: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        self.kv.put(&key(namespace, user_id, id), &bytes)
    }

    pub fn get<T: DeserializeOwned>(&self, namespace: &str, user_id: &str, id: &str) -> Result<Option<T>> {
        match self.kv.get(&key(namespace, user_id, id))? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn delete(&self, namespace: &str, user_id: &str, id: &str) -> Result<()> {
        self.kv.delete(&key(namespace, user_id, id))
    }

    pub fn list<T: DeserializeOwned>(&self, namespace: &str, user_id: &str) -> Result<Vec<T>> {
        let rows = self.kv.scan(&prefix(namespace, user_id))?;
        rows.into_iter()
            .map(|(_, v)| Ok(serde_json::from_slice(&v)?))
            .collect()
    }

    /// Card idempotence (§3.2 invariant 6): true if a card already exists
    /// for `(source_entity_id, source_entity_type)`.
    pub fn card_exists(&self, user_id: &str, source_entity_id: &str, source_entity_type: &str) -> Result<bool> {
        let id = format!("{source_entity_id}:{source_entity_type}");
        Ok(self.kv.get(&key("card", user_id, &id))?.is_some())
    }

    pub fn put_card<T: Serialize>(
        &self,
        user_id: &str,
        source_entity_id: &str,
        source_entity_type: &str,
        card: &T,
    ) -> Result<()> {
        let id = format!("{source_entity_id}:{source_entity_type}");
        self.put("card", user_id, &id, card)
    }

    pub fn checkpoint(&self, path: &Path) -> Result<()> {
        self.kv.checkpoint(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Sample {
        value: String,
    }

    #[test]
    fn put_get_delete_round_trip() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let store = RelationalStore::open(dir.path())?;

        let sample = Sample { value: "hello".into() };
        store.put("memory_unit", "u1", "e1", &sample)?;

        let fetched: Option<Sample> = store.get("memory_unit", "u1", "e1")?;
        assert_eq!(fetched, Some(sample));

        store.delete("memory_unit", "u1", "e1")?;
        let gone: Option<Sample> = store.get("memory_unit", "u1", "e1")?;
        assert_eq!(gone, None);
        Ok(())
    }

    #[test]
    fn list_only_returns_rows_for_the_given_user() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let store = RelationalStore::open(dir.path())?;

        store.put("memory_unit", "u1", "e1", &Sample { value: "a".into() })?;
        store.put("memory_unit", "u1", "e2", &Sample { value: "b".into() })?;
        store.put("memory_unit", "u2", "e3", &Sample { value: "c".into() })?;

        let rows: Vec<Sample> = store.list("memory_unit", "u1")?;
        assert_eq!(rows.len(), 2);
        Ok(())
    }

    #[test]
    fn card_idempotence_keys_on_entity_id_and_type() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let store = RelationalStore::open(dir.path())?;

        assert!(!store.card_exists("u1", "e1", "memory_unit")?);
        store.put_card("u1", "e1", "memory_unit", &Sample { value: "card".into() })?;
        assert!(store.card_exists("u1", "e1", "memory_unit")?);
        Ok(())
    }
}
