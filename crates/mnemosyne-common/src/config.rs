//! Layered configuration (§6.7), adapted from the teacher's
//! `AppConfig::load()` pattern: defaults, then `config.toml`, then
//! `.env`-style overlays, then process environment, highest precedence
//! last. `dotenvy` loads the `.env*` cascade into the process environment
//! before the `config` crate builder runs, giving the documented
//! precedence `process env > .env.development > .env.local > .env >
//! defaults`.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum LlmProvider {
    Gemini,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub google_api_key: Option<String>,
    pub synthesis_model: String,
    pub embedding_model: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::Gemini,
            google_api_key: None,
            synthesis_model: "gemini-2.0-flash".into(),
            embedding_model: "text-embedding-004".into(),
        }
    }
}

impl LlmConfig {
    pub fn active_key(&self) -> Option<String> {
        match self.provider {
            LlmProvider::Gemini => self.google_api_key.clone(),
        }
    }
}

/// Relational (RocksDB), graph (LanceDB), and vector (LanceDB) store roots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub relational_root: String,
    pub graph_path: String,
    pub vector_path: String,
    pub vector_dim: i32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            relational_root: "./data/relational".into(),
            graph_path: "./data/graph".into(),
            vector_path: "./data/vector".into(),
            vector_dim: 768,
        }
    }
}

/// Single long-lived Redis connection profile (§5): `maxRetriesPerRequest
/// = unbounded`, offline queue enabled, keepalive 30s, connect/command
/// timeout 10s. Backs both the job broker and the prompt-section cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    pub job_broker_url: String,
    pub cache_url: String,
    pub connect_timeout_ms: u64,
    pub command_timeout_ms: u64,
    pub keepalive_secs: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            job_broker_url: "redis://127.0.0.1:6379/0".into(),
            cache_url: "redis://127.0.0.1:6379/1".into(),
            connect_timeout_ms: 10_000,
            command_timeout_ms: 10_000,
            keepalive_secs: 30,
        }
    }
}

/// Per-worker concurrency (§5 defaults).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub ingestion_concurrency: usize,
    pub insight_concurrency: usize,
    pub card_concurrency: usize,
    pub graph_projection_concurrency: usize,
    pub embedding_concurrency: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            ingestion_concurrency: 2,
            insight_concurrency: 1,
            card_concurrency: 5,
            graph_projection_concurrency: 2,
            embedding_concurrency: 4,
        }
    }
}

/// Tunable business thresholds named explicitly in §6.7.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdsConfig {
    pub ingestion_min_importance_threshold: f32,
    pub semantic_similarity_reuse_threshold: f32,
    pub insight_cycle_duration_days: i64,
}

impl Default for ThresholdsConfig {
    fn default() -> Self {
        Self {
            ingestion_min_importance_threshold: 1.0,
            semantic_similarity_reuse_threshold: 0.8,
            insight_cycle_duration_days: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReducerConfig {
    pub url: String,
    pub default_algorithm: String,
}

impl Default for ReducerConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8090/reduce".into(),
            default_algorithm: "umap".into(),
        }
    }
}

/// Per-section prompt cache TTLs (§5, §6.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub turn_context_ttl_secs: u64,
    pub conversation_timeout_ttl_secs: u64,
    pub hrt_result_ttl_secs: u64,
    pub shared_embedding_ttl_secs: u64,
    pub prompt_section_ttl_secs: u64,
    pub hrt_parameters_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            turn_context_ttl_secs: 900,
            conversation_timeout_ttl_secs: 1800,
            hrt_result_ttl_secs: 3600,
            shared_embedding_ttl_secs: 86_400,
            prompt_section_ttl_secs: 600,
            hrt_parameters_ttl_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub storage: StorageConfig,
    pub redis: RedisConfig,
    pub worker: WorkerConfig,
    pub thresholds: ThresholdsConfig,
    pub reducer: ReducerConfig,
    pub cache: CacheConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        // Precedence (lowest to highest): defaults < config.toml < .env <
        // .env.local < .env.development < process env. dotenvy::from_filename
        // only sets a variable if it isn't already set, so loading narrowest
        // to widest and finishing with the real process env gives exactly
        // the documented precedence.
        let _ = dotenvy::from_filename(".env.development");
        let _ = dotenvy::from_filename(".env.local");
        let _ = dotenvy::dotenv();

        let s = Config::builder()
            .set_default("llm.provider", "gemini")?
            .set_default("llm.synthesis_model", "gemini-2.0-flash")?
            .set_default("llm.embedding_model", "text-embedding-004")?
            .set_default("storage.relational_root", "./data/relational")?
            .set_default("storage.graph_path", "./data/graph")?
            .set_default("storage.vector_path", "./data/vector")?
            .set_default("storage.vector_dim", 768)?
            .set_default("redis.job_broker_url", "redis://127.0.0.1:6379/0")?
            .set_default("redis.cache_url", "redis://127.0.0.1:6379/1")?
            .set_default("redis.connect_timeout_ms", 10_000)?
            .set_default("redis.command_timeout_ms", 10_000)?
            .set_default("redis.keepalive_secs", 30)?
            .set_default("worker.ingestion_concurrency", 2)?
            .set_default("worker.insight_concurrency", 1)?
            .set_default("worker.card_concurrency", 5)?
            .set_default("worker.graph_projection_concurrency", 2)?
            .set_default("worker.embedding_concurrency", 4)?
            .set_default("thresholds.ingestion_min_importance_threshold", 1.0)?
            .set_default("thresholds.semantic_similarity_reuse_threshold", 0.8)?
            .set_default("thresholds.insight_cycle_duration_days", 2)?
            .set_default("reducer.url", "http://127.0.0.1:8090/reduce")?
            .set_default("reducer.default_algorithm", "umap")?
            .set_default("cache.turn_context_ttl_secs", 900)?
            .set_default("cache.conversation_timeout_ttl_secs", 1800)?
            .set_default("cache.hrt_result_ttl_secs", 3600)?
            .set_default("cache.shared_embedding_ttl_secs", 86_400)?
            .set_default("cache.prompt_section_ttl_secs", 600)?
            .set_default("cache.hrt_parameters_ttl_secs", 3600)?
            .add_source(File::with_name("config").required(false))
            .add_source(Environment::with_prefix("MNEMOSYNE").separator("__"))
            // Named overrides from §6.7, layered on top of the generic
            // MNEMOSYNE__ prefix for operators migrating existing deploys.
            .set_override_option("llm.google_api_key", env::var("GOOGLE_API_KEY").ok())?
            .set_override_option(
                "thresholds.ingestion_min_importance_threshold",
                env::var("INGESTION_MIN_IMPORTANCE_THRESHOLD")
                    .ok()
                    .and_then(|v| v.parse::<f64>().ok()),
            )?
            .set_override_option(
                "thresholds.semantic_similarity_reuse_threshold",
                env::var("SEMANTIC_SIMILARITY_REUSE_THRESHOLD")
                    .ok()
                    .and_then(|v| v.parse::<f64>().ok()),
            )?
            .set_override_option(
                "thresholds.insight_cycle_duration_days",
                env::var("INSIGHT_CYCLE_DURATION_DAYS")
                    .ok()
                    .and_then(|v| v.parse::<i64>().ok()),
            )?
            .set_override_option("reducer.default_algorithm", env::var("REDUCER_DEFAULT_ALGORITHM").ok())?
            .set_override_option("reducer.url", env::var("REDUCER_URL").ok())?
            .set_override_option("redis.job_broker_url", env::var("JOB_BROKER_URL").ok())?
            .build()?;

        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_thresholds() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.thresholds.ingestion_min_importance_threshold, 1.0);
        assert_eq!(cfg.thresholds.semantic_similarity_reuse_threshold, 0.8);
        assert_eq!(cfg.thresholds.insight_cycle_duration_days, 2);
        assert_eq!(cfg.worker.card_concurrency, 5);
        assert_eq!(cfg.worker.embedding_concurrency, 4);
    }
}
