use anyhow::{Context, Result};
use mnemosyne_common::config::AppConfig;
use mnemosyne_common::events::queue;
use mnemosyne_core::workers::{self, Stores};
use mnemosyne_core::{GeminiClient, GraphStore, LlmClient, PromptSectionCache, RedisJobBroker, RelationalStore, ReducerClient, VectorStore};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    match dotenvy::dotenv() {
        Ok(path) => tracing::info!("loaded .env from {:?}", path),
        Err(e) => tracing::warn!("no .env file loaded: {}", e),
    }

    let config = AppConfig::load().context("failed to load configuration")?;
    tracing::info!(provider = ?config.llm.provider, model = %config.llm.synthesis_model, "starting mnemosyne-worker");

    let stores = build_stores(&config).await?;

    let stopping = Arc::new(AtomicBool::new(false));
    let mut handles = Vec::new();

    {
        let stores = stores.clone();
        handles.extend(workers::spawn_consumer(
            stores.broker.clone(),
            queue::INGESTION,
            config.worker.ingestion_concurrency,
            stopping.clone(),
            move |job| {
                let stores = stores.clone();
                async move { workers::ingestion::process(&stores, job).await }
            },
        ));
    }
    {
        let stores = stores.clone();
        handles.extend(workers::spawn_consumer(
            stores.broker.clone(),
            queue::INSIGHT,
            config.worker.insight_concurrency,
            stopping.clone(),
            move |job| {
                let stores = stores.clone();
                async move { workers::insight::process(&stores, job).await }
            },
        ));
    }
    {
        let stores = stores.clone();
        handles.extend(workers::spawn_consumer(
            stores.broker.clone(),
            queue::CARD,
            config.worker.card_concurrency,
            stopping.clone(),
            move |event| {
                let stores = stores.clone();
                async move { workers::card::process(&stores, event).await }
            },
        ));
    }
    {
        let stores = stores.clone();
        handles.extend(workers::spawn_consumer(
            stores.broker.clone(),
            queue::GRAPH,
            config.worker.graph_projection_concurrency,
            stopping.clone(),
            move |event| {
                let stores = stores.clone();
                async move { workers::graph_projection::process(&stores, event).await }
            },
        ));
    }
    {
        let stores = stores.clone();
        handles.extend(workers::spawn_consumer(
            stores.broker.clone(),
            queue::EMBEDDING,
            config.worker.embedding_concurrency,
            stopping.clone(),
            move |job| {
                let stores = stores.clone();
                async move { workers::embedding::process(&stores, job).await }
            },
        ));
    }

    wait_for_shutdown_signal().await;
    tracing::info!("shutdown signal received, draining in-flight jobs");
    stopping.store(true, Ordering::Relaxed);

    let drain = async {
        for handle in handles {
            let _ = handle.await;
        }
    };
    if tokio::time::timeout(DRAIN_TIMEOUT, drain).await.is_err() {
        tracing::warn!("drain timeout elapsed, remaining jobs were aborted");
    }

    tracing::info!("mnemosyne-worker stopped");
    Ok(())
}

async fn build_stores(config: &AppConfig) -> Result<Stores> {
    let relational = RelationalStore::open(&config.storage.relational_root)
        .context("opening relational store")?;

    let graph_conn = Arc::new(
        lancedb::connect(&config.storage.graph_path)
            .execute()
            .await
            .context("connecting to graph store")?,
    );
    let graph = GraphStore::new(graph_conn).await.context("initializing graph store")?;

    let vector = VectorStore::connect(&config.storage.vector_path, config.storage.vector_dim)
        .await
        .context("connecting to vector store")?;

    let broker = RedisJobBroker::connect(&config.redis).await.context("connecting job broker")?;
    let cache = PromptSectionCache::connect(&config.redis).await.context("connecting prompt cache")?;

    let api_key = config
        .llm
        .active_key()
        .context("no LLM API key configured for the active provider")?;
    let llm: Arc<dyn LlmClient> = Arc::new(GeminiClient::new(
        api_key,
        config.llm.synthesis_model.clone(),
        config.llm.embedding_model.clone(),
    ));

    let reducer = ReducerClient::new(config.reducer.url.clone());

    Ok(Stores {
        relational,
        graph,
        vector,
        broker,
        cache,
        llm,
        reducer,
        config: config.clone(),
    })
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install CTRL+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
