//! The five job/event consumers (§4.1-§4.5), each a linear sequence of I/O
//! steps with fan-out only at the end (§9 "Coroutine-style control flow").
//! `Stores` bundles the shared infrastructure handles each worker needs,
//! mirroring the teacher's `MemoroseEngine` aggregator but composed of the
//! independent store/client types built in `storage`/`broker`/`cache`/`llm`
//! rather than one monolithic struct.

pub mod card;
pub mod embedding;
pub mod graph_projection;
pub mod ingestion;
pub mod insight;

use crate::broker::RedisJobBroker;
use crate::cache::PromptSectionCache;
use crate::llm::LlmClient;
use crate::reducer::ReducerClient;
use crate::storage::{GraphStore, RelationalStore, VectorStore};
use mnemosyne_common::config::AppConfig;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

#[derive(Clone)]
pub struct Stores {
    pub relational: RelationalStore,
    pub graph: GraphStore,
    pub vector: VectorStore,
    pub broker: RedisJobBroker,
    pub cache: PromptSectionCache,
    pub llm: Arc<dyn LlmClient>,
    pub reducer: ReducerClient,
    pub config: AppConfig,
}

/// Poll interval for the broker's blocking pop; also the longest a
/// consumer task can take to notice a shutdown request (§5 "Suspension
/// points").
const POLL_TIMEOUT: Duration = Duration::from_secs(5);

/// Spawn `concurrency` consumer tasks pulling `J` jobs off `queue`,
/// invoking `handler` for each. Each task checks `stopping` before every
/// blocking pop, so once `stopping` is set no task starts a new job; it
/// may still be mid-handler for up to one in-flight job (the drain
/// timeout in `main` governs how long to wait before aborting those).
pub fn spawn_consumer<J, F, Fut>(
    broker: RedisJobBroker,
    queue: &'static str,
    concurrency: usize,
    stopping: Arc<AtomicBool>,
    handler: F,
) -> Vec<JoinHandle<()>>
where
    J: serde::de::DeserializeOwned + Send + 'static,
    F: Fn(J) -> Fut + Send + Sync + Clone + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    use crate::broker::JobBroker;

    (0..concurrency)
        .map(|_| {
            let broker = broker.clone();
            let stopping = stopping.clone();
            let handler = handler.clone();
            tokio::spawn(async move {
                loop {
                    if stopping.load(Ordering::Relaxed) {
                        break;
                    }
                    match broker.dequeue::<J>(queue, POLL_TIMEOUT).await {
                        Ok(Some(job)) => handler(job).await,
                        Ok(None) => {}
                        Err(e) => {
                            tracing::error!(queue, error = %e, "job broker dequeue failed");
                            tokio::time::sleep(Duration::from_secs(1)).await;
                        }
                    }
                }
            })
        })
        .collect()
}
