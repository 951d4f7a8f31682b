pub mod broker;
pub mod cache;
pub mod coherence;
pub mod dedup;
pub mod llm;
pub mod ontology;
pub mod reducer;
pub mod retry;
pub mod storage;
pub mod workers;

pub use broker::{JobBroker, RedisJobBroker};
pub use cache::PromptSectionCache;
pub use llm::{GeminiClient, LlmClient};
pub use reducer::ReducerClient;
pub use storage::{GraphStore, RelationalStore, VectorStore};
pub use workers::Stores;
