//! HTTP surface (spec §6): one `Router<Arc<AppState>>` per concern, merged
//! by `main.rs` under their respective paths.

pub mod backup;
pub mod chat;
pub mod context_check;
pub mod events;
pub mod form_check;
pub mod health;
pub mod webhook;
pub mod ws;

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;
    use std::time::Duration;

    use sqlx::sqlite::SqlitePoolOptions;

    use crate::config::Config;
    use crate::context_matcher::ContextMatcher;
    use crate::envelope::DeadLetterLog;
    use crate::ingestion::IngestionPipeline;
    use crate::llm::LlmClient;
    use crate::scheduler::Scheduler;
    use crate::store::DocumentStore;
    use crate::tier::{Mode, TierOrchestrator};
    use crate::transport::Transport;
    use crate::AppState;

    /// Builds an `AppState` wired the same way `main.rs` does, against an
    /// in-memory, freshly-migrated database. The LLM client points at a base
    /// URL nothing is listening on; tier mode is forced to `force-t2` so
    /// handler tests exercise the heuristic fallback deterministically
    /// (`with_fallback`'s t2 closure, never the network-backed t1 or the
    /// bare cache/default t3 floor) rather than racing a real network call.
    pub(crate) async fn test_app_state() -> Arc<AppState> {
        let pool = SqlitePoolOptions::new().connect("sqlite::memory:").await.unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();

        let dead_letter = Arc::new(DeadLetterLog::new(std::env::temp_dir().join(format!(
            "argus-routes-test-{}.jsonl",
            uuid::Uuid::new_v4()
        ))));
        let store = Arc::new(DocumentStore::new(pool, dead_letter, false).await.unwrap());

        let llm = Arc::new(LlmClient::new(
            "http://127.0.0.1:1".to_string(),
            String::new(),
            "test-chat".to_string(),
            "test-embed".to_string(),
            8,
        ));

        let tier = Arc::new(TierOrchestrator::new(
            Mode::parse("force-t2"),
            Duration::from_secs(30),
            Duration::from_secs(60),
        ));

        let transport = Transport::new();
        let config = Config::default();

        let ingestion = Arc::new(IngestionPipeline::new(
            store.clone(),
            llm.clone(),
            tier.clone(),
            transport.clone(),
            config.ai_tier.cache_max_size,
            Duration::from_secs(config.ai_tier.cache_ttl_sec),
            config.ingestion.clone(),
        ));

        let context_matcher = Arc::new(ContextMatcher::new(
            store.clone(),
            llm.clone(),
            tier.clone(),
            config.ai_tier.cache_max_size,
            config.ingestion.hot_window_days,
        ));

        let scheduler = Scheduler::new(
            store.clone(),
            llm.clone(),
            transport.clone(),
            config.scheduler.clone(),
            config.backup.clone(),
            config.paths.clone(),
        );

        Arc::new(AppState {
            store,
            llm,
            tier,
            transport,
            ingestion,
            context_matcher,
            scheduler,
            config,
        })
    }

    /// Drains an `impl IntoResponse` handler result into its JSON body, for
    /// handlers whose opaque return type can't be pattern-matched directly.
    pub(crate) async fn json_body(resp: impl axum::response::IntoResponse) -> serde_json::Value {
        use http_body_util::BodyExt;

        let body = resp.into_response().into_body();
        let bytes = body.collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }
}
