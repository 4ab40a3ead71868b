//! `GET /api/health` and `GET /api/ai-status` (spec §6).

use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health))
        .route("/ai-status", get(ai_status))
}

pub async fn health(State(app): State<Arc<AppState>>) -> impl IntoResponse {
    let tier_status = app.tier.status().await;
    let scheduler_snapshot = app.scheduler.health_snapshot().await;
    let match_cache = app.context_matcher.cache_stats().await;

    Json(serde_json::json!({
        "status": "ok",
        "aiTier": tier_status.tier,
        "scheduler": scheduler_snapshot,
        "matchCache": match_cache,
    }))
}

pub async fn ai_status(State(app): State<Arc<AppState>>) -> impl IntoResponse {
    let status = app.tier.status().await;
    let cooldown_remaining_sec = status
        .cooldown_until
        .map(|until| (until - chrono::Utc::now()).num_seconds().max(0))
        .unwrap_or(0);
    let match_cache = app.context_matcher.cache_stats().await;
    let ingestion_cache = app.ingestion.cache_stats().await;

    Json(serde_json::json!({
        "mode": status.mode,
        "tier": status.tier,
        "consecutiveFailures": status.consecutive_failures,
        "cooldownRemainingSec": cooldown_remaining_sec,
        "cacheStats": {
            "matchCache": match_cache,
            "ingestion": ingestion_cache,
        },
    }))
}

#[cfg(test)]
mod tests {
    use axum::extract::State;

    use super::*;
    use crate::routes::test_support::{json_body, test_app_state};

    #[tokio::test]
    async fn health_reports_tier_scheduler_and_cache_stats() {
        let app = test_app_state().await;
        let body = json_body(health(State(app)).await).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["matchCache"]["size"], 0);
        assert!(body["matchCache"]["capacity"].is_number());
        assert!(body["scheduler"]["retryQueueSize"].is_number());
    }

    #[tokio::test]
    async fn ai_status_reflects_forced_mode_and_cache_stats() {
        let app = test_app_state().await;
        let body = json_body(ai_status(State(app)).await).await;
        assert_eq!(body["mode"], "force_t2");
        assert_eq!(body["tier"], "t1");
        assert_eq!(body["cacheStats"]["matchCache"]["size"], 0);
        assert_eq!(body["cacheStats"]["ingestion"]["action"]["size"], 0);
        assert_eq!(body["cacheStats"]["ingestion"]["analyze"]["size"], 0);
    }
}
