//! `POST /api/webhook/*` (spec §6, §4.6): the bridge delivers every inbound
//! chat event here. Shape validation happens in axum's `Json` extractor; a
//! pipeline run exceeding its deadline is promoted to a 202 and finishes in
//! the background rather than holding the connection open (spec §7).

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};

use crate::ingestion::WebhookPayload;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/*path", post(ingest))
}

pub async fn ingest(State(app): State<Arc<AppState>>, Json(payload): Json<WebhookPayload>) -> impl IntoResponse {
    let deadline = Duration::from_millis(app.config.ingestion.pipeline_deadline_ms);
    let ingestion = app.ingestion.clone();
    let retry_payload = payload.clone();

    match tokio::time::timeout(deadline, ingestion.process_webhook(payload)).await {
        Ok(summary) => (StatusCode::OK, Json(summary)).into_response(),
        Err(_) => {
            tracing::warn!("webhook: pipeline deadline exceeded, continuing in background");
            let ingestion = app.ingestion.clone();
            tokio::spawn(async move {
                ingestion.process_webhook(retry_payload).await;
            });
            (StatusCode::ACCEPTED, Json(serde_json::json!({"accepted": true}))).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::extract::State;

    use super::*;
    use crate::ingestion::{WebhookData, WebhookKey, WebhookMessage};
    use crate::routes::test_support::{json_body, test_app_state};

    fn payload(event: &str, text: &str) -> WebhookPayload {
        WebhookPayload {
            event: event.to_string(),
            instance: Some("test-instance".to_string()),
            data: WebhookData {
                key: WebhookKey { remote_jid: "1555@s.whatsapp.net".to_string(), from_me: false, id: "wamid1".to_string() },
                push_name: Some("Jordan".to_string()),
                message: Some(WebhookMessage { conversation: Some(text.to_string()), extended_text_message: None }),
                message_timestamp: Some(chrono::Utc::now().timestamp()),
            },
        }
    }

    #[tokio::test]
    async fn non_upsert_events_are_skipped() {
        let app = test_app_state().await;
        let body = json_body(ingest(State(app), Json(payload("messages.update", "hi"))).await).await;
        assert_eq!(body["skipped"], true);
    }

    #[tokio::test]
    async fn upsert_events_run_through_the_pipeline() {
        let app = test_app_state().await;
        let body = json_body(ingest(State(app), Json(payload("messages.upsert", "call mom tomorrow at 5pm"))).await).await;
        assert_eq!(body["skipped"], false);
    }
}
