//! `POST /api/chat` (spec §6, §4.4): a free-form question about stored
//! events. A 30-second deadline bounds the LLM turn; expiry falls back to the
//! heuristic responder rather than failing the request (spec §7).

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;

use crate::domain::{ChatReply, ChatTurn};
use crate::envelope::{with_deadline, EnvelopeError};
use crate::heuristics;
use crate::ingestion::to_candidate;
use crate::tier::ProbeFuture;
use crate::AppState;

const CHAT_DEADLINE: Duration = Duration::from_secs(30);

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/", post(chat))
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub query: String,
    #[serde(default)]
    pub history: Vec<ChatTurn>,
}

pub async fn chat(State(app): State<Arc<AppState>>, Json(req): Json<ChatRequest>) -> impl IntoResponse {
    let now = Utc::now();
    let candidate_events = app.store.candidates_for_message(&req.query, app.config.ingestion.hot_window_days).await;
    let candidates = candidate_events.iter().map(to_candidate).collect::<Vec<_>>();

    let llm = app.llm.clone();
    let query_t1 = req.query.clone();
    let history_t1 = req.history.clone();
    let candidates_t1 = candidates.clone();
    let query_t2 = req.query.clone();
    let candidates_t2 = candidates.clone();
    let probe_llm = app.llm.clone();
    let probe = move || -> ProbeFuture {
        let llm = probe_llm.clone();
        Box::pin(async move { llm.ping().await })
    };

    let reply: ChatReply = app
        .tier
        .with_fallback(
            probe,
            move || async move { with_deadline(CHAT_DEADLINE, llm.chat(&query_t1, &history_t1, &candidates_t1)).await? },
            move || async move { Ok::<ChatReply, EnvelopeError>(heuristics::chat(&query_t2, &candidates_t2, now)) },
            move || heuristics::chat(&req.query, &candidates, now),
        )
        .await;

    Json(reply)
}

#[cfg(test)]
mod tests {
    use axum::extract::State;
    use axum::Json;

    use super::*;
    use crate::routes::test_support::{json_body, test_app_state};

    #[tokio::test]
    async fn chat_with_no_stored_events_returns_an_empty_event_list() {
        let app = test_app_state().await;
        let req = ChatRequest { query: "what's on my plate this week?".to_string(), history: Vec::new() };
        let body = json_body(chat(State(app), Json(req)).await).await;
        assert_eq!(body["events"].as_array().unwrap().len(), 0);
        assert!(!body["response"].as_str().unwrap().is_empty());
    }
}
