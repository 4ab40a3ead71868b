//! `POST /api/context-check` (spec §6, §4.10): the client reports the page it
//! just navigated to; the matcher replies with any events that page relates
//! to. `contextTriggers`/`contextTriggersCount` restate `events` — no
//! dedicated `url`-kind trigger row is ever materialized (spec §3).

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;

use crate::context_matcher::MatchResult;
use crate::envelope::with_deadline;
use crate::AppState;

const CONTEXT_CHECK_DEADLINE: Duration = Duration::from_secs(15);

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/", post(check))
}

#[derive(Debug, Deserialize)]
pub struct ContextCheckRequest {
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
}

pub async fn check(State(app): State<Arc<AppState>>, Json(req): Json<ContextCheckRequest>) -> impl IntoResponse {
    let matcher = app.context_matcher.clone();
    let url = req.url.clone();
    let title = req.title.clone();
    let keywords = req.keywords.clone();

    let result = with_deadline(CONTEXT_CHECK_DEADLINE, async move {
        matcher.match_context(&url, title.as_deref(), &keywords).await
    })
    .await
    .unwrap_or(MatchResult { matched: false, events: Vec::new(), confidence: 0.0 });

    Json(serde_json::json!({
        "matched": result.matched,
        "confidence": result.confidence,
        "contextTriggersCount": result.events.len(),
        "contextTriggers": result.events.clone(),
        "events": result.events,
    }))
}

#[cfg(test)]
mod tests {
    use axum::extract::State;
    use axum::Json;
    use chrono::Utc;

    use super::*;
    use crate::db::Event;
    use crate::routes::test_support::{json_body, test_app_state};

    #[tokio::test]
    async fn no_match_returns_empty_trigger_list() {
        let app = test_app_state().await;
        let req = ContextCheckRequest {
            url: "https://example.com/unrelated".to_string(),
            title: None,
            keywords: vec![],
        };
        let body = json_body(check(State(app), Json(req)).await).await;
        assert_eq!(body["matched"], false);
        assert_eq!(body["contextTriggersCount"], 0);
        assert_eq!(body["contextTriggers"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn context_triggers_mirror_the_events_list() {
        let app = test_app_state().await;
        let event = Event {
            id: 0,
            message_id: None,
            event_type: "travel".to_string(),
            title: "Flight to Lisbon".to_string(),
            description: None,
            location: None,
            keywords: "flight,lisbon,airline.com".to_string(),
            participants: None,
            event_time: Some(Utc::now().timestamp() + 86_400),
            reminder_time: None,
            embedding: None,
            context_url: Some("https://airline.com/checkin".to_string()),
            status: "discovered".to_string(),
            dismiss_count: 0,
            sender_name: None,
            confidence: 0.8,
            created_at: Utc::now().timestamp(),
        };
        app.store.insert_event(event).await;

        let req = ContextCheckRequest {
            url: "https://airline.com/checkin".to_string(),
            title: Some("Check in for your flight".to_string()),
            keywords: vec!["flight".to_string(), "lisbon".to_string()],
        };
        let body = json_body(check(State(app), Json(req)).await).await;
        assert_eq!(body["matched"], true);
        let triggers_count = body["contextTriggersCount"].as_u64().unwrap();
        assert_eq!(triggers_count, 1);
        assert_eq!(triggers_count, body["contextTriggers"].as_array().unwrap().len() as u64);
        assert_eq!(body["events"], body["contextTriggers"]);
    }
}
