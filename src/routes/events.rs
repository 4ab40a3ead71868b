//! `/api/events*` and `/api/stats` (spec §6): CRUD, the popup-button state
//! transitions, and the day/status list views.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::routing::{delete, get, patch, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;

use crate::db::models::context_dismissal::DISMISSAL_WINDOW_SECONDS;
use crate::db::EventPatch;
use crate::domain::PopupKind;
use crate::error::{AppError, AppResult};
use crate::popup;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list))
        .route("/day/:timestamp", get(day))
        .route("/status/:status", get(by_status))
        .route("/:id", get(get_event).patch(patch_event).delete(delete_event))
        .route("/:id/complete", post(complete))
        .route("/:id/ignore", post(ignore))
        .route("/:id/set-reminder", post(set_reminder))
        .route("/:id/snooze", post(snooze))
        .route("/:id/dismiss", post(dismiss))
        .route("/:id/acknowledge", post(acknowledge))
        .route("/:id/confirm-update", post(confirm_update))
        .route("/:id/context-url", post(set_context_url))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

pub async fn list(State(app): State<Arc<AppState>>, Query(q): Query<ListQuery>) -> impl IntoResponse {
    let events = match &q.status {
        Some(status) => app.store.list_by_status(status, q.limit, q.offset).await,
        None => app.store.list_all(q.limit, q.offset).await,
    };
    Json(events)
}

pub async fn get_event(State(app): State<Arc<AppState>>, Path(id): Path<i64>) -> AppResult<impl IntoResponse> {
    let event = app.store.get_event(id).await.ok_or_else(|| AppError::NotFound(format!("event {id}")))?;
    Ok(Json(event))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPatchRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub keywords: Option<Vec<String>>,
    /// `Some(None)` clears the scheduled time; absent leaves it untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_time: Option<Option<i64>>,
}

pub async fn patch_event(
    State(app): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(body): Json<EventPatchRequest>,
) -> AppResult<impl IntoResponse> {
    app.store.get_event(id).await.ok_or_else(|| AppError::NotFound(format!("event {id}")))?;

    let patch = EventPatch {
        title: body.title,
        description: body.description,
        location: body.location,
        keywords: body.keywords.map(|k| k.join(",")),
        event_time: body.event_time,
    };
    if !app.store.update_event(id, &patch).await {
        return Err(AppError::Internal(anyhow::anyhow!("failed to update event {id}")));
    }

    let event = app.store.get_event(id).await.ok_or_else(|| AppError::NotFound(format!("event {id}")))?;
    broadcast_event(&app, "event_updated", &event, None).await;
    Ok(Json(event))
}

pub async fn delete_event(State(app): State<Arc<AppState>>, Path(id): Path<i64>) -> AppResult<impl IntoResponse> {
    let event = app.store.get_event(id).await.ok_or_else(|| AppError::NotFound(format!("event {id}")))?;
    if !app.store.delete_event(id).await {
        return Err(AppError::Internal(anyhow::anyhow!("failed to delete event {id}")));
    }
    broadcast_event(&app, "event_deleted", &event, None).await;
    Ok(Json(serde_json::json!({"deleted": true})))
}

pub async fn complete(State(app): State<Arc<AppState>>, Path(id): Path<i64>) -> AppResult<impl IntoResponse> {
    transition(&app, id, "completed", "event_completed").await
}

pub async fn ignore(State(app): State<Arc<AppState>>, Path(id): Path<i64>) -> AppResult<impl IntoResponse> {
    transition(&app, id, "ignored", "event_ignored").await
}

async fn transition(app: &Arc<AppState>, id: i64, status: &str, broadcast_kind: &str) -> AppResult<impl IntoResponse> {
    app.store.get_event(id).await.ok_or_else(|| AppError::NotFound(format!("event {id}")))?;
    if !app.store.set_event_status(id, status).await {
        return Err(AppError::Internal(anyhow::anyhow!("failed to transition event {id} to {status}")));
    }
    let event = app.store.get_event(id).await.ok_or_else(|| AppError::NotFound(format!("event {id}")))?;
    broadcast_event(app, broadcast_kind, &event, None).await;
    Ok(Json(event))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetReminderRequest {
    pub reminder_time: i64,
}

pub async fn set_reminder(
    State(app): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(body): Json<SetReminderRequest>,
) -> AppResult<impl IntoResponse> {
    app.store.get_event(id).await.ok_or_else(|| AppError::NotFound(format!("event {id}")))?;
    if !app.store.set_reminder_time(id, Some(body.reminder_time)).await {
        return Err(AppError::Internal(anyhow::anyhow!("failed to set reminder for event {id}")));
    }
    app.store.set_event_status(id, "scheduled").await;
    let event = app.store.get_event(id).await.ok_or_else(|| AppError::NotFound(format!("event {id}")))?;
    broadcast_event(&app, "event_scheduled", &event, None).await;
    Ok(Json(event))
}

#[derive(Debug, Deserialize)]
pub struct SnoozeQuery {
    #[serde(default = "default_snooze_minutes")]
    pub minutes: i64,
}

fn default_snooze_minutes() -> i64 {
    30
}

pub async fn snooze(
    State(app): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Query(q): Query<SnoozeQuery>,
) -> AppResult<impl IntoResponse> {
    app.store.get_event(id).await.ok_or_else(|| AppError::NotFound(format!("event {id}")))?;
    let reminder_time = (Utc::now() + chrono::Duration::minutes(q.minutes)).timestamp();
    if !app.store.snooze_event(id, reminder_time).await {
        return Err(AppError::Internal(anyhow::anyhow!("failed to snooze event {id}")));
    }
    let event = app.store.get_event(id).await.ok_or_else(|| AppError::NotFound(format!("event {id}")))?;
    broadcast_event(&app, "event_snoozed", &event, None).await;
    Ok(Json(event))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DismissRequest {
    #[serde(default)]
    pub url_pattern: Option<String>,
    #[serde(default)]
    pub permanent: bool,
}

/// Covers all three popup-button dismiss variants (`dismiss`, `dismiss-temp`,
/// `dismiss-permanent`): a permanent dismissal suppresses the context
/// reminder indefinitely, a temporary one for the standard 30-minute window.
pub async fn dismiss(
    State(app): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(body): Json<DismissRequest>,
) -> AppResult<impl IntoResponse> {
    let event = app.store.get_event(id).await.ok_or_else(|| AppError::NotFound(format!("event {id}")))?;
    let url_pattern = body.url_pattern.unwrap_or_else(|| event.context_url.clone().unwrap_or_default());
    let dismissed_until = if body.permanent {
        i64::MAX
    } else {
        Utc::now().timestamp() + DISMISSAL_WINDOW_SECONDS
    };
    app.store.dismiss_context(id, &url_pattern, dismissed_until).await;
    app.store.increment_dismiss_count(id).await;

    let event = app.store.get_event(id).await.ok_or_else(|| AppError::NotFound(format!("event {id}")))?;
    broadcast_event(&app, "event_dismissed", &event, None).await;
    Ok(Json(event))
}

pub async fn acknowledge(State(app): State<Arc<AppState>>, Path(id): Path<i64>) -> AppResult<impl IntoResponse> {
    let event = app.store.get_event(id).await.ok_or_else(|| AppError::NotFound(format!("event {id}")))?;
    broadcast_event(&app, "event_acknowledged", &event, None).await;
    Ok(Json(event))
}

/// Applies a previously-proposed modification (spec §4.6 step 5/7, REDESIGN
/// invariant: no automatic in-place overwrite before this call).
pub async fn confirm_update(
    State(app): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(body): Json<Value>,
) -> AppResult<impl IntoResponse> {
    app.store.get_event(id).await.ok_or_else(|| AppError::NotFound(format!("event {id}")))?;

    let patch = EventPatch {
        title: body.get("title").and_then(Value::as_str).map(str::to_string),
        description: body.get("description").and_then(Value::as_str).map(str::to_string),
        location: body.get("location").and_then(Value::as_str).map(str::to_string),
        keywords: body
            .get("keywords")
            .and_then(Value::as_array)
            .map(|arr| arr.iter().filter_map(Value::as_str).collect::<Vec<_>>().join(",")),
        event_time: body.get("eventTime").map(|v| v.as_i64()),
    };
    if !app.store.update_event(id, &patch).await {
        return Err(AppError::Internal(anyhow::anyhow!("failed to apply confirmed update to event {id}")));
    }

    let event = app.store.get_event(id).await.ok_or_else(|| AppError::NotFound(format!("event {id}")))?;
    broadcast_event(&app, "event_updated", &event, None).await;
    Ok(Json(event))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextUrlRequest {
    pub context_url: String,
}

pub async fn set_context_url(
    State(app): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(body): Json<ContextUrlRequest>,
) -> AppResult<impl IntoResponse> {
    app.store.get_event(id).await.ok_or_else(|| AppError::NotFound(format!("event {id}")))?;
    if !app.store.set_context_url(id, &body.context_url).await {
        return Err(AppError::Internal(anyhow::anyhow!("failed to set context url for event {id}")));
    }
    let event = app.store.get_event(id).await.ok_or_else(|| AppError::NotFound(format!("event {id}")))?;
    Ok(Json(event))
}

pub async fn day(State(app): State<Arc<AppState>>, Path(timestamp): Path<i64>) -> impl IntoResponse {
    let day_start = timestamp - (timestamp % 86_400);
    let day_end = day_start + 86_400;
    Json(app.store.list_for_day(day_start, day_end).await)
}

pub async fn by_status(State(app): State<Arc<AppState>>, Path(status): Path<String>) -> impl IntoResponse {
    Json(app.store.list_by_status(&status, 200, 0).await)
}

pub async fn stats(State(app): State<Arc<AppState>>) -> impl IntoResponse {
    Json(app.store.stats().await)
}

async fn broadcast_event(app: &Arc<AppState>, kind: &str, event: &crate::db::Event, popup_kind: Option<PopupKind>) {
    let popup = match popup_kind {
        Some(kind) => {
            let context = serde_json::json!({"event": event});
            Some(popup::generate(&app.llm, kind, &context, Some(&event.title), event.description.as_deref()).await)
        }
        None => None,
    };
    let envelope = serde_json::json!({
        "type": kind,
        "event": event,
        "popup": popup,
    });
    app.transport.broadcast(&envelope).await;
}

#[cfg(test)]
mod tests {
    use axum::extract::{Path, Query, State};
    use axum::Json;
    use chrono::Utc;

    use super::*;
    use crate::db::Event;
    use crate::routes::test_support::test_app_state;

    fn draft_event(title: &str) -> Event {
        Event {
            id: 0,
            message_id: None,
            event_type: "other".to_string(),
            title: title.to_string(),
            description: None,
            location: None,
            keywords: String::new(),
            participants: None,
            event_time: None,
            reminder_time: None,
            embedding: None,
            context_url: None,
            status: "discovered".to_string(),
            dismiss_count: 0,
            sender_name: None,
            confidence: 0.5,
            created_at: Utc::now().timestamp(),
        }
    }

    #[tokio::test]
    async fn patch_event_applies_partial_fields_and_broadcasts() {
        let app = test_app_state().await;
        let id = app.store.insert_event(draft_event("Dentist")).await;

        let body = EventPatchRequest {
            title: Some("Dentist appointment".to_string()),
            description: None,
            location: Some("Main St Clinic".to_string()),
            keywords: None,
            event_time: None,
        };
        let resp = patch_event(State(app.clone()), Path(id), Json(body)).await.unwrap().into_response();
        assert_eq!(resp.status(), http::StatusCode::OK);

        let stored = app.store.get_event(id).await.unwrap();
        assert_eq!(stored.title, "Dentist appointment");
        assert_eq!(stored.location.as_deref(), Some("Main St Clinic"));
    }

    #[tokio::test]
    async fn patch_event_missing_id_returns_not_found() {
        let app = test_app_state().await;
        let body = EventPatchRequest::default();
        let err = patch_event(State(app), Path(9999), Json(body)).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn dismiss_temporary_suppresses_within_the_window() {
        let app = test_app_state().await;
        let id = app.store.insert_event(draft_event("Flight check-in")).await;

        dismiss(State(app.clone()), Path(id), Json(DismissRequest { url_pattern: Some("airline.com".into()), permanent: false }))
            .await
            .unwrap();

        assert!(app.store.context_dismissal_active(id, "airline.com").await);
        assert_eq!(app.store.get_event(id).await.unwrap().dismiss_count, 1);
    }

    #[tokio::test]
    async fn dismiss_permanent_also_suppresses() {
        let app = test_app_state().await;
        let id = app.store.insert_event(draft_event("Newsletter")).await;
        app.store.set_context_url(id, "newsletter.example").await;

        dismiss(State(app.clone()), Path(id), Json(DismissRequest { url_pattern: None, permanent: true }))
            .await
            .unwrap();

        assert!(app.store.context_dismissal_active(id, "newsletter.example").await);
    }

    #[tokio::test]
    async fn snooze_moves_reminder_into_the_future() {
        let app = test_app_state().await;
        let id = app.store.insert_event(draft_event("Standup")).await;

        let before = Utc::now().timestamp();
        snooze(State(app.clone()), Path(id), Query(SnoozeQuery { minutes: 15 })).await.unwrap();

        let event = app.store.get_event(id).await.unwrap();
        let reminder = event.reminder_time.expect("reminder set");
        assert!(reminder >= before + 14 * 60);
        assert_eq!(event.status, "snoozed");
    }

    #[tokio::test]
    async fn set_reminder_transitions_status_to_scheduled() {
        let app = test_app_state().await;
        let id = app.store.insert_event(draft_event("Report due")).await;

        let target = Utc::now().timestamp() + 3600;
        set_reminder(State(app.clone()), Path(id), Json(SetReminderRequest { reminder_time: target })).await.unwrap();

        let event = app.store.get_event(id).await.unwrap();
        assert_eq!(event.reminder_time, Some(target));
        assert_eq!(event.status, "scheduled");
    }

    #[tokio::test]
    async fn complete_and_ignore_set_terminal_status() {
        let app = test_app_state().await;
        let id = app.store.insert_event(draft_event("Pay rent")).await;

        complete(State(app.clone()), Path(id)).await.unwrap();
        assert_eq!(app.store.get_event(id).await.unwrap().status, "completed");

        let id2 = app.store.insert_event(draft_event("Pay rent again")).await;
        ignore(State(app.clone()), Path(id2)).await.unwrap();
        assert_eq!(app.store.get_event(id2).await.unwrap().status, "ignored");
    }
}
