//! `/api/backup/*` (spec §4.8, §6): export, list, import and restore of the
//! daily JSON snapshot.

use std::path::Path as FsPath;
use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Path, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use crate::backup::{self, ImportMode};
use crate::error::{AppError, AppResult};
use crate::AppState;

const IMPORT_BODY_LIMIT: usize = 50 * 1024 * 1024;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/export", get(export))
        .route("/list", get(list))
        .route("/restore/:filename", post(restore))
        .route(
            "/import",
            post(import).layer(DefaultBodyLimit::max(IMPORT_BODY_LIMIT)),
        )
}

pub async fn export(State(app): State<Arc<AppState>>) -> AppResult<impl IntoResponse> {
    let snapshot = backup::export_snapshot(&app.store, "manual-export").await?;
    Ok(Json(snapshot))
}

pub async fn list(State(app): State<Arc<AppState>>) -> impl IntoResponse {
    let names = backup::list_backups(FsPath::new(&app.config.paths.backups_dir)).await;
    Json(serde_json::json!({"backups": names}))
}

#[derive(Debug, Deserialize)]
pub struct ImportRequest {
    pub backup: backup::BackupSnapshot,
    pub mode: String,
    #[serde(default)]
    pub indices: Option<Vec<String>>,
}

pub async fn import(State(app): State<Arc<AppState>>, Json(req): Json<ImportRequest>) -> AppResult<impl IntoResponse> {
    let mode = ImportMode::parse(&req.mode)
        .ok_or_else(|| AppError::BadRequest(format!("unknown import mode: {}", req.mode)))?;

    let counts = backup::import_snapshot(&app.store, &req.backup, mode, req.indices.as_deref()).await?;
    Ok(Json(serde_json::json!({"imported": counts})))
}

pub async fn restore(
    State(app): State<Arc<AppState>>,
    Path(filename): Path<String>,
) -> AppResult<impl IntoResponse> {
    backup::validate_backup_filename(&filename)?;
    let path = FsPath::new(&app.config.paths.backups_dir).join(&filename);
    let snapshot = backup::read_snapshot_file(&path).await?;
    let counts = backup::import_snapshot(&app.store, &snapshot, ImportMode::Merge, None).await?;
    Ok(Json(serde_json::json!({"restored": counts})))
}

#[cfg(test)]
mod tests {
    use axum::extract::State;
    use axum::Json;
    use chrono::Utc;

    use super::*;
    use crate::db::Event;
    use crate::routes::test_support::{json_body, test_app_state};

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
    async fn export_then_import_merges_events_into_a_fresh_store() {
        let source = test_app_state().await;
        source.store.insert_event(draft_event("Renew passport")).await;

        let exported = json_body(export(State(source)).await.unwrap()).await;
        let snapshot: backup::BackupSnapshot = serde_json::from_value(exported).unwrap();
        assert_eq!(snapshot.counts.events, 1);

        let target = test_app_state().await;
        let req = ImportRequest { backup: snapshot, mode: "merge".to_string(), indices: None };
        let result = json_body(import(State(target.clone()), Json(req)).await.unwrap()).await;
        assert_eq!(result["imported"]["events"], 1);

        let events = target.store.list_all(10, 0).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].title, "Renew passport");
    }

    #[tokio::test]
    async fn import_rejects_unknown_mode() {
        let app = test_app_state().await;
        let snapshot = backup::export_snapshot(&app.store, "test").await.unwrap();
        let req = ImportRequest { backup: snapshot, mode: "overwrite-everything".to_string(), indices: None };
        let err = import(State(app), Json(req)).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }
}
