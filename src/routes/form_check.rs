//! `POST /api/form-check` (spec §6): the client reports a value a user just
//! typed into a form field so it can be checked against what was remembered
//! about that contact. No dedicated extraction component covers this in the
//! spec; the only grounded signal available is the stored `Contact` record,
//! so this compares a `name`-typed field against the contact's
//! `display_name` and otherwise reports no mismatch (there is nothing else
//! remembered to compare it to).

use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::Value;

use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/", post(check))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormCheckRequest {
    pub field_value: String,
    pub field_type: String,
    #[serde(default)]
    pub parsed: Value,
}

pub async fn check(State(app): State<Arc<AppState>>, Json(req): Json<FormCheckRequest>) -> impl IntoResponse {
    if req.field_type != "name" {
        return Json(serde_json::json!({"mismatch": false}));
    }

    let Some(jid) = req.parsed.get("jid").and_then(Value::as_str) else {
        return Json(serde_json::json!({"mismatch": false}));
    };

    let Some(contact) = app.store.get_contact(jid).await else {
        return Json(serde_json::json!({"mismatch": false}));
    };

    let remembered = contact.display_name.unwrap_or_default();
    let entered = req.field_value.trim();
    if remembered.trim().eq_ignore_ascii_case(entered) || remembered.trim().is_empty() {
        return Json(serde_json::json!({"mismatch": false}));
    }

    Json(serde_json::json!({
        "mismatch": true,
        "entered": entered,
        "remembered": remembered,
        "suggestion": remembered,
    }))
}

#[cfg(test)]
mod tests {
    use axum::extract::State;
    use axum::Json;

    use super::*;
    use crate::routes::test_support::{json_body, test_app_state};

    #[tokio::test]
    async fn flags_mismatch_against_remembered_display_name() {
        let app = test_app_state().await;
        app.store.save_message("m1", "chat1", "5551234@s.whatsapp.net", Some("Alex Rivera"), "hi", 1).await;

        let req = FormCheckRequest {
            field_value: "Alexandra R.".to_string(),
            field_type: "name".to_string(),
            parsed: serde_json::json!({"jid": "5551234@s.whatsapp.net"}),
        };
        let body = json_body(check(State(app), Json(req)).await).await;
        assert_eq!(body["mismatch"], true);
        assert_eq!(body["remembered"], "Alex Rivera");
    }

    #[tokio::test]
    async fn no_mismatch_when_names_match_case_insensitively() {
        let app = test_app_state().await;
        app.store.save_message("m2", "chat1", "5559876@s.whatsapp.net", Some("Sam Lee"), "hi", 1).await;

        let req = FormCheckRequest {
            field_value: "sam lee".to_string(),
            field_type: "name".to_string(),
            parsed: serde_json::json!({"jid": "5559876@s.whatsapp.net"}),
        };
        let body = json_body(check(State(app), Json(req)).await).await;
        assert_eq!(body["mismatch"], false);
    }

    #[tokio::test]
    async fn no_mismatch_for_non_name_fields() {
        let app = test_app_state().await;
        let req = FormCheckRequest {
            field_value: "anything".to_string(),
            field_type: "email".to_string(),
            parsed: serde_json::Value::Null,
        };
        let body = json_body(check(State(app), Json(req)).await).await;
        assert_eq!(body["mismatch"], false);
    }
}
