//! `GET /ws` (spec §4.9): upgrades to the sole duplex connection.

use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;

use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/", get(upgrade))
}

pub async fn upgrade(State(app): State<Arc<AppState>>, ws: WebSocketUpgrade) -> impl IntoResponse {
    let transport = app.transport.clone();
    ws.on_upgrade(move |socket| async move {
        transport.handle_connection(socket).await;
    })
}
