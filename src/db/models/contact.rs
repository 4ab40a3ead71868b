//! Contact model (spec §3).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Contact {
    pub jid: String,
    pub display_name: Option<String>,
    pub first_seen: i64,
    pub last_seen: i64,
    pub message_count: i64,
}
