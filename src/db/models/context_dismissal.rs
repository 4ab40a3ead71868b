//! Context Dismissal model (spec §3): suppresses a context reminder for 30 minutes.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ContextDismissal {
    pub event_id: i64,
    pub url_pattern: String,
    pub dismissed_until: i64,
}

pub const DISMISSAL_WINDOW_SECONDS: i64 = 30 * 60;
