//! Trigger model (spec §3): immutable once fired.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Trigger {
    pub id: i64,
    pub event_id: i64,
    pub trigger_type: String,
    pub trigger_value: String,
    pub is_fired: bool,
    pub fire_count: i64,
}
