//! Push Subscription model (spec §3): opaque token.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PushSubscription {
    pub id: String,
    pub token: String,
    pub created_at: i64,
}
