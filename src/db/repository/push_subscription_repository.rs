//! Push Subscription repository (spec §3): opaque tokens, no expiry logic in scope.

use sqlx::SqlitePool;

use crate::db::models::PushSubscription;

pub struct PushSubscriptionRepository;

impl PushSubscriptionRepository {
    pub async fn insert(pool: &SqlitePool, id: &str, token: &str, created_at: i64) -> Result<(), sqlx::Error> {
        sqlx::query("INSERT INTO push_subscriptions (id, token, created_at) VALUES (?1, ?2, ?3)")
            .bind(id)
            .bind(token)
            .bind(created_at)
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn export_all(pool: &SqlitePool) -> Result<Vec<PushSubscription>, sqlx::Error> {
        sqlx::query_as::<_, PushSubscription>(
            "SELECT id, token, created_at FROM push_subscriptions ORDER BY created_at ASC",
        )
        .fetch_all(pool)
        .await
    }
}
