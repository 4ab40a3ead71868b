//! Contact repository (spec §3, §4.6 step 3): first-seen set on insert,
//! last-seen and message-count updated on each message.

use sqlx::SqlitePool;

use crate::db::models::Contact;

pub struct ContactRepository;

impl ContactRepository {
    pub async fn upsert(
        pool: &SqlitePool,
        jid: &str,
        display_name: Option<&str>,
        now: i64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO contacts (jid, display_name, first_seen, last_seen, message_count) \
             VALUES (?1, ?2, ?3, ?3, 1) \
             ON CONFLICT(jid) DO UPDATE SET \
                last_seen = ?3, \
                message_count = message_count + 1, \
                display_name = COALESCE(excluded.display_name, contacts.display_name)",
        )
        .bind(jid)
        .bind(display_name)
        .bind(now)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn get(pool: &SqlitePool, jid: &str) -> Result<Option<Contact>, sqlx::Error> {
        sqlx::query_as::<_, Contact>(
            "SELECT jid, display_name, first_seen, last_seen, message_count FROM contacts WHERE jid = ?1",
        )
        .bind(jid)
        .fetch_optional(pool)
        .await
    }

    pub async fn export_all(pool: &SqlitePool) -> Result<Vec<Contact>, sqlx::Error> {
        sqlx::query_as::<_, Contact>(
            "SELECT jid, display_name, first_seen, last_seen, message_count FROM contacts ORDER BY first_seen ASC",
        )
        .fetch_all(pool)
        .await
    }
}
