//! Backup Engine (spec §6): a single JSON snapshot of every collection,
//! written by the scheduler's daily-snapshot task and by `/api/backup/export`,
//! and read back by `/api/backup/import` and `/api/backup/restore/:filename`.
//!
//! Grounded on the store's own `export_all`-per-repository convention (spec
//! §4.5) for the read side; the write side mirrors the dead-letter log's
//! append/rotate discipline for on-disk file handling.

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::db::{
    Contact, ContactRepository, ContextDismissal, ContextDismissalRepository, Event,
    EventRepository, Message, MessageRepository, PushSubscription, PushSubscriptionRepository,
    Trigger, TriggerRepository,
};
use crate::error::AppError;
use crate::store::DocumentStore;

const VERSION: &str = "1.0";
const FILENAME_PREFIX: &str = "argus-backup-";
const FILENAME_SUFFIX: &str = ".json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportMode {
    Merge,
    Replace,
}

impl ImportMode {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "merge" => Some(ImportMode::Merge),
            "replace" => Some(ImportMode::Replace),
            _ => None,
        }
    }
}

/// `counts` is placed before `indices` in field order so the first ~400 bytes
/// of the serialized file suffice to read per-collection counts (spec §6).
#[derive(Debug, Serialize, Deserialize)]
pub struct BackupSnapshot {
    pub version: String,
    #[serde(rename = "exportedAt")]
    pub exported_at: String,
    pub source: String,
    pub counts: BackupCounts,
    pub indices: BackupIndices,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct BackupCounts {
    pub events: i64,
    pub messages: i64,
    pub triggers: i64,
    pub contacts: i64,
    #[serde(rename = "contextDismissals")]
    pub context_dismissals: i64,
    #[serde(rename = "pushSubscriptions")]
    pub push_subscriptions: i64,
}

/// Exported events are plain JSON values (via `Event::to_backup_json`, which
/// omits the embedding BLOB) rather than the `Event` struct itself.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct BackupIndices {
    pub events: Vec<serde_json::Value>,
    pub messages: Vec<Message>,
    pub triggers: Vec<Trigger>,
    pub contacts: Vec<Contact>,
    #[serde(rename = "contextDismissals")]
    pub context_dismissals: Vec<ContextDismissal>,
    #[serde(rename = "pushSubscriptions")]
    pub push_subscriptions: Vec<PushSubscription>,
}

const ALL_COLLECTIONS: [&str; 6] = [
    "events",
    "messages",
    "triggers",
    "contacts",
    "contextDismissals",
    "pushSubscriptions",
];

/// Recognized collection names for the `indices` selector on
/// `POST /api/backup/import` (spec §6).
pub fn valid_collection_names() -> &'static [&'static str] {
    &ALL_COLLECTIONS
}

fn wants(selected: Option<&[String]>, name: &str) -> bool {
    selected.map(|s| s.iter().any(|x| x == name)).unwrap_or(true)
}

/// Exports every collection as a single snapshot (spec §4.8, §6). The
/// embedding field is never present on exported events.
pub async fn export_snapshot(store: &DocumentStore, source: &str) -> Result<BackupSnapshot, AppError> {
    let events = EventRepository::export_all(store.pool()).await?;
    let messages = MessageRepository::export_all(store.pool()).await?;
    let triggers = TriggerRepository::export_all(store.pool()).await?;
    let contacts = ContactRepository::export_all(store.pool()).await?;
    let context_dismissals = ContextDismissalRepository::export_all(store.pool()).await?;
    let push_subscriptions = PushSubscriptionRepository::export_all(store.pool()).await?;

    let counts = BackupCounts {
        events: events.len() as i64,
        messages: messages.len() as i64,
        triggers: triggers.len() as i64,
        contacts: contacts.len() as i64,
        context_dismissals: context_dismissals.len() as i64,
        push_subscriptions: push_subscriptions.len() as i64,
    };

    let indices = BackupIndices {
        events: events.iter().map(Event::to_backup_json).collect(),
        messages,
        triggers,
        contacts,
        context_dismissals,
        push_subscriptions,
    };

    Ok(BackupSnapshot {
        version: VERSION.to_string(),
        exported_at: Utc::now().to_rfc3339(),
        source: source.to_string(),
        counts,
        indices,
    })
}

/// Writes a snapshot to `dir/argus-backup-YYYY-MM-DD.json`, returning the
/// written path. Overwrites same-day backups (one snapshot per day, spec §4.8).
pub async fn write_snapshot_file(dir: &Path, snapshot: &BackupSnapshot) -> std::io::Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let filename = format!("{FILENAME_PREFIX}{}{FILENAME_SUFFIX}", Utc::now().format("%Y-%m-%d"));
    let path = dir.join(filename);
    let body = serde_json::to_vec_pretty(snapshot).unwrap_or_default();
    tokio::fs::write(&path, body).await?;
    Ok(path)
}

/// Deletes backup files under `dir` older than `retention_days` (spec §4.8).
pub async fn prune_old_backups(dir: &Path, retention_days: i64) {
    let Ok(mut entries) = tokio::fs::read_dir(dir).await else {
        return;
    };
    let cutoff = Utc::now() - chrono::Duration::days(retention_days);

    while let Ok(Some(entry)) = entries.next_entry().await {
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        let Some(date_str) = name
            .strip_prefix(FILENAME_PREFIX)
            .and_then(|s| s.strip_suffix(FILENAME_SUFFIX))
        else {
            continue;
        };
        let Ok(date) = chrono::NaiveDate::parse_from_str(date_str, "%Y-%m-%d") else {
            continue;
        };
        if date.and_hms_opt(0, 0, 0).unwrap().and_utc() < cutoff {
            if let Err(e) = tokio::fs::remove_file(entry.path()).await {
                tracing::warn!("backup: failed to prune {}: {e}", name);
            } else {
                tracing::info!("backup: pruned stale snapshot {}", name);
            }
        }
    }
}

/// Lists available backup filenames under `dir`, newest first.
pub async fn list_backups(dir: &Path) -> Vec<String> {
    let Ok(mut entries) = tokio::fs::read_dir(dir).await else {
        return Vec::new();
    };
    let mut names = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        if let Some(name) = entry.file_name().to_str() {
            if name.starts_with(FILENAME_PREFIX) && name.ends_with(FILENAME_SUFFIX) {
                names.push(name.to_string());
            }
        }
    }
    names.sort_by(|a, b| b.cmp(a));
    names
}

/// Validates a `GET /api/backup/restore/:filename` path segment against the
/// canonical naming scheme, rejecting traversal attempts (spec §6).
pub fn validate_backup_filename(filename: &str) -> Result<(), AppError> {
    let is_valid = filename.starts_with(FILENAME_PREFIX)
        && filename.ends_with(FILENAME_SUFFIX)
        && !filename.contains('/')
        && !filename.contains("..");
    if is_valid {
        let date_str = &filename[FILENAME_PREFIX.len()..filename.len() - FILENAME_SUFFIX.len()];
        if chrono::NaiveDate::parse_from_str(date_str, "%Y-%m-%d").is_ok() {
            return Ok(());
        }
    }
    Err(AppError::BadRequest(format!(
        "filename must match argus-backup-YYYY-MM-DD.json, got {filename}"
    )))
}

pub async fn read_snapshot_file(path: &Path) -> Result<BackupSnapshot, AppError> {
    let body = tokio::fs::read(path)
        .await
        .map_err(|e| AppError::NotFound(format!("backup file unreadable: {e}")))?;
    serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("malformed backup file: {e}")))
}

/// Restores `snapshot` into the store. In `Replace` mode the selected
/// collections are cleared first; in `Merge` mode rows that already exist
/// (by primary key) are left untouched. Counters are reseeded afterwards so
/// newly-ingested rows never collide with restored ids (spec §3 invariant).
pub async fn import_snapshot(
    store: &DocumentStore,
    snapshot: &BackupSnapshot,
    mode: ImportMode,
    selected: Option<&[String]>,
) -> Result<BackupCounts, AppError> {
    if mode == ImportMode::Replace {
        clear_selected(store.pool(), selected).await?;
    }

    let mut counts = BackupCounts::default();

    if wants(selected, "events") {
        for value in &snapshot.indices.events {
            if let Ok(event) = serde_json::from_value::<Event>(value.clone()) {
                if insert_or_ignore_event(store.pool(), &event).await.is_ok() {
                    counts.events += 1;
                }
            }
        }
    }
    if wants(selected, "messages") {
        for message in &snapshot.indices.messages {
            MessageRepository::upsert(
                store.pool(),
                &message.id,
                &message.chat_id,
                &message.sender,
                &message.content,
                message.timestamp,
                message.ingested_at,
            )
            .await?;
            counts.messages += 1;
        }
    }
    if wants(selected, "triggers") {
        for trigger in &snapshot.indices.triggers {
            if insert_or_ignore_trigger(store.pool(), trigger).await.is_ok() {
                counts.triggers += 1;
            }
        }
    }
    if wants(selected, "contacts") {
        for contact in &snapshot.indices.contacts {
            if insert_or_ignore_contact(store.pool(), contact).await.is_ok() {
                counts.contacts += 1;
            }
        }
    }
    if wants(selected, "contextDismissals") {
        for dismissal in &snapshot.indices.context_dismissals {
            ContextDismissalRepository::upsert(
                store.pool(),
                dismissal.event_id,
                &dismissal.url_pattern,
                dismissal.dismissed_until,
            )
            .await?;
            counts.context_dismissals += 1;
        }
    }
    if wants(selected, "pushSubscriptions") {
        for sub in &snapshot.indices.push_subscriptions {
            if insert_or_ignore_push_subscription(store.pool(), sub).await.is_ok() {
                counts.push_subscriptions += 1;
            }
        }
    }

    store.reseed_counters().await?;
    Ok(counts)
}

async fn clear_selected(pool: &sqlx::SqlitePool, selected: Option<&[String]>) -> Result<(), AppError> {
    let tables: &[(&str, &str)] = &[
        ("events", "events"),
        ("messages", "messages"),
        ("triggers", "triggers"),
        ("contacts", "contacts"),
        ("contextDismissals", "context_dismissals"),
        ("pushSubscriptions", "push_subscriptions"),
    ];
    for (name, table) in tables {
        if wants(selected, name) {
            sqlx::query(&format!("DELETE FROM {table}")).execute(pool).await?;
        }
    }
    Ok(())
}

async fn insert_or_ignore_event(pool: &sqlx::SqlitePool, event: &Event) -> Result<(), sqlx::Error> {
    match EventRepository::insert(pool, event).await {
        Ok(()) => Ok(()),
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Ok(()),
        Err(e) => Err(e),
    }
}

async fn insert_or_ignore_trigger(pool: &sqlx::SqlitePool, trigger: &Trigger) -> Result<(), sqlx::Error> {
    match TriggerRepository::insert(pool, trigger.id, trigger.event_id, &trigger.trigger_type, &trigger.trigger_value).await {
        Ok(()) => Ok(()),
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Ok(()),
        Err(e) => Err(e),
    }
}

async fn insert_or_ignore_contact(pool: &sqlx::SqlitePool, contact: &Contact) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO contacts (jid, display_name, first_seen, last_seen, message_count) \
         VALUES (?1, ?2, ?3, ?4, ?5) ON CONFLICT(jid) DO NOTHING",
    )
    .bind(&contact.jid)
    .bind(&contact.display_name)
    .bind(contact.first_seen)
    .bind(contact.last_seen)
    .bind(contact.message_count)
    .execute(pool)
    .await
    .map(|_| ())
}

async fn insert_or_ignore_push_subscription(
    pool: &sqlx::SqlitePool,
    sub: &PushSubscription,
) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO push_subscriptions (id, token, created_at) VALUES (?1, ?2, ?3) ON CONFLICT(id) DO NOTHING")
        .bind(&sub.id)
        .bind(&sub.token)
        .bind(sub.created_at)
        .execute(pool)
        .await
        .map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filename_validation_rejects_traversal() {
        assert!(validate_backup_filename("../../etc/passwd").is_err());
        assert!(validate_backup_filename("argus-backup-2026-07-29.json").is_ok());
        assert!(validate_backup_filename("argus-backup-not-a-date.json").is_err());
    }

    #[test]
    fn import_mode_parses_known_values_only() {
        assert_eq!(ImportMode::parse("merge"), Some(ImportMode::Merge));
        assert_eq!(ImportMode::parse("replace"), Some(ImportMode::Replace));
        assert_eq!(ImportMode::parse("nonsense"), None);
    }
}
