use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

const ROTATE_AT_BYTES: u64 = 10 * 1024 * 1024;

#[derive(Serialize)]
struct FailedReminderRecord<'a> {
    timestamp: String,
    #[serde(rename = "eventId")]
    event_id: i64,
    #[serde(rename = "eventTitle")]
    event_title: &'a str,
    #[serde(rename = "triggerType")]
    trigger_type: &'a str,
    attempts: usize,
    #[serde(rename = "lastError")]
    last_error: &'a str,
}

/// Append-only sink for retry-queue items that exhausted the backoff
/// schedule (spec §4.8). Same one-line-per-record, 10MB-rotate-to-`.old`
/// discipline as the error envelope's dead-letter log.
pub struct FailedReminderLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FailedReminderLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), write_lock: Mutex::new(()) }
    }

    pub async fn append(&self, event_id: i64, event_title: &str, trigger_type: &str, attempts: usize, last_error: &str) {
        let record = FailedReminderRecord {
            timestamp: Utc::now().to_rfc3339(),
            event_id,
            event_title,
            trigger_type,
            attempts,
            last_error,
        };
        let line = match serde_json::to_string(&record) {
            Ok(l) => l,
            Err(e) => {
                tracing::error!("failed to serialize failed-reminder record: {e}");
                return;
            }
        };

        let _guard = self.write_lock.lock().await;
        if let Err(e) = self.rotate_if_needed().await {
            tracing::warn!("failed-reminders rotation check failed: {e}");
        }
        if let Err(e) = self.append_line(&line).await {
            tracing::error!("failed to write failed-reminder entry: {e}");
        }
    }

    async fn append_line(&self, line: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await.ok();
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path).await?;
        file.write_all(line.as_bytes()).await?;
        file.write_all(b"\n").await?;
        Ok(())
    }

    async fn rotate_if_needed(&self) -> std::io::Result<()> {
        let size = match fs::metadata(&self.path).await {
            Ok(meta) => meta.len(),
            Err(_) => return Ok(()),
        };
        if size <= ROTATE_AT_BYTES {
            return Ok(());
        }
        let old_path = Self::old_path(&self.path);
        fs::rename(&self.path, &old_path).await
    }

    fn old_path(path: &Path) -> PathBuf {
        let mut old = path.as_os_str().to_owned();
        old.push(".old");
        PathBuf::from(old)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn appends_one_line_per_failure() {
        let path = std::env::temp_dir().join(format!("argus-failed-reminders-test-{}.jsonl", uuid::Uuid::new_v4()));
        let log = FailedReminderLog::new(path.clone());

        log.append(42, "Dentist appointment", "time_24h", 3, "transport unavailable").await;

        let contents = fs::read_to_string(&path).await.unwrap();
        assert_eq!(contents.lines().count(), 1);
        assert!(contents.contains("Dentist appointment"));

        fs::remove_file(&path).await.ok();
    }
}
