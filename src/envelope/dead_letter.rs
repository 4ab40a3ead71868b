use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

const ROTATE_AT_BYTES: u64 = 10 * 1024 * 1024;

#[derive(Serialize)]
struct DeadLetterRecord<'a> {
    timestamp: String,
    operation: &'a str,
    data: &'a serde_json::Value,
    error: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    stack: Option<&'a str>,
}

/// Append-only dead-letter log (spec §4.1). One JSON object per line; rotated
/// to `.old` (overwriting any previous `.old`) once the file exceeds 10MB.
/// The size check races with concurrent appends but that is tolerated per
/// spec §5 ("at most one spurious rotation").
pub struct DeadLetterLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl DeadLetterLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub async fn append(
        &self,
        operation: &str,
        data: &serde_json::Value,
        error: &str,
        stack: Option<&str>,
    ) {
        let record = DeadLetterRecord {
            timestamp: Utc::now().to_rfc3339(),
            operation,
            data,
            error,
            stack,
        };

        let line = match serde_json::to_string(&record) {
            Ok(l) => l,
            Err(e) => {
                tracing::error!("failed to serialize dead-letter record: {e}");
                return;
            }
        };

        let _guard = self.write_lock.lock().await;
        if let Err(e) = self.rotate_if_needed().await {
            tracing::warn!("dead-letter rotation check failed: {e}");
        }
        if let Err(e) = self.append_line(&line).await {
            tracing::error!("failed to write dead-letter entry: {e}");
        }
    }

    async fn append_line(&self, line: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await.ok();
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
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
    async fn appends_and_rotates() {
        let dir = std::env::temp_dir().join(format!("argus-dlq-test-{}", uuid::Uuid::new_v4()));
        let path = dir.join("dead-letter.jsonl");
        let log = DeadLetterLog::new(path.clone());

        log.append("store.insert", &serde_json::json!({"id": 1}), "boom", None)
            .await;

        let contents = fs::read_to_string(&path).await.unwrap();
        assert_eq!(contents.lines().count(), 1);
        assert!(contents.contains("store.insert"));

        fs::remove_dir_all(&dir).await.ok();
    }
}
