//! Scheduler (spec §4.8): four periodic scans on a shared timeline plus the
//! embedding-backfill worker, a process-local retry queue with exponential
//! backoff, and the `failed-reminders.jsonl` dead-letter-style sink.
//!
//! Grounded on the teacher's `services::init::spawn_background_workers`
//! pattern: one `tokio::spawn` per periodic task, each holding its own
//! `broadcast::Receiver<()>` and racing its sleep against a shutdown signal.

mod failed_reminders;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;

use crate::config::{BackupConfig, PathsConfig, SchedulerConfig};
use crate::db::Event;
use crate::domain::PopupKind;
use crate::llm::LlmClient;
use crate::popup;
use crate::store::DocumentStore;
use crate::transport::Transport;

pub use failed_reminders::FailedReminderLog;

const TIME_TRIGGER_KINDS: [&str; 7] = [
    "time_24h",
    "time_1h",
    "time_15m",
    "reminder_24h",
    "reminder_1hr",
    "reminder_15m",
    "time",
];

const REMINDER_ELIGIBLE_STATUSES: [&str; 4] = ["pending", "scheduled", "discovered", "reminded"];

#[derive(Debug, Clone)]
enum MarkAction {
    TriggerFired(i64),
    TransitionStatus { event_id: i64, new_status: &'static str },
}

#[derive(Debug, Clone)]
struct RetryItem {
    event_id: i64,
    event_title: String,
    trigger_type: String,
    attempt: usize,
    next_retry_at: i64,
    mark: MarkAction,
}

pub struct Scheduler {
    store: Arc<DocumentStore>,
    llm: Arc<LlmClient>,
    transport: Arc<Transport>,
    config: SchedulerConfig,
    backup_config: BackupConfig,
    paths: PathsConfig,
    retry_queue: Mutex<VecDeque<RetryItem>>,
    failed_reminders: Arc<FailedReminderLog>,
    failed_reminder_count: AtomicI64,
}

impl Scheduler {
    pub fn new(
        store: Arc<DocumentStore>,
        llm: Arc<LlmClient>,
        transport: Arc<Transport>,
        config: SchedulerConfig,
        backup_config: BackupConfig,
        paths: PathsConfig,
    ) -> Arc<Self> {
        let failed_reminders = Arc::new(FailedReminderLog::new(&paths.failed_reminders_path));
        Arc::new(Self {
            store,
            llm,
            transport,
            config,
            backup_config,
            paths,
            retry_queue: Mutex::new(VecDeque::new()),
            failed_reminders,
            failed_reminder_count: AtomicI64::new(0),
        })
    }

    /// Snapshot for `GET /api/health` (spec §6): `{retryQueueSize, failedReminderCount}`.
    pub async fn health_snapshot(&self) -> serde_json::Value {
        serde_json::json!({
            "retryQueueSize": self.retry_queue.lock().await.len(),
            "failedReminderCount": self.failed_reminder_count.load(Ordering::SeqCst),
        })
    }

    pub fn spawn(self: Arc<Self>, shutdown: broadcast::Sender<()>) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();

        {
            let scheduler = self.clone();
            let mut shutdown_rx = shutdown.subscribe();
            let period = std::time::Duration::from_secs(scheduler.config.time_triggers_period_sec);
            handles.push(tokio::spawn(async move {
                loop {
                    scheduler.run_time_triggers().await;
                    tokio::select! {
                        _ = shutdown_rx.recv() => { tracing::info!("scheduler: time-triggers task shutting down"); break; }
                        _ = tokio::time::sleep(period) => {}
                    }
                }
            }));
        }

        {
            let scheduler = self.clone();
            let mut shutdown_rx = shutdown.subscribe();
            let period = std::time::Duration::from_secs(scheduler.config.due_reminders_period_sec);
            handles.push(tokio::spawn(async move {
                loop {
                    scheduler.drain_retry_queue().await;
                    scheduler.run_due_reminders().await;
                    tokio::select! {
                        _ = shutdown_rx.recv() => { tracing::info!("scheduler: due-reminders task shutting down"); break; }
                        _ = tokio::time::sleep(period) => {}
                    }
                }
            }));
        }

        {
            let scheduler = self.clone();
            let mut shutdown_rx = shutdown.subscribe();
            let period = std::time::Duration::from_secs(scheduler.config.snooze_expiry_period_sec);
            handles.push(tokio::spawn(async move {
                loop {
                    scheduler.run_snooze_expiry().await;
                    tokio::select! {
                        _ = shutdown_rx.recv() => { tracing::info!("scheduler: snooze-expiry task shutting down"); break; }
                        _ = tokio::time::sleep(period) => {}
                    }
                }
            }));
        }

        {
            let scheduler = self.clone();
            let mut shutdown_rx = shutdown.subscribe();
            let first_delay = std::time::Duration::from_secs(scheduler.backup_config.daily_snapshot_first_run_delay_sec);
            handles.push(tokio::spawn(async move {
                tokio::select! {
                    _ = shutdown_rx.recv() => { return; }
                    _ = tokio::time::sleep(first_delay) => {}
                }
                loop {
                    scheduler.run_daily_snapshot().await;
                    tokio::select! {
                        _ = shutdown_rx.recv() => { tracing::info!("scheduler: daily-snapshot task shutting down"); break; }
                        _ = tokio::time::sleep(std::time::Duration::from_secs(24 * 60 * 60)) => {}
                    }
                }
            }));
        }

        {
            let scheduler = self.clone();
            let mut shutdown_rx = shutdown.subscribe();
            let period = std::time::Duration::from_secs(scheduler.config.embedding_backfill_period_sec);
            handles.push(tokio::spawn(async move {
                loop {
                    scheduler.run_embedding_backfill().await;
                    tokio::select! {
                        _ = shutdown_rx.recv() => { tracing::info!("scheduler: embedding-backfill task shutting down"); break; }
                        _ = tokio::time::sleep(period) => {}
                    }
                }
            }));
        }

        handles
    }

    /// spec §4.8 row 1: unfired triggers due within the lookahead window.
    async fn run_time_triggers(&self) {
        let lookahead = Utc::now() + chrono::Duration::seconds(self.config.trigger_lookahead_sec);
        let triggers = self.store.unfired_triggers_due(&TIME_TRIGGER_KINDS, lookahead).await;

        for trigger in triggers {
            let Some(event) = self.store.get_event(trigger.event_id).await else {
                self.store.mark_trigger_fired(trigger.id).await;
                continue;
            };
            if !REMINDER_ELIGIBLE_STATUSES.contains(&event.status.as_str()) {
                self.store.mark_trigger_fired(trigger.id).await;
                continue;
            }

            if self.deliver_reminder(&event, PopupKind::EventReminder).await {
                self.store.mark_trigger_fired(trigger.id).await;
            } else {
                self.enqueue_retry(&event, &trigger.trigger_type, MarkAction::TriggerFired(trigger.id)).await;
            }
        }
    }

    /// spec §4.8 row 2: `scheduled` events whose `reminder_time` has passed.
    async fn run_due_reminders(&self) {
        let due = self.store.due_by_status("scheduled", Utc::now().timestamp()).await;
        for event in due {
            if self.deliver_reminder(&event, PopupKind::EventReminder).await {
                self.store.set_event_status(event.id, "reminded").await;
            } else {
                self.enqueue_retry(
                    &event,
                    "reminder",
                    MarkAction::TransitionStatus { event_id: event.id, new_status: "reminded" },
                )
                .await;
            }
        }
    }

    /// spec §4.8 row 3: `snoozed` events whose `reminder_time` has passed.
    async fn run_snooze_expiry(&self) {
        let due = self.store.due_by_status("snoozed", Utc::now().timestamp()).await;
        for event in due {
            if self.deliver_reminder(&event, PopupKind::SnoozeReminder).await {
                self.store.set_event_status(event.id, "discovered").await;
            } else {
                self.enqueue_retry(
                    &event,
                    "snooze",
                    MarkAction::TransitionStatus { event_id: event.id, new_status: "discovered" },
                )
                .await;
            }
        }
    }

    /// spec §4.8 row 4: export every collection, prune stale snapshots.
    async fn run_daily_snapshot(&self) {
        let dir = std::path::Path::new(&self.paths.backups_dir);
        match crate::backup::export_snapshot(&self.store, "daily-snapshot").await {
            Ok(snapshot) => match crate::backup::write_snapshot_file(dir, &snapshot).await {
                Ok(path) => tracing::info!("scheduler: wrote daily snapshot to {}", path.display()),
                Err(e) => tracing::warn!("scheduler: failed to write daily snapshot: {e}"),
            },
            Err(e) => tracing::warn!("scheduler: failed to export daily snapshot: {e}"),
        }
        crate::backup::prune_old_backups(dir, self.backup_config.retention_days).await;
    }

    /// spec §4.10: up to `embedding_backfill_batch` events missing an
    /// embedding, computed silently — failures never reach the tier orchestrator.
    async fn run_embedding_backfill(&self) {
        let events = self.store.list_missing_embedding(self.config.embedding_backfill_batch).await;
        for event in events {
            let input = format!("{} {} {}", event.title, event.description.clone().unwrap_or_default(), event.keywords);
            if let Ok(vector) = self.llm.embed(&input).await {
                self.store.set_embedding(event.id, &vector).await;
            }
        }
    }

    /// Builds a reminder popup and broadcasts it; returns whether a client
    /// was present to accept the frame (spec §4.8 delivery = transport accepts).
    async fn deliver_reminder(&self, event: &Event, popup_kind: PopupKind) -> bool {
        let context = serde_json::json!({ "event": event });
        let blueprint = popup::generate(&self.llm, popup_kind, &context, Some(&event.title), event.description.as_deref()).await;
        let envelope = serde_json::json!({
            "type": "notification",
            "event": event,
            "popupType": popup_kind,
            "popup": blueprint,
        });
        self.transport.broadcast(&envelope).await
    }

    async fn enqueue_retry(&self, event: &Event, trigger_type: &str, mark: MarkAction) {
        let next_retry_at = Utc::now().timestamp() + self.config.retry_backoff_sec[0] as i64;
        let item = RetryItem {
            event_id: event.id,
            event_title: event.title.clone(),
            trigger_type: trigger_type.to_string(),
            attempt: 0,
            next_retry_at,
            mark,
        };
        self.retry_queue.lock().await.push_back(item);
    }

    /// Drains due items (spec §4.8: "drained inside the 30-s due-reminders
    /// loop"). A successful redelivery runs the item's mark action; a third
    /// consecutive failure writes to `failed-reminders.jsonl` instead of
    /// re-enqueuing (spec §8 invariant: no retry item has `attempt >= 3`).
    async fn drain_retry_queue(&self) {
        let now = Utc::now().timestamp();
        let due: Vec<RetryItem> = {
            let mut queue = self.retry_queue.lock().await;
            let mut due = Vec::new();
            let mut remaining = VecDeque::with_capacity(queue.len());
            for item in queue.drain(..) {
                if item.next_retry_at <= now {
                    due.push(item);
                } else {
                    remaining.push_back(item);
                }
            }
            *queue = remaining;
            due
        };

        for mut item in due {
            let Some(event) = self.store.get_event(item.event_id).await else {
                continue;
            };

            let delivered = self.deliver_reminder(&event, PopupKind::EventReminder).await;
            if delivered {
                self.apply_mark(&item.mark).await;
                continue;
            }

            item.attempt += 1;
            if item.attempt >= self.config.retry_backoff_sec.len() {
                self.failed_reminders
                    .append(item.event_id, &item.event_title, &item.trigger_type, item.attempt, "transport unavailable")
                    .await;
                self.failed_reminder_count.fetch_add(1, Ordering::SeqCst);
            } else {
                item.next_retry_at = now + self.config.retry_backoff_sec[item.attempt] as i64;
                self.retry_queue.lock().await.push_back(item);
            }
        }
    }

    async fn apply_mark(&self, mark: &MarkAction) {
        match mark {
            MarkAction::TriggerFired(trigger_id) => {
                self.store.mark_trigger_fired(*trigger_id).await;
            }
            MarkAction::TransitionStatus { event_id, new_status } => {
                self.store.set_event_status(*event_id, new_status).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> SchedulerConfig {
        SchedulerConfig {
            time_triggers_period_sec: 60,
            due_reminders_period_sec: 30,
            snooze_expiry_period_sec: 30,
            embedding_backfill_period_sec: 300,
            embedding_backfill_batch: 50,
            trigger_lookahead_sec: 300,
            retry_backoff_sec: [60, 300, 900],
            retry_max_attempts: 3,
        }
    }

    #[tokio::test]
    async fn retry_queue_reports_size_via_health_snapshot() {
        let pool = sqlx::sqlite::SqlitePoolOptions::new().connect("sqlite::memory:").await.unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        let dead_letter = Arc::new(crate::envelope::DeadLetterLog::new(
            std::env::temp_dir().join(format!("argus-sched-test-dl-{}.jsonl", uuid::Uuid::new_v4())),
        ));
        let store = Arc::new(DocumentStore::new(pool, dead_letter, false).await.unwrap());
        let llm = Arc::new(LlmClient::new("http://127.0.0.1:1".to_string(), String::new(), "chat".to_string(), "embed".to_string(), 8));
        let transport = Transport::new();
        let paths = PathsConfig {
            data_dir: std::env::temp_dir().to_string_lossy().to_string(),
            dead_letter_path: "dead-letter.jsonl".to_string(),
            failed_reminders_path: std::env::temp_dir()
                .join(format!("argus-sched-test-fr-{}.jsonl", uuid::Uuid::new_v4()))
                .to_string_lossy()
                .to_string(),
            backups_dir: "backups".to_string(),
        };
        let backup_config = BackupConfig { retention_days: 7, daily_snapshot_first_run_delay_sec: 60 };
        let scheduler = Scheduler::new(store, llm, transport, test_config(), backup_config, paths);

        let snapshot = scheduler.health_snapshot().await;
        assert_eq!(snapshot["retryQueueSize"], 0);
        assert_eq!(snapshot["failedReminderCount"], 0);
    }
}
