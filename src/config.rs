use std::env;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub ai_tier: AiTierConfig,
    pub ingestion: IngestionConfig,
    pub scheduler: SchedulerConfig,
    pub backup: BackupConfig,
    pub paths: PathsConfig,
    pub rate_limit: RateLimitConfig,
    /// `safe_call` re-throws instead of swallowing when set (spec §6 `DEBUG_ERRORS`).
    pub debug_errors: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

/// Configuration for the outbound LLM provider: two RPCs (chat-completion, embedding).
#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: String,
    pub chat_model: String,
    pub embedding_model: String,
    pub embedding_dim: usize,
}

/// Tier Orchestrator configuration (spec §4.3 / §6).
#[derive(Debug, Clone, Deserialize)]
pub struct AiTierConfig {
    /// One of "auto", "force-t1", "force-t2", "force-t3".
    pub mode: String,
    pub cooldown_base_sec: u64,
    pub cache_ttl_sec: u64,
    pub cache_max_size: usize,
    pub health_probe_interval_sec: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IngestionConfig {
    pub process_own_messages: bool,
    pub skip_group_messages: bool,
    pub hot_window_days: i64,
    pub pipeline_deadline_ms: u64,
    pub dedup_window_hours: i64,
    pub action_confidence_threshold: f64,
}

/// Scheduler periods and retry-queue backoff (spec §4.8).
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    pub time_triggers_period_sec: u64,
    pub due_reminders_period_sec: u64,
    pub snooze_expiry_period_sec: u64,
    pub embedding_backfill_period_sec: u64,
    pub embedding_backfill_batch: i64,
    pub trigger_lookahead_sec: i64,
    pub retry_backoff_sec: [u64; 3],
    pub retry_max_attempts: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackupConfig {
    pub retention_days: i64,
    pub daily_snapshot_first_run_delay_sec: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PathsConfig {
    pub data_dir: String,
    pub dead_letter_path: String,
    pub failed_reminders_path: String,
    pub backups_dir: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    pub webhook_per_second: u32,
    pub webhook_burst: u32,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let debug_errors = match env::var("DEBUG_ERRORS") {
            Ok(v) => matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"),
            Err(_) => false,
        };

        Ok(Config {
            server: ServerConfig {
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("PORT")
                    .unwrap_or_else(|_| "3000".to_string())
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue("PORT".to_string()))?,
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL")
                    .unwrap_or_else(|_| "sqlite://data/argus.db".to_string()),
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .unwrap_or(5),
            },
            llm: LlmConfig {
                base_url: env::var("LLM_BASE_URL")
                    .unwrap_or_else(|_| "http://localhost:11434".to_string()),
                api_key: env::var("LLM_API_KEY").unwrap_or_default(),
                chat_model: env::var("LLM_CHAT_MODEL")
                    .unwrap_or_else(|_| "default-chat".to_string()),
                embedding_model: env::var("LLM_EMBEDDING_MODEL")
                    .unwrap_or_else(|_| "default-embedding".to_string()),
                embedding_dim: env::var("EMBEDDING_DIM")
                    .unwrap_or_else(|_| "768".to_string())
                    .parse()
                    .unwrap_or(768),
            },
            ai_tier: AiTierConfig {
                mode: env::var("AI_TIER_MODE").unwrap_or_else(|_| "auto".to_string()),
                cooldown_base_sec: env::var("AI_COOLDOWN_BASE_SEC")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()
                    .unwrap_or(30),
                cache_ttl_sec: env::var("AI_CACHE_TTL_SEC")
                    .unwrap_or_else(|_| "3600".to_string())
                    .parse()
                    .unwrap_or(3600),
                cache_max_size: env::var("AI_CACHE_MAX_SIZE")
                    .unwrap_or_else(|_| "500".to_string())
                    .parse()
                    .unwrap_or(500),
                health_probe_interval_sec: env::var("AI_HEALTH_PROBE_INTERVAL_SEC")
                    .unwrap_or_else(|_| "60".to_string())
                    .parse()
                    .unwrap_or(60),
            },
            ingestion: IngestionConfig {
                process_own_messages: match env::var("PROCESS_OWN_MESSAGES") {
                    Ok(v) => matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"),
                    Err(_) => true,
                },
                skip_group_messages: match env::var("SKIP_GROUP_MESSAGES") {
                    Ok(v) => matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"),
                    Err(_) => false,
                },
                hot_window_days: env::var("HOT_WINDOW_DAYS")
                    .unwrap_or_else(|_| "90".to_string())
                    .parse()
                    .unwrap_or(90),
                pipeline_deadline_ms: env::var("PIPELINE_DEADLINE_MS")
                    .unwrap_or_else(|_| "45000".to_string())
                    .parse()
                    .unwrap_or(45_000),
                dedup_window_hours: env::var("DEDUP_WINDOW_HOURS")
                    .unwrap_or_else(|_| "48".to_string())
                    .parse()
                    .unwrap_or(48),
                action_confidence_threshold: env::var("ACTION_CONFIDENCE_THRESHOLD")
                    .unwrap_or_else(|_| "0.5".to_string())
                    .parse()
                    .unwrap_or(0.5),
            },
            scheduler: SchedulerConfig {
                time_triggers_period_sec: env::var("SCHED_TIME_TRIGGERS_PERIOD_SEC")
                    .unwrap_or_else(|_| "60".to_string())
                    .parse()
                    .unwrap_or(60),
                due_reminders_period_sec: env::var("SCHED_DUE_REMINDERS_PERIOD_SEC")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()
                    .unwrap_or(30),
                snooze_expiry_period_sec: env::var("SCHED_SNOOZE_EXPIRY_PERIOD_SEC")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()
                    .unwrap_or(30),
                embedding_backfill_period_sec: env::var("SCHED_EMBEDDING_BACKFILL_PERIOD_SEC")
                    .unwrap_or_else(|_| "300".to_string())
                    .parse()
                    .unwrap_or(300),
                embedding_backfill_batch: env::var("SCHED_EMBEDDING_BACKFILL_BATCH")
                    .unwrap_or_else(|_| "50".to_string())
                    .parse()
                    .unwrap_or(50),
                trigger_lookahead_sec: env::var("SCHED_TRIGGER_LOOKAHEAD_SEC")
                    .unwrap_or_else(|_| "300".to_string())
                    .parse()
                    .unwrap_or(300),
                retry_backoff_sec: [60, 300, 900],
                retry_max_attempts: env::var("SCHED_RETRY_MAX_ATTEMPTS")
                    .unwrap_or_else(|_| "3".to_string())
                    .parse()
                    .unwrap_or(3),
            },
            backup: BackupConfig {
                retention_days: env::var("BACKUP_RETENTION_DAYS")
                    .unwrap_or_else(|_| "7".to_string())
                    .parse()
                    .unwrap_or(7),
                daily_snapshot_first_run_delay_sec: env::var("BACKUP_FIRST_RUN_DELAY_SEC")
                    .unwrap_or_else(|_| "60".to_string())
                    .parse()
                    .unwrap_or(60),
            },
            paths: PathsConfig {
                data_dir: env::var("DATA_DIR").unwrap_or_else(|_| "data".to_string()),
                dead_letter_path: env::var("DEAD_LETTER_PATH")
                    .unwrap_or_else(|_| "data/dead-letter.jsonl".to_string()),
                failed_reminders_path: env::var("FAILED_REMINDERS_PATH")
                    .unwrap_or_else(|_| "data/failed-reminders.jsonl".to_string()),
                backups_dir: env::var("BACKUPS_DIR").unwrap_or_else(|_| "data/backups".to_string()),
            },
            rate_limit: RateLimitConfig {
                webhook_per_second: env::var("RATE_LIMIT_WEBHOOK_PER_SECOND")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .unwrap_or(10),
                webhook_burst: env::var("RATE_LIMIT_WEBHOOK_BURST")
                    .unwrap_or_else(|_| "50".to_string())
                    .parse()
                    .unwrap_or(50),
            },
            debug_errors,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
            },
            database: DatabaseConfig {
                url: "sqlite://data/argus.db".to_string(),
                max_connections: 5,
            },
            llm: LlmConfig {
                base_url: "http://localhost:11434".to_string(),
                api_key: String::new(),
                chat_model: "default-chat".to_string(),
                embedding_model: "default-embedding".to_string(),
                embedding_dim: 768,
            },
            ai_tier: AiTierConfig {
                mode: "auto".to_string(),
                cooldown_base_sec: 30,
                cache_ttl_sec: 3600,
                cache_max_size: 500,
                health_probe_interval_sec: 60,
            },
            ingestion: IngestionConfig {
                process_own_messages: true,
                skip_group_messages: false,
                hot_window_days: 90,
                pipeline_deadline_ms: 45_000,
                dedup_window_hours: 48,
                action_confidence_threshold: 0.5,
            },
            scheduler: SchedulerConfig {
                time_triggers_period_sec: 60,
                due_reminders_period_sec: 30,
                snooze_expiry_period_sec: 30,
                embedding_backfill_period_sec: 300,
                embedding_backfill_batch: 50,
                trigger_lookahead_sec: 300,
                retry_backoff_sec: [60, 300, 900],
                retry_max_attempts: 3,
            },
            backup: BackupConfig {
                retention_days: 7,
                daily_snapshot_first_run_delay_sec: 60,
            },
            paths: PathsConfig {
                data_dir: "data".to_string(),
                dead_letter_path: "data/dead-letter.jsonl".to_string(),
                failed_reminders_path: "data/failed-reminders.jsonl".to_string(),
                backups_dir: "data/backups".to_string(),
            },
            rate_limit: RateLimitConfig {
                webhook_per_second: 10,
                webhook_burst: 50,
            },
            debug_errors: false,
        }
    }
}
