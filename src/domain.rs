//! Shared domain types produced and consumed across tiers (spec §3/§4.4/§4.6).
//!
//! Both the LLM client (T1) and the heuristic fallbacks (T2) return these same
//! shapes so `TierOrchestrator::with_fallback` can compose them uniformly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Meeting,
    Deadline,
    Reminder,
    Travel,
    Task,
    Subscription,
    Recommendation,
    Other,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Meeting => "meeting",
            EventType::Deadline => "deadline",
            EventType::Reminder => "reminder",
            EventType::Travel => "travel",
            EventType::Task => "task",
            EventType::Subscription => "subscription",
            EventType::Recommendation => "recommendation",
            EventType::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "meeting" => EventType::Meeting,
            "deadline" => EventType::Deadline,
            "reminder" => EventType::Reminder,
            "travel" => EventType::Travel,
            "task" => EventType::Task,
            "subscription" => EventType::Subscription,
            "recommendation" => EventType::Recommendation,
            _ => EventType::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Discovered,
    Scheduled,
    Snoozed,
    Ignored,
    Reminded,
    Completed,
    Expired,
    /// Legacy alias for `discovered` (spec §3).
    Pending,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Discovered => "discovered",
            EventStatus::Scheduled => "scheduled",
            EventStatus::Snoozed => "snoozed",
            EventStatus::Ignored => "ignored",
            EventStatus::Reminded => "reminded",
            EventStatus::Completed => "completed",
            EventStatus::Expired => "expired",
            EventStatus::Pending => "pending",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "discovered" => EventStatus::Discovered,
            "scheduled" => EventStatus::Scheduled,
            "snoozed" => EventStatus::Snoozed,
            "ignored" => EventStatus::Ignored,
            "reminded" => EventStatus::Reminded,
            "completed" => EventStatus::Completed,
            "expired" => EventStatus::Expired,
            _ => EventStatus::Pending,
        }
    }

    /// Events in this set are excluded from active search and duplicate detection.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EventStatus::Completed | EventStatus::Expired | EventStatus::Ignored
        )
    }

    /// Status set eligible for hybrid search / context matching (spec §4.5, §8 invariant 1).
    pub fn is_active_searchable(&self) -> bool {
        matches!(
            self,
            EventStatus::Pending | EventStatus::Scheduled | EventStatus::Discovered
        )
    }
}

/// Trigger kinds (spec §3, Open Question 2): all seven accepted on read, only
/// the canonical four (`Time24h`, `Time1h`, `Time15m`, `Url`) are ever written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerKind {
    Time24h,
    Time1h,
    Time15m,
    Url,
    /// Legacy aliases accepted on read only.
    LegacyTime,
    LegacyReminder24h,
    LegacyReminder1hr,
    LegacyReminder15m,
}

impl TriggerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerKind::Time24h => "time_24h",
            TriggerKind::Time1h => "time_1h",
            TriggerKind::Time15m => "time_15m",
            TriggerKind::Url => "url",
            TriggerKind::LegacyTime => "time",
            TriggerKind::LegacyReminder24h => "reminder_24h",
            TriggerKind::LegacyReminder1hr => "reminder_1hr",
            TriggerKind::LegacyReminder15m => "reminder_15m",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "time_24h" => TriggerKind::Time24h,
            "time_1h" => TriggerKind::Time1h,
            "time_15m" => TriggerKind::Time15m,
            "url" => TriggerKind::Url,
            "time" => TriggerKind::LegacyTime,
            "reminder_24h" => TriggerKind::LegacyReminder24h,
            "reminder_1hr" => TriggerKind::LegacyReminder1hr,
            "reminder_15m" => TriggerKind::LegacyReminder15m,
            _ => return None,
        })
    }

    /// Whether this kind participates in the time-triggers scan's offset table.
    pub fn offset_seconds(&self) -> Option<i64> {
        match self {
            TriggerKind::Time24h | TriggerKind::LegacyReminder24h => Some(86_400),
            TriggerKind::Time1h | TriggerKind::LegacyReminder1hr => Some(3_600),
            TriggerKind::Time15m | TriggerKind::LegacyReminder15m => Some(900),
            _ => None,
        }
    }
}

/// A candidate event handed to action-detection / event-extraction / chat, kept
/// narrow so prompts and heuristics only see what they need (spec §4.6 step 5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventCandidate {
    pub id: i64,
    pub title: String,
    pub event_type: String,
    pub keywords: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub event_time: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Complete,
    Cancel,
    Ignore,
    Postpone,
    Modify,
    None,
}

/// Output of action detection (spec §4.4 `detectAction`, §4.6 step 5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResult {
    pub action: ActionKind,
    pub target_event_id: Option<i64>,
    pub confidence: f64,
    /// Snooze duration in minutes, only meaningful for `Postpone`.
    #[serde(default)]
    pub snooze_minutes: Option<i64>,
    /// Proposed field changes, only meaningful for `Modify`.
    #[serde(default)]
    pub proposed_changes: Option<serde_json::Value>,
}

impl ActionResult {
    pub fn none() -> Self {
        ActionResult {
            action: ActionKind::None,
            target_event_id: None,
            confidence: 0.0,
            snooze_minutes: None,
            proposed_changes: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposedEventAction {
    Create,
    Modify,
}

/// Output of event extraction (spec §4.6 step 6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposedEvent {
    pub event_type: EventType,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    /// ISO-8601 or null; resolved to a unix timestamp by the caller.
    #[serde(default)]
    pub event_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub participants: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub confidence: f64,
    pub event_action: ProposedEventAction,
    #[serde(default)]
    pub target_event_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatReply {
    pub response: String,
    pub events: Vec<EventCandidate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PopupKind {
    EventDiscovery,
    EventReminder,
    ContextReminder,
    ConflictWarning,
    InsightCard,
    SnoozeReminder,
    UpdateConfirm,
    FormMismatch,
}

impl PopupKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PopupKind::EventDiscovery => "event_discovery",
            PopupKind::EventReminder => "event_reminder",
            PopupKind::ContextReminder => "context_reminder",
            PopupKind::ConflictWarning => "conflict_warning",
            PopupKind::InsightCard => "insight_card",
            PopupKind::SnoozeReminder => "snooze_reminder",
            PopupKind::UpdateConfirm => "update_confirm",
            PopupKind::FormMismatch => "form_mismatch",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaderClass {
    Discovery,
    Reminder,
    Context,
    Conflict,
    Insight,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PopupButton {
    pub text: String,
    pub action: String,
    pub style: String,
}

/// UI-independent popup record (spec §4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PopupBlueprint {
    pub icon: String,
    pub header_class: HeaderClass,
    pub title: String,
    pub subtitle: String,
    pub body: String,
    #[serde(default)]
    pub question: Option<String>,
    pub buttons: Vec<PopupButton>,
    pub popup_type: PopupKind,
}
