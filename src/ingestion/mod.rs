//! Ingestion Pipeline (spec §4.6): the single entry point `process_webhook`
//! that turns a bridge-delivered chat message into zero or more stored
//! events, a detected action on an existing one, or a pending confirmation.
//!
//! Grounded on the teacher's pattern of a thin webhook DTO deserialized by
//! axum's `Json` extractor (shape validation happens there, at the HTTP
//! layer) feeding a pipeline object that owns its own dependencies as `Arc`s.

use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cache::ResponseCache;
use crate::config::IngestionConfig;
use crate::db::Event;
use crate::domain::{
    ActionKind, ActionResult, EventCandidate, ProposedEvent, ProposedEventAction,
};
use crate::domain::{EventStatus, PopupKind};
use crate::envelope::EnvelopeError;
use crate::heuristics;
use crate::llm::LlmClient;
use crate::popup;
use crate::store::{DocumentStore, WRITE_FAILED_ID};
use crate::tier::{ProbeFuture, TierOrchestrator};
use crate::transport::Transport;

/// Webhook envelope (spec §6): `{event, instance, data:{key:{...}, pushName?,
/// message:{...}, messageTimestamp}}`.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookPayload {
    pub event: String,
    #[serde(default)]
    pub instance: Option<String>,
    pub data: WebhookData,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookData {
    pub key: WebhookKey,
    #[serde(default)]
    pub push_name: Option<String>,
    #[serde(default)]
    pub message: Option<WebhookMessage>,
    #[serde(default)]
    pub message_timestamp: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookKey {
    pub remote_jid: String,
    #[serde(default)]
    pub from_me: bool,
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookMessage {
    #[serde(default)]
    pub conversation: Option<String>,
    #[serde(default, rename = "extendedTextMessage")]
    pub extended_text_message: Option<ExtendedTextMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExtendedTextMessage {
    pub text: String,
}

impl WebhookMessage {
    fn text(&self) -> Option<&str> {
        self.conversation
            .as_deref()
            .filter(|s| !s.is_empty())
            .or_else(|| self.extended_text_message.as_ref().map(|m| m.text.as_str()))
    }
}

/// A newly-inserted event, paired with any conflicting events found at the
/// same time window (spec §4.6 step 7).
#[derive(Debug, Serialize)]
pub struct InsertedEvent {
    pub event: Event,
    pub conflicts: Vec<Event>,
}

/// A detected `modify` action, or a `modify`-intent proposed event, awaiting
/// client confirmation (spec §4.6 steps 5, 7).
#[derive(Debug, Clone, Serialize)]
pub struct PendingAction {
    pub target_event_id: i64,
    pub proposed_changes: Option<Value>,
}

/// Result of one `process_webhook` call (spec §4.6 step 8).
#[derive(Debug, Default, Serialize)]
pub struct IngestSummary {
    pub skipped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
    pub inserted_events: Vec<InsertedEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_performed: Option<ActionResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_action: Option<PendingAction>,
}

impl IngestSummary {
    fn skipped(reason: &str) -> Self {
        IngestSummary {
            skipped: true,
            skip_reason: Some(reason.to_string()),
            ..Default::default()
        }
    }

    fn action(result: ActionResult) -> Self {
        IngestSummary {
            action_performed: Some(result),
            ..Default::default()
        }
    }

    fn pending(pending: PendingAction) -> Self {
        IngestSummary {
            pending_action: Some(pending),
            ..Default::default()
        }
    }
}

enum ProposedOutcome {
    Inserted(InsertedEvent),
    Duplicate,
    Pending(PendingAction),
}

pub struct IngestionPipeline {
    store: Arc<DocumentStore>,
    llm: Arc<LlmClient>,
    tier: Arc<TierOrchestrator>,
    transport: Arc<Transport>,
    action_cache: ResponseCache<ActionResult>,
    analyze_cache: ResponseCache<Vec<ProposedEvent>>,
    config: IngestionConfig,
}

impl IngestionPipeline {
    pub fn new(
        store: Arc<DocumentStore>,
        llm: Arc<LlmClient>,
        tier: Arc<TierOrchestrator>,
        transport: Arc<Transport>,
        cache_max_size: usize,
        cache_ttl: std::time::Duration,
        config: IngestionConfig,
    ) -> Self {
        Self {
            store,
            llm,
            tier,
            transport,
            action_cache: ResponseCache::new(cache_max_size, cache_ttl),
            analyze_cache: ResponseCache::new(cache_max_size, cache_ttl),
            config,
        }
    }

    /// Action/analyze response-cache occupancy, for `/api/ai-status`.
    pub async fn cache_stats(&self) -> serde_json::Value {
        serde_json::json!({
            "action": {"size": self.action_cache.len().await, "capacity": self.action_cache.capacity()},
            "analyze": {"size": self.analyze_cache.len().await, "capacity": self.analyze_cache.capacity()},
        })
    }

    fn ping_probe(&self) -> impl Fn() -> ProbeFuture + Send + Sync + 'static {
        let llm = self.llm.clone();
        move || -> ProbeFuture {
            let llm = llm.clone();
            Box::pin(async move { llm.ping().await })
        }
    }

    /// §4.6 entry point. Shape validation and the 202-on-deadline behavior are
    /// the HTTP layer's responsibility; this assumes `payload` already parsed.
    pub async fn process_webhook(&self, payload: WebhookPayload) -> IngestSummary {
        if payload.event != "messages.upsert" {
            return IngestSummary::skipped("not a messages.upsert event");
        }

        let data = payload.data;
        if data.key.from_me && !self.config.process_own_messages {
            return IngestSummary::skipped("own-message processing disabled");
        }
        if self.config.skip_group_messages && is_group_jid(&data.key.remote_jid) {
            return IngestSummary::skipped("group message skipped");
        }

        let Some(content) = data
            .message
            .as_ref()
            .and_then(|m| m.text())
            .map(str::trim)
            .filter(|s| !s.is_empty())
        else {
            return IngestSummary::skipped("empty message content");
        };
        let content = content.to_string();

        let timestamp = data.message_timestamp.unwrap_or_else(|| Utc::now().timestamp());
        let now = Utc.timestamp_opt(timestamp, 0).single().unwrap_or_else(Utc::now);
        let sender_name = data.push_name.clone();

        self.store
            .save_message(
                &data.key.id,
                &data.key.remote_jid,
                &data.key.remote_jid,
                sender_name.as_deref(),
                &content,
                timestamp,
            )
            .await;

        if heuristics::is_quick_filter_noise(&content) {
            return IngestSummary::skipped("quick filter: noise");
        }

        let candidate_events = self.store.candidates_for_message(&content, self.config.hot_window_days).await;
        let candidates: Vec<EventCandidate> = candidate_events.iter().map(to_candidate).collect();

        if let Some(summary) = self.try_action(&content, &candidates).await {
            return summary;
        }

        let recent = self.store.recent_messages(&data.key.remote_jid, 5).await;
        let recent_context: Vec<String> = recent.into_iter().rev().map(|m| m.content).collect();

        let proposed = self.extract_events(&content, &recent_context, &candidates, now).await;

        let mut summary = IngestSummary::default();
        for event in proposed {
            match self
                .handle_proposed_event(event, &data.key.id, sender_name.as_deref(), now)
                .await
            {
                ProposedOutcome::Inserted(inserted) => summary.inserted_events.push(inserted),
                ProposedOutcome::Duplicate => {}
                ProposedOutcome::Pending(pending) => {
                    summary.pending_action.get_or_insert(pending);
                }
            }
        }
        summary
    }

    /// §4.6 step 5. Returns `Some` when the message resolved to a recognized
    /// action (the pipeline returns immediately, no extraction attempted).
    async fn try_action(&self, content: &str, candidates: &[EventCandidate]) -> Option<IngestSummary> {
        let cache_key = ResponseCache::<ActionResult>::key("detect_action", content);
        let cached = self.action_cache.get(cache_key).await;

        let llm = self.llm.clone();
        let message_t1 = content.to_string();
        let candidates_t1 = candidates.to_vec();
        let message_t2 = content.to_string();
        let candidates_t2 = candidates.to_vec();
        let probe = self.ping_probe();

        let result: ActionResult = self
            .tier
            .with_fallback(
                probe,
                move || async move { llm.detect_action(&message_t1, &candidates_t1).await },
                move || async move {
                    Ok::<ActionResult, EnvelopeError>(heuristics::detect_action(&message_t2, &candidates_t2))
                },
                move || cached.unwrap_or_else(ActionResult::none),
            )
            .await;

        self.action_cache.put(cache_key, result.clone()).await;

        if result.confidence < self.config.action_confidence_threshold {
            return None;
        }
        let target_id = result.target_event_id?;

        match result.action {
            ActionKind::Complete => {
                self.store.set_event_status(target_id, "completed").await;
                self.broadcast_action(&result, target_id).await;
                Some(IngestSummary::action(result))
            }
            ActionKind::Cancel => {
                self.store.set_event_status(target_id, "expired").await;
                self.broadcast_action(&result, target_id).await;
                Some(IngestSummary::action(result))
            }
            ActionKind::Ignore => {
                self.store.set_event_status(target_id, "ignored").await;
                self.broadcast_action(&result, target_id).await;
                Some(IngestSummary::action(result))
            }
            ActionKind::Postpone => {
                let minutes = result.snooze_minutes.unwrap_or(30);
                let reminder_time = (Utc::now() + ChronoDuration::minutes(minutes)).timestamp();
                self.store.snooze_event(target_id, reminder_time).await;
                self.broadcast_action(&result, target_id).await;
                Some(IngestSummary::action(result))
            }
            ActionKind::Modify => {
                let pending = PendingAction {
                    target_event_id: target_id,
                    proposed_changes: result.proposed_changes.clone(),
                };
                self.broadcast_update_confirm(target_id, &pending).await;
                Some(IngestSummary::pending(pending))
            }
            ActionKind::None => None,
        }
    }

    /// §4.6 step 6.
    async fn extract_events(
        &self,
        content: &str,
        recent_context: &[String],
        candidates: &[EventCandidate],
        now: DateTime<Utc>,
    ) -> Vec<ProposedEvent> {
        let cache_key = ResponseCache::<Vec<ProposedEvent>>::key("analyze", content);
        let cached = self.analyze_cache.get(cache_key).await;

        let llm = self.llm.clone();
        let message_t1 = content.to_string();
        let recent_t1 = recent_context.to_vec();
        let candidates_t1 = candidates.to_vec();
        let message_t2 = content.to_string();
        let probe = self.ping_probe();

        let result = self
            .tier
            .with_fallback(
                probe,
                move || async move { llm.analyze(&message_t1, &recent_t1, &candidates_t1, now).await },
                move || async move {
                    Ok::<Vec<ProposedEvent>, EnvelopeError>(heuristics::analyze(&message_t2, now).into_iter().collect())
                },
                move || cached.unwrap_or_default(),
            )
            .await;

        self.analyze_cache.put(cache_key, result.clone()).await;
        result
    }

    /// §4.6 step 7.
    async fn handle_proposed_event(
        &self,
        proposed: ProposedEvent,
        message_id: &str,
        sender_name: Option<&str>,
        now: DateTime<Utc>,
    ) -> ProposedOutcome {
        if proposed.event_action == ProposedEventAction::Modify {
            if let Some(target_id) = proposed.target_event_id {
                let pending = PendingAction {
                    target_event_id: target_id,
                    proposed_changes: serde_json::to_value(&proposed).ok(),
                };
                self.broadcast_update_confirm(target_id, &pending).await;
                return ProposedOutcome::Pending(pending);
            }
        }

        let since = (now - ChronoDuration::hours(self.config.dedup_window_hours)).timestamp();
        let duplicate_candidates = self.store.duplicate_candidates_since(since).await;
        if is_duplicate(&proposed.title, &duplicate_candidates) {
            return ProposedOutcome::Duplicate;
        }

        let context_url = derive_context_url(&proposed);
        let embed_input = format!(
            "{} {} {} {}",
            proposed.title,
            proposed.description.clone().unwrap_or_default(),
            proposed.keywords.join(" "),
            proposed.location.clone().unwrap_or_default(),
        );
        let embedding = self.llm.embed(&embed_input).await.ok();

        let event_time = proposed.event_time.map(|t| t.timestamp());
        let status = if event_time.map(|t| t > now.timestamp()).unwrap_or(false) {
            EventStatus::Scheduled
        } else {
            EventStatus::Discovered
        };

        let event = Event {
            id: 0,
            message_id: Some(message_id.to_string()),
            event_type: proposed.event_type.as_str().to_string(),
            title: proposed.title.clone(),
            description: proposed.description.clone(),
            location: proposed.location.clone(),
            keywords: proposed.keywords.join(","),
            participants: proposed.participants.clone(),
            event_time,
            reminder_time: None,
            embedding: None,
            context_url,
            status: status.as_str().to_string(),
            dismiss_count: 0,
            sender_name: sender_name.map(str::to_string),
            confidence: proposed.confidence,
            created_at: now.timestamp(),
        };

        let id = self.store.insert_event(event.clone()).await;
        if id == WRITE_FAILED_ID {
            return ProposedOutcome::Duplicate;
        }
        let mut event = event;
        event.id = id;

        if let Some(vector) = embedding {
            self.store.set_embedding(id, &vector).await;
        }

        if let (Some(event_time), EventStatus::Scheduled) = (event_time, status) {
            self.schedule_triggers(id, event_time, now).await;
            if let Some(refreshed) = self.store.get_event(id).await {
                event = refreshed;
            }
        }

        let conflicts = match event_time {
            Some(target_time) => self.store.conflicts_near(target_time, id).await,
            None => Vec::new(),
        };

        self.broadcast_discovery(&event, &conflicts).await;

        ProposedOutcome::Inserted(InsertedEvent { event, conflicts })
    }

    /// Creates the `{-24h,-1h,-15m}` triggers still in the future and sets
    /// `reminder_time` to the earliest of them (spec §3 invariant).
    async fn schedule_triggers(&self, event_id: i64, event_time: i64, now: DateTime<Utc>) {
        const OFFSETS: [(&str, i64); 3] = [("time_24h", 86_400), ("time_1h", 3_600), ("time_15m", 900)];
        let mut earliest: Option<i64> = None;

        for (kind, offset) in OFFSETS {
            let fire_at = event_time - offset;
            if fire_at > now.timestamp() {
                let value = Utc.timestamp_opt(fire_at, 0).single().unwrap_or(now).to_rfc3339();
                self.store.insert_trigger(event_id, kind, &value).await;
                earliest = Some(earliest.map_or(fire_at, |e| e.min(fire_at)));
            }
        }

        if let Some(reminder_time) = earliest {
            self.store.set_reminder_time(event_id, Some(reminder_time)).await;
        }
    }

    async fn broadcast_action(&self, result: &ActionResult, target_id: i64) {
        let event = self.store.get_event(target_id).await;
        let envelope = serde_json::json!({
            "type": "action_performed",
            "action": result.action,
            "event": event,
        });
        self.transport.broadcast(&envelope).await;
    }

    async fn broadcast_update_confirm(&self, target_id: i64, pending: &PendingAction) {
        let event = self.store.get_event(target_id).await;
        let context = serde_json::json!({ "event": event, "proposed_changes": pending.proposed_changes });
        let blueprint = popup::generate(&self.llm, PopupKind::UpdateConfirm, &context, None, None).await;
        let envelope = serde_json::json!({
            "type": "update_confirm",
            "event": event,
            "popupType": PopupKind::UpdateConfirm,
            "popup": blueprint,
        });
        self.transport.broadcast(&envelope).await;
    }

    async fn broadcast_discovery(&self, event: &Event, conflicts: &[Event]) {
        let popup_type = if conflicts.is_empty() {
            PopupKind::EventDiscovery
        } else {
            PopupKind::ConflictWarning
        };
        let context = serde_json::json!({ "event": event, "conflicts": conflicts });
        let blueprint = popup::generate(&self.llm, popup_type, &context, Some(&event.title), event.description.as_deref()).await;

        let envelope_type = if conflicts.is_empty() { "notification" } else { "conflict_warning" };
        let envelope = serde_json::json!({
            "type": envelope_type,
            "event": event,
            "conflicts": conflicts,
            "popupType": popup_type,
            "popup": blueprint,
        });
        self.transport.broadcast(&envelope).await;
    }
}

fn is_group_jid(remote_jid: &str) -> bool {
    remote_jid.ends_with("@g.us")
}

pub(crate) fn to_candidate(event: &Event) -> EventCandidate {
    EventCandidate {
        id: event.id,
        title: event.title.clone(),
        event_type: event.event_type.clone(),
        keywords: event.keywords.clone(),
        location: event.location.clone().unwrap_or_default(),
        description: event.description.clone().unwrap_or_default(),
        event_time: event.event_time,
    }
}

/// Lowercase first keyword that matches a known service/location, otherwise
/// lowercased location, otherwise null (spec §4.6 step 7).
fn derive_context_url(proposed: &ProposedEvent) -> Option<String> {
    proposed
        .keywords
        .iter()
        .map(|k| k.to_lowercase())
        .find(|k| heuristics::known_service_or_location(k))
        .or_else(|| proposed.location.clone().map(|l| l.to_lowercase()))
}

/// Case-folds and strips quote/dash punctuation (spec §3 duplicate rule).
fn normalize_title(title: &str) -> String {
    title
        .to_lowercase()
        .chars()
        .filter(|c| !matches!(c, '\'' | '\u{2019}' | '\u{2010}'..='\u{2015}'))
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Duplicate-suppression check (spec §3): equal, contained-by, or containing
/// normalized titles within the dedup window are duplicates. Titles of two
/// words or fewer on either side require exact equality.
fn is_duplicate(title: &str, active_events: &[Event]) -> bool {
    let normalized = normalize_title(title);
    let short = normalized.split_whitespace().count() <= 2;

    active_events.iter().any(|event| {
        let other = normalize_title(&event.title);
        let other_short = other.split_whitespace().count() <= 2;
        if short || other_short {
            normalized == other
        } else {
            normalized == other || normalized.contains(&other) || other.contains(&normalized)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event_with_title(title: &str) -> Event {
        Event {
            id: 1,
            message_id: None,
            event_type: "other".to_string(),
            title: title.to_string(),
            description: None,
            location: None,
            keywords: String::new(),
            participants: None,
            event_time: None,
            reminder_time: None,
            embedding: None,
            context_url: None,
            status: "discovered".to_string(),
            dismiss_count: 0,
            sender_name: None,
            confidence: 0.9,
            created_at: Utc::now().timestamp(),
        }
    }

    #[test]
    fn duplicate_ignores_quote_and_dash_variation() {
        let existing = vec![event_with_title("Goa Trip - Beach Visit")];
        assert!(is_duplicate("goa trip \u{2010} beach visit", &existing));
    }

    #[test]
    fn duplicate_requires_exact_match_for_short_titles() {
        let existing = vec![event_with_title("Gym")];
        assert!(!is_duplicate("Gym class", &existing));
        assert!(is_duplicate("gym", &existing));
    }

    #[test]
    fn non_duplicate_titles_pass_through() {
        let existing = vec![event_with_title("Netflix renewal")];
        assert!(!is_duplicate("Dentist appointment", &existing));
    }

    #[test]
    fn group_jid_detection() {
        assert!(is_group_jid("1234-5678@g.us"));
        assert!(!is_group_jid("1234567890@s.whatsapp.net"));
    }

    #[test]
    fn context_url_prefers_known_keyword_over_location() {
        let proposed = ProposedEvent {
            event_type: crate::domain::EventType::Subscription,
            title: "Netflix renewal".to_string(),
            description: None,
            event_time: None,
            location: Some("Downtown".to_string()),
            participants: None,
            keywords: vec!["netflix".to_string(), "renewal".to_string()],
            confidence: 0.9,
            event_action: ProposedEventAction::Create,
            target_event_id: None,
        };
        assert_eq!(derive_context_url(&proposed), Some("netflix".to_string()));
    }
}
