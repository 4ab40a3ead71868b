//! T2 deterministic fallbacks (spec §4.4): pure functions, no I/O, used when
//! the Tier Orchestrator has demoted calls away from the LLM. Mirrors the
//! teacher's habit of keeping anything reachable without a network call in a
//! small, fully-tested, synchronous module.

mod popup_templates;

pub use popup_templates::static_popup;

use std::collections::HashSet;

use chrono::{Datelike, Duration as ChronoDuration, NaiveTime, TimeZone, Timelike, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::domain::{ActionKind, ActionResult, ChatReply, EventCandidate, EventType, ProposedEvent, ProposedEventAction};

const GREETINGS: &[&str] = &[
    "hi", "hello", "hey", "ok", "okay", "thanks", "thank you", "bye", "yo", "sup",
];

const ACTION_VERBS: &[&str] = &[
    "cancel", "done", "ho gaya", "remind me", "complete", "finished", "ignore",
    "snooze", "postpone", "already",
];

const SUBSCRIPTION_SERVICES: &[&str] = &[
    "netflix", "spotify", "amazon prime", "hotstar", "disney+", "youtube premium",
    "apple music", "prime video", "hulu",
];

static WEEKDAY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(monday|tuesday|wednesday|thursday|friday|saturday|sunday)\b").unwrap()
});
static EXPLICIT_TIME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(\d{1,2})(?::(\d{2}))?\s*(am|pm)?\b").unwrap());
static LOCATION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:in|at)\s+([a-z0-9' ]{3,29})").unwrap());
static WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[a-z0-9]+").unwrap());

fn tokenize(s: &str) -> Vec<String> {
    WORD_RE
        .find_iter(&s.to_lowercase())
        .map(|m| m.as_str().to_string())
        .collect()
}

fn token_set(s: &str) -> HashSet<String> {
    tokenize(s).into_iter().collect()
}

fn overlap_count(a: &HashSet<String>, b: &HashSet<String>) -> usize {
    a.intersection(b).count()
}

/// §4.6 step 4 "Quick filter" — drops obvious noise (pure greetings, <5
/// chars) before the pipeline spends a tier call on it.
pub fn is_quick_filter_noise(trimmed: &str) -> bool {
    if trimmed.chars().count() < 5 {
        return true;
    }
    let lower = trimmed.to_lowercase();
    GREETINGS.iter().any(|g| lower == *g)
}

/// Known services/locations recognized for `context_url` derivation (spec
/// §4.6 step 7). Reuses the subscription-services list already maintained
/// for event classification.
pub fn known_service_or_location(keyword: &str) -> bool {
    SUBSCRIPTION_SERVICES.contains(&keyword)
}

/// §4.4 "Analyze" — zero or one extracted event from a raw message.
pub fn analyze(message: &str, now: chrono::DateTime<Utc>) -> Option<ProposedEvent> {
    let trimmed = message.trim();
    if trimmed.chars().count() < 5 {
        return None;
    }

    let lower = trimmed.to_lowercase();
    if GREETINGS.iter().any(|g| lower == *g) {
        return None;
    }
    if ACTION_VERBS.iter().any(|v| lower.contains(v)) {
        return None;
    }

    let event_type = classify(&lower);
    let event_time = resolve_date(&lower, now);
    let location = extract_location(&lower);
    let keywords = significant_keywords(&lower);

    Some(ProposedEvent {
        event_type,
        title: title_case_snippet(trimmed),
        description: None,
        event_time,
        location,
        participants: None,
        keywords,
        confidence: 0.95,
        event_action: ProposedEventAction::Create,
        target_event_id: None,
    })
}

fn classify(lower: &str) -> EventType {
    if SUBSCRIPTION_SERVICES.iter().any(|s| lower.contains(s)) {
        return EventType::Subscription;
    }
    if ["meet", "call", "dinner", "lunch", "interview"]
        .iter()
        .any(|k| lower.contains(k))
    {
        return EventType::Meeting;
    }
    if ["need to", "remember to", "don't forget", "dont forget"]
        .iter()
        .any(|k| lower.contains(k))
    {
        return EventType::Task;
    }
    if ["due", "deadline", "submit by"].iter().any(|k| lower.contains(k)) {
        return EventType::Deadline;
    }
    if ["remind", "reminder"].iter().any(|k| lower.contains(k)) {
        return EventType::Reminder;
    }
    if ["trip", "flight", "hotel", "go to", "visit", "travel"]
        .iter()
        .any(|k| lower.contains(k))
    {
        return EventType::Travel;
    }
    if ["try the", "you should", "recommend"].iter().any(|k| lower.contains(k)) {
        return EventType::Recommendation;
    }
    EventType::Other
}

/// Resolves date phrases to a concrete timestamp (spec §4.4 "Date resolution").
fn resolve_date(lower: &str, now: chrono::DateTime<Utc>) -> Option<chrono::DateTime<Utc>> {
    let default_hour = NaiveTime::from_hms_opt(10, 0, 0).unwrap();

    let mut base = if lower.contains("tomorrow") || lower.contains("kal") {
        Some(now.date_naive() + ChronoDuration::days(1))
    } else if lower.contains("today") || lower.contains("aaj") {
        Some(now.date_naive())
    } else if lower.contains("next week") {
        Some(now.date_naive() + ChronoDuration::days(7))
    } else if let Some(m) = WEEKDAY_RE.captures(lower) {
        let target = weekday_index(&m[1].to_lowercase());
        let today = now.weekday().num_days_from_monday() as i64;
        let mut delta = target - today;
        if delta <= 0 {
            delta += 7;
        }
        Some(now.date_naive() + ChronoDuration::days(delta))
    } else {
        None
    }?;

    let mut time = default_hour;
    let mut had_explicit_time = false;
    if let Some(cap) = EXPLICIT_TIME_RE.captures(lower) {
        if let Ok(mut hour) = cap[1].parse::<u32>() {
            let minute: u32 = cap.get(2).and_then(|m| m.as_str().parse().ok()).unwrap_or(0);
            let meridiem = cap.get(3).map(|m| m.as_str().to_lowercase());
            if meridiem.as_deref() == Some("pm") && hour < 12 {
                hour += 12;
            } else if meridiem.as_deref() == Some("am") && hour == 12 {
                hour = 0;
            }
            if hour < 24 && minute < 60 {
                time = NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(default_hour);
                had_explicit_time = true;
            }
        }
    }

    let naive = base.and_time(time);
    let mut resolved = Utc.from_utc_datetime(&naive);

    // Explicit times without an explicit day roll to tomorrow if already past.
    if had_explicit_time && resolved <= now && resolved.date_naive() == now.date_naive() {
        base += ChronoDuration::days(1);
        resolved = Utc.from_utc_datetime(&base.and_time(time));
    }

    Some(resolved)
}

fn weekday_index(name: &str) -> i64 {
    match name {
        "monday" => 0,
        "tuesday" => 1,
        "wednesday" => 2,
        "thursday" => 3,
        "friday" => 4,
        "saturday" => 5,
        _ => 6,
    }
}

fn extract_location(lower: &str) -> Option<String> {
    LOCATION_RE
        .captures(lower)
        .map(|c| c[1].trim().to_string())
        .filter(|s| (3..=29).contains(&s.len()))
}

fn significant_keywords(lower: &str) -> Vec<String> {
    tokenize(lower).into_iter().filter(|t| t.len() > 3).take(8).collect()
}

fn title_case_snippet(message: &str) -> String {
    let snippet: String = message.chars().take(80).collect();
    snippet
}

/// §4.4 "Detect action" — matches a free-text message against active-event
/// candidates the caller supplies.
pub fn detect_action(message: &str, candidates: &[EventCandidate]) -> ActionResult {
    let lower = message.to_lowercase();
    let message_tokens = token_set(&lower);

    let action = if ["cancel", "cancelled", "canceled"].iter().any(|k| lower.contains(k)) {
        ActionKind::Cancel
    } else if ["done", "completed", "finished", "ho gaya"].iter().any(|k| lower.contains(k)) {
        ActionKind::Complete
    } else if ["ignore", "dismiss"].iter().any(|k| lower.contains(k)) {
        ActionKind::Ignore
    } else if ["postpone", "snooze", "delay", "push back"].iter().any(|k| lower.contains(k)) {
        ActionKind::Postpone
    } else if ["change", "update", "modify", "reschedule"].iter().any(|k| lower.contains(k)) {
        ActionKind::Modify
    } else {
        ActionKind::None
    };

    if matches!(action, ActionKind::None) || candidates.is_empty() {
        return ActionResult::none();
    }

    let best = candidates
        .iter()
        .map(|c| {
            let haystack = format!("{} {}", c.title, c.keywords);
            let candidate_tokens = token_set(&haystack);
            (c.id, overlap_count(&message_tokens, &candidate_tokens))
        })
        .max_by_key(|(_, score)| *score);

    let Some((target_id, score)) = best else {
        return ActionResult::none();
    };
    if score == 0 {
        return ActionResult::none();
    }

    let snooze_minutes = matches!(action, ActionKind::Postpone).then(|| {
        if lower.contains("next week") {
            10_080
        } else if lower.contains("tomorrow") || lower.contains("kal") {
            1_440
        } else {
            30
        }
    });

    ActionResult {
        action,
        target_event_id: Some(target_id),
        confidence: 0.7,
        snooze_minutes,
        proposed_changes: None,
    }
}

/// §4.4 "Validate relevance" — indices of candidates whose text overlaps the
/// URL-derived keyword set by >= 30% or >= 2 tokens. Confidence capped at 0.6.
pub fn validate_relevance(url_keywords: &[String], candidates: &[EventCandidate]) -> Vec<usize> {
    let url_set: HashSet<String> = url_keywords.iter().map(|k| k.to_lowercase()).collect();
    if url_set.is_empty() {
        return Vec::new();
    }

    candidates
        .iter()
        .enumerate()
        .filter_map(|(idx, c)| {
            let haystack = format!("{} {} {} {}", c.title, c.keywords, c.location, c.description);
            let candidate_tokens = token_set(&haystack);
            let overlap = overlap_count(&url_set, &candidate_tokens);
            let ratio = overlap as f64 / url_set.len() as f64;
            (overlap >= 2 || ratio >= 0.3).then_some(idx)
        })
        .collect()
}

/// §4.4 "Chat" — scores events by token overlap with the query.
pub fn chat(query: &str, candidates: &[EventCandidate], now: chrono::DateTime<Utc>) -> ChatReply {
    let lower = query.to_lowercase();
    let query_tokens = token_set(&lower);

    let mut scored: Vec<(&EventCandidate, usize)> = candidates
        .iter()
        .map(|c| {
            let haystack = format!("{} {}", c.title, c.keywords);
            (c, overlap_count(&query_tokens, &token_set(&haystack)))
        })
        .filter(|(_, score)| *score > 0)
        .collect();
    scored.sort_by(|a, b| b.1.cmp(&a.1));

    let matched: Vec<EventCandidate> = if scored.is_empty() {
        if lower.contains("today") || lower.contains("this week") {
            let window_end = now + ChronoDuration::days(if lower.contains("this week") { 7 } else { 1 });
            candidates
                .iter()
                .filter(|c| {
                    c.event_time
                        .map(|t| {
                            let dt = Utc.timestamp_opt(t, 0).single().unwrap_or(now);
                            dt >= now && dt <= window_end
                        })
                        .unwrap_or(false)
                })
                .cloned()
                .collect()
        } else {
            Vec::new()
        }
    } else {
        scored.into_iter().map(|(c, _)| c.clone()).collect()
    };

    let response = if matched.is_empty() {
        "I couldn't find anything matching that in your events.".to_string()
    } else {
        let mut lines = vec!["Here's what I found:".to_string()];
        for event in &matched {
            lines.push(format!("- {} ({})", event.title, event.event_type));
        }
        lines.join("\n")
    };

    ChatReply { response, events: matched }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn candidate(id: i64, title: &str, keywords: &str) -> EventCandidate {
        EventCandidate {
            id,
            title: title.to_string(),
            event_type: "subscription".to_string(),
            keywords: keywords.to_string(),
            location: String::new(),
            description: String::new(),
            event_time: None,
        }
    }

    #[test]
    fn analyze_short_circuits_on_greeting() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 9, 0, 0).unwrap();
        assert!(analyze("hi", now).is_none());
        assert!(analyze("ok", now).is_none());
    }

    #[test]
    fn analyze_short_circuits_on_action_verb() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 9, 0, 0).unwrap();
        assert!(analyze("already cancelled netflix", now).is_none());
    }

    #[test]
    fn analyze_resolves_tomorrow_with_explicit_hour() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 9, 0, 0).unwrap();
        let event = analyze("lets meet tomorrow at 5pm", now).unwrap();
        let event_time = event.event_time.unwrap();
        assert_eq!(event_time.date_naive(), (now.date_naive() + ChronoDuration::days(1)));
        assert_eq!(event_time.hour(), 17);
        assert!(event.confidence <= 0.95);
    }

    #[test]
    fn analyze_classifies_subscription() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 9, 0, 0).unwrap();
        let event = analyze("I need to cancel my Netflix subscription soon", now);
        // "cancel" is an action verb, so this short-circuits to None per spec.
        assert!(event.is_none());
    }

    #[test]
    fn detect_action_picks_max_overlap_target() {
        let candidates = vec![
            candidate(1, "Netflix renewal", "netflix,subscription"),
            candidate(2, "Gym membership", "gym,fitness"),
        ];
        let result = detect_action("already cancelled netflix", &candidates);
        assert_eq!(result.action as u8, ActionKind::Cancel as u8);
        assert_eq!(result.target_event_id, Some(1));
    }

    #[test]
    fn detect_action_none_without_verb() {
        let candidates = vec![candidate(1, "Netflix renewal", "netflix")];
        let result = detect_action("what a nice day", &candidates);
        assert!(matches!(result.action, ActionKind::None));
    }

    #[test]
    fn validate_relevance_requires_overlap_threshold() {
        let candidates = vec![
            candidate(1, "Goa trip planning", "goa,travel,beach"),
            candidate(2, "Unrelated task", "laundry"),
        ];
        let keywords = vec!["goa".to_string(), "travel".to_string()];
        let hits = validate_relevance(&keywords, &candidates);
        assert_eq!(hits, vec![0]);
    }

    #[test]
    fn chat_scores_by_overlap() {
        let candidates = vec![
            candidate(1, "Netflix renewal", "netflix,subscription"),
            candidate(2, "Gym membership", "gym,fitness"),
        ];
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 9, 0, 0).unwrap();
        let reply = chat("tell me about netflix", &candidates, now);
        assert_eq!(reply.events.len(), 1);
        assert_eq!(reply.events[0].id, 1);
    }
}
