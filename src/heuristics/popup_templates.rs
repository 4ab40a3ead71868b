//! The eight static popup blueprints (spec §4.7), used as the T3 fallback when
//! LLM-generated popup copy is unavailable.

use crate::domain::{HeaderClass, PopupBlueprint, PopupButton, PopupKind};

fn button(text: &str, action: &str, style: &str) -> PopupButton {
    PopupButton {
        text: text.to_string(),
        action: action.to_string(),
        style: style.to_string(),
    }
}

/// Returns the static blueprint for `kind`. `title`/`body` are filled from the
/// caller's event when available, falling back to generic copy otherwise.
pub fn static_popup(kind: PopupKind, title: Option<&str>, body: Option<&str>) -> PopupBlueprint {
    let title = title.unwrap_or("Untitled").to_string();
    let body = body.map(|b| b.to_string());

    match kind {
        PopupKind::EventDiscovery => PopupBlueprint {
            icon: "sparkles".to_string(),
            header_class: HeaderClass::Discovery,
            title: "New event found".to_string(),
            subtitle: title,
            body: body.unwrap_or_else(|| "I picked this up from your conversation.".to_string()),
            question: None,
            buttons: vec![
                button("Set reminder", "set-reminder", "primary"),
                button("Dismiss", "dismiss", "secondary"),
            ],
            popup_type: kind,
        },
        PopupKind::EventReminder => PopupBlueprint {
            icon: "bell".to_string(),
            header_class: HeaderClass::Reminder,
            title: "Reminder".to_string(),
            subtitle: title,
            body: body.unwrap_or_else(|| "This is coming up soon.".to_string()),
            question: None,
            buttons: vec![
                button("Acknowledge", "acknowledge", "primary"),
                button("Snooze", "snooze", "secondary"),
                button("Complete", "complete", "secondary"),
            ],
            popup_type: kind,
        },
        PopupKind::ContextReminder => PopupBlueprint {
            icon: "map-pin".to_string(),
            header_class: HeaderClass::Context,
            title: "Related to this page".to_string(),
            subtitle: title,
            body: body.unwrap_or_else(|| "You have a saved note relevant here.".to_string()),
            question: None,
            buttons: vec![
                button("View", "view-day", "primary"),
                button("Dismiss for now", "dismiss-temp", "secondary"),
                button("Don't show again", "dismiss-permanent", "secondary"),
            ],
            popup_type: kind,
        },
        PopupKind::ConflictWarning => PopupBlueprint {
            icon: "alert-triangle".to_string(),
            header_class: HeaderClass::Conflict,
            title: "Scheduling conflict".to_string(),
            subtitle: title,
            body: body.unwrap_or_else(|| "This overlaps with another event.".to_string()),
            question: None,
            buttons: vec![
                button("Keep both", "acknowledge", "primary"),
                button("Dismiss", "dismiss", "secondary"),
            ],
            popup_type: kind,
        },
        PopupKind::InsightCard => PopupBlueprint {
            icon: "lightbulb".to_string(),
            header_class: HeaderClass::Insight,
            title: "Heads up".to_string(),
            subtitle: title,
            body: body.unwrap_or_else(|| "Here's something you might find useful.".to_string()),
            question: None,
            buttons: vec![button("Got it", "acknowledge", "primary")],
            popup_type: kind,
        },
        PopupKind::SnoozeReminder => PopupBlueprint {
            icon: "clock".to_string(),
            header_class: HeaderClass::Reminder,
            title: "Snoozed reminder".to_string(),
            subtitle: title,
            body: body.unwrap_or_else(|| "This reminder is back.".to_string()),
            question: None,
            buttons: vec![
                button("Acknowledge", "acknowledge", "primary"),
                button("Snooze again", "snooze", "secondary"),
            ],
            popup_type: kind,
        },
        PopupKind::UpdateConfirm => PopupBlueprint {
            icon: "pencil".to_string(),
            header_class: HeaderClass::Discovery,
            title: "Confirm update".to_string(),
            subtitle: title,
            body: body.unwrap_or_else(|| "I found a possible change to this event.".to_string()),
            question: Some("Apply this change?".to_string()),
            buttons: vec![
                button("Confirm", "confirm-update", "primary"),
                button("Dismiss", "dismiss", "secondary"),
            ],
            popup_type: kind,
        },
        PopupKind::FormMismatch => PopupBlueprint {
            icon: "clipboard".to_string(),
            header_class: HeaderClass::Insight,
            title: "Double check this field".to_string(),
            subtitle: title,
            body: body.unwrap_or_else(|| "This doesn't match what I remember.".to_string()),
            question: None,
            buttons: vec![button("Got it", "acknowledge", "primary")],
            popup_type: kind,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_kind_has_a_template() {
        let kinds = [
            PopupKind::EventDiscovery,
            PopupKind::EventReminder,
            PopupKind::ContextReminder,
            PopupKind::ConflictWarning,
            PopupKind::InsightCard,
            PopupKind::SnoozeReminder,
            PopupKind::UpdateConfirm,
            PopupKind::FormMismatch,
        ];
        for kind in kinds {
            let bp = static_popup(kind, Some("Test"), None);
            assert!(!bp.buttons.is_empty());
            assert_eq!(bp.popup_type.as_str(), kind.as_str());
        }
    }
}
