//! Popup blueprint generation (spec §4.7): LLM-generated copy within a 5-second
//! budget, falling back to one of the eight static templates (§4.4) on any
//! failure. Shared by the ingestion pipeline and the scheduler's notification
//! delivery.

use std::time::Duration;

use serde_json::Value;

use crate::domain::PopupBlueprint;
use crate::domain::PopupKind;
use crate::envelope::with_deadline;
use crate::heuristics::static_popup;
use crate::llm::LlmClient;

const LLM_BUDGET: Duration = Duration::from_secs(5);

/// Generates a popup blueprint, preferring the LLM within its budget and
/// falling back to the static template on timeout, error, or malformed output.
pub async fn generate(
    llm: &LlmClient,
    popup_type: PopupKind,
    context: &Value,
    title: Option<&str>,
    body: Option<&str>,
) -> PopupBlueprint {
    match with_deadline(LLM_BUDGET, llm.generate_popup(popup_type.as_str(), context)).await {
        Ok(Ok(blueprint)) if blueprint.popup_type == popup_type => blueprint,
        _ => static_popup(popup_type, title, body),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn falls_back_when_llm_unreachable() {
        let llm = LlmClient::new(
            "http://127.0.0.1:1".to_string(),
            String::new(),
            "chat".to_string(),
            "embed".to_string(),
            8,
        );
        let blueprint = generate(&llm, PopupKind::EventDiscovery, &serde_json::json!({}), Some("Test"), None).await;
        assert_eq!(blueprint.popup_type, PopupKind::EventDiscovery);
    }
}
