//! T1 LLM provider client (spec §1, §4.6-§4.7): two RPCs against an
//! OpenAI-compatible endpoint — a chat-completion call that returns JSON, and
//! an embedding call that returns a fixed-dimension vector. Every call returns
//! an `EnvelopeError` so the caller can classify retryability and report
//! outcomes to the Tier Orchestrator (spec §4.3).
//!
//! Grounded on the OpenAI-compatible chat provider pattern used throughout the
//! example pack: a thin `reqwest::Client`, private wire types, no exposure of
//! provider-specific shapes past this module's boundary.

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{ActionResult, ChatReply, ChatTurn, EventCandidate, PopupBlueprint, ProposedEvent};
use crate::envelope::EnvelopeError;

#[derive(Clone)]
pub struct LlmClient {
    http: Client,
    base_url: String,
    api_key: String,
    chat_model: String,
    embedding_model: String,
    embedding_dim: usize,
}

impl LlmClient {
    pub fn new(
        base_url: String,
        api_key: String,
        chat_model: String,
        embedding_model: String,
        embedding_dim: usize,
    ) -> Self {
        Self {
            http: Client::new(),
            base_url,
            api_key,
            chat_model,
            embedding_model,
            embedding_dim,
        }
    }

    /// A lightweight reachability probe used by the Tier Orchestrator's health
    /// probe (spec §4.3). Any HTTP response counts as reachable.
    pub async fn ping(&self) -> Result<(), ()> {
        let url = format!("{}/v1/models", self.base_url.trim_end_matches('/'));
        let mut req = self.http.get(&url);
        if !self.api_key.is_empty() {
            req = req.bearer_auth(&self.api_key);
        }
        req.send().await.map(|_| ()).map_err(|_| ())
    }

    async fn complete_json(&self, system: &str, user: &str) -> Result<Value, EnvelopeError> {
        let payload = ChatCompletionRequest {
            model: self.chat_model.clone(),
            messages: vec![
                ChatMessage { role: "system", content: system.to_string() },
                ChatMessage { role: "user", content: user.to_string() },
            ],
            response_format: Some(ResponseFormat { format_type: "json_object" }),
        };

        let url = format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'));
        let mut req = self.http.post(&url).json(&payload);
        if !self.api_key.is_empty() {
            req = req.bearer_auth(&self.api_key);
        }

        let response = req.send().await.map_err(|e| EnvelopeError::from_reqwest(&e))?;
        if !response.status().is_success() {
            return Err(EnvelopeError::from_http_status(response.status().as_u16()));
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| EnvelopeError::Transport(e.to_string()))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| EnvelopeError::Transport("empty LLM response".to_string()))?;

        serde_json::from_str(&content).map_err(|e| EnvelopeError::Transport(format!("non-JSON LLM response: {e}")))
    }

    /// Embedding RPC (spec §1). Returns a `self.embedding_dim`-length vector.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, EnvelopeError> {
        let payload = EmbeddingRequest {
            model: self.embedding_model.clone(),
            input: text.to_string(),
        };
        let url = format!("{}/v1/embeddings", self.base_url.trim_end_matches('/'));
        let mut req = self.http.post(&url).json(&payload);
        if !self.api_key.is_empty() {
            req = req.bearer_auth(&self.api_key);
        }

        let response = req.send().await.map_err(|e| EnvelopeError::from_reqwest(&e))?;
        if !response.status().is_success() {
            return Err(EnvelopeError::from_http_status(response.status().as_u16()));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| EnvelopeError::Transport(e.to_string()))?;

        let vector = parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| EnvelopeError::Transport("empty embedding response".to_string()))?;

        if vector.len() != self.embedding_dim {
            return Err(EnvelopeError::Transport(format!(
                "embedding dimension mismatch: got {}, expected {}",
                vector.len(),
                self.embedding_dim
            )));
        }
        Ok(vector)
    }

    /// Event extraction (spec §4.6 step 6).
    pub async fn analyze(
        &self,
        message: &str,
        recent_context: &[String],
        candidates: &[EventCandidate],
        now: DateTime<Utc>,
    ) -> Result<Vec<ProposedEvent>, EnvelopeError> {
        let system = "You extract calendar-worthy events from chat messages. \
            Respond with JSON: {\"events\": [{...}]}. Each event has type, title, \
            description, event_time (ISO-8601 or null), location, participants, \
            keywords, confidence, event_action (create|modify), target_event_id.";
        let user = serde_json::json!({
            "message": message,
            "recent_context": recent_context,
            "candidates": candidates,
            "now": now.to_rfc3339(),
        })
        .to_string();

        let value = self.complete_json(system, &user).await?;
        let events = value
            .get("events")
            .cloned()
            .unwrap_or(Value::Array(vec![]));
        serde_json::from_value(events).map_err(|e| EnvelopeError::Transport(e.to_string()))
    }

    /// Action detection (spec §4.6 step 5).
    pub async fn detect_action(
        &self,
        message: &str,
        candidates: &[EventCandidate],
    ) -> Result<ActionResult, EnvelopeError> {
        let system = "You detect whether a chat message refers to an action on an \
            existing event (complete, cancel, ignore, postpone, modify) or none. \
            Respond with JSON matching {action, target_event_id, confidence, \
            snooze_minutes, proposed_changes}.";
        let user = serde_json::json!({ "message": message, "candidates": candidates }).to_string();

        let value = self.complete_json(system, &user).await?;
        serde_json::from_value(value).map_err(|e| EnvelopeError::Transport(e.to_string()))
    }

    /// Relevance validation for the context matcher (spec §4.10 step 5).
    pub async fn validate_relevance(
        &self,
        url_keywords: &[String],
        candidates: &[EventCandidate],
    ) -> Result<Vec<usize>, EnvelopeError> {
        let system = "Given URL-derived keywords and candidate events, return the \
            indices of events genuinely relevant to the page. Respond with JSON: \
            {\"indices\": [..]}.";
        let user = serde_json::json!({ "keywords": url_keywords, "candidates": candidates }).to_string();

        let value = self.complete_json(system, &user).await?;
        let indices = value.get("indices").cloned().unwrap_or(Value::Array(vec![]));
        serde_json::from_value(indices).map_err(|e| EnvelopeError::Transport(e.to_string()))
    }

    /// Conversational query over stored events (spec §4.4 "Chat", §6 `/api/chat`).
    pub async fn chat(
        &self,
        query: &str,
        history: &[ChatTurn],
        candidates: &[EventCandidate],
    ) -> Result<ChatReply, EnvelopeError> {
        let system = "You answer questions about the user's stored events, using only \
            the candidates provided. Respond with JSON: {\"response\": \"...\", \
            \"events\": [...]} where events is a subset of the candidates.";
        let user = serde_json::json!({ "query": query, "history": history, "candidates": candidates }).to_string();

        let value = self.complete_json(system, &user).await?;
        serde_json::from_value(value).map_err(|e| EnvelopeError::Transport(e.to_string()))
    }

    /// Popup blueprint generation (spec §4.7), 5-second budget enforced by the caller.
    pub async fn generate_popup(
        &self,
        popup_type: &str,
        context: &Value,
    ) -> Result<PopupBlueprint, EnvelopeError> {
        let system = "Generate a UI popup blueprint as JSON with fields: icon, \
            header_class, title, subtitle, body, question (nullable), buttons \
            (list of {text, action, style}), popup_type.";
        let user = serde_json::json!({ "popup_type": popup_type, "context": context }).to_string();

        let value = self.complete_json(system, &user).await?;
        serde_json::from_value(value).map_err(|e| EnvelopeError::Transport(e.to_string()))
    }
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Serialize)]
struct EmbeddingRequest {
    model: String,
    input: String,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}
