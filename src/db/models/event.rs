//! Event model (spec §3): the central entity, including the embedding BLOB
//! codec and the lifecycle/status helpers used by the store and ingestion.

use serde::{Deserialize, Serialize};

use crate::domain::{EventStatus, EventType};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Event {
    pub id: i64,
    pub message_id: Option<String>,
    pub event_type: String,
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    /// Comma-separated (spec §3).
    pub keywords: String,
    pub participants: Option<String>,
    pub event_time: Option<i64>,
    pub reminder_time: Option<i64>,
    #[serde(skip_serializing, default)]
    pub embedding: Option<Vec<u8>>,
    pub context_url: Option<String>,
    pub status: String,
    pub dismiss_count: i64,
    pub sender_name: Option<String>,
    pub confidence: f64,
    pub created_at: i64,
}

impl Event {
    pub fn status_enum(&self) -> EventStatus {
        EventStatus::parse(&self.status)
    }

    pub fn event_type_enum(&self) -> EventType {
        EventType::parse(&self.event_type)
    }

    pub fn keywords_vec(&self) -> Vec<String> {
        self.keywords
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    pub fn embedding_vec(&self) -> Option<Vec<f32>> {
        self.embedding.as_deref().map(decode_embedding)
    }

    /// Serializable view used by the backup exporter (embedding omitted, spec §6).
    pub fn to_backup_json(&self) -> serde_json::Value {
        serde_json::json!({
            "id": self.id,
            "message_id": self.message_id,
            "event_type": self.event_type,
            "title": self.title,
            "description": self.description,
            "location": self.location,
            "keywords": self.keywords,
            "participants": self.participants,
            "event_time": self.event_time,
            "reminder_time": self.reminder_time,
            "context_url": self.context_url,
            "status": self.status,
            "dismiss_count": self.dismiss_count,
            "sender_name": self.sender_name,
            "confidence": self.confidence,
            "created_at": self.created_at,
        })
    }
}

/// Little-endian f32 BLOB codec (spec §3: 768 floats, cosine similarity).
pub fn encode_embedding(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * 4);
    for v in vector {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

pub fn decode_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedding_round_trips() {
        let original = vec![0.5_f32, -1.25, 3.0];
        let bytes = encode_embedding(&original);
        let decoded = decode_embedding(&bytes);
        assert_eq!(original, decoded);
    }

    #[test]
    fn cosine_similarity_identical_vectors_is_one() {
        let v = vec![1.0_f32, 2.0, 3.0];
        let sim = cosine_similarity(&v, &v);
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_orthogonal_is_zero() {
        let a = vec![1.0_f32, 0.0];
        let b = vec![0.0_f32, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }
}
