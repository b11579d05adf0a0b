//! Row shapes for the learning store

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One row per room join (`learning_sessions`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningSessionRow {
    pub session_id: Uuid,
    pub student_identity: String,
    pub room_name: String,
    pub session_type: String,
    pub recovered: bool,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_turns: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub escalated: Option<bool>,
}

/// One row per committed conversation item (`transcript_turns`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptTurnRow {
    pub session_id: Uuid,
    pub turn: i64,
    pub speaker: String,
    pub role: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One row per routing span (`routing_decisions`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingDecisionRow {
    pub session_id: Uuid,
    pub from_agent: String,
    pub to_agent: String,
    pub question_summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_subject: Option<String>,
    pub decision_ms: i64,
    pub created_at: DateTime<Utc>,
}

/// One row per escalation (`escalation_events`), carrying the token a
/// teacher presents to join the room.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationEventRow {
    pub session_id: Uuid,
    pub room_name: String,
    pub from_agent: String,
    pub reason: String,
    pub teacher_join_token: String,
    pub created_at: DateTime<Utc>,
}

/// One row per safety event (`guardrail_events`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardrailEventRow {
    pub session_id: String,
    pub agent_name: String,
    pub original_text: String,
    pub rewritten_text: String,
    pub categories_flagged: Vec<String>,
    pub peak_score: f64,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_row_omits_unset_end_fields() {
        let row = LearningSessionRow {
            session_id: Uuid::nil(),
            student_identity: "student-1".to_string(),
            room_name: "room-1".to_string(),
            session_type: "pipeline".to_string(),
            recovered: false,
            started_at: Utc::now(),
            ended_at: None,
            total_turns: None,
            escalated: None,
        };
        let value = serde_json::to_value(&row).unwrap();
        assert!(value.get("ended_at").is_none());
        assert!(value.get("total_turns").is_none());
    }

    #[test]
    fn guardrail_row_keeps_category_set() {
        let row = GuardrailEventRow {
            session_id: "s-1".to_string(),
            agent_name: "math".to_string(),
            original_text: "bad".to_string(),
            rewritten_text: "nice".to_string(),
            categories_flagged: vec!["harassment".to_string()],
            peak_score: 0.9,
            created_at: Utc::now(),
        };
        let value = serde_json::to_value(&row).unwrap();
        assert_eq!(value["categories_flagged"][0], "harassment");
    }
}
