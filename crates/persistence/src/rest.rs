//! REST client for the learning store

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;
use uuid::Uuid;

use tutor_agent_config::PersistenceConfig;

use crate::records::{
    EscalationEventRow, GuardrailEventRow, LearningSessionRow, RoutingDecisionRow,
    TranscriptTurnRow,
};
use crate::store::LearningStore;
use crate::PersistenceError;

/// PostgREST-style client. The service key rides on every request and
/// bypasses row-level access control.
pub struct RestStore {
    client: Client,
    base_url: String,
    service_key: String,
}

impl RestStore {
    pub fn new(config: &PersistenceConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: config.rest_url.trim_end_matches('/').to_string(),
            service_key: config.service_key.clone(),
        }
    }

    async fn insert<T: Serialize>(
        &self,
        table: &str,
        row: &T,
        upsert: bool,
    ) -> Result<(), PersistenceError> {
        let url = format!("{}/{table}", self.base_url);
        let mut request = self
            .client
            .post(&url)
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
            .header("Prefer", if upsert {
                "resolution=merge-duplicates,return=minimal"
            } else {
                "return=minimal"
            })
            .json(row);
        if upsert {
            request = request.query(&[("on_conflict", "session_id")]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| PersistenceError::Request(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(PersistenceError::Status {
                status: status.as_u16(),
                detail: response.text().await.unwrap_or_default(),
            });
        }
        Ok(())
    }

    async fn patch_session(
        &self,
        session_id: Uuid,
        body: serde_json::Value,
    ) -> Result<(), PersistenceError> {
        let url = format!("{}/learning_sessions", self.base_url);
        let response = self
            .client
            .patch(&url)
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
            .query(&[("session_id", format!("eq.{session_id}"))])
            .json(&body)
            .send()
            .await
            .map_err(|e| PersistenceError::Request(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(PersistenceError::Status {
                status: status.as_u16(),
                detail: response.text().await.unwrap_or_default(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl LearningStore for RestStore {
    async fn upsert_session(&self, row: LearningSessionRow) -> Result<(), PersistenceError> {
        self.insert("learning_sessions", &row, true).await
    }

    async fn end_session(
        &self,
        session_id: Uuid,
        ended_at: DateTime<Utc>,
        total_turns: i64,
        escalated: bool,
    ) -> Result<(), PersistenceError> {
        self.patch_session(
            session_id,
            serde_json::json!({
                "ended_at": ended_at,
                "total_turns": total_turns,
                "escalated": escalated,
            }),
        )
        .await
    }

    async fn insert_turn(&self, row: TranscriptTurnRow) -> Result<(), PersistenceError> {
        self.insert("transcript_turns", &row, false).await
    }

    async fn insert_routing_decision(
        &self,
        row: RoutingDecisionRow,
    ) -> Result<(), PersistenceError> {
        self.insert("routing_decisions", &row, false).await
    }

    async fn insert_escalation(&self, row: EscalationEventRow) -> Result<(), PersistenceError> {
        self.insert("escalation_events", &row, false).await
    }

    async fn insert_guardrail_event(
        &self,
        row: GuardrailEventRow,
    ) -> Result<(), PersistenceError> {
        self.insert("guardrail_events", &row, false).await
    }
}
