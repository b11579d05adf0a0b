//! Store trait, fire-and-forget helpers, and the guardrail audit sink

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use tutor_agent_safety::{GuardrailAuditSink, GuardrailEvent};

use crate::records::{
    EscalationEventRow, GuardrailEventRow, LearningSessionRow, RoutingDecisionRow,
    TranscriptTurnRow,
};
use crate::PersistenceError;

/// The learning store surface consumed by the workers and the routing
/// controller.
#[async_trait]
pub trait LearningStore: Send + Sync {
    async fn upsert_session(&self, row: LearningSessionRow) -> Result<(), PersistenceError>;

    async fn end_session(
        &self,
        session_id: Uuid,
        ended_at: DateTime<Utc>,
        total_turns: i64,
        escalated: bool,
    ) -> Result<(), PersistenceError>;

    async fn insert_turn(&self, row: TranscriptTurnRow) -> Result<(), PersistenceError>;

    async fn insert_routing_decision(
        &self,
        row: RoutingDecisionRow,
    ) -> Result<(), PersistenceError>;

    async fn insert_escalation(&self, row: EscalationEventRow) -> Result<(), PersistenceError>;

    async fn insert_guardrail_event(
        &self,
        row: GuardrailEventRow,
    ) -> Result<(), PersistenceError>;
}

/// Spawn a store write nobody awaits. Failures are logged with the label
/// and never propagate.
pub fn spawn_write<F>(label: &'static str, future: F)
where
    F: Future<Output = Result<(), PersistenceError>> + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(e) = future.await {
            tracing::warn!(error = %e, "{label} write failed");
        }
    });
}

/// No-op store used when persistence is disabled.
pub struct NullStore;

#[async_trait]
impl LearningStore for NullStore {
    async fn upsert_session(&self, _row: LearningSessionRow) -> Result<(), PersistenceError> {
        Ok(())
    }

    async fn end_session(
        &self,
        _session_id: Uuid,
        _ended_at: DateTime<Utc>,
        _total_turns: i64,
        _escalated: bool,
    ) -> Result<(), PersistenceError> {
        Ok(())
    }

    async fn insert_turn(&self, _row: TranscriptTurnRow) -> Result<(), PersistenceError> {
        Ok(())
    }

    async fn insert_routing_decision(
        &self,
        _row: RoutingDecisionRow,
    ) -> Result<(), PersistenceError> {
        Ok(())
    }

    async fn insert_escalation(&self, _row: EscalationEventRow) -> Result<(), PersistenceError> {
        Ok(())
    }

    async fn insert_guardrail_event(
        &self,
        _row: GuardrailEventRow,
    ) -> Result<(), PersistenceError> {
        Ok(())
    }
}

/// Bridges the safety filter's audit trail into the store without blocking
/// the speech path.
pub struct StoreAuditSink {
    store: Arc<dyn LearningStore>,
}

impl StoreAuditSink {
    pub fn new(store: Arc<dyn LearningStore>) -> Self {
        Self { store }
    }
}

impl GuardrailAuditSink for StoreAuditSink {
    fn record(&self, event: GuardrailEvent) {
        let store = self.store.clone();
        spawn_write("guardrail event", async move {
            store
                .insert_guardrail_event(GuardrailEventRow {
                    session_id: event.session_id,
                    agent_name: event.agent_name,
                    original_text: event.original_text,
                    rewritten_text: event.rewritten_text,
                    categories_flagged: event.categories_flagged,
                    peak_score: event.peak_score,
                    created_at: event.occurred_at,
                })
                .await
        });
    }
}
