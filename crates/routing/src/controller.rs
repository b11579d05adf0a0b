//! The routing controller

use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rand::{distributions::Alphanumeric, Rng};

use tutor_agent_agent::{
    AgentDefinition, GuardedAgent, PipelineSession, ToolContext, ToolDispatcher, ToolOutcome,
};
use tutor_agent_config::constants::{timing, workers};
use tutor_agent_core::{
    AgentDispatchRequest, ControlPlane, DispatchMetadata, Message, Result, Role, Subject,
    ToolCall, ToolDefinition,
};
use tutor_agent_persistence::{
    spawn_write, EscalationEventRow, LearningStore, RoutingDecisionRow,
};
use tutor_agent_telemetry::{spans, SessionIds};

use crate::tools::RoutingTool;

/// Implements every routing tool. One controller per pipeline session,
/// bound to the session after construction so the English drain can close
/// it.
pub struct RoutingController {
    control_plane: Arc<dyn ControlPlane>,
    store: Arc<dyn LearningStore>,
    session: Mutex<Option<Weak<PipelineSession>>>,
    drain: Duration,
    watchdog: Duration,
}

impl RoutingController {
    pub fn new(control_plane: Arc<dyn ControlPlane>, store: Arc<dyn LearningStore>) -> Self {
        Self {
            control_plane,
            store,
            session: Mutex::new(None),
            drain: timing::PIPELINE_DRAIN,
            watchdog: timing::CLOSE_WATCHDOG,
        }
    }

    /// Shorten the drain/watchdog timers. Test hook.
    pub fn with_timings(mut self, drain: Duration, watchdog: Duration) -> Self {
        self.drain = drain;
        self.watchdog = watchdog;
        self
    }

    /// Bind the owning session so `route_to_english` can drain and close it.
    pub fn bind_session(&self, session: &Arc<PipelineSession>) {
        *self.session.lock() = Some(Arc::downgrade(session));
    }

    fn emit_decision(
        context: &ToolContext,
        session_id: &str,
        user_id: &str,
        from: Subject,
        to: Subject,
        question: &str,
        previous: Option<Subject>,
        started: Instant,
    ) {
        let last_user = last_user_text(&context.history).unwrap_or("");
        spans::routing_decision(
            SessionIds {
                session_id,
                user_id,
            },
            from.agent_name(),
            to.agent_name(),
            question,
            previous.map(|s| s.as_str()),
            started.elapsed().as_millis() as u64,
            last_user,
            context.history.len(),
        );
    }

    fn record_decision(
        &self,
        context: &ToolContext,
        from: Subject,
        to: Subject,
        question: &str,
        previous: Option<Subject>,
        started: Instant,
    ) {
        let session_id = context.state.lock().session_id();
        let row = RoutingDecisionRow {
            session_id,
            from_agent: from.agent_name().to_string(),
            to_agent: to.agent_name().to_string(),
            question_summary: spans::clip(question).to_string(),
            previous_subject: previous.map(|s| s.as_str().to_string()),
            decision_ms: started.elapsed().as_millis() as i64,
            created_at: Utc::now(),
        };
        let store = self.store.clone();
        spawn_write("routing decision", async move {
            store.insert_routing_decision(row).await
        });
    }

    /// In-session tuple handoff (math, history, back-to-orchestrator).
    async fn handoff(
        &self,
        target: Subject,
        question: String,
        context: &ToolContext,
        started: Instant,
    ) -> Result<ToolOutcome> {
        let (session_id, user_id, from, previous, same_target) = {
            let mut state = context.state.lock();
            let from = state.current_subject.unwrap_or(Subject::Classifier);
            let same_target = state.current_subject == Some(target);
            if !same_target {
                state.route_to(target);
                // Pre-set so the first drain-phase utterance of the incoming
                // agent is attributed correctly; the transition sentence is
                // attributed from a snapshot taken before this call.
                state.speaking_agent = Some(target);
                // Suppress the phantom user item the pending question will
                // produce. Never matched by string equality: the model
                // rephrases the question unpredictably.
                state.set_skip_next_user_turns(1);
            }
            (
                state.session_id().to_string(),
                state.student_identity.clone(),
                from,
                Some(from),
                same_target,
            )
        };

        Self::emit_decision(
            context,
            &session_id,
            &user_id,
            from,
            target,
            &question,
            previous,
            started,
        );
        self.record_decision(context, from, target, &question, previous, started);

        if same_target {
            // The active agent already is the target; keep it.
            return Ok(ToolOutcome::Quiet);
        }

        let agent = Arc::new(
            GuardedAgent::new(AgentDefinition::for_subject(target)).with_pending_question(question),
        );
        Ok(ToolOutcome::Handoff {
            agent,
            transition: transition_sentence(target).to_string(),
        })
    }

    /// Out-of-session dispatch to the realtime English worker.
    async fn route_to_english(
        &self,
        question: String,
        context: &ToolContext,
        started: Instant,
    ) -> Result<ToolOutcome> {
        let (session_id, user_id, from) = {
            let state = context.state.lock();
            (
                state.session_id().to_string(),
                state.student_identity.clone(),
                state.current_subject.unwrap_or(Subject::Classifier),
            )
        };

        let metadata = DispatchMetadata {
            session: Some(session_id.clone()),
            question: Some(sanitize_metadata_value(&question)),
            subject: Some(from.as_str().to_string()),
            ..Default::default()
        }
        .format()?;

        let request = AgentDispatchRequest {
            agent_name: workers::REALTIME_WORKER_NAME.to_string(),
            room: context.room_name.clone(),
            metadata,
        };

        let dispatched = self.control_plane.dispatch_agent(request).await;

        Self::emit_decision(
            context,
            &session_id,
            &user_id,
            from,
            Subject::English,
            &question,
            Some(from),
            started,
        );
        self.record_decision(context, from, Subject::English, &question, Some(from), started);

        {
            let mut state = context.state.lock();
            state.route_to(Subject::English);
            state.speaking_agent = Some(Subject::English);
        }

        match dispatched {
            Ok(ack) => {
                tracing::info!(
                    dispatch_id = %ack.dispatch_id,
                    room = %context.room_name,
                    "realtime worker dispatched, scheduling drain"
                );
                self.schedule_drain();
                Ok(ToolOutcome::Spoken(
                    transition_sentence(Subject::English).to_string(),
                ))
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "english dispatch failed, degrading to text-path tutor"
                );
                {
                    let mut state = context.state.lock();
                    state.set_skip_next_user_turns(1);
                }
                let agent = Arc::new(
                    GuardedAgent::new(AgentDefinition::english_fallback())
                        .with_pending_question(question),
                );
                Ok(ToolOutcome::Handoff {
                    agent,
                    transition: transition_sentence(Subject::English).to_string(),
                })
            }
        }
    }

    /// Sleep out the transition sentence, then close the pipeline session
    /// gracefully. Never interrupts: an interrupt cuts synthesis mid-word.
    /// The watchdog bounds the sequence even if the drain task is lost.
    fn schedule_drain(&self) {
        let Some(weak) = self.session.lock().clone() else {
            tracing::warn!("no session bound, skipping drain");
            return;
        };
        let drain = self.drain;
        let watchdog_after = self.watchdog;

        let drain_weak = weak.clone();
        tokio::spawn(async move {
            tokio::time::sleep(drain).await;
            if let Some(session) = drain_weak.upgrade() {
                session.aclose().await;
            }
        });

        tokio::spawn(async move {
            tokio::time::sleep(watchdog_after).await;
            if let Some(session) = weak.upgrade() {
                if !session.is_closed() {
                    tracing::warn!("drain task lost, watchdog closing session");
                    session.aclose().await;
                }
            }
        });
    }

    async fn escalate(
        &self,
        reason: String,
        context: &ToolContext,
        _started: Instant,
    ) -> Result<ToolOutcome> {
        let (session_id_str, user_id, from, turn, first_escalation, session_id) = {
            let mut state = context.state.lock();
            let first = state.escalate(reason.clone());
            (
                state.session_id().to_string(),
                state.student_identity.clone(),
                state.current_subject.unwrap_or(Subject::Classifier),
                state.turn_number(),
                first,
                state.session_id(),
            )
        };

        spans::teacher_escalation(
            SessionIds {
                session_id: &session_id_str,
                user_id: &user_id,
            },
            from.agent_name(),
            &reason,
            &context.room_name,
            turn,
        );

        if first_escalation {
            let row = EscalationEventRow {
                session_id,
                room_name: context.room_name.clone(),
                from_agent: from.agent_name().to_string(),
                reason: spans::clip(&reason).to_string(),
                teacher_join_token: generate_join_token(),
                created_at: Utc::now(),
            };
            let store = self.store.clone();
            spawn_write("escalation event", async move {
                store.insert_escalation(row).await
            });
        } else {
            tracing::info!("escalation already latched, not re-opening a teacher session");
        }

        Ok(ToolOutcome::Spoken(
            "Okay, I'm asking a teacher to join us. Hang tight!".to_string(),
        ))
    }
}

#[async_trait]
impl ToolDispatcher for RoutingController {
    fn tool_definitions(&self, current: Subject) -> Vec<ToolDefinition> {
        RoutingTool::definitions_for(current)
    }

    async fn dispatch(&self, call: ToolCall, context: &ToolContext) -> Result<ToolOutcome> {
        let started = Instant::now();
        let Some(tool) = RoutingTool::parse(&call) else {
            tracing::warn!(tool = %call.name, "unknown tool call ignored");
            return Ok(ToolOutcome::Quiet);
        };

        // The escalated latch absorbs further routing; speech continues.
        if context.state.lock().is_escalated() {
            if let RoutingTool::EscalateToTeacher { reason } = tool {
                return self.escalate(reason, context, started).await;
            }
            tracing::info!(tool = %call.name, "routing ignored after escalation");
            return Ok(ToolOutcome::Quiet);
        }

        match tool {
            RoutingTool::RouteToMath { question_summary } => {
                self.handoff(Subject::Math, question_summary, context, started)
                    .await
            }
            RoutingTool::RouteToHistory { question_summary } => {
                self.handoff(Subject::History, question_summary, context, started)
                    .await
            }
            RoutingTool::RouteBackToOrchestrator { reason } => {
                self.handoff(Subject::Classifier, reason, context, started)
                    .await
            }
            RoutingTool::RouteToEnglish { question_summary } => {
                self.route_to_english(question_summary, context, started).await
            }
            RoutingTool::EscalateToTeacher { reason } => {
                self.escalate(reason, context, started).await
            }
        }
    }
}

fn transition_sentence(target: Subject) -> &'static str {
    match target {
        Subject::Math => "Let me connect you with our Mathematics tutor!",
        Subject::History => "Let me connect you with our History tutor!",
        Subject::English => "Let me connect you with our English tutor!",
        Subject::Classifier => "Let me hand you back to our guide!",
    }
}

/// Values ride in `k:v|k:v` metadata; the delimiters cannot appear.
fn sanitize_metadata_value(value: &str) -> String {
    value.replace([':', '|'], " ")
}

fn generate_join_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

fn last_user_text(history: &[Message]) -> Option<&str> {
    history
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tutor_agent_core::{DispatchAck, Error, SessionState, SharedSession};
    use tutor_agent_persistence::{
        GuardrailEventRow, LearningSessionRow, PersistenceError, TranscriptTurnRow,
    };

    #[derive(Default)]
    struct RecordingControlPlane {
        requests: Mutex<Vec<AgentDispatchRequest>>,
        fail: bool,
    }

    #[async_trait]
    impl ControlPlane for RecordingControlPlane {
        async fn dispatch_agent(
            &self,
            request: AgentDispatchRequest,
        ) -> Result<DispatchAck> {
            self.requests.lock().push(request);
            if self.fail {
                Err(Error::Dispatch("control service unavailable".to_string()))
            } else {
                Ok(DispatchAck {
                    dispatch_id: "d-1".to_string(),
                })
            }
        }
    }

    #[derive(Default)]
    struct CountingStore {
        escalations: AtomicUsize,
        routing_rows: AtomicUsize,
    }

    #[async_trait]
    impl LearningStore for CountingStore {
        async fn upsert_session(
            &self,
            _row: LearningSessionRow,
        ) -> std::result::Result<(), PersistenceError> {
            Ok(())
        }

        async fn end_session(
            &self,
            _session_id: uuid::Uuid,
            _ended_at: chrono::DateTime<Utc>,
            _total_turns: i64,
            _escalated: bool,
        ) -> std::result::Result<(), PersistenceError> {
            Ok(())
        }

        async fn insert_turn(
            &self,
            _row: TranscriptTurnRow,
        ) -> std::result::Result<(), PersistenceError> {
            Ok(())
        }

        async fn insert_routing_decision(
            &self,
            _row: RoutingDecisionRow,
        ) -> std::result::Result<(), PersistenceError> {
            self.routing_rows.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn insert_escalation(
            &self,
            row: EscalationEventRow,
        ) -> std::result::Result<(), PersistenceError> {
            assert!(!row.teacher_join_token.is_empty());
            self.escalations.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn insert_guardrail_event(
            &self,
            _row: GuardrailEventRow,
        ) -> std::result::Result<(), PersistenceError> {
            Ok(())
        }
    }

    fn state_on(subject: Subject) -> SharedSession {
        let mut state = SessionState::new("student-1", "room-1");
        state.route_to(subject);
        state.speaking_agent = Some(subject);
        state.shared()
    }

    fn context(state: &SharedSession) -> ToolContext {
        ToolContext {
            state: state.clone(),
            history: vec![
                Message::user("Who was Napoleon?"),
            ],
            room_name: "room-1".to_string(),
        }
    }

    fn call(name: &str, key: &str, value: &str) -> ToolCall {
        ToolCall {
            name: name.to_string(),
            arguments: serde_json::json!({ key: value }),
        }
    }

    fn controller(
        plane: Arc<RecordingControlPlane>,
        store: Arc<CountingStore>,
    ) -> RoutingController {
        RoutingController::new(plane, store)
            .with_timings(Duration::from_millis(20), Duration::from_millis(200))
    }

    #[tokio::test]
    async fn cross_route_builds_target_agent_with_pending_question() {
        let state = state_on(Subject::Math);
        let routing = controller(Arc::default(), Arc::default());

        let outcome = routing
            .dispatch(call("route_to_history", "question_summary", "Napoleon"), &context(&state))
            .await
            .unwrap();

        match outcome {
            ToolOutcome::Handoff { agent, transition } => {
                assert_eq!(agent.subject(), Subject::History);
                assert_eq!(agent.take_pending_question().as_deref(), Some("Napoleon"));
                assert!(transition.contains("History tutor"));
            }
            _ => panic!("expected handoff"),
        }

        let s = state.lock();
        assert_eq!(s.current_subject, Some(Subject::History));
        assert_eq!(s.speaking_agent, Some(Subject::History));
        assert_eq!(s.skip_next_user_turns(), 1);
        assert_eq!(s.previous_subjects, vec![Subject::Math]);
    }

    #[tokio::test]
    async fn routing_to_current_subject_is_a_no_op() {
        let state = state_on(Subject::Math);
        let routing = controller(Arc::default(), Arc::default());

        let outcome = routing
            .dispatch(call("route_to_math", "question_summary", "again"), &context(&state))
            .await
            .unwrap();

        assert!(matches!(outcome, ToolOutcome::Quiet));
        let s = state.lock();
        assert!(s.previous_subjects.is_empty());
        assert_eq!(s.skip_next_user_turns(), 0);
    }

    #[tokio::test]
    async fn english_dispatch_uses_typed_request_with_metadata() {
        let state = state_on(Subject::Classifier);
        let plane = Arc::new(RecordingControlPlane::default());
        let routing = controller(plane.clone(), Arc::default());

        let outcome = routing
            .dispatch(
                call("route_to_english", "question_summary", "adjectives"),
                &context(&state),
            )
            .await
            .unwrap();

        match outcome {
            ToolOutcome::Spoken(text) => assert!(text.contains("English tutor")),
            _ => panic!("expected spoken transition"),
        }

        let requests = plane.requests.lock();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].agent_name, "learning-english");
        assert_eq!(requests[0].room, "room-1");
        let metadata = DispatchMetadata::parse(&requests[0].metadata);
        assert_eq!(
            metadata.session.as_deref(),
            Some(state.lock().session_id().to_string().as_str())
        );
        assert_eq!(metadata.question.as_deref(), Some("adjectives"));
        assert_eq!(metadata.subject.as_deref(), Some("classifier"));

        assert_eq!(state.lock().current_subject, Some(Subject::English));
    }

    #[tokio::test]
    async fn english_dispatch_failure_degrades_to_text_path() {
        let state = state_on(Subject::Classifier);
        let plane = Arc::new(RecordingControlPlane {
            fail: true,
            ..Default::default()
        });
        let routing = controller(plane, Arc::default());

        let outcome = routing
            .dispatch(
                call("route_to_english", "question_summary", "adjectives"),
                &context(&state),
            )
            .await
            .unwrap();

        match outcome {
            ToolOutcome::Handoff { agent, .. } => {
                assert_eq!(agent.subject(), Subject::English);
                assert_eq!(agent.take_pending_question().as_deref(), Some("adjectives"));
            }
            _ => panic!("expected degraded handoff"),
        }
        assert_eq!(state.lock().skip_next_user_turns(), 1);
    }

    #[tokio::test]
    async fn metadata_question_is_sanitized() {
        let state = state_on(Subject::Classifier);
        let plane = Arc::new(RecordingControlPlane::default());
        let routing = controller(plane.clone(), Arc::default());

        routing
            .dispatch(
                call("route_to_english", "question_summary", "ratio 3:4|5"),
                &context(&state),
            )
            .await
            .unwrap();

        let requests = plane.requests.lock();
        let metadata = DispatchMetadata::parse(&requests[0].metadata);
        assert_eq!(metadata.question.as_deref(), Some("ratio 3 4 5"));
    }

    #[tokio::test]
    async fn escalation_latches_and_inserts_once() {
        let state = state_on(Subject::Classifier);
        let store = Arc::new(CountingStore::default());
        let routing = controller(Arc::default(), store.clone());

        let first = routing
            .dispatch(
                call("escalate_to_teacher", "reason", "student expressing distress"),
                &context(&state),
            )
            .await
            .unwrap();
        assert!(matches!(first, ToolOutcome::Spoken(_)));
        assert!(state.lock().is_escalated());

        let second = routing
            .dispatch(
                call("escalate_to_teacher", "reason", "again"),
                &context(&state),
            )
            .await
            .unwrap();
        assert!(matches!(second, ToolOutcome::Spoken(_)));

        // The insert is fire-and-forget; give it a moment to land.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(store.escalations.load(Ordering::SeqCst), 1);
        assert_eq!(
            state.lock().escalation_reason.as_deref(),
            Some("student expressing distress")
        );
    }

    #[tokio::test]
    async fn routing_is_absorbed_after_escalation() {
        let state = state_on(Subject::Math);
        state.lock().escalate("distress");
        let routing = controller(Arc::default(), Arc::default());

        let outcome = routing
            .dispatch(
                call("route_to_history", "question_summary", "Napoleon"),
                &context(&state),
            )
            .await
            .unwrap();

        assert!(matches!(outcome, ToolOutcome::Quiet));
        assert_eq!(state.lock().current_subject, Some(Subject::Math));
    }

    #[tokio::test]
    async fn routing_rows_are_written() {
        let state = state_on(Subject::Classifier);
        let store = Arc::new(CountingStore::default());
        let routing = controller(Arc::default(), store.clone());

        routing
            .dispatch(
                call("route_to_math", "question_summary", "seven times eight"),
                &context(&state),
            )
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(store.routing_rows.load(Ordering::SeqCst), 1);
    }
}
