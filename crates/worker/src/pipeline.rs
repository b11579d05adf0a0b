//! Pipeline worker: session construction and signal handling

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::watch;
use uuid::Uuid;

use tutor_agent_agent::{AgentDefinition, GuardedAgent, ItemEvent, PipelineSession};
use tutor_agent_config::Settings;
use tutor_agent_core::{
    ChatModel, ControlPlane, DispatchMetadata, ItemRole, JobRequest, Result, RoomHandle,
    SessionState, SharedSession, Speaker, SpeechSynthesis, SpeechToText, Subject, TranscriptEvent,
    TRANSCRIPT_TOPIC,
};
use tutor_agent_media::{GatewayClient, VadModel};
use tutor_agent_persistence::{
    spawn_write, LearningSessionRow, LearningStore, TranscriptTurnRow,
};
use tutor_agent_routing::RoutingController;
use tutor_agent_safety::SafetyFilter;
use tutor_agent_telemetry::{spans, SessionIds, SessionType};

/// Everything a pipeline job needs, shared across sessions in the worker.
pub struct PipelineDeps {
    pub settings: Settings,
    pub gateway: Arc<GatewayClient>,
    pub control_plane: Arc<dyn ControlPlane>,
    pub store: Arc<dyn LearningStore>,
    pub safety: Arc<SafetyFilter>,
    pub chat: Arc<dyn ChatModel>,
    pub stt: Arc<dyn SpeechToText>,
    pub tts: Arc<dyn SpeechSynthesis>,
    /// Loaded at prewarm; sessions never pay the load.
    pub vad: Arc<VadModel>,
}

/// Build session state for a room-join job.
///
/// A `return_from_english` key recovers the session id minted on the
/// original visit so telemetry and persistence share one trace; an
/// unparseable id mints a new one (prior lineage is lost, logged).
pub fn build_pipeline_state(
    job: &JobRequest,
    metadata: &DispatchMetadata,
) -> (SessionState, bool, Arc<GuardedAgent>) {
    let classifier = Arc::new(GuardedAgent::new(AgentDefinition::classifier()));

    if let Some(raw) = &metadata.return_from_english {
        match Uuid::parse_str(raw) {
            Ok(id) => {
                let mut state =
                    SessionState::with_id(id, &job.student_identity, &job.room_name);
                if let Some(prior) = metadata.subject.as_deref().and_then(Subject::parse) {
                    state.route_to(prior);
                }
                state.route_to(Subject::Classifier);
                state.speaking_agent = Some(Subject::Classifier);
                if let Some(question) = &metadata.question {
                    classifier.set_pending_question(Some(question.clone()));
                    state.set_skip_next_user_turns(1);
                }
                return (state, true, classifier);
            }
            Err(e) => {
                tracing::warn!(error = %e, raw = %raw, "unrecoverable session id, minting a new one");
            }
        }
    }

    let mut state = SessionState::new(&job.student_identity, &job.room_name);
    state.route_to(Subject::Classifier);
    state.speaking_agent = Some(Subject::Classifier);
    (state, false, classifier)
}

/// A committed item ready for publish/persist, produced by the synchronous
/// part of the item handler.
pub struct CommitOutcome {
    pub transcript: TranscriptEvent,
    pub user_id: String,
    pub e2e_response_ms: Option<u64>,
}

/// Synchronous half of the `conversation_item_added` handler.
///
/// Suppression and turn assignment happen here, in commit order; `None`
/// means the item was a phantom user turn and nothing further is emitted.
pub fn commit_item(state: &SharedSession, event: &ItemEvent) -> Option<CommitOutcome> {
    let mut s = state.lock();
    if event.item.role == ItemRole::User && s.consume_user_turn_skip() {
        tracing::debug!("suppressed phantom user item");
        return None;
    }
    let turn = s.advance_turn();
    let speaker = event.speaker_override.unwrap_or(match event.item.role {
        ItemRole::User => Speaker::Student,
        ItemRole::Assistant => s
            .speaking_agent
            .map(|a| a.speaker())
            .unwrap_or(Speaker::Classifier),
    });
    let e2e_response_ms = match event.item.role {
        ItemRole::Assistant => s
            .last_user_input_at
            .take()
            .map(|t| t.elapsed().as_millis() as u64),
        ItemRole::User => None,
    };
    Some(CommitOutcome {
        transcript: TranscriptEvent {
            speaker,
            role: event.item.role,
            content: event.item.content.clone(),
            subject: s.current_subject,
            turn,
            session_id: s.session_id(),
        },
        user_id: s.student_identity.clone(),
        e2e_response_ms,
    })
}

fn attach_item_handler(
    session: &PipelineSession,
    state: SharedSession,
    room: Arc<dyn RoomHandle>,
    store: Arc<dyn LearningStore>,
) {
    session.on_conversation_item(Box::new(move |event| {
        // Synchronous dispatcher: suppression and turn order are decided
        // inline, the I/O goes to independent tasks.
        let Some(outcome) = commit_item(&state, event) else {
            return;
        };

        let session_id = outcome.transcript.session_id.to_string();
        spans::conversation_item(
            SessionIds {
                session_id: &session_id,
                user_id: &outcome.user_id,
            },
            outcome.transcript.subject.map(|s| s.as_str()),
            outcome.transcript.role.as_str(),
            SessionType::Pipeline,
            outcome.transcript.turn,
            outcome.e2e_response_ms,
        );

        let payload = outcome.transcript.to_bytes();
        let room = room.clone();
        tokio::spawn(async move {
            if let Err(e) = room.publish_data(TRANSCRIPT_TOPIC, &payload).await {
                tracing::warn!(error = %e, "transcript publish failed");
            }
        });

        let row = TranscriptTurnRow {
            session_id: outcome.transcript.session_id,
            turn: outcome.transcript.turn as i64,
            speaker: outcome.transcript.speaker.as_str().to_string(),
            role: outcome.transcript.role.as_str().to_string(),
            content: outcome.transcript.content.clone(),
            subject: outcome.transcript.subject.map(|s| s.as_str().to_string()),
            created_at: Utc::now(),
        };
        let store = store.clone();
        spawn_write("transcript turn", async move { store.insert_turn(row).await });
    }));
}

fn attach_transcript_handler(session: &PipelineSession, state: SharedSession) {
    session.on_user_input_transcribed(Box::new(move |_text| {
        state.lock().last_user_input_at = Some(Instant::now());
    }));
}

/// Run one room-join job to completion.
pub async fn run_pipeline_job(
    deps: Arc<PipelineDeps>,
    job: JobRequest,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let metadata = DispatchMetadata::parse(&job.metadata);
    let (state, recovered, classifier) = build_pipeline_state(&job, &metadata);
    let session_uuid = state.session_id();
    let session_id = session_uuid.to_string();
    let user_id = state.student_identity.clone();
    let ids = SessionIds {
        session_id: &session_id,
        user_id: &user_id,
    };

    // Upsert must not delay session start.
    {
        let row = LearningSessionRow {
            session_id: session_uuid,
            student_identity: user_id.clone(),
            room_name: job.room_name.clone(),
            session_type: SessionType::Pipeline.as_str().to_string(),
            recovered,
            started_at: state.created_at,
            ended_at: None,
            total_turns: None,
            escalated: None,
        };
        let store = deps.store.clone();
        spawn_write("session upsert", async move { store.upsert_session(row).await });
    }

    spans::session_start(ids, &job.room_name, SessionType::Pipeline, recovered);
    tracing::debug!(vad = deps.vad.path(), "session using prewarmed VAD model");

    let room = deps
        .gateway
        .join_room(&job.room_name, "learning-orchestrator")
        .await?;
    let shared = state.shared();
    let controller = Arc::new(RoutingController::new(
        deps.control_plane.clone(),
        deps.store.clone(),
    ));
    let session = Arc::new(PipelineSession::new(
        shared.clone(),
        room.clone(),
        deps.stt.clone(),
        deps.tts.clone(),
        deps.chat.clone(),
        deps.safety.clone(),
        controller.clone(),
        classifier,
    ));
    controller.bind_session(&session);

    attach_item_handler(&session, shared.clone(), room.clone(), deps.store.clone());
    attach_transcript_handler(&session, shared.clone());

    let runner = {
        let session = session.clone();
        tokio::spawn(async move {
            if let Err(e) = session.run().await {
                tracing::error!(error = %e, "pipeline session failed");
            }
            session.aclose().await;
        })
    };

    // The runtime exposes a close signal, not a blocking wait; synchronize
    // through it. A worker shutdown drains the session gracefully instead
    // of cutting it off mid-sentence.
    tokio::select! {
        _ = session.closed() => {}
        _ = crate::shutdown_requested(&mut shutdown) => {
            tracing::info!("worker shutting down, closing session gracefully");
            session.aclose().await;
        }
    }

    let (total_turns, escalated, covered) = {
        let s = shared.lock();
        (s.turn_number(), s.is_escalated(), s.subjects_covered())
    };
    let covered = covered
        .iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(",");
    spans::session_end(ids, SessionType::Pipeline, total_turns, escalated, &covered);
    {
        let store = deps.store.clone();
        spawn_write("session end", async move {
            store
                .end_session(session_uuid, Utc::now(), total_turns as i64, escalated)
                .await
        });
    }

    let _ = runner.await;
    tracing::info!(session_id = %session_id, "pipeline session closed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tutor_agent_core::ConversationItem;

    fn job(metadata: &str) -> JobRequest {
        JobRequest {
            room_name: "room-1".to_string(),
            student_identity: "student-1".to_string(),
            metadata: metadata.to_string(),
        }
    }

    fn event(item: ConversationItem) -> ItemEvent {
        ItemEvent {
            item,
            speaker_override: None,
        }
    }

    #[test]
    fn fresh_join_starts_on_classifier() {
        let (state, recovered, classifier) =
            build_pipeline_state(&job(""), &DispatchMetadata::parse(""));
        assert!(!recovered);
        assert_eq!(state.current_subject, Some(Subject::Classifier));
        assert!(classifier.take_pending_question().is_none());
        assert_eq!(state.skip_next_user_turns(), 0);
    }

    #[test]
    fn return_from_english_recovers_session_id() {
        let id = Uuid::new_v4();
        let metadata = DispatchMetadata::parse(&format!(
            "return_from_english:{id}|question:what is a verb|subject:english"
        ));
        let (state, recovered, classifier) = build_pipeline_state(&job(""), &metadata);
        assert!(recovered);
        assert_eq!(state.session_id(), id);
        assert!(state.previous_subjects.contains(&Subject::English));
        assert_eq!(
            classifier.take_pending_question().as_deref(),
            Some("what is a verb")
        );
        assert_eq!(state.skip_next_user_turns(), 1);
    }

    #[test]
    fn bad_session_id_mints_a_new_one() {
        let metadata = DispatchMetadata::parse("return_from_english:not-a-uuid");
        let (state, recovered, _) = build_pipeline_state(&job(""), &metadata);
        assert!(!recovered);
        assert_eq!(state.current_subject, Some(Subject::Classifier));
    }

    #[test]
    fn phantom_user_item_is_suppressed_exactly_once() {
        let mut state = SessionState::new("student-1", "room-1");
        state.route_to(Subject::Math);
        state.speaking_agent = Some(Subject::Math);
        state.set_skip_next_user_turns(1);
        let shared = state.shared();

        // The synthetic conditioning item is dropped: no outcome, no turn.
        assert!(commit_item(&shared, &event(ConversationItem::user("seven times eight"))).is_none());
        assert_eq!(shared.lock().skip_next_user_turns(), 0);
        assert_eq!(shared.lock().turn_number(), 0);

        // The next real user item flows through normally.
        let outcome =
            commit_item(&shared, &event(ConversationItem::user("and nine times nine?")))
                .expect("real item must pass");
        assert_eq!(outcome.transcript.speaker, Speaker::Student);
        assert_eq!(outcome.transcript.turn, 1);
    }

    #[test]
    fn assistant_speaker_derives_from_speaking_agent() {
        let mut state = SessionState::new("student-1", "room-1");
        state.route_to(Subject::Math);
        state.speaking_agent = Some(Subject::Math);
        let shared = state.shared();

        let outcome = commit_item(&shared, &event(ConversationItem::assistant("56"))).unwrap();
        assert_eq!(outcome.transcript.speaker, Speaker::Math);
        assert_eq!(outcome.transcript.subject, Some(Subject::Math));
    }

    #[test]
    fn speaker_override_wins_for_transition_sentences() {
        let mut state = SessionState::new("student-1", "room-1");
        state.route_to(Subject::Math);
        state.speaking_agent = Some(Subject::Math);
        let shared = state.shared();

        let outcome = commit_item(
            &shared,
            &ItemEvent {
                item: ConversationItem::assistant("Let me connect you with our Mathematics tutor!"),
                speaker_override: Some(Speaker::Classifier),
            },
        )
        .unwrap();
        assert_eq!(outcome.transcript.speaker, Speaker::Classifier);
    }

    #[test]
    fn e2e_latency_is_attached_once_and_cleared() {
        let mut state = SessionState::new("student-1", "room-1");
        state.route_to(Subject::Math);
        state.speaking_agent = Some(Subject::Math);
        state.last_user_input_at = Some(Instant::now());
        let shared = state.shared();

        let first = commit_item(&shared, &event(ConversationItem::assistant("56"))).unwrap();
        assert!(first.e2e_response_ms.is_some());

        let second = commit_item(&shared, &event(ConversationItem::assistant("Anything else?")))
            .unwrap();
        assert!(second.e2e_response_ms.is_none());
    }
}
