//! Realtime worker: audio-native English sessions
//!
//! No text-path interception exists here: the model produces audio inside
//! itself. The mitigation is a post-hoc safety check on each committed
//! assistant item (the audio has already played) plus an in-band safety
//! directive in the agent instructions.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;
use uuid::Uuid;

use tutor_agent_agent::AgentDefinition;
use tutor_agent_config::constants::{timing, workers};
use tutor_agent_config::Settings;
use tutor_agent_core::{
    AgentDispatchRequest, ControlPlane, DispatchMetadata, Error, ItemRole, JobRequest,
    RealtimeHandle, RealtimeModel, RealtimeOptions, Result, RoomHandle, SessionState,
    SharedSession, Speaker, Subject, TranscriptEvent, TRANSCRIPT_TOPIC,
};
use tutor_agent_media::GatewayClient;
use tutor_agent_persistence::{
    spawn_write, GuardrailEventRow, LearningSessionRow, LearningStore, TranscriptTurnRow,
};
use tutor_agent_safety::SafetyFilter;
use tutor_agent_telemetry::{spans, SessionIds, SessionType};

/// Everything a realtime job needs.
pub struct RealtimeDeps {
    pub settings: Settings,
    pub gateway: Arc<GatewayClient>,
    pub control_plane: Arc<dyn ControlPlane>,
    pub store: Arc<dyn LearningStore>,
    pub safety: Arc<SafetyFilter>,
    pub realtime: Arc<dyn RealtimeModel>,
}

/// Recover session state from dispatch metadata. The session id is
/// required: it is what keeps the realtime worker on the same trace as the
/// pipeline worker that dispatched it.
pub fn build_realtime_state(
    job: &JobRequest,
    metadata: &DispatchMetadata,
) -> Result<SessionState> {
    let raw = metadata
        .session
        .as_deref()
        .ok_or_else(|| Error::Metadata("dispatch metadata missing session id".to_string()))?;
    let id = Uuid::parse_str(raw)
        .map_err(|e| Error::Metadata(format!("invalid session id '{raw}': {e}")))?;

    let mut state = SessionState::with_id(id, &job.student_identity, &job.room_name);
    if let Some(prior) = metadata.subject.as_deref().and_then(Subject::parse) {
        state.route_to(prior);
    }
    state.route_to(Subject::English);
    state.speaking_agent = Some(Subject::English);
    Ok(state)
}

fn attach_item_handler(
    handle: &Arc<dyn RealtimeHandle>,
    state: SharedSession,
    room: Arc<dyn RoomHandle>,
    store: Arc<dyn LearningStore>,
    safety: Arc<SafetyFilter>,
) {
    handle.on_conversation_item(Box::new(move |wrapped| {
        // The host runtime calls this synchronously and rejects async
        // callbacks; all I/O goes to a scheduled worker.
        let item = wrapped.item;
        let (turn, session_uuid, user_id) = {
            let mut s = state.lock();
            (s.advance_turn(), s.session_id(), s.student_identity.clone())
        };
        let speaker = match item.role {
            ItemRole::User => Speaker::Student,
            ItemRole::Assistant => Speaker::English,
        };

        let room = room.clone();
        let store = store.clone();
        let safety = safety.clone();
        tokio::spawn(async move {
            let session_id = session_uuid.to_string();
            let ids = SessionIds {
                session_id: &session_id,
                user_id: &user_id,
            };
            spans::conversation_item(
                ids,
                Some(Subject::English.as_str()),
                item.role.as_str(),
                SessionType::RealtimeEnglish,
                turn,
                None,
            );

            let transcript = TranscriptEvent {
                speaker,
                role: item.role,
                content: item.content.clone(),
                subject: Some(Subject::English),
                turn,
                session_id: session_uuid,
            };
            if let Err(e) = room.publish_data(TRANSCRIPT_TOPIC, &transcript.to_bytes()).await {
                tracing::warn!(error = %e, "transcript publish failed");
            }
            {
                let row = TranscriptTurnRow {
                    session_id: session_uuid,
                    turn: turn as i64,
                    speaker: speaker.as_str().to_string(),
                    role: item.role.as_str().to_string(),
                    content: item.content.clone(),
                    subject: Some(Subject::English.as_str().to_string()),
                    created_at: Utc::now(),
                };
                let store = store.clone();
                spawn_write("transcript turn", async move { store.insert_turn(row).await });
            }

            // Post-hoc: the audio already played; flagged content is logged
            // for teacher review, not suppressed.
            if item.role == ItemRole::Assistant {
                let verdict = safety.check(&item.content, ids).await;
                if verdict.flagged {
                    tracing::warn!(
                        categories = ?verdict.categories,
                        peak_score = verdict.peak_score,
                        "realtime assistant content flagged after playback"
                    );
                    let row = GuardrailEventRow {
                        session_id,
                        agent_name: Subject::English.agent_name().to_string(),
                        original_text: item.content.clone(),
                        rewritten_text: String::new(),
                        categories_flagged: verdict
                            .categories
                            .iter()
                            .map(|c| c.as_str().to_string())
                            .collect(),
                        peak_score: verdict.peak_score,
                        created_at: Utc::now(),
                    };
                    spawn_write("guardrail event", async move {
                        store.insert_guardrail_event(row).await
                    });
                }
            }
        });
    }));
}

fn attach_return_handler(
    handle: &Arc<dyn RealtimeHandle>,
    state: SharedSession,
    control_plane: Arc<dyn ControlPlane>,
    room_name: String,
) {
    let close_handle = handle.clone();
    handle.on_tool_call(Box::new(move |call| {
        if call.name != "route_back_to_orchestrator" {
            tracing::debug!(tool = %call.name, "ignoring unknown realtime tool call");
            return;
        }
        let reason = call.str_arg("reason");
        let (session_id, prior) = {
            let s = state.lock();
            (
                s.session_id().to_string(),
                s.previous_subjects
                    .last()
                    .copied()
                    .unwrap_or(Subject::Classifier),
            )
        };

        let control_plane = control_plane.clone();
        let room_name = room_name.clone();
        let close_handle = close_handle.clone();
        tokio::spawn(async move {
            let metadata = DispatchMetadata {
                return_from_english: Some(session_id),
                question: (!reason.is_empty()).then(|| reason.replace([':', '|'], " ")),
                subject: Some(prior.as_str().to_string()),
                ..Default::default()
            };
            match metadata.format() {
                Ok(metadata) => {
                    let request = AgentDispatchRequest {
                        agent_name: workers::PIPELINE_WORKER_NAME.to_string(),
                        room: room_name,
                        metadata,
                    };
                    if let Err(e) = control_plane.dispatch_agent(request).await {
                        tracing::warn!(error = %e, "return dispatch to pipeline failed");
                    }
                }
                Err(e) => tracing::warn!(error = %e, "return metadata rejected"),
            }
            // Let the farewell utterance complete before closing.
            tokio::time::sleep(timing::PIPELINE_DRAIN).await;
            if let Err(e) = close_handle.close().await {
                tracing::warn!(error = %e, "realtime close failed");
            }
        });
    }));
}

/// Run one realtime room-join job to completion.
pub async fn run_realtime_job(
    deps: Arc<RealtimeDeps>,
    job: JobRequest,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let metadata = DispatchMetadata::parse(&job.metadata);
    let state = build_realtime_state(&job, &metadata)?;
    let session_uuid = state.session_id();
    let session_id = session_uuid.to_string();
    let user_id = state.student_identity.clone();
    let ids = SessionIds {
        session_id: &session_id,
        user_id: &user_id,
    };

    spans::session_start(ids, &job.room_name, SessionType::RealtimeEnglish, false);
    {
        let row = LearningSessionRow {
            session_id: session_uuid,
            student_identity: user_id.clone(),
            room_name: job.room_name.clone(),
            session_type: SessionType::RealtimeEnglish.as_str().to_string(),
            recovered: false,
            started_at: state.created_at,
            ended_at: None,
            total_turns: None,
            escalated: None,
        };
        let store = deps.store.clone();
        spawn_write("session upsert", async move { store.upsert_session(row).await });
    }

    let room = deps
        .gateway
        .join_room(&job.room_name, "learning-english")
        .await?;

    let handle: Arc<dyn RealtimeHandle> = Arc::from(
        deps.realtime
            .connect(RealtimeOptions {
                room_name: job.room_name.clone(),
                voice: "nova".to_string(),
                instructions: AgentDefinition::english_realtime_instructions(),
            })
            .await?,
    );

    let shared = state.shared();
    attach_item_handler(
        &handle,
        shared.clone(),
        room.clone(),
        deps.store.clone(),
        deps.safety.clone(),
    );
    attach_return_handler(
        &handle,
        shared.clone(),
        deps.control_plane.clone(),
        job.room_name.clone(),
    );

    if let Some(question) = metadata.question.clone() {
        let handle = handle.clone();
        tokio::spawn(async move {
            // Premature reply generation produces a silent response: the
            // audio path is not established yet.
            tokio::time::sleep(timing::REALTIME_REPLY_DELAY).await;
            if let Err(e) = handle.drive_reply(&question).await {
                tracing::warn!(error = %e, "first reply failed");
            }
        });
    }

    // A worker shutdown closes the realtime session gracefully; the close
    // frame lets in-flight audio finish on the model side.
    tokio::select! {
        _ = handle.closed() => {}
        _ = crate::shutdown_requested(&mut shutdown) => {
            tracing::info!("worker shutting down, closing realtime session");
            if let Err(e) = handle.close().await {
                tracing::warn!(error = %e, "realtime close failed");
            }
        }
    }

    let (total_turns, escalated) = {
        let s = shared.lock();
        (s.turn_number(), s.is_escalated())
    };
    spans::session_end(
        ids,
        SessionType::RealtimeEnglish,
        total_turns,
        escalated,
        Subject::English.as_str(),
    );
    {
        let store = deps.store.clone();
        spawn_write("session end", async move {
            store
                .end_session(session_uuid, Utc::now(), total_turns as i64, escalated)
                .await
        });
    }
    if let Err(e) = room.close().await {
        tracing::warn!(error = %e, "room close failed");
    }
    tracing::info!(session_id = %session_id, "realtime session closed");
    Ok(())
}
