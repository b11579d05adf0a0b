//! End-to-end English handoff: typed dispatch, drain, graceful close.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use tutor_agent_agent::{AgentDefinition, GuardedAgent, PipelineSession, ToolContext, ToolDispatcher};
use tutor_agent_core::{
    AgentDispatchRequest, AudioFrame, AudioStream, ChatEvent, ChatModel, ChatRequest, ChatStream,
    ControlPlane, DispatchAck, DispatchMetadata, Result, RoomHandle, SessionState, SpeechSynthesis,
    SpeechToText, Subject, SynthesisOptions, ToolCall, TranscriptStream,
};
use tutor_agent_persistence::NullStore;
use tutor_agent_routing::RoutingController;
use tutor_agent_safety::{ModerationApi, ModerationVerdict, RewriteApi, SafetyFilter};

#[derive(Default)]
struct QuietRoom {
    closed_at: Mutex<Option<Instant>>,
}

#[async_trait]
impl RoomHandle for QuietRoom {
    fn room_name(&self) -> &str {
        "room-42"
    }

    async fn publish_data(&self, _topic: &str, _payload: &[u8]) -> Result<()> {
        Ok(())
    }

    async fn play(&self, _frames: Vec<AudioFrame>) -> Result<()> {
        Ok(())
    }

    async fn subscribe_audio(&self) -> Result<AudioStream> {
        Ok(Box::pin(futures::stream::pending()))
    }

    async fn close(&self) -> Result<()> {
        *self.closed_at.lock() = Some(Instant::now());
        Ok(())
    }
}

struct SilentStt;

#[async_trait]
impl SpeechToText for SilentStt {
    async fn transcribe(&self, _audio: AudioStream) -> Result<TranscriptStream> {
        Ok(Box::pin(futures::stream::pending()))
    }
}

struct NullTts;

#[async_trait]
impl SpeechSynthesis for NullTts {
    async fn synthesize(&self, _text: &str, _options: &SynthesisOptions) -> Result<Vec<AudioFrame>> {
        Ok(Vec::new())
    }
}

struct SilentChat;

#[async_trait]
impl ChatModel for SilentChat {
    async fn chat_stream(&self, _request: ChatRequest) -> Result<ChatStream> {
        Ok(Box::pin(futures::stream::iter(vec![Ok(ChatEvent::Done)])))
    }

    fn model_id(&self) -> &str {
        "silent"
    }
}

struct PassModeration;

#[async_trait]
impl ModerationApi for PassModeration {
    async fn moderate(&self, _text: &str) -> Result<ModerationVerdict> {
        Ok(ModerationVerdict::default())
    }
}

struct EchoRewriter;

#[async_trait]
impl RewriteApi for EchoRewriter {
    async fn rewrite(&self, text: &str) -> Result<String> {
        Ok(text.to_string())
    }
}

#[derive(Default)]
struct RecordingControlPlane {
    requests: Mutex<Vec<AgentDispatchRequest>>,
}

#[async_trait]
impl ControlPlane for RecordingControlPlane {
    async fn dispatch_agent(&self, request: AgentDispatchRequest) -> Result<DispatchAck> {
        self.requests.lock().push(request);
        Ok(DispatchAck {
            dispatch_id: "d-1".to_string(),
        })
    }
}

#[tokio::test]
async fn english_dispatch_drains_then_closes_gracefully() {
    let drain = Duration::from_millis(80);
    let watchdog = Duration::from_millis(2_000);

    let mut state = SessionState::new("student-1", "room-42");
    state.route_to(Subject::Classifier);
    state.speaking_agent = Some(Subject::Classifier);
    let shared = state.shared();
    let session_id = shared.lock().session_id().to_string();

    let plane = Arc::new(RecordingControlPlane::default());
    let room = Arc::new(QuietRoom::default());
    let controller = Arc::new(
        RoutingController::new(plane.clone(), Arc::new(NullStore)).with_timings(drain, watchdog),
    );
    let safety = Arc::new(SafetyFilter::new(
        Arc::new(PassModeration),
        Arc::new(EchoRewriter),
    ));

    let session = Arc::new(PipelineSession::new(
        shared.clone(),
        room.clone(),
        Arc::new(SilentStt),
        Arc::new(NullTts),
        Arc::new(SilentChat),
        safety,
        controller.clone() as Arc<dyn ToolDispatcher>,
        Arc::new(GuardedAgent::new(AgentDefinition::classifier())),
    ));
    controller.bind_session(&session);

    let context = ToolContext {
        state: shared.clone(),
        history: Vec::new(),
        room_name: "room-42".to_string(),
    };
    let dispatched_at = Instant::now();
    controller
        .dispatch(
            ToolCall {
                name: "route_to_english".to_string(),
                arguments: serde_json::json!({ "question_summary": "adjectives" }),
            },
            &context,
        )
        .await
        .unwrap();

    // The drain task survives the tool-call return and closes the session
    // gracefully; there is no interrupt operation to invoke at all.
    tokio::time::timeout(Duration::from_secs(2), session.closed())
        .await
        .expect("session must close after the drain");
    let closed_after = dispatched_at.elapsed();
    assert!(
        closed_after >= drain,
        "closed after {closed_after:?}, before the {drain:?} drain elapsed"
    );
    assert!(room.closed_at.lock().is_some(), "room must be closed gracefully");

    // Typed dispatch carried the same session id the realtime worker will
    // recover.
    let requests = plane.requests.lock();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].agent_name, "learning-english");
    assert_eq!(requests[0].room, "room-42");
    let metadata = DispatchMetadata::parse(&requests[0].metadata);
    assert_eq!(metadata.session.as_deref(), Some(session_id.as_str()));
    assert_eq!(metadata.question.as_deref(), Some("adjectives"));
}
