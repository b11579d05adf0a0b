//! Pipeline session runtime
//!
//! One [`PipelineSession`] per room on the pipeline worker. It drives the
//! speech-to-text -> language-model -> text-to-speech loop for whichever
//! agent is active, dispatches routing tool calls, and surfaces the
//! `conversation_item_added` / `user_input_transcribed` / close signals.
//!
//! Signal handlers are invoked synchronously, in commit order, from the
//! session's event loop; a handler that needs I/O must schedule an
//! independent task and return immediately. There is deliberately no
//! interrupt operation on this type: closing is always graceful, because an
//! interrupt silences in-flight synthesis mid-word.

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::ReceiverStream;

use tutor_agent_core::{
    ChatEvent, ChatModel, ChatRequest, ConversationItem, Error, Message, Result, RoomHandle,
    SharedSession, Speaker, SpeechSynthesis, SpeechToText, Subject, ToolCall, ToolDefinition,
};
use tutor_agent_safety::SafetyFilter;

use crate::guarded::{guard_sentences, GuardedAgent, OwnedIds};

/// What to feed the model on the next turn.
#[derive(Debug, Clone)]
pub enum TurnDrive {
    /// A real student utterance.
    User(String),
    /// A replayed question conditioning a newly activated agent. Committed
    /// as a user item like any other; the worker suppresses it via the
    /// session's skip counter.
    SyntheticUser(String),
    /// No conditioning input: the agent produces its default opening reply.
    Opening,
}

/// Result of dispatching one tool call.
pub enum ToolOutcome {
    /// In-session handoff: speak `transition` as the outgoing agent, then
    /// swap `agent` in as the active speaker.
    Handoff {
        agent: Arc<GuardedAgent>,
        transition: String,
    },
    /// Out-of-session dispatch or acknowledgement: speak the text, keep the
    /// current agent.
    Spoken(String),
    /// Handled silently.
    Quiet,
}

/// Context handed to the routing controller with each tool call.
pub struct ToolContext {
    pub state: SharedSession,
    /// Snapshot of the chat history at dispatch time.
    pub history: Vec<Message>,
    pub room_name: String,
}

/// Routing tool surface exposed to the active agent's model.
#[async_trait]
pub trait ToolDispatcher: Send + Sync {
    /// Tools available to the given subject's agent.
    fn tool_definitions(&self, current: Subject) -> Vec<ToolDefinition>;

    async fn dispatch(&self, call: ToolCall, context: &ToolContext) -> Result<ToolOutcome>;
}

/// Payload of the `conversation_item_added` signal.
#[derive(Debug, Clone)]
pub struct ItemEvent {
    pub item: ConversationItem,
    /// Set for the transition sentence, which must be attributed to the
    /// outgoing agent even though `speaking_agent` already points at the
    /// incoming one.
    pub speaker_override: Option<Speaker>,
}

type ItemHandler = Box<dyn Fn(&ItemEvent) + Send + Sync>;
type TranscriptHandler = Box<dyn Fn(&str) + Send + Sync>;

pub struct PipelineSession {
    state: SharedSession,
    room: Arc<dyn RoomHandle>,
    stt: Arc<dyn SpeechToText>,
    tts: Arc<dyn SpeechSynthesis>,
    chat: Arc<dyn ChatModel>,
    safety: Arc<SafetyFilter>,
    dispatcher: Arc<dyn ToolDispatcher>,
    active: Mutex<Arc<GuardedAgent>>,
    history: Mutex<Vec<Message>>,
    item_handlers: RwLock<Vec<ItemHandler>>,
    transcript_handlers: RwLock<Vec<TranscriptHandler>>,
    close_tx: watch::Sender<bool>,
}

impl PipelineSession {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        state: SharedSession,
        room: Arc<dyn RoomHandle>,
        stt: Arc<dyn SpeechToText>,
        tts: Arc<dyn SpeechSynthesis>,
        chat: Arc<dyn ChatModel>,
        safety: Arc<SafetyFilter>,
        dispatcher: Arc<dyn ToolDispatcher>,
        initial_agent: Arc<GuardedAgent>,
    ) -> Self {
        let (close_tx, _) = watch::channel(false);
        Self {
            state,
            room,
            stt,
            tts,
            chat,
            safety,
            dispatcher,
            active: Mutex::new(initial_agent),
            history: Mutex::new(Vec::new()),
            item_handlers: RwLock::new(Vec::new()),
            transcript_handlers: RwLock::new(Vec::new()),
            close_tx,
        }
    }

    pub fn state(&self) -> &SharedSession {
        &self.state
    }

    pub fn active_agent(&self) -> Arc<GuardedAgent> {
        self.active.lock().clone()
    }

    /// Register a `conversation_item_added` handler. Handlers run
    /// synchronously in commit order and must not block.
    pub fn on_conversation_item(&self, handler: ItemHandler) {
        self.item_handlers.write().push(handler);
    }

    /// Register a `user_input_transcribed` handler. Same synchronous
    /// contract as item handlers.
    pub fn on_user_input_transcribed(&self, handler: TranscriptHandler) {
        self.transcript_handlers.write().push(handler);
    }

    fn ids(&self) -> OwnedIds {
        let state = self.state.lock();
        OwnedIds {
            session_id: state.session_id().to_string(),
            user_id: state.student_identity.clone(),
        }
    }

    fn commit_item(&self, item: ConversationItem, speaker_override: Option<Speaker>) {
        let event = ItemEvent {
            item,
            speaker_override,
        };
        for handler in self.item_handlers.read().iter() {
            handler(&event);
        }
    }

    fn emit_transcribed(&self, text: &str) {
        for handler in self.transcript_handlers.read().iter() {
            handler(text);
        }
    }

    pub fn is_closed(&self) -> bool {
        *self.close_tx.borrow()
    }

    /// Resolves once the close signal fires.
    pub async fn closed(&self) {
        let mut rx = self.close_tx.subscribe();
        loop {
            if *rx.borrow() {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Graceful close: lets queued playback finish, then fires the close
    /// signal. Safe to call more than once.
    pub async fn aclose(&self) {
        if self.is_closed() {
            return;
        }
        if let Err(e) = self.room.close().await {
            tracing::warn!(error = %e, "room close failed");
        }
        let _ = self.close_tx.send(true);
    }

    /// Swap in a new active agent and compute its first drive.
    fn activate(&self, agent: Arc<GuardedAgent>) -> TurnDrive {
        *self.active.lock() = agent.clone();
        agent.activate(self.ids().as_ids());
        match agent.take_pending_question() {
            Some(question) => TurnDrive::SyntheticUser(question),
            None => TurnDrive::Opening,
        }
    }

    /// Main loop: activate the starting agent, then answer every finalized
    /// student utterance until the session closes.
    pub async fn run(&self) -> Result<()> {
        let initial = self.active_agent();
        let drive = self.activate(initial);
        self.run_turn(drive).await?;

        let audio = self.room.subscribe_audio().await?;
        let mut transcripts = self.stt.transcribe(audio).await?;
        let mut close = self.close_tx.subscribe();

        loop {
            tokio::select! {
                changed = close.changed() => {
                    if changed.is_err() || *close.borrow() {
                        break;
                    }
                }
                fragment = transcripts.next() => {
                    match fragment {
                        Some(Ok(fragment)) if fragment.is_final => {
                            self.emit_transcribed(&fragment.text);
                            self.run_turn(TurnDrive::User(fragment.text)).await?;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            tracing::warn!(error = %e, "transcription error");
                        }
                        None => break,
                    }
                }
            }
        }
        Ok(())
    }

    /// Run one model turn plus any activation turns a handoff queues up.
    pub async fn run_turn(&self, drive: TurnDrive) -> Result<()> {
        let mut next = Some(drive);
        while let Some(drive) = next.take() {
            next = self.run_single_turn(drive).await?;
        }
        Ok(())
    }

    async fn run_single_turn(&self, drive: TurnDrive) -> Result<Option<TurnDrive>> {
        match &drive {
            TurnDrive::User(text) | TurnDrive::SyntheticUser(text) => {
                self.history.lock().push(Message::user(text.clone()));
                self.commit_item(ConversationItem::user(text.clone()), None);
            }
            TurnDrive::Opening => {}
        }

        let agent = self.active_agent();
        let mut instructions = agent.definition().instructions.clone();
        if matches!(drive, TurnDrive::Opening) {
            instructions.push_str(
                "\nThe student just joined. Greet them briefly and ask what they would like to learn.",
            );
        }

        let mut request = ChatRequest::new(instructions)
            .with_messages(self.history.lock().clone())
            .with_tools(self.dispatcher.tool_definitions(agent.subject()));
        request.temperature = agent.definition().temperature;

        let stream = self.chat.chat_stream(request).await?;

        // Model text flows through the guarded sentence path while the
        // stream is still producing; tool calls are collected for dispatch
        // after the speech drains.
        let (text_tx, text_rx) = mpsc::channel::<String>(32);
        let tts = agent.tts_override().unwrap_or_else(|| self.tts.clone());
        let guarded = guard_sentences(
            agent.name().to_string(),
            self.ids(),
            ReceiverStream::new(text_rx),
            self.safety.clone(),
            tts,
            agent.synthesis_options(),
        );
        let room = self.room.clone();
        let playback = tokio::spawn(async move {
            futures::pin_mut!(guarded);
            let mut spoken = String::new();
            while let Some(result) = guarded.next().await {
                let sentence = result?;
                room.play(sentence.frames).await?;
                if !spoken.is_empty() {
                    spoken.push(' ');
                }
                spoken.push_str(&sentence.text);
            }
            Ok::<String, Error>(spoken)
        });

        let mut tool_calls: Vec<ToolCall> = Vec::new();
        futures::pin_mut!(stream);
        let mut stream_error = None;
        while let Some(event) = stream.next().await {
            match event {
                Ok(ChatEvent::TextDelta(delta)) => {
                    let _ = text_tx.send(delta).await;
                }
                Ok(ChatEvent::ToolCall(call)) => tool_calls.push(call),
                Ok(ChatEvent::Done) => break,
                Err(e) => {
                    stream_error = Some(e);
                    break;
                }
            }
        }
        drop(text_tx);
        let spoken = playback
            .await
            .map_err(|e| Error::Synthesis(e.to_string()))??;
        if let Some(e) = stream_error {
            return Err(e);
        }

        if !spoken.trim().is_empty() {
            self.history.lock().push(Message::assistant(spoken.clone()));
            self.commit_item(ConversationItem::assistant(spoken), None);
        }

        for call in tool_calls {
            let context = ToolContext {
                state: self.state.clone(),
                history: self.history.lock().clone(),
                room_name: self.room.room_name().to_string(),
            };
            // Snapshot before the dispatch mutates `speaking_agent`: a
            // returned transition sentence belongs to the outgoing agent.
            let outgoing = {
                let state = self.state.lock();
                state.speaking_agent.or(state.current_subject)
            };
            match self.dispatcher.dispatch(call, &context).await? {
                ToolOutcome::Handoff { agent, transition } => {
                    self.speak_and_commit(&transition, outgoing.map(|s| s.speaker()))
                        .await?;
                    let next = self.activate(agent);
                    return Ok(Some(next));
                }
                ToolOutcome::Spoken(text) => {
                    self.speak_and_commit(&text, outgoing.map(|s| s.speaker()))
                        .await?;
                }
                ToolOutcome::Quiet => {}
            }
        }

        Ok(None)
    }

    /// Speak one piece of tool-produced text through the guarded path and
    /// commit it with the given speaker attribution.
    async fn speak_and_commit(
        &self,
        text: &str,
        speaker_override: Option<Speaker>,
    ) -> Result<()> {
        let agent = self.active_agent();
        let tts = agent.tts_override().unwrap_or_else(|| self.tts.clone());
        let guarded = guard_sentences(
            agent.name().to_string(),
            self.ids(),
            futures::stream::iter(vec![text.to_string()]),
            self.safety.clone(),
            tts,
            agent.synthesis_options(),
        );
        futures::pin_mut!(guarded);
        let mut spoken = String::new();
        while let Some(result) = guarded.next().await {
            let sentence = result?;
            self.room.play(sentence.frames).await?;
            if !spoken.is_empty() {
                spoken.push(' ');
            }
            spoken.push_str(&sentence.text);
        }
        if !spoken.trim().is_empty() {
            self.history.lock().push(Message::assistant(spoken.clone()));
            self.commit_item(ConversationItem::assistant(spoken), speaker_override);
        }
        Ok(())
    }
}
