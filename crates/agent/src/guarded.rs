//! Guarded agent base
//!
//! Synthesized text is buffered until the trimmed buffer ends in a sentence
//! terminator, flushed through the safety filter, and only then handed to
//! synthesis. Partial sentences never reach synthesis except at stream end.

use std::sync::Arc;
use std::time::Instant;

use futures::{Stream, StreamExt};
use parking_lot::Mutex;

use tutor_agent_core::{AudioFrame, Result, SpeechSynthesis, Subject, SynthesisOptions};
use tutor_agent_safety::SafetyFilter;
use tutor_agent_telemetry::{spans, SessionIds};

use crate::definitions::AgentDefinition;

/// Sentence terminators recognized by the buffer.
const TERMINATORS: [char; 5] = ['.', '!', '?', ':', ';'];

/// Owned session/user identity, for handing into `'static` streams.
#[derive(Debug, Clone)]
pub struct OwnedIds {
    pub session_id: String,
    pub user_id: String,
}

impl OwnedIds {
    pub fn as_ids(&self) -> SessionIds<'_> {
        SessionIds {
            session_id: &self.session_id,
            user_id: &self.user_id,
        }
    }
}

/// Split every complete sentence out of `buffer`, leaving the remainder.
///
/// A sentence is complete at each terminator; trailing quotes and brackets
/// stay attached to the sentence they close.
pub fn split_sentences(buffer: &mut String) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let chars: Vec<char> = buffer.chars().collect();

    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        current.push(c);
        i += 1;
        if TERMINATORS.contains(&c) {
            while i < chars.len() && matches!(chars[i], '"' | '\'' | ')' | ']' | '\u{2019}') {
                current.push(chars[i]);
                i += 1;
            }
            let sentence = current.trim().to_string();
            if !sentence.is_empty() {
                sentences.push(sentence);
            }
            current.clear();
        }
    }
    *buffer = current;
    sentences
}

/// One safety-checked sentence with its synthesized audio.
#[derive(Debug)]
pub struct GuardedSentence {
    pub text: String,
    pub rewritten: bool,
    pub frames: Vec<AudioFrame>,
}

/// Buffer a stream of text chunks at sentence boundaries, flush each
/// sentence through the safety filter, synthesize the safe text, and yield
/// the result. The final partial buffer is flushed on stream close.
pub fn guard_sentences<S>(
    agent_name: String,
    ids: OwnedIds,
    text: S,
    safety: Arc<SafetyFilter>,
    tts: Arc<dyn SpeechSynthesis>,
    options: SynthesisOptions,
) -> impl Stream<Item = Result<GuardedSentence>> + Send
where
    S: Stream<Item = String> + Send + 'static,
{
    async_stream::stream! {
        futures::pin_mut!(text);
        let mut buffer = String::new();

        while let Some(chunk) = text.next().await {
            buffer.push_str(&chunk);
            for sentence in split_sentences(&mut buffer) {
                yield flush_sentence(&agent_name, &ids, sentence, &safety, &tts, &options).await;
            }
        }

        let tail = buffer.trim().to_string();
        if !tail.is_empty() {
            yield flush_sentence(&agent_name, &ids, tail, &safety, &tts, &options).await;
        }
    }
}

async fn flush_sentence(
    agent_name: &str,
    ids: &OwnedIds,
    sentence: String,
    safety: &Arc<SafetyFilter>,
    tts: &Arc<dyn SpeechSynthesis>,
    options: &SynthesisOptions,
) -> Result<GuardedSentence> {
    let guard_started = Instant::now();
    let safe = safety
        .check_and_rewrite(&sentence, ids.as_ids(), agent_name)
        .await;
    let guardrail_ms = guard_started.elapsed().as_millis() as u64;

    let synthesis_started = Instant::now();
    let frames = tts.synthesize(&safe.text, options).await?;
    let synthesis_ms = synthesis_started.elapsed().as_millis() as u64;

    spans::tts_sentence(
        ids.as_ids(),
        safe.text.chars().count(),
        guardrail_ms,
        synthesis_ms,
        safe.rewritten,
    );

    Ok(GuardedSentence {
        text: safe.text,
        rewritten: safe.rewritten,
        frames,
    })
}

/// A text-path agent whose speech is safety-intercepted.
pub struct GuardedAgent {
    definition: AgentDefinition,
    /// Synthesis override; the session's shared engine is used when unset.
    tts_override: Option<Arc<dyn SpeechSynthesis>>,
    /// Question handed over on activation; consumed exactly once.
    pending_question: Mutex<Option<String>>,
}

impl GuardedAgent {
    pub fn new(definition: AgentDefinition) -> Self {
        Self {
            definition,
            tts_override: None,
            pending_question: Mutex::new(None),
        }
    }

    pub fn with_tts_override(mut self, tts: Arc<dyn SpeechSynthesis>) -> Self {
        self.tts_override = Some(tts);
        self
    }

    pub fn with_pending_question(self, question: impl Into<String>) -> Self {
        *self.pending_question.lock() = Some(question.into());
        self
    }

    pub fn definition(&self) -> &AgentDefinition {
        &self.definition
    }

    pub fn subject(&self) -> Subject {
        self.definition.subject
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn synthesis_options(&self) -> SynthesisOptions {
        SynthesisOptions {
            voice: self.definition.voice.clone(),
            speed: 1.0,
        }
    }

    pub fn tts_override(&self) -> Option<Arc<dyn SpeechSynthesis>> {
        self.tts_override.clone()
    }

    pub fn set_pending_question(&self, question: Option<String>) {
        *self.pending_question.lock() = question;
    }

    /// Activation hook half one: emit the `agent.activated` span. The
    /// session then drives the model with [`take_pending_question`].
    ///
    /// [`take_pending_question`]: GuardedAgent::take_pending_question
    pub fn activate(&self, ids: SessionIds<'_>) {
        spans::agent_activated(ids, &self.definition.name);
    }

    /// Consume the pending question, if any.
    pub fn take_pending_question(&self) -> Option<String> {
        self.pending_question.lock().take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::BTreeSet;
    use tutor_agent_safety::{ModerationApi, ModerationCategory, ModerationVerdict, RewriteApi};

    fn collect(buffer: &str) -> (Vec<String>, String) {
        let mut owned = buffer.to_string();
        let sentences = split_sentences(&mut owned);
        (sentences, owned)
    }

    #[test]
    fn one_flush_per_terminator() {
        let (sentences, rest) = collect("Hello. World!");
        assert_eq!(sentences, vec!["Hello.", "World!"]);
        assert!(rest.is_empty());
    }

    #[test]
    fn partial_sentence_stays_buffered() {
        let (sentences, rest) = collect("Seven times eight is");
        assert!(sentences.is_empty());
        assert_eq!(rest, "Seven times eight is");
    }

    #[test]
    fn all_five_terminators_flush() {
        let (sentences, _) = collect("a. b! c? d: e;");
        assert_eq!(sentences.len(), 5);
    }

    #[test]
    fn closing_quote_stays_with_sentence() {
        let (sentences, rest) = collect("She said \"hi.\" Then");
        assert_eq!(sentences, vec!["She said \"hi.\""]);
        assert_eq!(rest.trim(), "Then");
    }

    // Safety/TTS doubles for the interception tests.

    struct ScriptedModeration {
        flag_containing: &'static str,
    }

    #[async_trait]
    impl ModerationApi for ScriptedModeration {
        async fn moderate(&self, text: &str) -> tutor_agent_core::Result<ModerationVerdict> {
            if !self.flag_containing.is_empty() && text.contains(self.flag_containing) {
                let mut categories = BTreeSet::new();
                categories.insert(ModerationCategory::Harassment);
                Ok(ModerationVerdict {
                    flagged: true,
                    categories,
                    peak_score: 0.95,
                })
            } else {
                Ok(ModerationVerdict::default())
            }
        }
    }

    struct CannedRewriter;

    #[async_trait]
    impl RewriteApi for CannedRewriter {
        async fn rewrite(&self, _text: &str) -> tutor_agent_core::Result<String> {
            Ok("Let's be kind.".to_string())
        }
    }

    #[derive(Default)]
    struct RecordingTts {
        texts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl SpeechSynthesis for RecordingTts {
        async fn synthesize(
            &self,
            text: &str,
            _options: &SynthesisOptions,
        ) -> tutor_agent_core::Result<Vec<AudioFrame>> {
            self.texts.lock().push(text.to_string());
            Ok(vec![AudioFrame::new(vec![0u8; 4], 24_000)])
        }
    }

    fn ids() -> OwnedIds {
        OwnedIds {
            session_id: "s-1".to_string(),
            user_id: "u-1".to_string(),
        }
    }

    async fn run_guard(
        chunks: Vec<&str>,
        flag_containing: &'static str,
    ) -> (Vec<GuardedSentence>, Arc<RecordingTts>) {
        let safety = Arc::new(SafetyFilter::new(
            Arc::new(ScriptedModeration { flag_containing }),
            Arc::new(CannedRewriter),
        ));
        let tts = Arc::new(RecordingTts::default());
        let text = futures::stream::iter(
            chunks.into_iter().map(|s| s.to_string()).collect::<Vec<_>>(),
        );
        let guarded = guard_sentences(
            "math".to_string(),
            ids(),
            text,
            safety,
            tts.clone(),
            SynthesisOptions::default(),
        );
        futures::pin_mut!(guarded);
        let mut sentences = Vec::new();
        while let Some(result) = guarded.next().await {
            sentences.push(result.unwrap());
        }
        (sentences, tts)
    }

    #[tokio::test]
    async fn multi_terminator_chunk_produces_ordered_flushes() {
        let (sentences, tts) = run_guard(vec!["Hello. World!"], "").await;
        let texts: Vec<_> = sentences.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["Hello.", "World!"]);
        assert_eq!(*tts.texts.lock(), vec!["Hello.", "World!"]);
    }

    #[tokio::test]
    async fn no_terminator_flushes_once_on_close() {
        let (sentences, _) = run_guard(vec!["fifty", "-six"], "").await;
        assert_eq!(sentences.len(), 1);
        assert_eq!(sentences[0].text, "fifty-six");
    }

    #[tokio::test]
    async fn whitespace_tail_is_not_flushed() {
        let (sentences, _) = run_guard(vec!["Done.", "   "], "").await;
        assert_eq!(sentences.len(), 1);
    }

    #[tokio::test]
    async fn flagged_sentence_reaches_synthesis_rewritten() {
        let (sentences, tts) =
            run_guard(vec!["I hate you, you are worthless and stupid."], "worthless").await;
        assert_eq!(sentences.len(), 1);
        assert!(sentences[0].rewritten);
        assert_eq!(sentences[0].text, "Let's be kind.");
        // Only the rewritten text ever reached the synthesis path.
        assert_eq!(*tts.texts.lock(), vec!["Let's be kind."]);
    }

    #[tokio::test]
    async fn pending_question_is_consumed_once() {
        let agent =
            GuardedAgent::new(AgentDefinition::math()).with_pending_question("seven times eight");
        assert_eq!(
            agent.take_pending_question().as_deref(),
            Some("seven times eight")
        );
        assert!(agent.take_pending_question().is_none());
    }
}
