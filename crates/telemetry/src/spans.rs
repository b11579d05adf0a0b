//! Typed span emitters
//!
//! One function per span in the taxonomy; each creates and immediately
//! closes a `tracing` span carrying the mandatory attributes, so the
//! OpenTelemetry layer exports it with exact timing of the emission point.
//! Callers measure durations themselves and pass milliseconds.

use tutor_agent_config::constants::telemetry::SPAN_TEXT_MAX;

/// Session/user identity attached to every span.
#[derive(Debug, Clone, Copy)]
pub struct SessionIds<'a> {
    pub session_id: &'a str,
    pub user_id: &'a str,
}

/// Which worker flavor produced the span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionType {
    Pipeline,
    RealtimeEnglish,
}

impl SessionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionType::Pipeline => "pipeline",
            SessionType::RealtimeEnglish => "realtime_english",
        }
    }
}

/// Clip free-text attributes to the span limit, respecting char boundaries.
pub fn clip(text: &str) -> &str {
    if text.len() <= SPAN_TEXT_MAX {
        return text;
    }
    let mut end = SPAN_TEXT_MAX;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

pub fn session_start(ids: SessionIds<'_>, room_name: &str, session_type: SessionType, recovered: bool) {
    metrics::counter!("tutor_agent_sessions_started_total").increment(1);
    let _span = tracing::info_span!(
        "session.start",
        session_id = %ids.session_id,
        user_id = %ids.user_id,
        room_name = %room_name,
        session_type = session_type.as_str(),
        recovered,
    )
    .entered();
}

pub fn session_end(
    ids: SessionIds<'_>,
    session_type: SessionType,
    total_turns: u64,
    escalated: bool,
    subjects_covered: &str,
) {
    let _span = tracing::info_span!(
        "session.end",
        session_id = %ids.session_id,
        user_id = %ids.user_id,
        session_type = session_type.as_str(),
        total_turns,
        escalated,
        subjects_covered = %subjects_covered,
    )
    .entered();
}

pub fn agent_activated(ids: SessionIds<'_>, agent_name: &str) {
    let _span = tracing::info_span!(
        "agent.activated",
        session_id = %ids.session_id,
        user_id = %ids.user_id,
        agent_name = %agent_name,
    )
    .entered();
}

#[allow(clippy::too_many_arguments)]
pub fn routing_decision(
    ids: SessionIds<'_>,
    from_agent: &str,
    to_agent: &str,
    question_summary: &str,
    previous_subject: Option<&str>,
    decision_ms: u64,
    last_user_message: &str,
    history_length: usize,
) {
    metrics::counter!("tutor_agent_routing_decisions_total").increment(1);
    let _span = tracing::info_span!(
        "routing.decision",
        session_id = %ids.session_id,
        user_id = %ids.user_id,
        from_agent = %from_agent,
        to_agent = %to_agent,
        question_summary = %clip(question_summary),
        previous_subject = previous_subject.unwrap_or(""),
        decision_ms,
        last_user_message = %clip(last_user_message),
        history_length,
    )
    .entered();
}

pub fn conversation_item(
    ids: SessionIds<'_>,
    subject: Option<&str>,
    role: &str,
    session_type: SessionType,
    turn: u64,
    e2e_response_ms: Option<u64>,
) {
    let span = tracing::info_span!(
        "conversation.item",
        session_id = %ids.session_id,
        user_id = %ids.user_id,
        subject = subject.unwrap_or(""),
        role = %role,
        session_type = session_type.as_str(),
        turn,
        e2e_response_ms = tracing::field::Empty,
    );
    if let Some(ms) = e2e_response_ms {
        span.record("e2e_response_ms", ms);
    }
    let _entered = span.entered();
}

pub fn tts_sentence(
    ids: SessionIds<'_>,
    sentence_length: usize,
    guardrail_ms: u64,
    synthesis_ms: u64,
    was_rewritten: bool,
) {
    let _span = tracing::info_span!(
        "tts.sentence",
        session_id = %ids.session_id,
        user_id = %ids.user_id,
        sentence_length,
        guardrail_ms,
        synthesis_ms,
        was_rewritten,
    )
    .entered();
}

pub fn guardrail_check(
    ids: SessionIds<'_>,
    text_length: usize,
    flagged: bool,
    peak_score: f64,
    check_ms: u64,
) {
    let _span = tracing::info_span!(
        "guardrail.check",
        session_id = %ids.session_id,
        user_id = %ids.user_id,
        text_length,
        flagged,
        peak_score,
        check_ms,
    )
    .entered();
}

pub fn guardrail_rewrite(
    ids: SessionIds<'_>,
    original_length: usize,
    rewritten_length: usize,
    rewrite_ms: u64,
) {
    metrics::counter!("tutor_agent_guardrail_rewrites_total").increment(1);
    let _span = tracing::info_span!(
        "guardrail.rewrite",
        session_id = %ids.session_id,
        user_id = %ids.user_id,
        original_length,
        rewritten_length,
        rewrite_ms,
    )
    .entered();
}

pub fn teacher_escalation(
    ids: SessionIds<'_>,
    from_agent: &str,
    reason: &str,
    room_name: &str,
    turn_number: u64,
) {
    metrics::counter!("tutor_agent_escalations_total").increment(1);
    let _span = tracing::info_span!(
        "teacher.escalation",
        session_id = %ids.session_id,
        user_id = %ids.user_id,
        from_agent = %from_agent,
        reason = %clip(reason),
        room_name = %room_name,
        turn_number,
    )
    .entered();
}
