//! Per-room session state carried across agent handoffs
//!
//! One live instance exists per room. On the pipeline worker it is attached
//! to the session as userdata; the realtime worker reconstructs it from
//! dispatch metadata so both workers share one trace lineage.

use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::Arc;
use uuid::Uuid;

use crate::subject::Subject;

/// Session state shared by every agent in a room.
///
/// Mutated only from the owning session's event loop; the mutex makes the
/// spawned signal workers safe without cross-session sharing.
pub type SharedSession = Arc<Mutex<SessionState>>;

#[derive(Debug, Clone)]
pub struct SessionState {
    /// Stable for the life of the student's visit; survives worker-to-worker
    /// handoff via dispatch metadata.
    session_id: Uuid,
    pub student_identity: String,
    pub room_name: String,
    /// The routed-to subject.
    pub current_subject: Option<Subject>,
    /// The currently-speaking subject. Distinct from `current_subject` so a
    /// transition sentence is attributed to the outgoing agent.
    pub speaking_agent: Option<Subject>,
    /// Prior `current_subject` values, for diagnostic tracing.
    pub previous_subjects: Vec<Subject>,
    turn_number: u64,
    skip_next_user_turns: u32,
    escalated: bool,
    pub escalation_reason: Option<String>,
    /// Set when a user utterance is committed; consumed when computing
    /// end-to-end latency on the next assistant item.
    pub last_user_input_at: Option<Instant>,
    /// Question handed to a newly activated agent; consumed once on activation.
    pub pending_question: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl SessionState {
    /// Fresh session with a new id, starting on the classifier.
    pub fn new(student_identity: impl Into<String>, room_name: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4(), student_identity, room_name)
    }

    /// Session recovered from dispatch metadata, keeping the original id.
    pub fn with_id(
        session_id: Uuid,
        student_identity: impl Into<String>,
        room_name: impl Into<String>,
    ) -> Self {
        Self {
            session_id,
            student_identity: student_identity.into(),
            room_name: room_name.into(),
            current_subject: None,
            speaking_agent: None,
            previous_subjects: Vec::new(),
            turn_number: 0,
            skip_next_user_turns: 0,
            escalated: false,
            escalation_reason: None,
            last_user_input_at: None,
            pending_question: None,
            created_at: Utc::now(),
        }
    }

    pub fn shared(self) -> SharedSession {
        Arc::new(Mutex::new(self))
    }

    /// Immutable once assigned.
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Route to a new subject, recording the previous one.
    ///
    /// Routing to the subject already current is a no-op on
    /// `previous_subjects` (no duplicate push).
    pub fn route_to(&mut self, new_subject: Subject) {
        if self.current_subject == Some(new_subject) {
            return;
        }
        if let Some(prev) = self.current_subject {
            self.previous_subjects.push(prev);
        }
        self.current_subject = Some(new_subject);
    }

    /// Increment and return the committed-item count.
    pub fn advance_turn(&mut self) -> u64 {
        self.turn_number += 1;
        self.turn_number
    }

    pub fn turn_number(&self) -> u64 {
        self.turn_number
    }

    pub fn skip_next_user_turns(&self) -> u32 {
        self.skip_next_user_turns
    }

    /// Arm suppression of the next `n` user-role items.
    pub fn set_skip_next_user_turns(&mut self, n: u32) {
        self.skip_next_user_turns = n;
    }

    /// Consume one suppression credit. Returns true when the caller should
    /// drop the item. Decrements exactly once and never underflows.
    pub fn consume_user_turn_skip(&mut self) -> bool {
        if self.skip_next_user_turns > 0 {
            self.skip_next_user_turns -= 1;
            true
        } else {
            false
        }
    }

    /// Latch escalation. Returns false when the latch was already set;
    /// the latch never clears within a session.
    pub fn escalate(&mut self, reason: impl Into<String>) -> bool {
        if self.escalated {
            return false;
        }
        self.escalated = true;
        self.escalation_reason = Some(reason.into());
        true
    }

    pub fn is_escalated(&self) -> bool {
        self.escalated
    }

    /// Deduplicated set of every subject this session touched.
    pub fn subjects_covered(&self) -> BTreeSet<Subject> {
        let mut set: BTreeSet<Subject> = self.previous_subjects.iter().copied().collect();
        if let Some(current) = self.current_subject {
            set.insert(current);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> SessionState {
        SessionState::new("student-1", "room-1")
    }

    #[test]
    fn session_id_survives_recovery() {
        let original = state();
        let recovered = SessionState::with_id(original.session_id(), "student-1", "room-1");
        assert_eq!(original.session_id(), recovered.session_id());
    }

    #[test]
    fn route_to_records_previous_subject() {
        let mut s = state();
        s.route_to(Subject::Classifier);
        s.route_to(Subject::Math);
        s.route_to(Subject::History);
        assert_eq!(s.current_subject, Some(Subject::History));
        assert_eq!(
            s.previous_subjects,
            vec![Subject::Classifier, Subject::Math]
        );
    }

    #[test]
    fn route_to_same_subject_suppresses_duplicate_push() {
        let mut s = state();
        s.route_to(Subject::Math);
        s.route_to(Subject::Math);
        assert!(s.previous_subjects.is_empty());
        assert_eq!(s.current_subject, Some(Subject::Math));
    }

    #[test]
    fn skip_counter_never_underflows() {
        let mut s = state();
        assert!(!s.consume_user_turn_skip());
        s.set_skip_next_user_turns(1);
        assert!(s.consume_user_turn_skip());
        assert!(!s.consume_user_turn_skip());
        assert_eq!(s.skip_next_user_turns(), 0);
    }

    #[test]
    fn escalation_latch_is_monotonic() {
        let mut s = state();
        assert!(s.escalate("distress"));
        assert!(!s.escalate("again"));
        assert!(s.is_escalated());
        assert_eq!(s.escalation_reason.as_deref(), Some("distress"));
    }

    #[test]
    fn subjects_covered_deduplicates() {
        let mut s = state();
        s.route_to(Subject::Classifier);
        s.route_to(Subject::Math);
        s.route_to(Subject::Classifier);
        s.route_to(Subject::Math);
        let covered = s.subjects_covered();
        assert_eq!(covered.len(), 2);
        assert!(covered.contains(&Subject::Math));
    }

    #[test]
    fn advance_turn_is_monotonic() {
        let mut s = state();
        assert_eq!(s.advance_turn(), 1);
        assert_eq!(s.advance_turn(), 2);
        assert_eq!(s.turn_number(), 2);
    }
}
