//! The two-stage check-and-possibly-rewrite filter

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};

use tutor_agent_core::Result;
use tutor_agent_telemetry::{spans, SessionIds};

use crate::moderation::{ModerationApi, ModerationVerdict};
use crate::rewriter::{RewriteApi, FALLBACK_SENTENCE};

/// Audit record written whenever a sentence is rewritten.
#[derive(Debug, Clone)]
pub struct GuardrailEvent {
    pub session_id: String,
    pub agent_name: String,
    pub original_text: String,
    pub rewritten_text: String,
    pub categories_flagged: Vec<String>,
    pub peak_score: f64,
    pub occurred_at: DateTime<Utc>,
}

/// Fire-and-forget audit sink. Implementations must schedule their own I/O
/// and return immediately; the speech path never awaits the audit trail.
pub trait GuardrailAuditSink: Send + Sync {
    fn record(&self, event: GuardrailEvent);
}

/// Result of `check_and_rewrite`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafeText {
    pub text: String,
    pub rewritten: bool,
}

/// Per-sentence safety filter.
///
/// Stateless per request; one instance is shared across every session in a
/// worker process.
pub struct SafetyFilter {
    moderation: Arc<dyn ModerationApi>,
    rewriter: Arc<dyn RewriteApi>,
    audit: Option<Arc<dyn GuardrailAuditSink>>,
}

impl SafetyFilter {
    pub fn new(moderation: Arc<dyn ModerationApi>, rewriter: Arc<dyn RewriteApi>) -> Self {
        Self {
            moderation,
            rewriter,
            audit: None,
        }
    }

    pub fn with_audit(mut self, audit: Arc<dyn GuardrailAuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Moderate one unit of text. Fails open: an unreachable moderation
    /// endpoint yields a not-flagged verdict so speech continues.
    pub async fn check(&self, text: &str, ids: SessionIds<'_>) -> ModerationVerdict {
        let started = Instant::now();
        let verdict = match self.moderation.moderate(text).await {
            Ok(verdict) => verdict,
            Err(e) => {
                tracing::warn!(error = %e, "moderation failed, treating as not flagged");
                ModerationVerdict::default()
            }
        };
        spans::guardrail_check(
            ids,
            text.chars().count(),
            verdict.flagged,
            verdict.peak_score,
            started.elapsed().as_millis() as u64,
        );
        verdict
    }

    /// Rewrite flagged text; any rewriter error yields the fixed fallback.
    pub async fn rewrite(&self, text: &str, ids: SessionIds<'_>) -> String {
        let started = Instant::now();
        let rewritten = match self.rewriter.rewrite(text).await {
            Ok(rewritten) => rewritten,
            Err(e) => {
                tracing::warn!(error = %e, "rewrite failed, using fallback sentence");
                FALLBACK_SENTENCE.to_string()
            }
        };
        spans::guardrail_rewrite(
            ids,
            text.chars().count(),
            rewritten.chars().count(),
            started.elapsed().as_millis() as u64,
        );
        rewritten
    }

    /// Full pipeline: check, rewrite when flagged, audit the rewrite.
    pub async fn check_and_rewrite(
        &self,
        text: &str,
        ids: SessionIds<'_>,
        agent_name: &str,
    ) -> SafeText {
        let verdict = self.check(text, ids).await;
        if !verdict.flagged {
            return SafeText {
                text: text.to_string(),
                rewritten: false,
            };
        }

        tracing::info!(
            agent = agent_name,
            categories = ?verdict.categories,
            peak_score = verdict.peak_score,
            "sentence flagged, rewriting"
        );
        let rewritten = self.rewrite(text, ids).await;

        if let Some(audit) = &self.audit {
            audit.record(GuardrailEvent {
                session_id: ids.session_id.to_string(),
                agent_name: agent_name.to_string(),
                original_text: text.to_string(),
                rewritten_text: rewritten.clone(),
                categories_flagged: verdict
                    .categories
                    .iter()
                    .map(|c| c.as_str().to_string())
                    .collect(),
                peak_score: verdict.peak_score,
                occurred_at: Utc::now(),
            });
        }

        SafeText {
            text: rewritten,
            rewritten: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::BTreeSet;
    use tutor_agent_core::Error;

    use crate::categories::ModerationCategory;

    struct StaticModeration {
        verdict: Option<ModerationVerdict>,
    }

    #[async_trait]
    impl ModerationApi for StaticModeration {
        async fn moderate(&self, _text: &str) -> tutor_agent_core::Result<ModerationVerdict> {
            self.verdict
                .clone()
                .ok_or_else(|| Error::Moderation("down".to_string()))
        }
    }

    struct StaticRewriter {
        reply: Option<String>,
    }

    #[async_trait]
    impl RewriteApi for StaticRewriter {
        async fn rewrite(&self, _text: &str) -> tutor_agent_core::Result<String> {
            self.reply
                .clone()
                .ok_or_else(|| Error::Rewrite("down".to_string()))
        }
    }

    #[derive(Default)]
    struct RecordingAudit {
        events: Mutex<Vec<GuardrailEvent>>,
    }

    impl GuardrailAuditSink for RecordingAudit {
        fn record(&self, event: GuardrailEvent) {
            self.events.lock().push(event);
        }
    }

    fn ids() -> SessionIds<'static> {
        SessionIds {
            session_id: "s-1",
            user_id: "u-1",
        }
    }

    fn flagged_verdict() -> ModerationVerdict {
        let mut categories = BTreeSet::new();
        categories.insert(ModerationCategory::Harassment);
        ModerationVerdict {
            flagged: true,
            categories,
            peak_score: 0.97,
        }
    }

    fn filter(
        verdict: Option<ModerationVerdict>,
        reply: Option<String>,
        audit: Arc<RecordingAudit>,
    ) -> SafetyFilter {
        SafetyFilter::new(
            Arc::new(StaticModeration { verdict }),
            Arc::new(StaticRewriter { reply }),
        )
        .with_audit(audit)
    }

    #[tokio::test]
    async fn clean_text_passes_through_without_audit() {
        let audit = Arc::new(RecordingAudit::default());
        let filter = filter(
            Some(ModerationVerdict::default()),
            Some("unused".to_string()),
            audit.clone(),
        );

        let safe = filter.check_and_rewrite("What is 7 times 8?", ids(), "math").await;
        assert_eq!(safe.text, "What is 7 times 8?");
        assert!(!safe.rewritten);
        assert!(audit.events.lock().is_empty());
    }

    #[tokio::test]
    async fn flagged_text_is_rewritten_and_audited_once() {
        let audit = Arc::new(RecordingAudit::default());
        let filter = filter(
            Some(flagged_verdict()),
            Some("Let's be kind to each other.".to_string()),
            audit.clone(),
        );

        let safe = filter
            .check_and_rewrite("I hate you, you are worthless and stupid.", ids(), "math")
            .await;
        assert!(safe.rewritten);
        assert_eq!(safe.text, "Let's be kind to each other.");

        let events = audit.events.lock();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].agent_name, "math");
        assert_eq!(events[0].categories_flagged, vec!["harassment".to_string()]);
        assert!((events[0].peak_score - 0.97).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn rewriter_failure_falls_back_and_still_audits() {
        let audit = Arc::new(RecordingAudit::default());
        let filter = filter(Some(flagged_verdict()), None, audit.clone());

        let safe = filter.check_and_rewrite("flagged text", ids(), "history").await;
        assert!(safe.rewritten);
        assert_eq!(safe.text, FALLBACK_SENTENCE);
        assert_eq!(audit.events.lock().len(), 1);
    }

    /// Content-sensitive moderation double: flags only text containing the
    /// trigger, so a rewrite can be re-checked.
    struct TriggerModeration {
        trigger: &'static str,
    }

    #[async_trait]
    impl ModerationApi for TriggerModeration {
        async fn moderate(&self, text: &str) -> tutor_agent_core::Result<ModerationVerdict> {
            if text.contains(self.trigger) {
                Ok(flagged_verdict())
            } else {
                Ok(ModerationVerdict::default())
            }
        }
    }

    #[tokio::test]
    async fn rewritten_text_passes_a_second_check() {
        let audit = Arc::new(RecordingAudit::default());
        let filter = SafetyFilter::new(
            Arc::new(TriggerModeration { trigger: "worthless" }),
            Arc::new(StaticRewriter {
                reply: Some("Everyone has something to offer.".to_string()),
            }),
        )
        .with_audit(audit.clone());

        let safe = filter
            .check_and_rewrite("I hate you, you are worthless and stupid.", ids(), "math")
            .await;
        assert!(safe.rewritten);

        let second = filter.check(&safe.text, ids()).await;
        assert!(!second.flagged);
        assert_eq!(audit.events.lock().len(), 1);
    }

    #[tokio::test]
    async fn moderation_failure_fails_open() {
        let audit = Arc::new(RecordingAudit::default());
        let filter = filter(None, Some("unused".to_string()), audit.clone());

        let safe = filter.check_and_rewrite("anything", ids(), "math").await;
        assert!(!safe.rewritten);
        assert_eq!(safe.text, "anything");
        assert!(audit.events.lock().is_empty());
    }
}
