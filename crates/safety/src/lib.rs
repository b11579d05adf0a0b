//! Per-sentence content safety pipeline
//!
//! Two stages: a moderation check over the fixed 13-category vocabulary,
//! then — only for flagged text — an age-appropriate rewrite by a small
//! language model. Every rewrite produces an audit record, written
//! fire-and-forget so the speech path never blocks on it.
//!
//! Failure semantics: moderation failure is treated as not flagged
//! (fail-open); rewriter failure returns a fixed fallback sentence and
//! still audits.

pub mod categories;
pub mod clients;
pub mod filter;
pub mod moderation;
pub mod rewriter;

pub use categories::ModerationCategory;
pub use clients::{moderation_client, reset_shared_clients, rewriter_client};
pub use filter::{GuardrailAuditSink, GuardrailEvent, SafeText, SafetyFilter};
pub use moderation::{HttpModerationClient, ModerationApi, ModerationVerdict};
pub use rewriter::{HttpRewriteClient, RewriteApi, FALLBACK_SENTENCE, REWRITE_DIRECTIVE};
