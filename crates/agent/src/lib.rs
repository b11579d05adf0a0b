//! Agent framework: guarded agents and the pipeline session runtime
//!
//! Every text-path agent (classifier, math, history, and the degraded
//! English fallback) is a [`GuardedAgent`]: its synthesized text is buffered
//! at sentence boundaries and routed through the safety filter before any
//! audio is produced. The [`PipelineSession`] owns the
//! speech-to-text -> language-model -> text-to-speech loop for one room and
//! surfaces the runtime signals the worker subscribes to.

pub mod definitions;
pub mod guarded;
pub mod session;

pub use definitions::AgentDefinition;
pub use guarded::{guard_sentences, split_sentences, GuardedAgent, GuardedSentence, OwnedIds};
pub use session::{
    ItemEvent, PipelineSession, ToolContext, ToolDispatcher, ToolOutcome, TurnDrive,
};
