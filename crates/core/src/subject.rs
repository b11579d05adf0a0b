//! Subject and speaker vocabulary for the tutoring room

use serde::{Deserialize, Serialize};

/// Subject area an agent is responsible for.
///
/// `Classifier` is the routing agent every fresh session starts with; the
/// three specialists cover the tutored subjects. The wire form (transcript
/// events, dispatch metadata) uses the lowercase names from [`as_str`].
///
/// [`as_str`]: Subject::as_str
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Subject {
    Classifier,
    Math,
    History,
    English,
}

impl Subject {
    /// Wire name, also used as the `subject` attribute on spans and rows.
    pub fn as_str(&self) -> &'static str {
        match self {
            Subject::Classifier => "classifier",
            Subject::Math => "math",
            Subject::History => "history",
            Subject::English => "english",
        }
    }

    /// Display name of the agent in telemetry (`from`/`to` on routing spans).
    ///
    /// The classifier is surfaced as `orchestrator` in spans, matching the
    /// worker it runs on; transcript events keep the `classifier` speaker.
    pub fn agent_name(&self) -> &'static str {
        match self {
            Subject::Classifier => "orchestrator",
            Subject::Math => "math",
            Subject::History => "history",
            Subject::English => "english",
        }
    }

    /// The transcript speaker for an assistant item produced by this agent.
    pub fn speaker(&self) -> Speaker {
        match self {
            Subject::Classifier => Speaker::Classifier,
            Subject::Math => Speaker::Math,
            Subject::History => Speaker::History,
            Subject::English => Speaker::English,
        }
    }

    /// Tolerant parse of the wire name. Unknown strings yield `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "classifier" | "orchestrator" => Some(Subject::Classifier),
            "math" | "mathematics" => Some(Subject::Math),
            "history" => Some(Subject::History),
            "english" => Some(Subject::English),
            _ => None,
        }
    }
}

impl std::fmt::Display for Subject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Speaker attribution on a transcript item.
///
/// Fixed vocabulary of the transcript data-channel contract:
/// `student | classifier | math | history | english | teacher`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    Student,
    Classifier,
    Math,
    History,
    English,
    Teacher,
}

impl Speaker {
    pub fn as_str(&self) -> &'static str {
        match self {
            Speaker::Student => "student",
            Speaker::Classifier => "classifier",
            Speaker::Math => "math",
            Speaker::History => "history",
            Speaker::English => "english",
            Speaker::Teacher => "teacher",
        }
    }
}

impl std::fmt::Display for Speaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_round_trip() {
        for subject in [
            Subject::Classifier,
            Subject::Math,
            Subject::History,
            Subject::English,
        ] {
            assert_eq!(Subject::parse(subject.as_str()), Some(subject));
        }
        assert_eq!(Subject::parse("orchestrator"), Some(Subject::Classifier));
        assert_eq!(Subject::parse("biology"), None);
    }

    #[test]
    fn serde_uses_snake_case() {
        assert_eq!(
            serde_json::to_string(&Subject::Math).unwrap(),
            "\"math\""
        );
        assert_eq!(
            serde_json::to_string(&Speaker::Student).unwrap(),
            "\"student\""
        );
    }
}
