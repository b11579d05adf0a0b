//! Moderation category vocabulary
//!
//! Exactly thirteen categories; adding or removing one is a contract break
//! with the moderation endpoint and the `guardrail_events` store, caught by
//! the regression test below.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ModerationCategory {
    Harassment,
    HarassmentThreatening,
    Hate,
    HateThreatening,
    Sexual,
    SexualMinors,
    Violence,
    ViolenceGraphic,
    SelfHarm,
    SelfHarmIntent,
    SelfHarmInstructions,
    Illicit,
    IllicitViolent,
}

impl ModerationCategory {
    pub const ALL: [ModerationCategory; 13] = [
        ModerationCategory::Harassment,
        ModerationCategory::HarassmentThreatening,
        ModerationCategory::Hate,
        ModerationCategory::HateThreatening,
        ModerationCategory::Sexual,
        ModerationCategory::SexualMinors,
        ModerationCategory::Violence,
        ModerationCategory::ViolenceGraphic,
        ModerationCategory::SelfHarm,
        ModerationCategory::SelfHarmIntent,
        ModerationCategory::SelfHarmInstructions,
        ModerationCategory::Illicit,
        ModerationCategory::IllicitViolent,
    ];

    /// Key used by the moderation endpoint and stored in
    /// `guardrail_events.categories_flagged`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ModerationCategory::Harassment => "harassment",
            ModerationCategory::HarassmentThreatening => "harassment/threatening",
            ModerationCategory::Hate => "hate",
            ModerationCategory::HateThreatening => "hate/threatening",
            ModerationCategory::Sexual => "sexual",
            ModerationCategory::SexualMinors => "sexual/minors",
            ModerationCategory::Violence => "violence",
            ModerationCategory::ViolenceGraphic => "violence/graphic",
            ModerationCategory::SelfHarm => "self-harm",
            ModerationCategory::SelfHarmIntent => "self-harm/intent",
            ModerationCategory::SelfHarmInstructions => "self-harm/instructions",
            ModerationCategory::Illicit => "illicit",
            ModerationCategory::IllicitViolent => "illicit/violent",
        }
    }

    pub fn parse(key: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.as_str() == key)
    }
}

impl std::fmt::Display for ModerationCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vocabulary_is_exactly_thirteen() {
        assert_eq!(ModerationCategory::ALL.len(), 13);
        let unique: std::collections::BTreeSet<_> =
            ModerationCategory::ALL.iter().map(|c| c.as_str()).collect();
        assert_eq!(unique.len(), 13);
    }

    #[test]
    fn keys_round_trip() {
        for category in ModerationCategory::ALL {
            assert_eq!(ModerationCategory::parse(category.as_str()), Some(category));
        }
        assert_eq!(ModerationCategory::parse("profanity"), None);
    }
}
