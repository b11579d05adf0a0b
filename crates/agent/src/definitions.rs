//! Subject agent definitions
//!
//! One definition per agent: name, system instructions, voice, and
//! temperature. Instructions describe the routing tools in prose; the tool
//! schemas themselves come from the routing controller.

use tutor_agent_core::Subject;

/// Static description of an agent.
#[derive(Debug, Clone)]
pub struct AgentDefinition {
    pub subject: Subject,
    pub name: String,
    pub instructions: String,
    pub voice: String,
    pub temperature: f32,
}

impl AgentDefinition {
    /// The classifier every fresh pipeline session starts with.
    pub fn classifier() -> Self {
        Self {
            subject: Subject::Classifier,
            name: Subject::Classifier.agent_name().to_string(),
            instructions: CLASSIFIER_INSTRUCTIONS.to_string(),
            voice: "alloy".to_string(),
            temperature: 0.5,
        }
    }

    pub fn math() -> Self {
        Self {
            subject: Subject::Math,
            name: Subject::Math.agent_name().to_string(),
            instructions: MATH_INSTRUCTIONS.to_string(),
            voice: "echo".to_string(),
            temperature: 0.4,
        }
    }

    pub fn history() -> Self {
        Self {
            subject: Subject::History,
            name: Subject::History.agent_name().to_string(),
            instructions: HISTORY_INSTRUCTIONS.to_string(),
            voice: "fable".to_string(),
            temperature: 0.6,
        }
    }

    /// Text-path English tutor used when the realtime dispatch fails.
    pub fn english_fallback() -> Self {
        Self {
            subject: Subject::English,
            name: Subject::English.agent_name().to_string(),
            instructions: ENGLISH_INSTRUCTIONS.to_string(),
            voice: "nova".to_string(),
            temperature: 0.6,
        }
    }

    pub fn for_subject(subject: Subject) -> Self {
        match subject {
            Subject::Classifier => Self::classifier(),
            Subject::Math => Self::math(),
            Subject::History => Self::history(),
            Subject::English => Self::english_fallback(),
        }
    }

    /// Instructions for the audio-native English specialist. Carried on the
    /// agent side of the realtime connection; includes an in-band safety
    /// directive because per-sentence interception cannot apply there.
    pub fn english_realtime_instructions() -> String {
        format!("{ENGLISH_INSTRUCTIONS}\n{REALTIME_SAFETY_DIRECTIVE}")
    }
}

const CLASSIFIER_INSTRUCTIONS: &str = "You are the guide of a tutoring room. Greet the student, find out what they \
want to learn, and hand them to the right tutor. For arithmetic, algebra, or \
geometry questions call route_to_math. For questions about the past, people, \
or places call route_to_history. For grammar, vocabulary, or writing \
questions call route_to_english. If the student sounds distressed or asks \
for a real person, call escalate_to_teacher with a short reason. Do not try \
to answer subject questions yourself.\n\
You are speaking out loud with a student aged 8 to 16. Keep every reply \
short, warm, and simple enough to follow by ear. Never discuss anything \
inappropriate for school.";

const MATH_INSTRUCTIONS: &str = "You are the Mathematics tutor. Work through problems step by step and check \
the student's understanding as you go. If the student asks about history \
call route_to_history directly; for grammar or vocabulary call \
route_to_english; for anything else off-topic call \
route_back_to_orchestrator with a short reason. If the student sounds \
distressed call escalate_to_teacher.\n\
You are speaking out loud with a student aged 8 to 16. Keep every reply \
short, warm, and simple enough to follow by ear. Never discuss anything \
inappropriate for school.";

const HISTORY_INSTRUCTIONS: &str = "You are the History tutor. Tell the story behind events and connect them to \
what the student already knows. If the student asks a math question call \
route_to_math directly; for grammar or vocabulary call route_to_english; for \
anything else off-topic call route_back_to_orchestrator with a short reason. \
If the student sounds distressed call escalate_to_teacher.\n\
You are speaking out loud with a student aged 8 to 16. Keep every reply \
short, warm, and simple enough to follow by ear. Never discuss anything \
inappropriate for school.";

const ENGLISH_INSTRUCTIONS: &str = "You are the English tutor. Explain grammar and vocabulary with short, vivid \
examples and invite the student to try one themselves. If the student moves \
to a different subject call route_back_to_orchestrator with a short reason.\n\
You are speaking out loud with a student aged 8 to 16. Keep every reply \
short, warm, and simple enough to follow by ear. Never discuss anything \
inappropriate for school.";

const REALTIME_SAFETY_DIRECTIVE: &str = "Everything you say is spoken directly to the student without review. Refuse \
gently and change the subject if a topic is not appropriate for a classroom.";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_subject_has_a_definition() {
        for subject in [
            Subject::Classifier,
            Subject::Math,
            Subject::History,
            Subject::English,
        ] {
            let definition = AgentDefinition::for_subject(subject);
            assert_eq!(definition.subject, subject);
            assert!(!definition.instructions.is_empty());
            assert!(!definition.voice.is_empty());
        }
    }

    #[test]
    fn classifier_name_is_orchestrator() {
        assert_eq!(AgentDefinition::classifier().name, "orchestrator");
    }

    #[test]
    fn realtime_instructions_carry_safety_directive() {
        let instructions = AgentDefinition::english_realtime_instructions();
        assert!(instructions.contains("without review"));
    }
}
