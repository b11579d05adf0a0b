//! Sealed routing-tool table

use tutor_agent_core::{Subject, ToolCall, ToolDefinition};

/// The five routing operations, with their typed argument records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutingTool {
    RouteToMath { question_summary: String },
    RouteToHistory { question_summary: String },
    RouteToEnglish { question_summary: String },
    RouteBackToOrchestrator { reason: String },
    EscalateToTeacher { reason: String },
}

impl RoutingTool {
    /// Reify a model tool call. Unknown names yield `None`; missing
    /// arguments read as empty strings (the models rephrase freely).
    pub fn parse(call: &ToolCall) -> Option<Self> {
        match call.name.as_str() {
            "route_to_math" => Some(RoutingTool::RouteToMath {
                question_summary: call.str_arg("question_summary"),
            }),
            "route_to_history" => Some(RoutingTool::RouteToHistory {
                question_summary: call.str_arg("question_summary"),
            }),
            "route_to_english" => Some(RoutingTool::RouteToEnglish {
                question_summary: call.str_arg("question_summary"),
            }),
            "route_back_to_orchestrator" => Some(RoutingTool::RouteBackToOrchestrator {
                reason: call.str_arg("reason"),
            }),
            "escalate_to_teacher" => Some(RoutingTool::EscalateToTeacher {
                reason: call.str_arg("reason"),
            }),
            _ => None,
        }
    }

    /// Tools exposed to the given subject's agent.
    ///
    /// Specialists can cross-route to each other directly, without a
    /// classifier round-trip; everyone can escalate.
    pub fn definitions_for(subject: Subject) -> Vec<ToolDefinition> {
        let mut tools = Vec::new();
        if subject != Subject::Math {
            tools.push(summary_tool(
                "route_to_math",
                "Hand the student to the Mathematics tutor",
            ));
        }
        if subject != Subject::History {
            tools.push(summary_tool(
                "route_to_history",
                "Hand the student to the History tutor",
            ));
        }
        if subject != Subject::English {
            tools.push(summary_tool(
                "route_to_english",
                "Hand the student to the English tutor",
            ));
        }
        if subject != Subject::Classifier {
            tools.push(reason_tool(
                "route_back_to_orchestrator",
                "Hand the student back to the guide when the question is off-topic",
            ));
        }
        tools.push(reason_tool(
            "escalate_to_teacher",
            "Ask a human teacher to join when the student is distressed or asks for a person",
        ));
        tools
    }
}

fn summary_tool(name: &str, description: &str) -> ToolDefinition {
    ToolDefinition {
        name: name.to_string(),
        description: description.to_string(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "question_summary": {
                    "type": "string",
                    "description": "Short summary of what the student asked",
                },
            },
            "required": ["question_summary"],
        }),
    }
}

fn reason_tool(name: &str, description: &str) -> ToolDefinition {
    ToolDefinition {
        name: name.to_string(),
        description: description.to_string(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "reason": {
                    "type": "string",
                    "description": "Short reason",
                },
            },
            "required": ["reason"],
        }),
    }
}
