use serde::Serialize;
use serde_json::Value;

use crate::message::{
    PRESENT_FILES_TOOL, SUBAGENT_TOOL, extract_reasoning_content, find_tool_call_result,
};
use crate::model::{Message, ToolCall};

const THINKING_LABEL: &str = "Thinking";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ToolResult {
    Json(Value),
    Text(String),
}

impl ToolResult {
    fn decode(raw: String) -> Self {
        match serde_json::from_str::<Value>(&raw) {
            Ok(value) => Self::Json(value),
            Err(_) => Self::Text(raw),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CotStep {
    Reasoning {
        id: Option<String>,
        message_id: Option<String>,
        reasoning: String,
    },
    ToolCall {
        id: Option<String>,
        message_id: Option<String>,
        name: String,
        args: Value,
        result: Option<ToolResult>,
    },
}

impl CotStep {
    pub fn is_tool_call(&self) -> bool {
        matches!(self, Self::ToolCall { .. })
    }

    pub fn is_reasoning(&self) -> bool {
        matches!(self, Self::Reasoning { .. })
    }
}

pub fn convert_to_steps(messages: &[&Message]) -> Vec<CotStep> {
    let mut steps = Vec::new();

    for message in messages {
        let Some(ai) = message.as_ai() else {
            continue;
        };

        if let Some(reasoning) = extract_reasoning_content(message).filter(|r| !r.is_empty()) {
            steps.push(CotStep::Reasoning {
                id: ai.id.clone(),
                message_id: ai.id.clone(),
                reasoning: reasoning.to_string(),
            });
        }

        for call in ai.tool_calls.iter().filter(|call| call.name != SUBAGENT_TOOL) {
            let result = call
                .id
                .as_deref()
                .and_then(|id| find_tool_call_result(id, messages.iter().copied()))
                .map(ToolResult::decode);

            steps.push(CotStep::ToolCall {
                id: call.id.clone(),
                message_id: ai.id.clone(),
                name: call.name.clone(),
                args: call.args.clone(),
                result,
            });
        }
    }

    steps
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepLayout<'a> {
    pub above: &'a [CotStep],
    pub last_tool_call: Option<&'a CotStep>,
    pub last_reasoning: Option<&'a CotStep>,
}

pub fn layout_steps(steps: &[CotStep]) -> StepLayout<'_> {
    match steps.iter().rposition(CotStep::is_tool_call) {
        Some(index) => StepLayout {
            above: &steps[..index],
            last_tool_call: Some(&steps[index]),
            last_reasoning: steps[index + 1..].iter().find(|step| step.is_reasoning()),
        },
        None => StepLayout {
            above: &[],
            last_tool_call: None,
            last_reasoning: steps.iter().rev().find(|step| step.is_reasoning()),
        },
    }
}

pub fn explain_tool_call(call: &ToolCall) -> String {
    match call.name.as_str() {
        "web_search" | "image_search" => match call.arg_str("query") {
            Some(query) => format!("Search on the web for \"{query}\""),
            None => "Search for related information".to_string(),
        },
        "web_fetch" => "View web page".to_string(),
        PRESENT_FILES_TOOL => "Present files".to_string(),
        "write_todos" => "Update to-do list".to_string(),
        name => match call.arg_str("description") {
            Some(description) if !description.is_empty() => description.to_string(),
            _ => format!("Use \"{name}\" tool"),
        },
    }
}

pub fn explain_last_tool_call(message: &Message) -> String {
    message
        .as_ai()
        .and_then(|ai| ai.tool_calls.last())
        .map_or_else(|| THINKING_LABEL.to_string(), explain_tool_call)
}

pub fn step_label(step: &CotStep) -> String {
    match step {
        CotStep::Reasoning { .. } => THINKING_LABEL.to_string(),
        CotStep::ToolCall { name, args, .. } => {
            let description = args.get("description").and_then(Value::as_str);
            let fallback = match name.as_str() {
                "ls" => Some("List folder"),
                "read_file" => Some("Read file"),
                "write_file" | "str_replace" => Some("Write file"),
                "bash" => Some("Execute command"),
                "ask_clarification" => return "Need your help".to_string(),
                _ => None,
            };

            match (description, fallback) {
                (Some(description), Some(_)) if !description.is_empty() => description.to_string(),
                (_, Some(fallback)) => fallback.to_string(),
                _ => explain_tool_call(&ToolCall {
                    id: None,
                    name: name.clone(),
                    args: args.clone(),
                }),
            }
        }
    }
}
