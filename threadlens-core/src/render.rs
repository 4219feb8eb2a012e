use std::path::Path;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;

use crate::artifact::{artifact_url, file_kind, file_name, resolve_artifact_url};
use crate::citation::{Citation, extract_domain_from_url};
use crate::error::Result;
use crate::group::{MessageGroup, build_groups};
use crate::message::{
    SUBAGENT_TOOL, content_view, export_text, extract_present_files, extract_text,
    parse_uploaded_files,
};
use crate::model::{AgentThread, Message};
use crate::steps::{CotStep, ToolResult, convert_to_steps, step_label};
use crate::subtask::{SubtaskStatus, SubtaskTracker};

const EMPTY_PLACEHOLDER: &str = "_No messages found._";
const MAX_SEARCH_RESULTS: usize = 5;

static SANDBOX_IMAGE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"!\[([^\]]*)\]\((/mnt/[^)\s]+)\)").expect("valid regex")
});

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderOptions {
    pub clean: bool,
    pub backend_base_url: String,
}

pub fn render_markdown(
    thread: &AgentThread,
    source_path: &Path,
    options: &RenderOptions,
) -> Result<String> {
    let messages = &thread.values.messages;
    let groups = build_groups(messages)?;
    let subtasks = SubtaskTracker::from_messages(messages);
    let renderer = Renderer {
        thread_id: thread.thread_id.as_deref(),
        options,
        subtasks: &subtasks,
    };

    let mut output = String::new();
    output.push_str("# Thread\n\n");
    if let Some(thread_id) = &thread.thread_id {
        output.push_str(&format!("- Thread: `thread://{thread_id}`\n"));
    }
    if !thread.values.title.is_empty() {
        output.push_str(&format!("- Title: {}\n", thread.values.title.trim()));
    }
    output.push_str(&format!("- Source: `{}`\n", source_path.display()));
    if !thread.values.artifacts.is_empty() {
        output.push_str(&format!("- Artifacts: {}\n", thread.values.artifacts.len()));
    }
    output.push('\n');

    if groups.is_empty() {
        output.push_str(EMPTY_PLACEHOLDER);
        output.push('\n');
        return Ok(output);
    }

    for (idx, group) in groups.iter().enumerate() {
        output.push_str(&format!("## {}. {}\n\n", idx + 1, group_title(group)));
        let body = renderer.group_body(group);
        output.push_str(body.trim_end());
        output.push_str("\n\n");
    }

    if !thread.values.todos.is_empty() {
        output.push_str("## Todos\n\n");
        for todo in &thread.values.todos {
            let mark = if todo.status == "completed" { "x" } else { " " };
            output.push_str(&format!("- [{mark}] {}\n", todo.content.trim()));
        }
        output.push('\n');
    }

    Ok(output)
}

fn group_title(group: &MessageGroup<'_>) -> &'static str {
    match group {
        MessageGroup::Human(_) => "User",
        MessageGroup::Assistant(_) => "Assistant",
        MessageGroup::Processing(_) => "Thinking",
        MessageGroup::PresentFiles(_) => "Files",
        MessageGroup::Clarification(_) => "Clarification",
        MessageGroup::Subagent(_) => "Subtasks",
    }
}

struct Renderer<'a> {
    thread_id: Option<&'a str>,
    options: &'a RenderOptions,
    subtasks: &'a SubtaskTracker,
}

impl Renderer<'_> {
    fn group_body(&self, group: &MessageGroup<'_>) -> String {
        match group {
            MessageGroup::Human(message) => self.human(message),
            MessageGroup::Assistant(message) => self.assistant(message),
            MessageGroup::Processing(messages) => render_steps(&convert_to_steps(messages)),
            MessageGroup::PresentFiles(messages) => self.files(messages),
            MessageGroup::Clarification(message) => extract_text(message),
            MessageGroup::Subagent(messages) => self.subagents(messages),
        }
    }

    fn human(&self, message: &Message) -> String {
        if self.options.clean {
            return self.resolve_images(&parse_uploaded_files(&export_text(message)).clean_content);
        }

        let view = content_view(message, false);
        let mut body = self.resolve_images(&view.clean_content);
        if !view.uploaded_files.is_empty() {
            body.push_str("\n\nUploaded files:\n\n");
            for file in &view.uploaded_files {
                body.push_str(&format!("- `{}` ({}): `{}`\n", file.filename, file.size, file.path));
            }
        }
        body
    }

    fn assistant(&self, message: &Message) -> String {
        if self.options.clean {
            return self.resolve_images(&export_text(message));
        }

        let view = content_view(message, false);
        let mut body = self.resolve_images(&view.clean_content);
        if !view.citations.is_empty() {
            body.push_str("\n\n### Sources\n\n");
            body.push_str(&render_sources(&view.citations));
        }
        body
    }

    fn files(&self, messages: &[&Message]) -> String {
        let mut body = String::new();

        for message in messages.iter().filter(|message| message.as_ai().is_some()) {
            let text = if self.options.clean {
                export_text(message)
            } else {
                content_view(message, false).clean_content
            };
            if !text.is_empty() {
                body.push_str(&self.resolve_images(&text));
                body.push_str("\n\n");
            }

            for path in extract_present_files(message) {
                let link = match self.thread_id {
                    Some(thread_id) => {
                        artifact_url(&self.options.backend_base_url, thread_id, &path, false)
                    }
                    None => path.clone(),
                };
                body.push_str(&format!(
                    "- [{}]({link}) ({})\n",
                    file_name(&path),
                    file_kind(&path)
                ));
            }
        }

        body
    }

    fn subagents(&self, messages: &[&Message]) -> String {
        let mut body = String::new();

        let task_ids = messages
            .iter()
            .filter_map(|message| message.as_ai())
            .flat_map(|ai| ai.tool_calls.iter())
            .filter(|call| call.name == SUBAGENT_TOOL)
            .filter_map(|call| call.id.as_deref());

        for id in task_ids {
            let Some(task) = self.subtasks.get(id) else {
                continue;
            };
            let mark = match task.status {
                SubtaskStatus::InProgress => "…",
                SubtaskStatus::Completed => "✓",
                SubtaskStatus::Failed => "✗",
            };
            body.push_str(&format!(
                "- {mark} {} (`{}`, {})\n",
                task.description.trim(),
                task.subagent_type,
                task.status
            ));
            if let Some(result) = task.result.as_deref().filter(|text| !text.is_empty()) {
                body.push_str(&indent(&format!("Result: {result}")));
            }
            if let Some(error) = task.error.as_deref().filter(|text| !text.is_empty()) {
                body.push_str(&indent(&format!("Error: {error}")));
            }
        }

        body
    }

    fn resolve_images(&self, text: &str) -> String {
        let Some(thread_id) = self.thread_id else {
            return text.to_string();
        };

        SANDBOX_IMAGE_RE
            .replace_all(text, |caps: &Captures<'_>| {
                let url = resolve_artifact_url(&self.options.backend_base_url, thread_id, &caps[2]);
                format!("![{}]({url})", &caps[1])
            })
            .into_owned()
    }
}

fn render_sources(citations: &[Citation]) -> String {
    let mut output = String::new();
    for citation in citations {
        let title = if citation.title.is_empty() {
            extract_domain_from_url(&citation.url)
        } else {
            citation.title.clone()
        };
        output.push_str(&format!(
            "- [{title}]({}) ({})\n",
            citation.url,
            extract_domain_from_url(&citation.url)
        ));
    }
    output
}

fn render_steps(steps: &[CotStep]) -> String {
    let mut output = String::new();

    for step in steps {
        match step {
            CotStep::Reasoning { reasoning, .. } => {
                for line in reasoning.trim().lines() {
                    output.push_str(&format!("> {line}\n"));
                }
                output.push('\n');
            }
            CotStep::ToolCall { result, .. } => {
                output.push_str(&format!("- {}\n", step_label(step)));
                if let Some(ToolResult::Json(Value::Array(items))) = result {
                    for item in items.iter().take(MAX_SEARCH_RESULTS) {
                        if let Some(line) = search_result_line(item) {
                            output.push_str(&indent(&line));
                        }
                    }
                }
                output.push('\n');
            }
        }
    }

    output
}

fn search_result_line(item: &Value) -> Option<String> {
    let url = item.get("url").and_then(Value::as_str)?;
    let title = item
        .get("title")
        .and_then(Value::as_str)
        .filter(|title| !title.is_empty())
        .map_or_else(|| extract_domain_from_url(url), ToString::to_string);
    Some(format!("[{title}]({url})"))
}

fn indent(line: &str) -> String {
    format!("  - {}\n", line.trim())
}
