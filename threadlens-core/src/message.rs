use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::citation::{
    Citation, is_citations_block_incomplete, parse_citations, remove_all_citations,
};
use crate::model::{ContentBlock, Message, MessageContent};

pub const PRESENT_FILES_TOOL: &str = "present_files";
pub const SUBAGENT_TOOL: &str = "task";
pub const CLARIFICATION_TOOL: &str = "ask_clarification";

const NO_UPLOADS_MARKER: &str = "No files have been uploaded yet.";

static UPLOADED_FILES_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<uploaded_files>(.*?)</uploaded_files>").expect("valid regex")
});
static UPLOADED_FILE_ENTRY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"- ([^\n(]+)\s*\(([^)]+)\)\s*\n\s*Path:\s*([^\n]+)").expect("valid regex")
});

pub fn extract_text(message: &Message) -> String {
    match message.content() {
        Some(MessageContent::Text(text)) => text.trim().to_string(),
        Some(MessageContent::Blocks(blocks)) => blocks
            .iter()
            .map(|block| match block {
                ContentBlock::Text { text } => text.as_str(),
                _ => "",
            })
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string(),
        None => String::new(),
    }
}

pub fn extract_content(message: &Message) -> String {
    match message.content() {
        Some(MessageContent::Text(text)) => text.trim().to_string(),
        Some(MessageContent::Blocks(blocks)) => blocks
            .iter()
            .map(|block| match block {
                ContentBlock::Text { text } => text.clone(),
                ContentBlock::ImageUrl { image_url } => format!("![image]({})", image_url.url()),
                ContentBlock::Unsupported => String::new(),
            })
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string(),
        None => String::new(),
    }
}

pub fn extract_reasoning_content(message: &Message) -> Option<&str> {
    message
        .as_ai()
        .and_then(|ai| ai.additional_kwargs.reasoning_content.as_deref())
}

pub fn remove_reasoning_content(message: &mut Message) {
    if let Message::Ai(ai) = message {
        ai.additional_kwargs.reasoning_content = None;
    }
}

pub fn has_content(message: &Message) -> bool {
    match message.content() {
        Some(MessageContent::Text(text)) => !text.trim().is_empty(),
        Some(MessageContent::Blocks(blocks)) => !blocks.is_empty(),
        None => false,
    }
}

pub fn has_reasoning(message: &Message) -> bool {
    extract_reasoning_content(message).is_some()
}

pub fn has_tool_calls(message: &Message) -> bool {
    message.as_ai().is_some_and(|ai| !ai.tool_calls.is_empty())
}

pub fn has_present_files(message: &Message) -> bool {
    has_tool_call_named(message, PRESENT_FILES_TOOL)
}

pub fn has_subagent(message: &Message) -> bool {
    has_tool_call_named(message, SUBAGENT_TOOL)
}

fn has_tool_call_named(message: &Message, name: &str) -> bool {
    message
        .as_ai()
        .is_some_and(|ai| ai.tool_calls.iter().any(|call| call.name == name))
}

pub fn is_clarification_tool_message(message: &Message) -> bool {
    message
        .as_tool()
        .is_some_and(|tool| tool.name.as_deref() == Some(CLARIFICATION_TOOL))
}

pub fn extract_present_files(message: &Message) -> Vec<String> {
    let Some(ai) = message.as_ai() else {
        return Vec::new();
    };

    ai.tool_calls
        .iter()
        .filter(|call| call.name == PRESENT_FILES_TOOL)
        .filter_map(|call| call.args.get("filepaths").and_then(|paths| paths.as_array()))
        .flatten()
        .filter_map(|path| path.as_str().map(ToString::to_string))
        .collect()
}

pub fn find_tool_call_result<'a, I>(tool_call_id: &str, messages: I) -> Option<String>
where
    I: IntoIterator<Item = &'a Message>,
{
    messages
        .into_iter()
        .filter(|message| {
            message
                .as_tool()
                .is_some_and(|tool| tool.tool_call_id == tool_call_id)
        })
        .map(extract_text)
        .find(|text| !text.is_empty())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadedFile {
    pub filename: String,
    pub size: String,
    pub path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParsedUploadedFiles {
    pub files: Vec<UploadedFile>,
    pub clean_content: String,
}

/// Entries look like `- report.pdf (1.2 MB)` followed by an indented
/// `Path: /mnt/user-data/uploads/report.pdf` line.
pub fn parse_uploaded_files(content: &str) -> ParsedUploadedFiles {
    let Some(captures) = UPLOADED_FILES_RE.captures(content) else {
        return ParsedUploadedFiles {
            files: Vec::new(),
            clean_content: content.to_string(),
        };
    };

    let block = captures.get(1).map_or("", |m| m.as_str());
    let clean_content = UPLOADED_FILES_RE.replace(content, "").trim().to_string();

    if block.contains(NO_UPLOADS_MARKER) {
        return ParsedUploadedFiles {
            files: Vec::new(),
            clean_content,
        };
    }

    let files = UPLOADED_FILE_ENTRY_RE
        .captures_iter(block)
        .map(|entry| UploadedFile {
            filename: entry[1].trim().to_string(),
            size: entry[2].trim().to_string(),
            path: entry[3].trim().to_string(),
        })
        .collect();

    ParsedUploadedFiles {
        files,
        clean_content,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContentView {
    pub citations: Vec<Citation>,
    pub clean_content: String,
    pub uploaded_files: Vec<UploadedFile>,
    pub is_loading_citations: bool,
}

pub fn content_view(message: &Message, is_loading: bool) -> ContentView {
    let reasoning = extract_reasoning_content(message);
    let raw = extract_content(message);

    if !is_loading
        && raw.is_empty()
        && let Some(reasoning) = reasoning.filter(|text| !text.is_empty())
    {
        let parsed = parse_citations(reasoning);
        return ContentView {
            citations: parsed.citations,
            clean_content: parsed.clean_content,
            uploaded_files: Vec::new(),
            is_loading_citations: false,
        };
    }

    if matches!(message, Message::Human(_)) && !raw.is_empty() {
        let uploads = parse_uploaded_files(&raw);
        let parsed = parse_citations(&uploads.clean_content);
        return ContentView {
            citations: parsed.citations,
            clean_content: parsed.clean_content,
            uploaded_files: uploads.files,
            is_loading_citations: false,
        };
    }

    let parsed = parse_citations(&raw);
    ContentView {
        citations: parsed.citations,
        clean_content: parsed.clean_content,
        uploaded_files: Vec::new(),
        is_loading_citations: is_loading && is_citations_block_incomplete(&raw),
    }
}

pub fn export_text(message: &Message) -> String {
    let content = extract_content(message);
    if !content.is_empty() {
        return remove_all_citations(&content);
    }

    remove_all_citations(extract_reasoning_content(message).unwrap_or_default())
}
