use std::fmt;
use std::slice;

use serde::Serialize;

use crate::error::{Result, ThreadlensError};
use crate::message::{
    has_content, has_present_files, has_reasoning, has_subagent, has_tool_calls,
    is_clarification_tool_message,
};
use crate::model::Message;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum GroupKind {
    #[serde(rename = "human")]
    Human,
    #[serde(rename = "assistant")]
    Assistant,
    #[serde(rename = "assistant:processing")]
    Processing,
    #[serde(rename = "assistant:present-files")]
    PresentFiles,
    #[serde(rename = "assistant:clarification")]
    Clarification,
    #[serde(rename = "assistant:subagent")]
    Subagent,
}

impl fmt::Display for GroupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Human => write!(f, "human"),
            Self::Assistant => write!(f, "assistant"),
            Self::Processing => write!(f, "assistant:processing"),
            Self::PresentFiles => write!(f, "assistant:present-files"),
            Self::Clarification => write!(f, "assistant:clarification"),
            Self::Subagent => write!(f, "assistant:subagent"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MessageGroup<'a> {
    Human(&'a Message),
    Assistant(&'a Message),
    Processing(Vec<&'a Message>),
    PresentFiles(Vec<&'a Message>),
    Clarification(&'a Message),
    Subagent(Vec<&'a Message>),
}

impl<'a> MessageGroup<'a> {
    pub fn kind(&self) -> GroupKind {
        match self {
            Self::Human(_) => GroupKind::Human,
            Self::Assistant(_) => GroupKind::Assistant,
            Self::Processing(_) => GroupKind::Processing,
            Self::PresentFiles(_) => GroupKind::PresentFiles,
            Self::Clarification(_) => GroupKind::Clarification,
            Self::Subagent(_) => GroupKind::Subagent,
        }
    }

    pub fn messages(&self) -> &[&'a Message] {
        match self {
            Self::Human(message) | Self::Assistant(message) | Self::Clarification(message) => {
                slice::from_ref(message)
            }
            Self::Processing(messages)
            | Self::PresentFiles(messages)
            | Self::Subagent(messages) => messages.as_slice(),
        }
    }

    pub fn id(&self) -> Option<&'a str> {
        self.messages().first().copied().and_then(Message::id)
    }

    fn push(&mut self, message: &'a Message) -> bool {
        match self {
            Self::Processing(messages) | Self::PresentFiles(messages) | Self::Subagent(messages) => {
                messages.push(message);
                true
            }
            Self::Human(_) | Self::Assistant(_) | Self::Clarification(_) => false,
        }
    }

    pub fn summary(&self) -> GroupSummary {
        GroupSummary {
            kind: self.kind(),
            id: self.id().map(ToString::to_string),
            message_ids: self
                .messages()
                .iter()
                .map(|message| message.id().unwrap_or_default().to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupSummary {
    pub kind: GroupKind,
    pub id: Option<String>,
    pub message_ids: Vec<String>,
}

/// Fails on a tool message with no open assistant group to attach to.
pub fn build_groups(messages: &[Message]) -> Result<Vec<MessageGroup<'_>>> {
    let mut groups: Vec<MessageGroup<'_>> = Vec::new();

    for message in messages {
        match message {
            Message::Human(_) => groups.push(MessageGroup::Human(message)),
            Message::Tool(tool) => {
                let attached = groups
                    .last_mut()
                    .is_some_and(|group| group.push(message));

                if is_clarification_tool_message(message) {
                    groups.push(MessageGroup::Clarification(message));
                } else if !attached {
                    return Err(ThreadlensError::OrphanToolMessage {
                        message_id: tool.id.clone(),
                        tool_call_id: tool.tool_call_id.clone(),
                    });
                }
            }
            Message::Ai(_) => {
                if has_reasoning(message) || has_tool_calls(message) {
                    if has_present_files(message) {
                        groups.push(MessageGroup::PresentFiles(vec![message]));
                    } else if has_subagent(message) {
                        groups.push(MessageGroup::Subagent(vec![message]));
                    } else if let Some(MessageGroup::Processing(chain)) = groups.last_mut() {
                        chain.push(message);
                    } else {
                        groups.push(MessageGroup::Processing(vec![message]));
                    }
                }

                if has_content(message) && !has_tool_calls(message) {
                    groups.push(MessageGroup::Assistant(message));
                }
            }
            Message::Unsupported => {}
        }
    }

    Ok(groups)
}

pub fn group_messages<T, F>(messages: &[Message], mut mapper: F) -> Result<Vec<T>>
where
    F: FnMut(&MessageGroup<'_>) -> Option<T>,
{
    Ok(build_groups(messages)?
        .iter()
        .filter_map(|group| mapper(group))
        .collect())
}
