use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ThreadlensError};
use crate::group::{MessageGroup, build_groups};
use crate::message::{ContentView, content_view};
use crate::model::{AiMessage, ContentBlock, Message, MessageContent, ThreadValues};
use crate::subtask::SubtaskTracker;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StreamEvent {
    Values { values: ThreadValues },
    Message { message: Message },
    ContentDelta { id: String, delta: String },
    Finished,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThreadStream {
    title: String,
    messages: Vec<Message>,
    loading: bool,
}

impl ThreadStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::Values { values } => {
                self.title = values.title;
                self.messages = values.messages;
                self.loading = true;
            }
            StreamEvent::Message { message } => {
                self.upsert(message);
                self.loading = true;
            }
            StreamEvent::ContentDelta { id, delta } => {
                self.append_delta(id, &delta);
                self.loading = true;
            }
            StreamEvent::Finished => self.loading = false,
        }
    }

    fn upsert(&mut self, message: Message) {
        let existing = message.id().and_then(|id| {
            self.messages
                .iter()
                .position(|candidate| candidate.id() == Some(id))
        });

        match existing {
            Some(index) => self.messages[index] = message,
            None => self.messages.push(message),
        }
    }

    fn append_delta(&mut self, id: String, delta: &str) {
        let Some(message) = self
            .messages
            .iter_mut()
            .find(|message| message.id() == Some(id.as_str()))
        else {
            tracing::debug!(message_id = %id, "delta before message; starting ai message");
            self.messages.push(Message::Ai(AiMessage {
                id: Some(id),
                content: MessageContent::Text(delta.to_string()),
                ..AiMessage::default()
            }));
            return;
        };

        match message.content_mut() {
            Some(MessageContent::Text(text)) => text.push_str(delta),
            Some(MessageContent::Blocks(blocks)) => match blocks.last_mut() {
                Some(ContentBlock::Text { text }) => text.push_str(delta),
                _ => blocks.push(ContentBlock::Text {
                    text: delta.to_string(),
                }),
            },
            None => {}
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn groups(&self) -> Result<Vec<MessageGroup<'_>>> {
        build_groups(&self.messages)
    }

    pub fn subtasks(&self) -> SubtaskTracker {
        SubtaskTracker::from_messages(&self.messages)
    }

    pub fn content_view(&self, index: usize) -> Option<ContentView> {
        let message = self.messages.get(index)?;
        let is_latest = index + 1 == self.messages.len();
        Some(content_view(message, self.loading && is_latest))
    }
}

/// Blank lines are skipped; any other unparsable line fails the replay.
pub fn replay_jsonl(path: &Path, raw: &str) -> Result<ThreadStream> {
    let mut stream = ThreadStream::new();

    for (line_idx, line) in raw.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let event = serde_json::from_str::<StreamEvent>(trimmed).map_err(|source| {
            ThreadlensError::InvalidJsonLine {
                path: path.to_path_buf(),
                line: line_idx + 1,
                source,
            }
        })?;
        stream.apply(event);
    }

    tracing::debug!(
        path = %path.display(),
        messages = stream.messages.len(),
        loading = stream.loading,
        "replayed stream"
    );
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use serde_json::json;

    use crate::group::GroupKind;
    use crate::message::extract_text;
    use crate::stream::{StreamEvent, ThreadStream, replay_jsonl};

    fn event(value: serde_json::Value) -> StreamEvent {
        serde_json::from_value(value).expect("event")
    }

    #[test]
    fn messages_upsert_by_id() {
        let mut stream = ThreadStream::new();
        stream.apply(event(json!({"event": "message", "message": {"type": "human", "id": "h1", "content": "hi"}})));
        stream.apply(event(json!({"event": "message", "message": {"type": "ai", "id": "a1", "content": "Hel"}})));
        stream.apply(event(json!({"event": "message", "message": {"type": "ai", "id": "a1", "content": "Hello"}})));

        assert_eq!(stream.messages().len(), 2);
        assert_eq!(extract_text(&stream.messages()[1]), "Hello");
        assert!(stream.is_loading());

        stream.apply(StreamEvent::Finished);
        assert!(!stream.is_loading());
    }

    #[test]
    fn deltas_append_text() {
        let mut stream = ThreadStream::new();
        stream.apply(event(json!({"event": "content_delta", "id": "a1", "delta": "Hel"})));
        stream.apply(event(json!({"event": "content_delta", "id": "a1", "delta": "lo"})));
        stream.apply(event(json!({"event": "message", "message": {
            "type": "ai", "id": "a2", "content": [{"type": "text", "text": "Block"}]
        }})));
        stream.apply(event(json!({"event": "content_delta", "id": "a2", "delta": " text"})));

        assert_eq!(extract_text(&stream.messages()[0]), "Hello");
        assert_eq!(extract_text(&stream.messages()[1]), "Block text");
    }

    #[test]
    fn open_citations_stay_provisional_while_loading() {
        let raw = [
            r#"{"event":"message","message":{"type":"human","id":"h1","content":"q"}}"#,
            "",
            r#"{"event":"message","message":{"type":"ai","id":"a1","content":"<citations>\n{\"id\":\"c1\",\"title\":\"T\",\"url\":\"https://a.example\"}"}}"#,
        ]
        .join("\n");

        let stream = replay_jsonl(Path::new("capture.jsonl"), &raw).expect("replay");
        let groups = stream.groups().expect("groups");
        assert_eq!(
            groups.iter().map(|group| group.kind()).collect::<Vec<_>>(),
            vec![GroupKind::Human, GroupKind::Assistant]
        );

        let view = stream.content_view(1).expect("view");
        assert!(view.is_loading_citations);
        assert!(!stream.content_view(0).expect("view").is_loading_citations);
    }

    #[test]
    fn values_event_replaces_state() {
        let mut stream = ThreadStream::new();
        stream.apply(event(json!({"event": "message", "message": {"type": "human", "id": "old", "content": "x"}})));
        stream.apply(event(json!({"event": "values", "values": {
            "title": "Research",
            "messages": [{"type": "human", "id": "h1", "content": "new"}]
        }})));

        assert_eq!(stream.title(), "Research");
        assert_eq!(stream.messages().len(), 1);
        assert_eq!(stream.messages()[0].id(), Some("h1"));
    }

    #[test]
    fn bad_line_reports_line_number() {
        let raw = "{\"event\":\"finished\"}\n\nnot json\n";
        let err = replay_jsonl(Path::new("capture.jsonl"), raw).expect_err("must fail");
        assert!(format!("{err}").contains("at line 3"));
    }
}
