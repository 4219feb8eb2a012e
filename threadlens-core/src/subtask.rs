use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::message::{SUBAGENT_TOOL, extract_text};
use crate::model::{AiMessage, Message};

const SUCCEEDED_PREFIX: &str = "Task Succeeded. Result:";
const FAILED_PREFIX: &str = "Task failed.";
const TIMED_OUT_PREFIX: &str = "Task timed out";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubtaskStatus {
    #[default]
    InProgress,
    Completed,
    Failed,
}

impl fmt::Display for SubtaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InProgress => write!(f, "in_progress"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Subtask {
    pub id: String,
    pub status: SubtaskStatus,
    pub subagent_type: String,
    pub description: String,
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_message: Option<AiMessage>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubtaskUpdate {
    pub id: String,
    pub status: Option<SubtaskStatus>,
    pub result: Option<String>,
    pub error: Option<String>,
    pub latest_message: Option<AiMessage>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubtaskTracker {
    tasks: BTreeMap<String, Subtask>,
    order: Vec<String>,
}

impl SubtaskTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_messages(messages: &[Message]) -> Self {
        let mut tracker = Self::new();
        tracker.observe_all(messages);
        tracker
    }

    pub fn observe_all<'a, I>(&mut self, messages: I)
    where
        I: IntoIterator<Item = &'a Message>,
    {
        for message in messages {
            self.observe(message);
        }
    }

    pub fn observe(&mut self, message: &Message) {
        match message {
            Message::Ai(ai) => {
                for call in ai.tool_calls.iter().filter(|call| call.name == SUBAGENT_TOOL) {
                    let Some(id) = call.id.clone() else {
                        continue;
                    };
                    if self.tasks.contains_key(&id) {
                        continue;
                    }

                    let arg = |key: &str| call.arg_str(key).unwrap_or_default().to_string();
                    tracing::debug!(task_id = %id, "subtask started");
                    self.order.push(id.clone());
                    self.tasks.insert(
                        id.clone(),
                        Subtask {
                            id,
                            status: SubtaskStatus::InProgress,
                            subagent_type: arg("subagent_type"),
                            description: arg("description"),
                            prompt: arg("prompt"),
                            ..Subtask::default()
                        },
                    );
                }
            }
            Message::Tool(tool) if self.tasks.contains_key(&tool.tool_call_id) => {
                let update = settle(&tool.tool_call_id, &extract_text(message));
                self.update(update);
            }
            _ => {}
        }
    }

    /// Creates the subtask when its id is unknown.
    pub fn update(&mut self, update: SubtaskUpdate) {
        if !self.tasks.contains_key(&update.id) {
            self.order.push(update.id.clone());
        }
        let task = self
            .tasks
            .entry(update.id.clone())
            .or_insert_with(|| Subtask {
                id: update.id.clone(),
                ..Subtask::default()
            });

        if let Some(status) = update.status
            && status != task.status
        {
            tracing::debug!(task_id = %task.id, from = %task.status, to = %status, "subtask status changed");
            task.status = status;
        }
        if update.result.is_some() {
            task.result = update.result;
        }
        if update.error.is_some() {
            task.error = update.error;
        }
        if update.latest_message.is_some() {
            task.latest_message = update.latest_message;
        }
    }

    pub fn get(&self, id: &str) -> Option<&Subtask> {
        self.tasks.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Subtask> {
        self.order.iter().filter_map(|id| self.tasks.get(id))
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

fn settle(id: &str, text: &str) -> SubtaskUpdate {
    let mut update = SubtaskUpdate {
        id: id.to_string(),
        ..SubtaskUpdate::default()
    };

    if let Some(rest) = text.strip_prefix(SUCCEEDED_PREFIX) {
        update.status = Some(SubtaskStatus::Completed);
        update.result = Some(rest.trim().to_string());
    } else if let Some(rest) = text.strip_prefix(FAILED_PREFIX) {
        update.status = Some(SubtaskStatus::Failed);
        update.error = Some(rest.trim().to_string());
    } else if text.starts_with(TIMED_OUT_PREFIX) {
        update.status = Some(SubtaskStatus::Failed);
        update.error = Some(text.to_string());
    } else {
        update.status = Some(SubtaskStatus::InProgress);
    }

    update
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::model::{AiMessage, Message};
    use crate::subtask::{SubtaskStatus, SubtaskTracker, SubtaskUpdate};

    fn messages(value: serde_json::Value) -> Vec<Message> {
        serde_json::from_value(value).expect("messages")
    }

    fn spawn() -> serde_json::Value {
        json!({"type": "ai", "id": "a1", "content": "", "tool_calls": [
            {"id": "t1", "name": "task", "args": {"description": "Financials", "prompt": "Find earnings", "subagent_type": "general-purpose"}},
            {"id": "t2", "name": "task", "args": {"description": "News", "prompt": "Find news", "subagent_type": "general-purpose"}},
            {"id": "t3", "name": "task", "args": {"description": "Market", "prompt": "Find trends", "subagent_type": "bash"}},
            {"id": "w1", "name": "web_search", "args": {"query": "not a task"}}
        ]})
    }

    #[test]
    fn task_calls_start_in_progress() {
        let tracker = SubtaskTracker::from_messages(&messages(json!([spawn()])));
        assert_eq!(tracker.len(), 3);

        let task = tracker.get("t1").expect("task");
        assert_eq!(task.status, SubtaskStatus::InProgress);
        assert_eq!(task.description, "Financials");
        assert_eq!(task.prompt, "Find earnings");
        assert_eq!(task.subagent_type, "general-purpose");
        assert!(tracker.get("w1").is_none());
    }

    #[test]
    fn tool_results_settle_tasks() {
        let tracker = SubtaskTracker::from_messages(&messages(json!([
            spawn(),
            {"type": "tool", "tool_call_id": "t1", "name": "task", "content": "Task Succeeded. Result: revenue up 8%"},
            {"type": "tool", "tool_call_id": "t2", "name": "task", "content": "Task failed. rate limited"},
            {"type": "tool", "tool_call_id": "t3", "name": "task", "content": "Task timed out after 900 seconds"}
        ])));

        let done = tracker.get("t1").expect("t1");
        assert_eq!(done.status, SubtaskStatus::Completed);
        assert_eq!(done.result.as_deref(), Some("revenue up 8%"));

        let failed = tracker.get("t2").expect("t2");
        assert_eq!(failed.status, SubtaskStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("rate limited"));

        let timed_out = tracker.get("t3").expect("t3");
        assert_eq!(timed_out.status, SubtaskStatus::Failed);
        assert_eq!(
            timed_out.error.as_deref(),
            Some("Task timed out after 900 seconds")
        );

        let order = tracker.iter().map(|task| task.id.as_str()).collect::<Vec<_>>();
        assert_eq!(order, vec!["t1", "t2", "t3"]);
    }

    #[test]
    fn unrecognized_result_keeps_task_running() {
        let tracker = SubtaskTracker::from_messages(&messages(json!([
            spawn(),
            {"type": "tool", "tool_call_id": "t1", "name": "task", "content": "still working"}
        ])));
        assert_eq!(
            tracker.get("t1").expect("t1").status,
            SubtaskStatus::InProgress
        );
    }

    #[test]
    fn updates_merge_without_clearing_fields() {
        let mut tracker = SubtaskTracker::from_messages(&messages(json!([spawn()])));
        tracker.update(SubtaskUpdate {
            id: "t1".to_string(),
            latest_message: Some(AiMessage::default()),
            ..SubtaskUpdate::default()
        });
        tracker.update(SubtaskUpdate {
            id: "t1".to_string(),
            status: Some(SubtaskStatus::Completed),
            result: Some("ok".to_string()),
            ..SubtaskUpdate::default()
        });

        let task = tracker.get("t1").expect("t1");
        assert_eq!(task.status, SubtaskStatus::Completed);
        assert_eq!(task.description, "Financials");
        assert!(task.latest_message.is_some());
        assert_eq!(task.result.as_deref(), Some("ok"));
    }

    #[test]
    fn update_for_unknown_id_creates_task() {
        let mut tracker = SubtaskTracker::new();
        tracker.update(SubtaskUpdate {
            id: "late".to_string(),
            status: Some(SubtaskStatus::Failed),
            error: Some("boom".to_string()),
            ..SubtaskUpdate::default()
        });
        assert_eq!(tracker.len(), 1);
        assert_eq!(
            tracker.get("late").expect("late").status,
            SubtaskStatus::Failed
        );
    }
}
