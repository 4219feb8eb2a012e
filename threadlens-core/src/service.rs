use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use walkdir::WalkDir;

use crate::config::ThreadRoots;
use crate::error::{Result, ThreadlensError};
use crate::group::{GroupSummary, build_groups};
use crate::model::{
    AgentThread, ResolutionMeta, ResolvedThread, ThreadListItem, ThreadListView, ThreadValues,
};
use crate::render::{self, RenderOptions};
use crate::stream::{ThreadStream, replay_jsonl};
use crate::uri::ThreadRef;

const THREAD_FILE_NAME: &str = "thread.json";

pub fn resolve_thread(thread: &ThreadRef, roots: &ThreadRoots) -> Result<ResolvedThread> {
    match thread {
        ThreadRef::Id(thread_id) => {
            let path = roots.threads_root.join(thread_id).join(THREAD_FILE_NAME);
            if !path.is_file() {
                return Err(ThreadlensError::ThreadNotFound {
                    thread_id: thread_id.clone(),
                    searched_roots: vec![roots.threads_root.clone()],
                });
            }

            tracing::debug!(%thread_id, path = %path.display(), "resolved thread");
            Ok(ResolvedThread {
                thread_id: thread_id.clone(),
                path,
                metadata: ResolutionMeta {
                    source: "threads-root".to_string(),
                    candidate_count: 1,
                    warnings: Vec::new(),
                },
            })
        }
        ThreadRef::Path(path) => {
            // A thread directory stands for the snapshot inside it.
            let path = if path.is_dir() {
                path.join(THREAD_FILE_NAME)
            } else {
                path.clone()
            };
            fs::metadata(&path).map_err(|source| ThreadlensError::Io {
                path: path.clone(),
                source,
            })?;

            Ok(ResolvedThread {
                thread_id: thread_id_from_path(&path),
                path,
                metadata: ResolutionMeta {
                    source: "path".to_string(),
                    candidate_count: 1,
                    warnings: Vec::new(),
                },
            })
        }
    }
}

fn thread_id_from_path(path: &Path) -> String {
    let name = if path.file_name().is_some_and(|name| name == THREAD_FILE_NAME) {
        path.parent().and_then(Path::file_name)
    } else {
        path.file_stem()
    };

    name.map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

pub fn read_thread_raw(path: &Path) -> Result<String> {
    let bytes = fs::read(path).map_err(|source| ThreadlensError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    if bytes.is_empty() {
        return Err(ThreadlensError::EmptyThreadFile {
            path: path.to_path_buf(),
        });
    }

    String::from_utf8(bytes).map_err(|_| ThreadlensError::NonUtf8ThreadFile {
        path: path.to_path_buf(),
    })
}

/// Parses a snapshot file. Both a single state and a `history` list are
/// accepted; the first history entry is the latest state.
pub fn parse_thread(path: &Path, raw: &str) -> Result<AgentThread> {
    let invalid = |source| ThreadlensError::InvalidThreadJson {
        path: path.to_path_buf(),
        source,
    };

    let mut value = serde_json::from_str::<Value>(raw).map_err(invalid)?;
    if let Some(history) = value.get_mut("history").and_then(Value::as_array_mut) {
        if history.is_empty() {
            tracing::warn!(path = %path.display(), "thread history is empty");
            return Ok(AgentThread::default());
        }
        value = history.swap_remove(0);
    }

    serde_json::from_value::<AgentThread>(value).map_err(invalid)
}

pub fn load_thread(resolved: &ResolvedThread) -> Result<AgentThread> {
    let raw = read_thread_raw(&resolved.path)?;
    let mut thread = parse_thread(&resolved.path, &raw)?;
    if thread.thread_id.is_none() && !resolved.thread_id.is_empty() {
        thread.thread_id = Some(resolved.thread_id.clone());
    }
    Ok(thread)
}

pub fn render_thread_markdown(
    resolved: &ResolvedThread,
    roots: &ThreadRoots,
    clean: bool,
) -> Result<String> {
    let thread = load_thread(resolved)?;
    render::render_markdown(&thread, &resolved.path, &render_options(roots, clean))
}

pub fn thread_groups_to_raw_json(thread: &AgentThread) -> Result<String> {
    let summaries = build_groups(&thread.values.messages)?
        .iter()
        .map(|group| group.summary())
        .collect::<Vec<GroupSummary>>();
    serde_json::to_string_pretty(&summaries)
        .map_err(|err| ThreadlensError::Serialization(err.to_string()))
}

pub fn thread_to_raw_json(thread: &AgentThread) -> Result<String> {
    serde_json::to_string_pretty(thread)
        .map_err(|err| ThreadlensError::Serialization(err.to_string()))
}

pub fn load_stream(path: &Path) -> Result<ThreadStream> {
    let raw = read_thread_raw(path)?;
    replay_jsonl(path, &raw)
}

pub fn stream_to_thread(stream: &ThreadStream) -> AgentThread {
    AgentThread {
        thread_id: None,
        values: ThreadValues {
            title: stream.title().to_string(),
            messages: stream.messages().to_vec(),
            ..ThreadValues::default()
        },
    }
}

pub fn render_stream_markdown(path: &Path, roots: &ThreadRoots, clean: bool) -> Result<String> {
    let stream = load_stream(path)?;
    render::render_markdown(&stream_to_thread(&stream), path, &render_options(roots, clean))
}

fn render_options(roots: &ThreadRoots, clean: bool) -> RenderOptions {
    RenderOptions {
        clean,
        backend_base_url: roots.backend_base_url.clone(),
    }
}

pub fn list_threads(roots: &ThreadRoots) -> Result<ThreadListView> {
    let root = &roots.threads_root;
    let mut warnings = Vec::new();

    if !root.exists() {
        warnings.push(format!("threads root does not exist: {}", root.display()));
        return Ok(ThreadListView {
            root: root.display().to_string(),
            threads: Vec::new(),
            warnings,
        });
    }

    let mut threads = Vec::new();
    for path in snapshot_paths(root) {
        match read_thread_raw(&path).and_then(|raw| parse_thread(&path, &raw)) {
            Ok(thread) => threads.push(ThreadListItem {
                thread_id: thread
                    .thread_id
                    .clone()
                    .unwrap_or_else(|| thread_id_from_path(&path)),
                title: thread.values.title.trim().to_string(),
                message_count: thread.values.messages.len(),
                artifact_count: thread.values.artifacts.len(),
                path: path.display().to_string(),
            }),
            Err(err) => {
                tracing::warn!(path = %path.display(), %err, "skipping unreadable thread");
                warnings.push(format!("skipped {}: {err}", path.display()));
            }
        }
    }

    threads.sort_by(|left, right| left.thread_id.cmp(&right.thread_id));

    Ok(ThreadListView {
        root: root.display().to_string(),
        threads,
        warnings,
    })
}

fn snapshot_paths(root: &Path) -> Vec<PathBuf> {
    WalkDir::new(root)
        .min_depth(2)
        .max_depth(2)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| entry.file_name() == THREAD_FILE_NAME)
        .map(walkdir::DirEntry::into_path)
        .collect()
}

pub fn render_thread_list_markdown(view: &ThreadListView) -> String {
    let mut output = String::new();
    output.push_str("# Threads\n\n");
    output.push_str(&format!("- Root: `{}`\n", view.root));
    output.push_str("- Mode: `list`\n\n");

    if view.threads.is_empty() {
        output.push_str("_No threads found._\n");
    }

    for (index, item) in view.threads.iter().enumerate() {
        output.push_str(&format!("## {}. `thread://{}`\n\n", index + 1, item.thread_id));
        if !item.title.is_empty() {
            output.push_str(&format!("- Title: {}\n", item.title));
        }
        output.push_str(&format!("- Messages: `{}`\n", item.message_count));
        output.push_str(&format!("- Artifacts: `{}`\n", item.artifact_count));
        output.push_str(&format!("- Path: `{}`\n\n", item.path));
    }

    if !view.warnings.is_empty() {
        output.push_str("## Warnings\n\n");
        for warning in &view.warnings {
            output.push_str(&format!("- {warning}\n"));
        }
        output.push('\n');
    }

    output
}

pub fn thread_list_view_to_raw_json(view: &ThreadListView) -> Result<String> {
    serde_json::to_string_pretty(view)
        .map_err(|err| ThreadlensError::Serialization(err.to_string()))
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use tempfile::tempdir;

    use crate::config::ThreadRoots;
    use crate::error::ThreadlensError;
    use crate::model::{Message, MessageContent};
    use crate::service::{
        list_threads, load_thread, parse_thread, read_thread_raw,
        render_thread_list_markdown, render_thread_markdown, resolve_thread,
        thread_groups_to_raw_json, thread_list_view_to_raw_json,
    };
    use crate::uri::ThreadRef;

    const THREAD_ID: &str = "c02bb4d5-4202-490e-ae8f-ff4864fc0d2e";
    const OTHER_ID: &str = "4f3e55ee-f853-43db-bfb3-7d1a411f03cb";

    fn snapshot(title: &str) -> String {
        serde_json::json!({
            "values": {
                "title": title,
                "artifacts": ["/mnt/user-data/outputs/a.md"],
                "messages": [
                    {"type": "human", "id": "h1", "content": "hello"},
                    {"type": "ai", "id": "a1", "content": "hi there"}
                ]
            }
        })
        .to_string()
    }

    fn write_thread(root: &Path, thread_id: &str, raw: &str) {
        let dir = root.join(thread_id);
        fs::create_dir_all(&dir).expect("mkdir");
        fs::write(dir.join("thread.json"), raw).expect("write");
    }

    #[test]
    fn empty_file_returns_error() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("thread.json");
        fs::write(&path, "").expect("write");

        let err = read_thread_raw(&path).expect_err("must fail");
        assert!(format!("{err}").contains("thread file is empty"));
    }

    #[test]
    fn history_uses_first_entry() {
        let raw = r#"{"history": [
            {"values": {"title": "latest", "messages": []}},
            {"values": {"title": "older", "messages": []}}
        ]}"#;
        let thread = parse_thread(Path::new("thread.json"), raw).expect("parse");
        assert_eq!(thread.values.title, "latest");

        let empty = parse_thread(Path::new("thread.json"), r#"{"history": []}"#).expect("parse");
        assert!(empty.values.messages.is_empty());
    }

    #[test]
    fn null_content_and_tool_calls_are_empty() {
        let raw = r#"{"values": {"title": null, "messages": [
            {"type": "human", "id": "h1", "content": null},
            {"type": "ai", "id": "a1", "content": "ok", "tool_calls": null, "additional_kwargs": null},
            {"type": "ai", "id": "a2", "content": null, "tool_calls": [{"id": "c1", "name": "bash", "args": {}}]},
            {"type": "tool", "id": "t1", "tool_call_id": "c1", "content": null}
        ]}}"#;
        let thread = parse_thread(Path::new("thread.json"), raw).expect("parse");
        let messages = &thread.values.messages;
        assert_eq!(messages.len(), 4);
        assert_eq!(thread.values.title, "");

        let Message::Ai(ai) = &messages[1] else {
            panic!("expected ai message");
        };
        assert!(ai.tool_calls.is_empty());
        assert_eq!(ai.content, MessageContent::Text("ok".to_string()));
        for index in [0, 2, 3] {
            assert_eq!(
                messages[index].content(),
                Some(&MessageContent::Text(String::new()))
            );
        }

        let groups = thread_groups_to_raw_json(&thread).expect("groups");
        assert!(groups.contains("\"t1\""));
    }

    #[test]
    fn invalid_json_names_the_file() {
        let err = parse_thread(Path::new("broken.json"), "{").expect_err("must fail");
        assert!(format!("{err}").contains("invalid thread json in broken.json"));
    }

    #[test]
    fn resolves_id_under_threads_root() {
        let temp = tempdir().expect("tempdir");
        write_thread(temp.path(), THREAD_ID, &snapshot("Demo"));
        let roots = ThreadRoots::new(temp.path());

        let resolved =
            resolve_thread(&ThreadRef::Id(THREAD_ID.to_string()), &roots).expect("resolve");
        assert_eq!(resolved.path, temp.path().join(THREAD_ID).join("thread.json"));

        let thread = load_thread(&resolved).expect("load");
        assert_eq!(thread.thread_id.as_deref(), Some(THREAD_ID));

        let markdown = render_thread_markdown(&resolved, &roots, false).expect("render");
        assert!(markdown.contains(&format!("- Thread: `thread://{THREAD_ID}`")));
        assert!(markdown.contains("## 2. Assistant\n\nhi there"));
    }

    #[test]
    fn missing_thread_reports_searched_root() {
        let temp = tempdir().expect("tempdir");
        let roots = ThreadRoots::new(temp.path());

        let err = resolve_thread(&ThreadRef::Id(THREAD_ID.to_string()), &roots)
            .expect_err("must fail");
        assert!(matches!(err, ThreadlensError::ThreadNotFound { .. }));
        assert!(format!("{err}").contains(THREAD_ID));
    }

    #[test]
    fn resolves_directory_path() {
        let temp = tempdir().expect("tempdir");
        write_thread(temp.path(), THREAD_ID, &snapshot("Demo"));

        let resolved = resolve_thread(
            &ThreadRef::Path(temp.path().join(THREAD_ID)),
            &ThreadRoots::new(temp.path()),
        )
        .expect("resolve");
        assert_eq!(resolved.thread_id, THREAD_ID);
        assert!(resolved.path.ends_with("thread.json"));
    }

    #[test]
    fn groups_raw_json_lists_kinds() {
        let thread = parse_thread(Path::new("thread.json"), &snapshot("Demo")).expect("parse");
        let raw = thread_groups_to_raw_json(&thread).expect("json");
        let value: serde_json::Value = serde_json::from_str(&raw).expect("valid json");
        assert_eq!(value[0]["kind"], "human");
        assert_eq!(value[1]["kind"], "assistant");
        assert_eq!(value[1]["message_ids"][0], "a1");
    }

    #[test]
    fn list_skips_broken_snapshots() {
        let temp = tempdir().expect("tempdir");
        write_thread(temp.path(), OTHER_ID, &snapshot("Second"));
        write_thread(temp.path(), THREAD_ID, &snapshot("First"));
        write_thread(temp.path(), "broken", "{");

        let view = list_threads(&ThreadRoots::new(temp.path())).expect("list");
        let ids = view
            .threads
            .iter()
            .map(|item| item.thread_id.as_str())
            .collect::<Vec<_>>();
        assert_eq!(ids, vec![OTHER_ID, THREAD_ID]);
        assert_eq!(view.threads[0].message_count, 2);
        assert_eq!(view.warnings.len(), 1);

        let markdown = render_thread_list_markdown(&view);
        assert!(markdown.contains(&format!("## 1. `thread://{OTHER_ID}`")));
        assert!(markdown.contains("- Title: Second"));
        assert!(markdown.contains("## Warnings"));

        let raw = thread_list_view_to_raw_json(&view).expect("json");
        assert!(!raw.contains("warnings"));
    }

    #[test]
    fn missing_root_lists_nothing() {
        let temp = tempdir().expect("tempdir");
        let view = list_threads(&ThreadRoots::new(temp.path().join("nope"))).expect("list");
        assert!(view.threads.is_empty());
        assert!(render_thread_list_markdown(&view).contains("_No threads found._"));
    }
}
