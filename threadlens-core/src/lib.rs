pub mod artifact;
pub mod citation;
pub mod config;
pub mod error;
pub mod group;
pub mod message;
pub mod model;
pub mod render;
pub mod service;
pub mod steps;
pub mod stream;
pub mod subtask;
pub mod uri;

pub use artifact::{ArtifactRef, FileKind};
pub use citation::{Citation, ParsedCitations, parse_citations, remove_all_citations};
pub use config::ThreadRoots;
pub use error::{Result, ThreadlensError};
pub use group::{GroupKind, GroupSummary, MessageGroup, build_groups, group_messages};
pub use model::{
    AgentThread, Message, MessageRole, ResolutionMeta, ResolvedThread, ThreadListItem,
    ThreadListView,
};
pub use service::{
    list_threads, load_stream, load_thread, read_thread_raw, render_stream_markdown,
    render_thread_list_markdown, render_thread_markdown, resolve_thread, stream_to_thread,
    thread_groups_to_raw_json, thread_list_view_to_raw_json, thread_to_raw_json,
};
pub use stream::{StreamEvent, ThreadStream};
pub use subtask::{Subtask, SubtaskStatus, SubtaskTracker};
pub use uri::ThreadRef;
