use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ThreadlensError {
    #[error("invalid thread reference: {0}")]
    InvalidThreadRef(String),

    #[error("invalid artifact reference: {0}")]
    InvalidArtifactRef(String),

    #[error("invalid mode: {0}")]
    InvalidMode(String),

    #[error(
        "tool message must be matched with a previous assistant message with tool calls (tool_call_id={tool_call_id})"
    )]
    OrphanToolMessage {
        message_id: Option<String>,
        tool_call_id: String,
    },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("cannot determine home directory")]
    HomeDirectoryNotFound,

    #[error("thread not found for thread_id={thread_id}")]
    ThreadNotFound {
        thread_id: String,
        searched_roots: Vec<PathBuf>,
    },

    #[error("thread file is empty: {path}")]
    EmptyThreadFile { path: PathBuf },

    #[error("thread file is not valid UTF-8: {path}")]
    NonUtf8ThreadFile { path: PathBuf },

    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid thread json in {path}: {source}")]
    InvalidThreadJson {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid json line in {path} at line {line}: {source}")]
    InvalidJsonLine {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, ThreadlensError>;
