use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use serde::Serialize;
use url::form_urlencoded;

use crate::error::{Result, ThreadlensError};
use crate::model::Message;

const WRITE_FILE_SCHEME: &str = "write-file:";
const SANDBOX_PREFIX: &str = "/mnt/";
const SKILL_EXTENSION: &str = ".skill";

static CODE_LANGUAGES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    [
        ("txt", "text"),
        ("csv", "csv"),
        ("log", "text"),
        ("conf", "text"),
        ("config", "text"),
        ("properties", "text"),
        ("props", "text"),
        ("js", "javascript"),
        ("jsx", "jsx"),
        ("ts", "typescript"),
        ("tsx", "tsx"),
        ("mjs", "javascript"),
        ("cjs", "javascript"),
        ("mts", "typescript"),
        ("cts", "typescript"),
        ("html", "html"),
        ("htm", "html"),
        ("css", "css"),
        ("scss", "scss"),
        ("sass", "sass"),
        ("less", "less"),
        ("vue", "vue"),
        ("svelte", "svelte"),
        ("astro", "astro"),
        ("py", "python"),
        ("pyi", "python"),
        ("pyw", "python"),
        ("java", "java"),
        ("kt", "kotlin"),
        ("kts", "kotlin"),
        ("scala", "scala"),
        ("groovy", "groovy"),
        ("c", "c"),
        ("h", "c"),
        ("cpp", "cpp"),
        ("cc", "cpp"),
        ("cxx", "cpp"),
        ("hpp", "cpp"),
        ("hxx", "cpp"),
        ("hh", "cpp"),
        ("cs", "csharp"),
        ("go", "go"),
        ("rs", "rust"),
        ("rb", "ruby"),
        ("rake", "ruby"),
        ("php", "php"),
        ("sh", "bash"),
        ("bash", "bash"),
        ("zsh", "zsh"),
        ("fish", "fish"),
        ("json", "json"),
        ("jsonc", "jsonc"),
        ("json5", "json5"),
        ("yaml", "yaml"),
        ("yml", "yaml"),
        ("toml", "toml"),
        ("xml", "xml"),
        ("ini", "ini"),
        ("env", "dotenv"),
        ("md", "markdown"),
        ("mdx", "mdx"),
        ("rst", "rst"),
        ("sql", "sql"),
        ("swift", "swift"),
        ("dart", "dart"),
        ("lua", "lua"),
        ("r", "r"),
        ("matlab", "matlab"),
        ("julia", "jl"),
        ("elm", "elm"),
        ("haskell", "haskell"),
        ("hs", "haskell"),
        ("elixir", "elixir"),
        ("ex", "elixir"),
        ("clj", "clojure"),
        ("cljs", "clojure"),
        ("dockerfile", "dockerfile"),
        ("docker", "docker"),
        ("tf", "terraform"),
        ("tfvars", "terraform"),
        ("hcl", "hcl"),
        ("makefile", "makefile"),
        ("cmake", "cmake"),
        ("gradle", "groovy"),
        ("gitignore", "git-commit"),
        ("gitattributes", "git-commit"),
        ("graphql", "graphql"),
        ("gql", "graphql"),
        ("proto", "protobuf"),
        ("prisma", "prisma"),
        ("wasm", "wasm"),
        ("zig", "zig"),
        ("v", "v"),
    ]
    .into_iter()
    .collect()
});

pub fn artifact_url(base_url: &str, thread_id: &str, filepath: &str, download: bool) -> String {
    let base = base_url.trim_end_matches('/');
    let query = if download { "?download=true" } else { "" };
    format!("{base}/api/threads/{thread_id}/artifacts{filepath}{query}")
}

pub fn resolve_artifact_url(base_url: &str, thread_id: &str, src: &str) -> String {
    if src.starts_with(SANDBOX_PREFIX) {
        artifact_url(base_url, thread_id, src, false)
    } else {
        src.to_string()
    }
}

pub fn artifact_load_path(filepath: &str) -> String {
    if filepath.ends_with(SKILL_EXTENSION) {
        format!("{filepath}/SKILL.md")
    } else {
        filepath.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactRef {
    File(String),
    ToolCall {
        path: String,
        message_id: String,
        tool_call_id: String,
    },
}

impl ArtifactRef {
    pub fn parse(input: &str) -> Result<Self> {
        input.parse()
    }

    pub fn path(&self) -> &str {
        match self {
            Self::File(path) | Self::ToolCall { path, .. } => path,
        }
    }
}

impl FromStr for ArtifactRef {
    type Err = ThreadlensError;

    fn from_str(input: &str) -> Result<Self> {
        let Some(target) = input.strip_prefix(WRITE_FILE_SCHEME) else {
            if input.starts_with('/') {
                return Ok(Self::File(input.to_string()));
            }
            return Err(ThreadlensError::InvalidArtifactRef(input.to_string()));
        };

        let (path, query) = target.split_once('?').unwrap_or((target, ""));
        if path.is_empty() {
            return Err(ThreadlensError::InvalidArtifactRef(input.to_string()));
        }

        let mut message_id = None;
        let mut tool_call_id = None;
        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                "message_id" => message_id = Some(value.into_owned()),
                "tool_call_id" => tool_call_id = Some(value.into_owned()),
                _ => {}
            }
        }

        match (message_id, tool_call_id) {
            (Some(message_id), Some(tool_call_id))
                if !message_id.is_empty() && !tool_call_id.is_empty() =>
            {
                Ok(Self::ToolCall {
                    path: path.to_string(),
                    message_id,
                    tool_call_id,
                })
            }
            _ => Err(ThreadlensError::InvalidArtifactRef(input.to_string())),
        }
    }
}

impl fmt::Display for ArtifactRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "{path}"),
            Self::ToolCall {
                path,
                message_id,
                tool_call_id,
            } => {
                let query = form_urlencoded::Serializer::new(String::new())
                    .append_pair("message_id", message_id)
                    .append_pair("tool_call_id", tool_call_id)
                    .finish();
                write!(f, "{WRITE_FILE_SCHEME}{path}?{query}")
            }
        }
    }
}

pub fn load_artifact_content_from_tool_call<'a>(
    messages: &'a [Message],
    artifact: &ArtifactRef,
) -> Option<&'a str> {
    let ArtifactRef::ToolCall {
        message_id,
        tool_call_id,
        ..
    } = artifact
    else {
        return None;
    };

    messages
        .iter()
        .filter_map(Message::as_ai)
        .find(|ai| ai.id.as_deref() == Some(message_id.as_str()))?
        .tool_calls
        .iter()
        .find(|call| call.id.as_deref() == Some(tool_call_id.as_str()))?
        .arg_str("content")
}

pub fn file_name(filepath: &str) -> &str {
    filepath.rsplit('/').next().unwrap_or(filepath)
}

pub fn file_extension(filepath: &str) -> String {
    filepath
        .rsplit('.')
        .next()
        .unwrap_or(filepath)
        .to_lowercase()
}

pub fn check_code_file(filepath: &str) -> Option<&'static str> {
    CODE_LANGUAGES
        .get(file_extension(filepath).as_str())
        .copied()
}

pub fn extension_display_name(filepath: &str) -> String {
    let extension = file_extension(file_name(filepath));
    match extension.as_str() {
        "doc" | "docx" => "Word".to_string(),
        "md" => "Markdown".to_string(),
        "txt" => "Text".to_string(),
        "ppt" | "pptx" => "PowerPoint".to_string(),
        "xls" | "xlsx" => "Excel".to_string(),
        _ => extension.to_uppercase(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    Skill,
    Html,
    Document,
    Image,
    Media,
    Code,
    Other,
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Skill => write!(f, "skill"),
            Self::Html => write!(f, "html"),
            Self::Document => write!(f, "document"),
            Self::Image => write!(f, "image"),
            Self::Media => write!(f, "media"),
            Self::Code => write!(f, "code"),
            Self::Other => write!(f, "other"),
        }
    }
}

pub fn file_kind(filepath: &str) -> FileKind {
    match file_extension(filepath).as_str() {
        "skill" => FileKind::Skill,
        "html" => FileKind::Html,
        "txt" | "md" => FileKind::Document,
        "jpg" | "jpeg" | "png" | "gif" | "bmp" | "tiff" | "ico" | "webp" | "svg" | "heic" => {
            FileKind::Image
        }
        "mp3" | "wav" | "ogg" | "aac" | "m4a" | "flac" | "wma" | "aiff" | "ape" | "mp4" | "mov"
        | "m4v" => FileKind::Media,
        _ if check_code_file(filepath).is_some() => FileKind::Code,
        _ => FileKind::Other,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::artifact::{
        ArtifactRef, FileKind, artifact_load_path, artifact_url, check_code_file,
        extension_display_name, file_extension, file_kind, file_name,
        load_artifact_content_from_tool_call, resolve_artifact_url,
    };
    use crate::model::Message;

    const THREAD_ID: &str = "c02bb4d5-4202-490e-ae8f-ff4864fc0d2e";

    #[test]
    fn artifact_urls() {
        assert_eq!(
            artifact_url("http://localhost:8001/", THREAD_ID, "/mnt/user-data/outputs/a.md", true),
            format!("http://localhost:8001/api/threads/{THREAD_ID}/artifacts/mnt/user-data/outputs/a.md?download=true")
        );
        assert_eq!(
            artifact_url("", THREAD_ID, "/mnt/user-data/outputs/a.md", false),
            format!("/api/threads/{THREAD_ID}/artifacts/mnt/user-data/outputs/a.md")
        );
        assert_eq!(
            resolve_artifact_url("", THREAD_ID, "https://img.example/a.png"),
            "https://img.example/a.png"
        );
        assert!(
            resolve_artifact_url("", THREAD_ID, "/mnt/user-data/outputs/a.png")
                .starts_with("/api/threads/")
        );
        assert_eq!(
            artifact_load_path("/mnt/skills/custom/report.skill"),
            "/mnt/skills/custom/report.skill/SKILL.md"
        );
    }

    #[test]
    fn parses_write_file_reference() {
        let artifact =
            ArtifactRef::parse("write-file:/mnt/user-data/outputs/report.md?message_id=a1&tool_call_id=w1")
                .expect("parse");
        assert_eq!(
            artifact,
            ArtifactRef::ToolCall {
                path: "/mnt/user-data/outputs/report.md".to_string(),
                message_id: "a1".to_string(),
                tool_call_id: "w1".to_string(),
            }
        );
        assert_eq!(
            artifact.to_string(),
            "write-file:/mnt/user-data/outputs/report.md?message_id=a1&tool_call_id=w1"
        );
    }

    #[test]
    fn rejects_incomplete_references() {
        for input in [
            "write-file:/mnt/a.md?message_id=a1",
            "write-file:?message_id=a1&tool_call_id=w1",
            "relative/path.md",
        ] {
            let err = ArtifactRef::parse(input).expect_err("must fail");
            assert!(format!("{err}").contains("invalid artifact reference"));
        }
        assert_eq!(
            ArtifactRef::parse("/mnt/user-data/outputs/a.md").expect("parse"),
            ArtifactRef::File("/mnt/user-data/outputs/a.md".to_string())
        );
    }

    #[test]
    fn loads_content_from_write_file_call() {
        let messages: Vec<Message> = serde_json::from_value(json!([
            {"type": "ai", "id": "a1", "content": "", "tool_calls": [
                {"id": "w1", "name": "write_file", "args": {"path": "/mnt/user-data/outputs/report.md", "content": "# Report"}}
            ]}
        ]))
        .expect("messages");

        let found = ArtifactRef::parse("write-file:/mnt/user-data/outputs/report.md?message_id=a1&tool_call_id=w1")
            .expect("parse");
        assert_eq!(
            load_artifact_content_from_tool_call(&messages, &found),
            Some("# Report")
        );

        let missing = ArtifactRef::parse("write-file:/x.md?message_id=a1&tool_call_id=nope")
            .expect("parse");
        assert_eq!(load_artifact_content_from_tool_call(&messages, &missing), None);
    }

    #[test]
    fn file_classification() {
        assert_eq!(file_name("/mnt/user-data/outputs/site/index.html"), "index.html");
        assert_eq!(file_extension("/a/B.MD"), "md");
        assert_eq!(check_code_file("main.rs"), Some("rust"));
        assert_eq!(check_code_file("photo.png"), None);
        assert_eq!(extension_display_name("/a/deck.pptx"), "PowerPoint");
        assert_eq!(extension_display_name("/a/archive.zip"), "ZIP");
        assert_eq!(file_kind("/a/index.html"), FileKind::Html);
        assert_eq!(file_kind("/a/notes.md"), FileKind::Document);
        assert_eq!(file_kind("/a/clip.mp4"), FileKind::Media);
        assert_eq!(file_kind("/a/app.py"), FileKind::Code);
        assert_eq!(file_kind("/a/data.bin"), FileKind::Other);
    }
}
