use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Result, ThreadlensError};

const THREAD_SCHEME: &str = "thread://";

static THREAD_ID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$")
        .expect("valid regex")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThreadRef {
    Id(String),
    Path(PathBuf),
}

impl ThreadRef {
    pub fn parse(input: &str) -> Result<Self> {
        input.parse()
    }

    pub fn thread_id(&self) -> Option<&str> {
        match self {
            Self::Id(id) => Some(id),
            Self::Path(_) => None,
        }
    }
}

impl FromStr for ThreadRef {
    type Err = ThreadlensError;

    fn from_str(input: &str) -> Result<Self> {
        let input = input.trim();
        if input.is_empty() {
            return Err(ThreadlensError::InvalidThreadRef(input.to_string()));
        }

        if let Some(id) = input.strip_prefix(THREAD_SCHEME) {
            let id = id.trim_end_matches('/');
            if !THREAD_ID_RE.is_match(id) {
                return Err(ThreadlensError::InvalidThreadRef(input.to_string()));
            }
            return Ok(Self::Id(id.to_ascii_lowercase()));
        }

        if THREAD_ID_RE.is_match(input) {
            return Ok(Self::Id(input.to_ascii_lowercase()));
        }

        if input.contains("://") {
            return Err(ThreadlensError::InvalidThreadRef(input.to_string()));
        }

        Ok(Self::Path(PathBuf::from(input)))
    }
}

impl fmt::Display for ThreadRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{THREAD_SCHEME}{id}"),
            Self::Path(path) => write!(f, "{}", path.display()),
        }
    }
}
