use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use dirs::home_dir;

use crate::error::{Result, ThreadlensError};

pub const THREADS_DIR_ENV: &str = "THREADLENS_THREADS_DIR";
pub const BACKEND_URL_ENV: &str = "THREADLENS_BACKEND_URL";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadRoots {
    pub threads_root: PathBuf,
    pub backend_base_url: String,
}

impl ThreadRoots {
    pub fn from_env_or_home() -> Result<Self> {
        Self::from_lookup(|key| env::var_os(key), home_dir)
    }

    /// Backend URL only, for snapshots and streams opened by path. The
    /// threads root stays empty and is never consulted.
    pub fn backend_from_env() -> Self {
        Self::backend_from_lookup(|key| env::var_os(key))
    }

    pub fn new(threads_root: impl Into<PathBuf>) -> Self {
        Self {
            threads_root: threads_root.into(),
            backend_base_url: String::new(),
        }
    }

    pub(crate) fn from_lookup<V, H>(var: V, home: H) -> Result<Self>
    where
        V: Fn(&str) -> Option<OsString>,
        H: FnOnce() -> Option<PathBuf>,
    {
        let non_empty = |key: &str| var(key).filter(|value| !value.is_empty());

        // Precedence:
        // 1) THREADLENS_THREADS_DIR
        // 2) XDG_DATA_HOME/threadlens/threads
        // 3) ~/.local/share/threadlens/threads
        let threads_root = match non_empty(THREADS_DIR_ENV) {
            Some(path) => PathBuf::from(path),
            None => match non_empty("XDG_DATA_HOME") {
                Some(path) => Path::new(&path).join("threadlens/threads"),
                None => home()
                    .ok_or(ThreadlensError::HomeDirectoryNotFound)?
                    .join(".local/share/threadlens/threads"),
            },
        };

        Ok(Self {
            threads_root,
            ..Self::backend_from_lookup(var)
        })
    }

    pub(crate) fn backend_from_lookup<V>(var: V) -> Self
    where
        V: Fn(&str) -> Option<OsString>,
    {
        // Precedence:
        // 1) THREADLENS_BACKEND_URL
        // 2) empty, artifact links stay relative
        let backend_base_url = var(BACKEND_URL_ENV)
            .filter(|value| !value.is_empty())
            .map(|url| url.to_string_lossy().trim_end_matches('/').to_string())
            .unwrap_or_default();

        Self {
            threads_root: PathBuf::new(),
            backend_base_url,
        }
    }
}
