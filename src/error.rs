use std::path::{Path, PathBuf};
use thiserror::Error;

/// Join probed candidates for diagnostics
fn joined(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn kind_word(is_dir: &bool) -> &'static str {
    if *is_dir {
        "directory"
    } else {
        "file"
    }
}

/// Configuration errors. Always fatal: the process exits non-zero.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(
        "no theme location given: pass --scssdir/--cssdir, or --theme (with optional --drupalroot)"
    )]
    MissingLocation,

    #[error("--scssdir/--cssdir cannot be combined with --theme/--drupalroot")]
    ConflictingModes,

    #[error("{path} is not a valid {}", kind_word(.is_dir))]
    InvalidPath { path: PathBuf, is_dir: bool },

    #[error("could not derive {what} directory from {given}; probed: {}", joined(.candidates))]
    NoConventionalLayout {
        what: &'static str,
        given: PathBuf,
        candidates: Vec<PathBuf>,
    },

    #[error("theme '{theme}' not found under {root}; probed: {}", joined(.candidates))]
    ThemeNotFound {
        theme: String,
        root: PathBuf,
        candidates: Vec<PathBuf>,
    },

    #[error("invalid theme name '{0}'")]
    InvalidThemeName(String),

    #[error("entry file {name} not found in {dir}")]
    EntryNotFound { name: String, dir: PathBuf },

    #[error("no entry files given")]
    EmptyEntryList,

    #[error("invalid output style '{0}': expected compact, compressed, expanded or nested")]
    InvalidOutputStyle(String),

    #[error("cannot determine current directory")]
    CurrentDir(#[source] std::io::Error),
}

impl ConfigError {
    pub(crate) fn not_a_dir(path: &Path) -> Self {
        ConfigError::InvalidPath {
            path: path.to_path_buf(),
            is_dir: true,
        }
    }

    pub(crate) fn not_a_file(path: &Path) -> Self {
        ConfigError::InvalidPath {
            path: path.to_path_buf(),
            is_dir: false,
        }
    }
}

/// Operation errors. Logged, never fatal to a running watch loop.
#[derive(Error, Debug)]
pub enum TaskError {
    #[error("failed to compile {entry}: {message}")]
    Compile { entry: PathBuf, message: String },

    #[error("I/O error on {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} failed with exit code {code}: {stderr}")]
    ToolFailed {
        tool: String,
        code: i32,
        stderr: String,
    },

    #[error("failed to minify {path}: {message}")]
    Image { path: PathBuf, message: String },

    #[error("no script source directory resolved; pass --uglifysrc")]
    NoScriptSource,

    #[error("file watcher failed")]
    Watch(#[from] notify::Error),

    #[error("failed to bind live-reload server on port {port}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },
}

impl TaskError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        TaskError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}
