//! Error types for KeyBoy

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum KeyBoyError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Event tap error: {0}")]
    Tap(#[from] TapError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Menu bar error: {0}")]
    MenuBar(String),
}

/// Failures of the configuration store.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not determine a configuration directory")]
    NoConfigDir,

    #[error("failed to {action} {}: {source}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize configuration: {0}")]
    Serialize(#[source] serde_json::Error),

    /// An imported document was rejected; nothing was applied.
    #[error("invalid JSON ({stage}) at line {line}, column {column}: {message}")]
    Import {
        stage: ImportStage,
        line: usize,
        column: usize,
        message: String,
    },

    #[error("file watcher error: {0}")]
    Watch(#[from] notify::Error),
}

impl ConfigError {
    pub(crate) fn io(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConfigError::Io {
            action,
            path: path.into(),
            source,
        }
    }
}

/// Which step of the import pipeline rejected the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportStage {
    Syntax,
    Structure,
    Schema,
}

impl std::fmt::Display for ImportStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ImportStage::Syntax => "syntax",
            ImportStage::Structure => "structure",
            ImportStage::Schema => "schema",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum TapError {
    #[error(
        "failed to create event tap. Make sure KeyBoy has Accessibility permissions.\n\
         System Settings > Privacy & Security > Accessibility > Add KeyBoy.app"
    )]
    PermissionDenied,

    #[error("failed to create runloop source for event tap")]
    RunLoopSource,

    #[error("failed to spawn event tap thread: {0}")]
    ThreadSpawn(String),

    #[error("event tap thread exited before reporting readiness")]
    ThreadCrashed,

    #[error("global event taps are only supported on macOS")]
    Unsupported,
}

#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("application not found at {0}")]
    NotFound(String),

    #[error("could not open {path}: {reason}")]
    OpenFailed { path: String, reason: String },

    #[error("launching applications is only supported on macOS")]
    Unsupported,
}

pub type Result<T> = std::result::Result<T, KeyBoyError>;
