//! Error types for process control

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Errors surfaced by the process controller.
///
/// Cloneable so a published [`ExitOutcome`](crate::ExitOutcome) can be read
/// any number of times; OS errors are shared behind an `Arc`.
#[derive(Debug, Clone, Error)]
pub enum AppError {
    /// The OS refused to create the process
    #[error("failed to launch \"{program}\": {source}")]
    Launch {
        program: String,
        #[source]
        source: Arc<io::Error>,
    },

    /// `start` was called outside of a Tokio runtime
    #[error("no Tokio runtime available to watch the process")]
    NoRuntime,

    /// A controller manages a single process lifetime
    #[error("process already started")]
    AlreadyStarted,

    #[error("process not started")]
    NotStarted,

    /// The completion was already delivered to another consumer
    #[error("exited already")]
    AlreadyExited,

    /// Waiting on the child failed
    #[error("failed to wait for process: {0}")]
    Wait(#[source] Arc<io::Error>),

    /// The process was terminated by a signal and has no exit code
    #[error("process terminated by signal {signal}")]
    Terminated { signal: i32 },

    /// The process ended without an exit code or a signal
    #[error("process ended with abnormal status: {0}")]
    AbnormalStatus(String),

    /// The watcher unwound before publishing a result
    #[error("completion watcher ended without a result")]
    WatcherAborted,

    /// Resolving the process group id failed
    #[error("failed to resolve process group: {0}")]
    ProcessGroup(#[source] Arc<io::Error>),

    /// Delivering the termination signal failed
    #[error("failed to deliver termination signal: {0}")]
    Signal(#[source] Arc<io::Error>),

    #[error("executable \"{program}\" does not exist")]
    NotInstalled { program: String },
}

impl AppError {
    pub(crate) fn launch(program: &str, source: io::Error) -> Self {
        Self::Launch {
            program: program.to_string(),
            source: Arc::new(source),
        }
    }

    /// True for errors that a forced kill is expected to produce
    pub fn is_termination(&self) -> bool {
        matches!(self, Self::Terminated { .. })
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Result type for process operations
pub type Result<T> = std::result::Result<T, AppError>;
