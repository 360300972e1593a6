//! Executable lookup for the installed check

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};

use super::app::App;
use crate::error::AppError;

/// Finds an executable by name.
#[async_trait]
pub trait ExecutableLocator: Send + Sync {
    /// Resolve `program`, or fail with [`AppError::NotInstalled`] (or the
    /// error that prevented the lookup).
    async fn locate(&self, program: &str) -> Result<PathBuf, AppError>;
}

/// Native PATH search.
#[derive(Debug, Clone, Copy, Default)]
pub struct PathLocator;

#[async_trait]
impl ExecutableLocator for PathLocator {
    async fn locate(&self, program: &str) -> Result<PathBuf, AppError> {
        which::which(program).map_err(|_| AppError::NotInstalled {
            program: program.to_string(),
        })
    }
}

/// Runs a lookup utility such as `which` with the program as its only
/// argument; a non-zero exit means "not installed".
#[derive(Debug, Clone)]
pub struct LookupCommandLocator {
    utility: String,
}

impl LookupCommandLocator {
    pub fn new(utility: impl Into<String>) -> Self {
        Self {
            utility: utility.into(),
        }
    }

    pub fn utility(&self) -> &str {
        &self.utility
    }
}

impl Default for LookupCommandLocator {
    fn default() -> Self {
        // `whereis` exits 0 whether or not it found anything
        Self::new("which")
    }
}

#[async_trait]
impl ExecutableLocator for LookupCommandLocator {
    async fn locate(&self, program: &str) -> Result<PathBuf, AppError> {
        let mut lookup = App::new(&self.utility, [program]);
        let outcome = lookup
            .run(
                Some(Stdio::null()),
                Some(Stdio::piped()),
                Some(Stdio::null()),
            )
            .await;

        if let Some(err) = outcome.error() {
            return Err(err.clone());
        }
        if outcome.exit_code() != 0 {
            return Err(AppError::NotInstalled {
                program: program.to_string(),
            });
        }

        // A single path line fits in the pipe buffer, so it is still there
        // after the utility has exited.
        let mut printed = String::new();
        if let Some(mut stdout) = lookup.take_stdout() {
            if let Err(err) = stdout.read_to_string(&mut printed).await {
                warn!(utility = %self.utility, program, error = %err, "Failed to read lookup output");
                printed.clear();
            }
        }

        Ok(printed_path(&printed, program))
    }
}

/// First line the utility printed, or the program name when it printed
/// nothing usable.
fn printed_path(printed: &str, program: &str) -> PathBuf {
    match printed.lines().next().map(str::trim) {
        Some(line) if !line.is_empty() => PathBuf::from(line),
        _ => {
            debug!(program, "Lookup printed no path, using the program name");
            PathBuf::from(program)
        }
    }
}
