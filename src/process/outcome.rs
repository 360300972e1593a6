//! Terminal result of a process lifetime

use std::io;
use std::process::ExitStatus;
use std::sync::Arc;

use crate::error::AppError;

/// Either the exit code of a process that ran to completion, or the
/// error that kept it from being launched or reaped.
///
/// A non-zero exit code is data, not an error. Check [`error`](Self::error)
/// first: a failed launch reports exit code 0.
#[derive(Debug, Clone)]
pub enum ExitOutcome {
    Exited(i32),
    Failed(AppError),
}

impl ExitOutcome {
    /// Exit code, 0 when the outcome is an error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Exited(code) => *code,
            Self::Failed(_) => 0,
        }
    }

    pub fn error(&self) -> Option<&AppError> {
        match self {
            Self::Exited(_) => None,
            Self::Failed(err) => Some(err),
        }
    }

    /// Exited with code 0
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Exited(0))
    }

    pub fn into_result(self) -> Result<i32, AppError> {
        match self {
            Self::Exited(code) => Ok(code),
            Self::Failed(err) => Err(err),
        }
    }
}

impl From<AppError> for ExitOutcome {
    fn from(err: AppError) -> Self {
        Self::Failed(err)
    }
}

/// Translate what `wait` reported into an outcome.
pub(crate) fn classify(result: io::Result<ExitStatus>) -> ExitOutcome {
    match result {
        Ok(status) => match status.code() {
            Some(code) => ExitOutcome::Exited(code),
            None => ExitOutcome::Failed(without_code(status)),
        },
        Err(err) => ExitOutcome::Failed(AppError::Wait(Arc::new(err))),
    }
}

#[cfg(unix)]
fn without_code(status: ExitStatus) -> AppError {
    use std::os::unix::process::ExitStatusExt;

    match status.signal() {
        Some(signal) => AppError::Terminated { signal },
        None => AppError::AbnormalStatus(status.to_string()),
    }
}

// TODO: Windows always reports a code, so NTSTATUS crash codes such as
// 0xC0000005 currently land in `Exited`; classify them as abnormal here.
#[cfg(not(unix))]
fn without_code(status: ExitStatus) -> AppError {
    AppError::AbnormalStatus(status.to_string())
}
