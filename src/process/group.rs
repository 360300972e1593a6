//! Process-group capability and kill strategies

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Whether the target can signal a whole process group.
pub const fn supports_process_groups() -> bool {
    cfg!(unix)
}

/// Signal sent to the process group on kill.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KillSignal {
    /// SIGINT
    Int,
    /// SIGTERM
    Term,
    /// SIGKILL
    #[default]
    Kill,
}

#[cfg(unix)]
impl KillSignal {
    fn as_nix(self) -> nix::sys::signal::Signal {
        use nix::sys::signal::Signal;

        match self {
            KillSignal::Int => Signal::SIGINT,
            KillSignal::Term => Signal::SIGTERM,
            KillSignal::Kill => Signal::SIGKILL,
        }
    }
}

/// How `kill` reaches the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillStrategy {
    /// Signal the negated group id so every descendant is hit
    Group,
    /// Kill only the immediate child through its handle
    Single,
}

impl KillStrategy {
    pub fn detect() -> Self {
        if supports_process_groups() {
            KillStrategy::Group
        } else {
            KillStrategy::Single
        }
    }
}

/// Resolve the group of `pid` and signal every member of it.
#[cfg(unix)]
pub(crate) fn signal_group(pid: u32, signal: KillSignal) -> Result<(), AppError> {
    use nix::sys::signal::kill;
    use nix::unistd::{getpgid, Pid};
    use std::sync::Arc;

    let pgid = getpgid(Some(Pid::from_raw(pid as i32)))
        .map_err(|errno| AppError::ProcessGroup(Arc::new(errno.into())))?;

    // A negative pid addresses the whole group
    kill(Pid::from_raw(-pgid.as_raw()), signal.as_nix())
        .map_err(|errno| AppError::Signal(Arc::new(errno.into())))?;

    tracing::debug!(pid, pgid = pgid.as_raw(), ?signal, "Signalled process group");
    Ok(())
}

#[cfg(not(unix))]
pub(crate) fn signal_group(_pid: u32, _signal: KillSignal) -> Result<(), AppError> {
    Err(AppError::ProcessGroup(std::sync::Arc::new(
        std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "process groups are not supported on this platform",
        ),
    )))
}
