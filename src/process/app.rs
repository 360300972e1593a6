//! Process controller - one external process from launch to reaping

use std::ffi::OsString;
use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::process::{ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::group::{self, KillSignal, KillStrategy};
use super::locate::{ExecutableLocator, PathLocator};
use super::outcome::ExitOutcome;
use super::watcher::{self, Completion, KillRequest};
use crate::config::Settings;
use crate::error::{AppError, Result};

/// What to launch
#[derive(Debug, Clone)]
struct CommandSpec {
    program: String,
    args: Vec<String>,
    /// Explicit environment in order; `None` inherits the parent's
    env: Option<Vec<(OsString, OsString)>>,
}

impl CommandSpec {
    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);

        if let Some(env) = &self.env {
            command.env_clear();
            command.envs(env.iter().map(|(key, value)| (key, value)));
        }

        command
    }
}

/// Bookkeeping for a launched process
struct Running {
    pid: Option<u32>,
    completion: Completion,
    kill_tx: Mutex<Option<oneshot::Sender<KillRequest>>>,
    task: Mutex<Option<JoinHandle<()>>>,
    stdin: Option<ChildStdin>,
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// An external application and, once started, the process running it.
///
/// One `App` manages exactly one process lifetime. On Unix the process is
/// started in its own process group so [`kill`](Self::kill) reaches every
/// descendant.
pub struct App {
    spec: CommandSpec,
    strategy: KillStrategy,
    kill_signal: KillSignal,
    running: Option<Running>,
}

impl App {
    /// Describe the application; nothing is launched until `start` or `run`.
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            spec: CommandSpec {
                program: program.into(),
                args: args.into_iter().map(Into::into).collect(),
                env: None,
            },
            strategy: KillStrategy::detect(),
            kill_signal: KillSignal::default(),
            running: None,
        }
    }

    /// Same as [`new`](Self::new), with the kill signal taken from settings
    pub fn with_settings<I, S>(program: impl Into<String>, args: I, settings: &Settings) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut app = Self::new(program, args);
        app.kill_signal = settings.kill_signal;
        app
    }

    pub fn program(&self) -> &str {
        &self.spec.program
    }

    pub fn args(&self) -> &[String] {
        &self.spec.args
    }

    /// Explicit environment, if any has been set
    pub fn environments(&self) -> Option<&[(OsString, OsString)]> {
        self.spec.env.as_deref()
    }

    pub fn kill_strategy(&self) -> KillStrategy {
        self.strategy
    }

    /// Add environments in the form `key=value`.
    ///
    /// The first call seeds the list with the current process environment,
    /// unchanged, so entries extend the inherited one rather than replace it.
    /// Later entries override earlier ones with the same key. Entries without
    /// `=` or with an empty key are skipped.
    pub fn add_environments<I, S>(&mut self, entries: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if self.running.is_some() {
            warn!(program = %self.spec.program, "Ignoring environments added after start");
            return;
        }

        let program = &self.spec.program;
        let env = self
            .spec
            .env
            .get_or_insert_with(|| std::env::vars_os().collect());

        for entry in entries {
            let entry: String = entry.into();
            match entry.split_once('=') {
                Some((key, value)) if !key.is_empty() => {
                    env.push((OsString::from(key), OsString::from(value)));
                }
                _ => warn!(program = %program, entry = %entry, "Skipping malformed environment entry"),
            }
        }
    }

    /// Launch the process and return the channel that reports its completion.
    ///
    /// `None` keeps the default for that stream (inherited). Piped streams can
    /// be taken afterwards with `take_stdin` and friends. On error nothing is
    /// left running and no watcher exists.
    pub fn start(
        &mut self,
        stdin: Option<Stdio>,
        stdout: Option<Stdio>,
        stderr: Option<Stdio>,
    ) -> Result<Completion> {
        if self.running.is_some() {
            return Err(AppError::AlreadyStarted);
        }
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(AppError::NoRuntime);
        }

        let mut command = self.spec.command();
        #[cfg(unix)]
        if self.strategy == KillStrategy::Group {
            command.process_group(0);
        }
        if let Some(stdin) = stdin {
            command.stdin(stdin);
        }
        if let Some(stdout) = stdout {
            command.stdout(stdout);
        }
        if let Some(stderr) = stderr {
            command.stderr(stderr);
        }

        let mut child = command
            .spawn()
            .map_err(|err| AppError::launch(&self.spec.program, err))?;

        let pid = child.id();
        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let watcher = watcher::spawn(child, pid);
        debug!(?pid, program = %self.spec.program, args = ?self.spec.args, "Started process");

        let completion = watcher.completion.clone();
        self.running = Some(Running {
            pid,
            completion: watcher.completion,
            kill_tx: Mutex::new(Some(watcher.kill_tx)),
            task: Mutex::new(Some(watcher.task)),
            stdin,
            stdout,
            stderr,
        });

        Ok(completion)
    }

    /// Start and wait. A launch failure comes back as a failed outcome with
    /// exit code 0, so check the error before the code.
    pub async fn run(
        &mut self,
        stdin: Option<Stdio>,
        stdout: Option<Stdio>,
        stderr: Option<Stdio>,
    ) -> ExitOutcome {
        if let Err(err) = self.start(stdin, stdout, stderr) {
            return ExitOutcome::Failed(err);
        }
        self.wait().await
    }

    /// Wait until the application finishes.
    ///
    /// The outcome is delivered once. Any later (or losing concurrent) call
    /// gets [`AppError::AlreadyExited`]; use
    /// [`exit_code_or_error`](Self::exit_code_or_error) to read it again.
    pub async fn wait(&self) -> ExitOutcome {
        let Some(running) = &self.running else {
            return ExitOutcome::Failed(AppError::NotStarted);
        };

        running
            .completion
            .clone()
            .recv()
            .await
            .unwrap_or(ExitOutcome::Failed(AppError::AlreadyExited))
    }

    /// Cached outcome once the process has finished, `None` before.
    pub fn exit_code_or_error(&self) -> Option<ExitOutcome> {
        self.running.as_ref()?.completion.peek()
    }

    /// Whether the outcome has been published
    pub fn is_finished(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|running| running.completion.is_ready())
    }

    /// OS pid, once started
    pub fn pid(&self) -> Option<u32> {
        self.running.as_ref()?.pid
    }

    pub fn take_stdin(&mut self) -> Option<ChildStdin> {
        self.running.as_mut()?.stdin.take()
    }

    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.running.as_mut()?.stdout.take()
    }

    pub fn take_stderr(&mut self) -> Option<ChildStderr> {
        self.running.as_mut()?.stderr.take()
    }

    /// Terminate the application and everything it spawned.
    ///
    /// Returns once the watcher has reaped the process. A termination by
    /// signal is the expected result of a kill and is reported as `Ok`, so
    /// the [`AppError::Terminated`] outcome (and its signal number) can only
    /// be read through [`exit_code_or_error`](Self::exit_code_or_error). Any
    /// other captured error, such as a reap failure, is returned.
    pub async fn kill(&self) -> Result<()> {
        let running = self.running.as_ref().ok_or(AppError::NotStarted)?;
        if running.completion.is_ready() {
            return Err(AppError::AlreadyExited);
        }

        debug!(pid = ?running.pid, program = %self.spec.program, strategy = ?self.strategy, "Killing process");
        match self.strategy {
            KillStrategy::Group => {
                let pid = running.pid.ok_or(AppError::AlreadyExited)?;
                group::signal_group(pid, self.kill_signal)?;
            }
            KillStrategy::Single => Self::kill_immediate(running).await?,
        }

        let outcome = match self.wait().await {
            // someone else took the delivery; the cached value is just as final
            ExitOutcome::Failed(AppError::AlreadyExited) => running
                .completion
                .clone()
                .ready()
                .await
                .unwrap_or(ExitOutcome::Failed(AppError::WatcherAborted)),
            outcome => outcome,
        };

        let task = lock(&running.task).take();
        if let Some(task) = task {
            // a panicked watcher already published WatcherAborted
            let _ = task.await;
        }

        match outcome {
            ExitOutcome::Exited(_) => Ok(()),
            ExitOutcome::Failed(err) if err.is_termination() => Ok(()),
            ExitOutcome::Failed(err) => Err(err),
        }
    }

    /// Ask the watcher, which owns the child handle, to kill it.
    async fn kill_immediate(running: &Running) -> Result<()> {
        let request = lock(&running.kill_tx)
            .take()
            .ok_or(AppError::AlreadyExited)?;

        let (reply_tx, reply_rx) = oneshot::channel();
        request
            .send(reply_tx)
            .map_err(|_| AppError::AlreadyExited)?;

        match reply_rx.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(AppError::Signal(Arc::new(err))),
            Err(_) => Err(AppError::AlreadyExited),
        }
    }

    /// Check the executable can be found on PATH.
    pub async fn check_is_installed(&self) -> Result<()> {
        self.check_is_installed_with(&PathLocator).await
    }

    pub async fn check_is_installed_with(&self, locator: &dyn ExecutableLocator) -> Result<()> {
        let path = locator.locate(&self.spec.program).await?;
        debug!(program = %self.spec.program, path = %path.display(), "Executable located");
        Ok(())
    }
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("program", &self.spec.program)
            .field("args", &self.spec.args)
            .field("strategy", &self.strategy)
            .field("pid", &self.pid())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_does_not_launch() {
        let app = App::new("sleep", ["10"]);
        assert_eq!(app.program(), "sleep");
        assert_eq!(app.args(), ["10".to_string()]);
        assert!(app.pid().is_none());
        assert!(app.exit_code_or_error().is_none());
        assert!(!app.is_finished());
    }

    #[test]
    fn test_add_environments_seeds_inherited() {
        std::env::set_var("PROCCTL_UNIT_SEED", "1");
        let mut app = App::new("env", Vec::<String>::new());
        assert!(app.environments().is_none());

        app.add_environments(["A=1", "no-separator", "=empty-key"]);
        let env = app.environments().expect("explicit env");
        assert!(env.iter().any(|(k, v)| k == "PROCCTL_UNIT_SEED" && v == "1"));

        let (key, value) = env.last().expect("added entry");
        assert_eq!(key, "A");
        assert_eq!(value, "1");
        assert!(!env.iter().any(|(k, _)| k == "no-separator" || k.is_empty()));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_single_strategy_kills_immediate_child() {
        let mut app = App::new("sleep", ["30"]);
        app.strategy = KillStrategy::Single;
        app.start(None, None, None).expect("sleep starts");

        tokio::time::timeout(std::time::Duration::from_secs(10), app.kill())
            .await
            .expect("kill returns")
            .expect("kill succeeds");

        match app.exit_code_or_error() {
            Some(ExitOutcome::Failed(AppError::Terminated { signal })) => assert_eq!(signal, 9),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(matches!(app.kill().await, Err(AppError::AlreadyExited)));

        // the kill request was already handed to the watcher
        let running = app.running.as_ref().expect("started");
        assert!(matches!(
            App::kill_immediate(running).await,
            Err(AppError::AlreadyExited)
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_single_strategy_request_after_exit() {
        let mut app = App::new("sh", ["-c", "exit 0"]);
        app.strategy = KillStrategy::Single;
        assert!(app.run(None, None, None).await.is_success());

        // the watcher is gone, so nobody answers the request
        let running = app.running.as_ref().expect("started");
        assert!(matches!(
            App::kill_immediate(running).await,
            Err(AppError::AlreadyExited)
        ));
    }

    #[test]
    fn test_with_settings_takes_kill_signal() {
        let settings = Settings {
            kill_signal: KillSignal::Term,
            ..Settings::default()
        };
        let app = App::with_settings("true", Vec::<String>::new(), &settings);
        assert_eq!(app.kill_signal, KillSignal::Term);
    }

    #[test]
    fn test_start_outside_runtime() {
        let mut app = App::new("true", Vec::<String>::new());
        let err = app.start(None, None, None).unwrap_err();
        assert!(matches!(err, AppError::NoRuntime));
        assert!(app.pid().is_none());
    }

    #[tokio::test]
    async fn test_wait_before_start() {
        let app = App::new("true", Vec::<String>::new());
        let outcome = app.wait().await;
        assert!(matches!(outcome, ExitOutcome::Failed(AppError::NotStarted)));
    }

    #[tokio::test]
    async fn test_kill_before_start() {
        let app = App::new("true", Vec::<String>::new());
        assert!(matches!(app.kill().await, Err(AppError::NotStarted)));
    }
}
