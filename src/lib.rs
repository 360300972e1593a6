//! procctl - start, wait for, and kill a single external process
//!
//! ```no_run
//! use procctl::App;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let mut app = App::new("sh", ["-c", "exit 7"]);
//! let outcome = app.run(None, None, None).await;
//! assert!(outcome.error().is_none());
//! assert_eq!(outcome.exit_code(), 7);
//! # }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod process;

// Re-export commonly used types
pub use config::{LocatorKind, Settings};
pub use error::{AppError, ConfigError, Result};
pub use process::{
    supports_process_groups, App, Completion, ExecutableLocator, ExitOutcome, KillSignal,
    KillStrategy, LookupCommandLocator, PathLocator,
};
