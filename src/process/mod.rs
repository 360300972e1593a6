//! Process control for a single external application

pub mod app;
pub mod group;
pub mod locate;
pub mod outcome;
pub mod watcher;

pub use app::App;
pub use group::{supports_process_groups, KillSignal, KillStrategy};
pub use locate::{ExecutableLocator, LookupCommandLocator, PathLocator};
pub use outcome::ExitOutcome;
pub use watcher::Completion;
