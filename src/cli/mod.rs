//! CLI layer - Command-line interface
//!
//! Contains argument parsing, output formatting, signal handling,
//! stdin control and the main application runners.

pub mod app;
pub mod args;
pub mod config_cmd;
pub mod control;
pub mod presenter;
pub mod signals;

// Re-export commonly used types
pub use app::{run_permission, run_record, EXIT_ERROR, EXIT_SUCCESS, EXIT_USAGE_ERROR};
pub use args::{Cli, Commands, ConfigAction, RecordArgs, RecordOptions};
pub use control::ControlCommand;
pub use presenter::Presenter;
