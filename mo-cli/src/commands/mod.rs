//! Command implementations for mo-test

pub mod clean;
pub mod imports;
pub mod stale;

// Re-export command functions
pub use clean::clean_command;
pub use imports::ImportsArgs;
pub use stale::stale_command;
pub use test::{test_command, ReporterKind};
