//! Command implementations for the CLI.

mod config;
mod set;
mod state;
mod watch;

pub use config::cmd_config;
pub use set::cmd_set;
pub use state::cmd_state;
pub use watch::{WatchArgs, cmd_watch};
