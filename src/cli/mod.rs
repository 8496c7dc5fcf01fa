//! Terminal front end

pub mod args;
pub mod output;

pub use args::{Cli, Command, VerbosityLevel};
pub use output::OutputFormatter;
