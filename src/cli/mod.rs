pub mod args;
pub mod commands;

pub use args::{Cli, Commands, InputSource};
pub use commands::run;
