//! CLI module - argument parsing and subcommand runners

mod args;
mod commands;

pub use args::{Cli, Commands, PredictArgs, ServeArgs, TrainArgs};
pub use commands::{run_predict, run_serve, run_train};
