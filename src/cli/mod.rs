pub mod commands;
pub mod handlers;
pub mod output;

pub use commands::{BuildArgs, CliArgs, Commands, ConfigArgs, LogFormatArg, StatusArgs};
pub use output::{BuildPlan, BuildReport, OutputFormat, OutputFormatter, StatusReport};
