use shipyard::cli::commands::{CliArgs, Commands, LogFormatArg};
use shipyard::cli::handlers::{handle_build, handle_config, handle_status};
use shipyard::util::{init_logging, LoggingConfig};
use shipyard::VERSION;

use clap::Parser;
use tracing::debug;

#[tokio::main]
async fn main() {
    let args = CliArgs::parse();
    init_logging(LoggingConfig::from_flags(
        args.log_level.as_deref(),
        args.verbose,
        args.quiet,
        args.log_format == LogFormatArg::Json,
    ));

    debug!("shipyard v{} starting", VERSION);
    debug!("Arguments: {:?}", args);

    let exit_code = match &args.command {
        Commands::Build(build_args) => handle_build(build_args).await,
        Commands::Status(status_args) => handle_status(status_args).await,
        Commands::Config(config_args) => handle_config(config_args),
    };

    std::process::exit(exit_code);
}
