use clap::{Parser, Subcommand, ValueEnum};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Build and deploy applications with automatic builder selection
#[derive(Parser, Debug)]
#[command(
    name = "shipyard",
    about = "Build and deploy applications with automatic builder selection",
    version,
    author,
    long_about = "shipyard detects how a project should be built, runs the build with \
                  railpack, nixpacks or docker (falling back to the next builder when one \
                  fails), and optionally deploys the result or builds it remotely."
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, value_name = "LEVEL", help = "Set logging level")]
    pub log_level: Option<String>,

    #[arg(short = 'v', long, global = true, help = "Debug logging")]
    pub verbose: bool,

    #[arg(
        short = 'q',
        long,
        global = true,
        conflicts_with = "verbose",
        help = "Quiet mode - only errors are logged"
    )]
    pub quiet: bool,

    #[arg(
        long,
        global = true,
        value_enum,
        default_value = "human",
        help = "Log line format"
    )]
    pub log_format: LogFormatArg,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(
        about = "Build an application",
        long_about = "Detects a builder chain for PATH and builds it, trying the next builder \
                      when one fails.\n\n\
                      Examples:\n  \
                      shipyard build\n  \
                      shipyard build ./api --builder nixpacks --no-fallback\n  \
                      shipyard build --dry-run --format json\n  \
                      shipyard build --remote --service svc-123"
    )]
    Build(BuildArgs),

    #[command(
        about = "Show the status of a remote deployment",
        long_about = "Fetches the status of a deployment, and the failure report when it failed.\n\n\
                      Examples:\n  \
                      shipyard status dep-42\n  \
                      shipyard status dep-42 --format yaml"
    )]
    Status(StatusArgs),

    #[command(about = "Show the effective configuration")]
    Config(ConfigArgs),
}

#[derive(Parser, Debug, Clone)]
pub struct BuildArgs {
    #[arg(value_name = "PATH", help = "Source directory (defaults to current directory)")]
    pub path: Option<PathBuf>,

    #[arg(short = 'a', long, value_name = "NAME", help = "Application name")]
    pub app: Option<String>,

    #[arg(
        short = 'b',
        long,
        value_name = "NAME",
        help = "Builder to try first (railpack, nixpacks, csdocker, docker, noop)"
    )]
    pub builder: Option<String>,

    #[arg(long, help = "Only try the first builder of the chain")]
    pub no_fallback: bool,

    #[arg(long, help = "Build on the remote build service instead of locally")]
    pub remote: bool,

    #[arg(long, value_name = "ID", help = "Remote service identifier")]
    pub service: Option<String>,

    #[arg(long, conflicts_with = "remote", help = "Deploy the artifact after a local build")]
    pub deploy: bool,

    #[arg(long, help = "Show the resolved builder chain without building")]
    pub dry_run: bool,

    #[arg(short = 't', long, value_name = "TAG", help = "Image tag")]
    pub tag: Option<String>,

    #[arg(
        short = 'e',
        long = "env",
        value_name = "KEY=VALUE",
        value_parser = parse_key_val,
        help = "Environment entry for the build (repeatable)"
    )]
    pub env: Vec<(String, String)>,

    #[arg(
        long = "build-arg",
        value_name = "KEY=VALUE",
        value_parser = parse_key_val,
        help = "Build argument (repeatable)"
    )]
    pub build_args: Vec<(String, String)>,

    #[arg(long, value_name = "FILE", help = "Dotenv file with secrets to inject")]
    pub env_file: Option<PathBuf>,

    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Output format"
    )]
    pub format: OutputFormatArg,
}

impl BuildArgs {
    pub fn env_map(&self) -> BTreeMap<String, String> {
        self.env.iter().cloned().collect()
    }

    pub fn build_arg_map(&self) -> BTreeMap<String, String> {
        self.build_args.iter().cloned().collect()
    }
}

#[derive(Parser, Debug, Clone)]
pub struct StatusArgs {
    #[arg(value_name = "DEPLOYMENT_ID", help = "Deployment identifier")]
    pub deployment_id: String,

    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Output format"
    )]
    pub format: OutputFormatArg,
}

#[derive(Parser, Debug, Clone)]
pub struct ConfigArgs {
    #[arg(
        short = 'f',
        long,
        value_enum,
        default_value = "human",
        help = "Output format"
    )]
    pub format: OutputFormatArg,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormatArg {
    Json,
    Yaml,
    Human,
}

impl From<OutputFormatArg> for super::output::OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Json => super::output::OutputFormat::Json,
            OutputFormatArg::Yaml => super::output::OutputFormat::Yaml,
            OutputFormatArg::Human => super::output::OutputFormat::Human,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormatArg {
    Human,
    Json,
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got '{}'", s)),
    }
}
