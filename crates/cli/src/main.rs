mod cmd;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use output::{OutputFormat, print_error};

/// omnirig - declarative build-and-verify orchestrator
#[derive(Parser)]
#[command(name = "omnirig")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  /// Output format
  #[arg(short, long, global = true, value_enum, default_value_t)]
  output: OutputFormat,

  /// Directory searched for <target>.toml definitions [default: $OMNIRIG_TARGETS or ./targets]
  #[arg(long, global = true, value_name = "DIR")]
  targets_dir: Option<PathBuf>,

  /// Parent directory of default install roots [default: $OMNIRIG_ROOT or the data directory]
  #[arg(long, global = true, value_name = "DIR")]
  root: Option<PathBuf>,

  /// Timeout for steps and commands that declare none, e.g. "30m"
  #[arg(long, global = true, value_parser = humantime::parse_duration)]
  timeout: Option<Duration>,

  /// Maximum number of targets built in parallel
  #[arg(short, long, global = true)]
  jobs: Option<usize>,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Build one or more targets
  Build {
    /// Target names or paths to definition files
    #[arg(required = true)]
    targets: Vec<String>,
  },

  /// Verify an existing install of a target
  Verify {
    /// Target name or path to a definition file
    target: String,

    /// Install root to verify
    install_root: PathBuf,

    /// Version the install is expected to report, instead of the pinned one
    #[arg(long, value_name = "VERSION")]
    expect_version: Option<String>,
  },

  /// Build a target, then verify the fresh install
  Run {
    /// Target name or path to a definition file
    target: String,
  },

  /// Show the resolved steps and assertions of a target without running anything
  Plan {
    /// Target name or path to a definition file
    target: String,
  },

  /// Show platform, paths and available targets
  Info,
}

fn init_tracing(verbose: bool) {
  let default = if verbose {
    "warn,omnirig=debug,omnirig_lib=debug"
  } else {
    "warn"
  };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();
}

fn main() -> ExitCode {
  let cli = Cli::parse();
  init_tracing(cli.verbose);

  let settings = cmd::Settings::new(cli.targets_dir, cli.root, cli.timeout, cli.jobs, cli.output, cli.verbose);

  let result = match cli.command {
    Commands::Build { targets } => cmd::cmd_build(&settings, &targets),
    Commands::Verify {
      target,
      install_root,
      expect_version,
    } => cmd::cmd_verify(&settings, &target, &install_root, expect_version.as_deref()),
    Commands::Run { target } => cmd::cmd_run(&settings, &target),
    Commands::Plan { target } => cmd::cmd_plan(&settings, &target),
    Commands::Info => cmd::cmd_info(&settings),
  };

  match result {
    Ok(code) => ExitCode::from(code),
    Err(e) => {
      print_error(&format!("{e:#}"));
      ExitCode::FAILURE
    }
  }
}
