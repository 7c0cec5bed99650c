//! relaunch
//!
//! Watches a source tree, rebuilds the program whenever a relevant file
//! changes and keeps exactly one up-to-date instance of it running.

use anyhow::{Context, Result};
use clap::{Args, Parser};
use std::path::PathBuf;

use relaunch::commands::run;
use relaunch::config::Config;
use relaunch::logging;

/// Live reload for compiled programs
#[derive(Parser)]
#[command(name = "relaunch")]
#[command(version)]
#[command(about = "Rebuild and restart a program whenever its sources change")]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(flatten)]
    run: RunArgs,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Config file (defaults to ./relaunch.yaml when present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Name of the generated binary
    #[arg(short, long)]
    bin: Option<String>,

    /// Path to watch files from
    #[arg(short = 't', long)]
    path: Option<PathBuf>,

    /// Path to build files from (defaults to the watch path)
    #[arg(short = 'd', long)]
    build: Option<PathBuf>,

    /// Directory to ignore, relative to the working directory (repeatable).
    /// Matches whole path components: "vendor" does not cover "vendored"
    #[arg(short = 'x', long = "exclude-dir")]
    exclude_dir: Vec<PathBuf>,

    /// Reload on any file change, not only source files
    #[arg(long)]
    all: bool,

    /// Additional compiler arguments, e.g. "-tags dev"
    #[arg(long, allow_hyphen_values = true)]
    build_args: Option<String>,

    /// Prefix for log lines
    #[arg(long)]
    log_prefix: Option<String>,

    /// Compiler to invoke
    #[arg(long)]
    compiler: Option<String>,

    /// Source file extension to react to
    #[arg(long)]
    extension: Option<String>,

    /// Native recursive file-event tool
    #[arg(long)]
    native_watcher: Option<String>,

    /// Quiet period in milliseconds before a burst of changes triggers a rebuild
    #[arg(long)]
    debounce_ms: Option<u64>,

    /// Arguments passed to the program
    #[arg(last = true)]
    run_args: Vec<String>,
}

impl RunArgs {
    /// Flags win over the config file
    fn apply(self, config: &mut Config) {
        if let Some(bin) = self.bin {
            config.bin = bin;
        }
        if let Some(path) = self.path {
            config.path = path;
        }
        if let Some(build) = self.build {
            config.build = Some(build);
        }
        if !self.exclude_dir.is_empty() {
            config.exclude_dirs = self.exclude_dir;
        }
        if self.all {
            config.all = true;
        }
        if let Some(args) = self.build_args {
            config.build_args = args;
        }
        if let Some(prefix) = self.log_prefix {
            config.log_prefix = prefix;
        }
        if let Some(compiler) = self.compiler {
            config.compiler = compiler;
        }
        if let Some(extension) = self.extension {
            config.extension = extension;
        }
        if let Some(tool) = self.native_watcher {
            config.native_watcher = tool;
        }
        if let Some(ms) = self.debounce_ms {
            config.debounce_ms = ms;
        }
        if !self.run_args.is_empty() {
            config.run_args = self.run_args;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let args = cli.run;

    let wd = std::env::current_dir().context("Failed to read working directory")?;
    let mut config = Config::load(&wd, args.config.as_deref())?;
    args.apply(&mut config);

    logging::init(&config.log_prefix, cli.verbose)?;

    run::run(config).await
}
