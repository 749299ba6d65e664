use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};

use routec_cli::{CacheOptions, ConfigOptions, RoutecOptions, Target, run_main};

#[derive(Parser, Debug)]
#[command(
    name = "routec",
    about = "routec: compile attribute-declared PHP routes into route tables",
    version
)]
pub struct Cli {
    #[command(flatten)]
    config: ConfigOptions,

    #[command(flatten)]
    cache: CacheOptions,

    /// Output file path (writes to file instead of stdout)
    #[arg(short = 'o', long = "output", value_name = "FILE", global = true)]
    output: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compile the HTTP routes of the controller serving a URI
    Http {
        /// Controller directory to scan
        dir: PathBuf,
        /// Request URI, query string allowed
        #[arg(long)]
        uri: String,
        /// Error context to collect class-level error handlers for
        #[arg(long, default_value = "web")]
        context: String,
    },
    /// Compile the console commands of one command group
    Cli {
        dir: PathBuf,
        /// Command group name
        #[arg(long)]
        command: String,
    },
    /// List every route under a directory, grouped by module
    Export { dir: PathBuf },
}

impl From<Command> for Target {
    fn from(command: Command) -> Self {
        match command {
            Command::Http { dir, uri, context } => Target::Http { dir, uri, context },
            Command::Cli { dir, command } => Target::Cli { dir, command },
            Command::Export { dir } => Target::Export { dir },
        }
    }
}

pub fn run(args: Cli) -> anyhow::Result<()> {
    let total_start = Instant::now();

    if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .init();
    }

    let opts = RoutecOptions {
        config: args.config,
        cache: args.cache,
        output: args.output,
        target: args.command.into(),
    };

    run_main(&opts).with_context(|| format!("compiling routes under {}", opts.target.dir().display()))?;

    let total_secs = total_start.elapsed().as_secs_f64();
    tracing::info!(total_secs, "complete");
    Ok(())
}

pub fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    run(args)
}
