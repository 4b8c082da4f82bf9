//! hrx - expands Flux HelmRelease resources into the manifests their charts render

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

mod commands;
mod error;
mod exit_codes;
mod logging;

use commands::expand::ExpandArgs;
use error::Result;

#[derive(Parser)]
#[command(name = "hrx")]
#[command(version)]
#[command(about = "Expands HelmRelease objects into generated templates", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Arguments of `expand` when no subcommand is given
    #[command(flatten)]
    expand: ExpandArgs,

    /// Log level (debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn", env = "HRX_LOG_LEVEL")]
    log_level: String,

    /// Log format (text or json)
    #[arg(long, global = true, default_value = "text", env = "HRX_LOG_FORMAT")]
    log_format: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Expand HelmRelease objects into generated templates (default)
    Expand(ExpandArgs),

    /// Convert a YAML document stream into a single YAML array
    ToArray {
        /// File with the input documents (default: stdin)
        file: Option<PathBuf>,
    },

    /// Print version information
    Version,
}

#[tokio::main]
async fn main() -> ExitCode {
    miette::set_panic_hook();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::from(exit_codes::SUCCESS),
        Err(err) => {
            let code = err.exit_code();
            eprintln!("{:?}", miette::Report::new(err));
            ExitCode::from(code)
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    logging::init(&cli.log_level, &cli.log_format)?;

    match cli.command {
        None => commands::expand::run(&cli.expand).await,
        Some(Commands::Expand(args)) => commands::expand::run(&args).await,
        Some(Commands::ToArray { file }) => commands::to_array::run(file.as_deref()),
        Some(Commands::Version) => {
            commands::version::run();
            Ok(())
        }
    }
}
