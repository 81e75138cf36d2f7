//! Gene-level annotation of structural variant graphs.

pub mod annotate;
pub mod common;

use clap::{Parser, Subcommand};
use console::{Emoji, Term};

/// CLI parser based on clap.
#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "SV gene disruption and fusion annotation",
    long_about = "Annotate structural variant graphs with transcript disruptions and fusion candidates"
)]
struct Cli {
    /// Commonly used arguments
    #[command(flatten)]
    common: common::Args,

    /// The sub command to run
    #[command(subcommand)]
    command: Commands,
}

/// Enum supporting the parsing of sub commands.
#[derive(Debug, Subcommand)]
enum Commands {
    /// Annotate SV graphs with gene disruptions and fusions.
    Annotate(annotate::Args),
}

fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    // Build a tracing subscriber according to the configuration in `cli.common`.
    let collector = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(match cli.common.verbose.log_level() {
            Some(level) => match level {
                log::Level::Error => tracing::Level::ERROR,
                log::Level::Warn => tracing::Level::WARN,
                log::Level::Info => tracing::Level::INFO,
                log::Level::Debug => tracing::Level::DEBUG,
                log::Level::Trace => tracing::Level::TRACE,
            },
            None => tracing::Level::INFO,
        })
        .compact()
        .finish();

    let term = Term::stderr();
    // Install collector and go into sub commands.
    tracing::subscriber::with_default(collector, || {
        tracing::info!("Starting svfusion...");

        match &cli.command {
            Commands::Annotate(args) => {
                annotate::run(&cli.common, args)?;
            }
        }

        Ok::<(), anyhow::Error>(())
    })?;
    term.write_line(&format!("All done. Have a nice day!{}", Emoji(" 😃", "")))?;

    Ok(())
}
