#![forbid(unsafe_code)]

mod cmd;
mod output;

use clap::{Parser, Subcommand};
use deje_core::config::{DejeConfig, OutputFormat, load_config};
use output::{CliError, OutputMode, render_error, resolve_output_mode};
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "deje: inspect event-sourced documents",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    /// Config file (default: $DEJE_CONFIG, then the user config dir).
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        about = "Pick the canonical tip",
        long_about = "Run the timestamp tracker over the document and print the tip, the state at the tip, and every skipped checkpoint.",
        after_help = "EXAMPLES:\n    # Use the document's own checkpoint list\n    deje tip doc.json\n\n    # Emit machine-readable output\n    deje tip doc.json --json"
    )]
    Tip(cmd::tip::TipArgs),

    #[command(
        about = "Show the state at an event",
        long_about = "Replay the document from its root to an event (default: the tracker's tip) and print the state.",
        after_help = "EXAMPLES:\n    # State at the tip\n    deje show doc.json\n\n    # State at a specific event\n    deje show doc.json --event 41a772b7..."
    )]
    Show(cmd::show::ShowArgs),

    #[command(
        about = "Print the chain from root to an event",
        after_help = "EXAMPLES:\n    deje history doc.json 41a772b775b1c4afbbfb42b7a91b3031a712ab42"
    )]
    History(cmd::history::HistoryArgs),

    #[command(
        about = "Common ancestor of two events",
        long_about = "Print the nearest common ancestor of two events and whether one descends from the other."
    )]
    Ancestor(cmd::ancestor::AncestorArgs),

    #[command(
        about = "Verify hashes and parent links",
        long_about = "Check that every entry is stored under its content hash and every parent is present."
    )]
    Verify(cmd::verify::VerifyArgs),
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_env("DEJE_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if verbose || env::var("DEBUG").is_ok() {
            "deje=debug,info"
        } else {
            "deje=info,warn"
        })
    });

    let format = env::var("DEJE_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    // Logs go to stderr so `--json` output on stdout stays parseable.
    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn run(cli: &Cli, config: &DejeConfig, output: OutputMode) -> anyhow::Result<()> {
    match &cli.command {
        Commands::Tip(args) => cmd::tip::run_tip(args, config, output),
        Commands::Show(args) => cmd::show::run_show(args, config, output),
        Commands::History(args) => cmd::history::run_history(args, config, output),
        Commands::Ancestor(args) => cmd::ancestor::run_ancestor(args, config, output),
        Commands::Verify(args) => cmd::verify::run_verify(args, output),
    }
}

fn fail(mode: OutputMode, err: &anyhow::Error) -> ExitCode {
    let error = CliError::new(format!("{err:#}"), cmd::error_code(err));
    if render_error(mode, &error).is_err() {
        eprintln!("error: {err:#}");
    }
    ExitCode::FAILURE
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if cli.verbose {
        info!("Verbose mode enabled");
    }

    // Without a config only `--json` can pick the error format.
    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => return fail(resolve_output_mode(cli.json, OutputFormat::Human), &err),
    };
    let output = resolve_output_mode(cli.json, config.output.format);
    debug!(?config, "configuration resolved");

    match run(&cli, &config, output) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => fail(output, &err),
    }
}
