//! Warden CLI - drive the isolate orchestrator from JSON method calls.

mod entries;
mod run;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "warden")]
#[command(about = "Spawn and kill isolates through the Warden orchestrator")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a script of JSON-lines method calls
    Run {
        /// Path to the script (reads stdin when omitted)
        script: Option<PathBuf>,

        /// Fail isolates that do not signal readiness in time (0 = wait forever)
        #[arg(long, default_value = "5000")]
        handshake_timeout_ms: u64,
    },

    /// List the built-in entry points
    Entries,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        tracing_subscriber::EnvFilter::from_default_env()
            .add_directive(tracing::Level::DEBUG.into())
    } else {
        tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run {
            script,
            handshake_timeout_ms,
        } => run::execute(script.as_deref(), handshake_timeout_ms).await?,

        Commands::Entries => {
            for entry in entries::BUILTIN {
                println!("{:>3}  {:<8} {}", entry.token, entry.name, entry.description);
            }
        }
    }

    Ok(())
}
