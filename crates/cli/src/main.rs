use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use recalc_addins::{MultithreadAddin, ThreadSafeAddin};
use recalc_core::Host;

mod commands;

/// Recalc - a callback-dispatch simulator for spreadsheet add-ins
#[derive(Parser)]
#[command(name = "recalc")]
#[command(about = "Hammer add-in functions the way a recalculation worker pool does")]
#[command(version)]
struct Cli {
    /// Simulated work delay inside the inner demo functions, in milliseconds
    #[arg(long, default_value_t = 10)]
    work_delay_ms: u64,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the registered functions
    List {
        /// Emit the registration table as JSON
        #[arg(long)]
        json: bool,
    },
    /// Call one registered function once
    Call {
        /// Function name
        function: String,
        /// Arguments: numbers where they parse, text otherwise
        args: Vec<String>,
    },
    /// Hammer one function from many worker threads
    Hammer {
        /// Function name
        function: String,
        /// Arguments passed on every call
        args: Vec<String>,
        /// Worker thread count
        #[arg(short, long, default_value_t = 8)]
        threads: usize,
        /// Calls per worker thread
        #[arg(short, long, default_value_t = 1000)]
        iterations: usize,
    },
    /// Run a YAML scenario file
    Run {
        /// Path to the scenario file
        scenario: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_tracing(cli.verbose);

    // One host per process, with both demo add-ins loaded.
    let host = Host::new();
    let delay = Duration::from_millis(cli.work_delay_ms);
    let multithread = MultithreadAddin::with_work_delay(delay);
    let threadsafe = ThreadSafeAddin::with_work_delay(delay);
    host.load(&multithread)
        .map_err(|err| anyhow::anyhow!("failed to load multithread add-in: {err}"))?;
    host.load(&threadsafe)
        .map_err(|err| anyhow::anyhow!("failed to load threadsafe add-in: {err}"))?;

    match cli.command {
        Commands::List { json } => commands::list::execute(&host, json),
        Commands::Call { function, args } => commands::call::execute(&host, &function, &args),
        Commands::Hammer { function, args, threads, iterations } => {
            commands::hammer::execute(&host, &function, &args, threads, iterations)
        }
        Commands::Run { scenario } => commands::run::execute(&host, &scenario),
    }
}

fn setup_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("warn")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
