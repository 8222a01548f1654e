//! QKD Command-Line Interface
//!
//! Runs BB84, B92 and E91 key distribution simulations, batch sweeps over
//! round counts, and noisy gate experiments.
//!
//! ```text
//!   Alice ──|ψ⟩──▶ · · · (Eve) · · · ──▶ Bob
//!     │                                   │
//!     └──────── bases, samples ───────────┘
//! ```

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use clap::{Parser, Subcommand};
use console::style;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::common::{ConfigArgs, OutputFormat};
use commands::{batch, gates, run, version};

/// qkd - quantum key distribution simulator
#[derive(Parser)]
#[command(name = "qkd")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single protocol instance
    Run {
        #[command(flatten)]
        config: ConfigArgs,

        /// Output format (table, json, yaml)
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,

        /// Print the per-round log
        #[arg(long)]
        rounds: bool,

        /// Write the report to a file instead of stdout
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Run repeated instances over several round counts
    Batch {
        #[command(flatten)]
        config: ConfigArgs,

        /// Comma-separated round counts
        #[arg(long, value_delimiter = ',', default_value = "100,500,1000")]
        counts: Vec<usize>,

        /// Runs per round count
        #[arg(long, default_value = "5")]
        repeats: usize,

        /// Output format (table, json, yaml)
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Measure gate error rates under a noise channel
    Gates {
        /// Noise channel (bit_flip, phase_flip, depolarizing)
        #[arg(long, default_value = "depolarizing")]
        noise: String,

        /// Comma-separated error probabilities
        #[arg(long, value_delimiter = ',', default_value = "0,0.05,0.1,0.2")]
        probabilities: Vec<f64>,

        /// Comma-separated gates (x, y, z, h, s, t, rx:<θ>, rz:<θ>, ...)
        #[arg(long, value_delimiter = ',', default_value = "x,y,z,h,s,t")]
        gates: Vec<String>,

        /// Trials per gate and probability
        #[arg(long, default_value = "1000")]
        trials: u32,

        /// Random seed
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Output format (table, json, yaml)
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    // Execute command
    let result = match cli.command {
        Commands::Run {
            config,
            format,
            rounds,
            output,
        } => run::execute(&config, format, rounds, output.as_deref()).await,

        Commands::Batch {
            config,
            counts,
            repeats,
            format,
        } => batch::execute(&config, &counts, repeats, format).await,

        Commands::Gates {
            noise,
            probabilities,
            gates: gate_names,
            trials,
            seed,
            format,
        } => gates::execute(&noise, &probabilities, &gate_names, trials, seed, format),

        Commands::Version => {
            version::execute();
            Ok(())
        }
    };

    // Handle errors
    if let Err(e) = result {
        eprintln!("{} {}", style("Error:").red().bold(), e);
        std::process::exit(1);
    }

    Ok(())
}
