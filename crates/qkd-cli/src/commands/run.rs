//! Run command implementation.

use anyhow::Result;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use qkd_protocol::{ProtocolEngine, ResultsSink};

use super::common::{ConfigArgs, OutputFormat, open_output, sink_for};

/// Execute the run command.
pub async fn execute(
    args: &ConfigArgs,
    format: OutputFormat,
    show_rounds: bool,
    output: Option<&str>,
) -> Result<()> {
    let config = args.resolve()?;
    tracing::debug!(?config, "resolved run configuration");
    let engine = ProtocolEngine::new(config)?;

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}")?);
    spinner.set_message(format!(
        "Running {} over {} qubits...",
        engine.config().variant,
        engine.config().num_rounds
    ));
    spinner.enable_steady_tick(std::time::Duration::from_millis(100));

    let report = engine.run().await;
    spinner.finish_and_clear();

    let mut sink = sink_for(format, open_output(output)?, show_rounds);
    sink.record(&report)?;
    sink.finish()?;

    if let Some(path) = output {
        eprintln!("{} Report written to {}", style("✓").green().bold(), path);
    }

    if let Some(failure) = report.failure() {
        anyhow::bail!("Run aborted ({}): {}", failure.kind, failure.message);
    }
    Ok(())
}
