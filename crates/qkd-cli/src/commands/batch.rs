//! Batch command implementation.

use anyhow::Result;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use qkd_protocol::{BatchReport, run_batch_with};

use super::common::{ConfigArgs, OutputFormat, write_structured};

/// Execute the batch command.
pub async fn execute(
    args: &ConfigArgs,
    counts: &[usize],
    repeats: usize,
    format: OutputFormat,
) -> Result<()> {
    if counts.is_empty() {
        anyhow::bail!("At least one round count is required");
    }
    let base = args.resolve()?;

    let total = (counts.len() * repeats) as u64;
    let progress = ProgressBar::new(total);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} runs")?
            .progress_chars("=> "),
    );

    let report = run_batch_with(&base, counts, repeats, |_| progress.inc(1)).await?;
    progress.finish_and_clear();

    match format {
        OutputFormat::Table => print_table(&report),
        OutputFormat::Json | OutputFormat::Yaml => {
            let mut out = std::io::stdout();
            write_structured(&mut out, format, &report)?;
        }
    }
    Ok(())
}

fn print_table(report: &BatchReport) {
    println!(
        "\n{} {} batch, {} repeats per count",
        style("→").cyan().bold(),
        style(report.variant).green().bold(),
        report.repeats
    );
    println!();
    println!(
        "  {:>8}  {:>6}  {:>8}  {:>10}  {:>10}  {:>10}",
        "Rounds", "Failed", "Sifted", "Error rate", "Final key", "Detected"
    );
    println!("  {}", "-".repeat(62));
    for agg in &report.aggregates {
        println!(
            "  {:>8}  {:>6}  {:>7.1}%  {:>9.2}%  {:>9.1}%  {:>9.0}%",
            agg.num_rounds,
            agg.failed_runs,
            agg.mean_sifted_fraction * 100.0,
            agg.mean_error_rate * 100.0,
            agg.mean_final_key_fraction * 100.0,
            agg.detection_rate * 100.0
        );
    }
}
