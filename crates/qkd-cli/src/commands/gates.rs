//! Gates command implementation.

use anyhow::{Context, Result};
use console::style;
use rand::SeedableRng;
use rand::rngs::StdRng;

use qkd_sim::{Gate, GateErrorReport, sweep};

use super::common::{OutputFormat, parse_noise, write_structured};

/// Execute the gates command.
pub fn execute(
    noise: &str,
    probabilities: &[f64],
    gate_names: &[String],
    trials: u32,
    seed: u64,
    format: OutputFormat,
) -> Result<()> {
    let kind = parse_noise(noise, 0.0)?;
    let gates = parse_gates(gate_names)?;

    let mut rng = StdRng::seed_from_u64(seed);
    let reports = sweep(kind, &gates, probabilities, trials, &mut rng)
        .context("Gate experiment failed")?;

    match format {
        OutputFormat::Table => print_table(&reports, trials),
        OutputFormat::Json | OutputFormat::Yaml => {
            let mut out = std::io::stdout();
            write_structured(&mut out, format, &reports)?;
        }
    }
    Ok(())
}

/// Parse gate names such as `h`, `t` or `rx:1.5708`.
pub fn parse_gates(names: &[String]) -> Result<Vec<Gate>> {
    names
        .iter()
        .map(|name| {
            Gate::parse(name).ok_or_else(|| {
                anyhow::anyhow!(
                    "Unknown gate: '{name}'. Available: id, x, y, z, h, s, sdg, t, tdg, rx:<θ>, ry:<θ>, rz:<θ>, p:<θ>"
                )
            })
        })
        .collect()
}

fn print_table(reports: &[GateErrorReport], trials: u32) {
    println!(
        "\n{} Gate error rates ({} trials each)",
        style("→").cyan().bold(),
        trials
    );
    println!();
    println!("  {:<12}  {:<26}  {:>8}  {:>10}", "Gate", "Noise", "Errors", "Error rate");
    println!("  {}", "-".repeat(62));
    for r in reports {
        println!(
            "  {:<12}  {:<26}  {:>8}  {:>9.2}%",
            r.gate.to_string(),
            r.noise.to_string(),
            r.errors,
            r.error_rate * 100.0
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_gates() {
        let names: Vec<String> = ["h", "T", "rz:0.5"].iter().map(|s| (*s).to_string()).collect();
        assert_eq!(parse_gates(&names).unwrap(), vec![Gate::H, Gate::T, Gate::Rz(0.5)]);
        assert!(parse_gates(&["cx".to_string()]).is_err());
    }
}
