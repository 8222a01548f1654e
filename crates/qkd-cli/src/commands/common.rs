//! Shared helpers for CLI commands.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use console::style;
use serde::Serialize;

use qkd_protocol::{QkdError, QkdResult, ResultsSink, RunConfig, RunReport, Variant};
use qkd_sim::{BellState, Bit, NoiseModel};

/// How results are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
    Yaml,
}

/// Run configuration flags shared by `run` and `batch`.
///
/// Flags override the YAML file and `QKD_*` environment variables.
#[derive(Debug, Clone, Default, Args)]
pub struct ConfigArgs {
    /// YAML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Protocol variant (bb84, b92, e91)
    #[arg(long)]
    pub variant: Option<Variant>,

    /// Number of transmitted qubits
    #[arg(short = 'n', long = "num-rounds")]
    pub num_rounds: Option<usize>,

    /// Random seed
    #[arg(long)]
    pub seed: Option<u64>,

    /// Fraction of the sifted key revealed for error estimation
    #[arg(long)]
    pub sample_fraction: Option<f64>,

    /// Minimum error-estimation sample size
    #[arg(long)]
    pub min_sample: Option<usize>,

    /// Error rate above which interception is flagged
    #[arg(long)]
    pub threshold: Option<f64>,

    /// Repetition code block size
    #[arg(long)]
    pub repetition: Option<usize>,

    /// Skip repetition-code error correction
    #[arg(long)]
    pub no_correction: bool,

    /// Insert an intercept-resend eavesdropper
    #[arg(long)]
    pub eve: bool,

    /// Probability that the eavesdropper intercepts a qubit
    #[arg(long)]
    pub eve_probability: Option<f64>,

    /// Channel noise (none, bit_flip, phase_flip, depolarizing)
    #[arg(long)]
    pub noise: Option<String>,

    /// Noise error probability
    #[arg(long, default_value = "0.05")]
    pub noise_p: f64,

    /// Probability that a qubit is lost in transit
    #[arg(long)]
    pub loss: Option<f64>,

    /// Receive timeout per qubit in milliseconds
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Bell state for E91 (phi_plus, psi_minus)
    #[arg(long)]
    pub bell_state: Option<String>,
}

impl ConfigArgs {
    /// Resolve the run configuration: defaults, file, environment, flags.
    ///
    /// Validation is left to the engine.
    pub fn resolve(&self) -> Result<RunConfig> {
        let mut config = RunConfig::load(self.config.as_deref())?;

        if let Some(v) = self.variant {
            config.variant = v;
        }
        if let Some(n) = self.num_rounds {
            config.num_rounds = n;
        }
        if let Some(s) = self.seed {
            config.seed = s;
        }
        if let Some(f) = self.sample_fraction {
            config.sample_fraction = f;
        }
        if let Some(m) = self.min_sample {
            config.min_sample_size = m;
        }
        if let Some(t) = self.threshold {
            config.detection_threshold = t;
        }
        if let Some(r) = self.repetition {
            config.repetition_factor = r;
        }
        if self.no_correction {
            config.error_correction = false;
        }
        if self.eve {
            config.eve_enabled = true;
        }
        if let Some(p) = self.eve_probability {
            config.eve_intercept_probability = p;
        }
        if let Some(name) = &self.noise {
            config.noise = parse_noise(name, self.noise_p)?;
        }
        if let Some(l) = self.loss {
            config.loss_probability = l;
        }
        if let Some(ms) = self.timeout_ms {
            config.receive_timeout_ms = ms;
        }
        if let Some(b) = &self.bell_state {
            config.bell_state = parse_bell_state(b)?;
        }
        Ok(config)
    }
}

/// Parse a noise channel name with its error probability.
pub fn parse_noise(name: &str, p: f64) -> Result<NoiseModel> {
    match name.to_lowercase().replace('-', "_").as_str() {
        "none" => Ok(NoiseModel::None),
        "bit_flip" | "x" => Ok(NoiseModel::BitFlip { p }),
        "phase_flip" | "z" => Ok(NoiseModel::PhaseFlip { p }),
        "depolarizing" | "depolarising" => Ok(NoiseModel::Depolarizing { p }),
        other => anyhow::bail!(
            "Unknown noise model: '{other}'. Available: none, bit_flip, phase_flip, depolarizing"
        ),
    }
}

/// Parse a Bell state name.
pub fn parse_bell_state(name: &str) -> Result<BellState> {
    match name.to_lowercase().replace('-', "_").as_str() {
        "phi_plus" | "phi+" => Ok(BellState::PhiPlus),
        "psi_minus" | "psi-" | "psi_" => Ok(BellState::PsiMinus),
        other => anyhow::bail!("Unknown Bell state: '{other}'. Available: phi_plus, psi_minus"),
    }
}

/// Open `path` for writing, or stdout.
pub fn open_output(path: Option<&str>) -> Result<Box<dyn Write>> {
    match path {
        Some(p) => {
            let file = File::create(p).with_context(|| format!("Failed to create file: {p}"))?;
            Ok(Box::new(BufWriter::new(file)))
        }
        None => Ok(Box::new(io::stdout())),
    }
}

/// Write `value` as JSON or YAML.
pub fn write_structured<T: Serialize>(
    out: &mut dyn Write,
    format: OutputFormat,
    value: &T,
) -> QkdResult<()> {
    match format {
        OutputFormat::Yaml => {
            let text = serde_yaml_ng::to_string(value).map_err(io::Error::other)?;
            out.write_all(text.as_bytes())?;
        }
        OutputFormat::Json | OutputFormat::Table => {
            serde_json::to_writer_pretty(&mut *out, value).map_err(io::Error::from)?;
            writeln!(out)?;
        }
    }
    Ok(())
}

/// Render bits as a `0`/`1` string, cut after `max` characters.
pub fn bit_string(bits: &[Bit], max: usize) -> String {
    let mut s: String = bits.iter().take(max).map(|b| if b.is_one() { '1' } else { '0' }).collect();
    if bits.len() > max {
        s.push('…');
    }
    s
}

/// Sink that prints a human-readable summary per run.
pub struct ConsoleSink {
    out: Box<dyn Write>,
    show_rounds: bool,
}

impl ConsoleSink {
    pub fn new(out: Box<dyn Write>, show_rounds: bool) -> Self {
        Self { out, show_rounds }
    }

    fn write_report(&mut self, report: &RunReport) -> io::Result<()> {
        let config = &report.config;
        let diag = &report.diagnostics;
        let out = &mut self.out;

        writeln!(
            out,
            "\n{} {} ({} rounds, seed {})",
            style("→").cyan().bold(),
            style(config.variant).green().bold(),
            config.num_rounds,
            config.seed
        )?;
        if config.eve_enabled {
            writeln!(
                out,
                "  Eavesdropper: intercept-resend, p = {:.2}",
                config.eve_intercept_probability
            )?;
        }
        writeln!(out, "  Noise:        {}", config.noise)?;

        if self.show_rounds {
            writeln!(out, "\n  {}", style("Rounds").bold())?;
            for round in &report.rounds {
                writeln!(out, "    {round}")?;
            }
            writeln!(out)?;
        }

        writeln!(
            out,
            "  Delivered:    {} / {} ({} dropped, {} intercepted, {} noisy)",
            diag.completed_rounds,
            config.num_rounds,
            diag.dropped_rounds.len(),
            diag.intercepted_rounds,
            diag.noise_events
        )?;
        for warning in &diag.warnings {
            writeln!(out, "  {} {warning}", style("warning:").yellow().bold())?;
        }

        let Some(key) = report.key() else {
            if let Some(failure) = report.failure() {
                writeln!(
                    out,
                    "  {} {} during {}: {}",
                    style("✗").red().bold(),
                    failure.kind,
                    failure.phase,
                    failure.message
                )?;
            }
            return Ok(());
        };

        let summary = report.summary();
        writeln!(
            out,
            "  Sifted:       {} bits ({:.1}%)",
            key.sifted.len(),
            summary.sifted_fraction() * 100.0
        )?;
        let se = key
            .estimate
            .standard_error()
            .map(|se| format!(" ± {:.2}%", se * 100.0))
            .unwrap_or_default();
        writeln!(
            out,
            "  Error rate:   {:.2}%{se} ({}/{} sampled bits)",
            key.estimate.rate * 100.0,
            key.estimate.mismatches,
            key.estimate.sample_size
        )?;

        let verdict = if key.eavesdropping_detected {
            style("eavesdropping detected".to_string()).red().bold()
        } else {
            style("no eavesdropping detected".to_string()).green()
        };
        writeln!(
            out,
            "  Verdict:      {verdict} (threshold {:.1}%)",
            key.detection_threshold * 100.0
        )?;

        writeln!(
            out,
            "  Final key:    {} bits  {}",
            key.final_key.len(),
            style(bit_string(&key.final_key.sender, 64)).cyan()
        )?;
        if let Some(corrected) = &key.corrected {
            writeln!(
                out,
                "  Corrected:    {} bits (repetition {}), {} residual mismatches",
                corrected.len(),
                corrected.repetition_factor,
                corrected.residual_mismatches
            )?;
        }
        Ok(())
    }
}

impl ResultsSink for ConsoleSink {
    fn record(&mut self, report: &RunReport) -> QkdResult<()> {
        self.write_report(report).map_err(QkdError::from)
    }

    fn finish(&mut self) -> QkdResult<()> {
        self.out.flush()?;
        Ok(())
    }
}

/// Sink that writes each report as JSON or YAML.
pub struct StructuredSink {
    out: Box<dyn Write>,
    format: OutputFormat,
}

impl StructuredSink {
    pub fn new(out: Box<dyn Write>, format: OutputFormat) -> Self {
        Self { out, format }
    }
}

impl ResultsSink for StructuredSink {
    fn record(&mut self, report: &RunReport) -> QkdResult<()> {
        write_structured(self.out.as_mut(), self.format, report)
    }

    fn finish(&mut self) -> QkdResult<()> {
        self.out.flush()?;
        Ok(())
    }
}

/// Sink for `format`, writing to `out`.
pub fn sink_for(format: OutputFormat, out: Box<dyn Write>, show_rounds: bool) -> Box<dyn ResultsSink> {
    match format {
        OutputFormat::Table => Box::new(ConsoleSink::new(out, show_rounds)),
        OutputFormat::Json | OutputFormat::Yaml => Box::new(StructuredSink::new(out, format)),
    }
}
