//! Batch runs over several round counts.
//!
//! Every run is independent: runs are spawned onto the runtime and
//! collected as they finish, then ordered by `(num_rounds, repeat)`.

use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::config::{RunConfig, Variant};
use crate::engine::ProtocolEngine;
use crate::error::{QkdError, QkdResult};
use crate::report::{RunSummary, ratio};

/// One finished run of a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRun {
    /// Rounds configured for this run.
    pub num_rounds: usize,
    /// Repeat index within its round count.
    pub repeat: usize,
    /// Seed the run used.
    pub seed: u64,
    /// Headline numbers.
    pub summary: RunSummary,
}

/// Averages over the repeats of one round count.
///
/// Means are taken over completed runs only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountAggregate {
    pub num_rounds: usize,
    pub runs: usize,
    pub failed_runs: usize,
    pub mean_sifted_fraction: f64,
    pub mean_error_rate: f64,
    pub mean_final_key_fraction: f64,
    /// Fraction of completed runs that flagged eavesdropping.
    pub detection_rate: f64,
}

/// Results of [`run_batch`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub variant: Variant,
    pub repeats: usize,
    /// Every run, ordered by round count then repeat.
    pub runs: Vec<BatchRun>,
    /// One entry per round count, in the order given.
    pub aggregates: Vec<CountAggregate>,
}

/// Run `repeats` runs of `base` for every entry of `counts`.
pub async fn run_batch(base: &RunConfig, counts: &[usize], repeats: usize) -> QkdResult<BatchReport> {
    run_batch_with(base, counts, repeats, |_| {}).await
}

/// Like [`run_batch`], calling `on_run` as each run finishes.
///
/// Run `i` (counting over all counts and repeats) uses seed
/// `base.seed + i`, so a batch is reproducible regardless of completion
/// order. Every configuration is validated before anything is spawned.
#[instrument(skip_all, fields(variant = %base.variant, counts = counts.len(), repeats))]
pub async fn run_batch_with<F>(
    base: &RunConfig,
    counts: &[usize],
    repeats: usize,
    mut on_run: F,
) -> QkdResult<BatchReport>
where
    F: FnMut(&BatchRun),
{
    if repeats == 0 {
        return Err(QkdError::Configuration(
            "repeats must be greater than 0".to_string(),
        ));
    }

    let mut engines = Vec::with_capacity(counts.len() * repeats);
    for (slot, (&num_rounds, repeat)) in counts
        .iter()
        .flat_map(|n| (0..repeats).map(move |r| (n, r)))
        .enumerate()
    {
        let config = RunConfig {
            num_rounds,
            seed: base.seed.wrapping_add(slot as u64),
            ..base.clone()
        };
        engines.push((slot, num_rounds, repeat, ProtocolEngine::new(config)?));
    }

    info!(runs = engines.len(), "starting batch");

    let mut pending: FuturesUnordered<_> = engines
        .into_iter()
        .map(|(slot, num_rounds, repeat, engine)| {
            let handle = tokio::spawn(engine.run());
            async move { (slot, num_rounds, repeat, handle.await) }
        })
        .collect();

    let mut finished = Vec::new();
    while let Some((slot, num_rounds, repeat, joined)) = pending.next().await {
        let report = joined.map_err(|e| QkdError::TaskFailed(e.to_string()))?;
        let run = BatchRun {
            num_rounds,
            repeat,
            seed: report.config.seed,
            summary: report.summary(),
        };
        debug!(num_rounds, repeat, "batch run finished");
        on_run(&run);
        finished.push((slot, run));
    }
    finished.sort_by_key(|(slot, _)| *slot);
    let runs: Vec<BatchRun> = finished.into_iter().map(|(_, run)| run).collect();

    let aggregates = counts
        .iter()
        .enumerate()
        .map(|(i, &num_rounds)| aggregate(num_rounds, &runs[i * repeats..(i + 1) * repeats]))
        .collect();

    Ok(BatchReport {
        variant: base.variant,
        repeats,
        runs,
        aggregates,
    })
}

fn aggregate(num_rounds: usize, runs: &[BatchRun]) -> CountAggregate {
    let completed: Vec<&RunSummary> = runs
        .iter()
        .map(|r| &r.summary)
        .filter(|s| s.failure.is_none())
        .collect();
    let n = completed.len();
    let mean = |f: fn(&RunSummary) -> f64| {
        if n == 0 {
            0.0
        } else {
            completed.iter().map(|s| f(s)).sum::<f64>() / n as f64
        }
    };
    CountAggregate {
        num_rounds,
        runs: runs.len(),
        failed_runs: runs.len() - n,
        mean_sifted_fraction: mean(RunSummary::sifted_fraction),
        mean_error_rate: mean(|s| s.error_rate),
        mean_final_key_fraction: mean(RunSummary::final_key_fraction),
        detection_rate: ratio(
            completed.iter().filter(|s| s.eavesdropping_detected).count(),
            n,
        ),
    }
}
