//! Performance benchmark runner.
//!
//! Re-executes an already verified operation and records wall time per
//! iteration. Every iteration is bracketed by device synchronization so the
//! clock covers completed work only:
//!
//! ```text
//! sync -> start -> execute -> sync -> stop
//! ```
//!
//! Warm-up iterations run the same sequence but their durations are dropped.

use std::fmt;
use std::hint::black_box;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{HarnessError, HarnessResult};
use crate::operation::{Device, Operation};
use crate::tensor::Tensor;

/// Samples reserved up front; longer runs grow the buffer as they go.
const PREALLOCATED_SAMPLES: usize = 4096;

/// Iteration counts and reported percentiles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchmarkConfig {
    pub warmup_iterations: usize,
    pub measured_iterations: usize,
    /// Percentiles in `[0, 100]` added to the summary.
    pub percentiles: Vec<f64>,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        BenchmarkConfig {
            warmup_iterations: 5,
            measured_iterations: 20,
            percentiles: vec![50.0, 90.0, 99.0],
        }
    }
}

impl BenchmarkConfig {
    /// Quick smoke-level timing.
    pub fn fast() -> Self {
        BenchmarkConfig {
            warmup_iterations: 2,
            measured_iterations: 5,
            percentiles: vec![50.0],
        }
    }

    /// Longer runs for numbers that will be compared across builds.
    pub fn precise() -> Self {
        BenchmarkConfig {
            warmup_iterations: 10,
            measured_iterations: 100,
            percentiles: vec![50.0, 90.0, 95.0, 99.0],
        }
    }

    pub fn validate(&self) -> HarnessResult<()> {
        if self.measured_iterations == 0 {
            return Err(HarnessError::InvalidConfig(
                "measured_iterations must be >= 1".into(),
            ));
        }
        if let Some(p) = self.percentiles.iter().find(|p| !(0.0..=100.0).contains(*p)) {
            return Err(HarnessError::InvalidConfig(format!(
                "percentile {p} outside [0, 100]"
            )));
        }
        Ok(())
    }
}

/// Wall time of one measured iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingSample {
    /// Index among measured iterations; warm-up is not counted.
    pub iteration_index: usize,
    pub wall_time: Duration,
}

/// Statistics over measured samples, in nanoseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingSummary {
    pub count: usize,
    pub mean_ns: f64,
    pub min_ns: f64,
    pub max_ns: f64,
    pub median_ns: f64,
    pub stddev_ns: f64,
    /// Interquartile range.
    pub iqr_ns: f64,
    /// `(percentile, value_ns)` pairs in request order.
    pub percentiles: Vec<(f64, f64)>,
    pub iterations_per_sec: f64,
}

impl TimingSummary {
    pub fn from_samples(samples: &[TimingSample], percentiles: &[f64]) -> Self {
        let mut times: Vec<f64> = samples.iter().map(|s| s.wall_time.as_nanos() as f64).collect();
        compute_stats(&mut times, percentiles)
    }
}

impl fmt::Display for TimingSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "n={} mean={:.1}us median={:.1}us min={:.1}us max={:.1}us sd={:.1}us",
            self.count,
            self.mean_ns / 1000.0,
            self.median_ns / 1000.0,
            self.min_ns / 1000.0,
            self.max_ns / 1000.0,
            self.stddev_ns / 1000.0,
        )?;
        for (p, v) in &self.percentiles {
            write!(f, " p{p}={:.1}us", v / 1000.0)?;
        }
        write!(f, " {:.1} it/s", self.iterations_per_sec)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkResult {
    pub samples: Vec<TimingSample>,
    pub summary: TimingSummary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BenchPhase {
    Warmup,
    Measured,
}

impl fmt::Display for BenchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BenchPhase::Warmup => f.write_str("warm-up"),
            BenchPhase::Measured => f.write_str("measured"),
        }
    }
}

/// A benchmark stopped early. Samples already measured are kept.
#[derive(Debug, Error)]
#[error("benchmark aborted in {phase} iteration {iteration}: {source}")]
pub struct BenchmarkAbort {
    pub phase: BenchPhase,
    pub iteration: usize,
    pub partial: Vec<TimingSample>,
    #[source]
    pub source: HarnessError,
}

pub struct BenchmarkRunner {
    device: Arc<dyn Device>,
    config: BenchmarkConfig,
}

impl BenchmarkRunner {
    pub fn new(device: Arc<dyn Device>, config: BenchmarkConfig) -> Self {
        Self { device, config }
    }

    pub fn config(&self) -> &BenchmarkConfig {
        &self.config
    }

    /// Time `op` on device-resident `inputs`.
    pub fn run(&self, op: &mut dyn Operation, inputs: &[Tensor]) -> Result<BenchmarkResult, BenchmarkAbort> {
        if let Err(source) = self.config.validate() {
            return Err(BenchmarkAbort { phase: BenchPhase::Warmup, iteration: 0, partial: Vec::new(), source });
        }
        let mut samples = Vec::with_capacity(self.config.measured_iterations.min(PREALLOCATED_SAMPLES));

        for i in 0..self.config.warmup_iterations {
            if let Err(source) = self.timed(op, inputs) {
                return Err(BenchmarkAbort { phase: BenchPhase::Warmup, iteration: i, partial: samples, source });
            }
        }

        for i in 0..self.config.measured_iterations {
            match self.timed(op, inputs) {
                Ok(wall_time) => samples.push(TimingSample { iteration_index: i, wall_time }),
                Err(source) => {
                    return Err(BenchmarkAbort { phase: BenchPhase::Measured, iteration: i, partial: samples, source })
                }
            }
        }

        let summary = TimingSummary::from_samples(&samples, &self.config.percentiles);
        log::debug!("benchmark {}: {}", op.parameters(), summary);
        Ok(BenchmarkResult { samples, summary })
    }

    fn timed(&self, op: &mut dyn Operation, inputs: &[Tensor]) -> HarnessResult<Duration> {
        self.device.synchronize()?;
        let start = Instant::now();
        let outputs = op.execute(inputs)?;
        self.device.synchronize()?;
        let elapsed = start.elapsed();
        black_box(outputs);
        Ok(elapsed)
    }
}

// ── Statistical analysis ────────────────────────────────────────────────

fn compute_stats(times: &mut [f64], percentiles: &[f64]) -> TimingSummary {
    let n = times.len();
    if n == 0 {
        return TimingSummary {
            count: 0,
            mean_ns: 0.0,
            min_ns: 0.0,
            max_ns: 0.0,
            median_ns: 0.0,
            stddev_ns: 0.0,
            iqr_ns: 0.0,
            percentiles: percentiles.iter().map(|&p| (p, 0.0)).collect(),
            iterations_per_sec: 0.0,
        };
    }

    times.sort_by(|a, b| a.total_cmp(b));
    let total: f64 = times.iter().sum();
    let mean = total / n as f64;
    let var = times.iter().map(|t| (t - mean).powi(2)).sum::<f64>() / n as f64;

    TimingSummary {
        count: n,
        mean_ns: mean,
        min_ns: times[0],
        max_ns: times[n - 1],
        median_ns: percentile(times, 50.0),
        stddev_ns: var.sqrt(),
        iqr_ns: percentile(times, 75.0) - percentile(times, 25.0),
        percentiles: percentiles.iter().map(|&p| (p, percentile(times, p))).collect(),
        iterations_per_sec: if total > 0.0 { n as f64 * 1e9 / total } else { 0.0 },
    }
}

/// Linear-interpolated percentile of sorted, non-empty `sorted`.
fn percentile(sorted: &[f64], p: f64) -> f64 {
    let rank = (p / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}
