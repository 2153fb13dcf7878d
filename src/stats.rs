//! Statistics aggregation across runs.
//!
//! A session collects phase measurements (one benchmark iteration, the
//! first-token latency of a generation run, ...) and summarises them once at
//! the end. After [`StatisticsAggregator::finalize`] the session is closed:
//! the summary is cached and further recording is rejected.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{HarnessError, HarnessResult};

pub const FIRST_TOKEN: &str = "first-token";
pub const PER_TOKEN: &str = "per-token";

/// One phase measurement inside a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseMeasurement {
    pub phase: String,
    pub duration: Duration,
    /// Work units covered (tokens, elements, iterations).
    pub units: u64,
}

/// One end-to-end run made of several phases.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    pub phases: Vec<PhaseMeasurement>,
}

impl RunRecord {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn phase(mut self, phase: impl Into<String>, duration: Duration, units: u64) -> Self {
        self.phases.push(PhaseMeasurement { phase: phase.into(), duration, units });
        self
    }

    /// A generation run: latency to the first token, then the time spent on
    /// the remaining `generated_tokens - 1` tokens.
    pub fn generation(first_token: Duration, decode_total: Duration, generated_tokens: u64) -> Self {
        let run = Self::new().phase(FIRST_TOKEN, first_token, generated_tokens.min(1));
        if generated_tokens > 1 {
            run.phase(PER_TOKEN, decode_total, generated_tokens - 1)
        } else {
            run
        }
    }
}

#[derive(Debug, Clone, Default)]
struct PhaseAccumulator {
    count: u64,
    total: Duration,
    min: Option<Duration>,
    max: Duration,
    units: u64,
}

impl PhaseAccumulator {
    fn add(&mut self, duration: Duration, units: u64) {
        self.count += 1;
        self.total += duration;
        self.min = Some(self.min.map_or(duration, |m| m.min(duration)));
        self.max = self.max.max(duration);
        self.units += units;
    }

    fn summary(&self, phase: &str) -> PhaseSummary {
        let secs = self.total.as_secs_f64();
        PhaseSummary {
            phase: phase.to_string(),
            count: self.count,
            total: self.total,
            mean: mean_duration(self.total, self.count),
            min: self.min.unwrap_or_default(),
            max: self.max,
            units: self.units,
            per_unit: (self.units > 0).then(|| mean_duration(self.total, self.units)),
            units_per_sec: if secs > 0.0 { self.units as f64 / secs } else { 0.0 },
        }
    }
}

/// `total / count` in whole nanoseconds; zero when `count` is zero.
fn mean_duration(total: Duration, count: u64) -> Duration {
    if count == 0 {
        return Duration::ZERO;
    }
    let nanos = total.as_nanos() / u128::from(count);
    Duration::new((nanos / 1_000_000_000) as u64, (nanos % 1_000_000_000) as u32)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseSummary {
    pub phase: String,
    pub count: u64,
    pub total: Duration,
    /// Mean duration per recorded measurement.
    pub mean: Duration,
    pub min: Duration,
    pub max: Duration,
    pub units: u64,
    /// Mean duration per unit, when any units were recorded.
    pub per_unit: Option<Duration>,
    pub units_per_sec: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session: String,
    pub runs: u64,
    pub phases: Vec<PhaseSummary>,
}

impl SessionSummary {
    pub fn phase(&self, name: &str) -> Option<&PhaseSummary> {
        self.phases.iter().find(|p| p.phase == name)
    }

    pub fn summary_string(&self) -> String {
        let mut s = String::with_capacity(1024);
        s.push_str(&format!("\n{:=<92}\n session {}  |  runs: {}\n{:=<92}\n", "", self.session, self.runs, ""));
        s.push_str(&format!(
            " {:<32} {:>6} {:>10} {:>10} {:>10} {:>10} {:>8}\n",
            "Phase", "Count", "Mean(us)", "Min(us)", "Max(us)", "Units/s", "Units"
        ));
        s.push_str(&format!("{:-<92}\n", ""));
        for p in &self.phases {
            s.push_str(&format!(
                " {:<32} {:>6} {:>10.1} {:>10.1} {:>10.1} {:>10.1} {:>8}\n",
                p.phase,
                p.count,
                p.mean.as_secs_f64() * 1e6,
                p.min.as_secs_f64() * 1e6,
                p.max.as_secs_f64() * 1e6,
                p.units_per_sec,
                p.units,
            ));
        }
        s.push_str(&format!("{:=<92}\n", ""));
        s
    }
}

pub struct StatisticsAggregator {
    session: String,
    phases: BTreeMap<String, PhaseAccumulator>,
    runs: u64,
    summary: Option<SessionSummary>,
}

impl StatisticsAggregator {
    pub fn new(session: impl Into<String>) -> Self {
        Self {
            session: session.into(),
            phases: BTreeMap::new(),
            runs: 0,
            summary: None,
        }
    }

    pub fn session(&self) -> &str {
        &self.session
    }

    pub fn runs(&self) -> u64 {
        self.runs
    }

    pub fn is_finalized(&self) -> bool {
        self.summary.is_some()
    }

    /// Accumulate one measurement of `phase`.
    pub fn record(&mut self, phase: &str, duration: Duration, units: u64) -> HarnessResult<()> {
        self.ensure_open()?;
        self.phases.entry(phase.to_string()).or_default().add(duration, units);
        Ok(())
    }

    /// Accumulate every phase of one run and count the run.
    pub fn record_run(&mut self, run: &RunRecord) -> HarnessResult<()> {
        self.ensure_open()?;
        for m in &run.phases {
            self.phases.entry(m.phase.clone()).or_default().add(m.duration, m.units);
        }
        self.runs += 1;
        Ok(())
    }

    /// Summarise the session. Calling again returns the same summary.
    pub fn finalize(&mut self) -> &SessionSummary {
        let Self { session, phases, runs, summary } = self;
        summary.get_or_insert_with(|| {
            log::debug!("finalizing statistics session {session} ({runs} runs)");
            SessionSummary {
                session: session.clone(),
                runs: *runs,
                phases: phases.iter().map(|(name, acc)| acc.summary(name)).collect(),
            }
        })
    }

    fn ensure_open(&self) -> HarnessResult<()> {
        if self.summary.is_some() {
            return Err(HarnessError::SessionFinalized(self.session.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn test_record_and_finalize() {
        let mut agg = StatisticsAggregator::new("s");
        agg.record("exec", ms(10), 1).unwrap();
        agg.record("exec", ms(30), 1).unwrap();
        let summary = agg.finalize();
        let exec = summary.phase("exec").unwrap();
        assert_eq!(exec.count, 2);
        assert_eq!(exec.total, ms(40));
        assert_eq!(exec.mean, ms(20));
        assert_eq!(exec.min, ms(10));
        assert_eq!(exec.max, ms(30));
        assert!((exec.units_per_sec - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_mean_past_u32_counts() {
        let count = 1u64 << 32;
        assert_eq!(mean_duration(Duration::from_secs(count), count), Duration::from_secs(1));
        assert_eq!(mean_duration(Duration::from_secs(3 * count), count + 1), Duration::new(2, 999_999_999));
        assert_eq!(mean_duration(ms(5), 0), Duration::ZERO);

        let acc = PhaseAccumulator {
            count,
            total: Duration::from_secs(2 * count),
            min: Some(ms(1)),
            max: Duration::from_secs(4),
            units: count,
        };
        let s = acc.summary("long");
        assert_eq!(s.mean, Duration::from_secs(2));
        assert_eq!(s.per_unit, Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_finalize_is_idempotent() {
        let mut agg = StatisticsAggregator::new("s");
        agg.record("a", ms(5), 1).unwrap();
        let first = agg.finalize().clone();
        let second = agg.finalize().clone();
        assert_eq!(first, second);
    }

    #[test]
    fn test_record_after_finalize_rejected() {
        let mut agg = StatisticsAggregator::new("closed");
        agg.finalize();
        assert!(matches!(agg.record("a", ms(1), 1), Err(HarnessError::SessionFinalized(_))));
        assert!(agg.record_run(&RunRecord::new()).is_err());
        assert_eq!(agg.runs(), 0);
    }

    #[test]
    fn test_generation_runs() {
        let mut agg = StatisticsAggregator::new("gen");
        for _ in 0..3 {
            agg.record_run(&RunRecord::generation(ms(100), ms(90), 10)).unwrap();
        }
        let s = agg.finalize();
        assert_eq!(s.runs, 3);
        let first = s.phase(FIRST_TOKEN).unwrap();
        assert_eq!(first.count, 3);
        assert_eq!(first.mean, ms(100));
        let per = s.phase(PER_TOKEN).unwrap();
        assert_eq!(per.units, 27);
        assert_eq!(per.per_unit, Some(ms(10)));
    }

    #[test]
    fn test_single_token_run_has_no_decode_phase() {
        let run = RunRecord::generation(ms(5), ms(0), 1);
        assert_eq!(run.phases.len(), 1);
        assert_eq!(run.phases[0].phase, FIRST_TOKEN);
    }

    #[test]
    fn test_summary_string_lists_phases() {
        let mut agg = StatisticsAggregator::new("table");
        agg.record("case-a", ms(1), 1).unwrap();
        let s = agg.finalize().summary_string();
        assert!(s.contains("session table"));
        assert!(s.contains("case-a"));
    }
}
