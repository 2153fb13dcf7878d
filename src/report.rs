//! Structured test and suite reports.
//!
//! Reports serialize to JSON through serde and render a fixed-width summary
//! table for terminal inspection.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::benchmark::{BenchPhase, BenchmarkAbort, BenchmarkResult};
use crate::compare::TestVerdict;
use crate::driver::{CaseAbort, Stage};
use crate::error::HarnessResult;
use crate::golden::CheckMode;
use crate::stats::SessionSummary;

/// Benchmark failure recorded next to an unaffected verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkFailure {
    pub phase: BenchPhase,
    pub iteration: usize,
    pub completed_samples: usize,
    pub reason: String,
}

impl From<&BenchmarkAbort> for BenchmarkFailure {
    fn from(abort: &BenchmarkAbort) -> Self {
        Self {
            phase: abort.phase,
            iteration: abort.iteration,
            completed_samples: abort.partial.len(),
            reason: abort.source.to_string(),
        }
    }
}

/// Outcome of one test case that ran to the report stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestReport {
    pub case: String,
    pub operation: String,
    pub parameters: String,
    pub backend: String,
    pub check_mode: CheckMode,
    pub verdict: TestVerdict,
    pub timing: Option<BenchmarkResult>,
    pub benchmark_failure: Option<BenchmarkFailure>,
}

impl TestReport {
    pub fn passed(&self) -> bool {
        self.verdict.passed
    }
}

/// A case that stopped before producing a verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbortRecord {
    pub case: String,
    pub stage: Stage,
    pub parameters: String,
    pub reason: String,
}

impl From<&CaseAbort> for AbortRecord {
    fn from(abort: &CaseAbort) -> Self {
        Self {
            case: abort.case.clone(),
            stage: abort.stage,
            parameters: abort.params.clone(),
            reason: abort.source.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuiteReport {
    pub backend: String,
    /// Seconds since the Unix epoch at report creation.
    pub timestamp: String,
    pub cases: Vec<TestReport>,
    pub aborts: Vec<AbortRecord>,
    pub statistics: Option<SessionSummary>,
}

impl SuiteReport {
    pub fn new(backend: impl Into<String>) -> Self {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default();
        Self {
            backend: backend.into(),
            timestamp: format!("{}", now.as_secs()),
            cases: Vec::new(),
            aborts: Vec::new(),
            statistics: None,
        }
    }

    pub fn passed_count(&self) -> usize {
        self.cases.iter().filter(|c| c.passed()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.cases.len() - self.passed_count()
    }

    /// Every case produced a passing verdict and none aborted.
    pub fn all_passed(&self) -> bool {
        self.aborts.is_empty() && self.failed_count() == 0
    }

    pub fn to_json(&self) -> HarnessResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> HarnessResult<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn summary_string(&self) -> String {
        let mut s = String::with_capacity(2048);
        s.push_str(&format!(
            "\n{:=<96}\n kernel-verify  |  backend: {}  |  passed {}/{}  |  aborted {}\n{:=<96}\n",
            "",
            self.backend,
            self.passed_count(),
            self.cases.len(),
            self.aborts.len(),
            ""
        ));
        s.push_str(&format!(
            " {:<28} {:<14} {:<6} {:>12} {:>12}  {}\n",
            "Case", "Mode", "Result", "Median(us)", "Mean(us)", "Detail"
        ));
        s.push_str(&format!("{:-<96}\n", ""));

        for c in &self.cases {
            let (median, mean) = c
                .timing
                .as_ref()
                .map(|t| {
                    (
                        format!("{:.1}", t.summary.median_ns / 1000.0),
                        format!("{:.1}", t.summary.mean_ns / 1000.0),
                    )
                })
                .unwrap_or_else(|| ("-".to_string(), "-".to_string()));
            let detail = match (&c.verdict.mismatch, &c.benchmark_failure) {
                (Some(m), _) => m.summary(),
                (None, Some(b)) => format!("benchmark failed: {}", b.reason),
                (None, None) => String::new(),
            };
            s.push_str(&format!(
                " {:<28} {:<14} {:<6} {:>12} {:>12}  {}\n",
                c.case,
                format!("{:?}", c.check_mode),
                if c.passed() { "PASS" } else { "FAIL" },
                median,
                mean,
                detail,
            ));
        }
        for a in &self.aborts {
            s.push_str(&format!(" {:<28} {:<14} {:<6} {:>12} {:>12}  {}: {}\n", a.case, "-", "ABORT", "-", "-", a.stage, a.reason));
        }
        s.push_str(&format!("{:=<96}\n", ""));
        s
    }
}
