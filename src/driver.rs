//! Test case driver.
//!
//! Runs one case through a fixed sequence of stages:
//!
//! ```text
//! BuildInputs -> BuildOperation -> ComputeGolden -> ExecuteActual
//!             -> Compare -> Benchmark -> Report
//! ```
//!
//! Failures before `Compare` abort the case with a [`CaseAbort`] naming the
//! stage and the parameters. A mismatch at `Compare` is a verdict, not an
//! abort: the case still goes on to benchmarking unless the configuration
//! says otherwise. A benchmark failure is recorded next to the verdict and
//! never changes it.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backend::select_backend;
use crate::benchmark::{BenchmarkConfig, BenchmarkRunner};
use crate::compare::{Comparator, TestVerdict};
use crate::config::HarnessConfig;
use crate::error::{HarnessError, HarnessResult};
use crate::golden::{GoldenOutput, GoldenRegistry};
use crate::operation::{Backend, Device};
use crate::params::OperationParameters;
use crate::report::{AbortRecord, BenchmarkFailure, SuiteReport, TestReport};
use crate::stats::{RunRecord, StatisticsAggregator};
use crate::tensor::Tensor;
use crate::tolerance::ToleranceSpec;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    BuildInputs,
    BuildOperation,
    ComputeGolden,
    ExecuteActual,
    Compare,
    Benchmark,
    Report,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::BuildInputs => "build-inputs",
            Stage::BuildOperation => "build-operation",
            Stage::ComputeGolden => "compute-golden",
            Stage::ExecuteActual => "execute-actual",
            Stage::Compare => "compare",
            Stage::Benchmark => "benchmark",
            Stage::Report => "report",
        };
        f.write_str(s)
    }
}

/// A case stopped before it could produce a verdict.
#[derive(Debug, Error)]
#[error("case {case} aborted at {stage} for {params}: {source}")]
pub struct CaseAbort {
    pub case: String,
    pub stage: Stage,
    pub params: String,
    #[source]
    pub source: HarnessError,
}

pub type InputFn = Box<dyn Fn() -> HarnessResult<Vec<Tensor>>>;

/// Where a case's host inputs come from.
pub enum InputSource {
    Tensors(Vec<Tensor>),
    Generator(InputFn),
}

impl InputSource {
    fn build(&self) -> HarnessResult<Vec<Tensor>> {
        match self {
            InputSource::Tensors(t) => Ok(t.clone()),
            InputSource::Generator(f) => f(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum BenchmarkPlan {
    FromConfig,
    Custom(BenchmarkConfig),
    Skip,
}

/// One operation invocation to verify and time.
pub struct TestCase {
    name: String,
    params: OperationParameters,
    inputs: InputSource,
    tolerance: Option<ToleranceSpec>,
    benchmark: BenchmarkPlan,
}

impl TestCase {
    pub fn new(name: impl Into<String>, params: OperationParameters) -> Self {
        Self {
            name: name.into(),
            params,
            inputs: InputSource::Tensors(Vec::new()),
            tolerance: None,
            benchmark: BenchmarkPlan::FromConfig,
        }
    }

    #[must_use]
    pub fn with_inputs(mut self, inputs: Vec<Tensor>) -> Self {
        self.inputs = InputSource::Tensors(inputs);
        self
    }

    /// Build inputs lazily when the case runs.
    #[must_use]
    pub fn with_input_fn(mut self, f: impl Fn() -> HarnessResult<Vec<Tensor>> + 'static) -> Self {
        self.inputs = InputSource::Generator(Box::new(f));
        self
    }

    #[must_use]
    pub fn with_tolerance(mut self, tolerance: ToleranceSpec) -> Self {
        self.tolerance = Some(tolerance);
        self
    }

    #[must_use]
    pub fn with_benchmark(mut self, config: BenchmarkConfig) -> Self {
        self.benchmark = BenchmarkPlan::Custom(config);
        self
    }

    #[must_use]
    pub fn without_benchmark(mut self) -> Self {
        self.benchmark = BenchmarkPlan::Skip;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &OperationParameters {
        &self.params
    }
}

pub struct TestDriver {
    backend: Box<dyn Backend>,
    registry: GoldenRegistry,
    config: HarnessConfig,
}

impl TestDriver {
    /// Driver over `backend` with the built-in reference registry.
    pub fn new(backend: Box<dyn Backend>, config: HarnessConfig) -> Self {
        Self { backend, registry: GoldenRegistry::with_builtin(), config }
    }

    /// Driver over the backend named by `config.backend`.
    pub fn from_config(config: HarnessConfig) -> HarnessResult<Self> {
        config.validate()?;
        let backend = select_backend(config.backend)?;
        Ok(Self::new(backend, config))
    }

    #[must_use]
    pub fn with_registry(mut self, registry: GoldenRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    /// Run one case to a report, or abort at the failing stage.
    pub fn run(&self, case: &TestCase) -> Result<TestReport, CaseAbort> {
        let params = &case.params;
        let abort = |stage: Stage, source: HarnessError| {
            let a = CaseAbort { case: case.name.clone(), stage, params: params.to_string(), source };
            log::error!("{a}");
            a
        };
        let enter = |stage: Stage| log::debug!("[{}] -> {stage}", case.name);
        log::info!("case {} started: {} on {}", case.name, params, self.backend.backend_type());

        enter(Stage::BuildInputs);
        let device = self.backend.device();
        let host_inputs = case
            .inputs
            .build()
            .and_then(|inputs| to_host_all(device.as_ref(), &inputs))
            .map_err(|e| abort(Stage::BuildInputs, e))?;
        for t in &host_inputs {
            log::debug!("[{}] input {}", case.name, t.preview(self.config.log_values));
        }

        enter(Stage::BuildOperation);
        let mut op = self.backend.construct(params).map_err(|e| abort(Stage::BuildOperation, e))?;

        enter(Stage::ComputeGolden);
        let golden = self
            .registry
            .evaluate(params, &host_inputs)
            .map_err(|e| abort(Stage::ComputeGolden, e))?;
        for t in golden.tensors() {
            log::debug!("[{}] golden {}", case.name, t.preview(self.config.log_values));
        }

        enter(Stage::ExecuteActual);
        let device_inputs: Vec<Tensor> = host_inputs
            .iter()
            .map(|t| device.to_device(t))
            .collect::<HarnessResult<_>>()
            .map_err(|e| abort(Stage::ExecuteActual, e))?;
        let actual = op
            .execute(&device_inputs)
            .and_then(|outputs| {
                device.synchronize()?;
                to_host_all(device.as_ref(), &outputs)
            })
            .map_err(|e| abort(Stage::ExecuteActual, e))?;
        for t in &actual {
            log::debug!("[{}] actual {}", case.name, t.preview(self.config.log_values));
        }

        enter(Stage::Compare);
        let tolerance = case.tolerance.unwrap_or(self.config.tolerance);
        let verdict = self.compare(&actual, &golden, &tolerance);
        if let Some(m) = &verdict.mismatch {
            log::warn!("[{}] mismatch under {}: {}", case.name, tolerance, m.summary());
        }

        enter(Stage::Benchmark);
        let bench_config = match &case.benchmark {
            BenchmarkPlan::Skip => None,
            _ if !verdict.passed && self.config.skip_benchmark_on_failure => {
                log::debug!("[{}] benchmark skipped after failed verdict", case.name);
                None
            }
            BenchmarkPlan::Custom(c) => Some(c.clone()),
            BenchmarkPlan::FromConfig => Some(self.config.benchmark.clone()),
        };
        let (timing, benchmark_failure) = match bench_config {
            None => (None, None),
            Some(config) => match BenchmarkRunner::new(Arc::clone(&device), config).run(op.as_mut(), &device_inputs) {
                Ok(result) => (Some(result), None),
                Err(err) => {
                    log::warn!("[{}] {err}", case.name);
                    (None, Some(BenchmarkFailure::from(&err)))
                }
            },
        };

        enter(Stage::Report);
        let report = TestReport {
            case: case.name.clone(),
            operation: op.kind().to_string(),
            parameters: params.to_string(),
            backend: self.backend.backend_type().name().to_string(),
            check_mode: golden.check_mode(),
            verdict,
            timing,
            benchmark_failure,
        };
        log::info!(
            "case {} {}{}",
            case.name,
            if report.passed() { "PASSED" } else { "FAILED" },
            report.timing.as_ref().map(|t| format!(" ({})", t.summary)).unwrap_or_default()
        );
        Ok(report)
    }

    /// Run cases one after another. Each case's operation is released before
    /// the next case starts.
    pub fn run_suite(&self, cases: &[TestCase]) -> SuiteReport {
        let mut suite = SuiteReport::new(self.backend.backend_type().name());
        let mut stats = StatisticsAggregator::new(format!("suite@{}", suite.timestamp));
        for case in cases {
            match self.run(case) {
                Ok(report) => {
                    if let Some(timing) = &report.timing {
                        let run = timing
                            .samples
                            .iter()
                            .fold(RunRecord::new(), |run, s| run.phase(case.name(), s.wall_time, 1));
                        if let Err(e) = stats.record_run(&run) {
                            log::warn!("statistics not recorded for {}: {e}", case.name());
                        }
                    }
                    suite.cases.push(report);
                }
                Err(abort) => suite.aborts.push(AbortRecord::from(&abort)),
            }
        }
        suite.statistics = Some(stats.finalize().clone());
        log::info!(
            "suite finished: {} passed, {} failed, {} aborted",
            suite.passed_count(),
            suite.failed_count(),
            suite.aborts.len()
        );
        suite
    }

    fn compare(&self, actual: &[Tensor], golden: &GoldenOutput, tolerance: &ToleranceSpec) -> TestVerdict {
        let comparator = Comparator::new(self.config.max_reported_mismatches);
        match golden {
            GoldenOutput::Elementwise(expected) => comparator.compare_all(actual, expected, tolerance),
            GoldenOutput::Decomposition { parts, source, axis } => {
                comparator.compare_decomposition(actual, parts, source, *axis, tolerance)
            }
            GoldenOutput::Structural(expectations) => comparator.check_structure(actual, expectations),
        }
    }
}

fn to_host_all(device: &dyn Device, tensors: &[Tensor]) -> HarnessResult<Vec<Tensor>> {
    tensors
        .iter()
        .map(|t| if t.is_device() { device.to_host(t) } else { Ok(t.clone()) })
        .collect()
}
