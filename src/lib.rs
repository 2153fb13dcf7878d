//! kernel-verify: operator verification and benchmarking harness.
//!
//! For every test case the harness:
//! - **Builds** an operation from an immutable parameter descriptor through a [`Backend`]
//! - **Verifies** its device output against an independent host reference
//!   under a [`ToleranceSpec`] (or structurally, for seeded operations)
//! - **Times** repeated executions with device synchronization around each iteration
//!
//! # Quick Start
//!
//! ```ignore
//! use kernel_verify::{HarnessConfig, OperationParameters, TestCase, TestDriver};
//!
//! let driver = TestDriver::from_config(HarnessConfig::default().with_env_overrides()?)?;
//! let case = TestCase::new("cumsum-2x16", OperationParameters::new("cumsum").with("axis", 1))
//!     .with_input_fn(|| kernel_verify::inputs::uniform("x", vec![2, 16], 7, -1.0, 1.0).map(|t| vec![t]));
//! let report = driver.run(&case)?;
//! ```

pub mod backend;
pub mod benchmark;
pub mod compare;
pub mod config;
pub mod cpu_backend;
pub mod driver;
pub mod error;
pub mod golden;
pub mod inputs;
pub mod loader;
pub mod operation;
pub mod ops;
pub mod params;
pub mod report;
pub mod stats;
pub mod tensor;
pub mod tolerance;
pub mod types;

pub use backend::{parse_device, select_backend, BackendSelection, BackendType};
pub use benchmark::{
    BenchPhase, BenchmarkAbort, BenchmarkConfig, BenchmarkResult, BenchmarkRunner, TimingSample, TimingSummary,
};
pub use compare::{compare, compare_all, Comparator, MismatchDetail, StructuralExpectation, TestVerdict};
pub use config::HarnessConfig;
pub use cpu_backend::{CpuBackend, CpuDevice, DeviceLease};
pub use driver::{CaseAbort, Stage, TestCase, TestDriver};
pub use error::{HarnessError, HarnessResult};
pub use golden::{CheckMode, GoldenEvaluator, GoldenOutput, GoldenRegistry};
pub use loader::{load_from_path, load_from_str, LoadedTensors};
pub use operation::{Backend, Determinism, Device, Operation};
pub use params::{OperationParameters, ParamValue};
pub use report::{AbortRecord, BenchmarkFailure, SuiteReport, TestReport};
pub use stats::{RunRecord, SessionSummary, StatisticsAggregator};
pub use tensor::{Tensor, TensorData};
pub use tolerance::{ToleranceMode, ToleranceSpec};
pub use types::{DType, Location};
