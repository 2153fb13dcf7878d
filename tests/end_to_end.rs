//! End-to-end runs of the harness on the CPU backend.
//!
//! Each test drives a full case (inputs, construction, reference, execution,
//! comparison, timing) through `TestDriver` and checks the resulting report.

use kernel_verify::inputs::{arange, probabilities, uniform};
use kernel_verify::ops::{CHUNK, CUMSUM, MULTINOMIAL};
use kernel_verify::{
    Backend, BenchmarkConfig, CheckMode, CpuBackend, DType, Determinism, HarnessConfig, HarnessError,
    OperationParameters, Stage, TestCase, TestDriver, Tensor, ToleranceSpec,
};

fn cpu_driver() -> TestDriver {
    TestDriver::new(Box::new(CpuBackend::default()), HarnessConfig::default())
}

// ═══════════════════════════════════════════════════════════════════════
// Scenarios
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn cumsum_2x16_passes_combined_tolerance() {
    let case = TestCase::new("cumsum-2x16", OperationParameters::new(CUMSUM).with("axis", 1))
        .with_input_fn(|| Ok(vec![uniform("x", vec![2, 16], 7, -1.0, 1.0)?]))
        .with_tolerance(ToleranceSpec::combined(1e-2, 1e-2).unwrap());

    let report = cpu_driver().run(&case).unwrap();
    assert!(report.verdict.passed, "{:?}", report.verdict.mismatch);
    assert_eq!(report.check_mode, CheckMode::Elementwise);
    assert_eq!(report.operation, "cumsum");
    assert_eq!(report.parameters, "cumsum(axis=1)");
    assert_eq!(report.timing.as_ref().unwrap().samples.len(), 20);
}

#[test]
fn seeded_multinomial_is_checked_structurally() {
    let params = OperationParameters::new(MULTINOMIAL)
        .with("num_samples", 1)
        .with("seed", 1234);
    let case = TestCase::new("multinomial-3x3", params)
        .with_input_fn(|| Ok(vec![probabilities("p", 3, 3, 5)?]))
        .without_benchmark();

    let report = cpu_driver().run(&case).unwrap();
    assert!(report.verdict.passed, "{:?}", report.verdict.mismatch);
    assert_eq!(report.check_mode, CheckMode::Structural);
    assert!(report.timing.is_none());
}

#[test]
fn oversized_sample_count_aborts_at_construction() {
    let params = OperationParameters::new(MULTINOMIAL)
        .with("num_samples", i64::MAX)
        .with("seed", 1234);
    let case = TestCase::new("multinomial-huge", params)
        .with_input_fn(|| Ok(vec![probabilities("p", 3, 3, 5)?]))
        .without_benchmark();

    let err = cpu_driver().run(&case).unwrap_err();
    assert_eq!(err.stage, Stage::BuildOperation);
    assert!(matches!(err.source, HarnessError::ParameterValidation { .. }));
    assert!(err.to_string().contains("num_samples"));
}

#[test]
fn benchmark_collects_measured_samples_only() {
    let config = HarnessConfig {
        benchmark: BenchmarkConfig { warmup_iterations: 5, measured_iterations: 20, percentiles: vec![50.0, 90.0] },
        ..HarnessConfig::default()
    };
    let backend = CpuBackend::default();
    let device = backend.cpu_device().clone();
    let driver = TestDriver::new(Box::new(backend), config);
    let case = TestCase::new("cumsum-timing", OperationParameters::new(CUMSUM).with("axis", 0))
        .with_inputs(vec![arange("x", vec![64, 8], DType::F32).unwrap()]);

    let report = driver.run(&case).unwrap();
    let timing = report.timing.unwrap();
    assert_eq!(timing.samples.len(), 20);
    for (i, s) in timing.samples.iter().enumerate() {
        assert_eq!(s.iteration_index, i);
    }
    assert_eq!(timing.summary.count, 20);
    assert!(timing.summary.min_ns >= 0.0);
    assert!(timing.summary.min_ns <= timing.summary.median_ns);
    assert!(timing.summary.median_ns <= timing.summary.max_ns);
    assert_eq!(timing.summary.percentiles.len(), 2);
    // one sync after the verified execution, two per benchmark iteration
    assert_eq!(device.sync_count(), 1 + 2 * 25);
    assert_eq!(device.live_operations(), 0);
}

// ═══════════════════════════════════════════════════════════════════════
// Properties
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn chunk_6x6_reassembles_exactly() {
    let case = TestCase::new("chunk-6x6", OperationParameters::new(CHUNK).with("chunks", 2).with("axis", 0))
        .with_inputs(vec![arange("x", vec![6, 6], DType::F32).unwrap()])
        .with_tolerance(ToleranceSpec::exact())
        .without_benchmark();
    let report = cpu_driver().run(&case).unwrap();
    assert!(report.verdict.passed, "{:?}", report.verdict.mismatch);
    assert_eq!(report.check_mode, CheckMode::Decomposition);

    // Same property straight on the backend output.
    let backend = CpuBackend::default();
    let dev = backend.device();
    let x = arange("x", vec![6, 6], DType::F32).unwrap();
    let mut op = backend
        .construct(&OperationParameters::new(CHUNK).with("chunks", 2).with("axis", 0))
        .unwrap();
    let parts: Vec<Tensor> = op
        .execute(&[dev.to_device(&x).unwrap()])
        .unwrap()
        .iter()
        .map(|p| dev.to_host(p).unwrap())
        .collect();
    assert_eq!(parts.len(), 2);
    assert!(parts.iter().all(|p| p.shape() == [3, 6]));
    assert_eq!(Tensor::concat("x", &parts, 0).unwrap(), x);
}

#[test]
fn deterministic_ops_repeat_bit_identically() {
    let backend = CpuBackend::default();
    let dev = backend.device();
    let x = dev.to_device(&uniform("x", vec![8, 33], 3, -4.0, 4.0).unwrap()).unwrap();
    let mut op = backend.construct(&OperationParameters::new(CUMSUM).with("axis", -1)).unwrap();
    assert_eq!(op.determinism(), Determinism::Deterministic);
    let first = op.execute(&[x.clone()]).unwrap();
    for _ in 0..5 {
        let again = op.execute(&[x.clone()]).unwrap();
        let (a, b) = (&first[0], &again[0]);
        assert!((0..a.numel()).all(|i| a.bits(i) == b.bits(i)));
    }
}

#[test]
fn seeded_op_reports_seed_and_repeats_on_this_backend() {
    let backend = CpuBackend::default();
    let dev = backend.device();
    let p = dev.to_device(&probabilities("p", 4, 6, 11).unwrap()).unwrap();
    let params = OperationParameters::new(MULTINOMIAL)
        .with("num_samples", 3)
        .with("seed", 99)
        .with("replacement", false);
    let mut op = backend.construct(&params).unwrap();
    assert_eq!(op.determinism(), Determinism::Seeded(99));
    let a = op.execute(&[p.clone()]).unwrap();
    let b = op.execute(&[p]).unwrap();
    assert_eq!(a, b);
    let samples = a[0].as_i64().unwrap();
    for row in samples.chunks(3) {
        let mut r = row.to_vec();
        r.sort_unstable();
        r.dedup();
        assert_eq!(r.len(), 3);
    }
}

#[test]
fn suite_report_serializes() {
    let cases = vec![
        TestCase::new("cumsum", OperationParameters::new(CUMSUM).with("axis", 0))
            .with_inputs(vec![arange("x", vec![4], DType::I64).unwrap()])
            .with_benchmark(BenchmarkConfig::fast()),
        TestCase::new("bad-chunk", OperationParameters::new(CHUNK).with("chunks", 0))
            .with_inputs(vec![arange("x", vec![4], DType::F32).unwrap()]),
    ];
    let suite = cpu_driver().run_suite(&cases);
    assert_eq!(suite.cases.len(), 1);
    assert_eq!(suite.aborts.len(), 1);
    assert!(!suite.all_passed());

    let stats = suite.statistics.as_ref().unwrap();
    assert_eq!(stats.runs, 1);
    assert_eq!(stats.phase("cumsum").unwrap().count, 5);

    let json = suite.to_json().unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["aborts"][0]["stage"], "build_operation");
    assert_eq!(value["cases"][0]["verdict"]["passed"], true);
    assert!(suite.summary_string().contains("bad-chunk"));
}
