//! CPU backend vs. reference comparison across dtypes and layouts.
//!
//! Tolerances follow the per-precision presets:
//! - FP32: rtol=1e-5, atol=1e-6 (widened here for long accumulations)
//! - FP16: rtol=1e-3, atol=1e-4
//! - BF16: rtol=1e-2, atol=1e-3
//! - integers: exact

use kernel_verify::inputs::{lcg_values, probabilities};
use kernel_verify::ops::{CHUNK, CUMSUM, MULTINOMIAL};
use kernel_verify::{
    CpuBackend, DType, HarnessConfig, OperationParameters, TestCase, TestDriver, TestReport, Tensor,
    ToleranceSpec,
};

fn run(name: &str, params: OperationParameters, input: Tensor, tol: ToleranceSpec) -> TestReport {
    let driver = TestDriver::new(Box::new(CpuBackend::default()), HarnessConfig::default());
    let case = TestCase::new(name, params)
        .with_inputs(vec![input])
        .with_tolerance(tol)
        .without_benchmark();
    driver.run(&case).unwrap()
}

fn test_tensor(shape: Vec<usize>, dtype: DType, seed: u64) -> Tensor {
    let n: usize = shape.iter().product();
    let values: Vec<f64> = lcg_values(n, seed).iter().map(|&v| v as f64).collect();
    Tensor::from_f64_values("x", shape, dtype, &values).unwrap()
}

fn int_tensor(shape: Vec<usize>, dtype: DType) -> Tensor {
    let n: usize = shape.iter().product();
    let values: Vec<f64> = (0..n).map(|i| ((i * 37) % 101) as f64 - 50.0).collect();
    Tensor::from_f64_values("x", shape, dtype, &values).unwrap()
}

// ═══════════════════════════════════════════════════════════════════════
// cumsum
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_cumsum_f32_shapes_and_axes() {
    let tol = ToleranceSpec::combined(1e-4, 1e-4).unwrap();
    for (shape, axis) in [
        (vec![64], 0i64),
        (vec![2, 16], 1),
        (vec![2, 16], 0),
        (vec![3, 5, 7], 1),
        (vec![3, 5, 7], -1),
        (vec![4, 1, 9], 1),
    ] {
        let report = run(
            "cumsum-f32",
            OperationParameters::new(CUMSUM).with("axis", axis),
            test_tensor(shape.clone(), DType::F32, 42),
            tol,
        );
        assert!(report.verdict.passed, "{shape:?} axis {axis}: {:?}", report.verdict.mismatch);
    }
}

#[test]
fn test_cumsum_half_precision_presets() {
    for dtype in [DType::F16, DType::BF16, DType::F64] {
        let report = run(
            "cumsum-half",
            OperationParameters::new(CUMSUM).with("axis", 1),
            test_tensor(vec![4, 24], dtype, 7),
            ToleranceSpec::for_dtype(dtype),
        );
        assert!(report.verdict.passed, "{dtype}: {:?}", report.verdict.mismatch);
    }
}

#[test]
fn test_cumsum_integers_exact() {
    for dtype in [DType::I32, DType::I64] {
        let report = run(
            "cumsum-int",
            OperationParameters::new(CUMSUM).with("axis", 0),
            int_tensor(vec![10, 3], dtype),
            ToleranceSpec::exact(),
        );
        assert!(report.verdict.passed, "{dtype}: {:?}", report.verdict.mismatch);
    }
}

// ═══════════════════════════════════════════════════════════════════════
// chunk
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_chunk_uneven_split() {
    for (shape, chunks, axis) in [
        (vec![7, 3], 3usize, 0i64),
        (vec![2, 5], 2, 1),
        (vec![2, 3, 4], 4, -1),
        (vec![6], 4, 0),
        (vec![3, 2], 5, 0),
    ] {
        let report = run(
            "chunk",
            OperationParameters::new(CHUNK).with("chunks", chunks).with("axis", axis),
            test_tensor(shape.clone(), DType::BF16, 3),
            ToleranceSpec::exact(),
        );
        assert!(report.verdict.passed, "{shape:?}/{chunks}/{axis}: {:?}", report.verdict.mismatch);
    }
}

#[test]
fn test_chunk_integers() {
    let report = run(
        "chunk-int",
        OperationParameters::new(CHUNK).with("chunks", 3),
        int_tensor(vec![9, 2], DType::I32),
        ToleranceSpec::exact(),
    );
    assert!(report.verdict.passed);
}

// ═══════════════════════════════════════════════════════════════════════
// multinomial
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_multinomial_with_replacement() {
    let params = OperationParameters::new(MULTINOMIAL).with("num_samples", 16).with("seed", 5);
    let report = run("multinomial", params, probabilities("p", 8, 10, 1).unwrap(), ToleranceSpec::exact());
    assert!(report.verdict.passed, "{:?}", report.verdict.mismatch);
}

#[test]
fn test_multinomial_without_replacement_respects_support() {
    // zero-weight categories must never be drawn
    let weights = Tensor::from_f32("w", vec![2, 5], vec![0.0, 1.0, 0.0, 2.0, 3.0, 4.0, 0.0, 1.0, 1.0, 0.0]).unwrap();
    let params = OperationParameters::new(MULTINOMIAL)
        .with("num_samples", 3)
        .with("seed", 77)
        .with("replacement", false);
    let report = run("multinomial-norep", params, weights, ToleranceSpec::exact());
    assert!(report.verdict.passed, "{:?}", report.verdict.mismatch);
}

#[test]
fn test_multinomial_1d() {
    let weights = Tensor::from_f32("w", vec![4], vec![0.1, 0.2, 0.3, 0.4]).unwrap();
    let params = OperationParameters::new(MULTINOMIAL).with("num_samples", 8).with("seed", 0);
    let report = run("multinomial-1d", params, weights, ToleranceSpec::exact());
    assert!(report.verdict.passed, "{:?}", report.verdict.mismatch);
}
