//! Deterministic input generators for test cases.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{HarnessError, HarnessResult};
use crate::tensor::Tensor;
use crate::types::DType;

/// Reproducible values in `[-1, 1)` from a 64-bit LCG.
pub fn lcg_values(size: usize, seed: u64) -> Vec<f32> {
    let mut data = Vec::with_capacity(size);
    let mut state = seed;
    for _ in 0..size {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
        // top 24 bits: exactly representable in f32
        let unit = (state >> 40) as f32 / (1u64 << 24) as f32;
        data.push(unit * 2.0 - 1.0);
    }
    data
}

/// f32 tensor of seeded uniform values in `[lo, hi)`.
pub fn uniform(name: &str, shape: Vec<usize>, seed: u64, lo: f32, hi: f32) -> HarnessResult<Tensor> {
    if !(lo < hi) {
        return Err(HarnessError::InputBuild(format!("empty range [{lo}, {hi})")));
    }
    let n = shape.iter().product();
    let mut rng = StdRng::seed_from_u64(seed);
    let values: Vec<f32> = (0..n).map(|_| rng.gen_range(lo..hi)).collect();
    Tensor::from_f32(name, shape, values)
}

/// `[rows, cols]` f32 tensor whose rows are positive and sum to 1.
pub fn probabilities(name: &str, rows: usize, cols: usize, seed: u64) -> HarnessResult<Tensor> {
    if cols == 0 {
        return Err(HarnessError::InputBuild("probability rows need at least one column".into()));
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let mut values = Vec::with_capacity(rows * cols);
    for _ in 0..rows {
        let row: Vec<f32> = (0..cols).map(|_| rng.gen_range(0.05f32..1.0)).collect();
        let sum: f32 = row.iter().sum();
        values.extend(row.iter().map(|v| v / sum));
    }
    Tensor::from_f32(name, vec![rows, cols], values)
}

/// `0, 1, 2, ...` laid out in `shape`, stored as `dtype`.
pub fn arange(name: &str, shape: Vec<usize>, dtype: DType) -> HarnessResult<Tensor> {
    let n: usize = shape.iter().product();
    let values: Vec<f64> = (0..n).map(|i| i as f64).collect();
    Tensor::from_f64_values(name, shape, dtype, &values)
}
