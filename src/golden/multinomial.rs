//! Structural reference for seeded sampling.
//!
//! Two correct samplers seeded identically need not draw the same indices, so
//! the reference only pins down what every correct draw satisfies: output
//! shape, `i64` indices in `[0, categories)`, zero-weight categories never
//! drawn, and no repeats within a row when sampling without replacement.

use super::{single_input, CheckMode, GoldenEvaluator, GoldenOutput};
use crate::compare::StructuralExpectation;
use crate::error::{HarnessError, HarnessResult};
use crate::ops::{MultinomialConfig, MULTINOMIAL};
use crate::params::OperationParameters;
use crate::tensor::Tensor;
use crate::types::DType;

pub struct MultinomialReference;

impl GoldenEvaluator for MultinomialReference {
    fn kind(&self) -> &'static str {
        MULTINOMIAL
    }

    fn check_mode(&self) -> CheckMode {
        CheckMode::Structural
    }

    fn evaluate(&self, params: &OperationParameters, inputs: &[Tensor]) -> HarnessResult<GoldenOutput> {
        let cfg = MultinomialConfig::from_params(params)?;
        let weights = single_input(params, inputs)?;
        let fail = |reason: String| HarnessError::golden(params.to_string(), reason);

        if !weights.dtype().is_float() {
            return Err(fail(format!("weights must be floating point, got {}", weights.dtype())));
        }
        let (rows, categories) = match *weights.shape() {
            [n] => (1, n),
            [r, n] => (r, n),
            _ => return Err(fail(format!("weights must be 1-D or 2-D, got shape {:?}", weights.shape()))),
        };
        if categories == 0 {
            return Err(fail("weights have no categories".into()));
        }

        let values = weights.to_f64_vec();
        let mut support = Vec::with_capacity(rows);
        for (r, row) in values.chunks(categories).enumerate() {
            if let Some(bad) = row.iter().find(|w| !w.is_finite() || **w < 0.0) {
                return Err(fail(format!("row {r} has invalid weight {bad}")));
            }
            let sum: f64 = row.iter().sum();
            if sum <= 0.0 {
                return Err(fail(format!("row {r} has zero total weight")));
            }
            let mask: Vec<bool> = row.iter().map(|&w| w > 0.0).collect();
            let nonzero = mask.iter().filter(|&&m| m).count();
            if !cfg.replacement && cfg.num_samples > nonzero {
                return Err(fail(format!(
                    "row {r}: cannot draw {} samples without replacement from {nonzero} nonzero categories",
                    cfg.num_samples
                )));
            }
            support.push(mask);
        }

        let shape = if weights.rank() == 1 {
            vec![cfg.num_samples]
        } else {
            vec![rows, cfg.num_samples]
        };
        Ok(GoldenOutput::Structural(vec![StructuralExpectation {
            shape,
            dtype: DType::I64,
            range: (0, categories as i64),
            support: Some(support),
            distinct_per_row: !cfg.replacement,
        }]))
    }
}
