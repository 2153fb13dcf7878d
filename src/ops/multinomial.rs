//! Seeded categorical sampling.
//!
//! Each row of (unnormalized, non-negative) weights yields `num_samples`
//! category indices drawn with a `StdRng` seeded from the descriptor. A fresh
//! generator is created per launch, so a given seed reproduces its draws on
//! this backend. Without replacement, a drawn category's weight is zeroed
//! before the next draw.

use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::SeedableRng;

use super::{MultinomialConfig, MAX_SAMPLES};
use crate::cpu_backend::OpContext;
use crate::error::HarnessResult;
use crate::operation::{Determinism, Operation};
use crate::params::OperationParameters;
use crate::tensor::Tensor;

pub struct CpuMultinomial {
    ctx: OpContext,
    cfg: MultinomialConfig,
}

impl CpuMultinomial {
    pub fn new(ctx: OpContext, cfg: MultinomialConfig) -> Self {
        Self { ctx, cfg }
    }

    fn sample_row(&self, rng: &mut StdRng, row: &[f64], out: &mut Vec<i64>) -> Result<(), String> {
        if self.cfg.replacement {
            let dist = WeightedIndex::new(row).map_err(|e| e.to_string())?;
            out.extend((0..self.cfg.num_samples).map(|_| dist.sample(rng) as i64));
            return Ok(());
        }
        let nonzero = row.iter().filter(|&&w| w > 0.0).count();
        if self.cfg.num_samples > nonzero {
            return Err(format!(
                "cannot draw {} samples without replacement from {nonzero} nonzero categories",
                self.cfg.num_samples
            ));
        }
        let mut weights = row.to_vec();
        for _ in 0..self.cfg.num_samples {
            let dist = WeightedIndex::new(&weights).map_err(|e| e.to_string())?;
            let idx = dist.sample(rng);
            weights[idx] = 0.0;
            out.push(idx as i64);
        }
        Ok(())
    }
}

impl Operation for CpuMultinomial {
    fn kind(&self) -> &str {
        self.ctx.params.kind()
    }

    fn parameters(&self) -> &OperationParameters {
        &self.ctx.params
    }

    fn determinism(&self) -> Determinism {
        Determinism::Seeded(self.cfg.seed)
    }

    fn execute(&mut self, inputs: &[Tensor]) -> HarnessResult<Vec<Tensor>> {
        self.ctx.check_inputs(inputs, 1)?;
        let weights = &inputs[0];
        if !weights.dtype().is_float() {
            return Err(self.ctx.fail(format!("weights must be floating point, got {}", weights.dtype())));
        }
        let (rows, categories) = match *weights.shape() {
            [n] => (1, n),
            [r, n] => (r, n),
            _ => {
                return Err(self.ctx.fail(format!(
                    "weights must be 1-D or 2-D, got shape {:?}",
                    weights.shape()
                )))
            }
        };
        if categories == 0 {
            return Err(self.ctx.fail("weights have no categories"));
        }

        let values = weights.to_f64_vec();
        let mut rng = StdRng::seed_from_u64(self.cfg.seed);
        let total = rows
            .checked_mul(self.cfg.num_samples)
            .filter(|&n| n <= MAX_SAMPLES)
            .ok_or_else(|| {
                self.ctx.fail(format!(
                    "{rows} rows x {} samples exceeds {MAX_SAMPLES} samples per launch",
                    self.cfg.num_samples
                ))
            })?;
        let mut samples = Vec::with_capacity(total);
        for (r, row) in values.chunks(categories).enumerate() {
            self.sample_row(&mut rng, row, &mut samples)
                .map_err(|reason| self.ctx.fail(format!("row {r}: {reason}")))?;
        }

        let shape = if weights.rank() == 1 {
            vec![self.cfg.num_samples]
        } else {
            vec![rows, self.cfg.num_samples]
        };
        let out = Tensor::from_i64(format!("{}.samples", weights.name()), shape, samples)?
            .with_location(weights.location());
        self.ctx.device().enqueue();
        Ok(vec![out])
    }
}
