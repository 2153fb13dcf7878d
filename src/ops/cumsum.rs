//! Inclusive prefix sum along one axis.
//!
//! # Layout
//!
//! ```text
//! input viewed as [outer, len, inner]
//! out[o, k, i] = sum_{j <= k} in[o, j, i]
//! ```
//!
//! Outer slices are independent and processed in parallel. Floats accumulate
//! in their working precision (f16/bf16 widen to f32); integers wrap.

use half::{bf16, f16};
use rayon::prelude::*;

use super::CumsumConfig;
use crate::cpu_backend::OpContext;
use crate::error::HarnessResult;
use crate::operation::{Determinism, Operation};
use crate::params::OperationParameters;
use crate::tensor::{Tensor, TensorData};
use crate::types::split_at_axis;

/// Prefix-sum kernel over an `[outer, len, inner]` view.
///
/// `src` and `dst` must both hold `outer * len * inner` elements.
pub fn cumsum_forward<T, F>(src: &[T], dst: &mut [T], len: usize, inner: usize, zero: T, add: F)
where
    T: Copy + Send + Sync,
    F: Fn(T, T) -> T + Sync,
{
    debug_assert_eq!(src.len(), dst.len());
    let slice = len * inner;
    if slice == 0 {
        return;
    }
    dst.par_chunks_exact_mut(slice)
        .zip(src.par_chunks_exact(slice))
        .for_each(|(out, inp)| {
            for i in 0..inner {
                let mut acc = zero;
                for k in 0..len {
                    let idx = k * inner + i;
                    acc = add(acc, inp[idx]);
                    out[idx] = acc;
                }
            }
        });
}

pub struct CpuCumsum {
    ctx: OpContext,
    cfg: CumsumConfig,
    /// Widened f32 working buffers for half-precision inputs.
    scratch: (Vec<f32>, Vec<f32>),
}

impl CpuCumsum {
    pub fn new(ctx: OpContext, cfg: CumsumConfig) -> Self {
        Self { ctx, cfg, scratch: (Vec::new(), Vec::new()) }
    }

    fn widened<N: Copy>(&mut self, v: &[N], len: usize, inner: usize, to: impl Fn(N) -> f32) -> &[f32] {
        let (src, dst) = &mut self.scratch;
        src.clear();
        src.extend(v.iter().map(|&x| to(x)));
        dst.clear();
        dst.resize(src.len(), 0.0);
        cumsum_forward(src, dst, len, inner, 0.0f32, |a, b| a + b);
        dst
    }
}

impl Operation for CpuCumsum {
    fn kind(&self) -> &str {
        self.ctx.params.kind()
    }

    fn parameters(&self) -> &OperationParameters {
        &self.ctx.params
    }

    fn determinism(&self) -> Determinism {
        Determinism::Deterministic
    }

    fn execute(&mut self, inputs: &[Tensor]) -> HarnessResult<Vec<Tensor>> {
        self.ctx.check_inputs(inputs, 1)?;
        let input = &inputs[0];
        let axis = self.ctx.resolve_axis(self.cfg.axis, input.rank())?;
        let (_, len, inner) = split_at_axis(input.shape(), axis);

        let data = match input.data() {
            TensorData::F32(v) => {
                let mut out = vec![0.0f32; v.len()];
                cumsum_forward(v, &mut out, len, inner, 0.0, |a, b| a + b);
                TensorData::F32(out)
            }
            TensorData::F64(v) => {
                let mut out = vec![0.0f64; v.len()];
                cumsum_forward(v, &mut out, len, inner, 0.0, |a, b| a + b);
                TensorData::F64(out)
            }
            TensorData::F16(v) => {
                let out = self.widened(v, len, inner, f16::to_f32);
                TensorData::F16(out.iter().map(|&x| f16::from_f32(x)).collect())
            }
            TensorData::BF16(v) => {
                let out = self.widened(v, len, inner, bf16::to_f32);
                TensorData::BF16(out.iter().map(|&x| bf16::from_f32(x)).collect())
            }
            TensorData::I32(v) => {
                let mut out = vec![0i32; v.len()];
                cumsum_forward(v, &mut out, len, inner, 0, i32::wrapping_add);
                TensorData::I32(out)
            }
            TensorData::I64(v) => {
                let mut out = vec![0i64; v.len()];
                cumsum_forward(v, &mut out, len, inner, 0, i64::wrapping_add);
                TensorData::I64(out)
            }
        };

        let out = Tensor::new(format!("{}.cumsum", input.name()), input.shape().to_vec(), data)?
            .with_location(input.location());
        self.ctx.device().enqueue();
        Ok(vec![out])
    }
}
