//! Reference prefix sum.
//!
//! Floats accumulate in f64 with Kahan compensation; integers in i128 with an
//! overflow check against the output dtype. The result is cast back to the
//! input dtype so the comparator sees matching element types.

use super::accumulator::KahanAccumulator;
use super::{single_input, CheckMode, GoldenEvaluator, GoldenOutput};
use crate::error::{HarnessError, HarnessResult};
use crate::ops::{CumsumConfig, CUMSUM};
use crate::params::OperationParameters;
use crate::tensor::{Tensor, TensorData};
use crate::types::{normalize_axis, split_at_axis, DType};

pub struct CumsumReference;

impl GoldenEvaluator for CumsumReference {
    fn kind(&self) -> &'static str {
        CUMSUM
    }

    fn check_mode(&self) -> CheckMode {
        CheckMode::Elementwise
    }

    fn evaluate(&self, params: &OperationParameters, inputs: &[Tensor]) -> HarnessResult<GoldenOutput> {
        let cfg = CumsumConfig::from_params(params)?;
        let input = single_input(params, inputs)?;
        let axis = normalize_axis(cfg.axis, input.rank()).ok_or_else(|| {
            HarnessError::golden(
                params.to_string(),
                format!("axis {} out of range for rank {}", cfg.axis, input.rank()),
            )
        })?;
        let (outer, len, inner) = split_at_axis(input.shape(), axis);

        let data = if input.dtype().is_float() {
            let values = input.to_f64_vec();
            let mut out = vec![0.0f64; values.len()];
            for o in 0..outer {
                for i in 0..inner {
                    let mut acc = KahanAccumulator::new();
                    for k in 0..len {
                        let idx = (o * len + k) * inner + i;
                        acc.add(values[idx]);
                        out[idx] = acc.corrected_value();
                    }
                }
            }
            TensorData::from_f64(input.dtype(), &out)
        } else {
            integer_prefix_sum(params, input, outer, len, inner)?
        };

        let golden = Tensor::new(format!("{}.golden", input.name()), input.shape().to_vec(), data)?;
        Ok(GoldenOutput::Elementwise(vec![golden]))
    }
}

fn integer_prefix_sum(
    params: &OperationParameters,
    input: &Tensor,
    outer: usize,
    len: usize,
    inner: usize,
) -> HarnessResult<TensorData> {
    let (lo, hi) = match input.dtype() {
        DType::I32 => (i32::MIN as i128, i32::MAX as i128),
        _ => (i64::MIN as i128, i64::MAX as i128),
    };
    let raw: Vec<i128> = match input.data() {
        TensorData::I32(v) => v.iter().map(|&x| x as i128).collect(),
        TensorData::I64(v) => v.iter().map(|&x| x as i128).collect(),
        other => {
            return Err(HarnessError::golden(
                params.to_string(),
                format!("unexpected dtype {}", other.dtype()),
            ))
        }
    };
    let mut out = vec![0i128; raw.len()];
    for o in 0..outer {
        for i in 0..inner {
            let mut acc = 0i128;
            for k in 0..len {
                let idx = (o * len + k) * inner + i;
                acc += raw[idx];
                if acc < lo || acc > hi {
                    return Err(HarnessError::golden(
                        params.to_string(),
                        format!("prefix sum overflows {} at {:?}", input.dtype(), input.coords(idx)),
                    ));
                }
                out[idx] = acc;
            }
        }
    }
    Ok(match input.dtype() {
        DType::I32 => TensorData::I32(out.into_iter().map(|v| v as i32).collect()),
        _ => TensorData::I64(out.into_iter().map(|v| v as i64).collect()),
    })
}
