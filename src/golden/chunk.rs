//! Reference decomposition for `chunk`.
//!
//! Parts are built by gathering each output coordinate from the source, a
//! path independent of the block copies the backend uses.

use super::{single_input, CheckMode, GoldenEvaluator, GoldenOutput};
use crate::error::{HarnessError, HarnessResult};
use crate::ops::{ChunkConfig, CHUNK};
use crate::params::OperationParameters;
use crate::tensor::Tensor;
use crate::types::normalize_axis;

pub struct ChunkReference;

/// Extents of each part along the split axis: `ceil(len / chunks)` per part,
/// last part possibly shorter, never an empty trailing part. An empty axis
/// yields one empty part.
pub fn chunk_extents(len: usize, chunks: usize) -> Vec<usize> {
    if len == 0 {
        return vec![0];
    }
    let size = len.div_ceil(chunks.max(1));
    let mut extents = Vec::new();
    let mut start = 0;
    while start < len {
        extents.push(size.min(len - start));
        start += size;
    }
    extents
}

impl GoldenEvaluator for ChunkReference {
    fn kind(&self) -> &'static str {
        CHUNK
    }

    fn check_mode(&self) -> CheckMode {
        CheckMode::Decomposition
    }

    fn evaluate(&self, params: &OperationParameters, inputs: &[Tensor]) -> HarnessResult<GoldenOutput> {
        let cfg = ChunkConfig::from_params(params)?;
        let source = single_input(params, inputs)?;
        let axis = normalize_axis(cfg.axis, source.rank()).ok_or_else(|| {
            HarnessError::golden(
                params.to_string(),
                format!("axis {} out of range for rank {}", cfg.axis, source.rank()),
            )
        })?;
        let strides = source.strides();

        let mut parts = Vec::new();
        let mut offset = 0;
        for (p, extent) in chunk_extents(source.shape()[axis], cfg.chunks).into_iter().enumerate() {
            let mut shape = source.shape().to_vec();
            shape[axis] = extent;
            let layout = Tensor::zeros("layout", shape.clone(), source.dtype());
            let indices: Vec<usize> = (0..layout.numel())
                .map(|flat| {
                    layout
                        .coords(flat)
                        .iter()
                        .zip(&strides)
                        .enumerate()
                        .map(|(d, (&c, &s))| if d == axis { (c + offset) * s } else { c * s })
                        .sum()
                })
                .collect();
            parts.push(source.gather(format!("{}.golden{p}", source.name()), shape, &indices)?);
            offset += extent;
        }

        Ok(GoldenOutput::Decomposition {
            parts,
            source: source.clone(),
            axis,
        })
    }
}
