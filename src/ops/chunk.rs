//! Split a tensor into contiguous chunks along one axis.
//!
//! Chunk sizes follow `ceil(len / chunks)` with a possibly shorter last
//! chunk, so fewer than `chunks` parts may come back. Each part is copied as
//! `outer` contiguous blocks of `extent * inner` elements.

use super::ChunkConfig;
use crate::cpu_backend::OpContext;
use crate::error::HarnessResult;
use crate::golden::chunk::chunk_extents;
use crate::operation::{Determinism, Operation};
use crate::params::OperationParameters;
use crate::tensor::Tensor;
use crate::types::split_at_axis;

pub struct CpuChunk {
    ctx: OpContext,
    cfg: ChunkConfig,
}

impl CpuChunk {
    pub fn new(ctx: OpContext, cfg: ChunkConfig) -> Self {
        Self { ctx, cfg }
    }
}

/// Flat source indices of the block `[start, start + extent)` along the
/// middle axis of an `[outer, len, inner]` view.
fn block_indices(outer: usize, len: usize, inner: usize, start: usize, extent: usize) -> Vec<usize> {
    let mut indices = Vec::with_capacity(outer * extent * inner);
    for o in 0..outer {
        let base = (o * len + start) * inner;
        indices.extend(base..base + extent * inner);
    }
    indices
}

impl Operation for CpuChunk {
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
        let (outer, len, inner) = split_at_axis(input.shape(), axis);

        let mut parts = Vec::new();
        let mut start = 0;
        for (i, extent) in chunk_extents(len, self.cfg.chunks).into_iter().enumerate() {
            let mut shape = input.shape().to_vec();
            shape[axis] = extent;
            let indices = block_indices(outer, len, inner, start, extent);
            let part = input
                .gather(format!("{}.chunk{i}", input.name()), shape, &indices)?
                .with_location(input.location());
            parts.push(part);
            start += extent;
        }
        self.ctx.device().enqueue();
        Ok(parts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_indices() {
        // [outer=2, len=4, inner=1], take rows 1..3
        assert_eq!(block_indices(2, 4, 1, 1, 2), vec![1, 2, 5, 6]);
        // [outer=1, len=3, inner=2], take row 2
        assert_eq!(block_indices(1, 3, 2, 2, 1), vec![4, 5]);
        assert!(block_indices(3, 0, 5, 0, 0).is_empty());
    }
}
