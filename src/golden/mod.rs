//! Reference ("golden") evaluation.
//!
//! Each operation kind has one [`GoldenEvaluator`] that computes the expected
//! result on the host through a path independent of the backend under test.
//! The evaluator declares up front how its output must be checked
//! ([`CheckMode`]): elementwise, as an ordered decomposition of the input, or
//! structurally when the operation is stochastic.
//!
//! Failures never degrade into a pass: an unknown kind or an evaluator error
//! surfaces as `HarnessError::GoldenComputation`.

pub mod accumulator;
pub mod chunk;
pub mod cumsum;
pub mod multinomial;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::compare::StructuralExpectation;
use crate::error::{HarnessError, HarnessResult};
use crate::params::OperationParameters;
use crate::tensor::Tensor;

pub use chunk::ChunkReference;
pub use cumsum::CumsumReference;
pub use multinomial::MultinomialReference;

/// How actual outputs are judged against the reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckMode {
    /// Elementwise under the case's tolerance policy.
    Elementwise,
    /// Ordered parts of the input, checked pairwise and by reassembly.
    Decomposition,
    /// Shape, dtype and value-range checks only.
    Structural,
}

/// Expected result of one operation invocation.
#[derive(Debug, Clone)]
pub enum GoldenOutput {
    Elementwise(Vec<Tensor>),
    Decomposition {
        parts: Vec<Tensor>,
        source: Tensor,
        axis: usize,
    },
    Structural(Vec<StructuralExpectation>),
}

impl GoldenOutput {
    pub fn check_mode(&self) -> CheckMode {
        match self {
            GoldenOutput::Elementwise(_) => CheckMode::Elementwise,
            GoldenOutput::Decomposition { .. } => CheckMode::Decomposition,
            GoldenOutput::Structural(_) => CheckMode::Structural,
        }
    }

    /// Golden tensors, when the output has concrete values.
    pub fn tensors(&self) -> &[Tensor] {
        match self {
            GoldenOutput::Elementwise(t) => t,
            GoldenOutput::Decomposition { parts, .. } => parts,
            GoldenOutput::Structural(_) => &[],
        }
    }
}

/// Reference implementation of one operation kind.
pub trait GoldenEvaluator {
    fn kind(&self) -> &'static str;

    fn check_mode(&self) -> CheckMode;

    /// Compute the expected output from host-resident inputs.
    fn evaluate(&self, params: &OperationParameters, inputs: &[Tensor]) -> HarnessResult<GoldenOutput>;
}

/// Evaluators keyed by operation kind.
#[derive(Default)]
pub struct GoldenRegistry {
    evaluators: HashMap<String, Box<dyn GoldenEvaluator>>,
}

impl GoldenRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the cumsum, chunk and multinomial references.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(CumsumReference));
        registry.register(Box::new(ChunkReference));
        registry.register(Box::new(MultinomialReference));
        registry
    }

    /// Register an evaluator, returning the one it replaces.
    pub fn register(&mut self, evaluator: Box<dyn GoldenEvaluator>) -> Option<Box<dyn GoldenEvaluator>> {
        self.evaluators.insert(evaluator.kind().to_string(), evaluator)
    }

    pub fn get(&self, kind: &str) -> Option<&dyn GoldenEvaluator> {
        self.evaluators.get(kind).map(|e| e.as_ref())
    }

    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.evaluators.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    /// Evaluate the reference selected by `params.kind()`.
    pub fn evaluate(&self, params: &OperationParameters, inputs: &[Tensor]) -> HarnessResult<GoldenOutput> {
        let evaluator = self.get(params.kind()).ok_or_else(|| {
            HarnessError::golden(
                params.to_string(),
                format!("no reference evaluator registered for kind {:?}", params.kind()),
            )
        })?;
        if let Some(t) = inputs.iter().find(|t| t.is_device()) {
            return Err(HarnessError::golden(
                params.to_string(),
                format!("reference inputs must be host-resident, {} is on {}", t.name(), t.location()),
            ));
        }
        let output = evaluator.evaluate(params, inputs).map_err(|err| match err {
            e @ HarnessError::GoldenComputation { .. } => e,
            other => HarnessError::golden(params.to_string(), other.to_string()),
        })?;
        log::debug!(
            "golden {} computed ({:?}, {} tensor(s))",
            params,
            output.check_mode(),
            output.tensors().len()
        );
        Ok(output)
    }
}

/// Single host input, or a golden error naming the operation.
pub(crate) fn single_input<'a>(params: &OperationParameters, inputs: &'a [Tensor]) -> HarnessResult<&'a Tensor> {
    match inputs {
        [one] => Ok(one),
        _ => Err(HarnessError::golden(
            params.to_string(),
            format!("expected 1 input tensor, got {}", inputs.len()),
        )),
    }
}
