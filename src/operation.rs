//! Operation adapter traits.
//!
//! The harness never sees kernels directly. A [`Backend`] constructs an
//! opaque [`Operation`] from an [`OperationParameters`] descriptor and exposes
//! the [`Device`] it runs on, which provides the transfer and synchronization
//! primitives the driver and benchmark runner need.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::backend::BackendType;
use crate::error::HarnessResult;
use crate::params::OperationParameters;
use crate::tensor::Tensor;

/// Reproducibility contract of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Determinism {
    /// Repeated execution on identical inputs is bit-identical.
    Deterministic,
    /// Output depends on the seed; only its structure is stable.
    Seeded(u64),
}

/// A device executing operations asynchronously with respect to the host.
pub trait Device: Send + Sync {
    fn name(&self) -> &str;

    fn ordinal(&self) -> u32;

    /// Block until every previously issued execution has completed.
    fn synchronize(&self) -> HarnessResult<()>;

    /// Copy a host tensor to the device. Shape and dtype are preserved.
    fn to_device(&self, tensor: &Tensor) -> HarnessResult<Tensor>;

    /// Copy a device tensor back to the host.
    fn to_host(&self, tensor: &Tensor) -> HarnessResult<Tensor>;
}

/// A constructed, stateful operation bound to one parameter set.
///
/// Device resources held by the operation are released on drop.
pub trait Operation {
    fn kind(&self) -> &str;

    fn parameters(&self) -> &OperationParameters;

    fn determinism(&self) -> Determinism;

    /// Run once on device-resident inputs, returning device-resident outputs.
    fn execute(&mut self, inputs: &[Tensor]) -> HarnessResult<Vec<Tensor>>;
}

/// Factory for operations on one device.
pub trait Backend {
    fn backend_type(&self) -> BackendType;

    fn device(&self) -> Arc<dyn Device>;

    /// Validate `params` and build the operation. Validation happens before
    /// any device resource is acquired.
    fn construct(&self, params: &OperationParameters) -> HarnessResult<Box<dyn Operation>>;
}
