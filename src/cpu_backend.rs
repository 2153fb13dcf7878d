//! In-process CPU backend.
//!
//! The CPU device models an asynchronous queue: `execute` enqueues work and
//! returns, `synchronize` drains whatever is pending. Kernels themselves run
//! on the rayon pool, which is the device's internal scheduling. At most one
//! operation may hold the device at a time.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::backend::BackendType;
use crate::error::{HarnessError, HarnessResult};
use crate::operation::{Backend, Device, Operation};
use crate::ops::chunk::CpuChunk;
use crate::ops::cumsum::CpuCumsum;
use crate::ops::multinomial::CpuMultinomial;
use crate::ops::{ChunkConfig, CumsumConfig, MultinomialConfig, CHUNK, CUMSUM, MULTINOMIAL};
use crate::params::{validate_input_count, OperationParameters};
use crate::tensor::Tensor;
use crate::types::{normalize_axis, Location};

#[derive(Debug)]
pub struct CpuDevice {
    ordinal: u32,
    name: String,
    pending: AtomicUsize,
    completed: AtomicU64,
    syncs: AtomicU64,
    transfers: AtomicU64,
    live_ops: AtomicUsize,
}

impl CpuDevice {
    pub fn new(ordinal: u32) -> Self {
        Self {
            ordinal,
            name: format!("cpu:{ordinal}"),
            pending: AtomicUsize::new(0),
            completed: AtomicU64::new(0),
            syncs: AtomicU64::new(0),
            transfers: AtomicU64::new(0),
            live_ops: AtomicUsize::new(0),
        }
    }

    pub fn location(&self) -> Location {
        Location::Device(self.ordinal)
    }

    /// Record one issued launch.
    pub(crate) fn enqueue(&self) {
        self.pending.fetch_add(1, Ordering::AcqRel);
    }

    /// Launches issued but not yet synchronized.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Acquire)
    }

    pub fn sync_count(&self) -> u64 {
        self.syncs.load(Ordering::Acquire)
    }

    pub fn transfer_count(&self) -> u64 {
        self.transfers.load(Ordering::Acquire)
    }

    pub fn live_operations(&self) -> usize {
        self.live_ops.load(Ordering::Acquire)
    }
}

impl Device for CpuDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn ordinal(&self) -> u32 {
        self.ordinal
    }

    fn synchronize(&self) -> HarnessResult<()> {
        let drained = self.pending.swap(0, Ordering::AcqRel);
        self.completed.fetch_add(drained as u64, Ordering::AcqRel);
        self.syncs.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn to_device(&self, tensor: &Tensor) -> HarnessResult<Tensor> {
        match tensor.location() {
            Location::Device(o) if o != self.ordinal => Err(HarnessError::InvalidTensor(format!(
                "{} lives on device:{o}, not {}",
                tensor.name(),
                self.name
            ))),
            _ => {
                self.transfers.fetch_add(1, Ordering::AcqRel);
                Ok(tensor.clone().with_location(self.location()))
            }
        }
    }

    fn to_host(&self, tensor: &Tensor) -> HarnessResult<Tensor> {
        if tensor.location() != self.location() {
            return Err(HarnessError::InvalidTensor(format!(
                "{} is on {}, expected {}",
                tensor.name(),
                tensor.location(),
                self.name
            )));
        }
        self.transfers.fetch_add(1, Ordering::AcqRel);
        Ok(tensor.clone().with_location(Location::Host))
    }
}

/// Exclusive claim on a [`CpuDevice`], released on drop.
#[derive(Debug)]
pub struct DeviceLease {
    device: Arc<CpuDevice>,
}

impl DeviceLease {
    pub fn acquire(device: &Arc<CpuDevice>) -> HarnessResult<Self> {
        device
            .live_ops
            .compare_exchange(0, 1, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| HarnessError::DeviceBusy(device.name.clone()))?;
        log::debug!("lease acquired on {}", device.name);
        Ok(Self { device: Arc::clone(device) })
    }

    pub fn device(&self) -> &Arc<CpuDevice> {
        &self.device
    }
}

impl Drop for DeviceLease {
    fn drop(&mut self) {
        self.device.live_ops.fetch_sub(1, Ordering::AcqRel);
        log::debug!("lease released on {}", self.device.name);
    }
}

/// State shared by every CPU operation: its descriptor and device lease.
#[derive(Debug)]
pub struct OpContext {
    pub params: OperationParameters,
    pub lease: DeviceLease,
}

impl OpContext {
    pub fn device(&self) -> &CpuDevice {
        self.lease.device()
    }

    /// Check input count and residency before a launch.
    pub fn check_inputs(&self, inputs: &[Tensor], expected: usize) -> HarnessResult<()> {
        validate_input_count(inputs.len(), expected)
            .map_err(|reason| HarnessError::execution(self.params.to_string(), reason))?;
        let here = self.device().location();
        for t in inputs {
            if t.location() != here {
                return Err(HarnessError::execution(
                    self.params.to_string(),
                    format!("input {} is on {}, expected {}", t.name(), t.location(), here),
                ));
            }
        }
        Ok(())
    }

    /// Resolve `axis` against the input rank.
    pub fn resolve_axis(&self, axis: i64, rank: usize) -> HarnessResult<usize> {
        normalize_axis(axis, rank).ok_or_else(|| {
            HarnessError::execution(
                self.params.to_string(),
                format!("axis {axis} out of range for rank {rank}"),
            )
        })
    }

    pub fn fail(&self, reason: impl Into<String>) -> HarnessError {
        HarnessError::execution(self.params.to_string(), reason)
    }
}

pub struct CpuBackend {
    device: Arc<CpuDevice>,
}

impl CpuBackend {
    pub fn new(ordinal: u32) -> Self {
        Self { device: Arc::new(CpuDevice::new(ordinal)) }
    }

    pub fn cpu_device(&self) -> &Arc<CpuDevice> {
        &self.device
    }

    fn context(&self, params: &OperationParameters) -> HarnessResult<OpContext> {
        Ok(OpContext {
            params: params.clone(),
            lease: DeviceLease::acquire(&self.device)?,
        })
    }
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new(0)
    }
}

impl Backend for CpuBackend {
    fn backend_type(&self) -> BackendType {
        BackendType::Cpu
    }

    fn device(&self) -> Arc<dyn Device> {
        self.device.clone()
    }

    fn construct(&self, params: &OperationParameters) -> HarnessResult<Box<dyn Operation>> {
        // Parse first: a bad descriptor must not take the device.
        let op: Box<dyn Operation> = match params.kind() {
            CUMSUM => {
                let cfg = CumsumConfig::from_params(params)?;
                Box::new(CpuCumsum::new(self.context(params)?, cfg))
            }
            CHUNK => {
                let cfg = ChunkConfig::from_params(params)?;
                Box::new(CpuChunk::new(self.context(params)?, cfg))
            }
            MULTINOMIAL => {
                let cfg = MultinomialConfig::from_params(params)?;
                Box::new(CpuMultinomial::new(self.context(params)?, cfg))
            }
            other => return Err(HarnessError::UnsupportedOperation(other.to_string())),
        };
        log::debug!("constructed {} on {}", params, self.device.name);
        Ok(op)
    }
}
